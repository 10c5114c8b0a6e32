//! Structural predicates for stored groups, items and chunks.
//!
//! Everything read back from the backend or handed in by an import is untyped
//! JSON. The predicates here decide what is trustworthy; the `parse_*`
//! helpers turn trustworthy values into model records.

use crate::json_ext::JsonExt;
use crate::model::{DEFAULT_ICON_REF, Group, Item, StateSnapshot, UNTITLED_GROUP_NAME};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// An item is valid when `id`, `url` and `title` are strings and
/// `createdAt` is a timestamp string.
pub fn is_valid_item(value: &Value) -> bool {
    value.is_object()
        && value.get_str("id").is_some()
        && value.get_str("url").is_some()
        && value.get_str("title").is_some()
        && value.get_timestamp("createdAt").is_some()
}

/// A group is valid when `id` and `name` are strings, `tabs` is a sequence
/// and `createdAt` is a timestamp string.
///
/// In the stored index `tabs` holds chunk references; inline it holds items.
/// The predicate only looks at the shape of the group itself.
pub fn is_valid_group(value: &Value) -> bool {
    value.is_object()
        && value.get_str("id").is_some()
        && value.get_str("name").is_some()
        && value.get_array("tabs").is_some()
        && value.get_timestamp("createdAt").is_some()
}

/// A stored chunk is valid when it is a non-empty sequence.
pub fn is_valid_chunk(value: &Value) -> bool {
    value.as_array().is_some_and(|items| !items.is_empty())
}

/// Convert a stored item into a model record.
///
/// Returns `None` for structurally invalid items and for items with an empty
/// url or title.
pub fn parse_item(value: &Value) -> Option<Item> {
    if !is_valid_item(value) {
        return None;
    }
    let url = value.get_non_empty_str("url")?;
    let title = value.get_non_empty_str("title")?;
    Some(Item {
        id: value.get_str("id")?.to_string(),
        url: url.to_string(),
        title: title.to_string(),
        icon_ref: value
            .get_non_empty_str("favIconUrl")
            .unwrap_or(DEFAULT_ICON_REF)
            .to_string(),
        created_at: value.get_timestamp("createdAt")?,
    })
}

/// Group header fields with missing values synthesized. The second value is
/// true when anything had to be filled in.
pub(crate) fn group_header(value: &Value) -> (Group, bool) {
    let id = value.get_id("id");
    let name = value.get_str("name");
    let created_at = value.get_timestamp("createdAt");
    let repaired = id.is_none() || name.is_none() || created_at.is_none();
    let group = Group {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: name.unwrap_or(UNTITLED_GROUP_NAME).to_string(),
        items: Vec::new(),
        created_at: created_at.unwrap_or_else(Utc::now),
    };
    (group, repaired)
}

/// Rebuild a snapshot from an inline `{groups: [{.., tabs: [items]}]}` value,
/// as found in the backup record.
///
/// Returns the snapshot and the number of groups and items dropped or
/// repaired along the way.
pub fn sanitize_inline_snapshot(value: &Value) -> (StateSnapshot, usize) {
    let mut sanitized = 0;
    let mut groups = Vec::new();
    for raw in value.get_array("groups").map(Vec::as_slice).unwrap_or_default() {
        if !raw.is_object() {
            sanitized += 1;
            continue;
        }
        let (mut group, repaired) = group_header(raw);
        if repaired {
            sanitized += 1;
        }
        for raw_item in raw.get_array("tabs").map(Vec::as_slice).unwrap_or_default() {
            match parse_item(raw_item) {
                Some(item) => group.items.push(item),
                None => sanitized += 1,
            }
        }
        groups.push(group);
    }
    let snapshot = StateSnapshot {
        groups,
        search_query: value.get_str("searchQuery").unwrap_or_default().to_string(),
    };
    (snapshot, sanitized)
}

//! Normalization of externally supplied data.
//!
//! Three payload shapes have been exported over time:
//!
//! | Shape | Example |
//! |---|---|
//! | legacy URL list | `["https://a.com", "https://b.com"]` |
//! | current | `{"groups": [...], "searchQuery": ""}` |
//! | backup export | `{"timestamp": 1700000000000, "state": {"groups": [...]}}` |
//!
//! [`classify`] tries each shape in that order and yields a [`ParsedPayload`];
//! [`normalize`] then rebuilds a clean [`StateSnapshot`] from it. Missing ids,
//! names and timestamps are synthesized; malformed items are dropped without
//! aborting their group; groups left empty are dropped.

use crate::error::ImportError;
use crate::json_ext::JsonExt;
use crate::model::{DEFAULT_ICON_REF, Group, Item, StateSnapshot, UNTITLED_GROUP_NAME};
use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

/// Name of the group created for a legacy URL list.
pub const LEGACY_GROUP_NAME: &str = "Imported links";

/// A payload whose shape has been recognized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedPayload<'a> {
    /// Bare sequence: every element is a URL (or a loose item object).
    Legacy(&'a [Value]),
    /// Object holding a `groups` sequence.
    Current(&'a Value),
    /// Backup record; the state object holds the `groups` sequence.
    BackupWrapped(&'a Value),
}

impl ParsedPayload<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedPayload::Legacy(_) => "legacy URL list",
            ParsedPayload::Current(_) => "current",
            ParsedPayload::BackupWrapped(_) => "backup export",
        }
    }
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub groups: usize,
    pub items: usize,
    pub dropped_groups: usize,
    pub dropped_items: usize,
}

/// Recognize the shape of a payload.
pub fn classify(payload: &Value) -> Result<ParsedPayload<'_>, ImportError> {
    if let Some(list) = payload.as_array() {
        return Ok(ParsedPayload::Legacy(list));
    }
    if payload.get_array("groups").is_some() {
        return Ok(ParsedPayload::Current(payload));
    }
    if let Some(state) = payload.get("state")
        && state.get_array("groups").is_some()
    {
        return Ok(ParsedPayload::BackupWrapped(state));
    }
    Err(ImportError::UnsupportedFormat)
}

/// Build a clean snapshot from an external payload.
pub fn normalize(payload: &Value) -> Result<(StateSnapshot, ImportSummary), ImportError> {
    let parsed = classify(payload)?;
    debug!("importing {} payload", parsed.kind());

    let mut summary = ImportSummary::default();
    let (groups, search_query) = match parsed {
        ParsedPayload::Legacy(list) => {
            let items = normalize_items(list, &mut summary);
            let groups = if items.is_empty() {
                Vec::new()
            } else {
                vec![Group::with_items(LEGACY_GROUP_NAME, items)]
            };
            (groups, String::new())
        }
        ParsedPayload::Current(root) | ParsedPayload::BackupWrapped(root) => {
            let mut groups = Vec::new();
            for raw in root.get_array("groups").map(Vec::as_slice).unwrap_or_default() {
                match normalize_group(raw, &mut summary) {
                    Some(group) => groups.push(group),
                    None => summary.dropped_groups += 1,
                }
            }
            let query = root.get_str("searchQuery").unwrap_or_default().to_string();
            (groups, query)
        }
    };

    if groups.is_empty() {
        return Err(ImportError::NoValidData);
    }

    summary.groups = groups.len();
    summary.items = groups.iter().map(|g| g.items.len()).sum();
    if summary.dropped_items > 0 || summary.dropped_groups > 0 {
        warn!(
            "import dropped {} malformed items and {} groups",
            summary.dropped_items, summary.dropped_groups
        );
    }
    Ok((
        StateSnapshot {
            groups,
            search_query,
        },
        summary,
    ))
}

fn normalize_group(raw: &Value, summary: &mut ImportSummary) -> Option<Group> {
    if !raw.is_object() {
        return None;
    }
    let items = normalize_items(
        raw.get_array("tabs").map(Vec::as_slice).unwrap_or_default(),
        summary,
    );
    if items.is_empty() {
        return None;
    }
    Some(Group {
        id: raw
            .get_id("id")
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: raw
            .get_non_empty_str("name")
            .unwrap_or(UNTITLED_GROUP_NAME)
            .to_string(),
        items,
        created_at: raw.get_timestamp("createdAt").unwrap_or_else(Utc::now),
    })
}

fn normalize_items(raw: &[Value], summary: &mut ImportSummary) -> Vec<Item> {
    raw.iter()
        .filter_map(|value| {
            let item = normalize_item(value);
            if item.is_none() {
                summary.dropped_items += 1;
            }
            item
        })
        .collect()
}

/// Turn one candidate into an item. Strings are bare URLs from the legacy
/// format; objects may lack a title, in which case the URL host is used.
fn normalize_item(raw: &Value) -> Option<Item> {
    match raw {
        Value::String(url) => {
            let title = host_of(url)?;
            Some(Item::new(url.as_str(), title, None))
        }
        Value::Object(_) => {
            let url = raw.get_non_empty_str("url")?;
            let title = match raw.get_non_empty_str("title") {
                Some(title) => title.to_string(),
                None => host_of(url)?,
            };
            Some(Item {
                id: raw
                    .get_id("id")
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                url: url.to_string(),
                title,
                icon_ref: raw
                    .get_non_empty_str("favIconUrl")
                    .unwrap_or(DEFAULT_ICON_REF)
                    .to_string(),
                created_at: raw.get_timestamp("createdAt").unwrap_or_else(Utc::now),
            })
        }
        _ => None,
    }
}

/// Host name of a URL, if it parses and has a non-empty host.
fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_url_list() {
        let (state, summary) = normalize(&json!(["https://a.com", "https://b.com/page"])).unwrap();
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].name, LEGACY_GROUP_NAME);
        let titles: Vec<_> = state.groups[0].items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a.com", "b.com"]);
        assert_eq!(state.groups[0].items[1].url, "https://b.com/page");
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.items, 2);
    }

    #[test]
    fn test_legacy_list_drops_unparseable_urls() {
        let (state, summary) = normalize(&json!(["https://a.com", "not a url", 42])).unwrap();
        assert_eq!(state.groups[0].items.len(), 1);
        assert_eq!(summary.dropped_items, 2);
    }

    #[test]
    fn test_current_format_verbatim() {
        let payload = json!({
            "groups": [{
                "id": "g1",
                "name": "Reading",
                "createdAt": "2024-02-01T08:00:00.000Z",
                "tabs": [
                    {"id": "t1", "url": "https://a.com", "title": "A",
                     "favIconUrl": "https://a.com/i.png", "createdAt": "2024-02-01T08:00:00.000Z"},
                    {"title": "no url"}
                ]
            }],
            "searchQuery": "a"
        });
        let (state, summary) = normalize(&payload).unwrap();
        let group = &state.groups[0];
        assert_eq!(group.id, "g1");
        assert_eq!(group.name, "Reading");
        assert_eq!(group.items.len(), 1);
        assert_eq!(group.items[0].id, "t1");
        assert_eq!(group.items[0].icon_ref, "https://a.com/i.png");
        assert_eq!(state.search_query, "a");
        assert_eq!(summary.dropped_items, 1);
    }

    #[test]
    fn test_backup_wrapped_format() {
        let payload = json!({
            "timestamp": 1_700_000_000_000_i64,
            "state": {"groups": [{"name": "From backup", "tabs": ["https://c.org"]}]}
        });
        assert!(matches!(classify(&payload), Ok(ParsedPayload::BackupWrapped(_))));
        let (state, _) = normalize(&payload).unwrap();
        assert_eq!(state.groups[0].name, "From backup");
        // id synthesized
        assert!(!state.groups[0].id.is_empty());
        assert_eq!(state.groups[0].items[0].title, "c.org");
    }

    #[test]
    fn test_numeric_ids_and_missing_title() {
        let payload = json!({"groups": [{"id": 17, "tabs": [{"id": 5, "url": "https://d.net/x"}]}]});
        let (state, _) = normalize(&payload).unwrap();
        assert_eq!(state.groups[0].id, "17");
        assert_eq!(state.groups[0].name, UNTITLED_GROUP_NAME);
        assert_eq!(state.groups[0].items[0].id, "5");
        assert_eq!(state.groups[0].items[0].title, "d.net");
    }

    #[test]
    fn test_empty_groups_dropped() {
        let payload = json!({"groups": [
            {"name": "empty", "tabs": []},
            {"name": "bad items", "tabs": [{"url": ""}]},
            {"name": "keep", "tabs": ["https://e.com"]}
        ]});
        let (state, summary) = normalize(&payload).unwrap();
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].name, "keep");
        assert_eq!(summary.dropped_groups, 2);
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            normalize(&json!({"foo": 1})),
            Err(ImportError::UnsupportedFormat)
        ));
        assert!(matches!(normalize(&json!("https://a.com")), Err(ImportError::UnsupportedFormat)));
        assert!(matches!(
            normalize(&json!({"state": {"groups": "nope"}})),
            Err(ImportError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_no_valid_data() {
        assert!(matches!(
            normalize(&json!({"groups": [{"tabs": [{"title": "x"}]}]})),
            Err(ImportError::NoValidData)
        ));
        assert!(matches!(normalize(&json!([])), Err(ImportError::NoValidData)));
    }

    #[test]
    fn test_groups_take_priority_over_state() {
        let payload = json!({"groups": [{"tabs": ["https://a.com"]}], "state": {"groups": []}});
        assert!(matches!(classify(&payload), Ok(ParsedPayload::Current(_))));
    }
}

//! The application model: groups of saved items.
//!
//! Field names on the wire are camelCase and items serialize under `tabs`,
//! matching the stored index and every import format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Icon reference used when the captured page had none.
pub const DEFAULT_ICON_REF: &str = "default-favicon.png";

/// Name given to groups created without one.
pub const UNTITLED_GROUP_NAME: &str = "Untitled group";

/// Name of the catch-all group that single captures land in.
pub const UNGROUPED_NAME: &str = "Ungrouped";

fn default_icon_ref() -> String {
    DEFAULT_ICON_REF.to_string()
}

/// A saved page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(rename = "favIconUrl", default = "default_icon_ref")]
    pub icon_ref: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an item captured now, with a fresh id.
    pub fn new(url: impl Into<String>, title: impl Into<String>, icon_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            icon_ref: icon_ref
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_icon_ref),
            created_at: Utc::now(),
        }
    }

    /// Whether the item carries enough data to be worth persisting.
    ///
    /// Items with an empty url or title are skipped by the chunk planner.
    pub fn is_persistable(&self) -> bool {
        !self.url.is_empty() && !self.title.is_empty()
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.url.to_lowercase().contains(needle)
    }
}

/// A named, ordered collection of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(rename = "tabs")]
    pub items: Vec<Item>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Create an empty group created now. A blank name becomes
    /// [`UNTITLED_GROUP_NAME`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_items(name, Vec::new())
    }

    pub fn with_items(name: impl Into<String>, items: Vec<Item>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: if name.trim().is_empty() {
                UNTITLED_GROUP_NAME.to_string()
            } else {
                name
            },
            items,
            created_at: Utc::now(),
        }
    }
}

/// The complete in-memory model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub groups: Vec<Group>,
    #[serde(default)]
    pub search_query: String,
}

/// Headline counts for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total_groups: usize,
    pub total_items: usize,
    /// Items in groups created since local midnight.
    pub saved_today: usize,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn find_group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Insert a group at the front; the list is most-recent-first.
    pub fn add_group(&mut self, group: Group) {
        self.groups.insert(0, group);
    }

    /// Append items to the [`UNGROUPED_NAME`] group, creating it at the
    /// front of the list if it does not exist yet.
    pub fn save_to_ungrouped(&mut self, items: Vec<Item>) {
        match self.groups.iter_mut().find(|g| g.name == UNGROUPED_NAME) {
            Some(group) => group.items.extend(items),
            None => self.add_group(Group::with_items(UNGROUPED_NAME, items)),
        }
    }

    /// Remove a group. Returns false if no group has that id.
    pub fn delete_group(&mut self, group_id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != group_id);
        self.groups.len() != before
    }

    /// Remove one item. A group left empty is removed as well.
    pub fn delete_item(&mut self, group_id: &str, item_id: &str) -> bool {
        let Some(pos) = self.groups.iter().position(|g| g.id == group_id) else {
            return false;
        };
        let group = &mut self.groups[pos];
        let before = group.items.len();
        group.items.retain(|t| t.id != item_id);
        let removed = group.items.len() != before;
        if group.items.is_empty() {
            self.groups.remove(pos);
        }
        removed
    }

    /// Move an item to the end of another group. The source group is removed
    /// if the move empties it.
    pub fn move_item(&mut self, from_group: &str, item_id: &str, to_group: &str) -> bool {
        if from_group == to_group || self.find_group(to_group).is_none() {
            return false;
        }
        let Some(src) = self.groups.iter().position(|g| g.id == from_group) else {
            return false;
        };
        let Some(idx) = self.groups[src].items.iter().position(|t| t.id == item_id) else {
            return false;
        };
        let item = self.groups[src].items.remove(idx);
        if self.groups[src].items.is_empty() {
            self.groups.remove(src);
        }
        if let Some(dst) = self.groups.iter_mut().find(|g| g.id == to_group) {
            dst.items.push(item);
        }
        true
    }

    pub fn rename_group(&mut self, group_id: &str, name: &str) -> bool {
        match self.groups.iter_mut().find(|g| g.id == group_id) {
            Some(group) if !name.trim().is_empty() => {
                group.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Groups narrowed to items whose title or url contains the search
    /// query, case-insensitively. Groups without a match are dropped. An
    /// empty query returns every group.
    pub fn filtered_groups(&self) -> Vec<Group> {
        let needle = self.search_query.trim().to_lowercase();
        if needle.is_empty() {
            return self.groups.clone();
        }
        self.groups
            .iter()
            .filter_map(|g| {
                let items: Vec<Item> = g.items.iter().filter(|t| t.matches(&needle)).cloned().collect();
                (!items.is_empty()).then(|| Group {
                    items,
                    ..g.clone()
                })
            })
            .collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Stats {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        Stats {
            total_groups: self.groups.len(),
            total_items: self.total_items(),
            saved_today: self
                .groups
                .iter()
                .filter(|g| g.created_at >= midnight)
                .map(|g| g.items.len())
                .sum(),
        }
    }
}

/// Age bucket used when listing groups by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeBucket {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Earlier,
}

impl TimeBucket {
    fn for_age_days(days: i64) -> Self {
        match days {
            i64::MIN..=0 => TimeBucket::Today,
            1 => TimeBucket::Yesterday,
            2..=7 => TimeBucket::ThisWeek,
            8..=30 => TimeBucket::ThisMonth,
            _ => TimeBucket::Earlier,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeBucket::Today => "Today",
            TimeBucket::Yesterday => "Yesterday",
            TimeBucket::ThisWeek => "This week",
            TimeBucket::ThisMonth => "This month",
            TimeBucket::Earlier => "Earlier",
        }
    }
}

/// Bucket groups by age in whole days, newest bucket first. Empty buckets
/// are omitted and group order is preserved within a bucket.
pub fn group_by_time(groups: &[Group], now: DateTime<Utc>) -> Vec<(TimeBucket, Vec<&Group>)> {
    let mut buckets: Vec<(TimeBucket, Vec<&Group>)> = Vec::new();
    for group in groups {
        let bucket = TimeBucket::for_age_days((now - group.created_at).num_days());
        match buckets.iter_mut().find(|(b, _)| *b == bucket) {
            Some((_, members)) => members.push(group),
            None => buckets.push((bucket, vec![group])),
        }
    }
    buckets.sort_by_key(|(b, _)| *b);
    buckets
}

//! Chunk planning and index building.
//!
//! A group's items are split into byte-bounded chunks so each stored value
//! stays under the backend's per-key limit. Chunks from every group go into
//! one global list; the stored index replaces each group's items with
//! references into that list.
//!
//! ```text
//! mainIndex  { groups: [{ id, name, createdAt, tabs: [{chunkIndex: 0, count: 12},
//!                                                    {chunkIndex: 1, count: 4}] },
//!                       { ..., tabs: [{chunkIndex: 2, count: 9}] }],
//!              searchQuery }
//! chunk_0    [item, item, ...]
//! chunk_1    [...]
//! chunk_2    [...]
//! chunkCount 3
//! ```
//!
//! Chunk numbering is global, never per group.

use crate::model::{Item, StateSnapshot};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Reference from an index group to one stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRef {
    pub chunk_index: usize,
    pub count: usize,
}

/// A group as it appears in the stored index: header plus chunk references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexGroup {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub tabs: Vec<ChunkRef>,
}

/// The root value stored under `mainIndex`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageIndex {
    pub groups: Vec<IndexGroup>,
    pub search_query: String,
}

/// Output of [`plan_chunks`] for one group.
#[derive(Debug, Default)]
pub struct GroupPlan {
    /// Chunks in item order. Never empty chunks.
    pub chunks: Vec<Vec<Item>>,
    /// Items excluded because they are not persistable.
    pub skipped: usize,
    /// Chunks holding a single item that alone reaches the ceiling.
    pub oversize: usize,
}

/// A snapshot laid out for storage.
#[derive(Debug, Default)]
pub struct ChunkedState {
    pub index: StorageIndex,
    /// Global chunk list; `chunks[i]` is stored as `chunk_<i>`.
    pub chunks: Vec<Vec<Item>>,
    pub skipped_items: usize,
    pub oversize_chunks: usize,
}

/// Compact JSON length of an item.
fn item_size(item: &Item) -> Result<usize, serde_json::Error> {
    serde_json::to_vec(item).map(|v| v.len())
}

/// Split an item sequence into chunks whose serialized size is bounded by
/// `ceiling` bytes.
///
/// Items are appended greedily; the buffer is flushed once its serialized size
/// reaches the ceiling, and after the last item. An item that reaches the
/// ceiling on its own is flushed as a one-item chunk, which may exceed the
/// backend limit. Order is preserved and no persistable item is lost.
pub fn plan_chunks(items: &[Item], ceiling: usize) -> Result<GroupPlan, serde_json::Error> {
    let mut plan = GroupPlan::default();
    let valid: Vec<&Item> = items
        .iter()
        .filter(|item| {
            let keep = item.is_persistable();
            if !keep {
                plan.skipped += 1;
            }
            keep
        })
        .collect();

    let mut buffer: Vec<Item> = Vec::new();
    // Serialized size of `buffer` as a compact JSON array: brackets, items,
    // and one comma between neighbours.
    let mut buffer_size = 2;

    for (pos, item) in valid.iter().enumerate() {
        let size = item_size(item)?;
        let is_last = pos + 1 == valid.len();

        if size + 2 >= ceiling {
            if !buffer.is_empty() {
                plan.chunks.push(std::mem::take(&mut buffer));
                buffer_size = 2;
            }
            warn!(
                "item '{}' is {} bytes, at or over the chunk ceiling of {} bytes; storing it alone",
                item.id, size, ceiling
            );
            plan.oversize += 1;
            plan.chunks.push(vec![(*item).clone()]);
            continue;
        }

        if !buffer.is_empty() {
            buffer_size += 1;
        }
        buffer_size += size;
        buffer.push((*item).clone());

        if buffer_size >= ceiling || is_last {
            plan.chunks.push(std::mem::take(&mut buffer));
            buffer_size = 2;
        }
    }

    Ok(plan)
}

/// Lay out a whole snapshot: plan every group in order and number the chunks
/// globally, continuing from the chunks assigned to earlier groups.
pub fn build_index(snapshot: &StateSnapshot, ceiling: usize) -> Result<ChunkedState, serde_json::Error> {
    let mut out = ChunkedState {
        index: StorageIndex {
            groups: Vec::with_capacity(snapshot.groups.len()),
            search_query: snapshot.search_query.clone(),
        },
        ..ChunkedState::default()
    };

    for group in &snapshot.groups {
        let plan = plan_chunks(&group.items, ceiling)?;
        out.skipped_items += plan.skipped;
        out.oversize_chunks += plan.oversize;

        let mut refs = Vec::with_capacity(plan.chunks.len());
        for chunk in plan.chunks {
            refs.push(ChunkRef {
                chunk_index: out.chunks.len(),
                count: chunk.len(),
            });
            out.chunks.push(chunk);
        }

        out.index.groups.push(IndexGroup {
            id: group.id.clone(),
            name: group.name.clone(),
            created_at: group.created_at,
            tabs: refs,
        });
    }

    if out.skipped_items > 0 {
        warn!("skipped {} items with an empty url or title", out.skipped_items);
    }
    debug!(
        "planned {} chunks for {} groups (ceiling {} bytes)",
        out.chunks.len(),
        out.index.groups.len(),
        ceiling
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Group;

    fn item(n: usize) -> Item {
        Item::new(format!("https://example.com/{n}"), format!("Page {n}"), None)
    }

    fn size_of(items: &[Item]) -> usize {
        serde_json::to_vec(items).unwrap().len()
    }

    #[test]
    fn test_buffer_size_matches_serialized_size() {
        let items: Vec<Item> = (0..5).map(item).collect();
        let plan = plan_chunks(&items, usize::MAX).unwrap();
        assert_eq!(plan.chunks.len(), 1);
        let manual = 2 + items.iter().map(|t| item_size(t).unwrap()).sum::<usize>() + 4;
        assert_eq!(manual, size_of(&items));
    }

    #[test]
    fn test_four_items_two_chunks_reassemble() {
        let items: Vec<Item> = (0..4).map(item).collect();
        // ceiling reached exactly after the second item
        let ceiling = size_of(&items[..2]);
        let plan = plan_chunks(&items, ceiling).unwrap();
        assert_eq!(plan.chunks.len(), 2);
        let joined: Vec<Item> = plan.chunks.concat();
        assert_eq!(joined, items);
    }

    #[test]
    fn test_chunks_respect_ceiling_up_to_one_item() {
        let items: Vec<Item> = (0..50).map(item).collect();
        let ceiling = 600;
        let plan = plan_chunks(&items, ceiling).unwrap();
        let max_item = items.iter().map(|t| item_size(t).unwrap()).max().unwrap();
        for chunk in &plan.chunks {
            assert!(!chunk.is_empty());
            assert!(size_of(chunk) < ceiling + max_item + 1);
        }
        assert_eq!(plan.chunks.concat(), items);
    }

    #[test]
    fn test_invalid_items_skipped_and_last_valid_flushed() {
        let mut items: Vec<Item> = (0..3).map(item).collect();
        let mut bad = item(99);
        bad.title.clear();
        items.push(bad);
        let plan = plan_chunks(&items, usize::MAX).unwrap();
        assert_eq!(plan.skipped, 1);
        assert_eq!(plan.chunks.concat(), items[..3].to_vec());
    }

    #[test]
    fn test_oversize_item_gets_own_chunk() {
        let mut items: Vec<Item> = (0..2).map(item).collect();
        let mut huge = item(7);
        huge.title = "x".repeat(10_000);
        items.insert(1, huge.clone());
        let plan = plan_chunks(&items, 1000).unwrap();
        assert_eq!(plan.oversize, 1);
        assert_eq!(plan.chunks.len(), 3);
        assert_eq!(plan.chunks[1], vec![huge]);
        assert_eq!(plan.chunks.concat(), items);
    }

    #[test]
    fn test_single_oversize_item_alone() {
        let mut huge = item(1);
        huge.url = format!("https://example.com/{}", "a".repeat(9000));
        let plan = plan_chunks(std::slice::from_ref(&huge), 6000).unwrap();
        assert_eq!(plan.chunks, vec![vec![huge]]);
    }

    #[test]
    fn test_empty_group_has_no_chunks() {
        let plan = plan_chunks(&[], 100).unwrap();
        assert!(plan.chunks.is_empty());
    }

    #[test]
    fn test_build_index_numbers_chunks_globally() {
        let a: Vec<Item> = (0..4).map(item).collect();
        let b: Vec<Item> = (4..6).map(item).collect();
        let ceiling = size_of(&a[..2]);
        let snapshot = StateSnapshot {
            groups: vec![
                Group::with_items("a", a.clone()),
                Group::new("empty"),
                Group::with_items("b", b.clone()),
            ],
            search_query: "q".into(),
        };
        let chunked = build_index(&snapshot, ceiling).unwrap();
        let refs: Vec<Vec<usize>> = chunked
            .index
            .groups
            .iter()
            .map(|g| g.tabs.iter().map(|r| r.chunk_index).collect())
            .collect();
        assert_eq!(refs, vec![vec![0, 1], vec![], vec![2]]);
        assert_eq!(chunked.chunks.len(), 3);
        assert_eq!(chunked.index.search_query, "q");

        // refs resolve back to the original items
        let group_b = &chunked.index.groups[2];
        let resolved: Vec<Item> = group_b
            .tabs
            .iter()
            .flat_map(|r| chunked.chunks[r.chunk_index][..r.count].to_vec())
            .collect();
        assert_eq!(resolved, b);
        let total: usize = chunked.index.groups[0].tabs.iter().map(|r| r.count).sum();
        assert_eq!(total, a.len());
    }

    #[test]
    fn test_index_wire_format() {
        let snapshot = StateSnapshot {
            groups: vec![Group::with_items("a", vec![item(1)])],
            search_query: String::new(),
        };
        let chunked = build_index(&snapshot, 6000).unwrap();
        let v = serde_json::to_value(&chunked.index).unwrap();
        assert_eq!(v["groups"][0]["tabs"][0]["chunkIndex"], 0);
        assert_eq!(v["groups"][0]["tabs"][0]["count"], 1);
        assert!(v["groups"][0]["createdAt"].is_string());
        assert_eq!(v["searchQuery"], "");
    }
}

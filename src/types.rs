use serde::{Deserialize, Serialize};

/// Opaque catalogue item identifier (track id).
pub type ItemId = String;

/// One retrieved item with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: ItemId,
    pub similarity: f32,
}

impl ScoredItem {
    pub fn new(id: impl Into<ItemId>, similarity: f32) -> Self {
        Self {
            id: id.into(),
            similarity,
        }
    }
}

/// Ordered retrieval output: strictly non-increasing similarity, query
/// excluded, at most N entries (fewer only when the representation has
/// fewer than N+1 rows).
pub type RankedResult = Vec<ScoredItem>;

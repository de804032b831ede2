//! Serializable rank layouts for persisting and restoring order.

use crate::error::AllocatorResult;
use crate::id::{ObjectId, Rank};
use serde::{Deserialize, Serialize};

/// One object's rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub id: ObjectId,
    pub rank: Rank,
}

/// Every object's rank, bottom to top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankLayout {
    pub entries: Vec<LayoutEntry>,
}

impl RankLayout {
    /// Serialize the layout to JSON.
    pub fn to_json(&self) -> AllocatorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a layout from JSON.
    pub fn from_json(json: &str) -> AllocatorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the layout has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in stored order.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.entries.iter().map(|e| &e.id)
    }
}

impl<T: Into<ObjectId>> FromIterator<(T, Rank)> for RankLayout {
    fn from_iter<I: IntoIterator<Item = (T, Rank)>>(iter: I) -> Self {
        let mut entries: Vec<LayoutEntry> = iter
            .into_iter()
            .map(|(id, rank)| LayoutEntry { id: id.into(), rank })
            .collect();
        entries.sort_by_key(|e| e.rank);
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocatorError;

    #[test]
    fn test_from_iter_sorts_by_rank() {
        let layout: RankLayout = vec![("b", 300), ("a", 100)].into_iter().collect();
        let ids: Vec<&str> = layout.ids().map(ObjectId::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_json_shape() {
        let layout: RankLayout = vec![("note-1", 100)].into_iter().collect();
        assert_eq!(
            layout.to_json().unwrap(),
            r#"{"entries":[{"id":"note-1","rank":100}]}"#
        );
        assert_eq!(RankLayout::from_json(&layout.to_json().unwrap()).unwrap(), layout);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            RankLayout::from_json("{ nope"),
            Err(AllocatorError::Serialization(_))
        ));
    }
}

//! Ordered catalogues of named wheel positions.
//!
//! A [`PositionTable`] is the static description of one actuator axis: the
//! sequence of positions the wheel can park at, in mechanical order. Index 0
//! is the rest/default position. The table is immutable after construction and
//! has no failure modes beyond a name lookup missing.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Ordered, immutable list of unique position names for one axis.
///
/// Index 0 is the rest position the axis starts at. Lookup is linear; tables
/// are a handful of entries (filter and disperser wheels have 5-10 slots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTable {
    names: Vec<String>,
}

impl PositionTable {
    /// Build a table from an ordered list of position names.
    ///
    /// Fails with `InvalidArgument` if the list is empty or contains
    /// duplicate names.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(SimError::InvalidArgument(
                "position table must contain at least one position".to_string(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(SimError::InvalidArgument(format!(
                    "duplicate position name '{name}' in table"
                )));
            }
        }
        Ok(Self { names })
    }

    /// Convenience constructor from string slices.
    pub fn from_names(names: &[&str]) -> Result<Self> {
        Self::new(names.iter().map(|s| s.to_string()).collect())
    }

    /// Index of `name`, or `None` if the table has no such position.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name at `index`. Indices come from `index_of` or modular stepping, so
    /// they are always in range by construction.
    pub fn name_at(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Number of positions on the wheel.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if the table is empty (never the case after construction).
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the rest/default position.
    pub fn default_index(&self) -> usize {
        0
    }

    /// Iterate over position names in wheel order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let table = PositionTable::from_names(&["None", "g", "r", "i"]).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.index_of("r"), Some(2));
        assert_eq!(table.index_of("u"), None);
        assert_eq!(table.name_at(3), "i");
        assert_eq!(table.default_index(), 0);
        assert_eq!(table.name_at(table.default_index()), "None");
    }

    #[test]
    fn test_empty_rejected() {
        let err = PositionTable::new(vec![]).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument(_)));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = PositionTable::from_names(&["g", "r", "g"]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}

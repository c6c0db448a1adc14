use std::fmt;

use serde::{Deserialize, Serialize};

/// Sort direction of one index key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

impl IndexOrder {
    fn direction(&self) -> i8 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Definition of a secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, derived from the keys unless set explicitly.
    pub name: String,
    /// Indexed fields in key order.
    pub keys: Vec<(String, IndexOrder)>,
    /// Reject documents whose key tuple already exists.
    pub unique: bool,
}

impl IndexSpec {
    /// Non-unique index over the given keys.
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = (S, IndexOrder)>) -> Self {
        let keys: Vec<(String, IndexOrder)> =
            keys.into_iter().map(|(k, o)| (k.into(), o)).collect();
        let name = keys
            .iter()
            .map(|(field, order)| format!("{field}_{}", order.direction()))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            keys,
            unique: false,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Returns `true` if the index's leading keys are exactly `fields`.
    pub fn covers(&self, fields: &[&str]) -> bool {
        self.keys.len() >= fields.len()
            && self.keys.iter().zip(fields).all(|((k, _), f)| k == f)
    }

    /// Field names in key order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.unique {
            write!(f, " (unique)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_derived_from_keys() {
        let spec = IndexSpec::new([("files_id", IndexOrder::Ascending), ("n", IndexOrder::Ascending)]);
        assert_eq!(spec.name, "files_id_1_n_1");
        assert!(!spec.unique);

        let spec = IndexSpec::new([("createdAt", IndexOrder::Descending)]);
        assert_eq!(spec.name, "createdAt_-1");
    }

    #[test]
    fn covers_leading_keys() {
        let spec = IndexSpec::new([("files_id", IndexOrder::Ascending), ("n", IndexOrder::Ascending)])
            .unique(true);
        assert!(spec.covers(&["files_id", "n"]));
        assert!(spec.covers(&["files_id"]));
        assert!(!spec.covers(&["n"]));
        assert!(!spec.covers(&["files_id", "n", "x"]));
    }

    #[test]
    fn display_marks_unique() {
        let spec = IndexSpec::new([("a", IndexOrder::Ascending)]).unique(true);
        assert_eq!(spec.to_string(), "a_1 (unique)");
    }
}

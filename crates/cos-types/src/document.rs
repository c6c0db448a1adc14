use serde_json::Value;

use crate::id::FileId;

/// A schemaless document as held by the backing store.
pub type Document = serde_json::Map<String, Value>;

/// Well-known field names of metadata and chunk documents.
pub mod fields {
    /// Primary key of a metadata document.
    pub const ID: &str = "_id";
    /// Total byte length of the file.
    pub const LENGTH: &str = "length";
    /// Chunk size the file was written with.
    pub const CHUNK_SIZE: &str = "chunkSize";
    /// Hex content checksum.
    pub const CHECKSUM: &str = "checksum";
    /// RFC 3339 creation timestamp.
    pub const CREATED_AT: &str = "createdAt";
    /// Caller-visible lookup name.
    pub const FILENAME: &str = "filename";
    /// MIME type supplied by the caller.
    pub const CONTENT_TYPE: &str = "contentType";

    /// Owning file id of a chunk.
    pub const FILES_ID: &str = "files_id";
    /// Sequence number of a chunk.
    pub const N: &str = "n";

    /// Fields callers may never set through free-form metadata.
    pub const RESERVED: [&str; 5] = [ID, LENGTH, CHUNK_SIZE, CHECKSUM, CREATED_AT];

    /// Returns `true` if `key` is a reserved metadata field.
    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}

/// A single predicate on one field.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field equals any of the values.
    In(Vec<Value>),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Eq(Value::Null), None) => true,
            (Self::Eq(expected), Some(actual)) => expected == actual,
            (Self::In(options), Some(actual)) => options.contains(actual),
            (Self::In(options), None) => options.contains(&Value::Null),
            _ => false,
        }
    }
}

/// Selection criteria evaluated by the backing store.
///
/// All clauses must hold (logical AND). An empty filter matches every
/// document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    /// Filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching the metadata document of one file.
    pub fn by_id(id: &FileId) -> Self {
        Self::all().eq(fields::ID, id)
    }

    /// Filter matching any of the given files.
    pub fn by_ids<'a>(ids: impl IntoIterator<Item = &'a FileId>) -> Self {
        Self::all().is_in(fields::ID, ids)
    }

    /// Filter on the caller-visible file name.
    pub fn by_filename(name: impl Into<String>) -> Self {
        Self::all().eq(fields::FILENAME, name.into())
    }

    /// Add an equality clause.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Add a membership clause.
    pub fn is_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.into(), Condition::In(values)));
        self
    }

    /// Returns `true` if the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The clauses of this filter, in insertion order.
    pub fn clauses(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.clauses.iter().map(|(field, cond)| (field.as_str(), cond))
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, cond)| cond.matches(doc.get(field)))
    }
}

impl From<Document> for Filter {
    fn from(doc: Document) -> Self {
        Self {
            clauses: doc
                .into_iter()
                .map(|(field, value)| (field, Condition::Eq(value)))
                .collect(),
        }
    }
}

/// Restricts the fields returned by a query. `_id` is always kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    /// Project onto `_id` only.
    pub fn id_only() -> Self {
        Self::default()
    }

    /// Project onto `_id` plus the named fields.
    pub fn fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply the projection to a document.
    pub fn apply(&self, doc: &Document) -> Document {
        doc.iter()
            .filter(|(key, _)| key.as_str() == fields::ID || self.fields.iter().any(|f| f == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

//! Versioned document as seen through a store adapter

use super::{Controller, Coordinate, DocumentId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object content of a document version
pub type Content = Map<String, Value>;

/// Immutable metadata fixed when a document is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub controller: Controller,
    pub family: String,
    pub tags: Vec<String>,
    /// Whether the creator asked the store to pin this document
    pub pinned: bool,
}

impl Metadata {
    pub fn from_coordinate(coordinate: &Coordinate, pinned: bool) -> Self {
        Metadata {
            controller: coordinate.controller.clone(),
            family: coordinate.family.clone(),
            tags: coordinate.tags.clone(),
            pinned,
        }
    }
}

/// One version of a document
///
/// `version_count` is the number of updates applied since creation, so a
/// freshly created document is at version 0.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub metadata: Metadata,
    pub content: Content,
    pub version_count: u64,
}

impl Document {
    /// A brand-new document at version 0
    pub fn genesis(id: DocumentId, metadata: Metadata, content: Content) -> Self {
        Document {
            id,
            metadata,
            content,
            version_count: 0,
        }
    }

    /// Whether no content was ever written
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    pub fn controller(&self) -> &Controller {
        &self.metadata.controller
    }

    /// The next version, with `patch` fields replacing same-named fields
    /// and every other field carried over
    pub fn next_version(&self, patch: Content) -> Document {
        let mut content = self.content.clone();
        for (key, value) in patch {
            content.insert(key, value);
        }
        Document {
            id: self.id,
            metadata: self.metadata.clone(),
            content,
            version_count: self.version_count + 1,
        }
    }
}

/// Build a [`Content`] from `key => value` pairs
#[macro_export]
macro_rules! content {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::model::Content::new();
        $( map.insert(($key).to_string(), ::serde_json::json!($value)); )*
        map
    }};
}

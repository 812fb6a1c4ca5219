//! Tree node model: root descriptors and fragments

use super::{Content, Controller, Document, DocumentId, FragmentCoordinate};
use crate::{Error, Result};
use serde_json::Value;

pub(crate) const MAX_DEPTH_FIELD: &str = "maxDepth";
pub(crate) const MAX_FRAGMENTS_FIELD: &str = "maxFragments";
pub(crate) const CURRENT_FRAGMENT_FIELD: &str = "currentFragment";
pub(crate) const VALUE_FIELD: &str = "value";

/// Deepest tree a variable may ask for. Every fragment on a walk is one store
/// round trip, and positional indices leave `u64` well before this with any
/// fanout above one.
pub const MAX_TREE_DEPTH: u32 = 64;

/// Shape parameters of one variable's tree, stored as the root document's content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootDescriptor {
    pub id: DocumentId,
    /// Depth of the leaves; internal fragments live at `0..max_depth`
    pub max_depth: u32,
    /// Version budget of a leaf and fanout of every non-root internal fragment
    pub max_fragments: u64,
    pub controller: Controller,
}

impl RootDescriptor {
    /// Content written to a root document when it is initialized
    pub fn content(max_depth: u32, max_fragments: u64) -> Content {
        crate::content! {
            MAX_DEPTH_FIELD => max_depth,
            MAX_FRAGMENTS_FIELD => max_fragments,
        }
    }

    /// Read the descriptor out of a root document
    pub fn from_document(doc: &Document) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDescriptor {
            root: doc.id,
            reason: reason.to_string(),
        };

        if doc.is_empty() {
            return Err(invalid("root document was never initialized"));
        }
        let max_depth = doc
            .field(MAX_DEPTH_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("missing or non-integer maxDepth"))?;
        let max_fragments = doc
            .field(MAX_FRAGMENTS_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("missing or non-integer maxFragments"))?;
        if max_depth == 0 {
            return Err(invalid("maxDepth must be at least 1"));
        }
        if max_fragments == 0 {
            return Err(invalid("maxFragments must be at least 1"));
        }
        let max_depth = u32::try_from(max_depth)
            .ok()
            .filter(|depth| *depth <= MAX_TREE_DEPTH)
            .ok_or_else(|| invalid("maxDepth out of range"))?;

        Ok(RootDescriptor {
            id: doc.id,
            max_depth,
            max_fragments,
            controller: doc.controller().clone(),
        })
    }

    /// Coordinate of the depth-0 fragment
    pub fn head(&self) -> FragmentCoordinate {
        FragmentCoordinate::head(self.id, self.controller.clone())
    }

    pub fn is_leaf_depth(&self, depth: u32) -> bool {
        depth == self.max_depth
    }

    /// Coordinate of the child that `pointer` selects under `parent`.
    ///
    /// Sibling indices are positional: `parent.index * max_fragments + pointer`.
    /// A fragment's index is therefore the counter value of every digit above
    /// it, and no two paths through the tree share a coordinate.
    pub fn child(&self, parent: &FragmentCoordinate, pointer: u64) -> Result<FragmentCoordinate> {
        let index = parent
            .index
            .checked_mul(self.max_fragments)
            .and_then(|base| base.checked_add(pointer))
            .ok_or(Error::CapacityExhausted { root: self.id })?;
        Ok(parent.child(index))
    }
}

/// Decoded content of a fragment
#[derive(Clone, Debug, PartialEq)]
pub enum FragmentContent {
    /// Nothing written yet
    Empty,
    /// Internal fragment pointing at its active child
    Route { current_fragment: u64 },
    /// Leaf holding the user value
    Value(Value),
}

/// A fragment document together with its position in the tree
#[derive(Clone, Debug)]
pub struct Fragment {
    pub coordinate: FragmentCoordinate,
    pub document: Document,
}

impl Fragment {
    pub fn new(coordinate: FragmentCoordinate, document: Document) -> Self {
        Fragment {
            coordinate,
            document,
        }
    }

    pub fn depth(&self) -> u32 {
        self.coordinate.depth
    }

    pub fn version_count(&self) -> u64 {
        self.document.version_count
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Interpret the content according to where the fragment sits in the tree
    pub fn decode(&self, descriptor: &RootDescriptor) -> Result<FragmentContent> {
        if self.document.is_empty() {
            return Ok(FragmentContent::Empty);
        }

        if descriptor.is_leaf_depth(self.depth()) {
            return Ok(match self.document.field(VALUE_FIELD) {
                Some(value) => FragmentContent::Value(value.clone()),
                None => FragmentContent::Empty,
            });
        }

        let current_fragment = self
            .document
            .field(CURRENT_FRAGMENT_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "Internal fragment {} has no integer currentFragment",
                    self.coordinate
                ))
            })?;
        Ok(FragmentContent::Route { current_fragment })
    }

    /// Active child pointer, if this is an initialized internal fragment
    pub fn current_fragment(&self) -> Option<u64> {
        self.document
            .field(CURRENT_FRAGMENT_FIELD)
            .and_then(Value::as_u64)
    }
}

/// Content of an internal fragment pointing at `index`
pub fn route_content(index: u64) -> Content {
    crate::content! { CURRENT_FRAGMENT_FIELD => index }
}

/// Content of a leaf holding `value`
pub fn value_content(value: Value) -> Content {
    let mut content = Content::new();
    content.insert(VALUE_FIELD.to_string(), value);
    content
}

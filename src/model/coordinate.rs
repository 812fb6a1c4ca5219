//! Deterministic coordinates
//!
//! A coordinate is the fixed metadata tuple a document is looked up by:
//! a family, a controller, and an ordered tag list. Its identity is a pure
//! function of those fields, so any two parties agreeing on them resolve the
//! same document without a registry.

use super::DocumentId;
use serde::{Deserialize, Serialize};

/// Family tag for variable root documents
pub const ROOT_FAMILY: &str = "PublicVariable";

/// Family tag for tree fragments
pub const FRAGMENT_FAMILY: &str = "PublicVariableFragment";

/// An identity allowed to sign updates (e.g. a DID string)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Controller(pub String);

impl Controller {
    pub fn new(id: impl Into<String>) -> Self {
        Controller(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Controller {
    fn from(s: &str) -> Self {
        Controller(s.to_string())
    }
}

impl From<String> for Controller {
    fn from(s: String) -> Self {
        Controller(s)
    }
}

impl From<&Controller> for Controller {
    fn from(c: &Controller) -> Self {
        c.clone()
    }
}

/// Lookup metadata for a deterministic document
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub family: String,
    pub controller: Controller,
    pub tags: Vec<String>,
}

impl Coordinate {
    pub fn new(family: impl Into<String>, controller: Controller, tags: Vec<String>) -> Self {
        Coordinate {
            family: family.into(),
            controller,
            tags,
        }
    }

    /// The identity of the document living at this coordinate
    pub fn id(&self) -> DocumentId {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(self.tags.len() + 2);
        parts.push(self.family.as_bytes());
        parts.push(self.controller.0.as_bytes());
        for tag in &self.tags {
            parts.push(tag.as_bytes());
        }
        DocumentId::derive(&parts)
    }
}

/// Position of one fragment inside a variable's tree
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentCoordinate {
    pub root: DocumentId,
    pub controller: Controller,
    pub depth: u32,
    pub index: u64,
}

impl FragmentCoordinate {
    pub fn new(root: DocumentId, controller: Controller, depth: u32, index: u64) -> Self {
        FragmentCoordinate {
            root,
            controller,
            depth,
            index,
        }
    }

    /// The depth-0 fragment every walk starts from
    pub fn head(root: DocumentId, controller: Controller) -> Self {
        Self::new(root, controller, 0, 0)
    }

    /// The fragment one level down at `index`
    pub fn child(&self, index: u64) -> Self {
        Self::new(self.root, self.controller.clone(), self.depth + 1, index)
    }

    pub fn to_coordinate(&self) -> Coordinate {
        fragment_key(&self.root, &self.controller, self.depth, self.index)
    }
}

impl std::fmt::Display for FragmentCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/d{}/i{}",
            self.root.short(),
            self.depth,
            self.index
        )
    }
}

/// Coordinate of the root document of the variable called `name`
pub fn root_key(name: &str, controller: &Controller) -> Coordinate {
    Coordinate::new(ROOT_FAMILY, controller.clone(), vec![name.to_string()])
}

/// Coordinate of the fragment at `(depth, index)` under `root`
pub fn fragment_key(root: &DocumentId, controller: &Controller, depth: u32, index: u64) -> Coordinate {
    Coordinate::new(
        FRAGMENT_FAMILY,
        controller.clone(),
        vec![root.to_hex(), depth.to_string(), index.to_string()],
    )
}

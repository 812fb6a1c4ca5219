//! Bounded-fanout version tree
//!
//! A variable's value lives in a leaf at depth `max_depth`. Every fragment
//! above it routes to its active child through `currentFragment`. A leaf may
//! take at most `max_fragments` updates; after that the allocator advances
//! the nearest ancestor with room and grows a fresh zero-indexed subtree
//! under it, much like incrementing a mixed-radix counter with carry.
//!
//! The depth-0 fragment is exempt from the fanout cap, so the tree never
//! runs out of room. Its pointer is the unbounded most significant digit.
//!
//! No fragment holds a pointer to another document: every edge is recomputed
//! from `(root, controller, depth, index)` through the coordinate scheme.

mod allocator;
mod traversal;

pub use allocator::find_branch_point;
pub use traversal::resolve_root;

use crate::model::{Fragment, FragmentCoordinate, RootDescriptor};
use crate::store::{CreateOpts, DocumentStore};
use serde::Serialize;

/// What a write-path walk does when it meets an empty internal fragment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepairPolicy {
    /// Initialize the fragment (and everything below it) and carry on
    #[default]
    Materialize,
    /// Fail with `Error::MissingFragment`
    Strict,
}

/// Result of walking from the head fragment to the active leaf
#[derive(Clone, Debug)]
pub struct Walk {
    pub leaf: Fragment,
    /// Internal fragments visited, root first
    pub history: Vec<Fragment>,
}

/// One fragment on the active path, as reported by [`VersionTree::snapshot`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    pub depth: u32,
    pub index: u64,
    pub id: String,
    pub current_fragment: Option<u64>,
    pub version_count: u64,
    pub empty: bool,
}

/// The active path of a tree, root first
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub root: String,
    pub max_depth: u32,
    pub max_fragments: u64,
    pub path: Vec<PathEntry>,
}

/// Read/write access to one variable's fragment tree
pub struct VersionTree<'a> {
    store: &'a dyn DocumentStore,
    descriptor: &'a RootDescriptor,
    opts: &'a CreateOpts,
}

impl<'a> VersionTree<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        descriptor: &'a RootDescriptor,
        opts: &'a CreateOpts,
    ) -> Self {
        VersionTree {
            store,
            descriptor,
            opts,
        }
    }

    /// Get-or-create the fragment at `coordinate`
    pub async fn fetch(&self, coordinate: &FragmentCoordinate) -> crate::Result<Fragment> {
        let document = self
            .store
            .resolve_deterministic(&coordinate.to_coordinate(), self.opts)
            .await?;
        Ok(Fragment::new(coordinate.clone(), document))
    }
}

//! Branch allocation: keeps every write on a leaf with spare versions

use super::{RepairPolicy, VersionTree, Walk};
use crate::model::{route_content, Fragment, FragmentCoordinate};
use crate::{Error, Result};
use futures_util::future::try_join_all;
use tracing::{debug, warn};

/// Index into `history` of the deepest ancestor that can take another child.
///
/// An ancestor with pointer `c` has room while `c + 1 < max_fragments`. The
/// depth-0 fragment always has room.
pub fn find_branch_point(history: &[Fragment], max_fragments: u64) -> Option<usize> {
    history.iter().rposition(|fragment| {
        fragment.depth() == 0
            || fragment
                .current_fragment()
                .is_some_and(|current| current + 1 < max_fragments)
    })
}

impl<'a> VersionTree<'a> {
    /// Return a leaf that can take one more version, allocating a new branch
    /// when the active leaf is full
    pub async fn writable_leaf(&self, repair: RepairPolicy) -> Result<Fragment> {
        let max_fragments = self.descriptor.max_fragments;
        loop {
            let walk = self.walk_to_leaf(repair).await?;
            if walk.leaf.version_count() < max_fragments {
                return Ok(walk.leaf);
            }

            let leaf = self.allocate(walk).await?;
            if leaf.version_count() < max_fragments {
                return Ok(leaf);
            }
            // Only reachable when an earlier allocation was interrupted after
            // the new leaf had already been written to
            warn!(
                coordinate = %leaf.coordinate,
                versions = leaf.version_count(),
                "freshly allocated leaf is already full, allocating again"
            );
        }
    }

    /// Carry: advance the deepest ancestor with room and grow a fresh
    /// subtree beneath it. Returns the new leaf.
    pub async fn allocate(&self, walk: Walk) -> Result<Fragment> {
        let Walk { leaf, history } = walk;
        let position = find_branch_point(&history, self.descriptor.max_fragments).ok_or(
            Error::CapacityExhausted {
                root: self.descriptor.id,
            },
        )?;
        let branch = &history[position];
        let current = branch.current_fragment().ok_or_else(|| Error::MissingFragment {
            coordinate: branch.coordinate.clone(),
        })?;
        let next = current + 1;

        self.store
            .update(&branch.document.id, route_content(next))
            .await?;
        debug!(
            root = %self.descriptor.id.short(),
            branch_depth = branch.depth(),
            from = current,
            to = next,
            full_leaf = %leaf.coordinate,
            "advanced branch pointer"
        );

        let start = self.descriptor.child(&branch.coordinate, next)?;
        self.materialize_chain(start).await
    }

    /// Create the fragments from `start` down to leaf depth.
    ///
    /// `start` keeps its own index; everything below it is pointer 0. Internal
    /// fragments that are still empty get `currentFragment = 0`; fragments
    /// that already carry content are left alone, so re-running this over a
    /// partially built chain only fills in what is missing.
    pub async fn materialize_chain(&self, start: FragmentCoordinate) -> Result<Fragment> {
        let max_depth = self.descriptor.max_depth;
        let mut coordinates = Vec::with_capacity(max_depth.saturating_sub(start.depth) as usize + 1);
        let mut coordinate = start;
        loop {
            let at_leaf = coordinate.depth >= max_depth;
            coordinates.push(coordinate.clone());
            if at_leaf {
                break;
            }
            coordinate = self.descriptor.child(&coordinate, 0)?;
        }

        // Disjoint coordinates, so creation can run concurrently
        let mut fragments = try_join_all(coordinates.iter().map(|c| self.fetch(c))).await?;
        let leaf = fragments
            .pop()
            .ok_or_else(|| Error::Corruption("empty fragment chain".into()))?;

        let pending: Vec<_> = fragments
            .iter()
            .filter(|fragment| fragment.is_empty())
            .map(|fragment| self.store.update(&fragment.document.id, route_content(0)))
            .collect();
        let initialized = try_join_all(pending).await?.len();

        debug!(
            root = %self.descriptor.id.short(),
            leaf = %leaf.coordinate,
            created = coordinates.len(),
            initialized,
            "materialized fragment chain"
        );
        Ok(leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{root_key, value_content, Controller, RootDescriptor};
    use crate::store::{CreateOpts, DocumentStore, MemoryStore};
    use serde_json::json;

    async fn descriptor(store: &MemoryStore, max_depth: u32, max_fragments: u64) -> RootDescriptor {
        let root = store
            .create_new(
                RootDescriptor::content(max_depth, max_fragments),
                &root_key("alloc", &Controller::new("did:key:alloc")),
                &CreateOpts::local(),
            )
            .await
            .unwrap();
        RootDescriptor::from_document(&root).unwrap()
    }

    async fn route(tree: &VersionTree<'_>, coordinate: FragmentCoordinate, pointer: u64) -> Fragment {
        let fragment = tree.fetch(&coordinate).await.unwrap();
        let document = tree
            .store
            .update(&fragment.document.id, route_content(pointer))
            .await
            .unwrap();
        Fragment::new(coordinate, document)
    }

    #[tokio::test]
    async fn test_branch_point_prefers_deepest_with_room() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 3, 3).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        let head = route(&tree, d.head(), 0).await;
        let mid = route(&tree, d.head().child(0), 1).await;
        let low = route(&tree, d.head().child(0).child(1), 2).await;

        // low is at 2 (2 + 1 == 3, full), mid at 1 has room
        let history = vec![head.clone(), mid.clone(), low.clone()];
        assert_eq!(find_branch_point(&history, 3), Some(1));

        // everything below the root full: the root is always eligible
        let full_mid = route(&tree, d.head().child(0), 2).await;
        let history = vec![head, full_mid, low];
        assert_eq!(find_branch_point(&history, 3), Some(0));

        assert_eq!(find_branch_point(&[], 3), None);
    }

    #[tokio::test]
    async fn test_root_is_exempt_from_fanout_cap() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 1, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        let head = route(&tree, d.head(), 40).await;
        assert_eq!(find_branch_point(&[head], 2), Some(0));
    }

    #[tokio::test]
    async fn test_allocate_without_history_fails() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 1, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        let leaf = tree.fetch(&d.head().child(0)).await.unwrap();
        let err = tree
            .allocate(Walk {
                leaf,
                history: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { .. }));
    }

    #[tokio::test]
    async fn test_allocate_resets_lower_digits() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 3, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        tree.materialize_chain(d.head()).await.unwrap();
        let pointers = |walk: &Walk| -> Vec<Option<u64>> {
            walk.history.iter().map(|f| f.current_fragment()).collect()
        };

        // depth 2 has room: its pointer moves 0 -> 1
        let walk = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        let leaf = tree.allocate(walk).await.unwrap();
        assert_eq!((leaf.coordinate.depth, leaf.coordinate.index), (3, 1));
        let walk = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(pointers(&walk), vec![Some(0), Some(0), Some(1)]);
        assert_eq!(walk.leaf.document.id, leaf.document.id);

        // depth 2 full: carry into depth 1 and start a fresh depth-2 node
        let leaf = tree.allocate(walk).await.unwrap();
        assert_eq!(leaf.coordinate.index, 2);
        let walk = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(pointers(&walk), vec![Some(0), Some(1), Some(0)]);
        assert_eq!(walk.history[2].coordinate.index, 1);
        assert_eq!(walk.history[2].version_count(), 1);

        // one more inside the new node, then a carry all the way to the root
        tree.allocate(walk).await.unwrap();
        let walk = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(walk.leaf.coordinate.index, 3);
        let leaf = tree.allocate(walk).await.unwrap();
        assert_eq!(leaf.coordinate.index, 4);
        let walk = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(pointers(&walk), vec![Some(1), Some(0), Some(0)]);
        let indices: Vec<u64> = walk.history.iter().map(|f| f.coordinate.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_materialize_chain_is_idempotent() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 2, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        let first = tree.materialize_chain(d.head()).await.unwrap();
        let versions = store.version_total();
        let second = tree.materialize_chain(d.head()).await.unwrap();

        assert_eq!(first.document.id, second.document.id);
        assert_eq!(store.version_total(), versions);
    }

    #[tokio::test]
    async fn test_materialize_chain_from_leaf_depth() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 2, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        let start = d.head().child(0).child(3);
        let leaf = tree.materialize_chain(start.clone()).await.unwrap();
        assert_eq!(leaf.coordinate, start);
        assert!(leaf.is_empty());
        // root plus the single leaf, no ancestors touched
        assert_eq!(store.document_count(), 2);
    }

    #[tokio::test]
    async fn test_writable_leaf_skips_prefilled_leaf() {
        let store = MemoryStore::new();
        let d = descriptor(&store, 1, 1).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &d, &opts);

        tree.materialize_chain(d.head()).await.unwrap();
        // Fill the current leaf and the one the next carry would land on
        for index in 0..2 {
            let leaf = tree.fetch(&d.head().child(index)).await.unwrap();
            store
                .update(&leaf.document.id, value_content(json!(index)))
                .await
                .unwrap();
        }

        let leaf = tree.writable_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(leaf.coordinate.index, 2);
        assert_eq!(leaf.version_count(), 0);
    }
}

//! Root-to-leaf walks

use super::{PathEntry, RepairPolicy, TreeSnapshot, VersionTree, Walk};
use crate::model::{
    root_key, route_content, Controller, Document, Fragment, FragmentContent, FragmentCoordinate,
};
use crate::store::{CreateOpts, DocumentStore};
use crate::{Error, Result};
use serde_json::Value;
use tracing::{trace, warn};

/// Get-or-create the root document of the variable called `name`
pub async fn resolve_root(
    store: &dyn DocumentStore,
    name: &str,
    controller: &Controller,
    opts: &CreateOpts,
) -> Result<Document> {
    store
        .resolve_deterministic(&root_key(name, controller), opts)
        .await
}

impl<'a> VersionTree<'a> {
    /// Look up the fragment at `coordinate` without creating it
    pub async fn peek(&self, coordinate: &FragmentCoordinate) -> Result<Option<Fragment>> {
        match self.store.load(&coordinate.to_coordinate().id()).await {
            Ok(document) => Ok(Some(Fragment::new(coordinate.clone(), document))),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow the routing pointers down to the active leaf and return its value.
    ///
    /// Any empty or absent fragment on the way reads as "no value".
    pub async fn read_value(&self) -> Result<Option<Value>> {
        let mut coordinate = self.descriptor.head();

        loop {
            let Some(fragment) = self.peek(&coordinate).await? else {
                return Ok(None);
            };
            match fragment.decode(self.descriptor)? {
                FragmentContent::Empty => return Ok(None),
                FragmentContent::Value(value) => return Ok(Some(value)),
                FragmentContent::Route { current_fragment } => {
                    trace!(%coordinate, current_fragment, "following route");
                    coordinate = self.descriptor.child(&coordinate, current_fragment)?;
                }
            }
        }
    }

    /// Walk to the active leaf, recording every internal fragment on the way
    pub async fn walk_to_leaf(&self, repair: RepairPolicy) -> Result<Walk> {
        let mut coordinate = self.descriptor.head();
        let mut history = Vec::with_capacity(self.descriptor.max_depth as usize);

        loop {
            let mut fragment = self.fetch(&coordinate).await?;
            if self.descriptor.is_leaf_depth(fragment.depth()) {
                return Ok(Walk {
                    leaf: fragment,
                    history,
                });
            }

            let current_fragment = match fragment.decode(self.descriptor)? {
                FragmentContent::Route { current_fragment } => current_fragment,
                FragmentContent::Empty if repair == RepairPolicy::Materialize => {
                    warn!(%coordinate, "materializing empty fragment on active path");
                    fragment.document = self
                        .store
                        .update(&fragment.document.id, route_content(0))
                        .await?;
                    0
                }
                _ => return Err(Error::MissingFragment { coordinate }),
            };

            history.push(fragment);
            coordinate = self.descriptor.child(&coordinate, current_fragment)?;
        }
    }

    /// Describe the active path without creating or repairing anything
    pub async fn snapshot(&self) -> Result<TreeSnapshot> {
        let mut path = Vec::new();
        let mut coordinate = Some(self.descriptor.head());

        while let Some(current) = coordinate.take() {
            let id = current.to_coordinate().id();
            let Some(fragment) = self.peek(&current).await? else {
                path.push(PathEntry {
                    depth: current.depth,
                    index: current.index,
                    id: id.to_hex(),
                    current_fragment: None,
                    version_count: 0,
                    empty: true,
                });
                break;
            };

            let pointer = if self.descriptor.is_leaf_depth(current.depth) {
                None
            } else {
                fragment.current_fragment()
            };
            path.push(PathEntry {
                depth: current.depth,
                index: current.index,
                id: id.to_hex(),
                current_fragment: pointer,
                version_count: fragment.version_count(),
                empty: fragment.is_empty(),
            });
            coordinate = match pointer {
                Some(pointer) => Some(self.descriptor.child(&current, pointer)?),
                None => None,
            };
        }

        Ok(TreeSnapshot {
            root: self.descriptor.id.to_hex(),
            max_depth: self.descriptor.max_depth,
            max_fragments: self.descriptor.max_fragments,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{value_content, RootDescriptor};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn setup(store: &MemoryStore, max_depth: u32) -> RootDescriptor {
        let controller = Controller::new("did:key:walker");
        let root = store
            .create_new(
                RootDescriptor::content(max_depth, 2),
                &root_key("walk", &controller),
                &CreateOpts::local(),
            )
            .await
            .unwrap();
        RootDescriptor::from_document(&root).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_root_is_deterministic() {
        let store = MemoryStore::new();
        let controller = Controller::new("did:key:walker");
        let a = resolve_root(&store, "x", &controller, &CreateOpts::local())
            .await
            .unwrap();
        let b = resolve_root(&store, "x", &controller, &CreateOpts::local())
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.is_empty());
    }

    #[tokio::test]
    async fn test_read_value_on_untouched_tree_has_no_side_effects() {
        let store = MemoryStore::new();
        let descriptor = setup(&store, 3).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &descriptor, &opts);

        let before = store.document_count();
        assert_eq!(tree.read_value().await.unwrap(), None);
        assert_eq!(store.document_count(), before);
    }

    #[tokio::test]
    async fn test_walk_strict_reports_missing_fragment() {
        let store = MemoryStore::new();
        let descriptor = setup(&store, 2).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &descriptor, &opts);

        let err = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap_err();
        match err {
            Error::MissingFragment { coordinate } => {
                assert_eq!(coordinate.depth, 0);
                assert_eq!(coordinate.index, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_walk_materializes_and_collects_history() {
        let store = MemoryStore::new();
        let descriptor = setup(&store, 3).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &descriptor, &opts);

        let walk = tree.walk_to_leaf(RepairPolicy::Materialize).await.unwrap();
        assert_eq!(walk.leaf.depth(), 3);
        assert_eq!(walk.leaf.version_count(), 0);
        let depths: Vec<u32> = walk.history.iter().map(Fragment::depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert!(walk.history.iter().all(|f| f.current_fragment() == Some(0)));

        // A second walk finds the same path without touching it again
        let again = tree.walk_to_leaf(RepairPolicy::Strict).await.unwrap();
        assert_eq!(again.leaf.document.id, walk.leaf.document.id);
        assert!(again.history.iter().all(|f| f.version_count() == 1));
    }

    #[tokio::test]
    async fn test_read_value_follows_pointers() {
        let store = MemoryStore::new();
        let descriptor = setup(&store, 1).await;
        let opts = CreateOpts::local();
        let tree = VersionTree::new(&store, &descriptor, &opts);

        let head = tree.fetch(&descriptor.head()).await.unwrap();
        store.update(&head.document.id, route_content(1)).await.unwrap();
        let leaf = tree.fetch(&descriptor.head().child(1)).await.unwrap();
        store
            .update(&leaf.document.id, value_content(json!("routed")))
            .await
            .unwrap();

        assert_eq!(tree.read_value().await.unwrap(), Some(json!("routed")));

        let snapshot = tree.snapshot().await.unwrap();
        assert_eq!(snapshot.path.len(), 2);
        assert_eq!(snapshot.path[0].current_fragment, Some(1));
        assert_eq!(snapshot.path[1].index, 1);
        assert_eq!(snapshot.path[1].version_count, 1);
    }
}

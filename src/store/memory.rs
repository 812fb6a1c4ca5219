//! In-process document store

use super::{CreateOpts, DocumentStore};
use crate::model::{Content, Coordinate, Document, DocumentId, Metadata};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Keeps every version of every document in memory
#[derive(Default)]
pub struct MemoryStore {
    /// Document id → versions, oldest first
    documents: RwLock<HashMap<DocumentId, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct documents
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Total number of stored versions across all documents
    pub fn version_total(&self) -> usize {
        self.documents.read().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn resolve_deterministic(
        &self,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        let id = coordinate.id();
        let mut documents = self.documents.write();
        let versions = documents.entry(id).or_insert_with(|| {
            vec![Document::genesis(
                id,
                Metadata::from_coordinate(coordinate, opts.pin),
                Content::new(),
            )]
        });
        latest(&id, versions)
    }

    async fn create_new(
        &self,
        content: Content,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        let id = DocumentId::mint(coordinate.id().as_bytes());
        let doc = Document::genesis(id, Metadata::from_coordinate(coordinate, opts.pin), content);
        self.documents.write().insert(id, vec![doc.clone()]);
        Ok(doc)
    }

    async fn load(&self, id: &DocumentId) -> Result<Document> {
        let documents = self.documents.read();
        let versions = documents
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_hex()))?;
        latest(id, versions)
    }

    async fn update(&self, id: &DocumentId, patch: Content) -> Result<Document> {
        let mut documents = self.documents.write();
        let versions = documents
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_hex()))?;
        let next = latest(id, versions)?.next_version(patch);
        versions.push(next.clone());
        Ok(next)
    }

    async fn versions(&self, id: &DocumentId) -> Result<Vec<Document>> {
        let documents = self.documents.read();
        documents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_hex()))
    }
}

fn latest(id: &DocumentId, versions: &[Document]) -> Result<Document> {
    versions
        .last()
        .cloned()
        .ok_or_else(|| Error::Corruption(format!("Document {} has no versions", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content;
    use crate::model::Controller;
    use serde_json::json;

    fn coordinate(tag: &str) -> Coordinate {
        Coordinate::new("test", Controller::new("me"), vec![tag.to_string()])
    }

    #[tokio::test]
    async fn test_resolve_deterministic_is_idempotent() {
        let store = MemoryStore::new();
        let a = store
            .resolve_deterministic(&coordinate("x"), &CreateOpts::local())
            .await
            .unwrap();
        store.update(&a.id, content! { "n" => 1 }).await.unwrap();
        let b = store
            .resolve_deterministic(&coordinate("x"), &CreateOpts::local())
            .await
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.version_count, 1);
        assert_eq!(b.field("n"), Some(&json!(1)));
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn test_create_new_always_mints() {
        let store = MemoryStore::new();
        let opts = CreateOpts::local().pinned();
        let a = store
            .create_new(content! { "k" => "v" }, &coordinate("x"), &opts)
            .await
            .unwrap();
        let b = store
            .create_new(content! { "k" => "v" }, &coordinate("x"), &opts)
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.metadata.pinned);
        assert_eq!(a.version_count, 0);
        assert_eq!(store.document_count(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_history() {
        let store = MemoryStore::new();
        let doc = store
            .resolve_deterministic(&coordinate("h"), &CreateOpts::local())
            .await
            .unwrap();
        store.update(&doc.id, content! { "v" => "a" }).await.unwrap();
        store.update(&doc.id, content! { "v" => "b" }).await.unwrap();

        let versions = store.versions(&doc.id).await.unwrap();
        assert_eq!(versions.len(), 3);
        assert!(versions[0].is_empty());
        assert_eq!(versions[1].field("v"), Some(&json!("a")));
        assert_eq!(versions[2].field("v"), Some(&json!("b")));
        assert_eq!(store.load(&doc.id).await.unwrap().version_count, 2);
        assert_eq!(store.version_total(), 3);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = MemoryStore::new();
        let id = DocumentId::derive(&[b"nope"]);
        assert!(matches!(store.load(&id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            store.update(&id, Content::new()).await,
            Err(Error::NotFound(_))
        ));
    }
}

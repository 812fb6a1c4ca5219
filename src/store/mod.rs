//! Versioned document store adapters
//!
//! The variable tree only talks to storage through [`DocumentStore`]. Two
//! adapters ship with the crate: [`MemoryStore`] for tests and embedding,
//! and [`FileStore`], a single-file append-only log of document versions.

mod file_store;
mod memory;
mod record;

pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use record::{Record, RecordKind};

use crate::model::{Content, Coordinate, Document, DocumentId};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options passed along with every document creation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOpts {
    /// Request anchoring of new commits (ignored by local adapters)
    pub anchor: bool,
    /// Publish new commits to peers (ignored by local adapters)
    pub publish: bool,
    /// Keep the document pinned in the store
    pub pin: bool,
    /// How long to wait for a network sync before creating (ignored by local adapters)
    pub sync_timeout_secs: Option<u64>,
}

impl CreateOpts {
    /// Local-only creation: no anchoring, no publishing, no pinning
    pub fn local() -> Self {
        Self::default()
    }

    pub fn pinned(mut self) -> Self {
        self.pin = true;
        self
    }
}

/// Storage primitive the variable tree is built on
///
/// Documents are append-only: every [`update`](DocumentStore::update)
/// produces a new version and bumps `version_count`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return the document living at `coordinate`, creating it with empty
    /// content if it does not exist yet. Idempotent.
    async fn resolve_deterministic(
        &self,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document>;

    /// Always mint a new document, even if one already exists for the same
    /// coordinate
    async fn create_new(
        &self,
        content: Content,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document>;

    /// Load the latest version of a document by identity
    async fn load(&self, id: &DocumentId) -> Result<Document>;

    /// Merge `patch` into the latest content, producing a new version
    async fn update(&self, id: &DocumentId, patch: Content) -> Result<Document>;

    /// Every version of a document, oldest first
    async fn versions(&self, id: &DocumentId) -> Result<Vec<Document>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn resolve_deterministic(
        &self,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        (**self).resolve_deterministic(coordinate, opts).await
    }

    async fn create_new(
        &self,
        content: Content,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        (**self).create_new(content, coordinate, opts).await
    }

    async fn load(&self, id: &DocumentId) -> Result<Document> {
        (**self).load(id).await
    }

    async fn update(&self, id: &DocumentId, patch: Content) -> Result<Document> {
        (**self).update(id, patch).await
    }

    async fn versions(&self, id: &DocumentId) -> Result<Vec<Document>> {
        (**self).versions(id).await
    }
}

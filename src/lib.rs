//! # public_variable
//!
//! Controller-authenticated mutable variables on top of a versioned,
//! deterministically-addressed document store.
//!
//! Documents in the underlying store are append-only: every write is a new
//! version, and each document is found by hashing fixed metadata rather than
//! by following pointers. A variable spreads its writes over a tree of such
//! documents so that no single document collects more than a fixed number of
//! versions.
//!
//! ## Core Concepts
//!
//! - **Root**: the named document holding the tree shape (`maxDepth`, `maxFragments`)
//! - **Fragments**: tree nodes addressed by `(root, controller, depth, index)`
//! - **Leaves**: fragments at `maxDepth` holding the value, at most `maxFragments` versions each
//! - **Carry**: advancing an ancestor's pointer and growing a fresh subtree when a leaf fills up
//!
//! ## Example
//!
//! ```ignore
//! use public_variable::{MemoryStore, VariableFactory, VariableOptions, VariableParams};
//! use std::sync::Arc;
//!
//! let factory = VariableFactory::new(Arc::new(MemoryStore::new()), "did:key:me");
//! let options = VariableOptions::new(VariableParams::new("did:key:me", 3, 3));
//! let var = factory.deterministic("greeting", &options).await?;
//! var.set("Hello World").await?;
//! assert_eq!(var.get::<String>().await?.as_deref(), Some("Hello World"));
//! ```

pub mod config;
pub mod model;
pub mod store;
pub mod tree;

mod error;
mod variable;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Controller, Document, DocumentId, Fragment, FragmentCoordinate, RootDescriptor};
pub use store::{CreateOpts, DocumentStore, FileStore, MemoryStore};
pub use tree::{RepairPolicy, TreeSnapshot};
pub use variable::{Variable, VariableFactory, VariableOptions, VariableParams};

/// File store format version
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes for file store identification
pub const MAGIC: &[u8; 8] = b"PUBVARDB";

//! Variable facade
//!
//! This module provides the entry point surrounding code uses: a
//! [`VariableFactory`] bound to a store and a caller identity, and the
//! [`Variable`] handles it produces.

use crate::model::{
    root_key, value_content, Controller, DocumentId, Fragment, RootDescriptor, MAX_TREE_DEPTH,
};
use crate::store::{CreateOpts, DocumentStore};
use crate::tree::{resolve_root, RepairPolicy, TreeSnapshot, VersionTree};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shape and ownership of a variable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableParams {
    pub controller: Controller,
    pub max_depth: u32,
    pub max_fragments: u64,
}

impl VariableParams {
    pub fn new(controller: impl Into<Controller>, max_depth: u32, max_fragments: u64) -> Self {
        VariableParams {
            controller: controller.into(),
            max_depth,
            max_fragments,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::InvalidParams("max_depth must be at least 1".into()));
        }
        if self.max_depth > MAX_TREE_DEPTH {
            return Err(Error::InvalidParams(format!(
                "max_depth must be at most {}",
                MAX_TREE_DEPTH
            )));
        }
        if self.max_fragments == 0 {
            return Err(Error::InvalidParams("max_fragments must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a construction call needs besides the name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableOptions {
    pub create: CreateOpts,
    pub variable: VariableParams,
    pub repair: RepairPolicy,
}

impl VariableOptions {
    pub fn new(variable: VariableParams) -> Self {
        VariableOptions {
            create: CreateOpts::local(),
            variable,
            repair: RepairPolicy::default(),
        }
    }

    pub fn with_create(mut self, create: CreateOpts) -> Self {
        self.create = create;
        self
    }

    pub fn with_repair(mut self, repair: RepairPolicy) -> Self {
        self.repair = repair;
        self
    }
}

/// Builds [`Variable`]s on one store on behalf of one caller identity
#[derive(Clone)]
pub struct VariableFactory {
    store: Arc<dyn DocumentStore>,
    caller: Controller,
}

impl VariableFactory {
    pub fn new(store: Arc<dyn DocumentStore>, caller: impl Into<Controller>) -> Self {
        VariableFactory {
            store,
            caller: caller.into(),
        }
    }

    /// The identity `set()` calls are made as
    pub fn caller(&self) -> &Controller {
        &self.caller
    }

    /// Mint a brand-new variable root and its first leaf chain
    pub async fn create(&self, name: &str, options: &VariableOptions) -> Result<Variable> {
        let params = &options.variable;
        params.validate()?;

        let root = self
            .store
            .create_new(
                RootDescriptor::content(params.max_depth, params.max_fragments),
                &root_key(name, &params.controller),
                &options.create,
            )
            .await?;
        let descriptor = RootDescriptor::from_document(&root)?;

        let variable = self.bind(descriptor, options);
        variable.tree().materialize_chain(variable.descriptor.head()).await?;
        info!(name, root = %variable.id().short(), "created variable");
        Ok(variable)
    }

    /// Get-or-create the variable named `name` owned by the options' controller.
    ///
    /// Only a freshly created root is initialized; an existing one keeps its
    /// stored shape even if `options` ask for another.
    pub async fn deterministic(&self, name: &str, options: &VariableOptions) -> Result<Variable> {
        let params = &options.variable;
        let mut root = resolve_root(&*self.store, name, &params.controller, &options.create).await?;

        let fresh = root.is_empty();
        if fresh {
            params.validate()?;
            root = self
                .store
                .update(
                    &root.id,
                    RootDescriptor::content(params.max_depth, params.max_fragments),
                )
                .await?;
        }

        let descriptor = RootDescriptor::from_document(&root)?;
        if !fresh
            && (descriptor.max_depth != params.max_depth
                || descriptor.max_fragments != params.max_fragments)
        {
            warn!(
                name,
                stored_depth = descriptor.max_depth,
                stored_fragments = descriptor.max_fragments,
                "existing variable shape differs from requested options, keeping stored shape"
            );
        }

        let variable = self.bind(descriptor, options);
        if fresh {
            variable.tree().materialize_chain(variable.descriptor.head()).await?;
            info!(name, root = %variable.id().short(), "initialized deterministic variable");
        } else {
            debug!(name, root = %variable.id().short(), "resolved existing variable");
        }
        Ok(variable)
    }

    /// Bind to an existing root by identity, without initializing anything
    pub async fn load(&self, id: &DocumentId, options: &VariableOptions) -> Result<Variable> {
        let root = self.store.load(id).await?;
        let descriptor = RootDescriptor::from_document(&root)?;
        debug!(root = %id.short(), "loaded variable");
        Ok(self.bind(descriptor, options))
    }

    fn bind(&self, descriptor: RootDescriptor, options: &VariableOptions) -> Variable {
        let is_controlled = descriptor.controller == self.caller;
        Variable {
            store: Arc::clone(&self.store),
            descriptor,
            opts: options.create.clone(),
            repair: options.repair,
            is_controlled,
        }
    }
}

/// A mutable value backed by a bounded-fanout tree of versioned documents
#[derive(Clone)]
pub struct Variable {
    store: Arc<dyn DocumentStore>,
    descriptor: RootDescriptor,
    opts: CreateOpts,
    repair: RepairPolicy,
    is_controlled: bool,
}

impl Variable {
    /// Identity of the root document
    pub fn id(&self) -> DocumentId {
        self.descriptor.id
    }

    pub fn controller(&self) -> &Controller {
        &self.descriptor.controller
    }

    /// Whether the factory's caller may `set()` this variable
    pub fn is_controlled(&self) -> bool {
        self.is_controlled
    }

    pub fn descriptor(&self) -> &RootDescriptor {
        &self.descriptor
    }

    fn tree(&self) -> VersionTree<'_> {
        VersionTree::new(&*self.store, &self.descriptor, &self.opts)
    }

    /// Current value as raw JSON, `None` if never set
    pub async fn get_json(&self) -> Result<Option<Value>> {
        self.tree().read_value().await
    }

    /// Current value, `None` if never set
    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.get_json().await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store `value` as the variable's new value. Returns the leaf holding it.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<Fragment> {
        if !self.is_controlled {
            return Err(Error::Unauthorized(self.descriptor.id));
        }
        self.set_json(serde_json::to_value(value)?).await
    }

    /// Store a raw JSON value. Returns the leaf holding it.
    pub async fn set_json(&self, value: Value) -> Result<Fragment> {
        if !self.is_controlled {
            return Err(Error::Unauthorized(self.descriptor.id));
        }

        let leaf = self.tree().writable_leaf(self.repair).await?;
        let document = self
            .store
            .update(&leaf.document.id, value_content(value))
            .await?;
        debug!(
            root = %self.descriptor.id.short(),
            leaf = %leaf.coordinate,
            version = document.version_count,
            "wrote value"
        );
        Ok(Fragment::new(leaf.coordinate, document))
    }

    /// The active path from the head fragment to the current leaf
    pub async fn inspect(&self) -> Result<TreeSnapshot> {
        self.tree().snapshot().await
    }
}

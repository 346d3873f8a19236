//! How nodes and conditions reach external data.
//!
//! Each node declares data keys as writable or read-only. A key maps to a
//! data asset id registered in the [`DataCatalog`]. The version a node sees is
//! the newest one available: the active node's cache, then history, then the
//! catalog template.

use super::condition::ConditionContext;
use super::data::{DataAsset, DataCatalog};
use super::history::History;
use super::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use thiserror::Error;

/// Errors raised when a node resolves one of its data keys.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("node {node}: key '{key}' is declared both writable and read-only")]
    AmbiguousKey { node: NodeId, key: String },

    #[error("node {node}: key '{key}' is not declared")]
    UndeclaredKey { node: NodeId, key: String },

    #[error("key '{key}' refers to data asset '{asset}' which is not registered")]
    MissingTemplate { key: String, asset: String },

    #[error("node {node}: key '{key}' is read-only")]
    ReadOnly { node: NodeId, key: String },
}

/// World collaborator answering spatial questions about a node's owner.
pub trait SpatialProbe: Send + Sync {
    /// Whether `owner` carries a component called `component`.
    fn has_component(&self, owner: &str, component: &str) -> bool;

    /// Whether `component` on `owner` currently overlaps the player.
    fn is_overlapping(&self, owner: &str, component: &str) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Writable,
    ReadOnly,
}

/// Data keys a node declares, each mapped to an asset id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBindings {
    #[serde(default)]
    writable: BTreeMap<String, String>,
    #[serde(default)]
    read_only: BTreeMap<String, String>,
}

impl DataBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_writable(&mut self, key: impl Into<String>, asset: impl Into<String>) {
        self.writable.insert(key.into(), asset.into());
    }

    pub fn add_read_only(&mut self, key: impl Into<String>, asset: impl Into<String>) {
        self.read_only.insert(key.into(), asset.into());
    }

    /// Resolve `key` to its access kind and asset id.
    ///
    /// A key listed in both sets, or in neither, is an error.
    pub fn lookup(&self, node: &NodeId, key: &str) -> Result<(Access, &str), DataError> {
        match (self.writable.get(key), self.read_only.get(key)) {
            (Some(_), Some(_)) => Err(DataError::AmbiguousKey {
                node: node.clone(),
                key: key.to_string(),
            }),
            (Some(asset), None) => Ok((Access::Writable, asset)),
            (None, Some(asset)) => Ok((Access::ReadOnly, asset)),
            (None, None) => Err(DataError::UndeclaredKey {
                node: node.clone(),
                key: key.to_string(),
            }),
        }
    }

    pub fn writable(&self) -> impl Iterator<Item = (&String, &String)> {
        self.writable.iter()
    }

    pub fn read_only(&self) -> impl Iterator<Item = (&String, &String)> {
        self.read_only.iter()
    }
}

/// Read-only view over every place a data asset version can live.
#[derive(Clone, Copy)]
pub struct DataScope<'a> {
    catalog: &'a DataCatalog,
    history: &'a History,
    active: Option<&'a BTreeMap<String, DataAsset>>,
}

impl<'a> DataScope<'a> {
    pub fn new(catalog: &'a DataCatalog, history: &'a History) -> Self {
        Self {
            catalog,
            history,
            active: None,
        }
    }

    /// Include the active node's cached versions.
    pub fn with_active(mut self, cache: Option<&'a BTreeMap<String, DataAsset>>) -> Self {
        self.active = cache;
        self
    }

    pub fn catalog(&self) -> &'a DataCatalog {
        self.catalog
    }

    pub fn history(&self) -> &'a History {
        self.history
    }

    /// The newest version of `asset_id`.
    pub fn latest(&self, asset_id: &str) -> Option<&'a DataAsset> {
        self.active
            .and_then(|cache| cache.get(asset_id))
            .or_else(|| stored_latest(self.catalog, self.history, asset_id))
    }
}

/// Newest version outside any active cache.
fn stored_latest<'a>(
    catalog: &'a DataCatalog,
    history: &'a History,
    asset_id: &str,
) -> Option<&'a DataAsset> {
    history
        .latest(asset_id)
        .or_else(|| catalog.template(asset_id))
}

/// Node data as seen by its conditions.
pub struct NodeView<'a> {
    id: &'a NodeId,
    bindings: &'a DataBindings,
    scope: DataScope<'a>,
    spatial: Option<&'a dyn SpatialProbe>,
}

impl<'a> NodeView<'a> {
    pub fn new(
        id: &'a NodeId,
        bindings: &'a DataBindings,
        scope: DataScope<'a>,
        spatial: Option<&'a dyn SpatialProbe>,
    ) -> Self {
        Self {
            id,
            bindings,
            scope,
            spatial,
        }
    }

    fn asset_id(&self, key: &str) -> Result<&'a str, DataError> {
        self.bindings.lookup(self.id, key).map(|(_, asset)| asset)
    }
}

impl ConditionContext for NodeView<'_> {
    fn node_id(&self) -> &NodeId {
        self.id
    }

    fn declared(&self, key: &str) -> Result<&DataAsset, DataError> {
        let asset = self.asset_id(key)?;
        self.scope
            .catalog()
            .template(asset)
            .ok_or_else(|| DataError::MissingTemplate {
                key: key.to_string(),
                asset: asset.to_string(),
            })
    }

    fn fetch(&self, key: &str) -> Result<&DataAsset, DataError> {
        let asset = self.asset_id(key)?;
        self.scope
            .latest(asset)
            .ok_or_else(|| DataError::MissingTemplate {
                key: key.to_string(),
                asset: asset.to_string(),
            })
    }

    fn has_component(&self, component: &str) -> bool {
        self.spatial
            .map_or(false, |probe| probe.has_component(&self.id.owner, component))
    }

    fn is_overlapping(&self, component: &str) -> bool {
        self.spatial
            .map_or(false, |probe| probe.is_overlapping(&self.id.owner, component))
    }
}

/// Storage a node phase reads from and writes into.
pub struct DataAccess<'a> {
    pub catalog: &'a DataCatalog,
    pub history: &'a History,
    /// The active node's cache; `None` outside an active node.
    pub cache: Option<&'a mut BTreeMap<String, DataAsset>>,
}

/// Result of [`NodeContext::get_value`].
#[derive(Debug)]
pub enum DataHandle<'a> {
    /// The active node's cached version; edits are recorded in history.
    Live(&'a mut DataAsset),
    /// A detached copy of the latest version.
    Copy(DataAsset),
}

impl DataHandle<'_> {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Mutable access, only for live handles.
    pub fn as_mut(&mut self) -> Option<&mut DataAsset> {
        match self {
            Self::Live(asset) => Some(asset),
            Self::Copy(_) => None,
        }
    }

    pub fn into_owned(self) -> DataAsset {
        match self {
            Self::Live(asset) => asset.clone(),
            Self::Copy(asset) => asset,
        }
    }
}

impl Deref for DataHandle<'_> {
    type Target = DataAsset;

    fn deref(&self) -> &DataAsset {
        match self {
            Self::Live(asset) => asset,
            Self::Copy(asset) => asset,
        }
    }
}

/// What node behaviors receive during lifecycle phases.
pub struct NodeContext<'a> {
    id: &'a NodeId,
    bindings: &'a DataBindings,
    access: DataAccess<'a>,
}

impl<'a> NodeContext<'a> {
    pub fn new(id: &'a NodeId, bindings: &'a DataBindings, access: DataAccess<'a>) -> Self {
        Self {
            id,
            bindings,
            access,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.id
    }

    /// Fetch the data behind `key`.
    ///
    /// Writable keys yield the live cached version while the node is
    /// active; the first access copies the latest version into the cache.
    /// Read-only keys, and writable keys outside an active node, yield a
    /// fresh copy.
    pub fn get_value(&mut self, key: &str) -> Result<DataHandle<'_>, DataError> {
        let (access, asset) = self.lookup(key)?;
        if access == Access::ReadOnly || self.access.cache.is_none() {
            return self.read(key).map(DataHandle::Copy);
        }

        let catalog = self.access.catalog;
        let history = self.access.history;
        let missing = || DataError::MissingTemplate {
            key: key.to_string(),
            asset: asset.to_string(),
        };
        let Some(cache) = self.access.cache.as_deref_mut() else {
            return Err(missing());
        };
        if !cache.contains_key(asset) {
            let latest = stored_latest(catalog, history, asset)
                .cloned()
                .ok_or_else(missing)?;
            cache.insert(asset.to_string(), latest);
        }
        cache.get_mut(asset).map(DataHandle::Live).ok_or_else(missing)
    }

    /// Copy of the latest version behind `key`.
    pub fn read(&self, key: &str) -> Result<DataAsset, DataError> {
        let (_, asset) = self.lookup(key)?;
        let scope = DataScope::new(self.access.catalog, self.access.history)
            .with_active(self.access.cache.as_deref());
        scope
            .latest(asset)
            .cloned()
            .ok_or_else(|| DataError::MissingTemplate {
                key: key.to_string(),
                asset: asset.to_string(),
            })
    }

    /// Live version behind a writable `key`.
    pub fn write(&mut self, key: &str) -> Result<&mut DataAsset, DataError> {
        let id = self.id;
        let read_only = || DataError::ReadOnly {
            node: id.clone(),
            key: key.to_string(),
        };
        let (access, _) = self.lookup(key)?;
        if access == Access::ReadOnly {
            return Err(read_only());
        }
        match self.get_value(key)? {
            DataHandle::Live(asset) => Ok(asset),
            DataHandle::Copy(_) => Err(read_only()),
        }
    }

    fn lookup(&self, key: &str) -> Result<(Access, &'a str), DataError> {
        let result = self.bindings.lookup(self.id, key);
        if let Err(err) = &result {
            tracing::error!(node = %self.id, key = %key, "{}", err);
        }
        result
    }
}

//! Shared, lazily built flat projections.
//!
//! A [`FlatProjectionHandle`] keeps a projection alive. Handles are counted:
//! cloning adds one, dropping (or [`release`](FlatProjectionHandle::release))
//! removes one, and releasing the last handle tears the projection down so
//! nothing stays attached to the source hierarchy.
//!
//! [`ProjectionRegistry`] caches one projection per root collection. Asking
//! it again for the same root while a handle is alive returns another handle
//! to the same projection; after the last release it builds a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use flatlist_core::logging::targets;
use parking_lot::Mutex;

use crate::collection::{Collection, CollectionId, CollectionView};
use crate::config::FlattenConfig;
use crate::engine::{FlattenEngine, ProjectionState};
use crate::error::Result;
use crate::item::Item;
use crate::role::{ItemData, ItemRole};
use crate::subscription::{ProjectionId, SubscriptionStats};

/// A built engine plus the number of handles sharing it.
struct SharedProjection {
    engine: Arc<FlattenEngine>,
    handles: Mutex<usize>,
}

impl SharedProjection {
    /// Adds a handle unless the projection has already been released.
    fn retain(self: &Arc<Self>) -> Option<FlatProjectionHandle> {
        let mut handles = self.handles.lock();
        if *handles == 0 {
            return None;
        }
        *handles += 1;
        Some(FlatProjectionHandle {
            shared: Arc::clone(self),
        })
    }
}

/// Counted access to a flat projection.
///
/// # Example
///
/// ```
/// use flatlist::{Collection, FlatProjectionHandle, FlattenConfig, Item, ItemRole};
///
/// let root = Collection::from_items([Item::with_title("A")]).unwrap();
/// let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();
///
/// assert_eq!(handle.row_count(), 1);
/// assert_eq!(handle.data(0, ItemRole::Title).as_string(), Some("A"));
///
/// handle.release();
/// assert_eq!(root.observer_count(), 0);
/// ```
pub struct FlatProjectionHandle {
    shared: Arc<SharedProjection>,
}

impl FlatProjectionHandle {
    /// Builds a new, unshared projection of `root`.
    ///
    /// # Errors
    ///
    /// Whatever [`FlattenEngine::build`] reports. The partially built
    /// projection is unwound before the error is returned.
    pub fn acquire(root: &Collection, config: FlattenConfig) -> Result<Self> {
        let engine = FlattenEngine::new(root.clone(), config);
        engine.build()?;
        tracing::debug!(target: targets::PROJECTION, projection = %engine.id(), root = %root.id(), "acquired");
        Ok(Self {
            shared: Arc::new(SharedProjection {
                engine,
                handles: Mutex::new(1),
            }),
        })
    }

    /// Gives up this handle. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Read-only view of the flat collection.
    ///
    /// Connect to its signals to follow changes.
    pub fn collection(&self) -> CollectionView {
        self.shared.engine.flat()
    }

    /// Snapshot of the flat items in order.
    pub fn items(&self) -> Vec<Item> {
        self.collection().items()
    }

    /// Number of rows in the flat projection.
    pub fn row_count(&self) -> usize {
        self.collection().len()
    }

    /// Returns `true` if the projection has no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// The item at `row`.
    pub fn item(&self, row: usize) -> Option<Item> {
        self.collection().item_at(row)
    }

    /// The row currently holding `item`.
    pub fn row_of(&self, item: &Item) -> Option<usize> {
        self.collection().index_of(item)
    }

    /// Data for `role` at `row`; [`ItemData::None`] for a row out of range.
    pub fn data(&self, row: usize, role: ItemRole) -> ItemData {
        self.item(row).map(|item| item.data(role)).unwrap_or_default()
    }

    /// The standard roles and their names.
    pub fn role_names(&self) -> Vec<(ItemRole, &'static str)> {
        ItemRole::STANDARD
            .iter()
            .filter_map(|role| role.name().map(|name| (*role, name)))
            .collect()
    }

    /// The source root collection.
    pub fn root(&self) -> &Collection {
        self.shared.engine.root()
    }

    /// Identity of the projection.
    pub fn projection_id(&self) -> ProjectionId {
        self.shared.engine.id()
    }

    /// Lifecycle state of the projection.
    pub fn state(&self) -> ProjectionState {
        self.shared.engine.state()
    }

    /// The configuration the projection was built with.
    pub fn config(&self) -> &FlattenConfig {
        self.shared.engine.config()
    }

    /// Attach/detach counts of the projection's observers.
    pub fn subscription_stats(&self) -> SubscriptionStats {
        self.shared.engine.subscription_stats()
    }

    /// Number of handles currently sharing the projection.
    pub fn handle_count(&self) -> usize {
        *self.shared.handles.lock()
    }

    /// Returns `true` if `other` refers to the same projection.
    pub fn same_projection(&self, other: &FlatProjectionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Clone for FlatProjectionHandle {
    fn clone(&self) -> Self {
        *self.shared.handles.lock() += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for FlatProjectionHandle {
    fn drop(&mut self) {
        let remaining = {
            let mut handles = self.shared.handles.lock();
            *handles = handles.saturating_sub(1);
            *handles
        };
        if remaining == 0 {
            tracing::debug!(target: targets::PROJECTION, projection = %self.shared.engine.id(), "last handle released");
            self.shared.engine.teardown();
        }
    }
}

impl fmt::Debug for FlatProjectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatProjectionHandle")
            .field("projection", &self.projection_id())
            .field("root", &self.root().id())
            .field("rows", &self.row_count())
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Caches one flat projection per root collection.
///
/// # Example
///
/// ```
/// use flatlist::{Collection, Item, ProjectionRegistry};
///
/// let root = Collection::from_items([Item::with_title("A")]).unwrap();
/// let registry = ProjectionRegistry::new();
///
/// let first = registry.acquire(&root).unwrap();
/// let second = registry.acquire(&root).unwrap();
/// assert!(first.same_projection(&second));
/// assert_eq!(first.handle_count(), 2);
/// ```
pub struct ProjectionRegistry {
    config: FlattenConfig,
    projections: Mutex<HashMap<CollectionId, Weak<SharedProjection>>>,
}

impl ProjectionRegistry {
    /// Creates a registry building projections with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FlattenConfig::default())
    }

    /// Creates a registry building projections with `config`.
    pub fn with_config(config: FlattenConfig) -> Self {
        Self {
            config,
            projections: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration new projections are built with.
    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Returns a handle to the projection of `root`, building it first if
    /// no live projection exists.
    ///
    /// # Errors
    ///
    /// Whatever [`FlattenEngine::build`] reports for a fresh build. Nothing
    /// is cached in that case.
    pub fn acquire(&self, root: &Collection) -> Result<FlatProjectionHandle> {
        let mut projections = self.projections.lock();
        projections.retain(|_, shared| shared.strong_count() > 0);

        if let Some(handle) = projections
            .get(&root.id())
            .and_then(Weak::upgrade)
            .and_then(|shared| shared.retain())
        {
            tracing::trace!(target: targets::PROJECTION, root = %root.id(), handles = handle.handle_count(), "reused");
            return Ok(handle);
        }

        let handle = FlatProjectionHandle::acquire(root, self.config.clone())?;
        projections.insert(root.id(), Arc::downgrade(&handle.shared));
        Ok(handle)
    }

    /// Number of projections with at least one live handle.
    pub fn live_count(&self) -> usize {
        self.projections
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|shared| *shared.handles.lock() > 0)
            .count()
    }
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProjectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionRegistry")
            .field("config", &self.config)
            .field("live", &self.live_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(FlatProjectionHandle: Send, Sync);
static_assertions::assert_impl_all!(ProjectionRegistry: Send, Sync);

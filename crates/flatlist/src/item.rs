//! Identity-bearing items.
//!
//! An [`Item`] is a cheap, clonable handle. Clones share the same identity;
//! two separately constructed items are never equal even when their data is.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use flatlist_core::logging::targets;
use flatlist_core::Signal;
use parking_lot::RwLock;

use crate::collection::Collection;
use crate::error::CollectionError;
use crate::role::{first_symbol, ItemData, ItemRole};

/// Counter for generating unique item IDs.
static ITEM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an [`Item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(ITEM_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

struct ItemInner {
    id: ItemId,
    data: RwLock<HashMap<ItemRole, ItemData>>,
    sub_collection: OnceLock<Collection>,
    sub_items_discovered: Signal<Item>,
}

/// A node of the source hierarchy.
///
/// An item is either a *leaf* or, once it owns a sub-collection, an
/// *internal* item. The transition happens at most once: a sub-collection can
/// be attached but never detached.
///
/// # Example
///
/// ```
/// use flatlist::{Collection, Item};
///
/// let folder = Item::with_title("Season 1");
/// assert!(folder.is_leaf());
///
/// let episodes = Collection::new();
/// folder.set_sub_collection(episodes).unwrap();
/// assert!(!folder.is_leaf());
/// ```
#[derive(Clone)]
pub struct Item {
    inner: Arc<ItemInner>,
}

impl Item {
    /// Creates a new leaf item with no data.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ItemInner {
                id: ItemId::next(),
                data: RwLock::new(HashMap::new()),
                sub_collection: OnceLock::new(),
                sub_items_discovered: Signal::new(),
            }),
        }
    }

    /// Creates a new leaf item with the given title.
    pub fn with_title(title: impl Into<String>) -> Self {
        let item = Self::new();
        item.set_data(ItemRole::Title, title.into());
        item
    }

    /// Creates an internal item that owns `sub_collection` from the start.
    ///
    /// No discovery event is emitted, nobody can be observing yet.
    pub fn with_sub_collection(title: impl Into<String>, sub_collection: Collection) -> Self {
        let item = Self::with_title(title);
        let _ = item.inner.sub_collection.set(sub_collection);
        item
    }

    /// Returns the identity of this item.
    #[inline]
    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    /// Returns the data stored under `role`.
    ///
    /// Derived roles are computed on the fly.
    pub fn data(&self, role: ItemRole) -> ItemData {
        match role {
            ItemRole::Id => ItemData::from(self.inner.id.as_raw()),
            ItemRole::TitleFirstSymbol => match self.inner.data.read().get(&ItemRole::Title) {
                Some(ItemData::String(title)) => ItemData::String(first_symbol(title)),
                _ => ItemData::None,
            },
            role => self
                .inner
                .data
                .read()
                .get(&role)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Stores `value` under `role`.
    ///
    /// Returns `false` for derived roles, which cannot be set.
    pub fn set_data(&self, role: ItemRole, value: impl Into<ItemData>) -> bool {
        if role.is_derived() {
            return false;
        }
        self.inner.data.write().insert(role, value.into());
        true
    }

    /// Convenience accessor for [`ItemRole::Title`].
    pub fn title(&self) -> Option<String> {
        self.data(ItemRole::Title).into_string()
    }

    /// Returns the sub-collection, if this item is internal.
    pub fn sub_collection(&self) -> Option<Collection> {
        self.inner.sub_collection.get().cloned()
    }

    /// Returns `true` while this item has no sub-collection.
    pub fn is_leaf(&self) -> bool {
        self.inner.sub_collection.get().is_none()
    }

    /// Turns this leaf into an internal item owning `sub_collection`, then
    /// emits [`sub_items_discovered`](Self::sub_items_discovered).
    ///
    /// # Errors
    ///
    /// [`CollectionError::SubItemsAlreadyPresent`] if the item already owns a
    /// sub-collection.
    pub fn set_sub_collection(&self, sub_collection: Collection) -> Result<(), CollectionError> {
        self.inner
            .sub_collection
            .set(sub_collection)
            .map_err(|_| CollectionError::SubItemsAlreadyPresent { item: self.id() })?;
        tracing::debug!(target: targets::COLLECTION, item = %self.id(), "sub-items discovered");
        self.inner.sub_items_discovered.emit(self.clone());
        Ok(())
    }

    /// Emitted once, after the item gains its sub-collection.
    pub fn sub_items_discovered(&self) -> &Signal<Item> {
        &self.inner.sub_items_discovered
    }

    /// Number of observers attached to this item.
    pub fn observer_count(&self) -> usize {
        self.inner.sub_items_discovered.connection_count()
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.inner.id)
            .field("title", &self.title())
            .field("leaf", &self.is_leaf())
            .finish()
    }
}

static_assertions::assert_impl_all!(Item: Send, Sync);

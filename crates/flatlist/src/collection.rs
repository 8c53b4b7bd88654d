//! Ordered, duplicate-free collections of items.
//!
//! `Collection` is the storage primitive both the source hierarchy and the
//! flat projection are made of. Every structural change is announced through
//! [`CollectionSignals`] after the change has been applied and all internal
//! locks have been released, so observers may read the collection (or
//! mutate another one) from inside their slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flatlist_core::logging::targets;
use flatlist_core::Signal;
use parking_lot::RwLock;

use crate::error::CollectionError;
use crate::item::Item;

/// Counter for generating unique collection IDs.
static COLLECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a [`Collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(u64);

impl CollectionId {
    fn next() -> Self {
        Self(COLLECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection#{}", self.0)
    }
}

/// Signals emitted by a collection.
///
/// Both carry the affected item and the index it occupied at the time of the
/// change.
pub struct CollectionSignals {
    /// Emitted after an item has been inserted.
    /// Args: (item, index it was inserted at)
    pub item_added: Signal<(Item, usize)>,

    /// Emitted after an item has been removed.
    /// Args: (item, index it was removed from)
    pub item_removed: Signal<(Item, usize)>,
}

impl CollectionSignals {
    fn new() -> Self {
        Self {
            item_added: Signal::new(),
            item_removed: Signal::new(),
        }
    }
}

struct CollectionInner {
    id: CollectionId,
    items: RwLock<Vec<Item>>,
    signals: CollectionSignals,
}

/// A shared, ordered sequence of items with no duplicate identities.
///
/// Cloning a `Collection` produces another handle to the same storage.
///
/// # Example
///
/// ```
/// use flatlist::{Collection, Item};
///
/// let list = Collection::new();
/// let a = Item::with_title("A");
/// list.push(a.clone()).unwrap();
///
/// assert_eq!(list.index_of(&a), Some(0));
/// assert!(list.push(a).is_err()); // duplicates are rejected
/// ```
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                id: CollectionId::next(),
                items: RwLock::new(Vec::new()),
                signals: CollectionSignals::new(),
            }),
        }
    }

    /// Creates a collection holding `items`, in order.
    ///
    /// # Errors
    ///
    /// [`CollectionError::DuplicateItem`] if the same item appears twice.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self, CollectionError> {
        let collection = Self::new();
        {
            let mut storage = collection.inner.items.write();
            for item in items {
                if storage.contains(&item) {
                    return Err(CollectionError::DuplicateItem {
                        collection: collection.id(),
                        item: item.id(),
                    });
                }
                storage.push(item);
            }
        }
        Ok(collection)
    }

    /// Returns the identity of this collection.
    #[inline]
    pub fn id(&self) -> CollectionId {
        self.inner.id
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Returns a snapshot of the items, in order.
    pub fn items(&self) -> Vec<Item> {
        self.inner.items.read().clone()
    }

    /// Returns the item at `index`.
    pub fn item_at(&self, index: usize) -> Option<Item> {
        self.inner.items.read().get(index).cloned()
    }

    /// Returns the position of `item`, compared by identity.
    pub fn index_of(&self, item: &Item) -> Option<usize> {
        self.inner.items.read().iter().position(|i| i == item)
    }

    /// Returns `true` if `item` is a member.
    pub fn contains(&self, item: &Item) -> bool {
        self.index_of(item).is_some()
    }

    /// Appends `item` and returns the index it was stored at.
    ///
    /// # Errors
    ///
    /// [`CollectionError::DuplicateItem`] if `item` is already a member.
    pub fn push(&self, item: Item) -> Result<usize, CollectionError> {
        let index = {
            let mut items = self.inner.items.write();
            self.check_absent(&items, &item)?;
            items.push(item.clone());
            items.len() - 1
        };
        self.announce_added(item, index);
        Ok(index)
    }

    /// Inserts `item` at `index`, shifting later items back.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::IndexOutOfBounds`] if `index > len()`
    /// - [`CollectionError::DuplicateItem`] if `item` is already a member
    pub fn insert(&self, index: usize, item: Item) -> Result<(), CollectionError> {
        {
            let mut items = self.inner.items.write();
            if index > items.len() {
                return Err(CollectionError::IndexOutOfBounds {
                    collection: self.id(),
                    index,
                    len: items.len(),
                });
            }
            self.check_absent(&items, &item)?;
            items.insert(index, item.clone());
        }
        self.announce_added(item, index);
        Ok(())
    }

    /// Removes and returns the item at `index`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfBounds`] if `index >= len()`.
    pub fn remove_at(&self, index: usize) -> Result<Item, CollectionError> {
        let item = {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                return Err(CollectionError::IndexOutOfBounds {
                    collection: self.id(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.announce_removed(item.clone(), index);
        Ok(item)
    }

    /// Removes `item` if present and returns the index it occupied.
    ///
    /// Removing a non-member is a no-op.
    pub fn remove(&self, item: &Item) -> Option<usize> {
        let index = {
            let mut items = self.inner.items.write();
            let index = items.iter().position(|i| i == item)?;
            items.remove(index);
            index
        };
        self.announce_removed(item.clone(), index);
        Some(index)
    }

    /// Removes every item, last to first, announcing each removal.
    pub fn clear(&self) {
        loop {
            let popped = {
                let mut items = self.inner.items.write();
                items.pop().map(|item| (item, items.len()))
            };
            match popped {
                Some((item, index)) => self.announce_removed(item, index),
                None => break,
            }
        }
    }

    /// Returns the signals for this collection.
    pub fn signals(&self) -> &CollectionSignals {
        &self.inner.signals
    }

    /// Total number of slots connected to this collection's signals.
    pub fn observer_count(&self) -> usize {
        self.inner.signals.item_added.connection_count()
            + self.inner.signals.item_removed.connection_count()
    }

    /// Returns a read-only view of this collection.
    pub fn view(&self) -> CollectionView {
        CollectionView {
            inner: self.clone(),
        }
    }

    fn check_absent(&self, items: &[Item], item: &Item) -> Result<(), CollectionError> {
        if items.contains(item) {
            return Err(CollectionError::DuplicateItem {
                collection: self.id(),
                item: item.id(),
            });
        }
        Ok(())
    }

    fn announce_added(&self, item: Item, index: usize) {
        tracing::trace!(target: targets::COLLECTION, collection = %self.id(), item = %item.id(), index, "item added");
        self.inner.signals.item_added.emit((item, index));
    }

    fn announce_removed(&self, item: Item, index: usize) {
        tracing::trace!(target: targets::COLLECTION, collection = %self.id(), item = %item.id(), index, "item removed");
        self.inner.signals.item_removed.emit((item, index));
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}

/// A read-only view of a collection.
///
/// Handed out to consumers of a flat projection: they can read and observe,
/// but all mutation stays with the owner.
#[derive(Clone, Debug)]
pub struct CollectionView {
    inner: Collection,
}

impl CollectionView {
    /// Returns the identity of the viewed collection.
    pub fn id(&self) -> CollectionId {
        self.inner.id()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns a snapshot of the items, in order.
    pub fn items(&self) -> Vec<Item> {
        self.inner.items()
    }

    /// Returns the item at `index`.
    pub fn item_at(&self, index: usize) -> Option<Item> {
        self.inner.item_at(index)
    }

    /// Returns the position of `item`.
    pub fn index_of(&self, item: &Item) -> Option<usize> {
        self.inner.index_of(item)
    }

    /// Returns `true` if `item` is a member.
    pub fn contains(&self, item: &Item) -> bool {
        self.inner.contains(item)
    }

    /// Returns the signals of the viewed collection.
    pub fn signals(&self) -> &CollectionSignals {
        self.inner.signals()
    }
}

static_assertions::assert_impl_all!(Collection: Send, Sync);
static_assertions::assert_impl_all!(CollectionView: Send, Sync);

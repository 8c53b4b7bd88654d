//! Observer bookkeeping for one flat projection.
//!
//! A [`SubscriptionTable`] records every observer a projection has attached
//! to the source hierarchy, keyed by [`SubscriptionTarget`] and scoped to the
//! owning [`ProjectionId`]. Two projections over the same sources each keep
//! their own table, so they never detach each other's observers.
//!
//! The table refuses a second attach to an attached target and a detach of
//! a target that is not attached; both are pairing bugs, not conditions to
//! tolerate. It also keeps a per-target tally of attach and detach calls
//! that outlives the entries themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use flatlist_core::logging::targets;
use flatlist_core::ConnectionId;

use crate::collection::{Collection, CollectionId};
use crate::error::SubscriptionError;
use crate::item::{Item, ItemId};

/// Counter for generating unique projection IDs.
static PROJECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of the projection that owns a set of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectionId(u64);

impl ProjectionId {
    pub(crate) fn next() -> Self {
        Self(PROJECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projection#{}", self.0)
    }
}

/// Something a projection observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// The added/removed observer pair of a collection.
    Collection(CollectionId),
    /// The sub-items-discovered observer of a leaf item.
    Item(ItemId),
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(id) => id.fmt(f),
            Self::Item(id) => id.fmt(f),
        }
    }
}

enum Attachment {
    Collection {
        collection: Collection,
        added: ConnectionId,
        removed: ConnectionId,
    },
    Item {
        item: Item,
        discovered: ConnectionId,
    },
}

impl Attachment {
    fn disconnect(&self) -> Result<(), SubscriptionError> {
        match self {
            Attachment::Collection {
                collection,
                added,
                removed,
            } => {
                let signals = collection.signals();
                let added = signals.item_added.try_disconnect(*added);
                let removed = signals.item_removed.try_disconnect(*removed);
                added.and(removed)?;
            }
            Attachment::Item { item, discovered } => {
                item.sub_items_discovered().try_disconnect(*discovered)?;
            }
        }
        Ok(())
    }
}

/// Lifetime attach/detach counts for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Number of successful attach calls.
    pub attached: u64,
    /// Number of successful detach calls.
    pub detached: u64,
}

impl Tally {
    /// Returns `true` if every attach has been matched by a detach.
    pub fn is_balanced(&self) -> bool {
        self.attached == self.detached
    }
}

/// Aggregate view of a subscription table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Targets currently attached.
    pub live: usize,
    /// Collections currently attached.
    pub collections: usize,
    /// Items currently attached.
    pub items: usize,
    /// Total attach calls over the table's lifetime.
    pub attach_calls: u64,
    /// Total detach calls over the table's lifetime.
    pub detach_calls: u64,
}

impl SubscriptionStats {
    /// Returns `true` if nothing is attached and every attach was detached.
    pub fn is_drained(&self) -> bool {
        self.live == 0 && self.attach_calls == self.detach_calls
    }
}

/// Per-projection record of attached observers.
pub struct SubscriptionTable {
    owner: ProjectionId,
    entries: HashMap<SubscriptionTarget, Attachment>,
    tallies: HashMap<SubscriptionTarget, Tally>,
}

impl SubscriptionTable {
    /// Creates an empty table owned by `owner`.
    pub fn new(owner: ProjectionId) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
            tallies: HashMap::new(),
        }
    }

    /// The projection this table belongs to.
    pub fn owner(&self) -> ProjectionId {
        self.owner
    }

    /// Returns `true` if `target` currently has an observer attached.
    pub fn is_attached(&self, target: SubscriptionTarget) -> bool {
        self.entries.contains_key(&target)
    }

    /// Number of attached targets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attaches an added/removed observer pair to `collection`.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::AlreadyAttached`] if this table already observes
    /// the collection. Nothing is connected in that case.
    pub fn attach_collection<A, R>(
        &mut self,
        collection: &Collection,
        on_added: A,
        on_removed: R,
    ) -> Result<(), SubscriptionError>
    where
        A: Fn(&(Item, usize)) + Send + Sync + 'static,
        R: Fn(&(Item, usize)) + Send + Sync + 'static,
    {
        let target = SubscriptionTarget::Collection(collection.id());
        self.check_detached(target)?;

        let signals = collection.signals();
        let added = signals.item_added.connect(on_added);
        let removed = signals.item_removed.connect(on_removed);
        self.record_attach(
            target,
            Attachment::Collection {
                collection: collection.clone(),
                added,
                removed,
            },
        );
        Ok(())
    }

    /// Attaches a sub-items-discovered observer to `item`.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::AlreadyAttached`] if this table already observes
    /// the item.
    pub fn attach_item<D>(&mut self, item: &Item, on_discovered: D) -> Result<(), SubscriptionError>
    where
        D: Fn(&Item) + Send + Sync + 'static,
    {
        let target = SubscriptionTarget::Item(item.id());
        self.check_detached(target)?;

        let discovered = item.sub_items_discovered().connect(on_discovered);
        self.record_attach(
            target,
            Attachment::Item {
                item: item.clone(),
                discovered,
            },
        );
        Ok(())
    }

    /// Detaches whatever observer is attached to `target`.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::NotAttached`] if `target` is not attached
    /// - [`SubscriptionError::Signal`] if the source had already lost the
    ///   connection; the entry is removed regardless
    pub fn detach(&mut self, target: SubscriptionTarget) -> Result<(), SubscriptionError> {
        let attachment = self
            .entries
            .remove(&target)
            .ok_or(SubscriptionError::NotAttached {
                target,
                owner: self.owner,
            })?;
        self.tallies.entry(target).or_default().detached += 1;
        tracing::debug!(target: targets::SUBSCRIPTION, owner = %self.owner, %target, "detached");
        attachment.disconnect()
    }

    /// Detaches every remaining target and returns how many there were.
    pub fn detach_all(&mut self) -> usize {
        let remaining: Vec<SubscriptionTarget> = self.entries.keys().copied().collect();
        for target in &remaining {
            if let Err(err) = self.detach(*target) {
                tracing::warn!(target: targets::SUBSCRIPTION, owner = %self.owner, %target, %err, "detach failed");
            }
        }
        remaining.len()
    }

    /// Lifetime attach/detach counts for `target`.
    pub fn tally(&self, target: SubscriptionTarget) -> Tally {
        self.tallies.get(&target).copied().unwrap_or_default()
    }

    /// Returns `true` if every target ever attached has been detached as
    /// many times as it was attached.
    pub fn is_balanced(&self) -> bool {
        self.tallies.values().all(Tally::is_balanced)
    }

    /// Aggregate counts.
    pub fn stats(&self) -> SubscriptionStats {
        let collections = self
            .entries
            .keys()
            .filter(|target| matches!(target, SubscriptionTarget::Collection(_)))
            .count();
        let (attach_calls, detach_calls) = self
            .tallies
            .values()
            .fold((0, 0), |(a, d), tally| (a + tally.attached, d + tally.detached));
        SubscriptionStats {
            live: self.entries.len(),
            collections,
            items: self.entries.len() - collections,
            attach_calls,
            detach_calls,
        }
    }

    fn check_detached(&self, target: SubscriptionTarget) -> Result<(), SubscriptionError> {
        if self.entries.contains_key(&target) {
            return Err(SubscriptionError::AlreadyAttached {
                target,
                owner: self.owner,
            });
        }
        Ok(())
    }

    fn record_attach(&mut self, target: SubscriptionTarget, attachment: Attachment) {
        self.entries.insert(target, attachment);
        self.tallies.entry(target).or_default().attached += 1;
        tracing::debug!(target: targets::SUBSCRIPTION, owner = %self.owner, %target, "attached");
    }
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("owner", &self.owner)
            .field("targets", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_detach_collection() {
        let collection = Collection::new();
        let mut table = SubscriptionTable::new(ProjectionId::next());
        let target = SubscriptionTarget::Collection(collection.id());

        table.attach_collection(&collection, |_| {}, |_| {}).unwrap();
        assert!(table.is_attached(target));
        assert_eq!(collection.observer_count(), 2);

        table.detach(target).unwrap();
        assert!(!table.is_attached(target));
        assert_eq!(collection.observer_count(), 0);
        assert_eq!(table.tally(target), Tally { attached: 1, detached: 1 });
    }

    #[test]
    fn test_double_attach_refused() {
        let collection = Collection::new();
        let mut table = SubscriptionTable::new(ProjectionId::next());

        table.attach_collection(&collection, |_| {}, |_| {}).unwrap();
        let err = table
            .attach_collection(&collection, |_| {}, |_| {})
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::AlreadyAttached { .. }));
        assert_eq!(collection.observer_count(), 2);
    }

    #[test]
    fn test_double_detach_refused() {
        let item = Item::new();
        let mut table = SubscriptionTable::new(ProjectionId::next());
        let target = SubscriptionTarget::Item(item.id());

        table.attach_item(&item, |_| {}).unwrap();
        table.detach(target).unwrap();
        assert_eq!(
            table.detach(target),
            Err(SubscriptionError::NotAttached {
                target,
                owner: table.owner(),
            })
        );
        assert_eq!(item.observer_count(), 0);
        assert!(table.is_balanced());
    }

    #[test]
    fn test_tables_are_independent() {
        let collection = Collection::new();
        let mut first = SubscriptionTable::new(ProjectionId::next());
        let mut second = SubscriptionTable::new(ProjectionId::next());
        let target = SubscriptionTarget::Collection(collection.id());

        first.attach_collection(&collection, |_| {}, |_| {}).unwrap();
        second.attach_collection(&collection, |_| {}, |_| {}).unwrap();
        assert_eq!(collection.observer_count(), 4);

        first.detach(target).unwrap();
        assert!(second.is_attached(target));
        assert_eq!(collection.observer_count(), 2);
    }

    #[test]
    fn test_detach_all_and_stats() {
        let collection = Collection::new();
        let items: Vec<Item> = (0..3).map(|_| Item::new()).collect();
        let mut table = SubscriptionTable::new(ProjectionId::next());

        table.attach_collection(&collection, |_| {}, |_| {}).unwrap();
        for item in &items {
            table.attach_item(item, |_| {}).unwrap();
        }

        let stats = table.stats();
        assert_eq!(stats.live, 4);
        assert_eq!(stats.collections, 1);
        assert_eq!(stats.items, 3);
        assert!(!stats.is_drained());

        assert_eq!(table.detach_all(), 4);
        assert!(table.is_empty());
        assert!(table.stats().is_drained());
        assert!(items.iter().all(|item| item.observer_count() == 0));
    }
}

//! The flattening engine.
//!
//! A [`FlattenEngine`] keeps a derived flat [`Collection`] equal to the set of
//! leaf items reachable from a root collection, and keeps it that way while
//! the source hierarchy changes underneath it.
//!
//! # Bookkeeping
//!
//! - Every collection contributing to the projection has an *expansion*
//!   record: how many paths reach it, its depth, and the items it has
//!   contributed so far. Collapsing walks that record rather than the live
//!   collection, so a removal that is still queued can never be lost.
//! - Every leaf in the projection has a *leaf* record counting the paths
//!   that reach it. A leaf reached twice is inserted once and leaves the
//!   projection only when the last path goes away.
//! - Observers are attached through the engine's own
//!   [`SubscriptionTable`], exactly once per contributing target.
//!
//! # Dispatch
//!
//! Source events are queued. If the engine is already applying an event
//! (or building), the new event waits until the current one has finished,
//! so every source mutation is applied as one indivisible unit and nested
//! expansions never re-enter a collection that is mid-walk.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use flatlist_core::logging::{span_names, targets};
use flatlist_core::PerfSpan;
use parking_lot::Mutex;

use crate::collection::{Collection, CollectionId, CollectionView};
use crate::config::FlattenConfig;
use crate::error::{FlattenError, Result};
use crate::item::{Item, ItemId};
use crate::subscription::{
    ProjectionId, SubscriptionStats, SubscriptionTable, SubscriptionTarget, Tally,
};

/// Lifecycle of a flat projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionState {
    /// Not built yet, or a build failed and was unwound.
    Uninitialized,
    /// The initial recursive walk is running.
    Building,
    /// Built and following the source hierarchy.
    Live,
    /// Observers are being detached.
    TearingDown,
    /// Fully torn down. A new engine is needed to flatten the root again.
    Destroyed,
}

impl ProjectionState {
    fn accepts_changes(self) -> bool {
        matches!(self, ProjectionState::Building | ProjectionState::Live)
    }
}

/// A structural change reported by the source hierarchy.
enum SourceEvent {
    Added { collection: CollectionId, item: Item },
    Removed { collection: CollectionId, item: Item },
    Discovered { item: Item },
}

/// A collection currently contributing to the projection.
struct Expansion {
    refs: usize,
    depth: usize,
    members: Vec<Item>,
}

/// A leaf currently in the projection.
struct Leaf {
    refs: usize,
    /// Shallowest depth among the paths reaching it.
    depth: usize,
}

/// Where new leaves go in the flat collection.
enum Placement {
    Append,
    /// Insert at this index, advancing past each inserted leaf.
    At(usize),
}

struct EngineState {
    phase: ProjectionState,
    table: SubscriptionTable,
    expansions: HashMap<CollectionId, Expansion>,
    leaves: HashMap<ItemId, Leaf>,
    walking: HashSet<CollectionId>,
    queue: VecDeque<SourceEvent>,
    draining: bool,
}

impl EngineState {
    fn accepting(&self) -> bool {
        self.phase.accepts_changes()
    }

    fn clear_records(&mut self) {
        self.expansions.clear();
        self.leaves.clear();
        self.walking.clear();
        self.queue.clear();
    }
}

/// Maintains a flat, duplicate-free projection of a nested hierarchy.
///
/// Engines are usually driven through a
/// [`FlatProjectionHandle`](crate::FlatProjectionHandle); using one directly
/// means calling [`build`](Self::build) and [`teardown`](Self::teardown)
/// yourself.
///
/// # Example
///
/// ```
/// use flatlist::{Collection, FlattenConfig, FlattenEngine, Item};
///
/// let a = Item::with_title("A");
/// let b = Item::with_title("B");
/// let root = Collection::from_items([a.clone(), b.clone()]).unwrap();
///
/// let engine = FlattenEngine::new(root.clone(), FlattenConfig::default());
/// engine.build().unwrap();
/// assert_eq!(engine.flat().items(), vec![a, b.clone()]);
///
/// // B turns out to be a folder
/// let c = Item::with_title("C");
/// b.set_sub_collection(Collection::from_items([c.clone()]).unwrap()).unwrap();
/// assert_eq!(engine.flat().len(), 2);
/// assert!(engine.flat().contains(&c));
///
/// engine.teardown();
/// assert_eq!(root.observer_count(), 0);
/// ```
pub struct FlattenEngine {
    id: ProjectionId,
    root: Collection,
    flat: Collection,
    config: FlattenConfig,
    state: Mutex<EngineState>,
    weak: Weak<FlattenEngine>,
}

impl FlattenEngine {
    /// Creates an engine for `root`. Nothing is observed until
    /// [`build`](Self::build).
    pub fn new(root: Collection, config: FlattenConfig) -> Arc<Self> {
        let id = ProjectionId::next();
        Arc::new_cyclic(|weak| Self {
            id,
            root,
            flat: Collection::new(),
            config,
            state: Mutex::new(EngineState {
                phase: ProjectionState::Uninitialized,
                table: SubscriptionTable::new(id),
                expansions: HashMap::new(),
                leaves: HashMap::new(),
                walking: HashSet::new(),
                queue: VecDeque::new(),
                draining: false,
            }),
            weak: weak.clone(),
        })
    }

    /// Identity of the projection this engine maintains.
    pub fn id(&self) -> ProjectionId {
        self.id
    }

    /// The source root collection.
    pub fn root(&self) -> &Collection {
        &self.root
    }

    /// Read-only view of the flat projection.
    pub fn flat(&self) -> CollectionView {
        self.flat.view()
    }

    /// The configuration this engine was created with.
    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProjectionState {
        self.state.lock().phase
    }

    /// Aggregate attach/detach counts of this engine's observers.
    pub fn subscription_stats(&self) -> SubscriptionStats {
        self.state.lock().table.stats()
    }

    /// Lifetime attach/detach counts for one target.
    pub fn tally(&self, target: SubscriptionTarget) -> Tally {
        self.state.lock().table.tally(target)
    }

    /// Runs the initial walk of the root: `Uninitialized -> Building -> Live`.
    ///
    /// Calling it on a live engine does nothing.
    ///
    /// # Errors
    ///
    /// - [`FlattenError::DepthLimitExceeded`] / [`FlattenError::CapacityExceeded`]
    ///   if the hierarchy breaks a configured limit. Everything attached or
    ///   inserted so far is unwound and the engine is `Uninitialized` again.
    /// - [`FlattenError::ProjectionDestroyed`] after [`teardown`](Self::teardown).
    pub fn build(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match state.phase {
                ProjectionState::Uninitialized => {}
                ProjectionState::Building | ProjectionState::Live => return Ok(()),
                ProjectionState::TearingDown | ProjectionState::Destroyed => {
                    return Err(FlattenError::ProjectionDestroyed {
                        root: self.root.id(),
                    });
                }
            }
            state.phase = ProjectionState::Building;
            state.draining = true;
        }
        tracing::debug!(target: targets::ENGINE, owner = %self.id, root = %self.root.id(), "building");

        let result = {
            let _perf = PerfSpan::new(span_names::BUILD);
            let mut placement = Placement::Append;
            self.expand(&self.root, 0, &mut placement)
        };

        match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    if state.phase == ProjectionState::Building {
                        state.phase = ProjectionState::Live;
                    }
                }
                tracing::debug!(target: targets::ENGINE, owner = %self.id, items = self.flat.len(), "live");
                self.drain();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(target: targets::ENGINE, owner = %self.id, %err, "build failed, unwinding");
                let stragglers = {
                    let mut state = self.state.lock();
                    let stragglers = state.table.detach_all();
                    state.clear_records();
                    state.draining = false;
                    state.phase = ProjectionState::Uninitialized;
                    stragglers
                };
                if stragglers > 0 || !self.flat.is_empty() {
                    tracing::warn!(
                        target: targets::ENGINE,
                        owner = %self.id,
                        stragglers,
                        leftover = self.flat.len(),
                        "unwind left state behind"
                    );
                    self.flat.clear();
                }
                Err(err)
            }
        }
    }

    /// Detaches every observer and empties the flat collection:
    /// `Live -> TearingDown -> Destroyed`.
    ///
    /// Safe to call from inside an observer of the flat collection while a
    /// source event is being applied; the interrupted event stops making
    /// changes and nothing stays attached.
    pub fn teardown(&self) {
        {
            let mut state = self.state.lock();
            match state.phase {
                ProjectionState::Building | ProjectionState::Live => {}
                ProjectionState::Uninitialized => {
                    state.phase = ProjectionState::Destroyed;
                    return;
                }
                ProjectionState::TearingDown | ProjectionState::Destroyed => return,
            }
            state.phase = ProjectionState::TearingDown;
            state.queue.clear();
        }
        tracing::debug!(target: targets::ENGINE, owner = %self.id, "tearing down");

        {
            let _perf = PerfSpan::new(span_names::TEARDOWN);
            let mut visited = HashSet::new();
            self.collapse_top_down(&self.root, &mut visited);

            // Expansions still on the stack of an interrupted event are not
            // reachable from the root yet.
            let stragglers = {
                let mut state = self.state.lock();
                let stragglers = state.table.detach_all();
                state.clear_records();
                stragglers
            };
            if stragglers > 0 {
                tracing::warn!(target: targets::ENGINE, owner = %self.id, stragglers, "swept unreachable subscriptions");
            }
            if !self.flat.is_empty() {
                tracing::warn!(target: targets::ENGINE, owner = %self.id, leftover = self.flat.len(), "clearing unreachable leaves");
                self.flat.clear();
            }
        }

        self.state.lock().phase = ProjectionState::Destroyed;
        tracing::debug!(target: targets::ENGINE, owner = %self.id, "destroyed");
    }

    // -------------------------------------------------------------------------
    // Expansion and collapse
    // -------------------------------------------------------------------------

    /// Observes `collection` and inserts its items.
    ///
    /// A collection that is already contributing only gains a reference. On
    /// error, everything this call inserted or attached is undone.
    fn expand(&self, collection: &Collection, depth: usize, placement: &mut Placement) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(FlattenError::DepthLimitExceeded {
                limit: self.config.max_depth,
            });
        }

        let id = collection.id();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.accepting() {
                return Ok(());
            }
            if let Some(expansion) = state.expansions.get_mut(&id) {
                expansion.refs += 1;
                tracing::trace!(target: targets::ENGINE, collection = %id, refs = expansion.refs, "already expanded");
                return Ok(());
            }
            let (on_added, on_removed) = self.collection_observers(id);
            state.table.attach_collection(collection, on_added, on_removed)?;
            state.expansions.insert(
                id,
                Expansion {
                    refs: 1,
                    depth,
                    members: Vec::new(),
                },
            );
            state.walking.insert(id);
        }
        tracing::trace!(target: targets::ENGINE, collection = %id, depth, "expanding");

        let mut failure = None;
        for item in collection.items() {
            if let Err(err) = self.insert_item(&item, depth, placement) {
                failure = Some(err);
                break;
            }
            let mut state = self.state.lock();
            match state.expansions.get_mut(&id) {
                Some(expansion) => expansion.members.push(item),
                None => break,
            }
        }
        self.state.lock().walking.remove(&id);

        match failure {
            Some(err) => {
                self.abandon(id);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Undoes a failed expansion of `id`.
    fn abandon(&self, id: CollectionId) {
        let members = {
            let mut state = self.state.lock();
            match state.expansions.get_mut(&id) {
                Some(expansion) => std::mem::take(&mut expansion.members),
                None => return,
            }
        };
        for item in members.iter().rev() {
            self.remove_item(item);
        }

        let mut state = self.state.lock();
        state.expansions.remove(&id);
        if state.accepting() {
            if let Err(err) = state.table.detach(SubscriptionTarget::Collection(id)) {
                tracing::error!(target: targets::ENGINE, collection = %id, %err, "detach failed while unwinding");
            }
        }
    }

    /// Removes what `collection` contributed and stops observing it, once
    /// the last path reaching it is gone.
    fn collapse(&self, collection: &Collection) {
        let id = collection.id();
        let members = {
            let mut state = self.state.lock();
            if state.walking.contains(&id) {
                return;
            }
            let refs = match state.expansions.get_mut(&id) {
                Some(expansion) if expansion.refs > 1 => {
                    expansion.refs -= 1;
                    return;
                }
                Some(expansion) => expansion.refs,
                None => return,
            };
            debug_assert_eq!(refs, 1);
            state.walking.insert(id);
            state
                .expansions
                .remove(&id)
                .map(|expansion| expansion.members)
                .unwrap_or_default()
        };
        tracing::trace!(target: targets::ENGINE, collection = %id, members = members.len(), "collapsing");

        for item in &members {
            self.remove_item(item);
        }

        let mut state = self.state.lock();
        state.walking.remove(&id);
        if state.accepting() {
            if let Err(err) = state.table.detach(SubscriptionTarget::Collection(id)) {
                tracing::error!(target: targets::ENGINE, collection = %id, %err, "detach failed");
            }
        }
    }

    /// Teardown walk: detaches each collection before descending into it,
    /// ignoring reference counts.
    fn collapse_top_down(&self, collection: &Collection, visited: &mut HashSet<CollectionId>) {
        let id = collection.id();
        if !visited.insert(id) {
            return;
        }

        let members = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let target = SubscriptionTarget::Collection(id);
            if state.table.is_attached(target) {
                if let Err(err) = state.table.detach(target) {
                    tracing::warn!(target: targets::ENGINE, collection = %id, %err, "detach failed");
                }
            }
            state
                .expansions
                .remove(&id)
                .map(|expansion| expansion.members)
                .unwrap_or_default()
        };

        for item in &members {
            let was_leaf = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match state.leaves.remove(&item.id()) {
                    Some(_) => {
                        let target = SubscriptionTarget::Item(item.id());
                        if state.table.is_attached(target) {
                            if let Err(err) = state.table.detach(target) {
                                tracing::warn!(target: targets::ENGINE, item = %item.id(), %err, "detach failed");
                            }
                        }
                        true
                    }
                    None => false,
                }
            };
            if was_leaf {
                self.flat.remove(item);
            } else if let Some(sub) = item.sub_collection() {
                self.collapse_top_down(&sub, visited);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Adds one path to `item`: expands it if internal, otherwise makes sure
    /// it is in the flat collection exactly once.
    ///
    /// An item still recorded as a leaf counts as one more leaf path even if
    /// it already owns a sub-collection: its queued discovery removes the
    /// leaf first and then expands once per path.
    fn insert_item(&self, item: &Item, depth: usize, placement: &mut Placement) -> Result<()> {
        let id = item.id();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.accepting() {
                return Ok(());
            }
            if let Some(leaf) = state.leaves.get_mut(&id) {
                leaf.refs += 1;
                // Discovery expands from the shallowest path.
                leaf.depth = leaf.depth.min(depth);
                tracing::trace!(target: targets::ENGINE, item = %id, refs = leaf.refs, "duplicate suppressed");
                return Ok(());
            }
            if let Some(sub) = item.sub_collection() {
                drop(guard);
                return self.expand(&sub, depth + 1, placement);
            }
            if let Some(limit) = self.config.max_items {
                if self.flat.len() >= limit {
                    return Err(FlattenError::CapacityExceeded { limit });
                }
            }
            state.table.attach_item(item, self.discovery_observer())?;
            state.leaves.insert(id, Leaf { refs: 1, depth });
        }

        let inserted = match placement {
            Placement::Append => self.flat.push(item.clone()).map(|_| ()),
            Placement::At(index) => {
                let at = (*index).min(self.flat.len());
                let inserted = self.flat.insert(at, item.clone());
                if inserted.is_ok() {
                    *index = at + 1;
                }
                inserted
            }
        };
        if let Err(err) = inserted {
            let mut state = self.state.lock();
            state.leaves.remove(&id);
            if let Err(detach_err) = state.table.detach(SubscriptionTarget::Item(id)) {
                tracing::error!(target: targets::ENGINE, item = %id, err = %detach_err, "detach failed while unwinding");
            }
            return Err(err.into());
        }
        tracing::trace!(target: targets::ENGINE, item = %id, depth, "leaf inserted");
        Ok(())
    }

    /// Removes one path to `item`, mirroring whatever form it was inserted in.
    fn remove_item(&self, item: &Item) {
        let id = item.id();
        let was_leaf = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.leaves.get(&id).map(|leaf| leaf.refs) {
                Some(refs) if refs > 1 => {
                    if let Some(leaf) = state.leaves.get_mut(&id) {
                        leaf.refs -= 1;
                    }
                    return;
                }
                Some(_) => {
                    state.leaves.remove(&id);
                    if let Err(err) = state.table.detach(SubscriptionTarget::Item(id)) {
                        tracing::error!(target: targets::ENGINE, item = %id, %err, "detach failed");
                    }
                    true
                }
                None => false,
            }
        };

        if was_leaf {
            // Absent means it is already gone; never remove by a guessed index.
            if self.flat.remove(item).is_some() {
                tracing::trace!(target: targets::ENGINE, item = %id, "leaf removed");
            }
        } else if let Some(sub) = item.sub_collection() {
            self.collapse(&sub);
        }
    }

    /// Replaces a leaf that just gained sub-items with its descendants.
    ///
    /// The leaf's removal is announced before any descendant is inserted.
    fn on_sub_items_discovered(&self, item: &Item) {
        let Some(sub) = item.sub_collection() else {
            return;
        };
        let id = item.id();
        let (refs, depth) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.accepting() {
                return;
            }
            let Some(leaf) = state.leaves.remove(&id) else {
                return;
            };
            if let Err(err) = state.table.detach(SubscriptionTarget::Item(id)) {
                tracing::error!(target: targets::ENGINE, item = %id, %err, "detach failed");
            }
            (leaf.refs, leaf.depth)
        };

        let former = self.flat.remove(item);
        tracing::debug!(target: targets::ENGINE, item = %id, sub = %sub.id(), ?former, "expanding discovered sub-items");

        let mut placement = match former {
            Some(index) if self.config.insert_in_place => Placement::At(index),
            _ => Placement::Append,
        };
        for _ in 0..refs {
            if let Err(err) = self.expand(&sub, depth + 1, &mut placement) {
                tracing::error!(target: targets::ENGINE, item = %id, %err, "discovered sub-items dropped");
                break;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Event dispatch
    // -------------------------------------------------------------------------

    fn collection_observers(
        &self,
        collection: CollectionId,
    ) -> (
        impl Fn(&(Item, usize)) + Send + Sync + 'static,
        impl Fn(&(Item, usize)) + Send + Sync + 'static,
    ) {
        let on_added = self.weak.clone();
        let on_removed = self.weak.clone();
        (
            move |(item, _): &(Item, usize)| {
                if let Some(engine) = on_added.upgrade() {
                    engine.dispatch(SourceEvent::Added {
                        collection,
                        item: item.clone(),
                    });
                }
            },
            move |(item, _): &(Item, usize)| {
                if let Some(engine) = on_removed.upgrade() {
                    engine.dispatch(SourceEvent::Removed {
                        collection,
                        item: item.clone(),
                    });
                }
            },
        )
    }

    fn discovery_observer(&self) -> impl Fn(&Item) + Send + Sync + 'static {
        let engine = self.weak.clone();
        move |item: &Item| {
            if let Some(engine) = engine.upgrade() {
                engine.dispatch(SourceEvent::Discovered { item: item.clone() });
            }
        }
    }

    /// Queues `event` and, unless an event is already being applied, applies
    /// everything queued.
    fn dispatch(&self, event: SourceEvent) {
        {
            let mut state = self.state.lock();
            if !state.accepting() {
                tracing::trace!(target: targets::ENGINE, owner = %self.id, "event after teardown ignored");
                return;
            }
            state.queue.push_back(event);
            if state.draining {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let event = {
                let mut state = self.state.lock();
                let next = if state.phase == ProjectionState::Live {
                    state.queue.pop_front()
                } else {
                    None
                };
                match next {
                    Some(event) => event,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            self.apply(event);
        }
    }

    fn apply(&self, event: SourceEvent) {
        let _perf = PerfSpan::new(span_names::DISPATCH);
        match event {
            SourceEvent::Added { collection, item } => {
                let depth = {
                    let state = self.state.lock();
                    match state.expansions.get(&collection) {
                        Some(expansion) if !expansion.members.contains(&item) => expansion.depth,
                        _ => return,
                    }
                };
                let mut placement = Placement::Append;
                match self.insert_item(&item, depth, &mut placement) {
                    Ok(()) => {
                        let mut state = self.state.lock();
                        if let Some(expansion) = state.expansions.get_mut(&collection) {
                            expansion.members.push(item);
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            target: targets::ENGINE,
                            owner = %self.id,
                            %collection,
                            item = %item.id(),
                            %err,
                            "source item not flattened"
                        );
                    }
                }
            }
            SourceEvent::Removed { collection, item } => {
                let contributed = {
                    let mut state = self.state.lock();
                    match state.expansions.get_mut(&collection) {
                        Some(expansion) => match expansion.members.iter().position(|m| *m == item) {
                            Some(pos) => {
                                expansion.members.remove(pos);
                                true
                            }
                            None => false,
                        },
                        None => false,
                    }
                };
                if contributed {
                    self.remove_item(&item);
                }
            }
            SourceEvent::Discovered { item } => self.on_sub_items_discovered(&item),
        }
    }
}

impl fmt::Debug for FlattenEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FlattenEngine")
            .field("id", &self.id)
            .field("root", &self.root.id())
            .field("phase", &state.phase)
            .field("leaves", &state.leaves.len())
            .field("expansions", &state.expansions.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(FlattenEngine: Send, Sync);

//! Shared helpers for the flatlist integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use flatlist::{Collection, CollectionId, CollectionView, Item, ItemId};
use parking_lot::Mutex;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn leaf(title: &str) -> Item {
    Item::with_title(title)
}

pub fn folder(title: &str, children: Vec<Item>) -> Item {
    Item::with_sub_collection(title, Collection::from_items(children).expect("unique children"))
}

pub fn titles(items: &[Item]) -> Vec<String> {
    items.iter().filter_map(Item::title).collect()
}

/// Leaves reachable from `root`, computed without the engine.
pub fn reference_leaves(root: &Collection) -> HashSet<ItemId> {
    fn walk(collection: &Collection, visited: &mut HashSet<CollectionId>, out: &mut HashSet<ItemId>) {
        if !visited.insert(collection.id()) {
            return;
        }
        for item in collection.items() {
            match item.sub_collection() {
                Some(sub) => walk(&sub, visited, out),
                None => {
                    out.insert(item.id());
                }
            }
        }
    }

    let mut visited = HashSet::new();
    let mut out = HashSet::new();
    walk(root, &mut visited, &mut out);
    out
}

/// Collections reachable from `root`, including `root`.
pub fn reachable_collections(root: &Collection) -> Vec<Collection> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(collection) = stack.pop() {
        if !seen.insert(collection.id()) {
            continue;
        }
        for item in collection.items() {
            if let Some(sub) = item.sub_collection() {
                stack.push(sub);
            }
        }
        out.push(collection);
    }
    out
}

/// Panics if any identity appears twice in `items`.
pub fn assert_no_duplicates(items: &[Item]) {
    let mut seen = HashSet::new();
    for item in items {
        assert!(seen.insert(item.id()), "{} appears twice", item.id());
    }
}

/// One change observed on a flat collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatEvent {
    Added(String, usize),
    Removed(String, usize),
}

/// Records every change announced by a flat collection.
pub fn record_events(view: &CollectionView) -> Arc<Mutex<Vec<FlatEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));

    let added = Arc::clone(&log);
    view.signals().item_added.connect(move |(item, index)| {
        added
            .lock()
            .push(FlatEvent::Added(item.title().unwrap_or_default(), *index));
    });

    let removed = Arc::clone(&log);
    view.signals().item_removed.connect(move |(item, index)| {
        removed
            .lock()
            .push(FlatEvent::Removed(item.title().unwrap_or_default(), *index));
    });

    log
}

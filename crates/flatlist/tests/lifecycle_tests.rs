//! Projection lifecycle, sharing and limit tests.

mod common;

use std::thread;

use common::{folder, init_logging, leaf, reachable_collections, reference_leaves, titles};
use flatlist::{
    Collection, FlatProjectionHandle, FlattenConfig, FlattenError, Item, ItemRole,
    ProjectionRegistry, ProjectionState,
};

fn leaf_ids(handle: &FlatProjectionHandle) -> std::collections::HashSet<flatlist::ItemId> {
    handle.items().iter().map(Item::id).collect()
}

#[test]
fn test_reacquire_after_release_reflects_current_hierarchy() {
    init_logging();
    let sub = Collection::from_items([leaf("B")]).unwrap();
    let root = Collection::from_items([leaf("A"), Item::with_sub_collection("F", sub.clone())]).unwrap();
    let registry = ProjectionRegistry::new();

    let first = registry.acquire(&root).unwrap();
    assert_eq!(titles(&first.items()), vec!["A", "B"]);
    first.release();
    assert_eq!(root.observer_count(), 0);

    // Changed while nobody was looking.
    sub.push(leaf("C")).unwrap();
    root.remove_at(0).unwrap();

    let second = registry.acquire(&root).unwrap();
    assert_eq!(second.state(), ProjectionState::Live);
    assert_eq!(titles(&second.items()), vec!["B", "C"]);
    assert_eq!(leaf_ids(&second), reference_leaves(&root));
}

#[test]
fn test_registry_shares_until_last_release() {
    init_logging();
    let root = Collection::from_items([leaf("A")]).unwrap();
    let registry = ProjectionRegistry::new();

    let first = registry.acquire(&root).unwrap();
    let second = registry.acquire(&root).unwrap();
    assert!(first.same_projection(&second));
    assert_eq!(root.observer_count(), 2);

    first.release();
    assert_eq!(second.state(), ProjectionState::Live);
    root.push(leaf("B")).unwrap();
    assert_eq!(titles(&second.items()), vec!["A", "B"]);

    second.release();
    assert_eq!(root.observer_count(), 0);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_independent_projections_over_shared_collection() {
    init_logging();
    let shared = Collection::from_items([leaf("S")]).unwrap();
    let left_root = Collection::from_items([Item::with_sub_collection("L", shared.clone())]).unwrap();
    let right_root = Collection::from_items([Item::with_sub_collection("R", shared.clone())]).unwrap();
    let registry = ProjectionRegistry::new();

    let left = registry.acquire(&left_root).unwrap();
    let right = registry.acquire(&right_root).unwrap();
    assert_ne!(left.projection_id(), right.projection_id());
    assert_eq!(shared.observer_count(), 4);

    left.release();
    assert_eq!(shared.observer_count(), 2);

    shared.push(leaf("T")).unwrap();
    assert_eq!(titles(&right.items()), vec!["S", "T"]);
    assert_eq!(right.subscription_stats().collections, 2);
}

#[test]
fn test_subscriptions_balanced_after_teardown() {
    init_logging();
    let c = leaf("C");
    let root = Collection::from_items([
        leaf("A"),
        folder("F", vec![leaf("B"), folder("G", vec![c.clone()])]),
    ])
    .unwrap();
    let collections = reachable_collections(&root);
    let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();

    let stats = handle.subscription_stats();
    assert_eq!(stats.collections, collections.len());
    assert_eq!(stats.items, 3);

    c.set_sub_collection(Collection::from_items([leaf("D")]).unwrap()).unwrap();
    assert_eq!(handle.subscription_stats().collections, collections.len() + 1);
    let view = handle.collection();

    handle.release();
    assert!(view.is_empty());
    for collection in reachable_collections(&root) {
        assert_eq!(collection.observer_count(), 0, "{} still observed", collection.id());
    }
    assert_eq!(c.observer_count(), 0);
}

#[test]
fn test_depth_limit_unwinds_acquire() {
    init_logging();
    let root = Collection::from_items([
        leaf("A"),
        folder("F", vec![leaf("B"), folder("G", vec![folder("H", vec![leaf("deep")])])]),
    ])
    .unwrap();
    let config = FlattenConfig::builder().max_depth(2).build();

    let err = FlatProjectionHandle::acquire(&root, config).unwrap_err();
    assert_eq!(err, FlattenError::DepthLimitExceeded { limit: 2 });
    assert!(err.is_resource_limit());
    for collection in reachable_collections(&root) {
        assert_eq!(collection.observer_count(), 0);
    }

    let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();
    assert_eq!(titles(&handle.items()), vec!["A", "B", "deep"]);
}

#[test]
fn test_capacity_limit_unwinds_registry_acquire() {
    init_logging();
    let a = leaf("A");
    let root = Collection::from_items([a.clone(), leaf("B"), leaf("C")]).unwrap();
    let registry = ProjectionRegistry::with_config(FlattenConfig::builder().max_items(2).build());

    let err = registry.acquire(&root).unwrap_err();
    assert_eq!(err, FlattenError::CapacityExceeded { limit: 2 });
    assert_eq!(registry.live_count(), 0);
    assert_eq!(root.observer_count(), 0);
    assert_eq!(a.observer_count(), 0);

    root.remove_at(2).unwrap();
    let handle = registry.acquire(&root).unwrap();
    assert_eq!(handle.row_count(), 2);
}

#[test]
fn test_cycle_terminates_and_tears_down() {
    init_logging();
    let root = Collection::new();
    let inner = Collection::new();
    root.push(leaf("A")).unwrap();
    root.push(Item::with_sub_collection("inner", inner.clone())).unwrap();
    inner.push(leaf("B")).unwrap();
    inner.push(Item::with_sub_collection("back", root.clone())).unwrap();

    let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();
    assert_eq!(titles(&handle.items()), vec!["A", "B"]);

    inner.push(leaf("C")).unwrap();
    assert_eq!(titles(&handle.items()), vec!["A", "B", "C"]);

    handle.release();
    assert_eq!(root.observer_count(), 0);
    assert_eq!(inner.observer_count(), 0);

    // drop the back edge so both collections can be freed
    inner.clear();
}

#[test]
fn test_appended_discovery() {
    init_logging();
    let b = leaf("B");
    let root = Collection::from_items([leaf("A"), b.clone(), leaf("Z")]).unwrap();
    let config = FlattenConfig::builder().insert_in_place(false).build();
    let handle = FlatProjectionHandle::acquire(&root, config).unwrap();

    b.set_sub_collection(Collection::from_items([leaf("C")]).unwrap()).unwrap();
    assert_eq!(titles(&handle.items()), vec!["A", "Z", "C"]);
}

#[test]
fn test_role_access() {
    init_logging();
    let item = Item::with_title("big buck bunny");
    item.set_data(ItemRole::Mrl, "file:///movies/bbb.mkv");
    item.set_data(ItemRole::Duration, 596_000i64);
    let root = Collection::from_items([item.clone()]).unwrap();
    let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();

    assert_eq!(handle.data(0, ItemRole::Mrl).as_string(), Some("file:///movies/bbb.mkv"));
    assert_eq!(handle.data(0, ItemRole::Duration).as_int(), Some(596_000));
    assert_eq!(handle.data(0, ItemRole::TitleFirstSymbol).as_string(), Some("B"));
    assert_eq!(handle.row_of(&item), Some(0));
    assert!(handle.role_names().contains(&(ItemRole::DisplayMrl, "display_mrl")));
}

#[test]
fn test_last_handle_dropped_on_another_thread() {
    init_logging();
    let root = Collection::from_items([leaf("A")]).unwrap();
    let handle = FlatProjectionHandle::acquire(&root, FlattenConfig::default()).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || handle.row_count())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 1);
    }
    assert_eq!(handle.handle_count(), 1);

    thread::spawn(move || drop(handle)).join().unwrap();
    assert_eq!(root.observer_count(), 0);
}

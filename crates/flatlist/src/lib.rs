//! flatlist - a live, duplicate-free flat view over a nested collection
//! hierarchy.
//!
//! Media libraries are trees: playlists hold folders, folders hold files,
//! and a file may turn out to be a container (an archive, a playlist file)
//! only once it has been parsed. A [`FlatProjectionHandle`] presents such a
//! tree as one flat [`Collection`] of leaf items and keeps it current while
//! items are added, removed, or discover sub-items of their own.
//!
//! # Example
//!
//! ```
//! use flatlist::{Collection, Item, ProjectionRegistry};
//!
//! let album = Collection::from_items([Item::with_title("Track 1")]).unwrap();
//! let root = Collection::from_items([
//!     Item::with_title("Intro"),
//!     Item::with_sub_collection("Album", album.clone()),
//! ])
//! .unwrap();
//!
//! let registry = ProjectionRegistry::new();
//! let flat = registry.acquire(&root).unwrap();
//! assert_eq!(flat.row_count(), 2);
//!
//! album.push(Item::with_title("Track 2")).unwrap();
//! assert_eq!(flat.row_count(), 3);
//! ```
//!
//! # Logging
//!
//! Everything is instrumented with `tracing` under the targets in
//! [`flatlist_core::logging::targets`].

pub mod collection;
pub mod config;
pub mod engine;
mod error;
pub mod item;
pub mod projection;
pub mod role;
pub mod subscription;

pub use collection::{Collection, CollectionId, CollectionSignals, CollectionView};
pub use config::{FlattenConfig, FlattenConfigBuilder};
pub use engine::{FlattenEngine, ProjectionState};
pub use error::{CollectionError, FlattenError, Result, SubscriptionError};
pub use item::{Item, ItemId};
pub use projection::{FlatProjectionHandle, ProjectionRegistry};
pub use role::{ItemData, ItemRole};
pub use subscription::{
    ProjectionId, SubscriptionStats, SubscriptionTable, SubscriptionTarget, Tally,
};

pub use flatlist_core::{Signal, SignalError};

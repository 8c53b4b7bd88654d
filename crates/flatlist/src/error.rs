//! Error types for flatlist.

use flatlist_core::SignalError;

use crate::collection::CollectionId;
use crate::item::ItemId;
use crate::subscription::{ProjectionId, SubscriptionTarget};

/// Result type alias for flattening operations.
pub type Result<T> = std::result::Result<T, FlattenError>;

/// Errors raised by [`Collection`](crate::Collection) and
/// [`Item`](crate::Item) mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// The item is already a member of the collection.
    #[error("{item} is already a member of {collection}")]
    DuplicateItem {
        collection: CollectionId,
        item: ItemId,
    },

    /// Positional access outside the collection.
    #[error("index {index} out of bounds for {collection} of length {len}")]
    IndexOutOfBounds {
        collection: CollectionId,
        index: usize,
        len: usize,
    },

    /// The item already owns a sub-collection.
    #[error("{item} already owns a sub-collection")]
    SubItemsAlreadyPresent { item: ItemId },
}

/// Attach/detach pairing violations caught by the subscription table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// An observer pair is already attached to the target.
    #[error("{target} is already attached for {owner}")]
    AlreadyAttached {
        target: SubscriptionTarget,
        owner: ProjectionId,
    },

    /// No observer is attached to the target.
    #[error("{target} is not attached for {owner}")]
    NotAttached {
        target: SubscriptionTarget,
        owner: ProjectionId,
    },

    /// The underlying signal refused the disconnect.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
}

/// Errors surfaced by the flattening engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlattenError {
    /// Expansion went deeper than [`FlattenConfig::max_depth`](crate::FlattenConfig).
    #[error("hierarchy is deeper than the configured limit of {limit} levels")]
    DepthLimitExceeded { limit: usize },

    /// The flat projection would grow past
    /// [`FlattenConfig::max_items`](crate::FlattenConfig).
    #[error("flat projection would exceed the configured limit of {limit} items")]
    CapacityExceeded { limit: usize },

    /// The projection was torn down and cannot be rebuilt in place.
    #[error("projection over {root} has been destroyed")]
    ProjectionDestroyed { root: CollectionId },

    /// A collection operation failed.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// A subscription invariant was violated.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),
}

impl FlattenError {
    /// Returns `true` for the limit errors standing in for resource
    /// exhaustion.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::DepthLimitExceeded { .. } | Self::CapacityExceeded { .. }
        )
    }
}

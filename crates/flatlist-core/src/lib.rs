//! Core observer primitives for flatlist.
//!
//! This crate provides the foundations the flattening engine is built on:
//!
//! - **Signal/Slot System**: Synchronous, re-entrant observer callbacks
//! - **Errors**: Errors raised by the signal layer
//! - **Logging**: Stable `tracing` targets and performance spans
//!
//! # Signal/Slot Example
//!
//! ```
//! use flatlist_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```

mod error;
pub mod logging;
pub mod signal;

pub use error::SignalError;
pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, Signal};

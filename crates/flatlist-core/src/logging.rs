//! Logging facilities for flatlist.
//!
//! flatlist uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Every event is emitted under one of the [`targets`], so a directive such
//! as `RUST_LOG=flatlist::engine=trace` isolates the flattening engine.

/// Span names used throughout flatlist for tracing.
pub mod span_names {
    /// Initial recursive walk of a root collection.
    pub const BUILD: &str = "flatlist::build";
    /// Teardown of a flat projection.
    pub const TEARDOWN: &str = "flatlist::teardown";
    /// Processing of one queued source event.
    pub const DISPATCH: &str = "flatlist::dispatch";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "flatlist_core::signal";
    /// Source and flat collection mutations.
    pub const COLLECTION: &str = "flatlist::collection";
    /// Observer attach/detach bookkeeping.
    pub const SUBSCRIPTION: &str = "flatlist::subscription";
    /// Flattening engine.
    pub const ENGINE: &str = "flatlist::engine";
    /// Projection lifecycle and handles.
    pub const PROJECTION: &str = "flatlist::projection";
    /// Performance spans.
    pub const PERF: &str = "flatlist::perf";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "flatlist::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

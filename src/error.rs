//! Error types surfaced on the routing path.
//!
//! Control-plane operations (`add_sink`, `remove_sink`, `on_node_down`)
//! never raise: membership churn is recovered from locally by expanding or
//! contracting the aperture. Only `get()` can fail, and only in the one way
//! described below.
use thiserror::Error;

/// Errors returned from the balancer's routing path.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ApertureError {
    /// `get()` found no open node to route to: the aperture is empty and
    /// there was no idle endpoint available to backfill it with.
    #[error("no routable endpoint: aperture is empty and no idle endpoint is available")]
    NoRoutableEndpoint,
}

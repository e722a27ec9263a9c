//! A client-side **aperture load balancer**: it routes outgoing calls over a
//! dynamic subset ("aperture") of a larger server pool, sized to keep each
//! active server's concurrent-request load inside a configured band.
//!
//! Offered load is tracked as an exponentially weighted moving average (see
//! [`ema`]) sampled off a skew-compensated [`clock`]. The aperture itself is
//! a least-loaded selection heap (see [`heap`] and [`balancer`]); the
//! feedback loop that resizes it and the periodic jitter that rotates its
//! membership live in [`aperture`].
//!
//! # Example
//!
//! ```rust
//! use aperture_balancer::aperture::{ApertureConfig, ApertureController};
//! use aperture_balancer::heap::Channel;
//! use std::sync::Arc;
//!
//! struct AlwaysOpen;
//! impl Channel for AlwaysOpen {
//!     fn is_open(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Creating the controller's configuration...
//! let config = ApertureConfig::new().with_min_size(2);
//! // ...and the controller itself (this does not start the jitter loop).
//! let balancer = Arc::new(ApertureController::<&'static str>::new("my-service", config));
//!
//! // Registering endpoints as the server set discovers them...
//! for endpoint in ["host-a", "host-b", "host-c"] {
//!     balancer
//!         .add_sink(endpoint, Arc::new(|_: &&str| Box::new(AlwaysOpen) as Box<dyn Channel>))
//!         .await;
//! }
//!
//! // ...and routing requests through it.
//! let handle = balancer.get().await.expect("a routable endpoint");
//! balancer.put(handle).await;
//!
//! // Optionally, start the background jitter loop that periodically swaps
//! // one active endpoint for an idle one.
//! balancer.start_default_jitter();
//! # }
//! ```
pub mod aperture;
pub mod balancer;
pub mod clock;
pub mod ema;
pub mod error;
pub mod heap;
pub mod jitter;
pub mod metrics;

pub use aperture::{ApertureConfig, ApertureController};
pub use error::ApertureError;

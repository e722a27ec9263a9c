//! The balancer's metrics surface: three gauges, published through the
//! `metrics` facade.
//!
//! `metrics::gauge!` is a NoOp until a recorder is installed by the host
//! process, so these calls are safe to make unconditionally -- a binary
//! that never installs a Prometheus (or any other) recorder simply doesn't
//! pay for it. This mirrors how `rshogi-csa-server-tcp` pulls in `metrics`
//! as a pure facade dependency and leaves recorder installation to the
//! binary crate.
use metrics::gauge;

/// Publishes the current active/idle aperture sizes for `service`.
pub fn publish_sizes(service: &str, active: usize, idle: usize) {
    gauge!("aperture_active", "service" => service.to_string()).set(active as f64);
    gauge!("aperture_idle", "service" => service.to_string()).set(idle as f64);
}

/// Publishes the most recently computed per-node load average for
/// `service`. Not called when the aperture is empty (see
/// [`crate::aperture::ApertureController::adjust_aperture`]).
pub fn publish_load_average(service: &str, per_node_load: f64) {
    gauge!("aperture_load_average", "service" => service.to_string()).set(per_node_load);
}

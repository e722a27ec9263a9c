//! The base heap balancer: owns channels for active endpoints and drives a
//! [`BalancerPolicy`]'s lifecycle hooks on every mutation.
//!
//! This mirrors the way `bastion`'s `Children` group drives its
//! `Callbacks` on every lifecycle event, but replaces subclass-style
//! overrides with an explicit policy type parameter (see `DESIGN.md`).
use crate::error::ApertureError;
use crate::heap::{Channel, Heap};
use futures::future::{self, BoxFuture};
use log::trace;
use std::hash::Hash;

/// The five lifecycle hooks a [`HeapBalancer`] invokes. Implemented by
/// [`crate::aperture::ApertureController`], which *is* the policy for its
/// own heap rather than a separate object, since there is exactly one
/// policy wired up per balancer instance.
pub trait BalancerPolicy<E> {
    /// Called after a node has been appended to the heap.
    fn on_node_added(&mut self, endpoint: &E);
    /// Called after a node has been removed from the heap.
    fn on_node_removed(&mut self, endpoint: &E);
    /// Called after `get()` has picked a node and incremented its load.
    fn on_get(&mut self, endpoint: &E);
    /// Called after `put()` has decremented a node's load.
    fn on_put(&mut self, endpoint: &E);
    /// Called when a node's channel transitions to closed. Returns a
    /// completion handle for whatever recovery action the policy takes.
    fn on_node_down(&mut self, endpoint: &E) -> BoxFuture<'static, ()>;
}

/// A handle returned by [`HeapBalancer::get`] and consumed by
/// [`HeapBalancer::put`]. Deliberately carries no `Drop` impl that would
/// auto-`put` on cancellation: the strict pairing invariant (every `get`
/// matched by exactly one `put`) is the caller's responsibility to uphold,
/// and silently papering over a dropped handle would hide the very misuse
/// the spec wants surfaced as load-counter drift instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapHandle<E> {
    pub endpoint: E,
}

/// A min-heap of active endpoints keyed by `(load, index)`, exposing
/// `get`/`put`/`add_sink`/`remove_sink`/`on_node_down` and invoking
/// `P`'s hooks on every state change.
pub struct HeapBalancer<E, P> {
    heap: Heap<E>,
    policy: P,
}

impl<E, P> HeapBalancer<E, P>
where
    E: Clone + Eq + Hash + std::fmt::Debug,
    P: BalancerPolicy<E>,
{
    pub fn new(policy: P) -> Self {
        HeapBalancer {
            heap: Heap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn heap(&self) -> &Heap<E> {
        &self.heap
    }

    /// Number of currently open nodes in the heap.
    pub fn open_count(&self) -> usize {
        self.heap.open_count()
    }

    pub fn contains(&self, endpoint: &E) -> bool {
        self.heap.contains(endpoint)
    }

    /// Appends `endpoint` to the heap with a freshly created channel and
    /// invokes `on_node_added`.
    pub fn add_sink(&mut self, endpoint: E, channel: Box<dyn Channel>) {
        trace!("HeapBalancer: adding sink for {:?}.", endpoint);
        self.heap.push(endpoint.clone(), channel);
        self.policy.on_node_added(&endpoint);
    }

    /// Removes `endpoint` from the heap (no-op if absent) and invokes
    /// `on_node_removed`.
    pub fn remove_sink(&mut self, endpoint: &E) {
        if self.heap.remove(endpoint).is_some() {
            trace!("HeapBalancer: removed sink for {:?}.", endpoint);
            self.policy.on_node_removed(endpoint);
        }
    }

    /// Picks the least-loaded open node, increments its load, and returns a
    /// handle to it. `Err(NoRoutableEndpoint)` if every node in the heap is
    /// closed (or the heap is empty).
    pub fn get(&mut self) -> Result<HeapHandle<E>, ApertureError> {
        let endpoint = self
            .heap
            .peek_min_open()
            .cloned()
            .ok_or(ApertureError::NoRoutableEndpoint)?;
        self.heap.increment_load(&endpoint);
        self.policy.on_get(&endpoint);
        Ok(HeapHandle { endpoint })
    }

    /// Returns a node obtained from `get`, decrementing its load. Silently
    /// ignored if the node is no longer in the heap (it may have been
    /// removed while in flight) -- this is the "mispaired put" case from
    /// the error handling design, not an error.
    pub fn put(&mut self, handle: HeapHandle<E>) {
        if self.heap.contains(&handle.endpoint) {
            self.heap.decrement_load(&handle.endpoint);
            self.policy.on_put(&handle.endpoint);
        } else {
            trace!(
                "HeapBalancer: put() for {:?} ignored, node no longer in heap.",
                handle.endpoint
            );
        }
    }

    /// Invoked by the channel-factory layer when `endpoint`'s channel
    /// transitions to closed. Delegates to the policy; the heap node itself
    /// is left in place (still reachable, just sorting as maximally
    /// loaded) until `remove_sink` is called.
    pub fn on_node_down(&mut self, endpoint: &E) -> BoxFuture<'static, ()> {
        if self.heap.contains(endpoint) {
            self.policy.on_node_down(endpoint)
        } else {
            future::ready(()).boxed()
        }
    }
}

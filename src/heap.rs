//! An index-tracking min-heap of endpoints, keyed by `(effective_load, index)`.
//!
//! Unlike [`std::collections::BinaryHeap`], nodes here need to have their key
//! changed in place (a `get`/`put` pair changes one node's `load` without
//! touching any other node) and need to be removable from an arbitrary
//! position (a node whose endpoint leaves the server set). Neither operation
//! is supported by the standard heap, so this is a small hand-rolled
//! array-backed heap with an endpoint -> slot index alongside it, in the
//! style of a classic decrease-key priority queue.
use fxhash::FxHashMap;
use std::hash::Hash;

/// A transport handle for one endpoint. Ownership is split: the balancer
/// holds the `Box<dyn Channel>` for as long as the endpoint is active, but
/// creating and tearing down the underlying transport is the channel
/// factory's job, not the heap's.
pub trait Channel: Send + Sync {
    /// Whether the channel can currently carry traffic. A closed channel's
    /// node sorts as maximally loaded so it is never picked as the
    /// least-loaded root while an open node exists elsewhere in the heap.
    fn is_open(&self) -> bool;
}

/// One entry in the heap: an endpoint, its channel, its outstanding load,
/// and the monotonically increasing index used to break load ties.
pub struct HeapNode<E> {
    pub endpoint: E,
    pub channel: Box<dyn Channel>,
    pub load: i64,
    pub index: u64,
}

impl<E> HeapNode<E> {
    /// The key this node currently sorts by: `load`, unless the channel is
    /// closed, in which case the node compares as if infinitely loaded.
    fn sort_key(&self) -> (i64, u64) {
        let load = if self.channel.is_open() {
            self.load
        } else {
            i64::MAX
        };
        (load, self.index)
    }
}

/// The min-heap itself, plus an `endpoint -> slot` index so that `get`/`put`
/// and endpoint removal don't need a linear scan.
pub struct Heap<E> {
    storage: Vec<HeapNode<E>>,
    positions: FxHashMap<E, usize>,
    next_index: u64,
}

impl<E: Clone + Eq + Hash> Heap<E> {
    pub fn new() -> Self {
        Heap {
            storage: Vec::new(),
            positions: FxHashMap::default(),
            next_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn contains(&self, endpoint: &E) -> bool {
        self.positions.contains_key(endpoint)
    }

    /// Number of nodes currently in the heap whose channel is open.
    pub fn open_count(&self) -> usize {
        self.storage.iter().filter(|n| n.channel.is_open()).count()
    }

    /// Appends a new node and sifts it into place. Panics if the endpoint is
    /// already present (callers are expected to check via `contains` first;
    /// this mirrors the base balancer's "a node is in exactly one of
    /// in-heap, removed" invariant).
    pub fn push(&mut self, endpoint: E, channel: Box<dyn Channel>) {
        assert!(
            !self.positions.contains_key(&endpoint),
            "endpoint already has a heap node"
        );
        let index = self.next_index;
        self.next_index += 1;
        let slot = self.storage.len();
        self.storage.push(HeapNode {
            endpoint: endpoint.clone(),
            channel,
            load: 0,
            index,
        });
        self.positions.insert(endpoint, slot);
        self.sift_up(slot);
    }

    /// Removes and returns the node for `endpoint`, if present, via
    /// swap-with-last followed by a sift in whichever direction the moved
    /// element needs.
    pub fn remove(&mut self, endpoint: &E) -> Option<HeapNode<E>> {
        let slot = self.positions.remove(endpoint)?;
        let last = self.storage.len() - 1;
        self.storage.swap(slot, last);
        let removed = self.storage.pop().unwrap();
        if slot < self.storage.len() {
            self.positions.insert(self.storage[slot].endpoint.clone(), slot);
            self.sift_down(slot);
            self.sift_up(slot);
        }
        Some(removed)
    }

    /// The least-loaded node whose channel is currently open. `None` means
    /// every node currently in the heap has a closed channel (or the heap is
    /// empty) -- there is no routable node.
    ///
    /// A channel can close without any call into this heap (no node is
    /// resifted when that happens), so a stale closed node can sit at slot 0
    /// while open, routable nodes remain deeper in the storage. Scanning
    /// past a closed root instead of stopping at it is what keeps `get()`
    /// from failing spuriously in that case.
    pub fn peek_min_open(&self) -> Option<&E> {
        self.storage
            .iter()
            .filter(|n| n.channel.is_open())
            .min_by_key(|n| (n.load, n.index))
            .map(|n| &n.endpoint)
    }

    /// Increments the load of `endpoint`'s node by one and sifts it down.
    /// No-op if the endpoint isn't in the heap (it may have been removed
    /// concurrently).
    pub fn increment_load(&mut self, endpoint: &E) {
        if let Some(&slot) = self.positions.get(endpoint) {
            self.storage[slot].load += 1;
            self.sift_down(slot);
        }
    }

    /// Decrements the load of `endpoint`'s node by one and sifts it up.
    /// No-op if the endpoint isn't in the heap.
    pub fn decrement_load(&mut self, endpoint: &E) {
        if let Some(&slot) = self.positions.get(endpoint) {
            self.storage[slot].load = (self.storage[slot].load - 1).max(0);
            self.sift_up(slot);
        }
    }

    /// Iterates the backing storage in array order -- *not* in sorted
    /// order. This is the "approximate least-loaded" scan used by
    /// `ApertureController::contract_aperture`: close enough to
    /// least-loaded-first without the cost of repeated extraction.
    pub fn iter_storage_order(&self) -> impl Iterator<Item = &HeapNode<E>> {
        self.storage.iter()
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.storage[slot].sort_key() < self.storage[parent].sort_key() {
                self.swap_slots(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.storage.len();
        loop {
            let left = 2 * slot + 1;
            let right = 2 * slot + 2;
            let mut smallest = slot;
            if left < len && self.storage[left].sort_key() < self.storage[smallest].sort_key() {
                smallest = left;
            }
            if right < len && self.storage[right].sort_key() < self.storage[smallest].sort_key() {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap_slots(slot, smallest);
            slot = smallest;
        }
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.storage.swap(a, b);
        self.positions.insert(self.storage[a].endpoint.clone(), a);
        self.positions.insert(self.storage[b].endpoint.clone(), b);
    }
}

impl<E: Clone + Eq + Hash> Default for Heap<E> {
    fn default() -> Self {
        Heap::new()
    }
}

//! A keyed container that lazily creates and owns one pool per key.
//!
//! `PoolMap<K, P>` is the core of this crate: for each distinct `K` it builds
//! at most one `P` (via a caller-supplied factory), hands out stable
//! references to it on repeat lookups, fans drain requests out to every pool
//! it owns, fans drained notifications back in to any number of subscribers,
//! and — if constructed with a capacity bound — evicts one idle pool to admit
//! a new one once that bound is reached.

use std::fmt;
use std::hash::Hash;

use linked_hash_map::LinkedHashMap;
use scopeguard::defer;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;
use crate::pool::{DrainedCallback, Pool};

/// The bound required of keys stored in a [`PoolMap`].
///
/// Bundled into one named trait the way the rest of this lineage bundles a
/// handful of bounds behind a single marker (see e.g. `Key` in sibling
/// connection-pool implementations): hashable and comparable for storage,
/// `Clone` because the map keeps its own copy, `Debug` because every
/// creation, eviction, and clear is logged with the key attached.
pub trait Key: Eq + Hash + Clone + fmt::Debug + 'static {}
impl<T> Key for T where T: Eq + Hash + Clone + fmt::Debug + 'static {}

/// Construction-time configuration for a [`PoolMap`].
///
/// The map has exactly one tunable — an optional capacity bound — but it is
/// exposed through a small builder rather than a bare constructor argument,
/// matching how the other pools in this lineage expose their handful of
/// knobs through a `Config`/`Builder` type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMapConfig {
    limit: Option<usize>,
}

impl PoolMapConfig {
    /// An unbounded configuration: no capacity limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity bound. `None` means unbounded.
    ///
    /// # Panics
    ///
    /// Panics if given `Some(0)`: a map that can never admit a pool is a
    /// construction-time mistake, not a runtime condition to handle.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        assert!(
            limit != Some(0),
            "limit must be greater than zero when set"
        );
        self.limit = limit;
        self
    }
}

/// A keyed container owning zero or more pool instances of type `P`.
///
/// See the module documentation for the high-level contract. `PoolMap` is
/// intentionally not `Send` or `Sync`: it is one of many per-worker-thread
/// objects in a shared-nothing architecture, and every public method runs
/// synchronously on whatever thread owns it.
pub struct PoolMap<'d, K, P> {
    dispatcher: &'d dyn Dispatcher,
    entries: LinkedHashMap<K, P>,
    limit: Option<usize>,
    drained_callbacks: Vec<DrainedCallback>,
    entered: std::cell::Cell<bool>,
}

impl<'d, K, P> PoolMap<'d, K, P>
where
    K: Key,
    P: Pool,
{
    /// Creates an empty map bound to `dispatcher`, configured by `config`.
    ///
    /// `dispatcher` must outlive the map: every pool this map ever creates is
    /// ultimately destroyed through it.
    pub fn new(dispatcher: &'d dyn Dispatcher, config: PoolMapConfig) -> Self {
        Self {
            dispatcher,
            entries: LinkedHashMap::new(),
            limit: config.limit,
            drained_callbacks: Vec::new(),
            entered: std::cell::Cell::new(false),
        }
    }

    fn enter(&self) {
        debug_assert!(
            !self.entered.get(),
            "A resource should only be entered once"
        );
        self.entered.set(true);
    }

    /// Returns the existing pool for `key`, or creates one with `factory` if
    /// `key` is not yet present.
    ///
    /// Returns `None` only when the map is at capacity and no idle pool
    /// could be evicted to make room; in that case `factory` is never
    /// called and the map is left unchanged.
    ///
    /// # Panics
    ///
    /// Propagates any panic from `factory`. If it panics, no entry is
    /// inserted.
    pub fn get_or_create<F>(&mut self, key: K, factory: F) -> Option<&mut P>
    where
        F: FnOnce() -> P,
    {
        self.enter();
        defer! { self.entered.set(false); }

        if self.entries.contains_key(&key) {
            trace!(?key, "pool map hit");
            return self.entries.get_mut(&key);
        }

        if let Some(limit) = self.limit {
            if self.entries.len() >= limit && !self.evict_one() {
                debug!(?key, limit, "pool map at capacity, eviction failed");
                return None;
            }
        }

        let mut pool = factory();
        for callback in &self.drained_callbacks {
            pool.add_drained_callback(callback.clone());
        }
        self.entries.insert(key.clone(), pool);
        debug!(?key, size = self.entries.len(), "pool map created pool");
        self.entries.get_mut(&key)
    }

    /// Destroys exactly one idle pool, chosen in the map's natural
    /// (insertion-order) iteration order, to free a slot.
    ///
    /// Returns `false` without modifying the map if every pool currently
    /// reports active connections.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .find(|(_, pool)| !pool.has_active_connections())
            .map(|(key, _)| key.clone());

        let Some(key) = victim else {
            return false;
        };

        if let Some(pool) = self.entries.remove(&key) {
            trace!(?key, "evicting idle pool");
            self.dispatcher.defer_delete(Box::new(pool));
        }
        true
    }

    /// Transfers ownership of every pool to the dispatcher for deferred
    /// destruction, then empties the map.
    ///
    /// The buffered drained-callback list is retained: pools created after
    /// `clear()` still receive every callback registered so far. A no-op on
    /// an already-empty map.
    pub fn clear(&mut self) {
        self.enter();
        defer! { self.entered.set(false); }

        if self.entries.is_empty() {
            trace!("pool map clear: already empty");
            return;
        }

        let entries = std::mem::replace(&mut self.entries, LinkedHashMap::new());
        let count = entries.len();
        for (_, pool) in entries {
            self.dispatcher.defer_delete(Box::new(pool));
        }
        debug!(count, "pool map cleared");
    }

    /// Requests that every currently-held pool drain its connections, in
    /// iteration order.
    ///
    /// A pure fan-out: the map retains ownership of every pool and expects
    /// drained callbacks to arrive asynchronously (and, per the pool
    /// contract, idempotently — calling this twice issues one drain request
    /// per pool per call).
    pub fn drain_connections(&mut self) {
        self.enter();
        defer! { self.entered.set(false); }

        for (key, pool) in self.entries.iter_mut() {
            trace!(?key, "draining pool");
            pool.drain_connections();
        }
    }

    /// Buffers `callback` and registers it on every currently-held pool.
    ///
    /// Every pool created afterwards by [`get_or_create`](Self::get_or_create)
    /// also receives it. The callback may fire once per pool that reaches a
    /// drained state; the map never deduplicates those invocations.
    pub fn add_drained_callback(&mut self, callback: DrainedCallback) {
        self.enter();
        defer! { self.entered.set(false); }

        self.drained_callbacks.push(callback.clone());
        for (_, pool) in self.entries.iter_mut() {
            pool.add_drained_callback(callback.clone());
        }
    }

    /// Number of pools currently owned by the map.
    ///
    /// Pools handed to the dispatcher but not yet destroyed are not counted.
    pub fn size(&self) -> usize {
        self.enter();
        defer! { self.entered.set(false); }

        self.entries.len()
    }
}

impl<'d, K, P> Drop for PoolMap<'d, K, P>
where
    K: Key,
    P: Pool,
{
    /// Hands every still-owned pool to the dispatcher instead of letting
    /// Rust's field-wise drop glue destroy `entries` synchronously.
    ///
    /// Mirrors `clear()`'s body: a `PoolMap` going out of scope is just
    /// another way every pool it owns stops being owned, and that must go
    /// through the same deferred-destruction path as `clear()` and eviction.
    fn drop(&mut self) {
        for (_, pool) in std::mem::take(&mut self.entries) {
            self.dispatcher.defer_delete(Box::new(pool));
        }
    }
}

//! The capability set [`PoolMap`](crate::pool_map::PoolMap) requires from the
//! objects it owns.

use std::rc::Rc;

/// A zero-argument notification, fired once a pool has no active or pending
/// connections left.
///
/// `Rc<dyn Fn()>` rather than `Box<dyn FnOnce()>`: a single callback
/// registered through
/// [`PoolMap::add_drained_callback`](crate::pool_map::PoolMap::add_drained_callback)
/// must be handed to every pool the map owns, present and future, so cloning
/// it has to be cheap and repeatable. `PoolMap` is single-threaded by design
/// (see the crate's concurrency model), so the non-atomic `Rc` is the right
/// choice over `Arc`.
pub type DrainedCallback = Rc<dyn Fn()>;

/// The minimal capability set a connection pool must expose to be owned by a
/// [`PoolMap`](crate::pool_map::PoolMap).
///
/// `PoolMap` treats `P: Pool` as an opaque, polymorphic object: it never
/// inspects connections, protocols, or transports, only these three methods.
pub trait Pool: 'static {
    /// Cheap, pure query: does this pool still hold traffic-bearing state?
    ///
    /// A pool reporting `false` is eligible for eviction.
    fn has_active_connections(&self) -> bool;

    /// Idempotent request that the pool close idle connections and finish
    /// active ones.
    fn drain_connections(&mut self);

    /// Registers `callback`, to be invoked once this pool reaches a fully
    /// drained state.
    ///
    /// A pool may invoke `callback` synchronously from within this call if
    /// it is already drained; callers that could themselves be on a
    /// `PoolMap`'s call stack at that point must be prepared for that (see
    /// the reentry guard in [`crate::pool_map::PoolMap`]).
    fn add_drained_callback(&mut self, callback: DrainedCallback);
}

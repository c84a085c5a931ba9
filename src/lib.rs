#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

pub mod dispatcher;
pub mod pool;
pub mod pool_map;

pub use dispatcher::{Dispatcher, LocalDispatcher};
pub use pool::{DrainedCallback, Pool};
pub use pool_map::{Key, PoolMap, PoolMapConfig};

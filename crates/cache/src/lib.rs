//! Persistent cache of pointers, keyed by file identity.
//!
//! Archiving a tree calls an external program for every regular file to turn
//! its content into a (small) pointer. This crate remembers those pointers in
//! a local SQLite file so that unchanged files don't have to go through the
//! external program again on the next run.
//!
//! # Architecture
//! - [`FileIdentity`]: path, modification time, change time and size. A
//!   lookup only hits if all four match.
//! - [`retry::resilient`]: runs a unit of work in a transaction and restarts it
//!   when another process holds the database lock.
//! - [`PointerCache`]: the cache handle. Everything written through one handle
//!   is committed atomically when the handle is closed.
//! - [`BlockingPointerCache`]: the same handle for synchronous callers.

mod blocking;
mod cache;
mod db;
pub mod error;
mod identity;
pub mod retry;

pub use crate::blocking::BlockingPointerCache;
pub use crate::cache::{CACHE_VERSION, Options, PointerCache};
pub use crate::identity::FileIdentity;
pub use crate::retry::RetryPolicy;

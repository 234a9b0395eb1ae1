//!
//! # memproxy
//!
//! Synchronous memory access to a process that only a remote peer can reach
//!
//! ## Introduction
//!
//! memproxy sits between a host application that reads and writes the memory of a foreign
//! process through synchronous calls, and a remote peer that owns that process and is only
//! reachable through a slow request/response channel. The host expects every call to return
//! immediately. memproxy answers reads from a local page cache and defers all remote traffic
//! to a single background worker.
//!
//! ```text
//! +------+  read/write   +----------------+   lookup   +-----------+
//! | host | ------------> | InterceptLayer | ---------> | PageCache |
//! +------+  open/close   +-------+--------+            +-----^-----+
//!                                |                           |
//!                                | push                      | merge_fill
//!                                v                           |
//!                          +----------+   pop   +--------+   |
//!                          | JobQueue | ------> | Worker | --+
//!                          +----------+         +---+----+
//!                                                   |
//!                                                   | send (json)
//!                                                   v
//!                                            +---------------+
//!                                            | RemoteChannel |
//!                                            +---------------+
//! ```
//!
//! A read is split into page sized chunks. Every chunk that is fully covered by the valid range
//! of its cached page is copied from the cache, everything else reads as zero. If any chunk was
//! missing or expired a single read job for the whole request is queued, the worker fetches it
//! and merges the result into the cache so a later read of the same range is served locally.
//!
//! Writes are fire and forget: a write job is queued and the host is told that all bytes were
//! written. Open requests with a probe access mask (process enumeration) get a placeholder handle
//! and never reach the remote peer.
//!
//! ## Getting started
//!
//! ```
//! use memproxy::prelude::v1::*;
//! ```
//!
//! A [`Proxy`](crate::proxy::Proxy) is built from anything implementing
//! [`RemoteChannel`](crate::remote::RemoteChannel), see the [proxy](crate::proxy) module for a
//! complete example.
//!

#[macro_use]
extern crate bitflags;

pub mod error;

pub mod types;

pub mod iter;

pub mod mem;

pub mod config;

pub mod queue;

pub mod remote;

pub mod worker;

pub mod intercept;

pub mod proxy;

#[doc(hidden)]
#[cfg(any(feature = "dummy_channel", test))]
pub mod dummy;

#[doc(hidden)]
#[allow(ambiguous_glob_reexports)]
pub mod prelude {
    pub mod v1 {
        pub use crate::config::*;
        pub use crate::error::*;
        pub use crate::intercept::*;
        pub use crate::iter::*;
        pub use crate::mem::*;
        pub use crate::proxy::*;
        pub use crate::queue::*;
        pub use crate::remote::*;
        pub use crate::types::*;
        pub use crate::worker::*;
    }
    pub use v1::*;
}

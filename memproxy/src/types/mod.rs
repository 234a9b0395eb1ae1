/*!
Module with basic types used in memproxy.

This module contains the address type of the foreign process,
process access masks and it exposes different size helpers.
*/

pub mod address;
#[doc(hidden)]
pub use address::{clamp_to_usize, umem, Address};

pub mod size;

pub mod access;
#[doc(hidden)]
pub use access::{AccessIntent, ProbeMasks, ProcessAccess, TargetHandle};

//! Tiled matrix multiplication kernels for Tessel.
//!
//! A matmul is split into output tiles, one per cube. Each cube walks the reduction in
//! block-steps, staging operand tiles in shared memory with a double-buffered pipeline and
//! accumulating lane sub-tiles in registers.

#[macro_use]
extern crate derive_new;

/// Components of the tiled matmul, from tile to batch level.
pub mod components;
/// Launchable kernels.
pub mod kernels;

mod base;

#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

pub use base::*;

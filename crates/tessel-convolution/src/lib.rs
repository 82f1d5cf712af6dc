//! Implicit-GEMM convolution for Tessel.
//!
//! A 2D convolution is expressed as a matmul over transformed views of its tensors: the input
//! is padded, split into sliding windows and merged into the reduction and pixel dimensions,
//! then handed to the tiled matmul of `tessel-matmul` without ever being copied.

mod base;
mod error;
mod layout;
mod problem;

#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

pub use base::*;
pub use error::*;
pub use layout::*;
pub use problem::*;

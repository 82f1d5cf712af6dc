#![warn(missing_docs)]

//! SIMT execution runtime for Tessel.
//!
//! Kernels are launched as a grid of cubes. Cubes run independently on a pool of worker
//! threads, while the units of a cube advance together in phases separated by
//! [Cube::sync_cube]. Shared memory is local to a cube, global output memory supports
//! atomic accumulation.

extern crate alloc;

#[macro_use]
extern crate derive_new;

/// Global configuration and launch logging.
pub mod config;

mod client;
mod cube;
mod error;
mod kernel;
mod memory;
mod properties;
mod scheduler;
mod validation;

pub use client::*;
pub use cube::*;
pub use error::*;
pub use kernel::*;
pub use memory::*;
pub use properties::*;
pub use validation::*;

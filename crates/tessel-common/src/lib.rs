#![warn(missing_docs)]

//! Common utilities shared by the Tessel crates.

/// Integer helpers used to size tiles and buffers.
pub mod math;

/// Random number helpers for seeded fixtures.
pub mod rand;

mod element;

pub use element::*;
pub use num_traits::{One, Zero};

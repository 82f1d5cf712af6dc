#![warn(missing_docs)]

//! Coordinate transform algebra for Tessel.
//!
//! A [TensorDescriptor] maps the logical index of a tensor to a linear offset through a chain
//! of [Transform]s. A [TensorCoordinate] caches every intermediate index of that chain so that
//! moving it by a fixed [CoordinateStep] is incremental.

mod adaptor;
mod coordinate;
mod descriptor;
mod error;
mod index;
mod transform;

pub use adaptor::*;
pub use coordinate::*;
pub use descriptor::*;
pub use error::*;
pub use index::*;
pub use transform::*;

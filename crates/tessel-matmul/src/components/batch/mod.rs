mod grid;
mod partition;

pub use grid::*;
pub use partition::*;

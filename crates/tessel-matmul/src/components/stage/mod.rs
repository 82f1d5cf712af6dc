mod matmul;
mod memory;
mod partition;

pub use matmul::*;
pub use memory::*;
pub use partition::*;

mod blockwise;
mod pipeline;
mod transfer;
mod write;

pub use blockwise::*;
pub use pipeline::*;
pub use transfer::*;
pub use write::*;

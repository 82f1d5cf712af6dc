mod gemm;
mod naive;

pub use gemm::*;
pub use naive::*;

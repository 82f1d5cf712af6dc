//! Host references and fixtures shared by the matmul tests and dependent crates.

pub mod test_utils;

#[cfg(test)]
mod tiled;

use tessel_common::Numeric;

use crate::components::tile::{TileMatmul, TileShape};

/// Portable tile matmul, one dot product per accumulator.
pub struct RegisterMatmul;

impl TileMatmul for RegisterMatmul {
    fn execute<A: Numeric>(lhs: &[A], rhs: &[A], acc: &mut [A], shape: TileShape) {
        for i in 0..shape.rows {
            for j in 0..shape.cols {
                let mut sum = acc[i * shape.cols + j];
                for k in 0..shape.k {
                    sum += lhs[k * shape.rows + i] * rhs[k * shape.cols + j];
                }
                acc[i * shape.cols + j] = sum;
            }
        }
    }
}

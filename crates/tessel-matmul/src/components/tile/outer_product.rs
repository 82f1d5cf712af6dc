use tessel_common::Numeric;

use crate::components::tile::{TileMatmul, TileShape};

/// Tile matmul as a sequence of rank-1 updates.
///
/// The innermost loop runs over a contiguous accumulator row, which the compiler can vectorize.
pub struct OuterProductMatmul;

impl TileMatmul for OuterProductMatmul {
    fn execute<A: Numeric>(lhs: &[A], rhs: &[A], acc: &mut [A], shape: TileShape) {
        for k in 0..shape.k {
            let lhs_k = &lhs[k * shape.rows..(k + 1) * shape.rows];
            let rhs_k = &rhs[k * shape.cols..(k + 1) * shape.cols];
            for (row, a) in acc.chunks_exact_mut(shape.cols).zip(lhs_k) {
                for (out, b) in row.iter_mut().zip(rhs_k) {
                    *out += *a * *b;
                }
            }
        }
    }
}

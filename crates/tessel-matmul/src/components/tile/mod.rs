//! Register level matmul executed by one lane.

mod outer_product;
mod register;

pub use outer_product::*;
pub use register::*;

use serde::{Deserialize, Serialize};
use tessel_common::Numeric;

/// Multiply-accumulate of two register tiles into a lane accumulator.
///
/// Operands are packed `(k, rows)` and `(k, cols)`, the accumulator `(rows, cols)`, all
/// row-major. Implementations must accumulate every output in ascending `k` so that they all
/// produce the same bits.
pub trait TileMatmul: Send + Sync + 'static {
    /// Computes `acc[i, j] += Σ_k lhs[k, i] * rhs[k, j]`.
    fn execute<A: Numeric>(lhs: &[A], rhs: &[A], acc: &mut [A], shape: TileShape);
}

#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
/// Extents of a register tile matmul.
pub struct TileShape {
    pub k: usize,
    pub rows: usize,
    pub cols: usize,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Which [TileMatmul] a kernel is instantiated with.
pub enum TileMatmulKind {
    /// [RegisterMatmul]
    #[default]
    Register,
    /// [OuterProductMatmul]
    OuterProduct,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn operands() -> (Vec<f32>, Vec<f32>, TileShape) {
        let shape = TileShape::new(3, 2, 4);
        let lhs = (0..shape.k * shape.rows).map(|v| v as f32 * 0.5).collect();
        let rhs = (0..shape.k * shape.cols).map(|v| v as f32 - 4.0).collect();
        (lhs, rhs, shape)
    }

    fn reference(lhs: &[f32], rhs: &[f32], shape: TileShape) -> Vec<f32> {
        let mut acc = vec![1.0; shape.rows * shape.cols];
        for i in 0..shape.rows {
            for j in 0..shape.cols {
                for k in 0..shape.k {
                    acc[i * shape.cols + j] += lhs[k * shape.rows + i] * rhs[k * shape.cols + j];
                }
            }
        }
        acc
    }

    #[test]
    fn register_matmul_accumulates() {
        let (lhs, rhs, shape) = operands();
        let mut acc = vec![1.0; shape.rows * shape.cols];
        RegisterMatmul::execute(&lhs, &rhs, &mut acc, shape);
        assert_eq!(acc, reference(&lhs, &rhs, shape));
    }

    #[test]
    fn outer_product_matches_register_bits() {
        let (lhs, rhs, shape) = operands();
        let mut register = vec![1.0; shape.rows * shape.cols];
        let mut outer = register.clone();
        RegisterMatmul::execute(&lhs, &rhs, &mut register, shape);
        OuterProductMatmul::execute(&lhs, &rhs, &mut outer, shape);
        assert_eq!(register, outer);
    }
}

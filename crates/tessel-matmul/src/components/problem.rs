use serde::{Deserialize, Serialize};
use tessel_layout::{Index, LayoutError, TensorDescriptor};

use super::MatmulIdent;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Description of a matmul problem to solve, regardless of actual data
///
/// Computes `out[m, n] = Σ_k lhs[k, m] * rhs[k, n]`: lhs is `K × M`, rhs is `K × N` and out is
/// `M × N`. Strides are in elements, outermost dimension first.
pub struct MatmulProblem {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lhs_strides: [usize; 2],
    pub rhs_strides: [usize; 2],
    pub out_strides: [usize; 2],
}

impl MatmulProblem {
    /// Problem where every tensor is contiguous and row-major.
    pub fn row_major(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            lhs_strides: [m, 1],
            rhs_strides: [n, 1],
            out_strides: [n, 1],
        }
    }

    /// Logical shape of the identified tensor.
    pub fn shape(&self, ident: MatmulIdent) -> [usize; 2] {
        match ident {
            MatmulIdent::Lhs => [self.k, self.m],
            MatmulIdent::Rhs => [self.k, self.n],
            MatmulIdent::Out => [self.m, self.n],
        }
    }

    /// Strides of the identified tensor.
    pub fn strides(&self, ident: MatmulIdent) -> [usize; 2] {
        match ident {
            MatmulIdent::Lhs => self.lhs_strides,
            MatmulIdent::Rhs => self.rhs_strides,
            MatmulIdent::Out => self.out_strides,
        }
    }

    /// Strided descriptor of the identified tensor.
    pub fn descriptor(&self, ident: MatmulIdent) -> Result<TensorDescriptor, LayoutError> {
        let shape = self.shape(ident);
        let strides = self.strides(ident);
        TensorDescriptor::naive(
            [shape[0] as Index, shape[1] as Index],
            [strides[0] as Index, strides[1] as Index],
        )
    }

    /// Dimension of the identified tensor with unit stride, if any.
    pub fn contiguous_dim(&self, ident: MatmulIdent) -> Option<usize> {
        let strides = self.strides(ident);
        strides.iter().rposition(|stride| *stride == 1)
    }

    /// Number of multiply-adds of the problem.
    pub fn num_ops(&self) -> usize {
        self.m * self.n * self.k
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Extents of a contraction `(M, K) · (K, N) → (M, N)`.
pub struct MatmulProblemSize {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl MatmulProblemSize {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self { m, n, k }
    }
}

impl From<&MatmulProblem> for MatmulProblemSize {
    fn from(problem: &MatmulProblem) -> Self {
        Self::new(problem.m, problem.n, problem.k)
    }
}

/// Interpretation of matrix multiplication based on input shapes.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum MatmulKind {
    /// (M, K) @ (K, N) → (M, N), with M, K, N > 1
    General,

    /// (M, K) @ (K, 1) → (M, 1)
    MatVec,

    /// (1, K) @ (K, N) → (1, N)
    VecMat,

    /// (1, 1) @ (1, N) → (1, N)
    ScalarVec,

    /// (M, 1) @ (1, 1) → (M, 1)
    VecScalar,

    /// (1, K) @ (K, 1) → (1, 1)
    InnerProduct,

    /// (M, 1) @ (1, N) → (M, N)
    OuterProduct,

    /// (1, 1) @ (1, 1) → (1, 1)
    ScalarProduct,
}

impl From<&MatmulProblem> for MatmulKind {
    fn from(problem: &MatmulProblem) -> Self {
        MatmulProblemSize::from(problem).into()
    }
}

impl From<MatmulProblemSize> for MatmulKind {
    fn from(problem: MatmulProblemSize) -> Self {
        enum DimKind {
            Scalar,
            Vector,
        }

        impl From<usize> for DimKind {
            fn from(x: usize) -> Self {
                match x {
                    1 => DimKind::Scalar,
                    _ => DimKind::Vector,
                }
            }
        }

        use DimKind::*;
        match (problem.m.into(), problem.n.into(), problem.k.into()) {
            (Scalar, Scalar, Scalar) => MatmulKind::ScalarProduct,
            (Scalar, Scalar, Vector) => MatmulKind::InnerProduct,
            (Scalar, Vector, Scalar) => MatmulKind::ScalarVec,
            (Scalar, Vector, Vector) => MatmulKind::VecMat,
            (Vector, Scalar, Scalar) => MatmulKind::VecScalar,
            (Vector, Scalar, Vector) => MatmulKind::MatVec,
            (Vector, Vector, Scalar) => MatmulKind::OuterProduct,
            (Vector, Vector, Vector) => MatmulKind::General,
        }
    }
}

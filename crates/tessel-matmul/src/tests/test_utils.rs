use tessel_common::{
    Numeric, Zero,
    rand::{sample_quantized, seeded_rng},
};
use tessel_runtime::GlobalOutput;

use crate::components::{
    Acc, Lhs, MatmulIdent, MatmulPrecision, MatmulProblem, Out, Rhs,
    global::{OutputOp, OutputSource},
};

/// A strided problem with seeded operands.
pub struct MatmulTestCase {
    pub problem: MatmulProblem,
    pub seed: u64,
}

impl MatmulTestCase {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            problem: MatmulProblem::row_major(m, n, k),
            seed: 42,
        }
    }

    pub fn with_problem(problem: MatmulProblem) -> Self {
        Self { problem, seed: 42 }
    }

    fn space_size(&self, ident: MatmulIdent) -> usize {
        let shape = self.problem.shape(ident);
        let strides = self.problem.strides(ident);
        (shape[0] - 1) * strides[0] + (shape[1] - 1) * strides[1] + 1
    }

    /// Lhs values on a grid coarse enough for every accumulation order to be exact.
    pub fn random_lhs<E: Numeric>(&self) -> Vec<E> {
        sample_quantized(&mut seeded_rng(self.seed), self.space_size(MatmulIdent::Lhs))
    }

    /// Rhs values on a grid coarse enough for every accumulation order to be exact.
    pub fn random_rhs<E: Numeric>(&self) -> Vec<E> {
        sample_quantized(&mut seeded_rng(self.seed + 1), self.space_size(MatmulIdent::Rhs))
    }

    pub fn empty_out<E: Numeric>(&self) -> GlobalOutput<E> {
        GlobalOutput::zeros(self.space_size(MatmulIdent::Out))
    }

    /// Triple loop reference, accumulating in ascending `k` in the accumulator precision.
    pub fn matmul_cpu<MP: MatmulPrecision>(
        &self,
        lhs: &[Lhs<MP>],
        rhs: &[Rhs<MP>],
        output_op: OutputOp,
    ) -> Vec<Out<MP>> {
        self.matmul_cpu_with_source::<MP>(lhs, rhs, None, output_op)
    }

    /// Triple loop reference of `op(lhs · rhs, source)`.
    pub fn matmul_cpu_with_source<MP: MatmulPrecision>(
        &self,
        lhs: &[Lhs<MP>],
        rhs: &[Rhs<MP>],
        source: Option<&OutputSource<Out<MP>>>,
        output_op: OutputOp,
    ) -> Vec<Out<MP>> {
        let problem = &self.problem;
        let offset = |ident, row: usize, col: usize| {
            let strides = problem.strides(ident);
            row * strides[0] + col * strides[1]
        };

        let mut out = vec![Out::<MP>::zero(); self.space_size(MatmulIdent::Out)];
        for m in 0..problem.m {
            for n in 0..problem.n {
                let mut sum = Acc::<MP>::zero();
                for k in 0..problem.k {
                    let a = Acc::<MP>::cast_from(lhs[offset(MatmulIdent::Lhs, k, m)]);
                    let b = Acc::<MP>::cast_from(rhs[offset(MatmulIdent::Rhs, k, n)]);
                    sum += a * b;
                }
                let residual = source.map_or(Acc::<MP>::zero(), |source| {
                    let [stride_m, stride_n] = source.strides;
                    Acc::<MP>::cast_from(source.data[m * stride_m + n * stride_n])
                });
                out[offset(MatmulIdent::Out, m, n)] =
                    Out::<MP>::cast_from(output_op.apply_with(sum, residual));
            }
        }
        out
    }
}

/// Compares two buffers element-wise with a relative tolerance.
pub fn assert_equals_approx<E: Numeric>(
    actual: &[E],
    expected: &[E],
    epsilon: f64,
) -> Result<(), String> {
    if actual.len() != expected.len() {
        return Err(format!(
            "Length mismatch: got {}, expected {}",
            actual.len(),
            expected.len()
        ));
    }

    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let (a, e) = (a.to_f64_lossy(), e.to_f64_lossy());
        let tolerance = epsilon * e.abs().max(1.0);
        if (a - e).abs() > tolerance || a.is_nan() != e.is_nan() {
            return Err(format!(
                "Values differ more than epsilon: index={i} actual={a}, expected={e}, difference={}, epsilon={epsilon}",
                (a - e).abs()
            ));
        }
    }

    Ok(())
}


//! Naive matmul kernel implementation
//!
//! Each unit computes a single element of the output matrix.
use tessel_common::{Numeric, Zero};
use tessel_layout::{Index, TensorDescriptor};
use tessel_runtime::{
    ComputeClient, Cube, CubeCount, CubeDim, CubeKernel, GlobalOutput, ReadBuffer, WriteMode,
    validate_buffer_len,
};

use crate::components::{
    Acc, FormattedConfigError, Lhs, MatmulIdent, MatmulLaunchError, MatmulPrecision,
    MatmulProblem, MatmulSetupError, Out, Rhs, global::OutputOp,
};

const UNITS_PER_CUBE: u32 = 64;

struct NaiveKernel<'a, MP: MatmulPrecision> {
    lhs_desc: TensorDescriptor,
    rhs_desc: TensorDescriptor,
    out_desc: TensorDescriptor,
    lhs: &'a [Lhs<MP>],
    rhs: &'a [Rhs<MP>],
    out: &'a GlobalOutput<Out<MP>>,
    output_op: OutputOp,
    m: usize,
    n: usize,
    k: usize,
}

impl<MP: MatmulPrecision> CubeKernel for NaiveKernel<'_, MP> {
    fn execute(&self, cube: &Cube) {
        for unit in cube.units() {
            let pos = cube.cube_pos as usize * cube.num_units() as usize + unit as usize;
            if pos >= self.m * self.n {
                continue;
            }
            let (m, n) = ((pos / self.n) as Index, (pos % self.n) as Index);

            let mut sum = Acc::<MP>::zero();
            for k in 0..self.k as Index {
                let lhs = self.lhs[self.lhs_desc.calculate_offset(&[k, m]) as usize];
                let rhs = self.rhs[self.rhs_desc.calculate_offset(&[k, n]) as usize];
                sum += Acc::<MP>::cast_from(lhs) * Acc::<MP>::cast_from(rhs);
            }

            let offset = self.out_desc.calculate_offset(&[m, n]) as usize;
            self.out.store(
                offset,
                Out::<MP>::cast_from(self.output_op.apply(sum)),
                WriteMode::Set,
            );
        }
    }
}

/// Matrix multiplication with one unit per output element, accumulating in ascending `k`.
pub fn launch_naive<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    output_op: OutputOp,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    let num_elems = unit_count(problem)?;
    let lhs_desc = problem.descriptor(MatmulIdent::Lhs)?;
    let rhs_desc = problem.descriptor(MatmulIdent::Rhs)?;
    let out_desc = problem.descriptor(MatmulIdent::Out)?;
    validate_buffer_len("lhs", lhs.len(), lhs_desc.element_space_size() as usize)?;
    validate_buffer_len("rhs", rhs.len(), rhs_desc.element_space_size() as usize)?;
    validate_buffer_len("out", out.len(), out_desc.element_space_size() as usize)?;

    let cube_count = CubeCount::new_1d(num_elems.div_ceil(UNITS_PER_CUBE));
    log::debug!(
        "Naive {} matmul {}x{}x{} over {} cubes",
        MP::name(),
        problem.m,
        problem.n,
        problem.k,
        cube_count.num_cubes()
    );

    let kernel = NaiveKernel::<MP> {
        lhs_desc,
        rhs_desc,
        out_desc,
        lhs,
        rhs,
        out,
        output_op,
        m: problem.m,
        n: problem.n,
        k: problem.k,
    };
    client.launch(&kernel, cube_count, CubeDim::new_1d(UNITS_PER_CUBE))?;
    Ok(())
}

/// One unit per output element, the unit positions must fit in `u32`.
fn unit_count(problem: &MatmulProblem) -> Result<u32, MatmulSetupError> {
    let (m, n) = (problem.m, problem.n);
    m.checked_mul(n)
        .and_then(|count| u32::try_from(count).ok())
        .ok_or_else(|| {
            MatmulSetupError::InvalidProblem(FormattedConfigError::new(move || {
                format!("The naive matmul can't index the {m}x{n} outputs with 32-bit units")
            }))
        })
}

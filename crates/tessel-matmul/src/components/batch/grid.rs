use tessel_layout::{Index, TensorDescriptor, Transform};
use tessel_runtime::CubeCount;

use crate::components::{
    FormattedConfigError, GemmConfig, MatmulIdent, MatmulProblem, MatmulProblemSize,
    MatmulSetupError, check_validity,
};

#[derive(Clone, Debug)]
/// Global memory views of the three operands of a tiled matmul.
///
/// Operands are padded up to whole blocks when needed. The output is split as
/// `(M0, M10, M11, N0, N10, N11)` to match the lane accumulators.
pub struct GridDescriptors {
    /// Lhs viewed as `(K, M)`, padded.
    pub lhs: TensorDescriptor,
    /// Rhs viewed as `(K, N)`, padded.
    pub rhs: TensorDescriptor,
    /// Output viewed as `(M0, M10, M11, N0, N10, N11)`.
    pub out: TensorDescriptor,
    /// Second source of a binary output op, viewed like the output.
    pub source: Option<TensorDescriptor>,
    /// Extents of the contraction.
    pub size: MatmulProblemSize,
    /// Extents after padding.
    pub padded: MatmulProblemSize,
}

impl GridDescriptors {
    /// Builds the views from `(K, M)`, `(K, N)` and `(M, N)` descriptors, which may themselves
    /// be arbitrary transform chains.
    pub fn new(
        lhs_k_m: TensorDescriptor,
        rhs_k_n: TensorDescriptor,
        out_m_n: TensorDescriptor,
        config: &GemmConfig,
    ) -> Result<Self, MatmulSetupError> {
        for (ident, desc) in [
            (MatmulIdent::Lhs, &lhs_k_m),
            (MatmulIdent::Rhs, &rhs_k_n),
            (MatmulIdent::Out, &out_m_n),
        ] {
            let rank = desc.rank();
            if rank != 2 {
                return Err(MatmulSetupError::InvalidProblem(FormattedConfigError::new(
                    move || format!("The {} view must have 2 dimensions, got {rank}", ident.name()),
                )));
            }
        }

        let size = MatmulProblemSize::new(
            lhs_k_m.length(1) as usize,
            rhs_k_n.length(1) as usize,
            lhs_k_m.length(0) as usize,
        );
        let rhs_k = rhs_k_n.length(0) as usize;
        let out_lengths = [out_m_n.length(0) as usize, out_m_n.length(1) as usize];
        if rhs_k != size.k || out_lengths != [size.m, size.n] {
            return Err(MatmulSetupError::InvalidProblem(FormattedConfigError::new(
                move || {
                    format!(
                        "Views don't form a contraction: lhs (K={}, M={}), rhs (K={rhs_k}, N={}), out {out_lengths:?}",
                        size.k, size.m, size.n
                    )
                },
            )));
        }

        check_validity(&size, config)?;
        let padded = config.padded_size(&size);

        let lhs = pad_2d(lhs_k_m, [padded.k - size.k, padded.m - size.m])?;
        let rhs = pad_2d(rhs_k_n, [padded.k - size.k, padded.n - size.n])?;
        let out = tile_view(out_m_n, &size, &padded, config)?;

        Ok(Self {
            lhs,
            rhs,
            out,
            source: None,
            size,
            padded,
        })
    }

    /// Adds the `(M, N)` view of the second source of a binary output op.
    pub fn with_source(
        mut self,
        source_m_n: TensorDescriptor,
        config: &GemmConfig,
    ) -> Result<Self, MatmulSetupError> {
        let lengths = source_m_n.lengths().into_inner();
        let expected = [self.size.m as Index, self.size.n as Index];
        if lengths != expected {
            return Err(MatmulSetupError::InvalidProblem(FormattedConfigError::new(
                move || format!("The output source view must be {expected:?}, got {lengths:?}"),
            )));
        }

        self.source = Some(tile_view(source_m_n, &self.size, &self.padded, config)?);
        Ok(self)
    }

    /// Views of a strided matmul problem.
    pub fn from_problem(
        problem: &MatmulProblem,
        config: &GemmConfig,
    ) -> Result<Self, MatmulSetupError> {
        Self::new(
            problem.descriptor(MatmulIdent::Lhs)?,
            problem.descriptor(MatmulIdent::Rhs)?,
            problem.descriptor(MatmulIdent::Out)?,
            config,
        )
    }

    /// Output tiles along M.
    pub fn m0(&self, config: &GemmConfig) -> usize {
        self.padded.m / config.tiling_scheme.m_per_block
    }

    /// Output tiles along N.
    pub fn n0(&self, config: &GemmConfig) -> usize {
        self.padded.n / config.tiling_scheme.n_per_block
    }

    /// Block-steps reduced by each cube.
    pub fn k_blocks_per_split(&self, config: &GemmConfig) -> usize {
        self.padded.k / (config.tiling_scheme.k_per_block * config.k_splits)
    }

    /// One cube per output tile and reduction split.
    pub fn cube_count(&self, config: &GemmConfig) -> CubeCount {
        CubeCount::new_1d((self.m0(config) * self.n0(config) * config.k_splits) as u32)
    }
}

/// Pads an `(M, N)` view to whole tiles and splits it as `(M0, M10, M11, N0, N10, N11)`.
fn tile_view(
    desc_m_n: TensorDescriptor,
    size: &MatmulProblemSize,
    padded: &MatmulProblemSize,
    config: &GemmConfig,
) -> Result<TensorDescriptor, MatmulSetupError> {
    let tiling = &config.tiling_scheme;
    let view = pad_2d(desc_m_n, [padded.m - size.m, padded.n - size.n])?.transform(
        vec![
            Transform::unmerge(vec![
                (padded.m / tiling.m_per_block) as Index,
                tiling.m_repeat() as Index,
                tiling.m_per_level1_cluster() as Index,
            ])?,
            Transform::unmerge(vec![
                (padded.n / tiling.n_per_block) as Index,
                tiling.n_repeat() as Index,
                tiling.n_per_level1_cluster() as Index,
            ])?,
        ],
        vec![vec![0], vec![1]],
        vec![vec![0, 1, 2], vec![3, 4, 5]],
    )?;
    Ok(view)
}

fn pad_2d(desc: TensorDescriptor, right: [usize; 2]) -> Result<TensorDescriptor, MatmulSetupError> {
    if right == [0, 0] {
        return Ok(desc);
    }
    let padded = desc.transform(
        vec![
            Transform::right_pad(desc.length(0), right[0] as Index)?,
            Transform::right_pad(desc.length(1), right[1] as Index)?,
        ],
        vec![vec![0], vec![1]],
        vec![vec![0], vec![1]],
    )?;
    Ok(padded)
}

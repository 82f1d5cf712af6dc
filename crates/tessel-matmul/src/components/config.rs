use serde::{Deserialize, Serialize};
use tessel_common::math::{integer_least_multiple, is_multiple_of};
use tessel_layout::is_permutation;
use tessel_runtime::{CubeDim, HardwareProperties, WriteMode};

use crate::components::{
    FormattedConfigError, InvalidConfigError, MatmulAvailabilityError, MatmulLineSizes,
    MatmulPrecision, MatmulProblemSize, MatmulSelection, MatmulSetupError, TilingScheme,
    TransferSelection,
    global::OutputOp,
    selection::{BlockCluster, Buffering},
    stage::StageLayout,
    tile::TileMatmulKind,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// Validated configuration of a tiled matmul kernel.
///
/// Built from a [MatmulSelection] by [GemmConfig::new], which rejects any selection the
/// pipeline can't execute. Only problem dependent checks remain, see [check_validity].
pub struct GemmConfig {
    pub tiling_scheme: TilingScheme,
    pub lhs_transfer: TransferSelection,
    pub rhs_transfer: TransferSelection,
    pub line_sizes: MatmulLineSizes,
    pub out_access_order: [usize; 6],
    pub block_cluster: BlockCluster,
    pub k_splits: usize,
    pub write_mode: WriteMode,
    pub output_op: OutputOp,
    pub tile_matmul: TileMatmulKind,
    pub buffering: Buffering,
    pub allow_padding: bool,
    pub cube_dim: CubeDim,
    pub max_cube_count: u32,
    /// Bytes of shared memory used by the two stages.
    pub shared_memory_size: usize,
}

impl GemmConfig {
    pub fn new<MP: MatmulPrecision>(
        selection: &MatmulSelection,
        line_sizes: MatmulLineSizes,
        properties: &HardwareProperties,
    ) -> Result<Self, MatmulSetupError> {
        let tiling = &selection.tiling_scheme;
        check_tiling(tiling)?;
        check_transfer(
            "Lhs",
            &selection.lhs_transfer,
            [tiling.k_per_block, tiling.m_per_block],
            line_sizes.lhs as usize,
            tiling.block_size,
        )?;
        check_transfer(
            "Rhs",
            &selection.rhs_transfer,
            [tiling.k_per_block, tiling.n_per_block],
            line_sizes.rhs as usize,
            tiling.block_size,
        )?;
        check_output(selection, line_sizes)?;

        let cube_dim = CubeDim::new_1d(tiling.block_size as u32);
        if tiling.block_size > properties.max_units_per_cube as usize
            || !properties.max_cube_dim.can_contain(cube_dim)
        {
            return Err(MatmulAvailabilityError::CubeDimTooBig(cube_dim).into());
        }

        let stage_layout = StageLayout::new(
            tiling,
            selection.lhs_transfer.dst_line_size,
            selection.rhs_transfer.dst_line_size,
        )?;
        let shared_memory_size = stage_layout
            .shared_memory_size(size_of::<MP::Lhs>(), size_of::<MP::Rhs>());
        if shared_memory_size > properties.max_shared_memory_size {
            return Err(MatmulAvailabilityError::SharedMemoryTooBig {
                requested: shared_memory_size,
                max: properties.max_shared_memory_size,
            }
            .into());
        }

        Ok(Self {
            tiling_scheme: tiling.clone(),
            lhs_transfer: selection.lhs_transfer.clone(),
            rhs_transfer: selection.rhs_transfer.clone(),
            line_sizes,
            out_access_order: selection.out_access_order,
            block_cluster: selection.block_cluster,
            k_splits: selection.k_splits,
            write_mode: selection.write_mode,
            output_op: selection.output_op,
            tile_matmul: selection.tile_matmul,
            buffering: selection.buffering,
            allow_padding: selection.allow_padding,
            cube_dim,
            max_cube_count: properties.max_cube_count,
            shared_memory_size,
        })
    }

    /// Extents after padding, multiples of the block extents.
    pub fn padded_size(&self, size: &MatmulProblemSize) -> MatmulProblemSize {
        let tiling = &self.tiling_scheme;
        MatmulProblemSize::new(
            integer_least_multiple(size.m, tiling.m_per_block),
            integer_least_multiple(size.n, tiling.n_per_block),
            integer_least_multiple(size.k, tiling.k_per_block * self.k_splits),
        )
    }

    /// Number of cubes launched for a problem.
    pub fn num_cubes(&self, size: &MatmulProblemSize) -> u64 {
        let padded = self.padded_size(size);
        let tiling = &self.tiling_scheme;
        (padded.m / tiling.m_per_block) as u64
            * (padded.n / tiling.n_per_block) as u64
            * self.k_splits as u64
    }
}

fn invalid(msg: impl Fn() -> String + Send + Sync + 'static) -> MatmulSetupError {
    MatmulSetupError::InvalidConfig(FormattedConfigError::new(msg))
}

fn check_tiling(tiling: &TilingScheme) -> Result<(), MatmulSetupError> {
    let values = [
        tiling.block_size,
        tiling.m_per_block,
        tiling.n_per_block,
        tiling.k_per_block,
        tiling.m1_per_thread,
        tiling.n1_per_thread,
        tiling.k_per_thread,
        tiling.cluster_size(),
    ];
    if values.contains(&0) {
        return Err(invalid(|| "Every tiling extent must be positive".to_string()));
    }

    let cluster = tiling.cluster_size();
    let block_size = tiling.block_size;
    if cluster != block_size {
        return Err(invalid(move || {
            format!("Block size {block_size} differs from the thread cluster size {cluster}")
        }));
    }

    let (m_per_block, m11) = (tiling.m_per_block, tiling.m_per_level1_cluster());
    if !is_multiple_of(m_per_block, m11) {
        return Err(invalid(move || {
            format!("MPerBlock {m_per_block} is not a multiple of the level-1 cluster rows {m11}")
        }));
    }
    let (n_per_block, n11) = (tiling.n_per_block, tiling.n_per_level1_cluster());
    if !is_multiple_of(n_per_block, n11) {
        return Err(invalid(move || {
            format!(
                "NPerBlock {n_per_block} is not a multiple of the level-1 cluster columns {n11}"
            )
        }));
    }
    let (k_per_block, k_per_thread) = (tiling.k_per_block, tiling.k_per_thread);
    if !is_multiple_of(k_per_block, k_per_thread) {
        return Err(invalid(move || {
            format!("KPerBlock {k_per_block} is not a multiple of KPerThread {k_per_thread}")
        }));
    }

    Ok(())
}

fn check_transfer(
    name: &'static str,
    transfer: &TransferSelection,
    block_slice: [usize; 2],
    src_line_size: usize,
    block_size: usize,
) -> Result<(), MatmulSetupError> {
    let cluster = transfer.thread_cluster_lengths;
    let cluster_size = cluster[0] * cluster[1];
    if cluster_size == 0 || cluster_size > block_size {
        return Err(invalid(move || {
            format!("{name} transfer uses {cluster_size} lanes, the cube has {block_size}")
        }));
    }
    if !is_multiple_of(block_slice[0], cluster[0]) || !is_multiple_of(block_slice[1], cluster[1])
    {
        return Err(invalid(move || {
            format!(
                "{name} thread slice times cluster {cluster:?} doesn't cover the block slice {block_slice:?}"
            )
        }));
    }
    if !is_permutation(&transfer.thread_cluster_arrange_order, 2)
        || !is_permutation(&transfer.src_access_order, 2)
    {
        return Err(invalid(move || {
            format!("{name} transfer orders must be permutations of [0, 1]")
        }));
    }

    let thread_slice = transfer.thread_slice_lengths(block_slice);
    let src_vector_dim = transfer.src_vector_dim;
    if src_vector_dim > 1 || !is_multiple_of(thread_slice[src_vector_dim], src_line_size) {
        return Err(invalid(move || {
            format!(
                "{name} thread slice {thread_slice:?} can't be read with lines of {src_line_size} along dim {src_vector_dim}"
            )
        }));
    }
    let dst_line_size = transfer.dst_line_size;
    if !is_multiple_of(thread_slice[1], dst_line_size) {
        return Err(invalid(move || {
            format!(
                "{name} thread slice {thread_slice:?} can't be written with lines of {dst_line_size}"
            )
        }));
    }

    Ok(())
}

fn check_output(
    selection: &MatmulSelection,
    line_sizes: MatmulLineSizes,
) -> Result<(), MatmulSetupError> {
    let order = selection.out_access_order;
    if !is_permutation(&order, 6) {
        return Err(invalid(move || {
            format!("Output access order {order:?} is not a permutation of 6 dimensions")
        }));
    }
    let (n1, out) = (selection.tiling_scheme.n1_per_thread, line_sizes.out as usize);
    if !is_multiple_of(n1, out) {
        return Err(invalid(move || {
            format!("N1PerThread {n1} is not a multiple of the output line size {out}")
        }));
    }

    let k_splits = selection.k_splits;
    if k_splits == 0 {
        return Err(invalid(|| "At least one k split is required".to_string()));
    }
    if k_splits > 1 && selection.write_mode != WriteMode::AtomicAdd {
        return Err(invalid(move || {
            format!("{k_splits} k splits write the same tile and require AtomicAdd")
        }));
    }
    if k_splits > 1 && !selection.output_op.is_linear() {
        let op = selection.output_op;
        return Err(invalid(move || {
            format!("Output op {op:?} can't be applied to partial sums of {k_splits} k splits")
        }));
    }

    Ok(())
}

/// Checks that a problem can be solved with a config.
pub fn check_validity(
    size: &MatmulProblemSize,
    config: &GemmConfig,
) -> Result<(), MatmulSetupError> {
    let problem_error = |msg: InvalidConfigError| MatmulSetupError::InvalidProblem(msg);
    let size = *size;

    if size.m == 0 || size.n == 0 || size.k == 0 {
        return Err(problem_error(FormattedConfigError::new(move || {
            format!("Empty problem {size:?}")
        })));
    }

    let tiling = &config.tiling_scheme;
    if !config.allow_padding {
        let k_unit = tiling.k_per_block * config.k_splits;
        let (m_per_block, n_per_block) = (tiling.m_per_block, tiling.n_per_block);
        if !is_multiple_of(size.m, m_per_block)
            || !is_multiple_of(size.n, n_per_block)
            || !is_multiple_of(size.k, k_unit)
        {
            return Err(problem_error(FormattedConfigError::new(move || {
                format!(
                    "Problem {size:?} doesn't divide into {m_per_block}x{n_per_block} tiles with {k_unit}-deep reductions and padding is disabled"
                )
            })));
        }
    }

    // Validity is evaluated per vector, so vectors must not straddle the end of a dimension.
    let checks = [
        ("lhs", [size.k, size.m][config.lhs_transfer.src_vector_dim], config.line_sizes.lhs),
        ("rhs", [size.k, size.n][config.rhs_transfer.src_vector_dim], config.line_sizes.rhs),
        ("out", size.n, config.line_sizes.out),
    ];
    for (name, length, line_size) in checks {
        if !is_multiple_of(length, line_size as usize) {
            return Err(problem_error(FormattedConfigError::new(move || {
                format!("The {name} vectorized dimension of length {length} is not a multiple of the line size {line_size}")
            })));
        }
    }

    let requested = config.num_cubes(&size);
    if requested > config.max_cube_count as u64 {
        return Err(MatmulAvailabilityError::CubeCountTooBig {
            requested,
            max: config.max_cube_count,
        }
        .into());
    }

    Ok(())
}

/// Whether [check_validity] accepts the problem.
pub fn is_supported(size: &MatmulProblemSize, config: &GemmConfig) -> bool {
    check_validity(size, config).is_ok()
}

use serde::{Deserialize, Serialize};
use tessel_runtime::WriteMode;

use crate::components::{global::OutputOp, tile::TileMatmulKind};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Register tiling of the output tile computed by one cube.
///
/// Lanes are arranged in a two-level cluster: `m100 × n100` lanes form a level-0 cluster and
/// `m101 × n101` level-0 clusters form the level-1 cluster. Each lane owns `m1_per_thread` rows
/// and `n1_per_thread` columns of every level-1 cluster repeat.
pub struct TilingScheme {
    pub block_size: usize,
    pub m_per_block: usize,
    pub n_per_block: usize,
    pub k_per_block: usize,
    pub m1_per_thread: usize,
    pub n1_per_thread: usize,
    pub k_per_thread: usize,
    pub m1n1_thread_cluster_m100: usize,
    pub m1n1_thread_cluster_n100: usize,
    pub m1n1_thread_cluster_m101: usize,
    pub m1n1_thread_cluster_n101: usize,
}

impl TilingScheme {
    /// 64×64 output tiles, 8-deep reduction steps, 64 lanes with 2 repeats of 4×4 sub-tiles.
    pub fn preset_64x64x8() -> Self {
        Self {
            block_size: 64,
            m_per_block: 64,
            n_per_block: 64,
            k_per_block: 8,
            m1_per_thread: 4,
            n1_per_thread: 4,
            k_per_thread: 1,
            m1n1_thread_cluster_m100: 2,
            m1n1_thread_cluster_n100: 2,
            m1n1_thread_cluster_m101: 4,
            m1n1_thread_cluster_n101: 4,
        }
    }

    /// 128×128 output tiles, 8-deep reduction steps, 256 lanes with 2 repeats of 4×4 sub-tiles.
    pub fn preset_128x128x8() -> Self {
        Self {
            block_size: 256,
            m_per_block: 128,
            n_per_block: 128,
            k_per_block: 8,
            m1_per_thread: 4,
            n1_per_thread: 4,
            k_per_thread: 1,
            m1n1_thread_cluster_m100: 2,
            m1n1_thread_cluster_n100: 2,
            m1n1_thread_cluster_m101: 8,
            m1n1_thread_cluster_n101: 8,
        }
    }

    /// Lanes required by the thread cluster.
    pub fn cluster_size(&self) -> usize {
        self.m1n1_thread_cluster_m100
            * self.m1n1_thread_cluster_n100
            * self.m1n1_thread_cluster_m101
            * self.m1n1_thread_cluster_n101
    }

    /// Rows covered by a level-0 cluster.
    pub fn m_per_level0_cluster(&self) -> usize {
        self.m1_per_thread * self.m1n1_thread_cluster_m100
    }

    /// Columns covered by a level-0 cluster.
    pub fn n_per_level0_cluster(&self) -> usize {
        self.n1_per_thread * self.m1n1_thread_cluster_n100
    }

    /// Rows covered by a level-1 cluster, the `M11` extent.
    pub fn m_per_level1_cluster(&self) -> usize {
        self.m_per_level0_cluster() * self.m1n1_thread_cluster_m101
    }

    /// Columns covered by a level-1 cluster, the `N11` extent.
    pub fn n_per_level1_cluster(&self) -> usize {
        self.n_per_level0_cluster() * self.m1n1_thread_cluster_n101
    }

    /// Level-1 cluster repeats along M, the `M10` extent.
    pub fn m_repeat(&self) -> usize {
        self.m_per_block / self.m_per_level1_cluster()
    }

    /// Level-1 cluster repeats along N, the `N10` extent.
    pub fn n_repeat(&self) -> usize {
        self.n_per_block / self.n_per_level1_cluster()
    }

    /// Rows of the accumulator held by one lane.
    pub fn lane_rows(&self) -> usize {
        self.m_repeat() * self.m1_per_thread
    }

    /// Columns of the accumulator held by one lane.
    pub fn lane_cols(&self) -> usize {
        self.n_repeat() * self.n1_per_thread
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// How the lanes of a cube cooperatively copy one `(KPerBlock, MNPerBlock)` operand tile
/// from global to shared memory.
pub struct TransferSelection {
    /// Lanes along `(K, MN)`. The thread slice is the block slice divided by these lengths.
    pub thread_cluster_lengths: [usize; 2],
    /// Order in which lane ids are spread over the cluster dims, slowest first.
    pub thread_cluster_arrange_order: [usize; 2],
    /// Order of the global reads within a thread slice, slowest first.
    pub src_access_order: [usize; 2],
    /// Dimension along which global reads are vectorized.
    pub src_vector_dim: usize,
    /// Width of the vectorized shared memory writes, always along `MN`.
    pub dst_line_size: usize,
    /// Whether the source coordinate returns to the slice origin after each read.
    pub src_reset_coordinate_after_run: bool,
}

impl TransferSelection {
    /// Spreads consecutive lanes along `MN` so that neighbouring lanes read neighbouring lines.
    pub fn cooperative(
        block_size: usize,
        k_per_block: usize,
        mn_per_block: usize,
        line_size: usize,
    ) -> Self {
        let lines = (mn_per_block / line_size.max(1)).max(1);
        let cluster_mn = tessel_common::math::gcd(lines, block_size).max(1);
        let cluster_k = tessel_common::math::gcd(block_size / cluster_mn, k_per_block).max(1);

        Self {
            thread_cluster_lengths: [cluster_k, cluster_mn],
            thread_cluster_arrange_order: [0, 1],
            src_access_order: [0, 1],
            src_vector_dim: 1,
            dst_line_size: line_size,
            src_reset_coordinate_after_run: false,
        }
    }

    /// Lengths of the slice copied by each lane.
    pub fn thread_slice_lengths(&self, block_slice_lengths: [usize; 2]) -> [usize; 2] {
        [
            block_slice_lengths[0] / self.thread_cluster_lengths[0],
            block_slice_lengths[1] / self.thread_cluster_lengths[1],
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Groups of `m01 × n01` output tiles assigned to consecutive cubes.
pub struct BlockCluster {
    pub m01: usize,
    pub n01: usize,
}

impl Default for BlockCluster {
    fn default() -> Self {
        Self { m01: 1, n01: 1 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Number of shared memory stages used by the main loop.
pub enum Buffering {
    /// Loads of the next block-step overlap the compute of the current one.
    #[default]
    Double,
    /// Every block-step is loaded, then computed.
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Tiling configuration of a matmul, independent of the problem.
pub struct MatmulSelection {
    pub tiling_scheme: TilingScheme,
    pub lhs_transfer: TransferSelection,
    pub rhs_transfer: TransferSelection,
    /// Access order of the output store over `(M0, M10, M11, N0, N10, N11)`.
    pub out_access_order: [usize; 6],
    pub block_cluster: BlockCluster,
    /// Number of cubes sharing the reduction of one output tile.
    pub k_splits: usize,
    pub write_mode: WriteMode,
    pub output_op: OutputOp,
    pub tile_matmul: TileMatmulKind,
    pub buffering: Buffering,
    /// Whether problem dims that don't divide the block dims are padded.
    pub allow_padding: bool,
}

impl MatmulSelection {
    pub fn builder(tiling_scheme: TilingScheme) -> MatmulSelectionBuilder {
        MatmulSelectionBuilder::new(tiling_scheme)
    }
}

impl Default for MatmulSelection {
    fn default() -> Self {
        Self::builder(TilingScheme::preset_64x64x8()).build()
    }
}

pub struct MatmulSelectionBuilder {
    tiling_scheme: TilingScheme,
    lhs_transfer: Option<TransferSelection>,
    rhs_transfer: Option<TransferSelection>,
    out_access_order: [usize; 6],
    block_cluster: BlockCluster,
    k_splits: usize,
    write_mode: WriteMode,
    output_op: OutputOp,
    tile_matmul: TileMatmulKind,
    buffering: Buffering,
    allow_padding: bool,
}

impl MatmulSelectionBuilder {
    fn new(tiling_scheme: TilingScheme) -> Self {
        Self {
            tiling_scheme,
            lhs_transfer: None,
            rhs_transfer: None,
            out_access_order: [3, 4, 5, 0, 1, 2],
            block_cluster: BlockCluster::default(),
            k_splits: 1,
            write_mode: WriteMode::Set,
            output_op: OutputOp::PassThrough,
            tile_matmul: TileMatmulKind::default(),
            buffering: Buffering::default(),
            allow_padding: false,
        }
    }

    pub fn lhs_transfer(mut self, transfer: TransferSelection) -> Self {
        self.lhs_transfer = Some(transfer);
        self
    }

    pub fn rhs_transfer(mut self, transfer: TransferSelection) -> Self {
        self.rhs_transfer = Some(transfer);
        self
    }

    pub fn out_access_order(mut self, order: [usize; 6]) -> Self {
        self.out_access_order = order;
        self
    }

    pub fn block_cluster(mut self, m01: usize, n01: usize) -> Self {
        self.block_cluster = BlockCluster { m01, n01 };
        self
    }

    /// Splits the reduction over `k_splits` cubes accumulating with [WriteMode::AtomicAdd].
    pub fn k_splits(mut self, k_splits: usize) -> Self {
        self.k_splits = k_splits;
        if k_splits > 1 {
            self.write_mode = WriteMode::AtomicAdd;
        }
        self
    }

    pub fn write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn output_op(mut self, output_op: OutputOp) -> Self {
        self.output_op = output_op;
        self
    }

    pub fn tile_matmul(mut self, tile_matmul: TileMatmulKind) -> Self {
        self.tile_matmul = tile_matmul;
        self
    }

    pub fn buffering(mut self, buffering: Buffering) -> Self {
        self.buffering = buffering;
        self
    }

    pub fn allow_padding(mut self, allow_padding: bool) -> Self {
        self.allow_padding = allow_padding;
        self
    }

    pub fn build(self) -> MatmulSelection {
        let tiling = &self.tiling_scheme;
        let lhs_transfer = self.lhs_transfer.unwrap_or_else(|| {
            TransferSelection::cooperative(
                tiling.block_size,
                tiling.k_per_block,
                tiling.m_per_block,
                tiling.m1_per_thread,
            )
        });
        let rhs_transfer = self.rhs_transfer.unwrap_or_else(|| {
            TransferSelection::cooperative(
                tiling.block_size,
                tiling.k_per_block,
                tiling.n_per_block,
                tiling.n1_per_thread,
            )
        });

        MatmulSelection {
            tiling_scheme: self.tiling_scheme,
            lhs_transfer,
            rhs_transfer,
            out_access_order: self.out_access_order,
            block_cluster: self.block_cluster,
            k_splits: self.k_splits,
            write_mode: self.write_mode,
            output_op: self.output_op,
            tile_matmul: self.tile_matmul,
            buffering: self.buffering,
            allow_padding: self.allow_padding,
        }
    }
}

//! Tiled matmul kernel.
//!
//! Each cube computes one `MPerBlock × NPerBlock` output tile over one reduction split, staging
//! operand tiles in shared memory and accumulating in lane registers.
use core::marker::PhantomData;

use tessel_layout::Index;
use tessel_runtime::{
    ComputeClient, Cube, CubeKernel, GlobalOutput, validate_buffer_len, validate_shared_memory,
};

use crate::components::{
    Buffering, FormattedConfigError, GemmConfig, Lhs, MatmulLaunchError, MatmulPrecision,
    MatmulSetupError, Out, Rhs,
    batch::{BlockToTileMap, GridDescriptors},
    global::{
        BlockwiseTransfer, DoubleBufferedMatmul, GlobalMatmul, MainLoop, OutputWriter,
        PipelineSchedule, SingleBufferedMatmul,
    },
    stage::{BlockwiseGemm, LaneMap, StageLayout, StageMemory},
    tile::TileMatmul,
};

/// Kernel state shared by every cube, built and validated before the launch.
pub struct GemmKernel<'a, MP: MatmulPrecision, TMM: TileMatmul, GMM: GlobalMatmul> {
    config: &'a GemmConfig,
    grid: &'a GridDescriptors,
    lhs: &'a [Lhs<MP>],
    rhs: &'a [Rhs<MP>],
    source: Option<&'a [Out<MP>]>,
    out: &'a GlobalOutput<Out<MP>>,
    stage_layout: StageLayout,
    lhs_transfer: BlockwiseTransfer<Lhs<MP>>,
    rhs_transfer: BlockwiseTransfer<Rhs<MP>>,
    gemm: BlockwiseGemm<TMM>,
    writer: OutputWriter,
    tile_map: BlockToTileMap,
    schedule: PipelineSchedule,
    _global: PhantomData<GMM>,
}

impl<'a, MP: MatmulPrecision, TMM: TileMatmul, GMM: GlobalMatmul> GemmKernel<'a, MP, TMM, GMM> {
    pub fn new(
        config: &'a GemmConfig,
        grid: &'a GridDescriptors,
        lhs: &'a [Lhs<MP>],
        rhs: &'a [Rhs<MP>],
        source: Option<&'a [Out<MP>]>,
        out: &'a GlobalOutput<Out<MP>>,
    ) -> Result<Self, MatmulLaunchError> {
        let tiling = &config.tiling_scheme;
        let stage_layout = StageLayout::new(
            tiling,
            config.lhs_transfer.dst_line_size,
            config.rhs_transfer.dst_line_size,
        )?;
        let lane_map = LaneMap::new(tiling)?;

        let lhs_transfer = BlockwiseTransfer::new(
            tiling.block_size,
            &config.lhs_transfer,
            [tiling.k_per_block, tiling.m_per_block],
            config.line_sizes.lhs as usize,
            &grid.lhs,
            &stage_layout.lhs,
        )?;
        let rhs_transfer = BlockwiseTransfer::new(
            tiling.block_size,
            &config.rhs_transfer,
            [tiling.k_per_block, tiling.n_per_block],
            config.line_sizes.rhs as usize,
            &grid.rhs,
            &stage_layout.rhs,
        )?;
        let gemm = BlockwiseGemm::new(tiling, &stage_layout, &lane_map)?;
        let writer = OutputWriter::new(
            &grid.out,
            grid.source.as_ref(),
            tiling,
            &lane_map,
            &config.out_access_order,
            config.line_sizes.out as usize,
        )?;
        let tile_map = BlockToTileMap::new(grid.m0(config), grid.n0(config), config.block_cluster)?;

        Ok(Self {
            config,
            grid,
            lhs,
            rhs,
            source,
            out,
            stage_layout,
            lhs_transfer,
            rhs_transfer,
            gemm,
            writer,
            tile_map,
            schedule: PipelineSchedule::new(grid.k_blocks_per_split(config)),
            _global: PhantomData,
        })
    }
}

impl<MP: MatmulPrecision, TMM: TileMatmul, GMM: GlobalMatmul> CubeKernel
    for GemmKernel<'_, MP, TMM, GMM>
{
    fn execute(&self, cube: &Cube) {
        let tiling = &self.config.tiling_scheme;
        let cube_pos = cube.cube_pos as usize;
        let num_tiles = self.tile_map.num_tiles();
        let k_split = cube_pos / num_tiles;
        let (m_block, n_block) = self.tile_map.tile(cube_pos % num_tiles);
        let k_begin = k_split * self.schedule.num_k_blocks * tiling.k_per_block;
        log::trace!("Cube {cube_pos} computes tile ({m_block}, {n_block}) from k={k_begin}");

        let mut lhs_transfer = self.lhs_transfer.clone();
        lhs_transfer.set_src_slice_origin(
            &self.grid.lhs,
            &[k_begin as Index, (m_block * tiling.m_per_block) as Index],
        );
        let mut rhs_transfer = self.rhs_transfer.clone();
        rhs_transfer.set_src_slice_origin(
            &self.grid.rhs,
            &[k_begin as Index, (n_block * tiling.n_per_block) as Index],
        );

        let mut main_loop = MainLoop::<MP, TMM> {
            cube,
            lhs_desc: &self.grid.lhs,
            rhs_desc: &self.grid.rhs,
            lhs: self.lhs,
            rhs: self.rhs,
            lhs_transfer,
            rhs_transfer,
            stage_layout: &self.stage_layout,
            stages: StageMemory::new(cube, &self.stage_layout, GMM::NUM_STAGES),
            gemm: &self.gemm,
            accumulators: self.gemm.init_accumulators(),
            k_per_block: tiling.k_per_block,
        };
        GMM::execute(&mut main_loop, &self.schedule);

        let mut writer = self.writer.clone();
        writer.set_block(&self.grid.out, m_block, n_block);
        writer.write(
            &main_loop.accumulators,
            &self.grid.out,
            self.out,
            self.grid.source.as_ref().zip(self.source),
            &self.config.output_op,
            self.config.write_mode,
        );
    }
}

/// Launches the tiled matmul over prepared global views.
///
/// The pipeline follows [GemmConfig::buffering]. Buffers must hold every element their view
/// addresses. `source` is the data of [GridDescriptors::source], required by binary output ops.
pub fn launch_gemm<MP: MatmulPrecision, TMM: TileMatmul>(
    client: &ComputeClient,
    config: &GemmConfig,
    grid: &GridDescriptors,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    source: Option<&[Out<MP>]>,
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    match config.buffering {
        Buffering::Double => launch_with::<MP, TMM, DoubleBufferedMatmul>(
            client, config, grid, lhs, rhs, source, out,
        ),
        Buffering::Single => launch_with::<MP, TMM, SingleBufferedMatmul>(
            client, config, grid, lhs, rhs, source, out,
        ),
    }
}

fn launch_with<MP: MatmulPrecision, TMM: TileMatmul, GMM: GlobalMatmul>(
    client: &ComputeClient,
    config: &GemmConfig,
    grid: &GridDescriptors,
    lhs: &[Lhs<MP>],
    rhs: &[Rhs<MP>],
    source: Option<&[Out<MP>]>,
    out: &GlobalOutput<Out<MP>>,
) -> Result<(), MatmulLaunchError> {
    use tessel_runtime::ReadBuffer;

    validate_shared_memory(client.properties(), config.shared_memory_size)?;
    validate_buffer_len("lhs", lhs.len(), grid.lhs.element_space_size() as usize)?;
    validate_buffer_len("rhs", rhs.len(), grid.rhs.element_space_size() as usize)?;
    validate_buffer_len("out", out.len(), grid.out.element_space_size() as usize)?;
    check_source(config, grid, source)?;

    let kernel = GemmKernel::<MP, TMM, GMM>::new(config, grid, lhs, rhs, source, out)?;
    let cube_count = grid.cube_count(config);
    log::debug!(
        "Tiled {} matmul {:?} padded to {:?}: {} cubes, {} block-steps per cube, {:?} buffering",
        MP::name(),
        grid.size,
        grid.padded,
        cube_count.num_cubes(),
        kernel.schedule.num_k_blocks,
        config.buffering,
    );

    client.launch(&kernel, cube_count, config.cube_dim)?;
    Ok(())
}

fn check_source<E>(
    config: &GemmConfig,
    grid: &GridDescriptors,
    source: Option<&[E]>,
) -> Result<(), MatmulLaunchError> {
    let op = config.output_op;
    match (&grid.source, source) {
        (Some(desc), Some(data)) => {
            validate_buffer_len("source", data.len(), desc.element_space_size() as usize)?;
        }
        (None, None) if !op.is_binary() => {}
        (None, None) => {
            return Err(MatmulSetupError::InvalidProblem(FormattedConfigError::new(move || {
                format!("Output op {op:?} reads a second source but none was given")
            }))
            .into());
        }
        _ => {
            return Err(MatmulSetupError::InvalidProblem(FormattedConfigError::new(|| {
                "The output source needs both a view and a buffer".to_string()
            }))
            .into());
        }
    }
    Ok(())
}

use tessel_layout::{Index, TensorDescriptor};
use tessel_runtime::Cube;

use crate::components::{
    Acc, Lhs, MatmulPrecision, Rhs,
    global::BlockwiseTransfer,
    stage::{BlockwiseGemm, StageLayout, StageMemory, StageParity},
    tile::TileMatmul,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Shape of the reduction loop of one cube, known before launch.
pub struct PipelineSchedule {
    /// Block-steps reduced by each cube.
    pub num_k_blocks: usize,
    /// Whether at least one two-step main loop iteration runs.
    pub has_main_loop: bool,
    /// Whether two block-steps remain after the main loop.
    pub has_double_tail: bool,
}

impl PipelineSchedule {
    pub fn new(num_k_blocks: usize) -> Self {
        Self {
            num_k_blocks,
            has_main_loop: num_k_blocks.div_ceil(2) > 1,
            has_double_tail: num_k_blocks % 2 == 0,
        }
    }

    fn after_preload(&self) -> PipelineState {
        if self.has_main_loop {
            PipelineState::MainLoop { k_block_begin: 0 }
        } else {
            self.tail()
        }
    }

    fn after_main_loop_iteration(&self, k_block_begin: usize) -> PipelineState {
        let next = k_block_begin + 2;
        if next + 2 < self.num_k_blocks {
            PipelineState::MainLoop {
                k_block_begin: next,
            }
        } else {
            self.tail()
        }
    }

    fn tail(&self) -> PipelineState {
        if self.has_double_tail {
            PipelineState::Tail(TailKind::Double)
        } else {
            PipelineState::Tail(TailKind::Single)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailKind {
    /// One block-step is staged and not yet computed.
    Single,
    /// One block-step is staged and one is still in global memory.
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// States of the double-buffered reduction of one cube.
pub enum PipelineState {
    Preload,
    MainLoop { k_block_begin: usize },
    Tail(TailKind),
    Done,
}

/// Everything one cube needs to reduce its output tile.
pub struct MainLoop<'a, MP: MatmulPrecision, TMM: TileMatmul> {
    pub cube: &'a Cube,
    pub lhs_desc: &'a TensorDescriptor,
    pub rhs_desc: &'a TensorDescriptor,
    pub lhs: &'a [Lhs<MP>],
    pub rhs: &'a [Rhs<MP>],
    pub lhs_transfer: BlockwiseTransfer<Lhs<MP>>,
    pub rhs_transfer: BlockwiseTransfer<Rhs<MP>>,
    pub stage_layout: &'a StageLayout,
    pub stages: StageMemory<Lhs<MP>, Rhs<MP>>,
    pub gemm: &'a BlockwiseGemm<TMM>,
    pub accumulators: Vec<Vec<Acc<MP>>>,
    pub k_per_block: usize,
}

impl<MP: MatmulPrecision, TMM: TileMatmul> MainLoop<'_, MP, TMM> {
    fn sync(&self) {
        self.cube.sync_cube();
    }

    fn read_global(&mut self) {
        self.lhs_transfer.run_read(self.lhs_desc, self.lhs);
        self.rhs_transfer.run_read(self.rhs_desc, self.rhs);
    }

    fn write_stage(&mut self, parity: StageParity) {
        let slot = self.stages.slot(parity);
        self.lhs_transfer.run_write(&self.stage_layout.lhs, &slot.lhs);
        self.rhs_transfer.run_write(&self.stage_layout.rhs, &slot.rhs);
    }

    fn move_window(&mut self) {
        let step = [self.k_per_block as Index, 0];
        self.lhs_transfer.move_src_slice_window(self.lhs_desc, &step);
        self.rhs_transfer.move_src_slice_window(self.rhs_desc, &step);
    }

    fn compute(&mut self, parity: StageParity) {
        self.gemm.run(
            self.stage_layout,
            self.stages.slot(parity),
            &mut self.accumulators,
        );
    }
}

/// Reduction loop of a cube over the block-steps of its output tile.
pub trait GlobalMatmul: Send + Sync + 'static {
    /// Shared memory stages the loop alternates between.
    const NUM_STAGES: usize;

    /// Runs the whole reduction, leaving the result in the accumulators.
    fn execute<MP: MatmulPrecision, TMM: TileMatmul>(
        main_loop: &mut MainLoop<'_, MP, TMM>,
        schedule: &PipelineSchedule,
    );
}

/// Loads of the next block-step are issued before the compute of the current one, into the
/// other stage.
pub struct DoubleBufferedMatmul;

impl GlobalMatmul for DoubleBufferedMatmul {
    const NUM_STAGES: usize = 2;

    fn execute<MP: MatmulPrecision, TMM: TileMatmul>(
        main_loop: &mut MainLoop<'_, MP, TMM>,
        schedule: &PipelineSchedule,
    ) {
        use StageParity::*;

        let mut state = PipelineState::Preload;
        loop {
            log::trace!("Cube {} pipeline {state:?}", main_loop.cube.cube_pos);
            state = match state {
                PipelineState::Preload => {
                    main_loop.read_global();
                    main_loop.write_stage(Even);
                    schedule.after_preload()
                }
                PipelineState::MainLoop { k_block_begin } => {
                    for (current, next) in [(Even, Odd), (Odd, Even)] {
                        main_loop.move_window();
                        main_loop.sync();
                        main_loop.read_global();
                        main_loop.compute(current);
                        main_loop.write_stage(next);
                    }
                    schedule.after_main_loop_iteration(k_block_begin)
                }
                PipelineState::Tail(TailKind::Double) => {
                    main_loop.move_window();
                    main_loop.sync();
                    main_loop.read_global();
                    main_loop.compute(Even);
                    main_loop.write_stage(Odd);
                    main_loop.sync();
                    main_loop.compute(Odd);
                    PipelineState::Done
                }
                PipelineState::Tail(TailKind::Single) => {
                    main_loop.sync();
                    main_loop.compute(Even);
                    PipelineState::Done
                }
                PipelineState::Done => break,
            };
        }
    }
}

/// Every block-step is loaded, then computed, in a single stage.
pub struct SingleBufferedMatmul;

impl GlobalMatmul for SingleBufferedMatmul {
    const NUM_STAGES: usize = 1;

    fn execute<MP: MatmulPrecision, TMM: TileMatmul>(
        main_loop: &mut MainLoop<'_, MP, TMM>,
        schedule: &PipelineSchedule,
    ) {
        for k_block in 0..schedule.num_k_blocks {
            log::trace!(
                "Cube {} single-buffered step {k_block}",
                main_loop.cube.cube_pos
            );
            if k_block > 0 {
                main_loop.move_window();
            }
            main_loop.sync();
            main_loop.read_global();
            main_loop.write_stage(StageParity::Even);
            main_loop.sync();
            main_loop.compute(StageParity::Even);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{
            GemmConfig, MatmulLineSizes, MatmulSelection, batch::GridDescriptors,
            tile::RegisterMatmul,
        },
        kernels::GemmKernel,
        tests::test_utils::MatmulTestCase,
    };
    use std::sync::Arc;
    use tessel_runtime::{ComputeClient, HardwareProperties, LaunchError, config::GlobalConfig};
    use pretty_assertions::assert_eq;

    /// Block-steps computed by the states reachable from a schedule.
    fn computed_steps(schedule: &PipelineSchedule) -> usize {
        let mut state = PipelineState::Preload;
        let mut computed = 0;
        let mut loaded = 0;
        loop {
            state = match state {
                PipelineState::Preload => {
                    loaded += 1;
                    schedule.after_preload()
                }
                PipelineState::MainLoop { k_block_begin } => {
                    assert_eq!(k_block_begin, computed);
                    loaded += 2;
                    computed += 2;
                    schedule.after_main_loop_iteration(k_block_begin)
                }
                PipelineState::Tail(TailKind::Double) => {
                    loaded += 1;
                    computed += 2;
                    PipelineState::Done
                }
                PipelineState::Tail(TailKind::Single) => {
                    computed += 1;
                    PipelineState::Done
                }
                PipelineState::Done => break,
            };
        }
        assert_eq!(loaded, computed);
        computed
    }

    #[test]
    fn flags_follow_the_number_of_steps() {
        let flags = |steps| {
            let schedule = PipelineSchedule::new(steps);
            (schedule.has_main_loop, schedule.has_double_tail)
        };
        assert_eq!(flags(1), (false, false));
        assert_eq!(flags(2), (false, true));
        assert_eq!(flags(3), (true, false));
        assert_eq!(flags(4), (true, true));
    }

    #[test]
    fn every_step_is_computed_once() {
        for steps in 1..12 {
            assert_eq!(computed_steps(&PipelineSchedule::new(steps)), steps);
        }
    }

    /// Stages and computes without barriers between the two.
    struct MissingBarrierMatmul;

    impl GlobalMatmul for MissingBarrierMatmul {
        const NUM_STAGES: usize = 1;

        fn execute<MP: MatmulPrecision, TMM: TileMatmul>(
            main_loop: &mut MainLoop<'_, MP, TMM>,
            schedule: &PipelineSchedule,
        ) {
            for k_block in 0..schedule.num_k_blocks {
                if k_block > 0 {
                    main_loop.move_window();
                }
                main_loop.read_global();
                main_loop.write_stage(StageParity::Even);
                main_loop.compute(StageParity::Even);
            }
        }
    }

    #[test]
    fn missing_barrier_fails_the_launch() {
        let properties = HardwareProperties::default();
        let line_sizes = MatmulLineSizes {
            lhs: 4,
            rhs: 4,
            out: 4,
        };
        let config =
            GemmConfig::new::<f32>(&MatmulSelection::default(), line_sizes, &properties).unwrap();
        let case = MatmulTestCase::new(64, 64, 16);
        let grid = GridDescriptors::from_problem(&case.problem, &config).unwrap();
        let lhs = case.random_lhs::<f32>();
        let rhs = case.random_rhs::<f32>();
        let out = case.empty_out::<f32>();

        let kernel = GemmKernel::<f32, RegisterMatmul, MissingBarrierMatmul>::new(
            &config, &grid, &lhs, &rhs, None, &out,
        )
        .unwrap();
        let client = ComputeClient::with_config(properties, Arc::new(GlobalConfig::default()));
        let result = client.launch(&kernel, grid.cube_count(&config), config.cube_dim);
        assert!(matches!(
            result,
            Err(LaunchError::SharedMemoryHazard { .. })
        ));
    }
}

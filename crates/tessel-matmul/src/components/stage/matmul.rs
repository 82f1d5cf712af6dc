use core::marker::PhantomData;

use tessel_common::Numeric;
use tessel_layout::Index;

use crate::components::{
    MatmulSetupError, TilingScheme,
    global::ThreadwiseLoad,
    stage::{LaneMap, StageLayout, StageSlot},
    tile::{TileMatmul, TileShape},
};

/// Matmul of the operand tiles of one stage into the accumulators of every lane.
///
/// Each lane loads `KPerThread` rows of its `MRepeat × M1PerThread` lhs sub-tile and its
/// `NRepeat × N1PerThread` rhs sub-tile into registers, casts them to the accumulator
/// precision and hands them to the tile matmul.
pub struct BlockwiseGemm<TMM: TileMatmul> {
    lhs_load: ThreadwiseLoad,
    rhs_load: ThreadwiseLoad,
    lane_origins: Vec<(usize, usize)>,
    k_per_block: usize,
    shape: TileShape,
    _tile: PhantomData<TMM>,
}

impl<TMM: TileMatmul> BlockwiseGemm<TMM> {
    pub fn new(
        tiling: &TilingScheme,
        layout: &StageLayout,
        lane_map: &LaneMap,
    ) -> Result<Self, MatmulSetupError> {
        let k_per_thread = tiling.k_per_thread as Index;
        let lhs_load = ThreadwiseLoad::new(
            &layout.lhs_block,
            &[
                k_per_thread,
                tiling.m_repeat() as Index,
                tiling.m1_per_thread as Index,
            ],
            &[0, 1, 2],
            2,
            tiling.m1_per_thread,
        )?;
        let rhs_load = ThreadwiseLoad::new(
            &layout.rhs_block,
            &[
                k_per_thread,
                tiling.n_repeat() as Index,
                tiling.n1_per_thread as Index,
            ],
            &[0, 1, 2],
            2,
            tiling.n1_per_thread,
        )?;

        Ok(Self {
            lhs_load,
            rhs_load,
            lane_origins: (0..lane_map.num_lanes())
                .map(|lane| (lane_map.m11(lane), lane_map.n11(lane)))
                .collect(),
            k_per_block: tiling.k_per_block,
            shape: TileShape::new(tiling.k_per_thread, tiling.lane_rows(), tiling.lane_cols()),
            _tile: PhantomData,
        })
    }

    /// Zeroed accumulators of every lane.
    pub fn init_accumulators<A: Numeric>(&self) -> Vec<Vec<A>> {
        let len = self.shape.rows * self.shape.cols;
        vec![vec![A::zero(); len]; self.lane_origins.len()]
    }

    /// Accumulates the product of the tiles in `slot`.
    pub fn run<L: Numeric, R: Numeric, A: Numeric>(
        &self,
        layout: &StageLayout,
        slot: &StageSlot<L, R>,
        accumulators: &mut [Vec<A>],
    ) {
        let mut lhs_regs = vec![L::zero(); self.lhs_load.len()];
        let mut rhs_regs = vec![R::zero(); self.rhs_load.len()];
        let mut lhs_acc = vec![A::zero(); self.lhs_load.len()];
        let mut rhs_acc = vec![A::zero(); self.rhs_load.len()];

        for (acc, (m11, n11)) in accumulators.iter_mut().zip(&self.lane_origins) {
            for k in (0..self.k_per_block).step_by(self.shape.k) {
                let k = k as Index;
                self.lhs_load
                    .run(&layout.lhs_block, &slot.lhs, &[k, 0, *m11 as Index], &mut lhs_regs);
                self.rhs_load
                    .run(&layout.rhs_block, &slot.rhs, &[k, 0, *n11 as Index], &mut rhs_regs);

                for (dst, src) in lhs_acc.iter_mut().zip(&lhs_regs) {
                    *dst = A::cast_from(*src);
                }
                for (dst, src) in rhs_acc.iter_mut().zip(&rhs_regs) {
                    *dst = A::cast_from(*src);
                }

                TMM::execute(&lhs_acc, &rhs_acc, acc, self.shape);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{stage::StageMemory, tile::RegisterMatmul};
    use tessel_runtime::{Cube, CubeDim, WriteBuffer, WriteMode};

    #[test]
    fn lane_accumulators_hold_their_sub_tile() {
        let tiling = TilingScheme::preset_64x64x8();
        let layout = StageLayout::new(&tiling, 4, 4).unwrap();
        let lane_map = LaneMap::new(&tiling).unwrap();
        let gemm = BlockwiseGemm::<RegisterMatmul>::new(&tiling, &layout, &lane_map).unwrap();

        let cube = Cube::new(0, 1, CubeDim::new_1d(64), true);
        let stages = StageMemory::<f32, f32>::new(&cube, &layout, 1);
        let slot = stages.slot(crate::components::stage::StageParity::Even);

        // lhs[k, m] = m on k = 0 only, rhs[k, n] = n + 1 on k = 0 only.
        let lhs_row: Vec<f32> = (0..64).map(|m| m as f32).collect();
        let rhs_row: Vec<f32> = (0..64).map(|n| n as f32 + 1.0).collect();
        slot.lhs.write_line(0, true, &lhs_row, WriteMode::Set);
        slot.rhs.write_line(0, true, &rhs_row, WriteMode::Set);
        cube.sync_cube();

        let mut acc = gemm.init_accumulators::<f32>();
        gemm.run(&layout, slot, &mut acc);
        assert!(cube.take_hazard().is_none());

        for (lane, values) in acc.iter().enumerate() {
            let rows: Vec<usize> = lane_map.rows(lane).collect();
            let cols: Vec<usize> = lane_map.cols(lane).collect();
            for (i, row) in rows.iter().enumerate() {
                for (j, col) in cols.iter().enumerate() {
                    let expected = *row as f32 * (*col as f32 + 1.0);
                    assert_eq!(values[i * cols.len() + j], expected);
                }
            }
        }
    }
}

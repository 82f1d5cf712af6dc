use tessel_layout::{Index, LayoutError, TensorAdaptor, Transform};

use crate::components::TilingScheme;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Position of a lane in the two-level thread cluster.
pub struct LanePosition {
    pub level1_m: usize,
    pub level1_n: usize,
    pub level0_m: usize,
    pub level0_n: usize,
}

#[derive(Clone, Debug)]
/// Assigns to each lane of a cube the sub-tile of the output tile it accumulates.
///
/// Lane ids are decomposed over `(M101, N101, M100, N100)`, `N100` varying fastest. Within each
/// level-1 cluster repeat a lane owns `M1PerThread` consecutive rows and `N1PerThread`
/// consecutive columns.
pub struct LaneMap {
    adaptor: TensorAdaptor,
    tiling: TilingScheme,
}

impl LaneMap {
    pub fn new(tiling: &TilingScheme) -> Result<Self, LayoutError> {
        let lengths: Vec<Index> = [
            tiling.m1n1_thread_cluster_m101,
            tiling.m1n1_thread_cluster_n101,
            tiling.m1n1_thread_cluster_m100,
            tiling.m1n1_thread_cluster_n100,
        ]
        .iter()
        .map(|length| *length as Index)
        .collect();

        let adaptor = TensorAdaptor::identity(lengths.clone()).transform(
            vec![Transform::merge(lengths)?],
            vec![vec![0, 1, 2, 3]],
            vec![vec![0]],
        )?;

        Ok(Self {
            adaptor,
            tiling: tiling.clone(),
        })
    }

    /// Number of lanes taking part in the block matmul.
    pub fn num_lanes(&self) -> usize {
        self.tiling.cluster_size()
    }

    pub fn position(&self, lane: usize) -> LanePosition {
        let index = self.adaptor.calculate_bottom_index(&[lane as Index]);
        LanePosition {
            level1_m: index[0] as usize,
            level1_n: index[1] as usize,
            level0_m: index[2] as usize,
            level0_n: index[3] as usize,
        }
    }

    /// Offset of the lane rows inside a level-1 cluster repeat, along `M11`.
    pub fn m11(&self, lane: usize) -> usize {
        let position = self.position(lane);
        position.level1_m * self.tiling.m_per_level0_cluster()
            + position.level0_m * self.tiling.m1_per_thread
    }

    /// Offset of the lane columns inside a level-1 cluster repeat, along `N11`.
    pub fn n11(&self, lane: usize) -> usize {
        let position = self.position(lane);
        position.level1_n * self.tiling.n_per_level0_cluster()
            + position.level0_n * self.tiling.n1_per_thread
    }

    /// Rows of the output tile owned by a lane, in accumulator order.
    pub fn rows(&self, lane: usize) -> impl Iterator<Item = usize> + '_ {
        let m11 = self.m11(lane);
        let m_per_level1 = self.tiling.m_per_level1_cluster();
        (0..self.tiling.m_repeat()).flat_map(move |repeat| {
            (0..self.tiling.m1_per_thread).map(move |i| repeat * m_per_level1 + m11 + i)
        })
    }

    /// Columns of the output tile owned by a lane, in accumulator order.
    pub fn cols(&self, lane: usize) -> impl Iterator<Item = usize> + '_ {
        let n11 = self.n11(lane);
        let n_per_level1 = self.tiling.n_per_level1_cluster();
        (0..self.tiling.n_repeat()).flat_map(move |repeat| {
            (0..self.tiling.n1_per_thread).map(move |j| repeat * n_per_level1 + n11 + j)
        })
    }
}

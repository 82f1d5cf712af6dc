use tessel_common::{Numeric, math::lcm_all};
use tessel_layout::{Index, LayoutError, TensorDescriptor, Transform};
use tessel_runtime::{Cube, SharedMemory};

use crate::components::TilingScheme;

#[derive(Clone, Debug)]
/// Shared memory layout of the operand tiles of one block-step.
///
/// Tiles are stored `(KPerBlock, MNPerBlock)` with rows aligned on every vector width used to
/// access them, so that no vector straddles two rows.
pub struct StageLayout {
    /// Lhs tile `(KPerBlock, MPerBlock)`, as written by the global to shared transfer.
    pub lhs: TensorDescriptor,
    /// Rhs tile `(KPerBlock, NPerBlock)`, as written by the global to shared transfer.
    pub rhs: TensorDescriptor,
    /// Lhs tile viewed as `(KPerBlock, MRepeat, M11)` by the block matmul.
    pub lhs_block: TensorDescriptor,
    /// Rhs tile viewed as `(KPerBlock, NRepeat, N11)` by the block matmul.
    pub rhs_block: TensorDescriptor,
    pub align: usize,
    /// Elements allocated per lhs stage.
    pub lhs_space: usize,
    /// Elements allocated per rhs stage.
    pub rhs_space: usize,
}

impl StageLayout {
    pub fn new(
        tiling: &TilingScheme,
        lhs_line_size: usize,
        rhs_line_size: usize,
    ) -> Result<Self, LayoutError> {
        let align = lcm_all([
            lhs_line_size,
            rhs_line_size,
            tiling.m1_per_thread,
            tiling.n1_per_thread,
        ]);
        let k = tiling.k_per_block as Index;
        let lhs = TensorDescriptor::aligned([k, tiling.m_per_block as Index], align)?;
        let rhs = TensorDescriptor::aligned([k, tiling.n_per_block as Index], align)?;

        let split = |desc: &TensorDescriptor,
                     repeat: usize,
                     per_level1: usize|
         -> Result<TensorDescriptor, LayoutError> {
            desc.transform(
                vec![
                    Transform::pass_through(k)?,
                    Transform::unmerge(vec![repeat as Index, per_level1 as Index])?,
                ],
                vec![vec![0], vec![1]],
                vec![vec![0], vec![1, 2]],
            )
        };
        let lhs_block = split(&lhs, tiling.m_repeat(), tiling.m_per_level1_cluster())?;
        let rhs_block = split(&rhs, tiling.n_repeat(), tiling.n_per_level1_cluster())?;

        Ok(Self {
            lhs_space: lhs.aligned_element_space_size(align) as usize,
            rhs_space: rhs.aligned_element_space_size(align) as usize,
            lhs,
            rhs,
            lhs_block,
            rhs_block,
            align,
        })
    }

    /// Bytes of shared memory used by two stages of both operands.
    pub fn shared_memory_size(&self, lhs_elem_size: usize, rhs_elem_size: usize) -> usize {
        2 * (self.lhs_space * lhs_elem_size + self.rhs_space * rhs_elem_size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// One of the two stages of a double-buffered pipeline.
pub enum StageParity {
    Even,
    Odd,
}

impl StageParity {
    fn index(self) -> usize {
        match self {
            StageParity::Even => 0,
            StageParity::Odd => 1,
        }
    }
}

/// Operand tiles of one stage.
pub struct StageSlot<L: Numeric, R: Numeric> {
    pub lhs: SharedMemory<L>,
    pub rhs: SharedMemory<R>,
}

/// Shared memory stages of a cube.
///
/// Every operand of every stage is its own allocation, so that barrier hazards are tracked
/// per stage.
pub struct StageMemory<L: Numeric, R: Numeric> {
    slots: Vec<StageSlot<L, R>>,
}

impl<L: Numeric, R: Numeric> StageMemory<L, R> {
    pub fn new(cube: &Cube, layout: &StageLayout, num_stages: usize) -> Self {
        let slots = (0..num_stages)
            .map(|_| StageSlot {
                lhs: cube.shared_memory(layout.lhs_space),
                rhs: cube.shared_memory(layout.rhs_space),
            })
            .collect();
        Self { slots }
    }

    pub fn num_stages(&self) -> usize {
        self.slots.len()
    }

    /// Stage of a given parity. Single-stage memories map both parities to their only stage.
    pub fn slot(&self, parity: StageParity) -> &StageSlot<L, R> {
        &self.slots[parity.index() % self.slots.len()]
    }
}

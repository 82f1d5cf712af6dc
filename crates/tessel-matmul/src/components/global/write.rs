use serde::{Deserialize, Serialize};
use tessel_common::Numeric;
use tessel_layout::{Index, LayoutError, TensorDescriptor};
use tessel_runtime::{WriteBuffer, WriteMode};

use crate::components::{
    MatmulSetupError, TilingScheme,
    global::{ThreadwiseLoad, ThreadwiseStore},
    stage::LaneMap,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
/// Element-wise operation applied to accumulators before they are stored.
///
/// Binary operations also read `d`, the element of an [OutputSource] at the same position.
pub enum OutputOp {
    #[default]
    PassThrough,
    /// `max(x, 0)`
    Relu,
    /// `x * factor`
    Scale(f64),
    /// `x + d`
    Add,
    /// `max(x + d, 0)`
    AddRelu,
}

impl OutputOp {
    /// Applies the operation in accumulator precision, with a second source reading zero.
    pub fn apply<A: Numeric>(&self, value: A) -> A {
        self.apply_with(value, A::zero())
    }

    /// Applies the operation to an accumulator and the matching element of the second source.
    ///
    /// Scaling is computed in `f64`, so integer accumulators are scaled before being truncated.
    pub fn apply_with<A: Numeric>(&self, value: A, source: A) -> A {
        match self {
            OutputOp::PassThrough => value,
            OutputOp::Relu => relu(value),
            OutputOp::Scale(factor) => A::cast_from(value.to_f64_lossy() * factor),
            OutputOp::Add => value + source,
            OutputOp::AddRelu => relu(value + source),
        }
    }

    /// Whether the operation distributes over sums, so that partial results can be
    /// accumulated after it was applied.
    pub fn is_linear(&self) -> bool {
        matches!(self, OutputOp::PassThrough | OutputOp::Scale(_))
    }

    /// Whether the operation reads an [OutputSource].
    pub fn is_binary(&self) -> bool {
        matches!(self, OutputOp::Add | OutputOp::AddRelu)
    }
}

fn relu<A: Numeric>(value: A) -> A {
    if value < A::zero() { A::zero() } else { value }
}

#[derive(Clone, Copy, Debug)]
/// Second source of a binary [OutputOp]: an `(M, N)` tensor such as a bias or a residual.
pub struct OutputSource<'a, E> {
    /// Strides in elements, 0 to broadcast along a dimension.
    pub strides: [usize; 2],
    pub data: &'a [E],
}

impl<'a, E> OutputSource<'a, E> {
    pub fn new(strides: [usize; 2], data: &'a [E]) -> Self {
        Self { strides, data }
    }

    /// A bias broadcast along `M`, one value per column.
    pub fn row_bias(data: &'a [E]) -> Self {
        Self::new([0, 1], data)
    }

    /// `(M, N)` view of the source.
    pub fn descriptor(&self, m: usize, n: usize) -> Result<TensorDescriptor, LayoutError> {
        TensorDescriptor::naive(
            [m as Index, n as Index],
            [self.strides[0] as Index, self.strides[1] as Index],
        )
    }
}

#[derive(Clone, Debug)]
/// Stores the lane accumulators of a cube into its output tile.
///
/// The output is viewed as `(M0, M10, M11, N0, N10, N11)`. Each lane stores the slice
/// `(1, MRepeat, M1PerThread, 1, NRepeat, N1PerThread)` starting at
/// `(m_block, 0, m11, n_block, 0, n11)`, vectorized along `N11`.
///
/// With a source view, each lane first loads the matching slice of the source, element by
/// element, and stores `op(acc, d)`.
pub struct OutputWriter {
    lanes: Vec<ThreadwiseStore>,
    lane_origins: Vec<(usize, usize)>,
    source_load: Option<ThreadwiseLoad>,
    block: (usize, usize),
}

impl OutputWriter {
    pub fn new(
        out_desc: &TensorDescriptor,
        source_desc: Option<&TensorDescriptor>,
        tiling: &TilingScheme,
        lane_map: &LaneMap,
        access_order: &[usize],
        line_size: usize,
    ) -> Result<Self, MatmulSetupError> {
        let slice_lengths = [
            1,
            tiling.m_repeat() as Index,
            tiling.m1_per_thread as Index,
            1,
            tiling.n_repeat() as Index,
            tiling.n1_per_thread as Index,
        ];

        let mut lanes = Vec::with_capacity(lane_map.num_lanes());
        let mut lane_origins = Vec::with_capacity(lane_map.num_lanes());
        for lane in 0..lane_map.num_lanes() {
            let origin = (lane_map.m11(lane), lane_map.n11(lane));
            lanes.push(ThreadwiseStore::new(
                out_desc,
                &lane_origin(0, 0, origin),
                &slice_lengths,
                access_order,
                5,
                line_size,
                true,
            )?);
            lane_origins.push(origin);
        }

        let source_load = source_desc
            .map(|desc| ThreadwiseLoad::new(desc, &slice_lengths, access_order, 5, 1))
            .transpose()?;

        Ok(Self {
            lanes,
            lane_origins,
            source_load,
            block: (0, 0),
        })
    }

    /// Points every lane at the output tile `(m_block, n_block)`.
    pub fn set_block(&mut self, out_desc: &TensorDescriptor, m_block: usize, n_block: usize) {
        for (store, origin) in self.lanes.iter_mut().zip(&self.lane_origins) {
            store.set_dst_slice_origin(out_desc, &lane_origin(m_block, n_block, *origin));
        }
        self.block = (m_block, n_block);
    }

    /// Applies `op` to the accumulators of every lane and stores them with `mode`.
    ///
    /// `source` is the view and data of the second source, read only when the writer was built
    /// with a source view.
    pub fn write<A: Numeric, O: Numeric, B: WriteBuffer<O> + ?Sized>(
        &mut self,
        accumulators: &[Vec<A>],
        out_desc: &TensorDescriptor,
        out: &B,
        source: Option<(&TensorDescriptor, &[O])>,
        op: &OutputOp,
        mode: WriteMode,
    ) {
        let (m_block, n_block) = self.block;
        let lanes = self.lanes.iter_mut().zip(&self.lane_origins);
        for ((store, origin), acc) in lanes.zip(accumulators) {
            let residual = match (&self.source_load, source) {
                (Some(load), Some((desc, data))) => {
                    let mut regs = vec![O::zero(); load.len()];
                    load.run(desc, data, &lane_origin(m_block, n_block, *origin), &mut regs);
                    Some(regs)
                }
                _ => None,
            };
            store.run(acc, residual.as_deref(), out_desc, out, op, mode);
        }
    }
}

fn lane_origin(m_block: usize, n_block: usize, (m11, n11): (usize, usize)) -> [Index; 6] {
    [
        m_block as Index,
        0,
        m11 as Index,
        n_block as Index,
        0,
        n11 as Index,
    ]
}

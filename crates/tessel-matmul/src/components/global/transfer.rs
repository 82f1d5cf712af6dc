use tessel_common::Numeric;
use tessel_layout::{
    CoordinateStep, Index, MultiIndex, TensorCoordinate, TensorDescriptor, is_permutation,
    packed_strides,
};
use tessel_runtime::{ReadBuffer, WriteBuffer, WriteMode};

use crate::components::{FormattedConfigError, InvalidConfigError, global::OutputOp};

/// Move from one vector access of a slice to the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessMove {
    /// Dimension the move happens on.
    pub dim: usize,
    /// Whether the index increases.
    pub forward: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Plan of the vector accesses covering a slice.
///
/// Accesses follow a serpentine sweep: dimensions are visited in `dim_access_order`, and each
/// dimension reverses its direction every time an outer dimension advances. Two consecutive
/// accesses then always differ on a single dimension, so a coordinate walks the whole slice
/// with one precomputed step per dimension and direction.
pub struct SliceAccess {
    slice_lengths: MultiIndex,
    ordered_access_lengths: MultiIndex,
    dim_access_order: Vec<usize>,
    vector_dim: usize,
    scalar_per_vector: usize,
}

impl SliceAccess {
    pub fn new(
        slice_lengths: &[Index],
        dim_access_order: &[usize],
        vector_dim: usize,
        scalar_per_vector: usize,
    ) -> Result<Self, InvalidConfigError> {
        let rank = slice_lengths.len();
        if !is_permutation(dim_access_order, rank) {
            let order = dim_access_order.to_vec();
            return Err(FormattedConfigError::new(move || {
                format!("Access order {order:?} is not a permutation of {rank} dimensions")
            }));
        }
        if slice_lengths.iter().any(|length| *length <= 0) {
            let lengths = slice_lengths.to_vec();
            return Err(FormattedConfigError::new(move || {
                format!("Slice lengths {lengths:?} must be positive")
            }));
        }
        if vector_dim >= rank {
            return Err(FormattedConfigError::new(move || {
                format!("Vector dimension {vector_dim} out of a slice of rank {rank}")
            }));
        }
        let vector_length = slice_lengths[vector_dim];
        if scalar_per_vector == 0 || vector_length % scalar_per_vector as Index != 0 {
            return Err(FormattedConfigError::new(move || {
                format!(
                    "Slice length {vector_length} on the vector dimension is not divisible by the vector width {scalar_per_vector}"
                )
            }));
        }

        let mut access_lengths = MultiIndex::from(slice_lengths);
        access_lengths[vector_dim] /= scalar_per_vector as Index;

        Ok(Self {
            slice_lengths: MultiIndex::from(slice_lengths),
            ordered_access_lengths: access_lengths.reorder_new2old(dim_access_order),
            dim_access_order: dim_access_order.to_vec(),
            vector_dim,
            scalar_per_vector,
        })
    }

    pub fn slice_lengths(&self) -> &MultiIndex {
        &self.slice_lengths
    }

    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    pub fn scalar_per_vector(&self) -> usize {
        self.scalar_per_vector
    }

    pub fn num_accesses(&self) -> usize {
        self.ordered_access_lengths.product() as usize
    }

    fn ordered_access_index(&self, access: usize) -> MultiIndex {
        let mut index = MultiIndex::zeros(self.ordered_access_lengths.rank());
        let mut rest = access as Index;
        for i in (0..index.rank()).rev() {
            index[i] = rest % self.ordered_access_lengths[i];
            rest /= self.ordered_access_lengths[i];
        }
        index
    }

    fn forward_sweep(&self, ordered: &MultiIndex) -> Vec<bool> {
        let mut forward = vec![true; ordered.rank()];
        let mut prefix = 0;
        for i in 1..ordered.rank() {
            prefix = prefix * self.ordered_access_lengths[i - 1] + ordered[i - 1];
            forward[i] = prefix % 2 == 0;
        }
        forward
    }

    /// Index in the slice of the first element of an access.
    pub fn data_index(&self, access: usize) -> MultiIndex {
        let ordered = self.ordered_access_index(access);
        let forward = self.forward_sweep(&ordered);

        let mut data = MultiIndex::zeros(ordered.rank());
        for i in 0..ordered.rank() {
            let swept = if forward[i] {
                ordered[i]
            } else {
                self.ordered_access_lengths[i] - 1 - ordered[i]
            };
            let dim = self.dim_access_order[i];
            data[dim] = swept * self.scale(dim);
        }
        data
    }

    /// Move leading from `access` to the next access, `None` for the last one.
    pub fn next_move(&self, access: usize) -> Option<AccessMove> {
        if access + 1 >= self.num_accesses() {
            return None;
        }
        let ordered = self.ordered_access_index(access);
        let forward = self.forward_sweep(&ordered);
        let rank = ordered.rank();

        (0..rank).rev().find_map(|i| {
            let can_move = ordered[i] < self.ordered_access_lengths[i] - 1;
            let inner_done =
                (i + 1..rank).all(|j| ordered[j] == self.ordered_access_lengths[j] - 1);
            (can_move && inner_done).then(|| AccessMove {
                dim: self.dim_access_order[i],
                forward: forward[i],
            })
        })
    }

    /// Logical diff of a move.
    pub fn move_diff(&self, mv: AccessMove) -> MultiIndex {
        let amount = self.scale(mv.dim);
        MultiIndex::unit(
            self.slice_lengths.rank(),
            mv.dim,
            if mv.forward { amount } else { -amount },
        )
    }

    /// Step bringing a coordinate from the last access back to the slice origin.
    pub fn reset_step(&self) -> MultiIndex {
        -self.data_index(self.num_accesses() - 1)
    }

    fn scale(&self, dim: usize) -> Index {
        if dim == self.vector_dim {
            self.scalar_per_vector as Index
        } else {
            1
        }
    }
}

/// Coordinate steps of every access move of a slice on one descriptor.
#[derive(Clone, Debug)]
struct AccessSteps {
    forward: Vec<CoordinateStep>,
    backward: Vec<CoordinateStep>,
    reset: CoordinateStep,
}

impl AccessSteps {
    fn new(desc: &TensorDescriptor, access: &SliceAccess) -> Self {
        let rank = access.slice_lengths().rank();
        let steps = |forward: bool| -> Vec<CoordinateStep> {
            (0..rank)
                .map(|dim| CoordinateStep::new(desc, &access.move_diff(AccessMove { dim, forward })))
                .collect()
        };
        Self {
            forward: steps(true),
            backward: steps(false),
            reset: CoordinateStep::new(desc, &access.reset_step()),
        }
    }

    fn get(&self, mv: AccessMove) -> &CoordinateStep {
        if mv.forward {
            &self.forward[mv.dim]
        } else {
            &self.backward[mv.dim]
        }
    }
}

fn buffer_offset(strides: &MultiIndex, index: &MultiIndex) -> usize {
    index
        .iter()
        .zip(strides.iter())
        .map(|(i, s)| i * s)
        .sum::<Index>() as usize
}

fn coordinate_offset(coord: &TensorCoordinate, valid: bool) -> usize {
    if valid { coord.offset() as usize } else { 0 }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Shape of a slice copy between two tensors.
pub struct SliceTransferConfig {
    pub slice_lengths: MultiIndex,
    pub src_access_order: Vec<usize>,
    pub src_vector_dim: usize,
    pub src_scalar_per_vector: usize,
    pub dst_access_order: Vec<usize>,
    pub dst_vector_dim: usize,
    pub dst_scalar_per_vector: usize,
    pub src_reset_coordinate_after_run: bool,
    pub dst_reset_coordinate_after_run: bool,
}

#[derive(Clone, Debug)]
/// Copy of a slice from a source tensor to a destination tensor by one lane, staged in
/// registers.
///
/// [run_read](Self::run_read) fills the staging buffer and
/// [run_write](Self::run_write) drains it, so the two halves can be issued in different phases.
/// Source and destination are accessed with independent vector widths and orders.
pub struct ThreadwiseTransfer<E: Numeric> {
    src_access: SliceAccess,
    dst_access: SliceAccess,
    src_coord: TensorCoordinate,
    dst_coord: TensorCoordinate,
    src_steps: AccessSteps,
    dst_steps: AccessSteps,
    src_reset_after_run: bool,
    dst_reset_after_run: bool,
    buffer_strides: MultiIndex,
    buffer: Vec<E>,
}

impl<E: Numeric> ThreadwiseTransfer<E> {
    pub fn new(
        config: &SliceTransferConfig,
        src_desc: &TensorDescriptor,
        src_origin: &[Index],
        dst_desc: &TensorDescriptor,
        dst_origin: &[Index],
    ) -> Result<Self, InvalidConfigError> {
        let src_access = SliceAccess::new(
            &config.slice_lengths,
            &config.src_access_order,
            config.src_vector_dim,
            config.src_scalar_per_vector,
        )?;
        let dst_access = SliceAccess::new(
            &config.slice_lengths,
            &config.dst_access_order,
            config.dst_vector_dim,
            config.dst_scalar_per_vector,
        )?;

        Ok(Self {
            src_coord: TensorCoordinate::new(src_desc, src_origin),
            dst_coord: TensorCoordinate::new(dst_desc, dst_origin),
            src_steps: AccessSteps::new(src_desc, &src_access),
            dst_steps: AccessSteps::new(dst_desc, &dst_access),
            src_reset_after_run: config.src_reset_coordinate_after_run,
            dst_reset_after_run: config.dst_reset_coordinate_after_run,
            buffer_strides: packed_strides(&config.slice_lengths),
            buffer: vec![E::zero(); config.slice_lengths.product() as usize],
            src_access,
            dst_access,
        })
    }

    pub fn set_src_slice_origin(&mut self, src_desc: &TensorDescriptor, origin: &[Index]) {
        self.src_coord = TensorCoordinate::new(src_desc, origin);
    }

    pub fn set_dst_slice_origin(&mut self, dst_desc: &TensorDescriptor, origin: &[Index]) {
        self.dst_coord = TensorCoordinate::new(dst_desc, origin);
    }

    pub fn src_coordinate(&self) -> &TensorCoordinate {
        &self.src_coord
    }

    pub fn dst_coordinate(&self) -> &TensorCoordinate {
        &self.dst_coord
    }

    /// Reads the slice from the source into the staging buffer. Padded vectors read zeros.
    pub fn run_read<B: ReadBuffer<E> + ?Sized>(&mut self, src_desc: &TensorDescriptor, src: &B) {
        let access = &self.src_access;
        let mut line = vec![E::zero(); access.scalar_per_vector()];
        let element_step = MultiIndex::unit(access.slice_lengths().rank(), access.vector_dim(), 1);

        for i in 0..access.num_accesses() {
            let valid = self.src_coord.is_valid(src_desc);
            src.read_line(coordinate_offset(&self.src_coord, valid), valid, &mut line);

            let mut index = access.data_index(i);
            for value in line.iter() {
                self.buffer[buffer_offset(&self.buffer_strides, &index)] = *value;
                index = &index + &element_step;
            }

            if let Some(mv) = access.next_move(i) {
                self.src_coord.move_by(src_desc, self.src_steps.get(mv));
            }
        }

        if self.src_reset_after_run {
            self.src_coord.move_by(src_desc, &self.src_steps.reset);
        }
    }

    /// Writes the staging buffer to the destination. Padded vectors are skipped.
    pub fn run_write<D: Numeric, B: WriteBuffer<D> + ?Sized>(
        &mut self,
        dst_desc: &TensorDescriptor,
        dst: &B,
        mode: WriteMode,
    ) {
        let access = &self.dst_access;
        let mut line = vec![D::zero(); access.scalar_per_vector()];
        let element_step = MultiIndex::unit(access.slice_lengths().rank(), access.vector_dim(), 1);

        for i in 0..access.num_accesses() {
            let mut index = access.data_index(i);
            for value in line.iter_mut() {
                *value = D::cast_from(self.buffer[buffer_offset(&self.buffer_strides, &index)]);
                index = &index + &element_step;
            }

            let valid = self.dst_coord.is_valid(dst_desc);
            dst.write_line(coordinate_offset(&self.dst_coord, valid), valid, &line, mode);

            if let Some(mv) = access.next_move(i) {
                self.dst_coord.move_by(dst_desc, self.dst_steps.get(mv));
            }
        }

        if self.dst_reset_after_run {
            self.dst_coord.move_by(dst_desc, &self.dst_steps.reset);
        }
    }

    /// Moves the source slice window. When the coordinate is not reset after each read, the
    /// pending reset is folded into the same move.
    pub fn move_src_slice_window(&mut self, src_desc: &TensorDescriptor, step: &[Index]) {
        let step = MultiIndex::from(step);
        let adjusted = if self.src_reset_after_run {
            step
        } else {
            &step + &self.src_access.reset_step()
        };
        self.src_coord.move_by_diff(src_desc, &adjusted);
    }

    /// Moves the destination slice window, see [move_src_slice_window](Self::move_src_slice_window).
    pub fn move_dst_slice_window(&mut self, dst_desc: &TensorDescriptor, step: &[Index]) {
        let step = MultiIndex::from(step);
        let adjusted = if self.dst_reset_after_run {
            step
        } else {
            &step + &self.dst_access.reset_step()
        };
        self.dst_coord.move_by_diff(dst_desc, &adjusted);
    }
}

#[derive(Clone, Debug)]
/// Load of a slice from a tensor into packed lane registers.
pub struct ThreadwiseLoad {
    access: SliceAccess,
    steps: AccessSteps,
    buffer_strides: MultiIndex,
}

impl ThreadwiseLoad {
    pub fn new(
        src_desc: &TensorDescriptor,
        slice_lengths: &[Index],
        access_order: &[usize],
        vector_dim: usize,
        scalar_per_vector: usize,
    ) -> Result<Self, InvalidConfigError> {
        let access = SliceAccess::new(slice_lengths, access_order, vector_dim, scalar_per_vector)?;
        Ok(Self {
            steps: AccessSteps::new(src_desc, &access),
            buffer_strides: packed_strides(slice_lengths),
            access,
        })
    }

    /// Number of registers filled by a load.
    pub fn len(&self) -> usize {
        self.access.slice_lengths().product() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads the slice starting at `origin` into `dst`, laid out packed over the slice lengths.
    pub fn run<E: Numeric, B: ReadBuffer<E> + ?Sized>(
        &self,
        src_desc: &TensorDescriptor,
        src: &B,
        origin: &[Index],
        dst: &mut [E],
    ) {
        let access = &self.access;
        let mut coord = TensorCoordinate::new(src_desc, origin);
        let mut line = vec![E::zero(); access.scalar_per_vector()];
        let element_step = MultiIndex::unit(access.slice_lengths().rank(), access.vector_dim(), 1);

        for i in 0..access.num_accesses() {
            let valid = coord.is_valid(src_desc);
            src.read_line(coordinate_offset(&coord, valid), valid, &mut line);

            let mut index = access.data_index(i);
            for value in line.iter() {
                dst[buffer_offset(&self.buffer_strides, &index)] = *value;
                index = &index + &element_step;
            }

            if let Some(mv) = access.next_move(i) {
                coord.move_by(src_desc, self.steps.get(mv));
            }
        }
    }
}

#[derive(Clone, Debug)]
/// Store of packed lane registers into a slice of a tensor.
pub struct ThreadwiseStore {
    access: SliceAccess,
    dst_coord: TensorCoordinate,
    steps: AccessSteps,
    reset_after_run: bool,
    buffer_strides: MultiIndex,
}

impl ThreadwiseStore {
    pub fn new(
        dst_desc: &TensorDescriptor,
        dst_origin: &[Index],
        slice_lengths: &[Index],
        access_order: &[usize],
        vector_dim: usize,
        scalar_per_vector: usize,
        reset_after_run: bool,
    ) -> Result<Self, InvalidConfigError> {
        let access = SliceAccess::new(slice_lengths, access_order, vector_dim, scalar_per_vector)?;
        Ok(Self {
            dst_coord: TensorCoordinate::new(dst_desc, dst_origin),
            steps: AccessSteps::new(dst_desc, &access),
            reset_after_run,
            buffer_strides: packed_strides(slice_lengths),
            access,
        })
    }

    pub fn set_dst_slice_origin(&mut self, dst_desc: &TensorDescriptor, origin: &[Index]) {
        self.dst_coord = TensorCoordinate::new(dst_desc, origin);
    }

    pub fn dst_coordinate(&self) -> &TensorCoordinate {
        &self.dst_coord
    }

    /// Applies `op` to the registers of `src`, casts them and stores them with `mode`.
    ///
    /// `source` holds the second operand of binary ops, packed like `src`.
    pub fn run<A: Numeric, O: Numeric, B: WriteBuffer<O> + ?Sized>(
        &mut self,
        src: &[A],
        source: Option<&[O]>,
        dst_desc: &TensorDescriptor,
        dst: &B,
        op: &OutputOp,
        mode: WriteMode,
    ) {
        let access = &self.access;
        let mut line = vec![O::zero(); access.scalar_per_vector()];
        let element_step = MultiIndex::unit(access.slice_lengths().rank(), access.vector_dim(), 1);

        for i in 0..access.num_accesses() {
            let mut index = access.data_index(i);
            for value in line.iter_mut() {
                let offset = buffer_offset(&self.buffer_strides, &index);
                let residual = source.map_or(A::zero(), |source| A::cast_from(source[offset]));
                *value = O::cast_from(op.apply_with(src[offset], residual));
                index = &index + &element_step;
            }

            let valid = self.dst_coord.is_valid(dst_desc);
            dst.write_line(coordinate_offset(&self.dst_coord, valid), valid, &line, mode);

            if let Some(mv) = access.next_move(i) {
                self.dst_coord.move_by(dst_desc, self.steps.get(mv));
            }
        }

        if self.reset_after_run {
            self.dst_coord.move_by(dst_desc, &self.steps.reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_layout::Transform;
    use tessel_runtime::GlobalOutput;

    fn all_data_indices(access: &SliceAccess) -> Vec<Vec<Index>> {
        (0..access.num_accesses())
            .map(|i| access.data_index(i).into_inner())
            .collect()
    }

    #[test]
    fn serpentine_sweep_reverses_inner_dim() {
        let access = SliceAccess::new(&[2, 3], &[0, 1], 1, 1).unwrap();
        assert_eq!(
            all_data_indices(&access),
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 2],
                vec![1, 1],
                vec![1, 0]
            ]
        );
        assert_eq!(access.reset_step(), MultiIndex::from([-1, 0]));
    }

    #[test]
    fn vector_dim_scales_indices_and_order_is_respected() {
        let access = SliceAccess::new(&[4, 2], &[1, 0], 0, 2).unwrap();
        assert_eq!(
            all_data_indices(&access),
            vec![vec![0, 0], vec![2, 0], vec![2, 1], vec![0, 1]]
        );
        assert_eq!(access.reset_step(), MultiIndex::from([0, -1]));
    }

    #[test]
    fn consecutive_accesses_differ_by_the_announced_move() {
        let access = SliceAccess::new(&[3, 2, 4], &[2, 0, 1], 2, 2).unwrap();
        for i in 0..access.num_accesses() - 1 {
            let mv = access.next_move(i).unwrap();
            let diff = &access.data_index(i + 1) - &access.data_index(i);
            assert_eq!(diff, access.move_diff(mv));
        }
        assert_eq!(access.next_move(access.num_accesses() - 1), None);
    }

    #[test]
    fn rejects_bad_vector_width_and_order() {
        assert!(SliceAccess::new(&[4, 6], &[0, 1], 1, 4).is_err());
        assert!(SliceAccess::new(&[4, 6], &[1, 1], 1, 2).is_err());
    }

    fn copy_config(reset: bool) -> SliceTransferConfig {
        SliceTransferConfig {
            slice_lengths: MultiIndex::from([2, 4]),
            src_access_order: vec![0, 1],
            src_vector_dim: 1,
            src_scalar_per_vector: 2,
            dst_access_order: vec![1, 0],
            dst_vector_dim: 1,
            dst_scalar_per_vector: 4,
            src_reset_coordinate_after_run: reset,
            dst_reset_coordinate_after_run: true,
        }
    }

    #[test]
    fn window_moves_with_and_without_reset_agree() {
        let src_desc = TensorDescriptor::packed([8, 4]).unwrap();
        let dst_desc = TensorDescriptor::packed([2, 4]).unwrap();
        let src: Vec<f32> = (0..32).map(|v| v as f32).collect();

        for reset in [true, false] {
            let mut copy =
                ThreadwiseTransfer::<f32>::new(&copy_config(reset), &src_desc, &[0, 0], &dst_desc, &[0, 0])
                    .unwrap();
            let mut windows = Vec::new();
            for _ in 0..4 {
                let out = GlobalOutput::<f32>::zeros(8);
                copy.run_read(&src_desc, src.as_slice());
                copy.run_write(&dst_desc, &out, WriteMode::Set);
                copy.move_src_slice_window(&src_desc, &[2, 0]);
                windows.push(out.to_vec());
            }
            let expected: Vec<Vec<f32>> = (0..4)
                .map(|w| (w * 8..w * 8 + 8).map(|v| v as f32).collect())
                .collect();
            assert_eq!(windows, expected);
            assert_eq!(copy.src_coordinate().index(&src_desc), MultiIndex::from([8, 0]));
        }
    }

    #[test]
    fn padded_reads_are_zero_and_padded_stores_skipped() {
        let src_desc = TensorDescriptor::packed([3])
            .unwrap()
            .transform(vec![Transform::right_pad(3, 1).unwrap()], vec![vec![0]], vec![vec![0]])
            .unwrap();
        let load = ThreadwiseLoad::new(&src_desc, &[4], &[0], 0, 1).unwrap();
        let mut regs = [9.0f32; 4];
        load.run(&src_desc, [1.0f32, 2.0, 3.0].as_slice(), &[0], &mut regs);
        assert_eq!(regs, [1.0, 2.0, 3.0, 0.0]);

        let out = GlobalOutput::<f32>::from_slice(&[7.0; 3]);
        let mut store = ThreadwiseStore::new(&src_desc, &[0], &[4], &[0], 0, 1, true).unwrap();
        store.run(
            &[5.0f32, 6.0, 7.0, 8.0],
            None,
            &src_desc,
            &out,
            &OutputOp::Relu,
            WriteMode::Set,
        );
        assert_eq!(out.to_vec(), vec![5.0, 6.0, 7.0]);
        assert_eq!(store.dst_coordinate().index(&src_desc), MultiIndex::from([0]));
    }

    #[test]
    fn store_combines_registers_with_a_second_source() {
        let desc = TensorDescriptor::packed([2, 4]).unwrap();
        let mut store = ThreadwiseStore::new(&desc, &[0, 0], &[2, 4], &[0, 1], 1, 2, false).unwrap();
        let acc: Vec<i32> = (0..8).collect();
        let residual: Vec<i32> = (0..8).map(|v| 5 - 2 * v).collect();

        let out = GlobalOutput::<i32>::zeros(8);
        store.run(&acc, Some(&residual), &desc, &out, &OutputOp::AddRelu, WriteMode::Set);
        assert_eq!(out.to_vec(), vec![5, 4, 3, 2, 1, 0, 0, 0]);
    }
}

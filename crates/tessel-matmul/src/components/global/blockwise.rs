use tessel_common::Numeric;
use tessel_layout::{Index, MultiIndex, TensorAdaptor, TensorDescriptor, Transform};
use tessel_runtime::{ReadBuffer, WriteBuffer, WriteMode};

use crate::components::{
    MatmulSetupError, TransferSelection,
    global::{SliceTransferConfig, ThreadwiseTransfer},
};

#[derive(Clone, Debug)]
/// Cooperative copy of a `(KPerBlock, MNPerBlock)` operand tile by the lanes of a cube.
///
/// Lane ids are spread over the thread cluster with a merge adaptor following the arrange
/// order. Each lane in the cluster copies one thread slice, lanes past the cluster idle.
pub struct BlockwiseTransfer<E: Numeric> {
    thread_origins: Vec<Option<MultiIndex>>,
    lanes: Vec<Option<ThreadwiseTransfer<E>>>,
}

impl<E: Numeric> BlockwiseTransfer<E> {
    pub fn new(
        block_size: usize,
        selection: &TransferSelection,
        block_slice_lengths: [usize; 2],
        src_line_size: usize,
        src_desc: &TensorDescriptor,
        dst_desc: &TensorDescriptor,
    ) -> Result<Self, MatmulSetupError> {
        let cluster = selection.thread_cluster_lengths;
        let order = selection.thread_cluster_arrange_order;
        let cluster_adaptor = TensorAdaptor::identity([cluster[0] as Index, cluster[1] as Index])
            .transform(
                vec![Transform::merge(vec![
                    cluster[order[0]] as Index,
                    cluster[order[1]] as Index,
                ])?],
                vec![order.to_vec()],
                vec![vec![0]],
            )?;

        let thread_slice = selection.thread_slice_lengths(block_slice_lengths);
        let config = SliceTransferConfig {
            slice_lengths: MultiIndex::from([thread_slice[0] as Index, thread_slice[1] as Index]),
            src_access_order: selection.src_access_order.to_vec(),
            src_vector_dim: selection.src_vector_dim,
            src_scalar_per_vector: src_line_size,
            dst_access_order: vec![0, 1],
            dst_vector_dim: 1,
            dst_scalar_per_vector: selection.dst_line_size,
            src_reset_coordinate_after_run: selection.src_reset_coordinate_after_run,
            dst_reset_coordinate_after_run: true,
        };

        let cluster_size = cluster[0] * cluster[1];
        let mut thread_origins = Vec::with_capacity(block_size);
        let mut lanes = Vec::with_capacity(block_size);
        for lane in 0..block_size {
            if lane >= cluster_size {
                thread_origins.push(None);
                lanes.push(None);
                continue;
            }
            let cluster_index = cluster_adaptor.calculate_bottom_index(&[lane as Index]);
            let origin = MultiIndex::from([
                cluster_index[0] * thread_slice[0] as Index,
                cluster_index[1] * thread_slice[1] as Index,
            ]);
            lanes.push(Some(ThreadwiseTransfer::new(
                &config, src_desc, &origin, dst_desc, &origin,
            )?));
            thread_origins.push(Some(origin));
        }

        Ok(Self {
            thread_origins,
            lanes,
        })
    }

    /// Origin of the slice copied by a lane, relative to the block origin.
    pub fn thread_origin(&self, lane: usize) -> Option<&MultiIndex> {
        self.thread_origins[lane].as_ref()
    }

    /// Points every lane at the tile starting at `block_origin` in the source.
    pub fn set_src_slice_origin(&mut self, src_desc: &TensorDescriptor, block_origin: &[Index]) {
        let block_origin = MultiIndex::from(block_origin);
        for (transfer, origin) in self.lanes.iter_mut().zip(&self.thread_origins) {
            if let (Some(transfer), Some(origin)) = (transfer, origin) {
                transfer.set_src_slice_origin(src_desc, &(&block_origin + origin));
            }
        }
    }

    /// Reads the tile from global memory into the lane staging buffers.
    pub fn run_read<B: ReadBuffer<E> + ?Sized>(&mut self, src_desc: &TensorDescriptor, src: &B) {
        for transfer in self.lanes.iter_mut().flatten() {
            transfer.run_read(src_desc, src);
        }
    }

    /// Writes the lane staging buffers into a shared memory stage.
    pub fn run_write<B: WriteBuffer<E> + ?Sized>(&mut self, dst_desc: &TensorDescriptor, dst: &B) {
        for transfer in self.lanes.iter_mut().flatten() {
            transfer.run_write(dst_desc, dst, WriteMode::Set);
        }
    }

    /// Advances the source window of every lane by `step`.
    pub fn move_src_slice_window(&mut self, src_desc: &TensorDescriptor, step: &[Index]) {
        for transfer in self.lanes.iter_mut().flatten() {
            transfer.move_src_slice_window(src_desc, step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_runtime::GlobalOutput;

    fn selection(cluster: [usize; 2], order: [usize; 2]) -> TransferSelection {
        TransferSelection {
            thread_cluster_lengths: cluster,
            thread_cluster_arrange_order: order,
            src_access_order: [1, 0],
            src_vector_dim: 1,
            dst_line_size: 2,
            src_reset_coordinate_after_run: false,
        }
    }

    #[test]
    fn arrange_order_decides_which_dim_lanes_walk_first() {
        let src = TensorDescriptor::packed([8, 16]).unwrap();
        let dst = TensorDescriptor::packed([4, 16]).unwrap();

        let row_major =
            BlockwiseTransfer::<f32>::new(16, &selection([2, 4], [0, 1]), [4, 16], 2, &src, &dst)
                .unwrap();
        assert_eq!(row_major.thread_origin(1), Some(&MultiIndex::from([0, 4])));
        assert_eq!(row_major.thread_origin(4), Some(&MultiIndex::from([2, 0])));
        assert_eq!(row_major.thread_origin(8), None);

        let col_major =
            BlockwiseTransfer::<f32>::new(16, &selection([2, 4], [1, 0]), [4, 16], 2, &src, &dst)
                .unwrap();
        assert_eq!(col_major.thread_origin(1), Some(&MultiIndex::from([2, 0])));
        assert_eq!(col_major.thread_origin(2), Some(&MultiIndex::from([0, 4])));
    }

    #[test]
    fn copies_consecutive_tiles() {
        let src_desc = TensorDescriptor::packed([8, 16]).unwrap();
        let dst_desc = TensorDescriptor::packed([4, 16]).unwrap();
        let src: Vec<f32> = (0..128).map(|v| v as f32).collect();

        let mut transfer = BlockwiseTransfer::<f32>::new(
            16,
            &selection([2, 4], [0, 1]),
            [4, 16],
            2,
            &src_desc,
            &dst_desc,
        )
        .unwrap();
        transfer.set_src_slice_origin(&src_desc, &[0, 0]);

        for tile in 0..2 {
            if tile > 0 {
                transfer.move_src_slice_window(&src_desc, &[4, 0]);
            }
            let stage = GlobalOutput::<f32>::zeros(64);
            transfer.run_read(&src_desc, src.as_slice());
            transfer.run_write(&dst_desc, &stage);
            let expected: Vec<f32> = (tile * 64..tile * 64 + 64).map(|v| v as f32).collect();
            assert_eq!(stage.to_vec(), expected);
        }
    }
}

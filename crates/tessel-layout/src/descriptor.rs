use tessel_common::math::integer_least_multiple;

use crate::{
    Index, LayoutError, MultiIndex, TensorAdaptor, Transform, adaptor::TransformStage,
};

/// Transform chain from the logical dimensions of a tensor down to its linear offset.
///
/// The bottom of the chain is a single dimension, the element offset, stored at hidden id 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDescriptor {
    adaptor: TensorAdaptor,
    element_space_size: Index,
}

impl TensorDescriptor {
    /// Strided view: one embed from the logical index to the offset.
    pub fn naive(
        lengths: impl Into<MultiIndex>,
        strides: impl Into<MultiIndex>,
    ) -> Result<Self, LayoutError> {
        let lengths: MultiIndex = lengths.into();
        let strides: MultiIndex = strides.into();

        let embed = crate::transform::Embed::new(lengths.to_vec(), strides.to_vec(), 0)?;
        let element_space_size = embed.lower_extent();

        let rank = lengths.rank();
        let mut hidden_lengths = Vec::with_capacity(rank + 1);
        hidden_lengths.push(element_space_size);
        hidden_lengths.extend(lengths.iter().copied());

        let upper_ids: Vec<usize> = (1..=rank).collect();
        let adaptor = TensorAdaptor::from_parts(
            vec![TransformStage {
                transform: Transform::Embed(embed),
                lower_ids: vec![0],
                upper_ids: upper_ids.clone(),
            }],
            hidden_lengths,
            vec![0],
            upper_ids,
        );

        Ok(Self {
            adaptor,
            element_space_size,
        })
    }

    /// Row-major contiguous view.
    pub fn packed(lengths: impl Into<MultiIndex>) -> Result<Self, LayoutError> {
        let lengths: MultiIndex = lengths.into();
        let strides = packed_strides(&lengths);
        Self::naive(lengths, strides)
    }

    /// Row-major view where the stride of the second-to-last dimension is rounded up to `align`.
    ///
    /// Rows of the innermost dimension then start on `align` boundaries, which keeps vector
    /// accesses along the innermost dimension from straddling two rows.
    pub fn aligned(lengths: impl Into<MultiIndex>, align: usize) -> Result<Self, LayoutError> {
        let lengths: MultiIndex = lengths.into();
        let rank = lengths.rank();
        let mut strides = MultiIndex::splat(rank, 1);
        if rank >= 2 {
            strides[rank - 2] = integer_least_multiple(lengths[rank - 1] as usize, align) as Index;
            for i in (0..rank - 2).rev() {
                strides[i] = strides[i + 1] * lengths[i + 1];
            }
        }
        Self::naive(lengths, strides)
    }

    /// Appends a stage of transforms, see [TensorAdaptor::transform].
    pub fn transform(
        &self,
        transforms: Vec<Transform>,
        lower_dims: Vec<Vec<usize>>,
        upper_dims: Vec<Vec<usize>>,
    ) -> Result<Self, LayoutError> {
        let adaptor = self.adaptor.transform(transforms, lower_dims, upper_dims)?;
        if adaptor.bottom_ids().len() != 1 {
            return Err(LayoutError::NotADescriptor {
                bottom_dims: adaptor.bottom_ids().len(),
            });
        }
        Ok(Self {
            adaptor,
            element_space_size: self.element_space_size,
        })
    }

    /// Number of logical dimensions.
    pub fn rank(&self) -> usize {
        self.adaptor.rank()
    }

    /// Length of a logical dimension.
    pub fn length(&self, dim: usize) -> Index {
        self.adaptor.length(dim)
    }

    /// Lengths of every logical dimension.
    pub fn lengths(&self) -> MultiIndex {
        self.adaptor.lengths()
    }

    /// Largest reachable offset plus one, the size to allocate for this view.
    pub fn element_space_size(&self) -> Index {
        self.element_space_size
    }

    /// Element space size rounded up to a multiple of `align`.
    pub fn aligned_element_space_size(&self, align: usize) -> Index {
        integer_least_multiple(self.element_space_size as usize, align) as Index
    }

    /// Linear offset of a logical index.
    pub fn calculate_offset(&self, index: &[Index]) -> Index {
        self.adaptor.calculate_hidden_index(index)[0]
    }

    /// Whether a logical index maps to real memory, that is not in a padded region.
    pub fn is_valid(&self, index: &[Index]) -> bool {
        let hidden = self.adaptor.calculate_hidden_index(index);
        self.adaptor.is_valid_hidden_index(&hidden)
    }

    /// Whether a logical index is inside the logical lengths.
    pub fn contains(&self, index: &[Index]) -> bool {
        index.len() == self.rank()
            && index
                .iter()
                .enumerate()
                .all(|(dim, i)| *i >= 0 && *i < self.length(dim))
    }

    /// Underlying transform chain.
    pub fn adaptor(&self) -> &TensorAdaptor {
        &self.adaptor
    }
}

/// Row-major strides of `lengths`.
pub fn packed_strides(lengths: &[Index]) -> MultiIndex {
    let mut strides = MultiIndex::splat(lengths.len(), 1);
    for i in (0..lengths.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * lengths[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn naive_offsets_and_space() {
        let desc = TensorDescriptor::naive([3, 4], [10, 2]).unwrap();
        assert_eq!(desc.calculate_offset(&[2, 3]), 26);
        assert_eq!(desc.element_space_size(), 27);
        assert_eq!(desc.lengths(), MultiIndex::from([3, 4]));
    }

    #[test]
    fn aligned_rounds_row_stride() {
        let desc = TensorDescriptor::aligned([8, 6], 4).unwrap();
        assert_eq!(desc.calculate_offset(&[1, 0]), 8);
        assert_eq!(desc.element_space_size(), 7 * 8 + 6);
        assert_eq!(desc.aligned_element_space_size(4), 64);
    }

    #[test]
    fn split_m_into_blocks() {
        let desc = TensorDescriptor::packed([8, 128]).unwrap();
        let split = desc
            .transform(
                vec![
                    Transform::pass_through(8).unwrap(),
                    Transform::unmerge(vec![2, 64]).unwrap(),
                ],
                vec![vec![0], vec![1]],
                vec![vec![0], vec![1, 2]],
            )
            .unwrap();
        assert_eq!(split.lengths(), MultiIndex::from([8, 2, 64]));
        assert_eq!(split.calculate_offset(&[3, 1, 5]), 3 * 128 + 64 + 5);
    }

    #[test]
    fn right_padding_is_flagged() {
        let desc = TensorDescriptor::packed([5])
            .unwrap()
            .transform(
                vec![Transform::right_pad(5, 3).unwrap()],
                vec![vec![0]],
                vec![vec![0]],
            )
            .unwrap();
        assert_eq!(desc.length(0), 8);
        assert!(desc.is_valid(&[4]));
        assert!(!desc.is_valid(&[5]));
        assert!(!desc.is_valid(&[7]));
    }
}

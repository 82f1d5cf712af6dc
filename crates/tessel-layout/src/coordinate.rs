use smallvec::SmallVec;

use crate::{Index, MultiIndex, TensorDescriptor};

/// Indices of one transform stage, inline for the ranks descriptors use.
type StageIndex = SmallVec<[Index; 8]>;

/// Position in a tensor descriptor that caches the index of every hidden dimension.
///
/// Moving a coordinate by a [CoordinateStep] only runs the transforms the step touches, each of
/// them through its incremental update, so the cost is bounded by the chain depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorCoordinate {
    hidden: MultiIndex,
}

/// Precomputed move of a [TensorCoordinate].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinateStep {
    top_diff: MultiIndex,
    do_transforms: Vec<bool>,
}

impl TensorCoordinate {
    /// Coordinate at a logical index of the descriptor.
    pub fn new(desc: &TensorDescriptor, index: &[Index]) -> Self {
        Self {
            hidden: desc.adaptor().calculate_hidden_index(index),
        }
    }

    /// Linear offset of the coordinate.
    pub fn offset(&self) -> Index {
        self.hidden[0]
    }

    /// Logical index of the coordinate.
    pub fn index(&self, desc: &TensorDescriptor) -> MultiIndex {
        desc.adaptor()
            .top_ids()
            .iter()
            .map(|id| self.hidden[*id])
            .collect()
    }

    /// Index at every hidden dimension.
    pub fn hidden(&self) -> &MultiIndex {
        &self.hidden
    }

    /// Whether the offset points to real memory, i.e. no padding stage flags the position.
    pub fn is_valid(&self, desc: &TensorDescriptor) -> bool {
        desc.adaptor().is_valid_hidden_index(&self.hidden)
    }

    /// Moves the coordinate in place.
    pub fn move_by(&mut self, desc: &TensorDescriptor, step: &CoordinateStep) {
        let adaptor = desc.adaptor();
        let mut hidden_diff: SmallVec<[Index; 24]> = SmallVec::from_elem(0, self.hidden.rank());

        for (position, id) in adaptor.top_ids().iter().enumerate() {
            hidden_diff[*id] = step.top_diff[position];
            self.hidden[*id] += step.top_diff[position];
        }

        for (stage, active) in adaptor
            .stages()
            .iter()
            .zip(step.do_transforms.iter())
            .rev()
        {
            if !active {
                continue;
            }

            let upper_diff: StageIndex = stage.upper_ids.iter().map(|id| hidden_diff[*id]).collect();
            let mut lower: StageIndex = stage.lower_ids.iter().map(|id| self.hidden[*id]).collect();
            let mut lower_diff: StageIndex = SmallVec::from_elem(0, lower.len());

            stage
                .transform
                .update_lower_index(&mut lower_diff, &upper_diff, &mut lower);

            for (j, id) in stage.lower_ids.iter().enumerate() {
                hidden_diff[*id] = lower_diff[j];
                self.hidden[*id] = lower[j];
            }
        }
    }

    /// Moves the coordinate by a logical diff, building the step on the fly.
    pub fn move_by_diff(&mut self, desc: &TensorDescriptor, diff: &[Index]) {
        let step = CoordinateStep::new(desc, diff);
        self.move_by(desc, &step);
    }
}

impl CoordinateStep {
    /// Step of `top_diff` on the logical index of `desc`.
    ///
    /// A transform runs only if one of its upper dimensions can change.
    pub fn new(desc: &TensorDescriptor, top_diff: &[Index]) -> Self {
        let adaptor = desc.adaptor();
        let mut nonzero = vec![false; adaptor.num_hidden()];
        for (position, id) in adaptor.top_ids().iter().enumerate() {
            nonzero[*id] = top_diff[position] != 0;
        }

        let mut do_transforms = vec![false; adaptor.stages().len()];
        for (i, stage) in adaptor.stages().iter().enumerate().rev() {
            let active = stage.upper_ids.iter().any(|id| nonzero[*id]);
            if active {
                for id in stage.lower_ids.iter() {
                    nonzero[*id] = true;
                }
            }
            do_transforms[i] = active;
        }

        Self {
            top_diff: MultiIndex::from(top_diff),
            do_transforms,
        }
    }

    /// Logical diff of the step.
    pub fn top_diff(&self) -> &MultiIndex {
        &self.top_diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transform;
    use pretty_assertions::assert_eq;

    fn merged_descriptor() -> TensorDescriptor {
        // (4, 3, 5) packed, merged into (4*3, 5) then padded on the right.
        TensorDescriptor::packed([4, 3, 5])
            .unwrap()
            .transform(
                vec![
                    Transform::merge(vec![4, 3]).unwrap(),
                    Transform::pass_through(5).unwrap(),
                ],
                vec![vec![0, 1], vec![2]],
                vec![vec![0], vec![1]],
            )
            .unwrap()
            .transform(
                vec![
                    Transform::pass_through(12).unwrap(),
                    Transform::right_pad(5, 3).unwrap(),
                ],
                vec![vec![0], vec![1]],
                vec![vec![0], vec![1]],
            )
            .unwrap()
    }

    #[test]
    fn move_matches_recompute() {
        let desc = merged_descriptor();
        let mut coord = TensorCoordinate::new(&desc, &[2, 1]);
        for diff in [[1, 0], [4, 2], [-3, -1], [5, 4], [-7, -6]] {
            let target: Vec<Index> = coord
                .index(&desc)
                .iter()
                .zip(diff.iter())
                .map(|(a, b)| a + b)
                .collect();
            coord.move_by_diff(&desc, &diff);
            assert_eq!(coord, TensorCoordinate::new(&desc, &target));
        }
    }

    #[test]
    fn step_skips_untouched_transforms() {
        let desc = merged_descriptor();
        let step = CoordinateStep::new(&desc, &[0, 1]);
        // Embed, Merge, PassThrough(5), PassThrough(12), Pad
        assert_eq!(step.do_transforms, vec![true, false, true, false, true]);
    }

    #[test]
    fn validity_follows_padding() {
        let desc = merged_descriptor();
        let mut coord = TensorCoordinate::new(&desc, &[11, 4]);
        assert!(coord.is_valid(&desc));
        coord.move_by_diff(&desc, &[0, 1]);
        assert!(!coord.is_valid(&desc));
        assert_eq!(coord.index(&desc), MultiIndex::from([11, 5]));
    }
}

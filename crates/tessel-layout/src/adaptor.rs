use crate::{Index, LayoutError, MultiIndex, Transform, is_permutation};

/// One transform of a chain together with the hidden dimensions it reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformStage {
    /// The transform itself.
    pub transform: Transform,
    /// Hidden ids of the lower dimensions it produces.
    pub lower_ids: Vec<usize>,
    /// Hidden ids of the upper dimensions it consumes.
    pub upper_ids: Vec<usize>,
}

/// Chain of transforms from a set of top (visible) dimensions down to a set of bottom dimensions.
///
/// Every intermediate dimension gets a hidden id. Stages are stored in construction order,
/// the first stage being closest to the bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorAdaptor {
    stages: Vec<TransformStage>,
    hidden_lengths: Vec<Index>,
    bottom_ids: Vec<usize>,
    top_ids: Vec<usize>,
}

impl TensorAdaptor {
    /// Adaptor whose top dimensions are its bottom dimensions.
    pub fn identity(lengths: impl Into<MultiIndex>) -> Self {
        let lengths: MultiIndex = lengths.into();
        let ids: Vec<usize> = (0..lengths.rank()).collect();
        Self {
            stages: Vec::new(),
            hidden_lengths: lengths.into_inner(),
            bottom_ids: ids.clone(),
            top_ids: ids,
        }
    }

    pub(crate) fn from_parts(
        stages: Vec<TransformStage>,
        hidden_lengths: Vec<Index>,
        bottom_ids: Vec<usize>,
        top_ids: Vec<usize>,
    ) -> Self {
        Self {
            stages,
            hidden_lengths,
            bottom_ids,
            top_ids,
        }
    }

    /// Appends a stage of transforms on top of the current visible dimensions.
    ///
    /// `lower_dims[i]` lists the current visible dimensions consumed by `transforms[i]`, and
    /// `upper_dims[i]` the positions of the new visible dimensions it creates. Every current
    /// visible dimension must be consumed exactly once and the new positions must cover
    /// `0..new_rank` exactly once.
    pub fn transform(
        &self,
        transforms: Vec<Transform>,
        lower_dims: Vec<Vec<usize>>,
        upper_dims: Vec<Vec<usize>>,
    ) -> Result<Self, LayoutError> {
        if transforms.len() != lower_dims.len() || transforms.len() != upper_dims.len() {
            return Err(LayoutError::DimensionMapping(format!(
                "{} transforms for {} lower and {} upper dimension groups",
                transforms.len(),
                lower_dims.len(),
                upper_dims.len()
            )));
        }

        let consumed: Vec<usize> = lower_dims.iter().flatten().copied().collect();
        if !is_permutation(&consumed, self.rank()) {
            return Err(LayoutError::DimensionMapping(format!(
                "lower dimensions {consumed:?} must consume each of the {} visible dimensions once",
                self.rank()
            )));
        }
        let produced: Vec<usize> = upper_dims.iter().flatten().copied().collect();
        if !is_permutation(&produced, produced.len()) {
            return Err(LayoutError::DimensionMapping(format!(
                "upper dimensions {produced:?} must cover 0..{} once",
                produced.len()
            )));
        }

        let mut hidden_lengths = self.hidden_lengths.clone();
        let mut stages = self.stages.clone();
        let mut top_ids = vec![0; produced.len()];

        for ((transform, lower), upper) in transforms.into_iter().zip(lower_dims).zip(upper_dims) {
            if transform.num_lower() != lower.len() {
                return Err(LayoutError::Arity {
                    transform: transform.name(),
                    expected: transform.num_lower(),
                    got: lower.len(),
                });
            }
            if transform.num_upper() != upper.len() {
                return Err(LayoutError::Arity {
                    transform: transform.name(),
                    expected: transform.num_upper(),
                    got: upper.len(),
                });
            }
            if let Some(expected) = transform.lower_lengths() {
                for (j, dim) in lower.iter().enumerate() {
                    let got = self.length(*dim);
                    if expected[j] != got {
                        return Err(LayoutError::LengthMismatch {
                            transform: transform.name(),
                            dim: *dim,
                            expected: expected[j],
                            got,
                        });
                    }
                }
            }

            let lower_ids = lower.iter().map(|dim| self.top_ids[*dim]).collect();
            let upper_lengths = transform.upper_lengths();
            let mut upper_ids = Vec::with_capacity(upper.len());
            for (j, position) in upper.iter().enumerate() {
                let id = hidden_lengths.len();
                hidden_lengths.push(upper_lengths[j]);
                top_ids[*position] = id;
                upper_ids.push(id);
            }

            stages.push(TransformStage {
                transform,
                lower_ids,
                upper_ids,
            });
        }

        Ok(Self {
            stages,
            hidden_lengths,
            bottom_ids: self.bottom_ids.clone(),
            top_ids,
        })
    }

    /// Number of visible dimensions.
    pub fn rank(&self) -> usize {
        self.top_ids.len()
    }

    /// Length of a visible dimension.
    pub fn length(&self, dim: usize) -> Index {
        self.hidden_lengths[self.top_ids[dim]]
    }

    /// Lengths of every visible dimension.
    pub fn lengths(&self) -> MultiIndex {
        self.top_ids.iter().map(|id| self.hidden_lengths[*id]).collect()
    }

    /// Lengths of the bottom dimensions.
    pub fn bottom_lengths(&self) -> MultiIndex {
        self.bottom_ids
            .iter()
            .map(|id| self.hidden_lengths[*id])
            .collect()
    }

    /// Number of hidden dimensions, bottom and top included.
    pub fn num_hidden(&self) -> usize {
        self.hidden_lengths.len()
    }

    /// Stages of the chain, bottom first.
    pub fn stages(&self) -> &[TransformStage] {
        &self.stages
    }

    /// Hidden ids of the visible dimensions.
    pub fn top_ids(&self) -> &[usize] {
        &self.top_ids
    }

    /// Hidden ids of the bottom dimensions.
    pub fn bottom_ids(&self) -> &[usize] {
        &self.bottom_ids
    }

    /// Index at every hidden dimension for a visible index.
    pub fn calculate_hidden_index(&self, top: &[Index]) -> MultiIndex {
        let mut hidden = MultiIndex::zeros(self.num_hidden());
        for (position, id) in self.top_ids.iter().enumerate() {
            hidden[*id] = top[position];
        }
        for stage in self.stages.iter().rev() {
            let upper: Vec<Index> = stage.upper_ids.iter().map(|id| hidden[*id]).collect();
            let mut lower = vec![0; stage.lower_ids.len()];
            stage.transform.calculate_lower_index(&upper, &mut lower);
            for (j, id) in stage.lower_ids.iter().enumerate() {
                hidden[*id] = lower[j];
            }
        }
        hidden
    }

    /// Bottom index for a visible index.
    pub fn calculate_bottom_index(&self, top: &[Index]) -> MultiIndex {
        let hidden = self.calculate_hidden_index(top);
        self.bottom_ids.iter().map(|id| hidden[*id]).collect()
    }

    /// Whether every padding stage on the path of this hidden index maps to real data.
    pub fn is_valid_hidden_index(&self, hidden: &[Index]) -> bool {
        self.stages
            .iter()
            .filter(|stage| !stage.transform.is_always_valid())
            .all(|stage| {
                let upper: Vec<Index> = stage.upper_ids.iter().map(|id| hidden[*id]).collect();
                stage
                    .transform
                    .is_valid_upper_index_mapped_to_valid_lower_index(&upper)
            })
    }
}

/// Stacks `top` on `bottom`: the bottom dimensions of `top` are the visible dimensions of
/// `bottom`, matched by position.
pub fn chain_tensor_adaptors(
    bottom: &TensorAdaptor,
    top: &TensorAdaptor,
) -> Result<TensorAdaptor, LayoutError> {
    if top.bottom_ids.len() != bottom.rank() {
        return Err(LayoutError::DimensionMapping(format!(
            "cannot chain an adaptor with {} bottom dimensions on one with {} visible dimensions",
            top.bottom_ids.len(),
            bottom.rank()
        )));
    }
    for (position, id) in top.bottom_ids.iter().enumerate() {
        let expected = top.hidden_lengths[*id];
        let got = bottom.length(position);
        if expected != got {
            return Err(LayoutError::LengthMismatch {
                transform: "Chain",
                dim: position,
                expected,
                got,
            });
        }
    }

    let mut hidden_lengths = bottom.hidden_lengths.clone();
    let mut remap = vec![usize::MAX; top.num_hidden()];
    for (position, id) in top.bottom_ids.iter().enumerate() {
        remap[*id] = bottom.top_ids[position];
    }
    for (id, length) in top.hidden_lengths.iter().enumerate() {
        if remap[id] == usize::MAX {
            remap[id] = hidden_lengths.len();
            hidden_lengths.push(*length);
        }
    }

    let mut stages = bottom.stages.clone();
    stages.extend(top.stages.iter().map(|stage| TransformStage {
        transform: stage.transform.clone(),
        lower_ids: stage.lower_ids.iter().map(|id| remap[*id]).collect(),
        upper_ids: stage.upper_ids.iter().map(|id| remap[*id]).collect(),
    }));

    Ok(TensorAdaptor {
        stages,
        hidden_lengths,
        bottom_ids: bottom.bottom_ids.clone(),
        top_ids: top.top_ids.iter().map(|id| remap[*id]).collect(),
    })
}

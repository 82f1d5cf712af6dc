use serde::{Deserialize, Serialize};

use crate::{Index, LayoutError, MultiIndex, packed_strides};

/// Identity on a single dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassThrough {
    length: Index,
}

/// Combines several lower dimensions into one upper dimension, row-major.
///
/// `upper = Σ lower[i] * stride[i]` where `stride` are the packed strides of `lengths`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    lengths: Vec<Index>,
    strides: Vec<Index>,
}

/// Composes several upper dimensions into one lower dimension, row-major.
///
/// `lower = Σ upper[i] * stride[i]` where `stride` are the packed strides of `lengths`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unmerge {
    lengths: Vec<Index>,
    strides: Vec<Index>,
}

/// Extends a dimension with logical padding on both sides.
///
/// `lower = upper - left`, valid only when `left <= upper < left + length`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    length: Index,
    left: Index,
    right: Index,
}

/// Affine map `lower = Σ upper[i] * coefficient[i] + offset`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    lengths: Vec<Index>,
    coefficients: Vec<Index>,
    offset: Index,
}

/// A single stage of a coordinate transform chain, mapping upper indices to lower indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    /// See [PassThrough].
    PassThrough(PassThrough),
    /// See [Merge].
    Merge(Merge),
    /// See [Unmerge].
    Unmerge(Unmerge),
    /// See [Pad].
    Pad(Pad),
    /// See [Embed].
    Embed(Embed),
}

fn check_positive(transform: &'static str, lengths: &[Index]) -> Result<(), LayoutError> {
    match lengths.iter().find(|len| **len <= 0) {
        Some(length) => Err(LayoutError::NonPositiveLength {
            transform,
            length: *length,
        }),
        None => Ok(()),
    }
}

fn check_not_empty(transform: &'static str, lengths: &[Index]) -> Result<(), LayoutError> {
    if lengths.is_empty() {
        return Err(LayoutError::Arity {
            transform,
            expected: 1,
            got: 0,
        });
    }
    Ok(())
}

impl PassThrough {
    /// Identity over a dimension of `length`.
    pub fn new(length: Index) -> Result<Self, LayoutError> {
        check_positive("PassThrough", &[length])?;
        Ok(Self { length })
    }
}

impl Merge {
    /// Merge of lower dimensions with the given lengths, the first one being the slowest.
    pub fn new(lengths: Vec<Index>) -> Result<Self, LayoutError> {
        check_not_empty("Merge", &lengths)?;
        check_positive("Merge", &lengths)?;
        let strides = packed_strides(&lengths).into_inner();
        Ok(Self { lengths, strides })
    }

    fn upper_length(&self) -> Index {
        self.lengths.iter().product()
    }

    fn calculate_lower_index(&self, upper: &[Index], lower: &mut [Index]) {
        let mut rem = upper[0];
        for (i, stride) in self.strides.iter().enumerate() {
            lower[i] = rem / stride;
            rem -= lower[i] * stride;
        }
    }

    /// Decomposes the upper diff digit by digit, then runs one carry/borrow pass from the
    /// innermost dimension. Each digit diff is bounded by its radix, so one pass is enough.
    fn update_lower_index(&self, lower_diff: &mut [Index], upper_diff: &[Index], lower: &mut [Index]) {
        let mut rem = upper_diff[0];
        for (i, stride) in self.strides.iter().enumerate() {
            lower_diff[i] = rem / stride;
            rem -= lower_diff[i] * stride;
        }

        let mut carry = 0;
        for i in (0..lower.len()).rev() {
            let mut index = lower[i] + lower_diff[i] + carry;
            carry = 0;
            if i > 0 && index >= self.lengths[i] {
                index -= self.lengths[i];
                carry = 1;
            } else if i > 0 && index < 0 {
                index += self.lengths[i];
                carry = -1;
            }
            lower_diff[i] = index - lower[i];
            lower[i] = index;
        }
    }
}

impl Unmerge {
    /// Unmerge into upper dimensions with the given lengths, the first one being the slowest.
    pub fn new(lengths: Vec<Index>) -> Result<Self, LayoutError> {
        check_not_empty("Unmerge", &lengths)?;
        check_positive("Unmerge", &lengths)?;
        let strides = packed_strides(&lengths).into_inner();
        Ok(Self { lengths, strides })
    }

    fn lower_length(&self) -> Index {
        self.lengths.iter().product()
    }

    fn dot(&self, upper: &[Index]) -> Index {
        upper.iter().zip(self.strides.iter()).map(|(u, s)| u * s).sum()
    }
}

impl Pad {
    /// Pads a dimension of `length` with `left` and `right` extra logical indices.
    pub fn new(length: Index, left: Index, right: Index) -> Result<Self, LayoutError> {
        check_positive("Pad", &[length])?;
        if left < 0 || right < 0 {
            return Err(LayoutError::NonPositiveLength {
                transform: "Pad",
                length: left.min(right),
            });
        }
        Ok(Self {
            length,
            left,
            right,
        })
    }

    /// Padding only before the first element.
    pub fn left(length: Index, left: Index) -> Result<Self, LayoutError> {
        Self::new(length, left, 0)
    }

    /// Padding only after the last element.
    pub fn right(length: Index, right: Index) -> Result<Self, LayoutError> {
        Self::new(length, 0, right)
    }

    fn is_valid(&self, upper: Index) -> bool {
        upper >= self.left && upper < self.left + self.length
    }
}

impl Embed {
    /// Affine map over upper dimensions of `lengths`.
    pub fn new(
        lengths: Vec<Index>,
        coefficients: Vec<Index>,
        offset: Index,
    ) -> Result<Self, LayoutError> {
        check_not_empty("Embed", &lengths)?;
        check_positive("Embed", &lengths)?;
        if lengths.len() != coefficients.len() {
            return Err(LayoutError::Arity {
                transform: "Embed",
                expected: lengths.len(),
                got: coefficients.len(),
            });
        }
        Ok(Self {
            lengths,
            coefficients,
            offset,
        })
    }

    fn dot(&self, upper: &[Index]) -> Index {
        upper
            .iter()
            .zip(self.coefficients.iter())
            .map(|(u, c)| u * c)
            .sum()
    }

    /// Largest lower index reachable, plus one.
    pub fn lower_extent(&self) -> Index {
        let max: Index = self
            .lengths
            .iter()
            .zip(self.coefficients.iter())
            .map(|(len, coef)| (len - 1) * coef.max(&0))
            .sum();
        self.offset + max + 1
    }
}

impl Transform {
    /// Identity over a dimension of `length`.
    pub fn pass_through(length: Index) -> Result<Self, LayoutError> {
        PassThrough::new(length).map(Self::PassThrough)
    }

    /// Merge of lower dimensions of `lengths` into one.
    pub fn merge(lengths: Vec<Index>) -> Result<Self, LayoutError> {
        Merge::new(lengths).map(Self::Merge)
    }

    /// Split of one lower dimension into upper dimensions of `lengths`.
    pub fn unmerge(lengths: Vec<Index>) -> Result<Self, LayoutError> {
        Unmerge::new(lengths).map(Self::Unmerge)
    }

    /// Padding on both sides.
    pub fn pad(length: Index, left: Index, right: Index) -> Result<Self, LayoutError> {
        Pad::new(length, left, right).map(Self::Pad)
    }

    /// Padding before the first element.
    pub fn left_pad(length: Index, left: Index) -> Result<Self, LayoutError> {
        Pad::left(length, left).map(Self::Pad)
    }

    /// Padding after the last element.
    pub fn right_pad(length: Index, right: Index) -> Result<Self, LayoutError> {
        Pad::right(length, right).map(Self::Pad)
    }

    /// Affine combination of upper dimensions.
    pub fn embed(
        lengths: Vec<Index>,
        coefficients: Vec<Index>,
        offset: Index,
    ) -> Result<Self, LayoutError> {
        Embed::new(lengths, coefficients, offset).map(Self::Embed)
    }

    /// Kind name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::PassThrough(_) => "PassThrough",
            Transform::Merge(_) => "Merge",
            Transform::Unmerge(_) => "Unmerge",
            Transform::Pad(_) => "Pad",
            Transform::Embed(_) => "Embed",
        }
    }

    /// Number of lower dimensions produced.
    pub fn num_lower(&self) -> usize {
        match self {
            Transform::Merge(merge) => merge.lengths.len(),
            _ => 1,
        }
    }

    /// Number of upper dimensions consumed.
    pub fn num_upper(&self) -> usize {
        match self {
            Transform::Unmerge(unmerge) => unmerge.lengths.len(),
            Transform::Embed(embed) => embed.lengths.len(),
            _ => 1,
        }
    }

    /// Lengths of the upper dimensions.
    pub fn upper_lengths(&self) -> MultiIndex {
        match self {
            Transform::PassThrough(pass) => MultiIndex::from([pass.length]),
            Transform::Merge(merge) => MultiIndex::from([merge.upper_length()]),
            Transform::Unmerge(unmerge) => MultiIndex::from(unmerge.lengths.clone()),
            Transform::Pad(pad) => MultiIndex::from([pad.left + pad.length + pad.right]),
            Transform::Embed(embed) => MultiIndex::from(embed.lengths.clone()),
        }
    }

    /// Lengths of the lower dimensions when the transform determines them.
    ///
    /// An embed only knows its reach, not the length of the dimension it lands on.
    pub fn lower_lengths(&self) -> Option<MultiIndex> {
        match self {
            Transform::PassThrough(pass) => Some(MultiIndex::from([pass.length])),
            Transform::Merge(merge) => Some(MultiIndex::from(merge.lengths.clone())),
            Transform::Unmerge(unmerge) => Some(MultiIndex::from([unmerge.lower_length()])),
            Transform::Pad(pad) => Some(MultiIndex::from([pad.length])),
            Transform::Embed(_) => None,
        }
    }

    /// Full computation of the lower index from the upper index.
    pub fn calculate_lower_index(&self, upper: &[Index], lower: &mut [Index]) {
        match self {
            Transform::PassThrough(_) => lower[0] = upper[0],
            Transform::Merge(merge) => merge.calculate_lower_index(upper, lower),
            Transform::Unmerge(unmerge) => lower[0] = unmerge.dot(upper),
            Transform::Pad(pad) => lower[0] = upper[0] - pad.left,
            Transform::Embed(embed) => lower[0] = embed.dot(upper) + embed.offset,
        }
    }

    /// Incremental update of `lower` (in place) for an upper diff, writing the lower diff.
    ///
    /// `lower` must hold the lower index matching the upper index before the step.
    pub fn update_lower_index(
        &self,
        lower_diff: &mut [Index],
        upper_diff: &[Index],
        lower: &mut [Index],
    ) {
        match self {
            Transform::Merge(merge) => merge.update_lower_index(lower_diff, upper_diff, lower),
            Transform::PassThrough(_) | Transform::Pad(_) => {
                lower_diff[0] = upper_diff[0];
                lower[0] += upper_diff[0];
            }
            Transform::Unmerge(unmerge) => {
                lower_diff[0] = unmerge.dot(upper_diff);
                lower[0] += lower_diff[0];
            }
            Transform::Embed(embed) => {
                lower_diff[0] = embed.dot(upper_diff);
                lower[0] += lower_diff[0];
            }
        }
    }

    /// Whether every in-range upper index lands on an in-range lower index.
    pub fn is_always_valid(&self) -> bool {
        match self {
            Transform::Pad(pad) => pad.left == 0 && pad.right == 0,
            _ => true,
        }
    }

    /// Whether this upper index maps to a lower index that may be accessed in memory.
    pub fn is_valid_upper_index_mapped_to_valid_lower_index(&self, upper: &[Index]) -> bool {
        match self {
            Transform::Pad(pad) => pad.is_valid(upper[0]),
            _ => true,
        }
    }

    /// Whether the lower index is an affine function of the upper index.
    pub fn is_linear(&self) -> bool {
        !matches!(self, Transform::Merge(_))
    }
}

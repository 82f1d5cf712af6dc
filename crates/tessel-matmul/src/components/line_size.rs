use crate::components::{MatmulIdent, error::MatmulSetupError};

/// Widest vector access in bytes.
const MAX_LINE_BYTES: usize = 16;

#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
/// Line size used for each tensor in global memory accesses.
/// Represents the number of elements processed per vector load/store.
pub struct MatmulLineSizes {
    pub lhs: u8,
    pub rhs: u8,
    pub out: u8,
}

impl MatmulLineSizes {
    /// Scalar accesses everywhere.
    pub fn scalar() -> Self {
        Self {
            lhs: 1,
            rhs: 1,
            out: 1,
        }
    }

    /// Line size of the identified tensor.
    pub fn get(&self, ident: MatmulIdent) -> usize {
        match ident {
            MatmulIdent::Lhs => self.lhs as usize,
            MatmulIdent::Rhs => self.rhs as usize,
            MatmulIdent::Out => self.out as usize,
        }
    }
}

#[derive(Clone, Debug)]
/// Candidate line sizes supported for each tensor.
///
/// These lists begin with every size fitting in a vector access and are progressively
/// filtered based on problem shape divisibility and tiling constraints.
pub struct AvailableLineSizes {
    pub lhs: Vec<u8>,
    pub rhs: Vec<u8>,
    pub out: Vec<u8>,
}

impl AvailableLineSizes {
    pub fn from_type_sizes(elem_lhs: usize, elem_rhs: usize, elem_out: usize) -> Self {
        AvailableLineSizes {
            lhs: line_sizes_for(elem_lhs),
            rhs: line_sizes_for(elem_rhs),
            out: line_sizes_for(elem_out),
        }
    }

    /// Filter available line sizes considering tensor shapes and strides for Lhs
    pub fn filter_lhs_with_tensor(self, strides: &[usize], shape: &[usize], dim: usize) -> Self {
        let target = tensor_line_size_parallel(self.lhs.iter().copied(), shape, strides, dim);
        self.filter_lhs(move |x| *x == target)
    }

    /// Filter available line sizes considering tensor shapes and strides for Rhs
    pub fn filter_rhs_with_tensor(self, strides: &[usize], shape: &[usize], dim: usize) -> Self {
        let target = tensor_line_size_parallel(self.rhs.iter().copied(), shape, strides, dim);
        self.filter_rhs(move |x| *x == target)
    }

    /// Filter available line sizes considering tensor shapes and strides for output
    pub fn filter_out_with_tensor(self, strides: &[usize], shape: &[usize]) -> Self {
        let rank = strides.len();
        let target = tensor_line_size_parallel(self.out.iter().copied(), shape, strides, rank - 1);
        self.filter_out(move |x| *x == target)
    }

    /// Filter available line sizes for Lhs
    pub fn filter_lhs<F>(self, pred: F) -> Self
    where
        F: FnMut(&u8) -> bool,
    {
        Self {
            lhs: self.lhs.iter().copied().filter(pred).collect(),
            rhs: self.rhs,
            out: self.out,
        }
    }

    /// Filter available line sizes for Rhs
    pub fn filter_rhs<F>(self, pred: F) -> Self
    where
        F: FnMut(&u8) -> bool,
    {
        Self {
            lhs: self.lhs,
            rhs: self.rhs.iter().copied().filter(pred).collect(),
            out: self.out,
        }
    }

    /// Filter available line sizes for output
    pub fn filter_out<F>(self, pred: F) -> Self
    where
        F: FnMut(&u8) -> bool,
    {
        Self {
            lhs: self.lhs,
            rhs: self.rhs,
            out: self.out.iter().copied().filter(pred).collect(),
        }
    }

    /// Pick the largest remaining line size for each tensor
    pub fn pick_max(self) -> Result<MatmulLineSizes, MatmulSetupError> {
        let pick = |v: Vec<u8>, ident| {
            v.into_iter()
                .max()
                .ok_or(MatmulSetupError::LineSize(ident))
        };

        Ok(MatmulLineSizes {
            lhs: pick(self.lhs, MatmulIdent::Lhs)?,
            rhs: pick(self.rhs, MatmulIdent::Rhs)?,
            out: pick(self.out, MatmulIdent::Out)?,
        })
    }
}

fn line_sizes_for(elem_size: usize) -> Vec<u8> {
    [8u8, 4, 2, 1]
        .into_iter()
        .filter(|size| *size as usize * elem_size <= MAX_LINE_BYTES)
        .collect()
}

/// Largest line size among `supported` usable to access `dim` of a strided tensor.
///
/// The dimension must be contiguous and every line must start on a multiple of the line size,
/// otherwise only scalar accesses are possible.
pub fn tensor_line_size_parallel(
    supported: impl Iterator<Item = u8>,
    shape: &[usize],
    strides: &[usize],
    dim: usize,
) -> u8 {
    if strides[dim] != 1 {
        return 1;
    }

    supported
        .filter(|size| {
            let size = *size as usize;
            shape[dim] % size == 0
                && strides
                    .iter()
                    .enumerate()
                    .all(|(i, stride)| i == dim || stride % size == 0)
        })
        .max()
        .unwrap_or(1)
}

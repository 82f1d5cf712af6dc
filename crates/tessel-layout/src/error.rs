use core::fmt::{Debug, Display};

use crate::Index;

/// Errors raised while building transforms, adaptors or descriptors.
///
/// All of them are configuration errors: a layout that fails to build must never be used.
pub enum LayoutError {
    /// A transform received the wrong number of lengths, strides or coefficients.
    Arity {
        /// Transform kind.
        transform: &'static str,
        /// Expected count.
        expected: usize,
        /// Received count.
        got: usize,
    },
    /// A length that must be positive is zero or negative.
    NonPositiveLength {
        /// Transform kind.
        transform: &'static str,
        /// Offending length.
        length: Index,
    },
    /// The length a transform expects on its lower side differs from the length of the dim it consumes.
    LengthMismatch {
        /// Transform kind.
        transform: &'static str,
        /// Position of the consumed dimension.
        dim: usize,
        /// Length the transform declares.
        expected: Index,
        /// Length of the consumed dimension.
        got: Index,
    },
    /// Lower or upper dimension lists don't form a partition of the visible dimensions.
    DimensionMapping(String),
    /// A tensor descriptor must have a single bottom dimension.
    NotADescriptor {
        /// Number of bottom dimensions found.
        bottom_dims: usize,
    },
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LayoutError::Arity {
                transform,
                expected,
                got,
            } => write!(f, "{transform} expects {expected} entries, got {got}"),
            LayoutError::NonPositiveLength { transform, length } => {
                write!(f, "{transform} requires positive lengths, got {length}")
            }
            LayoutError::LengthMismatch {
                transform,
                dim,
                expected,
                got,
            } => write!(
                f,
                "{transform} expects length {expected} on dimension {dim}, but the dimension has length {got}"
            ),
            LayoutError::DimensionMapping(msg) => write!(f, "Invalid dimension mapping: {msg}"),
            LayoutError::NotADescriptor { bottom_dims } => write!(
                f,
                "A tensor descriptor needs exactly one bottom dimension, got {bottom_dims}"
            ),
        }
    }
}

impl Debug for LayoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}

impl core::error::Error for LayoutError {}

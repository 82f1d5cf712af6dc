use alloc::string::String;
use thiserror::Error;

/// Kernel launch errors.
///
/// A launch that returns an error must be considered failed as a whole: cubes that did run may
/// have written partial results.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// Too many resources were requested.
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// A cube panicked while executing.
    #[error("A cube panicked during launch\nCaused by:\n  {reason}")]
    KernelPanic {
        /// Panic message.
        reason: String,
    },

    /// A cube accessed shared memory without the required barrier.
    #[error("Shared memory hazard in cube {cube_pos}\nCaused by:\n  {reason}")]
    SharedMemoryHazard {
        /// Position of the faulty cube.
        cube_pos: u32,
        /// Description of the hazard.
        reason: String,
    },

    /// A buffer bound to the launch is smaller than the view it is accessed through.
    #[error("Buffer `{name}` holds {len} elements but its layout requires {required}")]
    BufferTooSmall {
        /// Name of the buffer.
        name: &'static str,
        /// Elements required by the layout.
        required: usize,
        /// Elements available.
        len: usize,
    },
}

/// Resource limit errors.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    /// Shared memory exceeds maximum.
    #[error(
        "Too much shared memory requested.\nRequested {requested} bytes, maximum {max} bytes available."
    )]
    SharedMemory {
        /// Value requested.
        requested: usize,
        /// Maximum value.
        max: usize,
    },
    /// Total units exceeds maximum.
    #[error("Total unit count exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    Units {
        /// Requested value.
        requested: u32,
        /// Maximum value.
        max: u32,
    },
    /// `CubeDim` exceeds maximum.
    #[error("Cube dim exceeds maximum bounds.\nRequested {requested:?}, max is {max:?}.")]
    CubeDim {
        /// Requested value.
        requested: (u32, u32, u32),
        /// Maximum value.
        max: (u32, u32, u32),
    },
    /// Total cubes exceeds maximum.
    #[error("Cube count exceeds maximum.\nRequested {requested} cubes, max is {max}.")]
    CubeCount {
        /// Requested value.
        requested: u64,
        /// Maximum value.
        max: u32,
    },
}

impl core::fmt::Debug for LaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for ResourceLimitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

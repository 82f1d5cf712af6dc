use std::fmt::{Debug, Display};

use tessel_layout::LayoutError;
use tessel_runtime::{CubeDim, LaunchError};

use crate::components::MatmulIdent;

/// Errors that can occur during the setup phase of a matmul operation.
pub enum MatmulSetupError {
    /// A required hardware or runtime resource is not available.
    Unavailable(MatmulAvailabilityError),

    /// The provided configuration is invalid or rejected by a component.
    InvalidConfig(InvalidConfigError),

    /// The problem shape can't be solved with the given configuration.
    InvalidProblem(InvalidConfigError),

    /// No compatible line size could be found for the given constraints.
    LineSize(MatmulIdent),

    /// A tensor layout could not be built.
    Layout(LayoutError),
}

/// A resource required by the matmul exceeds what the device provides.
pub enum MatmulAvailabilityError {
    /// The requested cube count exceeds what the device supports.
    CubeCountTooBig {
        /// Cubes requested.
        requested: u64,
        /// Cubes supported.
        max: u32,
    },

    /// The requested cube dimensions are too large for the device.
    CubeDimTooBig(CubeDim),

    /// The double-buffered stages don't fit in shared memory.
    SharedMemoryTooBig {
        /// Bytes requested.
        requested: usize,
        /// Bytes available.
        max: usize,
    },
}

/// Errors that can occur while launching a matmul.
pub enum MatmulLaunchError {
    /// The matmul could not be set up.
    Setup(MatmulSetupError),

    /// The runtime failed to execute the kernel.
    Launch(LaunchError),
}

impl From<MatmulAvailabilityError> for MatmulSetupError {
    fn from(value: MatmulAvailabilityError) -> Self {
        Self::Unavailable(value)
    }
}

impl From<InvalidConfigError> for MatmulSetupError {
    fn from(value: InvalidConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<LayoutError> for MatmulSetupError {
    fn from(value: LayoutError) -> Self {
        Self::Layout(value)
    }
}

impl From<MatmulSetupError> for MatmulLaunchError {
    fn from(value: MatmulSetupError) -> Self {
        Self::Setup(value)
    }
}

impl From<MatmulAvailabilityError> for MatmulLaunchError {
    fn from(value: MatmulAvailabilityError) -> Self {
        Self::Setup(value.into())
    }
}

impl From<LayoutError> for MatmulLaunchError {
    fn from(value: LayoutError) -> Self {
        Self::Setup(value.into())
    }
}

impl From<LaunchError> for MatmulLaunchError {
    fn from(value: LaunchError) -> Self {
        Self::Launch(value)
    }
}

impl Display for MatmulSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for MatmulSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatmulSetupError::Unavailable(err) => {
                writeln!(
                    f,
                    "Unable to launch matmul because a required resource is unavailable: {err:?}"
                )
            }
            MatmulSetupError::InvalidConfig(err) => {
                writeln!(
                    f,
                    "Unable to launch matmul because the config is invalid: {:?}",
                    err.to_string()
                )
            }
            MatmulSetupError::InvalidProblem(err) => {
                writeln!(
                    f,
                    "Unable to launch matmul because the problem is not supported: {:?}",
                    err.to_string()
                )
            }
            MatmulSetupError::LineSize(ident) => {
                writeln!(
                    f,
                    "Unable to launch matmul because could not find supported line size for {ident:?}"
                )
            }
            MatmulSetupError::Layout(err) => {
                writeln!(
                    f,
                    "Unable to launch matmul because a layout could not be built: {err}"
                )
            }
        }
    }
}

impl Debug for MatmulAvailabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatmulAvailabilityError::CubeCountTooBig { requested, max } => {
                writeln!(f, "Cube count too big: {requested} requested, {max} supported")
            }
            MatmulAvailabilityError::CubeDimTooBig(dim) => {
                writeln!(f, "Cube dim too big {dim:?}")
            }
            MatmulAvailabilityError::SharedMemoryTooBig { requested, max } => {
                writeln!(
                    f,
                    "Shared memory too big: {requested} bytes requested, {max} bytes available"
                )
            }
        }
    }
}

impl Display for MatmulLaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for MatmulLaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatmulLaunchError::Setup(err) => write!(f, "{err:?}"),
            MatmulLaunchError::Launch(err) => {
                writeln!(f, "Matmul kernel failed during execution: {err}")
            }
        }
    }
}

impl std::error::Error for MatmulSetupError {}
impl std::error::Error for MatmulLaunchError {}

/// Message of a rejected configuration.
pub trait ConfigError: Display + Debug + Send + Sync {}

impl<T: Display + Debug + Send + Sync> ConfigError for T {}

/// Error that arises from invalid configurations
pub type InvalidConfigError = Box<dyn ConfigError>;

/// Error that arises from invalid configurations, formatted lazily.
pub struct FormattedConfigError {
    func: Box<dyn Fn() -> String + Send + Sync>,
}

impl FormattedConfigError {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<F: Fn() -> String + Send + Sync + 'static>(func: F) -> InvalidConfigError {
        Box::new(Self {
            func: Box::new(func),
        })
    }
}

impl Display for FormattedConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = (self.func)();
        write!(f, "{string}")
    }
}

impl Debug for FormattedConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", (self.func)())
    }
}

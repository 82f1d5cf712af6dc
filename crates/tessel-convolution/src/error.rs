use std::fmt::{Debug, Display};

use tessel_layout::LayoutError;
use tessel_matmul::components::{InvalidConfigError, MatmulLaunchError, MatmulSetupError};
use tessel_runtime::LaunchError;

/// Errors that can occur while mapping a convolution onto a matmul.
pub enum ConvSetupError {
    /// The underlying matmul could not be set up.
    Matmul(MatmulSetupError),

    /// The convolution itself is malformed.
    InvalidProblem(InvalidConfigError),
}

/// Errors that can occur while launching a convolution.
pub enum ConvLaunchError {
    /// The convolution could not be set up.
    Setup(ConvSetupError),

    /// The runtime failed to execute the kernel.
    Launch(LaunchError),
}

impl From<MatmulSetupError> for ConvSetupError {
    fn from(value: MatmulSetupError) -> Self {
        Self::Matmul(value)
    }
}

impl From<LayoutError> for ConvSetupError {
    fn from(value: LayoutError) -> Self {
        Self::Matmul(value.into())
    }
}

impl From<ConvSetupError> for ConvLaunchError {
    fn from(value: ConvSetupError) -> Self {
        Self::Setup(value)
    }
}

impl From<MatmulSetupError> for ConvLaunchError {
    fn from(value: MatmulSetupError) -> Self {
        Self::Setup(value.into())
    }
}

impl From<MatmulLaunchError> for ConvLaunchError {
    fn from(value: MatmulLaunchError) -> Self {
        match value {
            MatmulLaunchError::Setup(err) => Self::Setup(err.into()),
            MatmulLaunchError::Launch(err) => Self::Launch(err),
        }
    }
}

impl Display for ConvSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for ConvSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvSetupError::Matmul(err) => write!(f, "{err:?}"),
            ConvSetupError::InvalidProblem(err) => {
                writeln!(
                    f,
                    "Unable to launch convolution because the problem is invalid: {:?}",
                    err.to_string()
                )
            }
        }
    }
}

impl Display for ConvLaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for ConvLaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvLaunchError::Setup(err) => write!(f, "{err:?}"),
            ConvLaunchError::Launch(err) => {
                writeln!(f, "Convolution kernel failed during execution: {err}")
            }
        }
    }
}

impl std::error::Error for ConvSetupError {}
impl std::error::Error for ConvLaunchError {}

use super::logger::{LogLevel, LoggerConfig};

/// Configuration for kernel launch logging.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LaunchConfig {
    /// Logger configuration for launches.
    #[serde(default)]
    pub logger: LoggerConfig<LaunchLogLevel>,
}

/// Log levels for kernel launches.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LaunchLogLevel {
    /// Launch logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// Logs the kernel name, cube count and cube dim of every launch.
    #[serde(rename = "basic")]
    Basic,

    /// Also logs how cubes were split across workers and the launch duration.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for LaunchLogLevel {}

use super::{GlobalConfig, launch::LaunchLogLevel};
use alloc::{string::ToString, sync::Arc, vec::Vec};
use core::fmt::Display;
use hashbrown::HashMap;

#[cfg(feature = "std")]
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Configuration for logging in Tessel, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    #[cfg(feature = "std")]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            #[cfg(feature = "std")]
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Logging utility for kernel launches, fanning messages out to every configured sink.
#[derive(Debug)]
pub struct Logger {
    loggers: Vec<LoggerKind>,
    launch_index: Vec<usize>,

    /// Global configuration for logging settings.
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new `Logger` instance based on the global configuration.
    pub fn new() -> Self {
        Self::with_config(GlobalConfig::get())
    }

    /// Creates a new `Logger` from an explicit configuration.
    pub fn with_config(config: Arc<GlobalConfig>) -> Self {
        let mut loggers = Vec::new();
        let mut launch_index = Vec::new();

        #[derive(Hash, PartialEq, Eq)]
        enum LoggerId {
            #[cfg(feature = "std")]
            File(PathBuf),
            #[cfg(feature = "std")]
            Stdout,
            #[cfg(feature = "std")]
            Stderr,
            LogCrate(LogCrateLevel),
        }

        let mut logger2index = HashMap::<LoggerId, usize>::new();
        let mut register = |id: LoggerId, make: &dyn Fn() -> LoggerKind| {
            let index = *logger2index.entry(id).or_insert_with(|| {
                loggers.push(make());
                loggers.len() - 1
            });
            launch_index.push(index);
        };

        let settings = &config.launch.logger;
        if settings.level != LaunchLogLevel::Disabled {
            #[cfg(feature = "std")]
            if let Some(file) = &settings.file {
                let append = settings.append;
                register(LoggerId::File(file.clone()), &|| {
                    match FileLogger::new(file, append) {
                        Some(logger) => LoggerKind::File(logger),
                        None => LoggerKind::Log(LogCrateLevel::Info),
                    }
                });
            }

            #[cfg(feature = "std")]
            if settings.stdout {
                register(LoggerId::Stdout, &|| LoggerKind::Stdout);
            }

            #[cfg(feature = "std")]
            if settings.stderr {
                register(LoggerId::Stderr, &|| LoggerKind::Stderr);
            }

            if let Some(level) = settings.log {
                register(LoggerId::LogCrate(level), &|| LoggerKind::Log(level));
            }
        }

        Self {
            loggers,
            launch_index,
            config,
        }
    }

    /// Logs a launch message, directing it to all configured launch loggers.
    pub fn log_launch<S: Display>(&mut self, msg: &S) {
        match self.launch_index.len() {
            0 => {}
            1 => {
                let index = self.launch_index[0];
                self.loggers[index].log(msg);
            }
            _ => {
                let msg = msg.to_string();
                for i in 0..self.launch_index.len() {
                    let index = self.launch_index[i];
                    self.loggers[index].log(&msg);
                }
            }
        }
    }

    /// Returns the current launch log level from the global configuration.
    pub fn log_level_launch(&self) -> LaunchLogLevel {
        self.config.launch.logger.level
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    #[cfg(feature = "std")]
    File(FileLogger),

    /// Logs to standard output.
    #[cfg(feature = "std")]
    Stdout,

    /// Logs to standard error.
    #[cfg(feature = "std")]
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            #[cfg(feature = "std")]
            LoggerKind::File(file_logger) => file_logger.log(msg),
            #[cfg(feature = "std")]
            LoggerKind::Stdout => println!("{msg}"),
            #[cfg(feature = "std")]
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
#[cfg(feature = "std")]
struct FileLogger {
    writer: BufWriter<File>,
}

#[cfg(feature = "std")]
impl FileLogger {
    fn new(path: &PathBuf, append: bool) -> Option<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path);

        match file {
            Ok(file) => Some(Self {
                writer: BufWriter::new(file),
            }),
            Err(err) => {
                log::warn!("Can't open log file {}: {err}", path.display());
                None
            }
        }
    }

    fn log<S: Display>(&mut self, msg: &S) {
        if let Err(err) = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush()) {
            log::warn!("Can't write to the launch log file: {err}");
        }
    }
}

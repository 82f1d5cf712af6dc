use super::{execution::ExecutionConfig, launch::LaunchConfig};
use alloc::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static TESSEL_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Represents the global configuration for Tessel, combining execution and launch settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration of the cube scheduler.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Configuration for kernel launch logging.
    #[serde(default)]
    pub launch: LaunchConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `tessel.toml` or `Tessel.toml` in
    /// the current directory or its parents. If no file is found, a default configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function takes a global lock. Clients read it once at creation.
    pub fn get() -> Arc<Self> {
        let mut state = TESSEL_GLOBAL_CONFIG.lock();
        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "std")] {
                        let config = Self::from_current_dir().override_from_env();
                    } else {
                        let config = Self::default();
                    }
                }
                let config = Arc::new(config);
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Save the current configuration to the provided file path.
    #[cfg(feature = "std")]
    pub fn save_default<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<()> {
        use std::io::Write;

        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`.
    pub fn set(config: Self) {
        let mut state = TESSEL_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    #[cfg(feature = "std")]
    pub fn override_from_env(mut self) -> Self {
        use super::launch::LaunchLogLevel;

        if let Ok(val) = std::env::var("TESSEL_DEBUG_LOG") {
            self.launch.logger.level = LaunchLogLevel::Full;

            match val.as_str() {
                "stdout" => self.launch.logger.stdout = true,
                "stderr" => self.launch.logger.stderr = true,
                "1" | "true" => self.launch.logger.file = Some("/tmp/tessel.log".into()),
                "0" | "false" => self.launch.logger.level = LaunchLogLevel::Disabled,
                file_path => self.launch.logger.file = Some(file_path.into()),
            }
        }

        if let Ok(val) = std::env::var("TESSEL_NUM_WORKERS") {
            match val.parse::<usize>() {
                Ok(workers) => self.execution.num_workers = Some(workers),
                Err(err) => log::warn!("Ignoring TESSEL_NUM_WORKERS={val}: {err}"),
            }
        }

        if let Ok(val) = std::env::var("TESSEL_CHECK_HAZARDS") {
            self.execution.check_hazards = !matches!(val.as_str(), "0" | "false");
        }

        self
    }

    /// Parses a configuration from toml content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    // Loads configuration from `tessel.toml` or `Tessel.toml` in the current directory or its parents.
    //
    // Traverses up the directory tree until a valid configuration file is found or the root is reached.
    // Returns a default configuration if no file is found.
    #[cfg(feature = "std")]
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            for name in ["tessel.toml", "Tessel.toml"] {
                if let Some(config) = Self::from_file_path(dir.join(name)) {
                    return config;
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    // Loads configuration from a specified file path, ignoring files with an invalid format.
    #[cfg(feature = "std")]
    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> Option<Self> {
        let content = std::fs::read_to_string(&path).ok()?;
        match Self::from_toml(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!(
                    "The file {} doesn't have the right format => {err}",
                    path.as_ref().display()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::launch::LaunchLogLevel;

    #[test]
    fn parses_partial_toml() {
        let config = GlobalConfig::from_toml(
            r#"
            [execution]
            num_workers = 3

            [launch.logger]
            level = "basic"
            stderr = true
            "#,
        )
        .unwrap();

        assert_eq!(config.execution.num_workers, Some(3));
        assert!(config.execution.check_hazards);
        assert_eq!(config.launch.logger.level, LaunchLogLevel::Basic);
        assert!(config.launch.logger.stderr);
        assert!(!config.launch.logger.stdout);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = GlobalConfig::from_toml("").unwrap();
        assert_eq!(config.execution.num_workers, None);
        assert_eq!(config.launch.logger.level, LaunchLogLevel::Disabled);
    }
}

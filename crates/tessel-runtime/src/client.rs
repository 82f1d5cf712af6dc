use alloc::sync::Arc;

use crate::{
    CubeCount, CubeDim, CubeKernel, HardwareProperties, LaunchError,
    config::{GlobalConfig, Logger, launch::LaunchLogLevel},
    scheduler::Scheduler,
    validate_cube_count, validate_cube_dim, validate_units,
};

/// Entry point to launch kernels on the SIMT runtime.
///
/// Cloning a client is cheap, clones share the same logger.
#[derive(Clone)]
pub struct ComputeClient {
    properties: Arc<HardwareProperties>,
    scheduler: Scheduler,
    logger: Arc<spin::Mutex<Logger>>,
}

impl core::fmt::Debug for ComputeClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeClient")
            .field("properties", &self.properties)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for ComputeClient {
    fn default() -> Self {
        Self::new(HardwareProperties::default())
    }
}

impl ComputeClient {
    /// Client using the global configuration.
    pub fn new(properties: HardwareProperties) -> Self {
        Self::with_config(properties, GlobalConfig::get())
    }

    /// Client using an explicit configuration.
    pub fn with_config(properties: HardwareProperties, config: Arc<GlobalConfig>) -> Self {
        let scheduler = Scheduler::new(
            config.execution.resolved_num_workers(),
            config.execution.check_hazards,
        );
        Self {
            properties: Arc::new(properties),
            scheduler,
            logger: Arc::new(spin::Mutex::new(Logger::with_config(config))),
        }
    }

    /// Limits of the device.
    pub fn properties(&self) -> &HardwareProperties {
        &self.properties
    }

    /// Launches `kernel` over a grid of `cube_count` cubes of `cube_dim` units.
    ///
    /// Returns once every cube has run. Any failing cube fails the whole launch.
    pub fn launch<K: CubeKernel>(
        &self,
        kernel: &K,
        cube_count: CubeCount,
        cube_dim: CubeDim,
    ) -> Result<(), LaunchError> {
        validate_cube_dim(&self.properties, cube_dim)?;
        validate_units(&self.properties, cube_dim)?;
        validate_cube_count(&self.properties, cube_count)?;

        let level = {
            let mut logger = self.logger.lock();
            let level = logger.log_level_launch();
            if level != LaunchLogLevel::Disabled {
                logger.log_launch(&format_args!(
                    "[Launch] {} cube_count={:?} cube_dim={:?}",
                    kernel.name(),
                    cube_count,
                    cube_dim
                ));
            }
            level
        };
        log::debug!(
            "Launching {} over {} cubes of {} units",
            kernel.name(),
            cube_count.num_cubes(),
            cube_dim.num_elems()
        );

        let start = std::time::Instant::now();
        let result = self.scheduler.dispatch(kernel, cube_count, cube_dim);

        if level == LaunchLogLevel::Full {
            let mut logger = self.logger.lock();
            logger.log_launch(&format_args!(
                "[Launch] {} workers={} elapsed={:?} status={}",
                kernel.name(),
                self.scheduler.chunks(cube_count.num_cubes()).len(),
                start.elapsed(),
                if result.is_ok() { "ok" } else { "failed" }
            ));
        }

        result
    }
}

use crate::CubeDim;

/// Limits of the device kernels are launched on.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HardwareProperties {
    /// Maximum number of units in a single cube.
    pub max_units_per_cube: u32,
    /// Maximum extent of a cube along each axis.
    pub max_cube_dim: CubeDim,
    /// Maximum number of cubes in a launch.
    pub max_cube_count: u32,
    /// Shared memory available to a single cube, in bytes.
    pub max_shared_memory_size: usize,
    /// Number of units executing in lockstep.
    pub plane_size: u32,
}

impl Default for HardwareProperties {
    fn default() -> Self {
        Self {
            max_units_per_cube: 1024,
            max_cube_dim: CubeDim::new(1024, 1024, 64),
            max_cube_count: i32::MAX as u32,
            max_shared_memory_size: 64 * 1024,
            plane_size: 64,
        }
    }
}

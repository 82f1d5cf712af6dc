use crate::{CubeCount, CubeDim, HardwareProperties, LaunchError, ResourceLimitError};

/// Validate the cube dim of a kernel fits within the hardware limits.
pub fn validate_cube_dim(
    properties: &HardwareProperties,
    cube_dim: CubeDim,
) -> Result<(), LaunchError> {
    if !properties.max_cube_dim.can_contain(cube_dim) {
        Err(ResourceLimitError::CubeDim {
            requested: cube_dim.into(),
            max: properties.max_cube_dim.into(),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Validate the total units of a kernel fits within the hardware limits.
pub fn validate_units(properties: &HardwareProperties, cube_dim: CubeDim) -> Result<(), LaunchError> {
    let requested = cube_dim.num_elems();
    let max = properties.max_units_per_cube;
    if requested > max {
        Err(ResourceLimitError::Units { requested, max }.into())
    } else {
        Ok(())
    }
}

/// Validate the number of cubes of a launch fits within the hardware limits.
pub fn validate_cube_count(
    properties: &HardwareProperties,
    cube_count: CubeCount,
) -> Result<(), LaunchError> {
    let requested = cube_count.x as u64 * cube_count.y as u64 * cube_count.z as u64;
    let max = properties.max_cube_count;
    if requested > max as u64 {
        Err(ResourceLimitError::CubeCount { requested, max }.into())
    } else {
        Ok(())
    }
}

/// Validate the shared memory used by one cube fits within the hardware limits.
pub fn validate_shared_memory(
    properties: &HardwareProperties,
    requested: usize,
) -> Result<(), LaunchError> {
    let max = properties.max_shared_memory_size;
    if requested > max {
        Err(ResourceLimitError::SharedMemory { requested, max }.into())
    } else {
        Ok(())
    }
}

/// Validate a buffer holds at least the elements its layout can address.
pub fn validate_buffer_len(name: &'static str, len: usize, required: usize) -> Result<(), LaunchError> {
    if len < required {
        Err(LaunchError::BufferTooSmall {
            name,
            required,
            len,
        })
    } else {
        Ok(())
    }
}

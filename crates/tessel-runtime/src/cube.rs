use alloc::{rc::Rc, string::String};
use core::cell::{Cell, RefCell};
use core::ops::Range;

use tessel_common::Numeric;

use crate::SharedMemory;

/// Number of units in a cube along each axis.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CubeDim {
    /// Units along x.
    pub x: u32,
    /// Units along y.
    pub y: u32,
    /// Units along z.
    pub z: u32,
}

impl CubeDim {
    /// Cube with `x` units laid out along a single axis.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Total number of units.
    pub const fn num_elems(&self) -> u32 {
        self.x * self.y * self.z
    }

    /// Whether `other` fits within this cube dim along every axis.
    pub const fn can_contain(&self, other: CubeDim) -> bool {
        self.x >= other.x && self.y >= other.y && self.z >= other.z
    }
}

impl From<CubeDim> for (u32, u32, u32) {
    fn from(value: CubeDim) -> Self {
        (value.x, value.y, value.z)
    }
}

/// Number of cubes in a launch along each axis.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CubeCount {
    /// Cubes along x.
    pub x: u32,
    /// Cubes along y.
    pub y: u32,
    /// Cubes along z.
    pub z: u32,
}

impl CubeCount {
    /// Launch of `x` cubes along a single axis.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Total number of cubes.
    pub const fn num_cubes(&self) -> u32 {
        self.x * self.y * self.z
    }
}

pub(crate) struct CubeState {
    pub(crate) phase: Cell<u32>,
    pub(crate) check_hazards: bool,
    hazard: RefCell<Option<String>>,
}

impl CubeState {
    pub(crate) fn report_hazard(&self, message: impl FnOnce() -> String) {
        let mut hazard = self.hazard.borrow_mut();
        if hazard.is_none() {
            *hazard = Some(message());
        }
    }
}

/// Execution context of a single cube.
///
/// Units of the cube advance in phases: every access issued between two calls to
/// [sync_cube](Cube::sync_cube) belongs to the same phase and may be executed in any unit order.
/// The barrier is a cube-level operation, so it is always reached by every unit.
pub struct Cube {
    /// Linear position of the cube in the launch grid.
    pub cube_pos: u32,
    /// Total number of cubes in the launch.
    pub cube_count: u32,
    /// Units of the cube.
    pub cube_dim: CubeDim,
    state: Rc<CubeState>,
}

impl Cube {
    /// New cube context, usually created by the scheduler.
    pub fn new(cube_pos: u32, cube_count: u32, cube_dim: CubeDim, check_hazards: bool) -> Self {
        Self {
            cube_pos,
            cube_count,
            cube_dim,
            state: Rc::new(CubeState {
                phase: Cell::new(0),
                check_hazards,
                hazard: RefCell::new(None),
            }),
        }
    }

    /// Number of units in the cube.
    pub fn num_units(&self) -> u32 {
        self.cube_dim.num_elems()
    }

    /// Linear positions of every unit in the cube.
    pub fn units(&self) -> Range<u32> {
        0..self.num_units()
    }

    /// Current phase, incremented by each barrier.
    pub fn phase(&self) -> u32 {
        self.state.phase.get()
    }

    /// Barrier across every unit of the cube.
    ///
    /// Shared memory writes issued before the barrier are visible to reads issued after it.
    pub fn sync_cube(&self) {
        self.state.phase.set(self.state.phase.get() + 1);
    }

    /// Allocates zero-initialized shared memory of `len` elements for this cube.
    pub fn shared_memory<E: Numeric>(&self, len: usize) -> SharedMemory<E> {
        SharedMemory::new(len, self.state.clone())
    }

    /// First shared memory hazard detected in this cube, if any.
    pub fn take_hazard(&self) -> Option<String> {
        self.state.hazard.borrow_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_and_counts() {
        let dim = CubeDim::new(8, 4, 2);
        assert_eq!(dim.num_elems(), 64);
        assert!(CubeDim::new(1024, 1024, 64).can_contain(dim));
        assert!(!CubeDim::new_1d(32).can_contain(dim));
        assert_eq!(CubeCount::new(2, 3, 1).num_cubes(), 6);
    }

    #[test]
    fn barrier_advances_phase() {
        let cube = Cube::new(0, 1, CubeDim::new_1d(4), true);
        assert_eq!(cube.phase(), 0);
        cube.sync_cube();
        cube.sync_cube();
        assert_eq!(cube.phase(), 2);
        assert_eq!(cube.units().len(), 4);
    }
}

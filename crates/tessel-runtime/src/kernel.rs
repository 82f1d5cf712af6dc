use alloc::string::{String, ToString};

use crate::Cube;

/// Work executed once per cube of a launch.
///
/// A kernel is shared by every worker thread, so any state mutated during execution must be
/// cube-local or atomic.
pub trait CubeKernel: Sync {
    /// Name of the kernel, used in launch logs.
    fn name(&self) -> String {
        let name = core::any::type_name::<Self>();
        let before_generic = name.split('<').next().unwrap_or(name);
        before_generic
            .rsplit("::")
            .next()
            .unwrap_or(before_generic)
            .to_string()
    }

    /// Executes every unit of one cube.
    fn execute(&self, cube: &Cube);
}

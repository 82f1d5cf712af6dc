use alloc::{format, string::String, vec::Vec};
use core::ops::Range;

use crate::{Cube, CubeCount, CubeDim, CubeKernel, LaunchError};

/// Splits the cubes of a launch across worker threads.
///
/// Each worker receives a contiguous range of cube positions and runs them one after the other,
/// so the cubes of a launch are executed in no particular global order.
#[derive(new, Debug, Clone)]
pub(crate) struct Scheduler {
    num_workers: usize,
    check_hazards: bool,
}

impl Scheduler {
    pub(crate) fn chunks(&self, num_cubes: u32) -> Vec<Range<u32>> {
        if num_cubes == 0 {
            return Vec::new();
        }
        let chunk = num_cubes.div_ceil(self.num_workers.max(1) as u32);
        (0..num_cubes)
            .step_by(chunk as usize)
            .map(|start| start..(start + chunk).min(num_cubes))
            .collect()
    }

    pub(crate) fn dispatch<K: CubeKernel>(
        &self,
        kernel: &K,
        cube_count: CubeCount,
        cube_dim: CubeDim,
    ) -> Result<(), LaunchError> {
        let num_cubes = cube_count.num_cubes();
        let chunks = self.chunks(num_cubes);
        let check_hazards = self.check_hazards;

        std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .enumerate()
                .map(|(worker_id, range)| {
                    scope.spawn(move || {
                        log::trace!("Worker {worker_id} running cubes {range:?}");
                        for cube_pos in range {
                            let cube = Cube::new(cube_pos, num_cubes, cube_dim, check_hazards);
                            kernel.execute(&cube);
                            if let Some(reason) = cube.take_hazard() {
                                return Err(LaunchError::SharedMemoryHazard { cube_pos, reason });
                            }
                        }
                        log::trace!("Worker {worker_id} done");
                        Ok(())
                    })
                })
                .collect();

            let mut result = Ok(());
            for handle in handles {
                let outcome = match handle.join() {
                    Ok(outcome) => outcome,
                    Err(payload) => Err(LaunchError::KernelPanic {
                        reason: panic_message(payload.as_ref()),
                    }),
                };
                if result.is_ok() {
                    result = outcome;
                }
            }
            result
        })
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        String::from(*msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        format!("{payload:?}")
    }
}

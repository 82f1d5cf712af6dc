use std::sync::Arc;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tessel_runtime::{
    ComputeClient, Cube, CubeCount, CubeDim, CubeKernel, GlobalOutput, HardwareProperties,
    LaunchError, ReadBuffer, ResourceLimitError, WriteBuffer, WriteMode, config::GlobalConfig,
};

fn client(num_workers: usize) -> ComputeClient {
    let mut config = GlobalConfig::default();
    config.execution.num_workers = Some(num_workers);
    ComputeClient::with_config(HardwareProperties::default(), Arc::new(config))
}

struct IotaKernel<'a> {
    out: &'a GlobalOutput<i32>,
}

impl CubeKernel for IotaKernel<'_> {
    fn execute(&self, cube: &Cube) {
        for unit in cube.units() {
            let index = cube.cube_pos * cube.num_units() + unit;
            self.out
                .write_line(index as usize, true, &[index as i32], WriteMode::Set);
        }
    }
}

struct CountKernel<'a> {
    out: &'a GlobalOutput<i32>,
}

impl CubeKernel for CountKernel<'_> {
    fn execute(&self, cube: &Cube) {
        for _ in cube.units() {
            self.out.write_line(0, true, &[1], WriteMode::AtomicAdd);
        }
    }
}

/// Every unit writes its id to shared memory, then reads its neighbour's.
struct RotateKernel<'a> {
    out: &'a GlobalOutput<i32>,
    barrier: bool,
}

impl CubeKernel for RotateKernel<'_> {
    fn execute(&self, cube: &Cube) {
        let units = cube.num_units() as usize;
        let smem = cube.shared_memory::<i32>(units);
        for unit in cube.units() {
            smem.write_line(unit as usize, true, &[unit as i32], WriteMode::Set);
        }
        if self.barrier {
            cube.sync_cube();
        }
        for unit in cube.units() {
            let mut value = [0];
            smem.read_line((unit as usize + 1) % units, true, &mut value);
            let index = cube.cube_pos as usize * units + unit as usize;
            self.out.write_line(index, true, &value, WriteMode::Set);
        }
    }
}

struct PanicKernel;

impl CubeKernel for PanicKernel {
    fn execute(&self, cube: &Cube) {
        if cube.cube_pos == 3 {
            panic!("cube 3 failed");
        }
    }
}

#[test]
fn every_cube_and_unit_runs_once() {
    let out = GlobalOutput::<i32>::zeros(10 * 16);
    client(4)
        .launch(&IotaKernel { out: &out }, CubeCount::new_1d(10), CubeDim::new_1d(16))
        .unwrap();
    assert_eq!(out.to_vec(), (0..160).collect::<Vec<i32>>());
}

#[test]
fn atomic_add_across_workers() {
    let out = GlobalOutput::<i32>::zeros(1);
    client(8)
        .launch(&CountKernel { out: &out }, CubeCount::new(4, 4, 2), CubeDim::new_1d(32))
        .unwrap();
    assert_eq!(out.to_vec(), vec![32 * 32]);
}

#[test]
fn barrier_makes_shared_writes_visible() {
    let out = GlobalOutput::<i32>::zeros(2 * 8);
    let kernel = RotateKernel {
        out: &out,
        barrier: true,
    };
    client(2)
        .launch(&kernel, CubeCount::new_1d(2), CubeDim::new_1d(8))
        .unwrap();
    let expected: Vec<i32> = (0..2).flat_map(|_| (0..8).map(|u| (u + 1) % 8)).collect();
    assert_eq!(out.to_vec(), expected);
}

#[test]
fn missing_barrier_fails_the_launch() {
    let out = GlobalOutput::<i32>::zeros(8);
    let kernel = RotateKernel {
        out: &out,
        barrier: false,
    };
    let result = client(1).launch(&kernel, CubeCount::new_1d(1), CubeDim::new_1d(8));
    assert!(matches!(
        result,
        Err(LaunchError::SharedMemoryHazard { cube_pos: 0, .. })
    ));
}

#[test]
fn panicking_cube_fails_the_launch() {
    let result = client(2).launch(&PanicKernel, CubeCount::new_1d(8), CubeDim::new_1d(4));
    match result {
        Err(LaunchError::KernelPanic { reason }) => assert_eq!(reason, "cube 3 failed"),
        other => panic!("Expected a kernel panic, got {other:?}"),
    }
}

#[test]
fn oversized_cube_is_rejected() {
    let result = client(1).launch(&PanicKernel, CubeCount::new_1d(1), CubeDim::new(64, 32, 1));
    assert_eq!(
        result,
        Err(LaunchError::TooManyResources(ResourceLimitError::Units {
            requested: 2048,
            max: 1024
        }))
    );
}

#[test]
#[serial]
fn global_config_is_loaded_once() {
    let first = GlobalConfig::get();
    let second = GlobalConfig::get();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn kernel_name_drops_module_path() {
    let out = GlobalOutput::<i32>::zeros(1);
    assert_eq!(IotaKernel { out: &out }.name(), "IotaKernel");
    assert_eq!(out.len(), 1);
}

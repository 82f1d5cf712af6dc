/// Configuration of the cube scheduler.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ExecutionConfig {
    /// Number of worker threads running cubes, defaults to the available parallelism.
    #[serde(default)]
    pub num_workers: Option<usize>,

    /// Whether shared memory accesses are checked for missing barriers.
    #[serde(default = "check_hazards_default")]
    pub check_hazards: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            check_hazards: true,
        }
    }
}

fn check_hazards_default() -> bool {
    true
}

impl ExecutionConfig {
    /// Number of workers to spawn, never zero.
    pub fn resolved_num_workers(&self) -> usize {
        match self.num_workers {
            Some(workers) => workers.max(1),
            None => std::thread::available_parallelism()
                .map(|workers| workers.get())
                .unwrap_or(1),
        }
    }
}

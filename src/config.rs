use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::{SimError, SimResult};

/// Capacities and latencies of the modelled machine, fixed for the lifetime
/// of a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    // the number of reorder buffer slots; must be a power of two since tags
    // are slot indices compared modulo this capacity
    pub rob_slots: usize,
    // the number of reservation station slots
    pub rs_slots: usize,
    // the number of load/store buffer slots
    pub lsb_slots: usize,
    // ticks between a load request and its response
    pub mem_latency: u64,
    // record every commit (retired pc + register write) in the run stats
    pub record_commits: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            rob_slots: 16,
            rs_slots: 8,
            lsb_slots: 8,
            mem_latency: 2,
            record_commits: false,
        }
    }
}

impl CpuConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.rob_slots == 0 || !self.rob_slots.is_power_of_two() {
            return Err(SimError::Config(format!(
                "rob_slots must be a non-zero power of two, got {}",
                self.rob_slots
            )));
        }
        if self.rs_slots == 0 || self.lsb_slots == 0 {
            return Err(SimError::Config(
                "rs_slots and lsb_slots must be non-zero".to_string(),
            ));
        }
        if self.mem_latency == 0 {
            return Err(SimError::Config(
                "mem_latency must be at least one tick".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_cpu_config<P: AsRef<Path>>(path: P) -> SimResult<CpuConfig> {
    let file = File::open(path.as_ref())
        .map_err(|e| SimError::FileRead(path.as_ref().to_path_buf(), e))?;
    let config: CpuConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

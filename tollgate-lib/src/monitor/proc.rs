use std::fs;
use std::path::PathBuf;

use super::memory::{MemorySample, MemorySource, MonitorError};

const STATUS_PATH: &str = "/proc/self/status";
const MEMINFO_PATH: &str = "/proc/meminfo";
const CGROUP_MAX_PATH: &str = "/sys/fs/cgroup/memory.max";

/// Reads resident memory of this process from procfs.
///
/// The limit is the cgroup v2 `memory.max` when one is set, otherwise the
/// machine's `MemTotal`.
pub struct ProcMemorySource {
    status_path: PathBuf,
    meminfo_path: PathBuf,
    cgroup_max_path: PathBuf,
}

impl Default for ProcMemorySource {
    fn default() -> Self {
        Self::with_paths(STATUS_PATH, MEMINFO_PATH, CGROUP_MAX_PATH)
    }
}

impl ProcMemorySource {
    pub fn with_paths(
        status_path: impl Into<PathBuf>,
        meminfo_path: impl Into<PathBuf>,
        cgroup_max_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            status_path: status_path.into(),
            meminfo_path: meminfo_path.into(),
            cgroup_max_path: cgroup_max_path.into(),
        }
    }

    fn cgroup_limit(&self) -> Option<u64> {
        // "max" means unlimited; a missing file means no cgroup v2
        let raw = fs::read_to_string(&self.cgroup_max_path).ok()?;
        raw.trim().parse::<u64>().ok().filter(|limit| *limit > 0)
    }
}

impl MemorySource for ProcMemorySource {
    fn sample(&self) -> Result<MemorySample, MonitorError> {
        let used_bytes = read_kib_field(&self.status_path, "VmRSS:")?.saturating_mul(1024);
        let total_bytes = match self.cgroup_limit() {
            Some(limit) => limit,
            None => read_kib_field(&self.meminfo_path, "MemTotal:")?.saturating_mul(1024),
        };
        Ok(MemorySample { used_bytes, total_bytes })
    }
}

/// Parse a `Field:   1234 kB` line
fn read_kib_field(path: &PathBuf, field: &'static str) -> Result<u64, MonitorError> {
    let content = fs::read_to_string(path)
        .map_err(|source| MonitorError::Read { path: path.display().to_string(), source })?;

    let line = content
        .lines()
        .find(|line| line.starts_with(field))
        .ok_or_else(|| MonitorError::MissingField { path: path.display().to_string(), field })?;

    let value = line.split_whitespace().nth(1).unwrap_or_default();
    value.parse::<u64>().map_err(|_| MonitorError::Parse { field, value: value.to_string() })
}

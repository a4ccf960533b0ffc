//! Process memory sampling and the "under pressure" signal.

pub mod memory;
pub mod proc;

pub use memory::{MemoryMonitor, MemorySample, MemorySource, MemoryStatus, MonitorError};
pub use proc::ProcMemorySource;

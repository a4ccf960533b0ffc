//! Concurrency bound in front of the handler pipeline.

pub mod queue;

pub use queue::{AdmissionPermit, AdmissionQueue, CapacityExceeded, QueueStats};

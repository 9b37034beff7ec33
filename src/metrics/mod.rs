//! Metric sampling and delta computation.
//!
//! Each collector reads one kernel text source, keeps the previous and the
//! current sample, derives rates or percentages from the pair and hands the
//! result to its own [`Saver`](crate::output::Saver).

pub mod cpu;
pub mod memory;
pub mod network;
pub mod process;
pub mod source;
pub mod traits;

// Re-export commonly used items
pub use cpu::{CpuCollector, CpuSample};
pub use memory::{MemoryCollector, MemorySample};
pub use network::{NetworkCollector, NetworkSample};
pub use process::{ProcessCollector, ProcessDescriptor, ProcessSample};
pub use source::ProcFs;
pub use traits::Metric;

use crate::config::{MetricKind, MonitorConfig};
use crate::error::Result;

/// Instantiate the collector for one metric kind.
pub fn create_collector(kind: MetricKind, config: &MonitorConfig) -> Result<Box<dyn Metric>> {
    Ok(match kind {
        MetricKind::Cpu => Box::new(CpuCollector::new(config)?),
        MetricKind::Mem => Box::new(MemoryCollector::new(config)?),
        MetricKind::Net => Box::new(NetworkCollector::new(config)?),
        MetricKind::Proc => Box::new(ProcessCollector::new(config)?),
    })
}

//! # proc_monitor - procfs metric sampler
//!
//! Periodically samples the kernel's CPU, memory, network and process
//! counters from `/proc`, derives rates and percentages between consecutive
//! samples and appends them to one output file per metric, as CSV lines or
//! as a JSON array that stays valid after every write.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proc_monitor::{Monitor, MonitorConfig, OutputMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::new("data", OutputMode::Json);
//!     let mut monitor = Monitor::new(config)?;
//!
//!     for _ in 0..3 {
//!         print!("{}", monitor.tick()?);
//!         std::thread::sleep(std::time::Duration::from_secs(1));
//!     }
//!     monitor.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod output;

// Re-export public API
pub use config::{MetricKind, MonitorConfig, OutputMode};
pub use error::{Result, SystemError};
pub use metrics::{
    cpu::CpuCollector, memory::MemoryCollector, network::NetworkCollector,
    process::ProcessCollector, Metric, ProcFs,
};
pub use monitor::Monitor;
pub use output::{Encode, Saver};

/// The default delay between two ticks in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// The default directory receiving output files
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Where the proc filesystem is mounted on a live system
pub const DEFAULT_PROC_ROOT: &str = "/proc";

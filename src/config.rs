//! Monitoring configuration.
//!
//! A single [`MonitorConfig`] value is built once at startup and handed to
//! every collector. Mode and metric names are validated here so nothing
//! downstream ever sees an unknown string.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Serialization format for the per-metric output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One comma-separated line per tick
    Csv,
    /// One JSON array holding an object per tick
    Json,
}

impl OutputMode {
    /// File extension used for this mode.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputMode::Csv => "csv",
            OutputMode::Json => "json",
        }
    }
}

impl FromStr for OutputMode {
    type Err = SystemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputMode::Csv),
            "json" => Ok(OutputMode::Json),
            other => Err(SystemError::config_error(format!(
                "unknown output mode '{}', expected csv or json",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Metric families that can be monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Mem,
    Net,
    Proc,
}

impl MetricKind {
    /// Every metric, in the default monitoring order.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Mem,
        MetricKind::Net,
        MetricKind::Proc,
    ];

    /// Name used on the command line and as the output file stem.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Mem => "mem",
            MetricKind::Net => "net",
            MetricKind::Proc => "proc",
        }
    }

    /// Parse a comma-separated selection such as `cpu,net`.
    ///
    /// An empty selection means every metric. Duplicates are rejected.
    pub fn parse_list(list: &str) -> Result<Vec<MetricKind>> {
        if list.trim().is_empty() {
            return Ok(Self::ALL.to_vec());
        }

        let mut kinds = Vec::new();
        for field in list.split(',') {
            let kind: MetricKind = field.parse()?;
            if kinds.contains(&kind) {
                return Err(SystemError::config_error(format!(
                    "metric '{}' selected more than once",
                    kind
                )));
            }
            kinds.push(kind);
        }

        Ok(kinds)
    }
}

impl FromStr for MetricKind {
    type Err = SystemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cpu" => Ok(MetricKind::Cpu),
            "mem" => Ok(MetricKind::Mem),
            "net" => Ok(MetricKind::Net),
            "proc" => Ok(MetricKind::Proc),
            other => Err(SystemError::config_error(format!(
                "unsupported metric '{}', expected one of cpu, mem, net, proc",
                other
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration shared by the monitoring loop and every collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory receiving one output file per metric
    pub output_dir: PathBuf,
    /// Serialization format of the output files
    pub mode: OutputMode,
    /// Delay between two ticks in milliseconds
    pub interval_ms: u64,
    /// Total run time in seconds, `None` to run until interrupted
    pub duration_secs: Option<u64>,
    /// Metrics to collect, in rendering order
    pub metrics: Vec<MetricKind>,
    /// Mount point of the proc filesystem
    pub proc_root: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(crate::DEFAULT_OUTPUT_DIR),
            mode: OutputMode::Csv,
            interval_ms: crate::DEFAULT_INTERVAL_MS,
            duration_secs: None,
            metrics: MetricKind::ALL.to_vec(),
            proc_root: PathBuf::from(crate::DEFAULT_PROC_ROOT),
        }
    }
}

impl MonitorConfig {
    /// Create a configuration writing into `output_dir` with the given mode.
    pub fn new(output_dir: impl Into<PathBuf>, mode: OutputMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            mode,
            ..Default::default()
        }
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the serialization mode.
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the tick interval in milliseconds.
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the optional total duration in seconds.
    pub fn with_duration_secs(mut self, duration_secs: Option<u64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Set the selected metrics.
    pub fn with_metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the proc filesystem root.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Path of the output file for one metric.
    pub fn output_path(&self, kind: MetricKind) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", kind.name(), self.mode.extension()))
    }

    /// Root of the proc filesystem.
    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Check the values that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SystemError::config_error("interval must be greater than zero"));
        }
        if self.metrics.is_empty() {
            return Err(SystemError::config_error("at least one metric must be selected"));
        }
        for (i, kind) in self.metrics.iter().enumerate() {
            if self.metrics[..i].contains(kind) {
                return Err(SystemError::config_error(format!(
                    "metric '{}' selected more than once",
                    kind
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!("CSV".parse::<OutputMode>().unwrap(), OutputMode::Csv);
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Json);

        let err = "html".parse::<OutputMode>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_metric_list_parsing() {
        let kinds = MetricKind::parse_list("cpu,net").unwrap();
        assert_eq!(kinds, vec![MetricKind::Cpu, MetricKind::Net]);

        assert_eq!(MetricKind::parse_list("").unwrap(), MetricKind::ALL.to_vec());
        assert!(MetricKind::parse_list("cpu,disk").is_err());
        assert!(MetricKind::parse_list("mem,mem").is_err());
    }

    #[test]
    fn test_output_path() {
        let config = MonitorConfig::new("/tmp/out", OutputMode::Json);
        assert_eq!(
            config.output_path(MetricKind::Mem),
            PathBuf::from("/tmp/out/mem.json")
        );
    }

    #[test]
    fn test_validate() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());

        let config = MonitorConfig::default().with_interval_ms(0);
        assert!(config.validate().unwrap_err().is_config());

        let config = MonitorConfig::default().with_metrics(Vec::new());
        assert!(config.validate().is_err());

        let config =
            MonitorConfig::default().with_metrics(vec![MetricKind::Cpu, MetricKind::Cpu]);
        assert!(config.validate().is_err());
    }
}

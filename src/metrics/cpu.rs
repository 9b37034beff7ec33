//! CPU load collection from the scheduler statistics file.
//!
//! Each `cpu` line of `/proc/stat` carries cumulative jiffie counters. Load
//! is derived from two consecutive samples:
//! `active = user + nice + system`, `total = active + idle`,
//! `load = 100 * Δactive / Δtotal`.

use crate::config::{MetricKind, MonitorConfig};
use crate::error::{Result, SystemError};
use crate::metrics::source::ProcFs;
use crate::metrics::traits::Metric;
use crate::output::{Encode, Saver};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Number of jiffie columns kept per cpu line.
pub const CPU_COLUMNS: usize = 10;

/// Fewest columns a cpu line may carry (user, nice, system, idle).
const MIN_CPU_COLUMNS: usize = 4;

/// Cumulative jiffies: user, nice, system, idle, iowait, irq, softirq,
/// steal, guest, guest_nice.
pub type CoreTimes = [u64; CPU_COLUMNS];

/// One parsed read of `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSample {
    /// Index 0 is the aggregate line, then one entry per core
    pub cores: Vec<CoreTimes>,
    /// Context switches since boot
    pub ctxt: u64,
    /// Boot time, seconds since the epoch
    pub boot_time: i64,
    /// Forks since boot
    pub processes: u64,
    pub procs_running: u64,
    pub procs_blocked: u64,
}

impl CpuSample {
    /// Parse the content of `/proc/stat`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut sample = CpuSample::default();

        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let Some(key) = fields.next() else {
                continue;
            };

            match key {
                "ctxt" => sample.ctxt = parse_scalar(key, fields)?,
                "btime" => sample.boot_time = parse_scalar(key, fields)?,
                "processes" => sample.processes = parse_scalar(key, fields)?,
                "procs_running" => sample.procs_running = parse_scalar(key, fields)?,
                "procs_blocked" => sample.procs_blocked = parse_scalar(key, fields)?,
                _ if key.starts_with("cpu") => {
                    let is_aggregate = key == "cpu";
                    if !is_aggregate && !key[3..].chars().all(|c| c.is_ascii_digit()) {
                        return Err(SystemError::parse_error(format!(
                            "unexpected cpu line label '{}'",
                            key
                        )));
                    }
                    if is_aggregate != sample.cores.is_empty() {
                        return Err(SystemError::parse_error(format!(
                            "'{}' line out of order, the aggregate cpu line must come first",
                            key
                        )));
                    }
                    sample.cores.push(parse_core_times(key, fields)?);
                }
                _ => {}
            }
        }

        if sample.cores.is_empty() {
            return Err(SystemError::parse_error("no cpu line found in stat file"));
        }

        Ok(sample)
    }

    /// Number of physical cores (aggregate line excluded).
    pub fn core_count(&self) -> usize {
        self.cores.len().saturating_sub(1)
    }
}

fn parse_core_times<'a>(key: &str, fields: impl Iterator<Item = &'a str>) -> Result<CoreTimes> {
    let mut times = [0u64; CPU_COLUMNS];
    let mut count = 0;

    for field in fields {
        if count == CPU_COLUMNS {
            return Err(SystemError::parse_error(format!(
                "'{}' has more than {} columns",
                key, CPU_COLUMNS
            )));
        }
        times[count] = field.parse().map_err(|e| {
            SystemError::parse_error(format!("'{}' column {}: {}", key, count + 1, e))
        })?;
        count += 1;
    }

    if count < MIN_CPU_COLUMNS {
        return Err(SystemError::parse_error(format!(
            "'{}' has {} columns, expected at least {}",
            key, count, MIN_CPU_COLUMNS
        )));
    }

    Ok(times)
}

fn parse_scalar<'a, T>(key: &str, mut fields: impl Iterator<Item = &'a str>) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let value = fields
        .next()
        .ok_or_else(|| SystemError::parse_error(format!("'{}' has no value", key)))?;
    if fields.next().is_some() {
        return Err(SystemError::parse_error(format!(
            "'{}' has more than one value",
            key
        )));
    }
    value
        .parse()
        .map_err(|e| SystemError::parse_error(format!("'{}': {}", key, e)))
}

fn active(times: &CoreTimes) -> u128 {
    times[..3].iter().map(|&t| u128::from(t)).sum()
}

fn total(times: &CoreTimes) -> u128 {
    active(times) + u128::from(times[3])
}

/// Whether any counter used by [`cpu_load`] went backwards.
pub fn counters_reset(first: &CoreTimes, second: &CoreTimes) -> bool {
    active(second) < active(first) || total(second) < total(first)
}

/// Load percentage between two samples of the same cpu line.
///
/// Returns 0.0 when no time elapsed or when a counter went backwards.
pub fn cpu_load(first: &CoreTimes, second: &CoreTimes) -> f64 {
    if counters_reset(first, second) {
        return 0.0;
    }

    let active_delta = active(second) - active(first);
    let total_delta = total(second) - total(first);
    if total_delta == 0 {
        return 0.0;
    }

    (100.0 * active_delta as f64 / total_delta as f64)
        .abs()
        .min(100.0)
}

/// Values persisted on every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuView {
    /// Number of physical cores
    pub number: usize,
    /// Context switches since boot
    pub context: u64,
    pub processes: u64,
    #[serde(rename = "procs-running")]
    pub procs_running: u64,
    #[serde(rename = "procs-blocked")]
    pub procs_blocked: u64,
    /// Aggregate load percentage
    pub load: f64,
    /// Per-core load percentages
    pub loads: Vec<f64>,
}

impl Encode for CpuView {
    fn encode_csv(&self) -> String {
        let mut row = format!("{:.2}", self.load);
        for load in &self.loads {
            row.push_str(&format!(",{:.2}", load));
        }
        row
    }

    fn encode_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// CPU collector.
#[derive(Debug)]
pub struct CpuCollector {
    source: ProcFs,
    saver: Saver,
    current: CpuSample,
    previous: CpuSample,
    view: CpuView,
}

impl CpuCollector {
    /// Create the collector and its output file.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let saver = Saver::create(config.output_path(MetricKind::Cpu), config.mode)?;
        Ok(Self::with_saver(ProcFs::new(config.proc_root()), saver))
    }

    /// Build a collector around an existing source and saver.
    pub fn with_saver(source: ProcFs, saver: Saver) -> Self {
        Self {
            source,
            saver,
            current: CpuSample::default(),
            previous: CpuSample::default(),
            view: CpuView::default(),
        }
    }

    /// Rotate samples and recompute loads from a freshly parsed sample.
    pub fn push_sample(&mut self, sample: CpuSample) {
        self.previous = std::mem::replace(&mut self.current, sample);
        self.compute_loads();
    }

    fn compute_loads(&mut self) {
        let zero = [0u64; CPU_COLUMNS];
        let loads: Vec<f64> = self
            .current
            .cores
            .iter()
            .enumerate()
            .map(|(i, second)| {
                let first = self.previous.cores.get(i).unwrap_or(&zero);
                if counters_reset(first, second) {
                    warn!("cpu line {} counters went backwards, reporting 0 load", i);
                }
                cpu_load(first, second)
            })
            .collect();

        self.view = CpuView {
            number: self.current.core_count(),
            context: self.current.ctxt,
            processes: self.current.processes,
            procs_running: self.current.procs_running,
            procs_blocked: self.current.procs_blocked,
            load: loads.first().copied().unwrap_or(0.0),
            loads: loads.into_iter().skip(1).collect(),
        };
    }

    /// Aggregate load percentage.
    pub fn load_average(&self) -> f64 {
        self.view.load
    }

    /// Per-core load percentages.
    pub fn loads(&self) -> &[f64] {
        &self.view.loads
    }

    pub fn view(&self) -> &CpuView {
        &self.view
    }

    pub fn current(&self) -> &CpuSample {
        &self.current
    }

    pub fn previous(&self) -> &CpuSample {
        &self.previous
    }
}

impl Metric for CpuCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    fn update(&mut self) -> Result<()> {
        let content = self.source.read(&self.source.stat_path())?;
        let sample = CpuSample::parse(&content)?;
        debug!("Parsed cpu sample with {} cores", sample.core_count());
        self.push_sample(sample);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.saver.save(&self.view)
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn close(&mut self) -> Result<()> {
        self.saver.close()
    }
}

impl fmt::Display for CpuCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t========== CPU ==========\n")?;
        writeln!(f, "CPU:\t\t{:.2} %", self.view.load)?;
        for (i, load) in self.view.loads.iter().enumerate() {
            writeln!(f, "CPU{}:\t\t{:.2} %", i, load)?;
        }

        let boot = chrono::DateTime::from_timestamp(self.current.boot_time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        writeln!(
            f,
            "\nCtxt:\t\t{} ({:+})",
            self.current.ctxt,
            self.current.ctxt as i128 - self.previous.ctxt as i128
        )?;
        writeln!(f, "BootTime:\t{} ({})", self.current.boot_time, boot)?;
        writeln!(f, "Processes:\t{}", self.current.processes)?;
        writeln!(f, "ProcsBlocked:\t{}", self.current.procs_blocked)?;
        write!(f, "ProcsRunning:\t{}", self.current.procs_running)
    }
}

//! Memory collection from the kernel memory statistics file.

use crate::config::{MetricKind, MonitorConfig};
use crate::error::{Result, SystemError};
use crate::metrics::source::ProcFs;
use crate::metrics::traits::Metric;
use crate::output::{Encode, Saver};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// One parsed read of `/proc/meminfo`, all values in kB.
///
/// Keys missing from the file (older kernels) stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    #[serde(rename = "total")]
    pub mem_total: u64,
    #[serde(rename = "free")]
    pub mem_free: u64,
    #[serde(rename = "occupied")]
    pub mem_occupied: u64,
    #[serde(rename = "available")]
    pub mem_available: u64,
    #[serde(rename = "swap-total")]
    pub swap_total: u64,
    #[serde(rename = "swap-free")]
    pub swap_free: u64,
    #[serde(rename = "swap-occupied")]
    pub swap_occupied: u64,
    #[serde(rename = "vm-allocated-total")]
    pub vmalloc_total: u64,
    #[serde(rename = "vm-allocated-free")]
    pub vmalloc_free: u64,
    #[serde(rename = "vm-allocated-occupied")]
    pub vmalloc_occupied: u64,
}

impl MemorySample {
    /// Parse the content of `/proc/meminfo`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut sample = MemorySample::default();

        for line in content.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };

            let slot = match key.trim() {
                "MemTotal" => &mut sample.mem_total,
                "MemFree" => &mut sample.mem_free,
                "MemAvailable" => &mut sample.mem_available,
                "SwapTotal" => &mut sample.swap_total,
                "SwapFree" => &mut sample.swap_free,
                "VmallocTotal" => &mut sample.vmalloc_total,
                "VmallocUsed" => &mut sample.vmalloc_occupied,
                _ => continue,
            };
            *slot = parse_kilobytes(key, rest)?;
        }

        sample.mem_occupied = sample.mem_total.saturating_sub(sample.mem_free);
        sample.swap_occupied = sample.swap_total.saturating_sub(sample.swap_free);
        sample.vmalloc_free = sample.vmalloc_total.saturating_sub(sample.vmalloc_occupied);

        Ok(sample)
    }

    pub fn percent_mem_occupied(&self) -> f64 {
        percent(self.mem_occupied, self.mem_total)
    }

    pub fn percent_mem_free(&self) -> f64 {
        100.0 - self.percent_mem_occupied()
    }

    pub fn percent_swap_occupied(&self) -> f64 {
        percent(self.swap_occupied, self.swap_total)
    }

    pub fn percent_swap_free(&self) -> f64 {
        100.0 - self.percent_swap_occupied()
    }

    pub fn percent_vmalloc_occupied(&self) -> f64 {
        percent(self.vmalloc_occupied, self.vmalloc_total)
    }

    pub fn percent_vmalloc_free(&self) -> f64 {
        100.0 - self.percent_vmalloc_occupied()
    }
}

fn parse_kilobytes(key: &str, rest: &str) -> Result<u64> {
    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| SystemError::parse_error(format!("'{}' has no value", key)))?;
    let value = value
        .parse()
        .map_err(|e| SystemError::parse_error(format!("'{}': {}", key, e)))?;

    match (fields.next(), fields.next()) {
        (Some("kB"), None) | (None, None) => Ok(value),
        _ => Err(SystemError::parse_error(format!(
            "'{}' is not of the form '<int> kB'",
            key
        ))),
    }
}

/// Share of `part` in `total`, 0.0 when the total is zero.
fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

impl Encode for MemorySample {
    fn encode_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.mem_total,
            self.mem_free,
            self.mem_occupied,
            self.mem_available,
            self.swap_total,
            self.swap_free,
            self.swap_occupied,
            self.vmalloc_total,
            self.vmalloc_free,
            self.vmalloc_occupied
        )
    }

    fn encode_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A signed kB quantity shown with a human unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kilobytes(pub i64);

impl Kilobytes {
    fn delta(current: u64, previous: u64) -> Self {
        let delta = i128::from(current) - i128::from(previous);
        Kilobytes(delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

impl From<u64> for Kilobytes {
    fn from(value: u64) -> Self {
        Kilobytes(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Kilobytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kb = self.0 as f64;
        if kb.abs() < 100_000.0 {
            write!(f, "{} kB", self.0)
        } else if kb.abs() < 100_000_000.0 {
            write!(f, "{:.3} MB", kb / 1_000.0)
        } else {
            write!(f, "{:.3} GB", kb / 1_000_000.0)
        }
    }
}

/// Memory collector.
#[derive(Debug)]
pub struct MemoryCollector {
    source: ProcFs,
    saver: Saver,
    current: MemorySample,
    previous: MemorySample,
}

impl MemoryCollector {
    /// Create the collector and its output file.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let saver = Saver::create(config.output_path(MetricKind::Mem), config.mode)?;
        Ok(Self::with_saver(ProcFs::new(config.proc_root()), saver))
    }

    /// Build a collector around an existing source and saver.
    pub fn with_saver(source: ProcFs, saver: Saver) -> Self {
        Self {
            source,
            saver,
            current: MemorySample::default(),
            previous: MemorySample::default(),
        }
    }

    pub fn push_sample(&mut self, sample: MemorySample) {
        self.previous = std::mem::replace(&mut self.current, sample);
    }

    pub fn current(&self) -> &MemorySample {
        &self.current
    }

    pub fn previous(&self) -> &MemorySample {
        &self.previous
    }
}

impl Metric for MemoryCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Mem
    }

    fn update(&mut self) -> Result<()> {
        let content = self.source.read(&self.source.meminfo_path())?;
        let sample = MemorySample::parse(&content)?;
        debug!("Parsed memory sample, {} kB total", sample.mem_total);
        self.push_sample(sample);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.saver.save(&self.current)
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn close(&mut self) -> Result<()> {
        self.saver.close()
    }
}

impl fmt::Display for MemoryCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = &self.current;
        let prev = &self.previous;

        writeln!(f, "\t========== MEMORY ==========\n")?;
        writeln!(f, "MemTotal:\t {}", Kilobytes::from(cur.mem_total))?;
        writeln!(
            f,
            "MemFree:\t {}\t{:.3} %\t({})",
            Kilobytes::from(cur.mem_free),
            cur.percent_mem_free(),
            Kilobytes::delta(cur.mem_free, prev.mem_free)
        )?;
        writeln!(
            f,
            "MemOccupied:\t {}\t{:.3} %\t({})",
            Kilobytes::from(cur.mem_occupied),
            cur.percent_mem_occupied(),
            Kilobytes::delta(cur.mem_occupied, prev.mem_occupied)
        )?;
        writeln!(
            f,
            "MemAvailable:\t {}\t\t\t({})",
            Kilobytes::from(cur.mem_available),
            Kilobytes::delta(cur.mem_available, prev.mem_available)
        )?;
        writeln!(f, "SwapTotal:\t {}", Kilobytes::from(cur.swap_total))?;
        writeln!(
            f,
            "SwapFree:\t {}\t{:.3} %\t({})",
            Kilobytes::from(cur.swap_free),
            cur.percent_swap_free(),
            Kilobytes::delta(cur.swap_free, prev.swap_free)
        )?;
        writeln!(
            f,
            "SwapOccupied:\t {}\t{:.3} %\t({})",
            Kilobytes::from(cur.swap_occupied),
            cur.percent_swap_occupied(),
            Kilobytes::delta(cur.swap_occupied, prev.swap_occupied)
        )?;
        writeln!(f, "VmallocTotal:\t {}", Kilobytes::from(cur.vmalloc_total))?;
        writeln!(
            f,
            "VmallocFree:\t {}\t{:.3} %\t({})",
            Kilobytes::from(cur.vmalloc_free),
            cur.percent_vmalloc_free(),
            Kilobytes::delta(cur.vmalloc_free, prev.vmalloc_free)
        )?;
        write!(
            f,
            "VmallocOccupied: {}\t{:.3} %\t({})",
            Kilobytes::from(cur.vmalloc_occupied),
            cur.percent_vmalloc_occupied(),
            Kilobytes::delta(cur.vmalloc_occupied, prev.vmalloc_occupied)
        )
    }
}

//! Process table collection from `/proc/<pid>/stat`.

use crate::config::{MetricKind, MonitorConfig};
use crate::error::{Result, SystemError};
use crate::metrics::source::ProcFs;
use crate::metrics::traits::Metric;
use crate::output::{Encode, Saver};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use tracing::debug;

/// "No such process", returned when reading the stat of an exiting pid.
const ESRCH: i32 = 3;

/// Processes listed by the rendering, by ascending pid.
const RENDERED_PROCESSES: usize = 20;

/// One process as described by its stat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDescriptor {
    pub pid: u32,
    pub ppid: u32,
    pub pgrp: u32,
    pub nice: i32,
    pub num_threads: u64,
    pub name: String,
    pub state: String,
    pub utime: u64,
    pub stime: u64,
}

impl ProcessDescriptor {
    /// Parse a `/proc/<pid>/stat` line.
    ///
    /// The name sits between the first `(` and the last `)`, so names
    /// containing spaces or parentheses still parse. Remaining fields are
    /// read at their proc(5) positions.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (open, close) = match (line.find('('), line.rfind(')')) {
            (Some(open), Some(close)) if open < close => (open, close),
            _ => {
                return Err(SystemError::parse_error(format!(
                    "stat line without a parenthesised name: '{}'",
                    line
                )))
            }
        };

        let pid: u32 = parse_field("pid", line[..open].trim())?;
        let name = line[open + 1..close].to_string();

        // Token 2 of the stat line is the first entry here.
        let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();
        if rest.len() < 18 {
            return Err(SystemError::parse_error(format!(
                "stat line of pid {} has {} fields, expected at least 20",
                pid,
                rest.len() + 2
            )));
        }

        Ok(Self {
            pid,
            name,
            state: rest[0].to_string(),
            ppid: parse_field("ppid", rest[1])?,
            pgrp: parse_field("pgrp", rest[2])?,
            utime: parse_field("utime", rest[11])?,
            stime: parse_field("stime", rest[12])?,
            nice: parse_field("nice", rest[16])?,
            num_threads: parse_field("num_threads", rest[17])?,
        })
    }

    /// Whether the process is currently running.
    pub fn is_running(&self) -> bool {
        self.state == "R"
    }
}

fn parse_field<T>(field: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| SystemError::parse_error(format!("stat field '{}' ({}): {}", field, value, e)))
}

/// The process table at one instant, sorted by ascending pid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSample {
    pub processes: Vec<ProcessDescriptor>,
}

impl ProcessSample {
    /// Scan every numeric directory under the proc root.
    ///
    /// Processes that exit during the scan are skipped.
    pub fn read(source: &ProcFs) -> Result<Self> {
        let mut processes = Vec::new();

        for entry in fs::read_dir(source.root())? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str() else {
                continue;
            };
            if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let content = match fs::read_to_string(source.pid_stat_path(pid)) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(ESRCH) => {
                    debug!("Process {} exited during the scan", pid);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if content.trim().is_empty() {
                continue;
            }

            processes.push(ProcessDescriptor::parse(&content)?);
        }

        processes.sort_by_key(|p| p.pid);
        Ok(Self { processes })
    }

    pub fn running(&self) -> usize {
        self.processes.iter().filter(|p| p.is_running()).count()
    }

    pub fn threads(&self) -> u64 {
        self.processes.iter().map(|p| p.num_threads).sum()
    }
}

#[derive(Serialize)]
struct ProcessSummary<'a> {
    total: usize,
    running: usize,
    threads: u64,
    processes: &'a [ProcessDescriptor],
}

impl Encode for ProcessSample {
    fn encode_csv(&self) -> String {
        format!("{},{},{}", self.processes.len(), self.running(), self.threads())
    }

    fn encode_json(&self) -> Result<String> {
        let summary = ProcessSummary {
            total: self.processes.len(),
            running: self.running(),
            threads: self.threads(),
            processes: &self.processes,
        };
        Ok(serde_json::to_string(&summary)?)
    }
}

/// Process table collector.
#[derive(Debug)]
pub struct ProcessCollector {
    source: ProcFs,
    saver: Saver,
    current: ProcessSample,
    previous: ProcessSample,
}

impl ProcessCollector {
    /// Create the collector and its output file.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let saver = Saver::create(config.output_path(MetricKind::Proc), config.mode)?;
        Ok(Self::with_saver(ProcFs::new(config.proc_root()), saver))
    }

    /// Build a collector around an existing source and saver.
    pub fn with_saver(source: ProcFs, saver: Saver) -> Self {
        Self {
            source,
            saver,
            current: ProcessSample::default(),
            previous: ProcessSample::default(),
        }
    }

    pub fn push_sample(&mut self, sample: ProcessSample) {
        self.previous = std::mem::replace(&mut self.current, sample);
    }

    pub fn processes(&self) -> &[ProcessDescriptor] {
        &self.current.processes
    }
}

impl Metric for ProcessCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Proc
    }

    fn update(&mut self) -> Result<()> {
        let sample = ProcessSample::read(&self.source)?;
        debug!("Scanned {} processes", sample.processes.len());
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

impl fmt::Display for ProcessCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.current.processes.len();
        writeln!(f, "\t========== PROCESSES ==========\n")?;
        writeln!(
            f,
            "Total: {} ({:+})\tRunning: {}\tThreads: {}\n",
            total,
            total as i64 - self.previous.processes.len() as i64,
            self.current.running(),
            self.current.threads()
        )?;

        for p in self
            .current
            .processes
            .iter()
            .take(RENDERED_PROCESSES)
            .filter(|p| p.is_running())
        {
            writeln!(
                f,
                "{}\t{}\t{}\tppid={} pgrp={} nice={} threads={} utime={} stime={}",
                p.pid, p.name, p.state, p.ppid, p.pgrp, p.nice, p.num_threads, p.utime, p.stime
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_line(pid: u32, name: &str, state: &str) -> String {
        format!(
            "{pid} ({name}) {state} 1 {pid} {pid} 0 -1 4194560 100 0 0 0 42 17 0 0 20 -5 3 0 1000 1000000 200 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0"
        )
    }

    #[test]
    fn test_parse_stat_line() {
        let p = ProcessDescriptor::parse(&stat_line(1234, "bash", "S")).unwrap();
        assert_eq!(p.pid, 1234);
        assert_eq!(p.name, "bash");
        assert_eq!(p.state, "S");
        assert_eq!(p.ppid, 1);
        assert_eq!(p.pgrp, 1234);
        assert_eq!(p.utime, 42);
        assert_eq!(p.stime, 17);
        assert_eq!(p.nice, -5);
        assert_eq!(p.num_threads, 3);
        assert!(!p.is_running());
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let p = ProcessDescriptor::parse(&stat_line(7, "Web Content (x)", "R")).unwrap();
        assert_eq!(p.name, "Web Content (x)");
        assert!(p.is_running());
        assert_eq!(p.num_threads, 3);
    }

    #[test]
    fn test_parse_truncated_line() {
        assert!(ProcessDescriptor::parse("12 (sh) S 1 12").is_err());
        assert!(ProcessDescriptor::parse("12 sh S 1 12").is_err());
        assert!(ProcessDescriptor::parse("x (sh) S 1 12 12 0 -1 0 0 0 0 0 1 1 0 0 20 0 1 0").is_err());
    }

    #[test]
    fn test_scan_sorted_by_pid() {
        let dir = tempfile::tempdir().unwrap();
        for (pid, state) in [(300, "S"), (2, "R"), (45, "R")] {
            let pid_dir = dir.path().join(pid.to_string());
            fs::create_dir(&pid_dir).unwrap();
            fs::write(pid_dir.join("stat"), stat_line(pid, "worker", state)).unwrap();
        }
        fs::create_dir(dir.path().join("self")).unwrap();
        fs::create_dir(dir.path().join("999")).unwrap();
        fs::write(dir.path().join("meminfo"), "MemTotal: 1 kB\n").unwrap();
        fs::write(dir.path().join("4242"), "not a process").unwrap();

        let sample = ProcessSample::read(&ProcFs::new(dir.path())).unwrap();
        let pids: Vec<u32> = sample.processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![2, 45, 300]);
        assert_eq!(sample.running(), 2);
        assert_eq!(sample.threads(), 9);
        assert_eq!(sample.encode_csv(), "3,2,9");
    }
}

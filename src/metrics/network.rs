//! Network throughput collection from the per-interface device statistics.

use crate::config::{MetricKind, MonitorConfig};
use crate::error::{Result, SystemError};
use crate::metrics::source::ProcFs;
use crate::metrics::traits::Metric;
use crate::output::{Encode, Saver};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Counters per interface line: 8 receive then 8 transmit.
pub const NET_COLUMNS: usize = 16;

/// Column holding received bytes.
pub const RX_BYTES: usize = 0;

/// Column holding transmitted bytes.
pub const TX_BYTES: usize = 8;

pub type InterfaceCounters = [u64; NET_COLUMNS];

/// One parsed read of `/proc/net/dev`, keyed by interface name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSample {
    pub interfaces: BTreeMap<String, InterfaceCounters>,
}

impl NetworkSample {
    /// Parse the content of `/proc/net/dev`. Header lines carry no `:`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut interfaces = BTreeMap::new();

        for line in content.lines() {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(SystemError::parse_error("interface line without a name"));
            }

            let mut counters = [0u64; NET_COLUMNS];
            let mut count = 0;
            for field in rest.split_whitespace() {
                if count == NET_COLUMNS {
                    return Err(SystemError::parse_error(format!(
                        "interface '{}' has more than {} columns",
                        name, NET_COLUMNS
                    )));
                }
                counters[count] = field.parse().map_err(|e| {
                    SystemError::parse_error(format!("interface '{}' column {}: {}", name, count + 1, e))
                })?;
                count += 1;
            }
            if count != NET_COLUMNS {
                return Err(SystemError::parse_error(format!(
                    "interface '{}' has {} columns, expected {}",
                    name, count, NET_COLUMNS
                )));
            }

            interfaces.insert(name.to_string(), counters);
        }

        Ok(Self { interfaces })
    }
}

/// Megabytes moved between two reads of a byte counter.
///
/// A counter that went backwards was reset and yields 0.0.
pub fn byte_rate(first: u64, second: u64) -> f64 {
    match second.checked_sub(first) {
        Some(delta) => delta as f64 / 1e6,
        None => 0.0,
    }
}

/// Throughput of one interface over the last tick, in MB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InterfaceRate {
    pub download: f64,
    pub upload: f64,
}

/// Rates of every interface present in the current sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NetworkView {
    pub interfaces: BTreeMap<String, InterfaceRate>,
}

impl Encode for NetworkView {
    fn encode_csv(&self) -> String {
        self.interfaces
            .iter()
            .map(|(name, rate)| format!("{},{:.2},{:.2}", name, rate.download, rate.upload))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn encode_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Network collector.
#[derive(Debug)]
pub struct NetworkCollector {
    source: ProcFs,
    saver: Saver,
    current: NetworkSample,
    previous: NetworkSample,
    view: NetworkView,
}

impl NetworkCollector {
    /// Create the collector and its output file.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let saver = Saver::create(config.output_path(MetricKind::Net), config.mode)?;
        Ok(Self::with_saver(ProcFs::new(config.proc_root()), saver))
    }

    /// Build a collector around an existing source and saver.
    pub fn with_saver(source: ProcFs, saver: Saver) -> Self {
        Self {
            source,
            saver,
            current: NetworkSample::default(),
            previous: NetworkSample::default(),
            view: NetworkView::default(),
        }
    }

    /// Rotate samples and recompute per-interface rates.
    pub fn push_sample(&mut self, sample: NetworkSample) {
        self.previous = std::mem::replace(&mut self.current, sample);

        let interfaces = self
            .current
            .interfaces
            .iter()
            .map(|(name, second)| {
                let rate = match self.previous.interfaces.get(name) {
                    Some(first) => {
                        if second[RX_BYTES] < first[RX_BYTES] || second[TX_BYTES] < first[TX_BYTES] {
                            warn!("{} byte counters went backwards, reporting 0 rate", name);
                        }
                        InterfaceRate {
                            download: byte_rate(first[RX_BYTES], second[RX_BYTES]),
                            upload: byte_rate(first[TX_BYTES], second[TX_BYTES]),
                        }
                    }
                    None => InterfaceRate::default(),
                };
                (name.clone(), rate)
            })
            .collect();

        self.view = NetworkView { interfaces };
    }

    /// Rate of one interface, if it is present in the current sample.
    pub fn rate(&self, interface: &str) -> Option<InterfaceRate> {
        self.view.interfaces.get(interface).copied()
    }

    pub fn view(&self) -> &NetworkView {
        &self.view
    }

    pub fn current(&self) -> &NetworkSample {
        &self.current
    }
}

impl Metric for NetworkCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Net
    }

    fn update(&mut self) -> Result<()> {
        let content = self.source.read(&self.source.net_dev_path())?;
        let sample = NetworkSample::parse(&content)?;
        debug!("Parsed {} network interfaces", sample.interfaces.len());
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

impl fmt::Display for NetworkCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t========== NETWORK ==========\n")?;
        for (name, rate) in &self.view.interfaces {
            writeln!(
                f,
                "{}:\tDownload: {:.6} MB,\tUpload: {:.6} MB",
                name, rate.download, rate.upload
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputMode;

    const HEADER: &str = "Inter-|   Receive                                                |  Transmit\n \
                          face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n";

    fn dev(lines: &[(&str, u64, u64)]) -> String {
        let mut content = HEADER.to_string();
        for (name, rx, tx) in lines {
            content.push_str(&format!(
                "{:>6}: {} 10 0 0 0 0 0 0 {} 20 0 0 0 0 0 0\n",
                name, rx, tx
            ));
        }
        content
    }

    fn collector(dir: &tempfile::TempDir) -> NetworkCollector {
        let saver = Saver::create(dir.path().join("net.json"), OutputMode::Json).unwrap();
        NetworkCollector::with_saver(ProcFs::new(dir.path()), saver)
    }

    #[test]
    fn test_parse_net_dev() {
        let sample = NetworkSample::parse(&dev(&[("lo", 500, 500), ("eth0", 1_000, 2_000)])).unwrap();
        assert_eq!(sample.interfaces.len(), 2);
        assert_eq!(sample.interfaces["eth0"][RX_BYTES], 1_000);
        assert_eq!(sample.interfaces["eth0"][TX_BYTES], 2_000);
        assert_eq!(sample.interfaces["eth0"][1], 10);
    }

    #[test]
    fn test_parse_wrong_column_count() {
        assert!(NetworkSample::parse("eth0: 1 2 3\n").is_err());
        assert!(NetworkSample::parse("eth0: 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17\n").is_err());
        assert!(NetworkSample::parse("eth0: 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 x\n").is_err());
    }

    #[test]
    fn test_rates_between_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = collector(&dir);

        net.push_sample(NetworkSample::parse(&dev(&[("eth0", 1_000_000, 0)])).unwrap());
        net.push_sample(
            NetworkSample::parse(&dev(&[("eth0", 3_500_000, 1_000_000), ("wlan0", 9_000, 9_000)]))
                .unwrap(),
        );

        let eth0 = net.rate("eth0").unwrap();
        assert_eq!(eth0.download, 2.5);
        assert_eq!(eth0.upload, 1.0);

        let wlan0 = net.rate("wlan0").unwrap();
        assert_eq!(wlan0.download, 0.0);
        assert_eq!(wlan0.upload, 0.0);
    }

    #[test]
    fn test_vanished_interface_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = collector(&dir);

        net.push_sample(NetworkSample::parse(&dev(&[("eth0", 1, 1), ("tun0", 1, 1)])).unwrap());
        net.push_sample(NetworkSample::parse(&dev(&[("eth0", 2, 2)])).unwrap());
        assert!(net.rate("tun0").is_none());

        net.push_sample(NetworkSample::parse(&dev(&[("eth0", 3, 3), ("tun0", 500, 500)])).unwrap());
        assert_eq!(net.rate("tun0").unwrap().download, 0.0);
    }

    #[test]
    fn test_counter_reset_reports_zero() {
        assert_eq!(byte_rate(5_000_000, 100), 0.0);
        assert_eq!(byte_rate(100, 2_000_100), 2.0);
    }

    #[test]
    fn test_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = collector(&dir);
        net.push_sample(NetworkSample::parse(&dev(&[("lo", 0, 0), ("eth0", 0, 0)])).unwrap());
        net.push_sample(NetworkSample::parse(&dev(&[("lo", 0, 0), ("eth0", 1_250_000, 0)])).unwrap());

        assert_eq!(net.view().encode_csv(), "eth0,1.25,0.00,lo,0.00,0.00");
        assert_eq!(
            net.view().encode_json().unwrap(),
            r#"{"eth0":{"download":1.25,"upload":0.0},"lo":{"download":0.0,"upload":0.0}}"#
        );
        assert!(net.render().contains("eth0:\tDownload: 1.250000 MB"));
    }
}

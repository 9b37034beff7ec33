//! Drives the selected collectors once per tick.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::metrics::{create_collector, Metric};
use std::fs;
use tracing::{debug, info};

/// The set of collectors chosen by the configuration.
pub struct Monitor {
    config: MonitorConfig,
    collectors: Vec<Box<dyn Metric>>,
}

impl Monitor {
    /// Validate the configuration, create the output directory and open
    /// one collector per selected metric.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_dir)?;

        let collectors = config
            .metrics
            .iter()
            .map(|kind| create_collector(*kind, &config))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Monitoring {} metric(s) into {} as {}",
            collectors.len(),
            config.output_dir.display(),
            config.mode
        );

        Ok(Self { config, collectors })
    }

    /// Run `update`, `save` and `render` for every collector.
    ///
    /// Returns the concatenated renderings. The first failure aborts the
    /// tick and is returned as is.
    pub fn tick(&mut self) -> Result<String> {
        let mut screen = String::new();
        for collector in &mut self.collectors {
            collector.update()?;
            collector.save()?;
            screen.push_str(&collector.render());
            screen.push('\n');
            debug!("Tick done for {}", collector.kind());
        }
        Ok(screen)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn collectors(&self) -> &[Box<dyn Metric>] {
        &self.collectors
    }

    /// Close every collector. Every collector is closed even if one fails;
    /// the first error is returned.
    pub fn close(mut self) -> Result<()> {
        let mut first_error = None;
        for collector in &mut self.collectors {
            if let Err(e) = collector.close() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

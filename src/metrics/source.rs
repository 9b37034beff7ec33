//! Location of the kernel text sources.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// A proc filesystem mount, `/proc` on a live system.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(crate::DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scheduler statistics, `<root>/stat`.
    pub fn stat_path(&self) -> PathBuf {
        self.root.join("stat")
    }

    /// Memory statistics, `<root>/meminfo`.
    pub fn meminfo_path(&self) -> PathBuf {
        self.root.join("meminfo")
    }

    /// Network device statistics, `<root>/net/dev`.
    pub fn net_dev_path(&self) -> PathBuf {
        self.root.join("net").join("dev")
    }

    /// Status line of one process, `<root>/<pid>/stat`.
    pub fn pid_stat_path(&self, pid: &str) -> PathBuf {
        self.root.join(pid).join("stat")
    }

    pub(crate) fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

//! Traits for metric collectors.

use crate::config::MetricKind;
use crate::error::Result;

/// Uniform contract shared by every metric collector.
///
/// The monitoring loop calls `update`, `save` and `render` once per tick,
/// in that order, and `close` once at shutdown. Collectors are not
/// reentrant.
pub trait Metric {
    /// Which metric family this collector handles.
    fn kind(&self) -> MetricKind;

    /// Take a new sample and recompute the derived values.
    ///
    /// On error the previous state is left untouched.
    fn update(&mut self) -> Result<()>;

    /// Persist the derived values through the collector's saver.
    fn save(&mut self) -> Result<()>;

    /// Human-readable snapshot of the current state.
    fn render(&self) -> String;

    /// Release the output file.
    fn close(&mut self) -> Result<()>;
}

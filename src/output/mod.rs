//! Output files for collected metrics.

pub mod saver;

pub use saver::{Encode, Saver};

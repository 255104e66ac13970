//! Diagnostics Module
//!
//! Periodic read-only reporting of the radio link while the receiver runs.

mod monitor;

pub use monitor::LinkMonitor;

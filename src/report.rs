//! Scan progress reporting seam
//!
//! The scanner reports a coarse phase name ("Preparation", "Detection",
//! "Restoration", empty string on completion) and a 0-100 percentage.
//! Hosts route these to whatever status surface they have; the core never
//! blocks on a reporter.

/// Receiver for scan status updates.
///
/// Implementations must tolerate calls from worker threads. Percentage
/// updates are throttled by the scanner (roughly every 1000 positions) and
/// are monotonic only within one phase.
pub trait ScanReporter: Send + Sync {
    /// Called when a scan phase starts; empty string marks scan completion.
    fn phase(&self, _name: &str) {}

    /// Called with phase progress in percent (0-100).
    fn progress(&self, _percent: f64) {}
}

/// Reporter that discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ScanReporter for NullReporter {}

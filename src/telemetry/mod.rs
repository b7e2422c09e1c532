use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Typed run-wide accumulator: total passed and failed cases across every
/// set of one replay run. Updated once per set at finalization time.
#[derive(Debug, Default)]
pub struct RunTelemetry {
    success: AtomicUsize,
    failure: AtomicUsize,
}

impl RunTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_set(&self, success: usize, failure: usize) {
        self.success.fetch_add(success, Ordering::Relaxed);
        self.failure.fetch_add(failure, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.success.load(Ordering::Relaxed),
            self.failure.load(Ordering::Relaxed),
        )
    }

    /// Emit the run totals. Runs that executed no case stay silent.
    pub fn emit(&self) {
        let (success, failure) = self.snapshot();
        if success != 0 || failure != 0 {
            info!(passed = success, failed = failure, "test run telemetry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_across_sets() {
        let telemetry = RunTelemetry::new();
        telemetry.add_set(3, 1);
        telemetry.add_set(2, 0);
        assert_eq!(telemetry.snapshot(), (5, 1));
    }

    #[test]
    fn test_starts_empty() {
        assert_eq!(RunTelemetry::new().snapshot(), (0, 0));
    }
}

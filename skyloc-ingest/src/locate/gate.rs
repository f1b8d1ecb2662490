//! Minimum-interval admission gate for outbound geocoding calls
//!
//! One gate is shared by every caller. Admission is serialized on the gate's
//! lock, and the admitted caller records its start time before releasing the
//! lock, so spacing holds even when the calls themselves overlap.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default spacing between outbound calls
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

pub struct MinIntervalGate {
    last_admission: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl MinIntervalGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_admission: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until an outbound call may start, then claim the slot
    ///
    /// Returns the admission instant.
    pub async fn admit(&self) -> Instant {
        let mut last = self.last_admission.lock().await;

        if let Some(last_time) = *last {
            let next_slot = last_time + self.min_interval;
            if Instant::now() < next_slot {
                debug!(
                    "Rate limiting: waiting {:?}",
                    next_slot.saturating_duration_since(Instant::now())
                );
                tokio::time::sleep_until(next_slot).await;
            }
        }

        let admitted = Instant::now();
        *last = Some(admitted);
        admitted
    }
}

impl Default for MinIntervalGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_gate_creation() {
        let gate = MinIntervalGate::default();
        assert_eq!(gate.min_interval(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_gate_timing() {
        let gate = MinIntervalGate::new(Duration::from_millis(200));
        let start = Instant::now();

        // First admission - no wait
        gate.admit().await;
        let first_elapsed = start.elapsed();

        // Second admission - should wait ~200ms
        gate.admit().await;
        let second_elapsed = start.elapsed();

        // Third admission - should wait another ~200ms
        gate.admit().await;
        let third_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(100));
        assert!(second_elapsed >= Duration::from_millis(200));
        assert!(third_elapsed >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_concurrent_admissions_are_spaced() {
        let gate = Arc::new(MinIntervalGate::new(Duration::from_millis(50)));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.admit().await }));
        }

        let mut admissions = Vec::new();
        for handle in handles {
            admissions.push(handle.await.unwrap());
        }
        admissions.sort();

        for pair in admissions.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(50),
                "admissions {:?} apart",
                pair[1] - pair[0]
            );
        }
    }

    #[tokio::test]
    async fn test_no_wait_after_interval_elapsed() {
        let gate = MinIntervalGate::new(Duration::from_millis(200));
        gate.admit().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let before = Instant::now();
        gate.admit().await;
        assert!(before.elapsed() < Duration::from_millis(150));
    }
}

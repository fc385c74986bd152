use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Row and byte counts, either for one flush or accumulated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub rows_per_second: f64,
    pub bytes_per_second: f64,
}

impl IngestStats {
    pub fn throughput(&self, elapsed: Duration) -> Throughput {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return Throughput {
                rows_per_second: 0.0,
                bytes_per_second: 0.0,
            };
        }

        Throughput {
            rows_per_second: self.rows as f64 / secs,
            bytes_per_second: self.bytes as f64 / secs,
        }
    }
}

/// Cumulative totals shared by every worker
#[derive(Debug)]
pub struct StatsRecorder {
    totals: Mutex<IngestStats>,
    started_at: Instant,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(IngestStats::default()),
            started_at: Instant::now(),
        }
    }

    /// Adds one flush to the totals, returning the totals after the update
    pub fn record_metric(&self, bytes: u64, rows: u64) -> IngestStats {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.rows += rows;
        totals.bytes += bytes;
        *totals
    }

    pub fn totals(&self) -> IngestStats {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Totals averaged over the time since the recorder was created
    pub fn session_throughput(&self) -> Throughput {
        self.totals().throughput(self.started_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn throughput_divides_by_elapsed() {
        let stats = IngestStats {
            rows: 500,
            bytes: 20_000,
        };
        let rate = stats.throughput(Duration::from_millis(250));
        assert_eq!(2000.0, rate.rows_per_second);
        assert_eq!(80_000.0, rate.bytes_per_second);

        let zero = stats.throughput(Duration::ZERO);
        assert_eq!(0.0, zero.rows_per_second);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let recorder = Arc::new(StatsRecorder::new());
        let handles = (0..8)
            .map(|_| {
                let recorder = recorder.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        recorder.record_metric(10, 1);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            IngestStats {
                rows: 8000,
                bytes: 80_000
            },
            recorder.totals()
        );
    }
}

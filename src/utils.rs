use std::time::{Duration, Instant};

/// Counts completed cycles and fetched bytes between two monotonic
/// timestamps.
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    /// Number of completed cycles
    pub n_cycles: u32,
    /// Bytes fetched across all active channels
    pub total_size: u64,
    /// Time the counter was started
    pub t_begin: Instant,
}

impl Counter {
    /// Takes the start timestamp.
    pub fn start() -> Self {
        Self {
            n_cycles: 0,
            total_size: 0,
            t_begin: Instant::now(),
        }
    }

    /// Record a completed cycle that fetched `size` bytes.
    pub fn increment(&mut self, size: usize) {
        self.n_cycles += 1;
        self.total_size += size as u64;
    }

    /// Takes the stop timestamp.
    pub fn stop(&self) -> AcquisitionStats {
        AcquisitionStats::compute(self.n_cycles, self.total_size, self.t_begin.elapsed())
    }
}

/// Throughput of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionStats {
    pub cycles: u32,
    pub total_size: u64,
    pub elapsed: Duration,
}

impl AcquisitionStats {
    pub fn compute(cycles: u32, total_size: u64, elapsed: Duration) -> Self {
        Self {
            cycles,
            total_size,
            elapsed,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Seconds per cycle; `None` if no cycle ran.
    pub fn average_duration(&self) -> Option<f64> {
        (self.cycles > 0).then(|| self.elapsed_secs() / f64::from(self.cycles))
    }

    /// Cycles per second; `None` when no time was measured.
    pub fn rate(&self) -> Option<f64> {
        (!self.elapsed.is_zero()).then(|| f64::from(self.cycles) / self.elapsed_secs())
    }

    /// Fetched data rate in MB/s; `None` when no time was measured.
    pub fn data_rate(&self) -> Option<f64> {
        (!self.elapsed.is_zero())
            .then(|| (self.total_size as f64 / self.elapsed_secs()) / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_average_and_rate() {
        let stats = AcquisitionStats::compute(100, 100 * 1024 * 1024, Duration::from_secs(2));
        assert_eq!(stats.elapsed_secs(), 2.0);
        assert_eq!(stats.average_duration(), Some(0.02));
        assert_eq!(stats.rate(), Some(50.0));
        assert_eq!(stats.data_rate(), Some(50.0));
    }

    #[test]
    fn zero_elapsed_is_an_undefined_rate() {
        let stats = AcquisitionStats::compute(10, 4096, Duration::ZERO);
        assert_eq!(stats.rate(), None);
        assert_eq!(stats.data_rate(), None);
        assert_eq!(stats.average_duration(), Some(0.0));
    }

    #[test]
    fn no_cycles_has_no_average() {
        let stats = AcquisitionStats::compute(0, 0, Duration::from_millis(5));
        assert_eq!(stats.average_duration(), None);
        assert_eq!(stats.rate(), Some(0.0));
    }

    #[test]
    fn counter_accumulates_cycles() {
        let mut counter = Counter::start();
        counter.increment(2000);
        counter.increment(2000);
        std::thread::sleep(Duration::from_millis(1));
        let stats = counter.stop();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.total_size, 4000);
        assert!(stats.elapsed > Duration::ZERO);
    }
}

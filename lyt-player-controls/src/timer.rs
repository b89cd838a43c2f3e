use std::time::{Duration, Instant};

/// Media position driven by the wall clock, advancing at the playback rate.
#[derive(Debug)]
pub(crate) struct Timer {
    start_time: Option<Instant>,
    elapsed: Duration,
    rate: f32,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
            rate: 1.0,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
    }

    pub(crate) fn start(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed().mul_f32(self.rate);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        match self.start_time {
            Some(start) => self.elapsed + start.elapsed().mul_f32(self.rate),
            None => self.elapsed,
        }
    }

    pub(crate) fn set_time(&mut self, time: Duration) {
        self.elapsed = time;

        if self.start_time.is_some() {
            self.start_time = Some(Instant::now());
        }
    }

    /// Changes the speed from now on; time already played keeps its rate.
    pub(crate) fn set_rate(&mut self, rate: f32) {
        let running = self.is_running();
        self.pause();
        self.rate = rate;
        if running {
            self.start();
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn approx_eq(d1: Duration, d2: Duration, tolerance_ms: u64) -> bool {
        let diff = d1.abs_diff(d2);
        diff <= Duration::from_millis(tolerance_ms)
    }

    #[test]
    fn resume_accumulates_time() {
        let mut clock = Timer::new();

        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        clock.pause();
        assert!(clock.elapsed() >= Duration::from_millis(50));

        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        clock.pause();
        assert!(clock.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn paused_clock_stands_still() {
        let mut clock = Timer::new();

        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        clock.pause();

        let paused = clock.elapsed();
        std::thread::sleep(Duration::from_millis(50));
        assert!(
            approx_eq(paused, clock.elapsed(), 5),
            "Elapsed time should not increase while paused"
        );
    }

    #[test]
    fn doubled_rate_runs_twice_as_fast() {
        let mut clock = Timer::new();
        clock.set_rate(2.0);

        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        clock.pause();

        assert!(clock.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn set_time_moves_position() {
        let mut clock = Timer::new();
        clock.set_time(Duration::from_secs(42));
        assert_eq!(clock.elapsed(), Duration::from_secs(42));

        clock.clear();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert!(!clock.is_running());
    }
}

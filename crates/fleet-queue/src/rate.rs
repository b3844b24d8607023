//! Fixed-window rate cap for low-priority queues.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Window {
    count: u32,
    start: Instant,
}

/// Admits at most `max` acquisitions per window.
pub struct RateGate {
    window: Mutex<Window>,
    max: u32,
    length: Duration,
}

impl RateGate {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            window: Mutex::new(Window {
                count: 0,
                start: Instant::now(),
            }),
            max: max_per_window,
            length: window,
        }
    }

    /// Take a slot if one is free in the current window.
    pub fn try_acquire(&self) -> bool {
        self.poll(Instant::now()).is_ok()
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        loop {
            match self.poll(Instant::now()) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// `Err` carries the time left in the current full window.
    fn poll(&self, now: Instant) -> Result<(), Duration> {
        let mut w = self.window.lock();
        let elapsed = now.saturating_duration_since(w.start);
        if elapsed >= self.length {
            w.count = 1;
            w.start = now;
            Ok(())
        } else if w.count >= self.max {
            Err(self.length - elapsed)
        } else {
            w.count += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_per_window() {
        let gate = RateGate::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(gate.try_acquire());
        }
        assert!(!gate.try_acquire());
    }

    #[test]
    fn zero_window_always_resets() {
        let gate = RateGate::new(1, Duration::ZERO);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
    }

    #[test]
    fn reports_remaining_window() {
        let gate = RateGate::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(gate.poll(start).is_ok());
        let wait = gate.poll(start + Duration::from_secs(4)).unwrap_err();
        assert!(wait <= Duration::from_secs(6));
        assert!(gate.poll(start + Duration::from_secs(11)).is_ok());
    }
}

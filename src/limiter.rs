//! Defines the rate and IOPS limiter shared by all filesystem callbacks.
//!
//! Both modes are independent and composable; either, both, or neither may
//! be active depending on `--rate-limit` and `--iop-limit`. When both are
//! active, the rate wait happens first, then IOPS admission.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

struct RateState {
    last_admitted: Option<Instant>,
}

struct IopsState {
    window_start: Instant,
    count_this_window: u32,
}

/// Minimum inter-op spacing, shared across every concurrent callback.
struct RateLimiter {
    interval: Duration,
    state: Mutex<RateState>,
}

impl RateLimiter {
    fn new(seconds: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(seconds.max(0.0)),
            state: Mutex::new(RateState { last_admitted: None }),
        }
    }

    /// Blocks the calling thread until at least `interval` has elapsed
    /// since the last admitted callback.
    fn admit(&self) {
        if self.interval.is_zero() {
            return;
        }

        let wait = {
            let mut state = self.state.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let wait = match state.last_admitted {
                Some(last) => self.interval.saturating_sub(now.duration_since(last)),
                None => Duration::ZERO,
            };
            state.last_admitted = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

/// Per-second admission cap, shared across every concurrent callback.
struct IopsLimiter {
    limit: u32,
    state: Mutex<IopsState>,
}

impl IopsLimiter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            state: Mutex::new(IopsState { window_start: Instant::now(), count_this_window: 0 }),
        }
    }

    /// Blocks the calling thread until admission is possible within the
    /// per-second budget.
    fn admit(&self) {
        if self.limit == 0 {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().expect("iops limiter mutex poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(state.window_start);
                if elapsed >= Duration::from_secs(1) {
                    state.window_start = now;
                    state.count_this_window = 0;
                }

                if state.count_this_window < self.limit {
                    state.count_this_window += 1;
                    None
                } else {
                    Some(Duration::from_secs(1).saturating_sub(elapsed))
                }
            };

            match wait {
                None => return,
                Some(wait) => thread::sleep(wait),
            }
        }
    }
}

/// Combined rate and IOPS admission control for `getattr`, `readdir`, and
/// `read` callbacks.
pub struct Limiter {
    rate: Option<RateLimiter>,
    iops: Option<IopsLimiter>,
}

impl Limiter {
    /// `rate_seconds <= 0.0` disables the rate limiter; `iop_limit == 0`
    /// disables the IOPS limiter.
    pub fn new(rate_seconds: f64, iop_limit: u32) -> Self {
        Self {
            rate: (rate_seconds > 0.0).then(|| RateLimiter::new(rate_seconds)),
            iops: (iop_limit > 0).then(|| IopsLimiter::new(iop_limit)),
        }
    }

    /// Admits one operation, blocking the calling thread as configured.
    /// Rate admission runs before IOPS admission.
    pub fn admit(&self) {
        if let Some(rate) = &self.rate {
            rate.admit();
        }
        if let Some(iops) = &self.iops {
            iops.admit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limiter_never_waits() {
        let limiter = Limiter::new(0.0, 0);
        let start = Instant::now();
        for _ in 0..1000 {
            limiter.admit();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn rate_limit_spaces_out_sequential_ops() {
        let rate = 0.02;
        let limiter = Limiter::new(rate, 0);
        let start = Instant::now();
        const K: u32 = 4;
        for _ in 0..K {
            limiter.admit();
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs_f64(rate * (K - 1) as f64),
            "elapsed {elapsed:?} too short for rate {rate} over {K} ops"
        );
    }

    #[test]
    fn iops_limit_caps_admissions_per_window() {
        let limiter = Limiter::new(0.0, 3);
        let start = Instant::now();
        let mut admitted_in_first_window = 0;
        for _ in 0..3 {
            limiter.admit();
            admitted_in_first_window += 1;
        }
        assert_eq!(admitted_in_first_window, 3);
        // a fourth admission within the same window must be delayed into
        // the next one-second window
        limiter.admit();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}

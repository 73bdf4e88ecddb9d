//! Exponential backoff with full jitter, shared by every venue adapter's
//! reconnect loop: `min(cap, base * 2^n) * random(0.5, 1.5)`.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms, attempt: 0 }
    }

    /// Polymarket/Kalshi reconnect default: base 1s, cap 60s.
    pub fn reconnect_default() -> Self {
        Self::new(1_000, 60_000)
    }

    /// Compute the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << self.attempt.min(32));
        let capped = exp.min(self.cap_ms);
        self.attempt += 1;
        let jitter = rand::thread_rng().gen_range(0.5..1.5_f64);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Reset after a successful connection/request.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_capped() {
        let mut b = Backoff::new(1_000, 60_000);
        for _ in 0..10 {
            let d = b.next_delay();
            assert!(d.as_millis() <= (60_000.0 * 1.5) as u128);
        }
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut b = Backoff::new(1_000, 60_000);
        b.next_delay();
        b.next_delay();
        assert_eq!(b.attempt(), 2);
        b.reset();
        assert_eq!(b.attempt(), 0);
    }
}

//! Pacing and rate limits for calls to the OCR API.
//!
//! The OCR service enforces a request-rate ceiling. We always wait a fixed
//! pause after each completed call, and the user may also supply an explicit
//! rate limit like `60/m`, which gates when each call may start.

use std::{fmt, num::NonZeroUsize, str::FromStr, time::Duration};

use leaky_bucket::RateLimiter;
use tokio::time;

use crate::prelude::*;

/// The unit of time a [`RateLimit`] is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPeriod {
    Second,
    Minute,
}

impl RateLimitPeriod {
    fn as_duration(self) -> Duration {
        match self {
            RateLimitPeriod::Second => Duration::from_secs(1),
            RateLimitPeriod::Minute => Duration::from_secs(60),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            RateLimitPeriod::Second => "s",
            RateLimitPeriod::Minute => "m",
        }
    }
}

/// A limit on how many OCR calls may start per period, written `N/s` or
/// `N/m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    /// Calls allowed per period. Never zero, or we'd wait forever.
    pub max_calls: NonZeroUsize,
    /// The period the limit applies to.
    pub period: RateLimitPeriod,
}

impl RateLimit {
    /// Build a [`RateLimiter`] enforcing this limit.
    fn to_rate_limiter(&self) -> RateLimiter {
        // The bucket starts full and refills all at once at the end of each
        // period.
        let max = self.max_calls.get();
        RateLimiter::builder()
            .initial(max)
            .refill(max)
            .max(max)
            .interval(self.period.as_duration())
            .build()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.max_calls, self.period.suffix())
    }
}

impl FromStr for RateLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (count, unit) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("rate limit {:?} should look like \"10/s\" or \"60/m\"", s))?;
        let max_calls = count
            .trim()
            .parse::<NonZeroUsize>()
            .with_context(|| format!("invalid call count in rate limit {:?}", s))?;
        let period = match unit.trim() {
            "s" => RateLimitPeriod::Second,
            "m" => RateLimitPeriod::Minute,
            other => return Err(anyhow!("unsupported rate limit period {:?}", other)),
        };
        Ok(Self { max_calls, period })
    }
}

/// Paces calls to the OCR API.
pub struct Pacer {
    /// Fixed pause after every completed call.
    pause: Duration,
    /// Optional limiter gating the start of each call.
    limiter: Option<RateLimiter>,
}

impl Pacer {
    /// Create a new [`Pacer`].
    pub fn new(pause: Duration, rate_limit: Option<&RateLimit>) -> Self {
        Self {
            pause,
            limiter: rate_limit.map(RateLimit::to_rate_limiter),
        }
    }

    /// Create a [`Pacer`] that never waits.
    #[cfg(test)]
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO, None)
    }

    /// Wait until we're allowed to start another call.
    pub async fn before_call(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire_one().await;
        }
    }

    /// Wait out the pause that follows every completed call.
    pub async fn after_call(&self) {
        if !self.pause.is_zero() {
            trace!(pause = ?self.pause, "pausing after OCR call");
            time::sleep(self.pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_round_trip_through_strings() {
        for s in ["10/s", "60/m"] {
            assert_eq!(s.parse::<RateLimit>().unwrap().to_string(), s);
        }
        let limit = " 5 / m ".trim().parse::<RateLimit>().unwrap();
        assert_eq!(limit.max_calls.get(), 5);
        assert_eq!(limit.period, RateLimitPeriod::Minute);
    }

    #[test]
    fn bad_rate_limits_are_rejected() {
        for s in ["10/h", "ten/s", "0/s", "10", ""] {
            assert!(s.parse::<RateLimit>().is_err(), "{s:?} should not parse");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_sleeps_after_each_call() {
        let pacer = Pacer::new(Duration::from_secs(1), None);
        let start = time::Instant::now();
        pacer.before_call().await;
        pacer.after_call().await;
        pacer.before_call().await;
        pacer.after_call().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_gate_call_starts() {
        let limit = "2/s".parse::<RateLimit>().unwrap();
        let pacer = Pacer::new(Duration::ZERO, Some(&limit));
        let start = time::Instant::now();
        for _ in 0..3 {
            pacer.before_call().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}

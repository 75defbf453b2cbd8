//! AI subsystem status tracking (spec §4.4.4): lock-protected counters and
//! an exponentially-weighted moving average of call latency, exposed as a
//! point-in-time snapshot.

use super::circuit_breaker::BreakerState;
use std::sync::Mutex;
use std::time::Duration;

/// Smoothing factor for the latency EWMA. Closer to 1.0 reacts faster to
/// recent calls; 0.2 favors a stable long-run average.
const EWMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct AiStatusSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_latency_ms: f64,
    pub queue_depth: u64,
    pub breaker_state: &'static str,
}

struct Inner {
    total_requests: u64,
    successes: u64,
    failures: u64,
    cache_hits: u64,
    cache_misses: u64,
    avg_latency_ms: f64,
    queue_depth: u64,
}

pub struct AiStatus {
    inner: Mutex<Inner>,
}

impl Default for AiStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl AiStatus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                total_requests: 0,
                successes: 0,
                failures: 0,
                cache_hits: 0,
                cache_misses: 0,
                avg_latency_ms: 0.0,
                queue_depth: 0,
            }),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        let mut inner = self.inner.lock().expect("ai status mutex poisoned");
        inner.total_requests += 1;
        inner.successes += 1;
        Self::update_ewma(&mut inner.avg_latency_ms, latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        let mut inner = self.inner.lock().expect("ai status mutex poisoned");
        inner.total_requests += 1;
        inner.failures += 1;
        Self::update_ewma(&mut inner.avg_latency_ms, latency);
    }

    fn update_ewma(avg: &mut f64, latest: Duration) {
        let sample = latest.as_secs_f64() * 1000.0;
        *avg = if *avg == 0.0 {
            sample
        } else {
            EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * *avg
        };
    }

    pub fn record_cache_hit(&self) {
        self.inner.lock().expect("ai status mutex poisoned").cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.inner.lock().expect("ai status mutex poisoned").cache_misses += 1;
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.inner.lock().expect("ai status mutex poisoned").queue_depth = depth;
    }

    pub fn snapshot(&self, breaker_state: BreakerState) -> AiStatusSnapshot {
        let inner = self.inner.lock().expect("ai status mutex poisoned");
        AiStatusSnapshot {
            total_requests: inner.total_requests,
            successes: inner.successes,
            failures: inner.failures,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            avg_latency_ms: inner.avg_latency_ms,
            queue_depth: inner.queue_depth,
            breaker_state: match breaker_state {
                BreakerState::Closed => "closed",
                BreakerState::Open => "open",
                BreakerState::HalfOpen => "half-open",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_converges_toward_recent_samples() {
        let status = AiStatus::new();
        for _ in 0..50 {
            status.record_success(Duration::from_millis(100));
        }
        let snap = status.snapshot(BreakerState::Closed);
        assert!((snap.avg_latency_ms - 100.0).abs() < 1.0);
    }

    #[test]
    fn counters_are_independent() {
        let status = AiStatus::new();
        status.record_success(Duration::from_millis(10));
        status.record_failure(Duration::from_millis(20));
        status.record_cache_hit();
        let snap = status.snapshot(BreakerState::Open);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.breaker_state, "open");
    }
}

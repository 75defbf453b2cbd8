//! Background AI enhancement queue (spec §4.4.2): a small worker pool drains
//! `ai_improvements` rows left behind by the synchronous fast path, retrying
//! transient failures with jittered backoff and giving up after a bound.

use super::circuit_breaker::CircuitBreaker;
use super::matcher::{AiMatcher, MatcherError};
use super::status::AiStatus;
use crate::index::{AiImprovement, MediaIndex};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Matches spec §4.4.2: two workers, bounded retries, jittered delay.
pub const DEFAULT_WORKERS: usize = 2;
pub const MAX_ATTEMPTS: u32 = 5;
const RETRY_JITTER_MIN: Duration = Duration::from_millis(100);
const RETRY_JITTER_MAX: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct EnhancementQueue {
    shutdown: watch::Sender<bool>,
}

pub struct QueueConfig {
    pub workers: usize,
    pub model: String,
    pub ai_call_permits: Arc<Semaphore>,
}

impl EnhancementQueue {
    pub fn spawn(
        index: Arc<MediaIndex>,
        matcher: Arc<AiMatcher>,
        breaker: Arc<CircuitBreaker>,
        status: Arc<AiStatus>,
        config: QueueConfig,
    ) -> Self {
        let (tx, rx) = watch::channel(false);

        for worker_id in 0..config.workers.max(1) {
            let index = index.clone();
            let matcher = matcher.clone();
            let breaker = breaker.clone();
            let status = status.clone();
            let model = config.model.clone();
            let permits = config.ai_call_permits.clone();
            let mut rx = rx.clone();

            tokio::spawn(async move {
                loop {
                    if *rx.borrow() {
                        break;
                    }

                    if !breaker.allow() {
                        tokio::select! {
                            _ = tokio::time::sleep(POLL_INTERVAL) => {}
                            _ = rx.changed() => {}
                        }
                        continue;
                    }

                    match index.dequeue_improvement().await {
                        Ok(Some(item)) => {
                            process_item(&index, &matcher, &breaker, &status, &model, &permits, item)
                                .await;
                        }
                        Ok(None) => {
                            tokio::select! {
                                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                                _ = rx.changed() => {}
                            }
                        }
                        Err(e) => {
                            error!(worker_id, error = %e, "enhancement queue dequeue failed");
                            tokio::time::sleep(POLL_INTERVAL).await;
                        }
                    }
                }
                debug!(worker_id, "enhancement queue worker stopped");
            });
        }

        Self { shutdown: tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for EnhancementQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn process_item(
    index: &MediaIndex,
    matcher: &AiMatcher,
    breaker: &CircuitBreaker,
    status: &AiStatus,
    model: &str,
    permits: &Semaphore,
    item: AiImprovement,
) {
    let permit = permits.acquire().await;
    let started = Instant::now();
    let result = matcher.enhance(model, &item.filename).await;
    drop(permit);

    match result {
        Ok(ai_result) => {
            breaker.record_success();
            status.record_success(started.elapsed());
            if let Err(e) = index
                .complete_improvement(
                    &item.request_id,
                    &ai_result.parsed.title,
                    crate::index::MediaKind::from_parsed_kind(ai_result.parsed.kind),
                    ai_result.parsed.year,
                    ai_result.confidence,
                )
                .await
            {
                error!(request_id = %item.request_id, error = %e, "failed to record ai improvement result");
            }
        }
        Err(err) => {
            status.record_failure(started.elapsed());
            if matches!(err, MatcherError::Network(_) | MatcherError::Http(_)) {
                breaker.record_failure();
            }

            if item.attempts >= MAX_ATTEMPTS {
                warn!(request_id = %item.request_id, attempts = item.attempts, "giving up on ai enhancement");
                let _ = index.fail_improvement(&item.request_id, &err.to_string()).await;
            } else {
                let jitter = {
                    let mut rng = rand::rng();
                    rng.random_range(RETRY_JITTER_MIN..=RETRY_JITTER_MAX)
                };
                tokio::time::sleep(jitter).await;
                if let Err(e) = index.requeue_improvement(&item.request_id).await {
                    error!(request_id = %item.request_id, error = %e, "failed to requeue ai improvement");
                }
            }
        }
    }
}

//! AI Integrator (spec §4.4): orchestrates the full enhancement pipeline
//! sitting between the layered filename parser and the Media Index —
//! cache lookup, circuit breaker, single-flight de-duplication, bounded
//! concurrency, and fallback to the background queue when the provider is
//! unavailable or a result fails validation.

use super::cache::{normalize_cache_key, ParseCache};
use super::circuit_breaker::CircuitBreaker;
use super::matcher::{AiMatcher, MatcherError};
use super::status::AiStatus;
use crate::index::{AiImprovement, MediaIndex, MediaKind, QueueStatus};
use crate::parse::{self, LibraryHint, ParsedName};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Below this, the layered parser's own output is trusted without calling
/// out to the AI provider at all (spec §4.2/§4.4 step 2).
pub const CONFIDENCE_FAST_PATH_THRESHOLD: f32 = 0.85;

/// Concurrent live AI calls (spec §4.4: cap 4).
pub const AI_CALL_CONCURRENCY: usize = 4;
/// Concurrent cache-warm lookups permitted alongside live calls (cap 8).
pub const CACHE_WARM_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub enum EnhancementOutcome {
    /// The layered parser's own result was confident enough; no AI call made.
    FastPath(ParsedName),
    /// Served from the parse cache.
    CacheHit(ParsedName, f32),
    /// A live AI call succeeded and was validated.
    AiEnhanced(ParsedName, f32),
    /// AI unavailable or failed; parser result returned, enhancement queued
    /// for the background worker pool.
    QueuedForRetry(ParsedName),
}

impl EnhancementOutcome {
    pub fn parsed(&self) -> &ParsedName {
        match self {
            EnhancementOutcome::FastPath(p)
            | EnhancementOutcome::CacheHit(p, _)
            | EnhancementOutcome::AiEnhanced(p, _)
            | EnhancementOutcome::QueuedForRetry(p) => p,
        }
    }
}

struct SharedOutcome {
    result: Result<(ParsedName, f32), String>,
}

pub struct AiIntegrator {
    index: Arc<MediaIndex>,
    matcher: Arc<AiMatcher>,
    breaker: Arc<CircuitBreaker>,
    status: Arc<AiStatus>,
    model: String,
    /// Mirrors `AiConfig.enabled`. When false the whole pipeline below the
    /// layered parser is skipped (spec §4.4 step 1).
    enabled: bool,
    ai_permits: Arc<Semaphore>,
    cache_permits: Arc<Semaphore>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<SharedOutcome>>>>,
}

impl AiIntegrator {
    pub fn new(
        index: Arc<MediaIndex>,
        matcher: Arc<AiMatcher>,
        breaker: Arc<CircuitBreaker>,
        status: Arc<AiStatus>,
        model: String,
        enabled: bool,
    ) -> Self {
        Self {
            index,
            matcher,
            breaker,
            status,
            model,
            enabled,
            ai_permits: Arc::new(Semaphore::new(AI_CALL_CONCURRENCY)),
            cache_permits: Arc::new(Semaphore::new(CACHE_WARM_CONCURRENCY)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the layered parser, then the AI fallback pipeline as needed.
    pub async fn enhance_filename(
        &self,
        filename: &str,
        hint: LibraryHint,
    ) -> crate::error::Result<EnhancementOutcome> {
        let parsed = parse::parse(filename, hint).unwrap_or_else(|| unresolved_fallback(filename, hint));

        if !self.enabled {
            return Ok(EnhancementOutcome::FastPath(parsed));
        }

        let kind = MediaKind::from_parsed_kind(parsed.kind);
        let cache = ParseCache::new(&self.index);

        if let Some(entry) = cache.get(filename, kind, &self.model).await? {
            self.status.record_cache_hit();
            let mut cached = parsed.clone();
            cached.title = entry.title;
            cached.year = entry.year;
            cached.season = entry.season;
            return Ok(EnhancementOutcome::CacheHit(cached, entry.confidence));
        }
        self.status.record_cache_miss();

        let parser_confidence = parse::parse_confidence(&parsed, filename);
        if parser_confidence >= CONFIDENCE_FAST_PATH_THRESHOLD {
            debug!(filename, parser_confidence, "parser fast path accepted");
            self.spawn_cache_warm(filename, kind, &parsed, parser_confidence);
            return Ok(EnhancementOutcome::FastPath(parsed));
        }

        if !self.breaker.allow() {
            info!(filename, "ai circuit breaker open, queuing for retry");
            self.enqueue_background(filename, &parsed).await?;
            return Ok(EnhancementOutcome::QueuedForRetry(parsed));
        }

        match self.call_with_single_flight(filename).await {
            Ok((ai_parsed, confidence)) => {
                cache
                    .put(filename, kind, &self.model, &ai_parsed, confidence, 0)
                    .await?;
                Ok(EnhancementOutcome::AiEnhanced(ai_parsed, confidence))
            }
            Err(_) => {
                warn!(filename, "ai enhancement failed, falling back to parser result");
                self.enqueue_background(filename, &parsed).await?;
                Ok(EnhancementOutcome::QueuedForRetry(parsed))
            }
        }
    }

    /// De-duplicates concurrent requests for the same normalized filename:
    /// only the first caller actually hits the network; the rest await its
    /// result.
    async fn call_with_single_flight(
        &self,
        filename: &str,
    ) -> Result<(ParsedName, f32), String> {
        let key = normalize_cache_key(filename);

        let cell = {
            let mut map = self.in_flight.lock().expect("in_flight mutex poisoned");
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = cell.get_or_init(|| self.perform_ai_call(filename)).await;

        {
            let mut map = self.in_flight.lock().expect("in_flight mutex poisoned");
            map.remove(&key);
        }

        outcome.result.clone()
    }

    async fn perform_ai_call(&self, filename: &str) -> SharedOutcome {
        let _permit = self.ai_permits.acquire().await;
        let started = Instant::now();
        let result = self.matcher.enhance(&self.model, filename).await;

        let outcome = match result {
            Ok(ai) => {
                self.breaker.record_success();
                self.status.record_success(started.elapsed());
                match validate_ai_result(&ai.parsed) {
                    Ok(()) => Ok((ai.parsed, ai.confidence)),
                    Err(reason) => Err(reason),
                }
            }
            Err(err) => {
                self.status.record_failure(started.elapsed());
                if matches!(err, MatcherError::Network(_) | MatcherError::Http(_)) {
                    self.breaker.record_failure();
                }
                Err(err.to_string())
            }
        };

        SharedOutcome { result: outcome }
    }

    async fn enqueue_background(&self, filename: &str, parsed: &ParsedName) -> crate::error::Result<()> {
        let item = AiImprovement {
            request_id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            user_title: parsed.title.clone(),
            user_type: MediaKind::from_parsed_kind(parsed.kind),
            user_year: parsed.year,
            ai_title: None,
            ai_type: None,
            ai_year: None,
            ai_confidence: None,
            status: QueueStatus::Pending,
            attempts: 0,
            error: None,
            model: self.model.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        self.index.enqueue_improvement(&item).await
    }

    /// Background cache-warmer (spec §4.4 step 5): a fast-path hit is never
    /// worth blocking the caller on, but it's still worth persisting so a
    /// later lookup of the same filename is a cache hit instead of another
    /// fast-path parse. Skipped entirely, not queued, when the warm-semaphore
    /// is already full.
    fn spawn_cache_warm(&self, filename: &str, kind: MediaKind, parsed: &ParsedName, confidence: f32) {
        let permit = match Arc::clone(&self.cache_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let index = Arc::clone(&self.index);
        let model = self.model.clone();
        let filename = filename.to_string();
        let parsed = parsed.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let cache = ParseCache::new(&index);
            if let Err(err) = cache.put(&filename, kind, &model, &parsed, confidence, 0).await {
                warn!(filename, error = %err, "cache warm task failed");
            }
        });
    }
}

/// When the layered parser can't extract even a title, route straight to
/// the AI fallback: a bare-filename "parse" with zero confidence, never
/// trusted by the fast path.
fn unresolved_fallback(filename: &str, hint: LibraryHint) -> ParsedName {
    let kind = match hint {
        LibraryHint::TvShows => crate::parse::ParsedKind::Episode,
        _ => crate::parse::ParsedKind::Movie,
    };
    ParsedName {
        kind,
        title: filename.to_string(),
        year: None,
        season: None,
        episodes: vec![],
        absolute_episode: None,
        air_date: None,
        resolution: None,
        source: None,
        codec: None,
        audio: None,
        release_group: None,
    }
}

/// Validation gate (spec §4.4 step 8): an AI response with an empty title,
/// an implausible year, or a TV result lacking any episode identifier is
/// rejected rather than trusted.
fn validate_ai_result(parsed: &ParsedName) -> Result<(), String> {
    if parsed.title.trim().is_empty() {
        return Err("ai result has an empty title".to_string());
    }
    if let Some(year) = parsed.year {
        if !(1880..=2100).contains(&year) {
            return Err(format!("ai result has an implausible year: {year}"));
        }
    }
    if parsed.kind == crate::parse::ParsedKind::Episode
        && parsed.season.is_none()
        && parsed.primary_episode().is_none()
    {
        return Err("ai result claims tv but has no season/episode".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_title() {
        let parsed = ParsedName {
            kind: crate::parse::ParsedKind::Movie,
            title: "  ".to_string(),
            year: None,
            season: None,
            episodes: vec![],
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        };
        assert!(validate_ai_result(&parsed).is_err());
    }

    #[test]
    fn rejects_implausible_year() {
        let parsed = ParsedName {
            kind: crate::parse::ParsedKind::Movie,
            title: "Dracula".to_string(),
            year: Some(3000),
            season: None,
            episodes: vec![],
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        };
        assert!(validate_ai_result(&parsed).is_err());
    }

    #[test]
    fn rejects_tv_without_episode_identifier() {
        let parsed = ParsedName {
            kind: crate::parse::ParsedKind::Episode,
            title: "Show".to_string(),
            year: None,
            season: None,
            episodes: vec![],
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        };
        assert!(validate_ai_result(&parsed).is_err());
    }

    #[test]
    fn accepts_well_formed_movie() {
        let parsed = ParsedName {
            kind: crate::parse::ParsedKind::Movie,
            title: "Dracula".to_string(),
            year: Some(2020),
            season: None,
            episodes: vec![],
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        };
        assert!(validate_ai_result(&parsed).is_ok());
    }
}

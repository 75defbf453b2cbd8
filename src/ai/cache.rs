//! Thin client over the Index's parse-cache table (spec §4.4 steps 4 & 10).
//! Owns cache-key normalization; the Index itself is agnostic to what a key
//! "means".

use crate::error::Result;
use crate::index::{MediaIndex, MediaKind, ParseCacheEntry};
use crate::parse::ParsedName;
use chrono::Utc;

/// Normalizes a filename into the form used as the cache key: lowercased,
/// whitespace collapsed, extension stripped. Two filenames that differ only
/// in case or a trailing container extension hit the same cache entry.
pub fn normalize_cache_key(filename: &str) -> String {
    let without_ext = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };
    without_ext
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ParseCache<'a> {
    index: &'a MediaIndex,
}

impl<'a> ParseCache<'a> {
    pub fn new(index: &'a MediaIndex) -> Self {
        Self { index }
    }

    pub async fn get(
        &self,
        filename: &str,
        kind: MediaKind,
        model: &str,
    ) -> Result<Option<ParseCacheEntry>> {
        let key = normalize_cache_key(filename);
        let entry = self.index.get_cache_entry(&key, kind, model).await?;
        if entry.is_some() {
            // Best-effort bump; failure here never fails the lookup.
            let _ = self.index.bump_cache_usage(&key, kind, model).await;
        }
        Ok(entry)
    }

    pub async fn put(
        &self,
        filename: &str,
        kind: MediaKind,
        model: &str,
        parsed: &ParsedName,
        confidence: f32,
        latency_ms: u32,
    ) -> Result<()> {
        let key = normalize_cache_key(filename);
        let entry = ParseCacheEntry {
            normalized_input: key,
            kind,
            model: model.to_string(),
            title: parsed.title.clone(),
            year: parsed.year,
            season: parsed.season,
            episode: parsed.primary_episode(),
            confidence,
            latency_ms,
            usage_count: 1,
            last_used_at: Utc::now(),
            created_at: Utc::now(),
        };
        self.index.put_cache_entry(&entry).await
    }

    pub async fn gc(&self) -> Result<u64> {
        self.index.gc_cache().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_whitespace_and_extension() {
        assert_eq!(
            normalize_cache_key("The.Show S01E02.mkv"),
            normalize_cache_key("the.show s01e02.MKV")
        );
    }

    #[test]
    fn strips_only_trailing_extension() {
        assert_eq!(normalize_cache_key("Show.2020.mkv"), "show.2020");
    }
}

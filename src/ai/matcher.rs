//! Single-call HTTP client to the remote LLM `/api/generate` endpoint (spec
//! §4.3, wire contract in §6). Owns no retry policy — that is the
//! Integrator's job (spec §4.4 step 8).

use crate::parse::{ParsedKind, ParsedName};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("http error: status {0}")]
    Http(reqwest::StatusCode),

    #[error("response could not be decoded: {0}")]
    Decode(String),

    #[error("response failed validation: {0}")]
    Validation(String),
}

/// System prompt fixed at build time: describes the target JSON shape and
/// every marker the model should strip from the title.
const SYSTEM_PROMPT: &str = r#"You are a media filename parser. Given a video filename, extract the title, \
year, media type, and (for TV) season/episode information. Strip all quality, \
codec, source, audio, and release-group markers from the title. Respond with \
JSON only: {"title": string, "year": number|null, "type": "movie"|"tv", \
"season": number|null, "episodes": [number]|null, "absolute_episode": number|null, \
"air_date": string|null, "confidence": number}."#;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)]
    model: String,
    #[allow(dead_code)]
    done: bool,
}

/// Tolerant wrapper: the model may emit a year as a number, a numeric
/// string, or omit it. This is exactly the boundary spec §9 calls out
/// between the tolerant wire form and the strict internal form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlexYear {
    Int(u16),
    Str(String),
    Null,
}

impl FlexYear {
    fn into_option(self) -> Option<u16> {
        match self {
            FlexYear::Int(y) => Some(y),
            FlexYear::Str(s) => s.trim().parse().ok(),
            FlexYear::Null => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlexEpisodes {
    Ints(Vec<u32>),
    Strs(Vec<String>),
    Null,
}

static SXXEYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());

impl FlexEpisodes {
    fn into_episodes(self) -> Vec<u32> {
        match self {
            FlexEpisodes::Ints(v) => v,
            FlexEpisodes::Strs(v) => v
                .into_iter()
                .filter_map(|s| {
                    if let Some(caps) = SXXEYY.captures(&s) {
                        caps[2].parse().ok()
                    } else {
                        s.trim().parse().ok()
                    }
                })
                .collect(),
            FlexEpisodes::Null => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AiJsonCore {
    title: Option<String>,
    #[serde(default)]
    year: Option<FlexYear>,
    #[serde(rename = "type")]
    kind: Option<String>,
    season: Option<u32>,
    #[serde(default)]
    episodes: Option<FlexEpisodes>,
    absolute_episode: Option<u32>,
    air_date: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiResult {
    pub parsed: ParsedName,
    pub confidence: f32,
}

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
static PARTIAL_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""title"\s*:\s*"([^"]+)""#).unwrap());
static PARTIAL_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""type"\s*:\s*"(movie|tv)""#).unwrap());
static PARTIAL_CONFIDENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""confidence"\s*:\s*([0-9.]+)"#).unwrap());

/// Cap applied to confidence recovered from a partial/prose-wrapped parse —
/// never treated as fully trustworthy.
const PARTIAL_CONFIDENCE_CAP: f32 = 0.8;

pub struct AiMatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl AiMatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub async fn enhance(
        &self,
        model: &str,
        filename: &str,
    ) -> Result<AiResult, MatcherError> {
        let prompt = format!("{SYSTEM_PROMPT}\n\nFilename: {filename}");
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MatcherError::Http(response.status()));
        }

        let body: GenerateResponse = response.json().await?;
        parse_model_response(&body.response)
    }
}

fn parse_model_response(raw: &str) -> Result<AiResult, MatcherError> {
    let candidate = extract_json_fenced(raw).unwrap_or_else(|| raw.trim().to_string());

    match serde_json::from_str::<AiJsonCore>(&candidate) {
        Ok(core) => core_to_result(core, 1.0),
        Err(decode_err) => {
            // Tolerate a surrounding prose wrapper by regex-extracting a
            // partial result, capped confidence.
            match (PARTIAL_TITLE.captures(raw), PARTIAL_TYPE.captures(raw)) {
                (Some(title_caps), Some(type_caps)) => {
                    let confidence = PARTIAL_CONFIDENCE
                        .captures(raw)
                        .and_then(|c| c[1].parse::<f32>().ok())
                        .unwrap_or(PARTIAL_CONFIDENCE_CAP)
                        .min(PARTIAL_CONFIDENCE_CAP);
                    let core = AiJsonCore {
                        title: Some(title_caps[1].to_string()),
                        year: None,
                        kind: Some(type_caps[1].to_string()),
                        season: None,
                        episodes: None,
                        absolute_episode: None,
                        air_date: None,
                        confidence: Some(confidence),
                    };
                    core_to_result(core, confidence)
                }
                _ => Err(MatcherError::Decode(decode_err.to_string())),
            }
        }
    }
}

fn extract_json_fenced(raw: &str) -> Option<String> {
    JSON_FENCE.captures(raw).map(|c| c[1].to_string())
}

fn core_to_result(core: AiJsonCore, fallback_confidence: f32) -> Result<AiResult, MatcherError> {
    let title = core
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| MatcherError::Validation("response lacks a title".to_string()))?;

    let kind = match core.kind.as_deref() {
        Some("movie") => ParsedKind::Movie,
        Some("tv") => ParsedKind::Episode,
        _ => return Err(MatcherError::Validation("response lacks a valid type".to_string())),
    };

    let year = core.year.and_then(|y| y.into_option());
    let episodes = core.episodes.map(|e| e.into_episodes()).unwrap_or_default();
    let air_date = core
        .air_date
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

    let parsed = ParsedName {
        kind,
        title,
        year,
        season: core.season,
        episodes,
        absolute_episode: core.absolute_episode,
        air_date,
        resolution: None,
        source: None,
        codec: None,
        audio: None,
        release_group: None,
    };

    Ok(AiResult {
        parsed,
        confidence: core.confidence.unwrap_or(fallback_confidence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let raw = r#"{"title":"Dracula","type":"tv","season":1,"episodes":[1],"year":2020,"confidence":0.94}"#;
        let result = parse_model_response(raw).unwrap();
        assert_eq!(result.parsed.title, "Dracula");
        assert_eq!(result.parsed.year, Some(2020));
        assert_eq!(result.parsed.episodes, vec![1]);
        assert_eq!(result.confidence, 0.94);
    }

    #[test]
    fn tolerates_code_fence() {
        let raw = "```json\n{\"title\":\"Dracula\",\"type\":\"movie\",\"confidence\":0.9}\n```";
        let result = parse_model_response(raw).unwrap();
        assert_eq!(result.parsed.title, "Dracula");
    }

    #[test]
    fn tolerates_string_year_and_episode_strings() {
        let raw = r#"{"title":"Show","type":"tv","year":"2020","episodes":["S01E03"],"confidence":0.7}"#;
        let result = parse_model_response(raw).unwrap();
        assert_eq!(result.parsed.year, Some(2020));
        assert_eq!(result.parsed.episodes, vec![3]);
    }

    #[test]
    fn recovers_partial_result_from_prose_wrapper_with_capped_confidence() {
        let raw = "Sure, here's the result: {\"title\": \"Dracula\", \"type\": \"tv\", \"confidence\": 0.99} Let me know if you need anything else!";
        let result = parse_model_response(raw).unwrap();
        assert_eq!(result.parsed.title, "Dracula");
        assert!(result.confidence <= PARTIAL_CONFIDENCE_CAP);
    }

    #[test]
    fn missing_title_is_validation_error() {
        let raw = r#"{"type":"movie","confidence":0.5}"#;
        let err = parse_model_response(raw).unwrap_err();
        assert!(matches!(err, MatcherError::Validation(_)));
    }
}

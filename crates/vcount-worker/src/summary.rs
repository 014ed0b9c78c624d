//! Interval summaries.
//!
//! A `Summarizer` turns one interval into a short natural-language
//! description. Summaries are best effort: a failed interval keeps
//! `ai_summary` absent and the run carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vcount_models::{format_count, Interval};

use crate::error::{SummaryError, SummaryResult};

/// Default Gemini REST endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Models tried in order until one answers.
pub const DEFAULT_GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.0-flash"];

/// Produces a summary for one interval.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, interval: &Interval, interval_seconds: u32) -> SummaryResult<String>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            models: DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Read `GEMINI_API_KEY`; `None` disables summaries.
    ///
    /// `GEMINI_BASE_URL` and a comma-separated `GEMINI_MODELS` override the
    /// defaults.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(api_key);

        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        Some(config)
    }
}

/// Gemini `generateContent` request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Summarizer backed by the Gemini REST API.
pub struct GeminiSummarizer {
    config: GeminiConfig,
    client: Client,
}

impl GeminiSummarizer {
    pub fn new(config: GeminiConfig) -> SummaryResult<Self> {
        if config.models.is_empty() {
            return Err(SummaryError::Config("no Gemini models configured".into()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SummaryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(models = ?config.models, "Gemini summaries enabled");
        Ok(Self { config, client })
    }

    async fn call_gemini_api(&self, model: &str, prompt: &str) -> SummaryResult<String> {
        let url = format!("{}/models/{}:generateContent", self.config.base_url, model);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummaryError::request(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::Status { status, body });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::request(format!("Failed to parse Gemini response: {}", e)))?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(SummaryError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, interval: &Interval, interval_seconds: u32) -> SummaryResult<String> {
        let prompt = build_prompt(interval, interval_seconds);
        let mut last_error = None;

        for model in &self.config.models {
            debug!(model = %model, interval = interval.index, "Requesting interval summary");
            match self.call_gemini_api(model, &prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(SummaryError::EmptyResponse))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Prompt describing one interval's detections.
pub fn build_prompt(interval: &Interval, interval_seconds: u32) -> String {
    let objects = if interval.objects_detected.is_empty() {
        "none".to_string()
    } else {
        interval
            .objects_detected
            .iter()
            .map(|(label, count)| format!("{}: {}", label, format_count(*count)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let minutes = format_count(f64::from(interval_seconds) / 60.0);

    format!(
        "Analyze this object detection data from a {minutes}-minute video interval:\n\n\
         Objects detected: {objects}\n\
         Total count: {total}\n\
         Timestamp: {timestamp}s\n\
         Alert raised: {alert}\n\n\
         Please provide a brief summary of the activity level and any notable patterns or observations.\n\
         Keep it concise and professional.",
        total = format_count(interval.total_count),
        timestamp = format_count(interval.timestamp),
        alert = if interval.alert { "yes" } else { "no" },
    )
}

/// Summarize every interval with at most `parallel` requests in flight.
///
/// Summaries are attached by interval index; failures leave `ai_summary`
/// absent. `on_done` receives the number of intervals attempted so far.
pub async fn summarize_all<F>(
    summarizer: Arc<dyn Summarizer>,
    intervals: &mut [Interval],
    interval_seconds: u32,
    parallel: usize,
    mut on_done: F,
) -> usize
where
    F: FnMut(u32) + Send,
{
    let snapshots: Vec<Interval> = intervals.to_vec();

    let mut results = stream::iter(snapshots.into_iter().enumerate())
        .map(|(slot, interval)| {
            let summarizer = Arc::clone(&summarizer);
            async move {
                let result = summarizer.summarize(&interval, interval_seconds).await;
                (slot, result)
            }
        })
        .buffer_unordered(parallel.max(1));

    let mut attempted = 0u32;
    let mut succeeded = 0usize;
    while let Some((slot, result)) = results.next().await {
        attempted += 1;
        match result {
            Ok(text) => {
                intervals[slot].ai_summary = Some(text);
                succeeded += 1;
            }
            Err(e) => {
                counter!("vcount_summary_failures_total").increment(1);
                warn!(interval = intervals[slot].index, error = %e, "Summary generation failed");
            }
        }
        on_done(attempted);
    }

    succeeded
}

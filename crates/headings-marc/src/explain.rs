//! Advisory explanations attached after a field has been built.
//!
//! Explanations never change the deterministic part of a field: a disabled,
//! failing or slow explainer leaves `explanation` empty.
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use headings_core::config::ExplanationSettings;
use headings_core::{AuthorityCandidate, Error, Explainer, Result, SubjectField};

/// Template explanation from the match score alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreExplainer;

#[async_trait]
impl Explainer for ScoreExplainer {
    async fn explain(&self, _topic: &str, candidate: &AuthorityCandidate, _field: &SubjectField) -> Result<String> {
        Ok(format!("Match score: {:.2}", candidate.score))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

const SYSTEM_PROMPT: &str = "You are a library cataloger. Explain in one sentence why a subject heading \
fits a topic found in a work. Do not restate the heading's MARC coding.";

/// Asks an OpenAI-compatible chat-completions endpoint for a one-sentence
/// justification.
#[derive(Clone)]
pub struct ChatExplainer {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatExplainer {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing explanation API key");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).context("invalid API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build chat HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &ExplanationSettings) -> anyhow::Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .context("explanation.api_key or OPENAI_API_KEY must be set to enable explanations")?;
        Self::new(&api_key, &settings.base_url, &settings.model, settings.timeout())
    }
}

pub(crate) fn user_prompt(topic: &str, candidate: &AuthorityCandidate, field: &SubjectField) -> String {
    format!(
        "Topic: {topic}\nHeading ({vocab}): {heading}\nField: {field}\nScore: {score:.2}",
        vocab = candidate.vocabulary_code,
        heading = field.heading,
        score = candidate.score,
    )
}

#[async_trait]
impl Explainer for ChatExplainer {
    async fn explain(&self, topic: &str, candidate: &AuthorityCandidate, field: &SubjectField) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system".into(), content: SYSTEM_PROMPT.into() },
                ChatMessage { role: "user".into(), content: user_prompt(topic, candidate, field) },
            ],
            temperature: 0.2,
            max_tokens: 120,
            stream: false,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Explanation(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Explanation(format!("chat request failed ({status}): {body}")));
        }
        let parsed: ChatCompletionResponse =
            resp.json().await.map_err(|e| Error::Explanation(format!("unparseable response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::Explanation("empty completion".into()))
    }
}

/// Attach an explanation to an already built field. Any failure or a
/// timeout leaves the field exactly as it was.
pub async fn attach_explanation(
    mut field: SubjectField,
    topic: &str,
    candidate: &AuthorityCandidate,
    explainer: &dyn Explainer,
    timeout: Duration,
) -> SubjectField {
    match tokio::time::timeout(timeout, explainer.explain(topic, candidate, &field)).await {
        Ok(Ok(text)) => {
            debug!(heading = %field.heading, "explanation attached");
            field.explanation = text;
        }
        Ok(Err(e)) => warn!(heading = %field.heading, error = %e, "explanation failed, leaving it empty"),
        Err(_) => warn!(heading = %field.heading, ?timeout, "explanation timed out"),
    }
    field
}

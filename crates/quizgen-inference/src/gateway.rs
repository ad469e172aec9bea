//! HTTP client for the AI gateway.
//!
//! One backend serves both topic analysis and question generation. Gateway
//! error texts (e.g. "AI topic analysis is temporarily unavailable") are
//! surfaced verbatim as `Error::Upstream`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use quizgen_core::{
    AnalysisBackend, AnalyzedTopic, Difficulty, Error, GenerationBackend, GenerationCall,
    QuestionDraft, RegenerationCall, Result,
};

use crate::config::GatewayConfig;
use crate::parse::{normalize_content, strip_fences};
use crate::wire::*;

/// Answer-key requests carry a short question name alongside the text.
const KEY_QUESTION_NAME_CHARS: usize = 80;

/// Gateway `/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    #[serde(default)]
    pub gateway_configured: bool,
}

impl GatewayHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// AI gateway backend.
pub struct GatewayBackend {
    client: Client,
    config: GatewayConfig,
}

impl GatewayBackend {
    /// Create a new gateway backend with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gateway",
            url = %config.base_url,
            quality = %config.quality,
            "Initializing AI gateway backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    /// Check gateway liveness.
    pub async fn health(&self) -> Result<GatewayHealth> {
        let response = self
            .authorize(self.client.get(self.url("/health")))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("AI gateway is unreachable: {}", e)))?;
        Self::read_json(response).await
    }

    /// POST a body and return the normalized `content` value.
    async fn call<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value> {
        let start = Instant::now();
        let response = self
            .authorize(self.client.post(self.url(endpoint)))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    op = endpoint,
                    error = %e,
                    "Gateway request failed"
                );
                if e.is_timeout() {
                    Error::Upstream(format!("AI gateway timed out calling {}", endpoint))
                } else {
                    Error::Upstream(format!("AI gateway request to {} failed: {}", endpoint, e))
                }
            })?;

        let envelope: GatewayResponse = Self::read_json(response).await?;
        debug!(
            subsystem = "inference",
            component = "gateway",
            op = endpoint,
            duration_ms = start.elapsed().as_millis() as u64,
            "Gateway call complete"
        );
        Ok(envelope.content)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<GatewayError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("AI gateway returned HTTP {}", status.as_u16()));
            return Err(Error::Upstream(message));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::Upstream(format!("AI gateway returned malformed JSON: {}", e)))
    }

    /// Pull a named field out of structured (or stringified) content.
    fn field<T: DeserializeOwned>(content: Value, key: &str) -> Result<T> {
        let parsed = normalize_content(content)
            .ok_or_else(|| Error::Upstream("AI response parsing failed".to_string()))?;
        let value = parsed
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Upstream(format!("AI response is missing '{}'", key)))?;
        serde_json::from_value(value)
            .map_err(|e| Error::Upstream(format!("AI response field '{}' is invalid: {}", key, e)))
    }
}

fn distribution<K: Copy + Ord>(
    map: &BTreeMap<K, u32>,
    name: impl Fn(K) -> &'static str,
) -> BTreeMap<&'static str, u32> {
    map.iter().map(|(k, v)| (name(*k), *v)).collect()
}

/// Most likely difficulty for a slot, used when the model omits one.
fn dominant_difficulty(call: &GenerationCall) -> Difficulty {
    call.difficulty_distribution
        .iter()
        .max_by_key(|(d, pct)| (**pct, std::cmp::Reverse(**d)))
        .map(|(d, _)| *d)
        .unwrap_or(Difficulty::Medium)
}

#[async_trait]
impl AnalysisBackend for GatewayBackend {
    async fn analyze(&self, content: &str) -> Result<Vec<AnalyzedTopic>> {
        let body = GatewayRequest {
            quality: &self.config.quality,
            payload: AnalyzePayload { content },
        };
        let raw: Vec<Value> = Self::field(self.call("/analyze_topics", &body).await?, "topics")?;

        let total = raw.len();
        let topics: Vec<AnalyzedTopic> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if topics.len() < total {
            debug!(
                subsystem = "inference",
                component = "gateway",
                op = "analyze",
                dropped = total - topics.len(),
                "Skipped malformed topics"
            );
        }
        Ok(topics)
    }
}

#[async_trait]
impl GenerationBackend for GatewayBackend {
    async fn generate(&self, call: &GenerationCall) -> Result<Vec<QuestionDraft>> {
        let body = GatewayRequest {
            quality: &self.config.quality,
            payload: GeneratePayload {
                topic_title: &call.topic_title,
                topic_content: &call.topic_content,
                question_types: vec![call.question_type.as_str(); call.count as usize],
                difficulty_distribution: distribution(&call.difficulty_distribution, |d| {
                    d.as_str()
                }),
                blooms_distribution: distribution(&call.cognitive_distribution, |c| c.as_str()),
                num_questions: call.count,
                existing_questions: &call.avoid,
                is_regeneration: false,
                old_question_text: "",
            },
        };
        let questions: Vec<WireQuestion> =
            Self::field(self.call("/generate_questions", &body).await?, "questions")?;

        let fallback = dominant_difficulty(call);
        Ok(questions
            .into_iter()
            .map(|q| q.into_draft(call.question_type, fallback))
            .collect())
    }

    async fn regenerate(&self, call: &RegenerationCall) -> Result<QuestionDraft> {
        let previous = &call.previous;
        let body = GatewayRequest {
            quality: &self.config.quality,
            payload: RefinePayload {
                existing_question: &previous.body,
                topic_title: &call.topic_title,
                topic_content: &call.topic_content,
                question_type: previous.question_type.as_str(),
                difficulty: previous.difficulty.as_str(),
            },
        };
        let question: WireQuestion =
            Self::field(self.call("/refine_question", &body).await?, "question")?;
        Ok(question.into_draft(previous.question_type, previous.difficulty))
    }

    async fn generate_distractors(
        &self,
        question_text: &str,
        correct_answer: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<String>> {
        let body = GatewayRequest {
            quality: &self.config.quality,
            payload: DistractorPayload {
                question_text,
                correct_answer,
                difficulty: difficulty.as_str(),
                num_distractors: count,
            },
        };
        let distractors: Vec<WireDistractor> =
            Self::field(self.call("/generate_distractors", &body).await?, "distractors")?;

        Ok(distractors
            .into_iter()
            .map(|d| d.into_text().trim().to_string())
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(correct_answer.trim()))
            .take(count)
            .collect())
    }

    async fn generate_answer_key(&self, question_text: &str) -> Result<String> {
        let name: String = question_text.chars().take(KEY_QUESTION_NAME_CHARS).collect();
        let body = AnswerKeyRequest {
            quality: &self.config.quality,
            question: &name,
            question_text,
        };
        let key = match self.call("/generate_key", &body).await? {
            Value::String(text) => strip_fences(&text),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if key.is_empty() {
            return Err(Error::Upstream("AI returned an empty answer key".to_string()));
        }
        Ok(key)
    }

    fn name(&self) -> &str {
        "gateway"
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::ServiceError;

/// Text completion collaborator. `grammar` is an optional structural
/// constraint (a JSON Schema document); implementations that cannot honor
/// it still satisfy the contract because the planner retries on parse
/// failure.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        grammar: Option<&Value>,
        deadline: Instant,
    ) -> Result<String, ServiceError>;
}

/// Client for a llama-server compatible `/completion` endpoint.
pub struct LlamaServerClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    stream: bool,
    n_predict: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<&'a Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

impl LlamaServerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for LlamaServerClient {
    async fn complete(
        &self,
        prompt: &str,
        grammar: Option<&Value>,
        deadline: Instant,
    ) -> Result<String, ServiceError> {
        let budget = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO);
        if budget.is_zero() {
            return Err(ServiceError::Timeout);
        }

        let body = CompletionRequest {
            prompt,
            stream: false,
            n_predict: 256,
            temperature: 0.4,
            json_schema: grammar,
        };

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .timeout(budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout
                } else {
                    ServiceError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::Unavailable(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        Ok(parsed.content.trim().to_string())
    }
}

/// Deterministic model for tests and offline mode: pops pre-loaded
/// completions in order, then reports itself unavailable.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        _prompt: &str,
        _grammar: Option<&Value>,
        _deadline: Instant,
    ) -> Result<String, ServiceError> {
        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        responses
            .pop_front()
            .ok_or_else(|| ServiceError::Unavailable("scripted model exhausted".into()))
    }
}

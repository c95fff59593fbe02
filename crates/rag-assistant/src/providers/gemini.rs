//! Gemini API client for embeddings and answer generation
//!
//! Talks to the public Generative Language REST API with an API key. One
//! `GeminiClient` (HTTP pool, timeout, retry policy) is shared by the
//! embedder and the generator.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{Credentials, EmbeddingConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::providers::embedding::EmbeddingProvider;
use crate::providers::llm::{GenerationParams, LlmProvider};

/// Upper bound the API accepts for one batchEmbedContents call
const MAX_EMBED_BATCH: usize = 100;

/// First retry delay; doubles per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Backoff stops growing after this many doublings (32s)
const MAX_BACKOFF_DOUBLINGS: u32 = 5;

/// Shared HTTP client for the Gemini API
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    max_retries: u32,
    retry_base_delay: Duration,
}

/// A failed attempt, tagged with whether another attempt may succeed
struct AttemptError {
    error: Error,
    retryable: bool,
}

impl AttemptError {
    fn transient(error: Error) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Rate limiting and server-side failures are retried; other statuses are final
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl GeminiClient {
    /// Create a client with the configured timeout and retry policy
    pub fn new(credentials: Credentials, config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries: config.max_retries,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    /// `{base}/models/{model}:{method}`
    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model_path(model), method)
    }

    /// Check that the API key is accepted
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self
            .http
            .get(&url)
            .header("x-goog-api-key", self.credentials.api_key())
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// POST `body` as JSON and decode the response, retrying failures
    async fn post_json<Req, Resp>(
        &self,
        url: &str,
        body: &Req,
        to_error: fn(String) -> Error,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        self.retry_request(|| async move {
            let response = self
                .http
                .post(url)
                .header("x-goog-api-key", self.credentials.api_key())
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    AttemptError::transient(to_error(format!("Gemini request failed: {}", e)))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = to_error(format!("Gemini returned {}: {}", status, body));
                return Err(if is_retryable_status(status) {
                    AttemptError::transient(error)
                } else {
                    AttemptError::fatal(error)
                });
            }

            response.json::<Resp>().await.map_err(|e| {
                AttemptError::fatal(to_error(format!("Failed to parse Gemini response: {}", e)))
            })
        })
        .await
    }

    /// Retry transient failures with exponential backoff (1s, 2s, 4s, ... capped at 32s)
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt.min(MAX_BACKOFF_DOUBLINGS));
                    tracing::warn!(
                        "Gemini request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        delay,
                        failure.error
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

/// Prefix bare model names with `models/`
pub fn model_path(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String> {
        let feedback = self.prompt_feedback;
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(match feedback {
                Some(feedback) => Error::llm(format!("Gemini returned no text: {}", feedback)),
                None => Error::llm("No text in Gemini response"),
            });
        }

        Ok(text)
    }
}

/// Gemini embedding provider (`models/embedding-001` by default)
pub struct GeminiEmbedder {
    client: Arc<GeminiClient>,
    model: String,
    batch_size: usize,
}

impl GeminiEmbedder {
    pub fn new(client: Arc<GeminiClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: model_path(&config.model),
            batch_size: config.batch_size.clamp(1, MAX_EMBED_BATCH),
        }
    }

    fn request(&self, text: &str, task_type: &'static str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            content: Content::text(None, text),
            task_type,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.client.endpoint(&self.model, "embedContent");
        let request = self.request(text, "RETRIEVAL_QUERY");

        let response: EmbedResponse = self
            .client
            .post_json(&url, &request, Error::Embedding)
            .await?;

        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.client.endpoint(&self.model, "batchEmbedContents");
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request(text, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };

            let response: BatchEmbedResponse = self
                .client
                .post_json(&url, &request, Error::Embedding)
                .await?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Gemini returned {} embeddings for {} texts",
                    response.embeddings.len(),
                    batch.len()
                )));
            }

            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
            tracing::debug!("Embedded {}/{} texts", embeddings.len(), texts.len());
        }

        Ok(embeddings)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Gemini text generation provider
pub struct GeminiLlm {
    client: Arc<GeminiClient>,
}

impl GeminiLlm {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = self.client.endpoint(&params.model, "generateContent");
        let request = GenerateRequest {
            contents: vec![Content::text(Some("user"), prompt)],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response: GenerateResponse = self.client.post_json(&url, &request, Error::Llm).await?;
        response.into_text()
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client() -> GeminiClient {
        let config = ProviderConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            ..ProviderConfig::default()
        };
        GeminiClient::new(Credentials::new("test-key").unwrap(), &config).unwrap()
    }

    #[test]
    fn test_model_path() {
        assert_eq!(model_path("gemini-1.5-pro"), "models/gemini-1.5-pro");
        assert_eq!(model_path("models/embedding-001"), "models/embedding-001");
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint("gemini-1.5-pro", "generateContent"),
            "https://example.test/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_embed_request_shape() {
        let embedder = GeminiEmbedder::new(Arc::new(client()), &EmbeddingConfig::default());
        let value = serde_json::to_value(embedder.request("hello", "RETRIEVAL_QUERY")).unwrap();
        assert_eq!(value["model"], "models/embedding-001");
        assert_eq!(value["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(value["content"]["parts"][0]["text"], "hello");
        assert!(value["content"].get("role").is_none());
    }

    #[test]
    fn test_generate_response_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Paris "},{"text":"is the capital."}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Paris is the capital.");
    }

    #[test]
    fn test_blocked_prompt_is_an_error() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    fn instant_retry_client(max_retries: u32) -> GeminiClient {
        let config = ProviderConfig {
            max_retries,
            ..ProviderConfig::default()
        };
        let mut client = GeminiClient::new(Credentials::new("test-key").unwrap(), &config).unwrap();
        client.retry_base_delay = Duration::ZERO;
        client
    }

    #[test]
    fn test_retryable_statuses() {
        use reqwest::StatusCode;
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let client = instant_retry_client(3);
        let calls = AtomicU32::new(0);

        let result: Result<()> = client
            .retry_request(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::fatal(Error::llm("Gemini returned 401"))) }
            })
            .await;

        assert!(matches!(result, Err(Error::Llm(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = instant_retry_client(3);
        let calls = AtomicU32::new(0);

        let result = client
            .retry_request(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AttemptError::transient(Error::llm("Gemini returned 503")))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let client = instant_retry_client(2);
        let calls = AtomicU32::new(0);

        let result: Result<()> = client
            .retry_request(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::transient(Error::embedding("Gemini returned 429"))) }
            })
            .await;

        assert!(matches!(result, Err(Error::Embedding(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

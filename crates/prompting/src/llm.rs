use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Request/response wrapper around an Ollama compatible
/// `/api/generate` endpoint, one call per work item.
#[derive(Clone)]
pub struct InferenceClient {
    base_url: String,
    model: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    format: &'a str, // "json" for structured output
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference envelope unreadable: {0}")]
    Envelope(String),

    #[error("inference client could not be built: {0}")]
    Build(#[source] reqwest::Error),
}

impl InferenceError {
    /// Worth another attempt: connection problems, timeouts, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_) | InferenceError::Timeout(_) => true,
            InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
            InferenceError::Envelope(_) | InferenceError::Build(_) => false,
        }
    }
}

impl InferenceClient {
    pub fn new(
        base_url: String,
        model: String,
        timeout: Option<Duration>,
    ) -> Result<Self, InferenceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
            client: builder.build().map_err(InferenceError::Build)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one prompt and return the model's raw `response` text
    pub async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            format: "json", // Force JSON output
            prompt,
            stream: false,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending prompt to LLM");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "LLM request failed");
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let envelope: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::Envelope(e.to_string()))?;

        Ok(envelope.response)
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        match (err.is_timeout(), self.timeout) {
            (true, Some(timeout)) => InferenceError::Timeout(timeout),
            _ => InferenceError::Transport(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_infer_sends_fixed_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(json!({
                "model": "llama3:8b",
                "format": "json",
                "prompt": "rate DB00001",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3:8b",
                "response": "{\"rating\": 0.2, \"reason_rating\": \"weak\"}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri(), "llama3:8b".to_string(), None).unwrap();
        let raw = client.infer("rate DB00001").await.unwrap();

        assert_eq!(raw, "{\"rating\": 0.2, \"reason_rating\": \"weak\"}");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri(), "m".to_string(), None).unwrap();
        let err = client.infer("p").await.unwrap_err();

        assert!(matches!(err, InferenceError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bad_request_is_not_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("model not found"))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri(), "m".to_string(), None).unwrap();
        let err = client.infer("p").await.unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_envelope_without_response_field() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri(), "m".to_string(), None).unwrap();
        let err = client.infer("p").await.unwrap_err();

        assert!(matches!(err, InferenceError::Envelope(_)));
    }

    #[tokio::test]
    async fn test_configured_timeout_is_enforced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "{}"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(50);
        let client = InferenceClient::new(server.uri(), "m".to_string(), Some(timeout)).unwrap();
        let err = client.infer("p").await.unwrap_err();

        assert!(matches!(err, InferenceError::Timeout(t) if t == timeout));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = InferenceClient::new("http://127.0.0.1:9".to_string(), "m".to_string(), None).unwrap();
        let err = client.infer("p").await.unwrap_err();

        assert!(matches!(err, InferenceError::Transport(_)));
        assert!(err.is_transient());
    }
}

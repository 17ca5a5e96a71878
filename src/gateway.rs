//! Model provider gateway.
//!
//! [`ModelGateway`] is the single narrow seam between the pipeline and the
//! outside world: one query in, one completion text or one [`ModelError`] out.
//! All vendor-specific request shapes, headers and response parsing live in
//! [`HttpGateway`].

use crate::error::ModelError;
use crate::http_client::{HttpClient, HttpResponse};
use crate::prompt::ModelQuery;
use crate::providers::{route, Credentials, Provider, Route};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn send(&self, query: &ModelQuery) -> Result<String, ModelError>;
}

/// Sampling parameters forwarded to every provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Gateway speaking each vendor's HTTP protocol.
pub struct HttpGateway<C: HttpClient> {
    client: C,
    credentials: Credentials,
    api_base: Option<String>,
    sampling: Sampling,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl<C: HttpClient> HttpGateway<C> {
    pub fn new(
        client: C,
        credentials: Credentials,
        api_base: Option<String>,
        sampling: Sampling,
    ) -> Self {
        Self {
            client,
            credentials,
            api_base,
            sampling,
        }
    }

    fn base_url(&self, provider: Provider) -> String {
        let base = match (&self.api_base, provider) {
            (Some(base), Provider::OpenAi) => base.as_str(),
            _ => provider.default_base_url(),
        };
        base.trim_end_matches('/').to_string()
    }

    fn credential(&self, provider: Provider) -> Result<Option<&str>, ModelError> {
        if !provider.requires_credential() {
            return Ok(None);
        }
        match self.credentials.for_provider(provider) {
            Some(key) => Ok(Some(key)),
            None => Err(ModelError::authentication(format!(
                "no API key for provider '{}'; set {}",
                provider,
                provider.credential_vars().join(" or ")
            ))),
        }
    }

    async fn send_chat_completions(
        &self,
        route: &Route,
        query: &ModelQuery,
        key: Option<&str>,
    ) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url(route.provider));
        let body = json!({
            "model": route.model,
            "messages": [
                { "role": "system", "content": query.system },
                { "role": "user", "content": query.user }
            ],
            "temperature": self.sampling.temperature,
            "max_tokens": self.sampling.max_tokens
        });

        let auth = key.map(|k| format!("Bearer {}", k));
        let mut headers: Vec<(&str, &str)> = vec![("content-type", "application/json")];
        if let Some(auth) = auth.as_deref() {
            headers.push(("authorization", auth));
        }

        let response = self.client.post_json(&url, &headers, &body).await?;
        let parsed: ChatCompletion = parse_success(&response)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(text, &response)
    }

    async fn send_anthropic(
        &self,
        route: &Route,
        query: &ModelQuery,
        key: Option<&str>,
    ) -> Result<String, ModelError> {
        let url = format!("{}/messages", self.base_url(route.provider));
        let body = json!({
            "model": route.model,
            "max_tokens": self.sampling.max_tokens,
            "temperature": self.sampling.temperature,
            "system": query.system,
            "messages": [
                { "role": "user", "content": query.user }
            ]
        });

        let headers = [
            ("x-api-key", key.unwrap_or_default()),
            ("content-type", "application/json"),
            ("anthropic-version", "2023-06-01"),
        ];

        let response = self.client.post_json(&url, &headers, &body).await?;
        let parsed: AnthropicMessage = parse_success(&response)?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        non_empty(text, &response)
    }

    async fn send_gemini(
        &self,
        route: &Route,
        query: &ModelQuery,
        key: Option<&str>,
    ) -> Result<String, ModelError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url(route.provider),
            route.model
        );
        let body = json!({
            "systemInstruction": { "parts": [ { "text": query.system } ] },
            "contents": [
                { "role": "user", "parts": [ { "text": query.user } ] }
            ],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "maxOutputTokens": self.sampling.max_tokens
            }
        });

        let headers = [
            ("x-goog-api-key", key.unwrap_or_default()),
            ("content-type", "application/json"),
        ];

        let response = self.client.post_json(&url, &headers, &body).await?;
        let parsed: GeminiResponse = parse_success(&response)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        non_empty(text, &response)
    }
}

#[async_trait]
impl<C: HttpClient> ModelGateway for HttpGateway<C> {
    async fn send(&self, query: &ModelQuery) -> Result<String, ModelError> {
        let route = route(&query.model);
        info!("Routing model '{}' to {} as '{}'", query.model, route.provider, route.model);

        let key = self.credential(route.provider)?;

        match route.provider {
            Provider::Anthropic => self.send_anthropic(&route, query, key).await,
            Provider::Gemini => self.send_gemini(&route, query, key).await,
            Provider::OpenAi | Provider::OpenRouter | Provider::Ollama => {
                self.send_chat_completions(&route, query, key).await
            }
        }
    }
}

/// Gateway returning a fixed response without any network traffic.
pub struct CannedGateway {
    response: String,
}

impl CannedGateway {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl ModelGateway for CannedGateway {
    async fn send(&self, query: &ModelQuery) -> Result<String, ModelError> {
        info!("Using canned model response for '{}' (LLMEXEC_MOCK_RESPONSE)", query.model);
        Ok(self.response.clone())
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(response: &HttpResponse) -> ModelError {
    let provider_message = error_message(&response.body);
    let detail = format!("HTTP {}: {}", response.status, response.body);

    match response.status {
        401 | 403 => ModelError::authentication(
            provider_message.unwrap_or_else(|| "credential rejected by provider".to_string()),
        )
        .with_detail(detail),
        429 => ModelError::RateLimited {
            message: provider_message
                .unwrap_or_else(|| "too many requests".to_string()),
            detail: Some(detail),
        },
        status => ModelError::Provider {
            message: provider_message
                .unwrap_or_else(|| format!("provider returned HTTP {}", status)),
            status: Some(status),
            detail: Some(detail),
        },
    }
}

/// Best-effort extraction of `error.message` from a provider error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        Value::String(s) => Some(s.clone()),
        _ => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn parse_success<T: for<'de> Deserialize<'de>>(response: &HttpResponse) -> Result<T, ModelError> {
    if !response.is_success() {
        let err = classify_status(response);
        warn!("Provider request failed: {}", err);
        return Err(err);
    }
    debug!("Provider response: {} bytes", response.body.len());
    serde_json::from_str(&response.body).map_err(|e| {
        ModelError::provider("unexpected response format from provider")
            .with_detail(format!("{}: {}", e, response.body))
    })
}

fn non_empty(text: String, response: &HttpResponse) -> Result<String, ModelError> {
    if text.trim().is_empty() {
        Err(ModelError::provider("provider returned an empty completion")
            .with_detail(response.body.clone()))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::tests::MockHttpClient;

    const SAMPLING: Sampling = Sampling {
        temperature: 0.1,
        max_tokens: 4000,
    };

    fn query(model: &str) -> ModelQuery {
        ModelQuery {
            model: model.to_string(),
            system: "SYSTEM".to_string(),
            user: "print HELLO".to_string(),
        }
    }

    fn all_keys() -> Credentials {
        Credentials::default()
            .with("OPENAI_API_KEY", "sk-openai")
            .with("ANTHROPIC_API_KEY", "sk-ant")
            .with("GEMINI_API_KEY", "gm-key")
            .with("OPENROUTER_API_KEY", "or-key")
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_openai_request_and_response() {
        let client = MockHttpClient::new(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"```python\nprint('HELLO')\n```"}}]}"#,
        );
        let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);

        let text = gateway.send(&query("openai/gpt-4.1")).await.unwrap();
        assert_eq!(text, "```python\nprint('HELLO')\n```");

        let request = gateway.client.last_request();
        assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(header(&request.headers, "authorization"), Some("Bearer sk-openai"));
        assert_eq!(request.body["model"], "gpt-4.1");
        assert_eq!(request.body["messages"][0]["role"], "system");
        assert_eq!(request.body["messages"][0]["content"], "SYSTEM");
        assert_eq!(request.body["messages"][1]["content"], "print HELLO");
        assert_eq!(request.body["max_tokens"], 4000);
    }

    #[tokio::test]
    async fn test_api_base_override_applies_to_openai() {
        let client = MockHttpClient::new(200, r#"{"choices":[{"message":{"content":"x"}}]}"#);
        let gateway = HttpGateway::new(
            client,
            all_keys(),
            Some("http://localhost:8080/v1/".to_string()),
            SAMPLING,
        );
        gateway.send(&query("gpt-4o")).await.unwrap();
        assert_eq!(
            gateway.client.last_request().url,
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_anthropic_request_and_response() {
        let client = MockHttpClient::new(
            200,
            r#"{"content":[{"type":"text","text":"print(1)"}],"stop_reason":"end_turn"}"#,
        );
        let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);

        let text = gateway.send(&query("anthropic/claude-sonnet-4-5")).await.unwrap();
        assert_eq!(text, "print(1)");

        let request = gateway.client.last_request();
        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(header(&request.headers, "x-api-key"), Some("sk-ant"));
        assert_eq!(request.body["system"], "SYSTEM");
        assert_eq!(request.body["model"], "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn test_gemini_request_and_response() {
        let client = MockHttpClient::new(
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"```python\n"},{"text":"print(2)\n```"}]}}]}"#,
        );
        let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);

        let text = gateway.send(&query("gemini/gemini-2.5-flash")).await.unwrap();
        assert_eq!(text, "```python\nprint(2)\n```");

        let request = gateway.client.last_request();
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(header(&request.headers, "x-goog-api-key"), Some("gm-key"));
        assert_eq!(request.body["systemInstruction"]["parts"][0]["text"], "SYSTEM");
    }

    #[tokio::test]
    async fn test_ollama_sends_without_credential() {
        let client =
            MockHttpClient::new(200, r#"{"choices":[{"message":{"content":"print(3)"}}]}"#);
        let gateway = HttpGateway::new(client, Credentials::default(), None, SAMPLING);

        assert_eq!(gateway.send(&query("ollama/llama3.2")).await.unwrap(), "print(3)");
        let request = gateway.client.last_request();
        assert_eq!(request.url, "http://localhost:11434/v1/chat/completions");
        assert_eq!(header(&request.headers, "authorization"), None);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let client = MockHttpClient::new(200, "{}");
        let gateway = HttpGateway::new(client, Credentials::default(), None, SAMPLING);

        let err = gateway.send(&query("openai/gpt-4.1")).await.unwrap_err();
        assert_eq!(err.category(), "AuthenticationFailure");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert_eq!(gateway.client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [
            (401, "AuthenticationFailure"),
            (403, "AuthenticationFailure"),
            (429, "RateLimited"),
            (404, "ProviderFailure"),
            (500, "ProviderFailure"),
        ];
        for (status, category) in cases {
            let client = MockHttpClient::new(status, r#"{"error":{"message":"nope"}}"#);
            let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);
            let err = gateway.send(&query("gpt-4.1")).await.unwrap_err();
            assert_eq!(err.category(), category, "status {}", status);
            assert!(err.to_string().contains("nope"));
            assert!(err.detail().unwrap().contains(&status.to_string()));
        }
    }

    #[tokio::test]
    async fn test_unknown_model_keeps_status() {
        let client = MockHttpClient::new(404, r#"{"error":"model not found"}"#);
        let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);
        match gateway.send(&query("gpt-nonexistent")).await.unwrap_err() {
            ModelError::Provider { status, message, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(message, "model not found");
            }
            other => panic!("Expected ProviderFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let client = MockHttpClient::failing(ModelError::network("connection reset"));
        let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);
        let err = gateway.send(&query("gpt-4.1")).await.unwrap_err();
        assert_eq!(err.category(), "NetworkFailure");
    }

    #[tokio::test]
    async fn test_malformed_and_empty_bodies_are_provider_failures() {
        for body in [
            "not json",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":"  "}}]}"#,
        ] {
            let client = MockHttpClient::new(200, body);
            let gateway = HttpGateway::new(client, all_keys(), None, SAMPLING);
            let err = gateway.send(&query("gpt-4.1")).await.unwrap_err();
            assert_eq!(err.category(), "ProviderFailure", "body {}", body);
        }
    }

    #[tokio::test]
    async fn test_canned_gateway_returns_verbatim() {
        let gateway = CannedGateway::new("```python\nprint('HELLO')\n```");
        assert_eq!(
            gateway.send(&query("any")).await.unwrap(),
            "```python\nprint('HELLO')\n```"
        );
    }
}

// src/fallback/client.rs
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::fallback::{FallbackConfig, TextGenerator};
use crate::utils::error::FallbackError;

const USER_AGENT: &str = concat!("portfolio_extractor/", env!("CARGO_PKG_VERSION"));
const MAX_RESPONSE_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Text generator speaking the OpenAI-compatible chat completions protocol.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpTextGenerator {
    /// Builds the HTTP client. Fails if no API key is configured.
    pub fn from_config(config: &FallbackConfig) -> Result<Self, FallbackError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FallbackError::Config("no API key configured for the fallback generator".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| FallbackError::Config("API key is not a valid header value".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, FallbackError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_RESPONSE_TOKENS,
            temperature: 0.0,
        };

        tracing::debug!("Calling text generator at {} (model {})", self.endpoint, self.model);
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Text generator returned HTTP {}", status);
            return Err(FallbackError::Http(status));
        }

        let data: ChatResponse = response.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FallbackError::MalformedResponse("empty completion".to_string()))?;
        tracing::debug!("Text generator returned {} bytes", content.len());
        Ok(content)
    }
}

// src/fallback/mod.rs
//! Last-resort extraction through an external text generator.
//!
//! Only runs when the structural passes found nothing: tables when the
//! document yields none, securities when no table or text pass found any.
//! Every call is bounded by a timeout and every failure degrades to an
//! empty result with a warning.

pub mod client;
pub mod prompts;
pub mod schema;

use std::future::Future;
use std::time::Duration;

use crate::document::{Security, Table};
use crate::utils::error::FallbackError;

pub use client::HttpTextGenerator;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 4000;
pub const API_KEY_ENV: &str = "FALLBACK_API_KEY";

/// Black-box text generation service: prompt in, raw reply out.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, FallbackError>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Upper bound for a single generator call.
    pub timeout: Duration,
    /// How much of the document text is embedded in a prompt.
    pub max_prompt_chars: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }
}

pub struct ExternalFallbackExtractor<'g, G> {
    generator: &'g G,
    timeout: Duration,
    max_prompt_chars: usize,
    default_currency: String,
}

impl<'g, G: TextGenerator> ExternalFallbackExtractor<'g, G> {
    pub fn new(generator: &'g G, config: &FallbackConfig, default_currency: impl Into<String>) -> Self {
        Self {
            generator,
            timeout: config.timeout,
            max_prompt_chars: config.max_prompt_chars,
            default_currency: default_currency.into(),
        }
    }

    async fn ask(&self, prompt: String) -> Result<String, FallbackError> {
        match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(reply) => reply,
            Err(_) => Err(FallbackError::Timeout(self.timeout)),
        }
    }

    /// Asks the generator for the document's tables. Empty on any failure.
    pub async fn extract_tables(&self, text: &str) -> Vec<Table> {
        let excerpt = prompts::document_excerpt(text, self.max_prompt_chars);
        let result = match self.ask(prompts::tables_prompt(excerpt)).await {
            Ok(reply) => schema::parse_tables(&reply),
            Err(e) => Err(e),
        };
        match result {
            Ok(tables) => {
                tracing::info!("External fallback produced {} table(s)", tables.len());
                tables
            }
            Err(e) => {
                tracing::warn!("External table extraction failed, continuing without: {}", e);
                Vec::new()
            }
        }
    }

    /// Asks the generator for the document's holdings. Empty on any failure.
    pub async fn extract_securities(&self, text: &str) -> Vec<Security> {
        let excerpt = prompts::document_excerpt(text, self.max_prompt_chars);
        let result = match self.ask(prompts::securities_prompt(excerpt)).await {
            Ok(reply) => schema::parse_securities(&reply, &self.default_currency),
            Err(e) => Err(e),
        };
        match result {
            Ok(securities) => {
                tracing::info!("External fallback produced {} securities", securities.len());
                securities
            }
            Err(e) => {
                tracing::warn!("External securities extraction failed, continuing without: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed reply and records the prompts it was given.
    struct Canned {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for Canned {
        async fn generate(&self, prompt: &str) -> Result<String, FallbackError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|_| FallbackError::MalformedResponse("canned failure".to_string()))
        }
    }

    struct Stalled;

    impl TextGenerator for Stalled {
        async fn generate(&self, _prompt: &str) -> Result<String, FallbackError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("{\"securities\": []}".to_string())
        }
    }

    fn config(max_prompt_chars: usize) -> FallbackConfig {
        FallbackConfig {
            enabled: true,
            max_prompt_chars,
            timeout: Duration::from_millis(50),
            ..FallbackConfig::default()
        }
    }

    #[test]
    fn securities_parsed_from_generator_reply() {
        let generator = Canned::replying(
            "Here you go:\n```json\n{\"securities\": [{\"isin\": \"US0378331005\", \"name\": \"Apple Inc.\", \"value\": 19050}]}\n```",
        );
        let extractor = ExternalFallbackExtractor::new(&generator, &config(4000), "USD");
        let securities = tokio_test::block_on(extractor.extract_securities("statement text"));
        assert_eq!(securities.len(), 1);
        assert_eq!(securities[0].name.as_deref(), Some("Apple Inc."));
        assert_eq!(securities[0].value, Some(19_050.0));
    }

    #[test]
    fn prompt_embeds_only_leading_excerpt() {
        let generator = Canned::replying("{\"tables\": []}");
        let extractor = ExternalFallbackExtractor::new(&generator, &config(10), "USD");
        let text = format!("0123456789{}", "TAIL".repeat(10));
        let tables = tokio_test::block_on(extractor.extract_tables(&text));
        assert!(tables.is_empty());
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("0123456789"));
        assert!(!prompts[0].contains("TAIL"));
    }

    #[test]
    fn malformed_reply_degrades_to_empty() {
        let generator = Canned::replying("Sorry, I cannot help with that.");
        let extractor = ExternalFallbackExtractor::new(&generator, &config(4000), "USD");
        assert!(tokio_test::block_on(extractor.extract_securities("text")).is_empty());
        assert!(tokio_test::block_on(extractor.extract_tables("text")).is_empty());
    }

    #[test]
    fn generator_failure_degrades_to_empty() {
        let generator = Canned::failing();
        let extractor = ExternalFallbackExtractor::new(&generator, &config(4000), "USD");
        assert!(tokio_test::block_on(extractor.extract_securities("text")).is_empty());
    }

    #[tokio::test]
    async fn stalled_generator_times_out() {
        let extractor = ExternalFallbackExtractor::new(&Stalled, &config(4000), "USD");
        let started = std::time::Instant::now();
        assert!(extractor.extract_securities("text").await.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

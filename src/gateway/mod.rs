//! Model backend abstraction for the decision-making collaborators.
//!
//! The retriever, ranker, and planner all speak the same narrow contract:
//! send a (system, user) prompt, get free text back. Which hosted provider
//! answers is a startup decision, not a per-call one — the binary selects one
//! backend from configuration and uses it for the whole run. Each backend
//! reports a `provider:model` name used to partition run outputs.
//!
//! Calls are single round-trips with no implicit retry; a caller that needs
//! resilience wraps the backend itself. The pipeline's stages instead absorb
//! failures as empty results.

pub mod azure;
pub mod error;
pub mod mistral;

use async_trait::async_trait;

use crate::json_recovery::extract_json;

pub use azure::AzureOpenAiBackend;
pub use error::{ErrorContext, ProviderError};
pub use mistral::MistralBackend;

/// One chat round-trip: a system message, a user prompt, and sampling config.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Sampling temperature. The pipeline runs everything at 0.0.
    pub temperature: f32,
    /// When set, the backend requests strict JSON output where the provider
    /// supports it, and the response is routed through JSON recovery.
    pub force_json: bool,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            force_json: true,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn force_json(mut self, force: bool) -> Self {
        self.force_json = force;
        self
    }
}

/// A hosted chat model, reduced to the one capability the pipeline needs.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider identifier, e.g. "azure".
    fn provider(&self) -> &'static str;

    /// Model or deployment identifier within the provider.
    fn model(&self) -> &str;

    /// Raw round-trip. Returns the model's text verbatim.
    async fn chat_raw(&self, req: &ChatRequest) -> Result<String, ProviderError>;

    /// `provider:model`, used to partition run outputs.
    fn name(&self) -> String {
        format!("{}:{}", self.provider(), self.model())
    }

    /// Round-trip with the response coerced to a valid JSON string when the
    /// request forces JSON. Provider/network failures still surface as
    /// errors; only the *content* is made safe to parse.
    async fn chat_json(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        let text = self.chat_raw(req).await?;
        if req.force_json {
            Ok(extract_json(&text))
        } else {
            Ok(text)
        }
    }
}

/// Which hosted provider to use. Selected once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Azure,
    Mistral,
}

impl std::str::FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "mistral" => Ok(Provider::Mistral),
            other => Err(ProviderError::config(format!("unknown provider: {other}"))),
        }
    }
}

/// Construct the selected backend from environment configuration.
/// Missing credentials are a fatal startup error, by design.
pub fn backend_from_env(provider: Provider) -> Result<Box<dyn ChatBackend>, ProviderError> {
    match provider {
        Provider::Azure => Ok(Box::new(AzureOpenAiBackend::from_env()?)),
        Provider::Mistral => Ok(Box::new(MistralBackend::from_env()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Azure".parse::<Provider>().unwrap(), Provider::Azure);
        assert_eq!("MISTRAL".parse::<Provider>().unwrap(), Provider::Mistral);
        assert!("openai".parse::<Provider>().is_err());
    }

    #[test]
    fn chat_request_defaults() {
        let req = ChatRequest::new("sys", "user");
        assert_eq!(req.temperature, 0.0);
        assert!(req.force_json);

        let req = req.temperature(0.7).force_json(false);
        assert_eq!(req.temperature, 0.7);
        assert!(!req.force_json);
    }
}

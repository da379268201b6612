//! Model interaction: send one prompt, get one completion back.
//!
//! [`ModelClient`] is the seam between the pipeline and the network. The
//! production implementation, [`LlmClient`], drives an
//! `edgequake_llm::LLMProvider`; tests substitute a scripted client.
//!
//! ## Retry Strategy
//!
//! By default a failed call is not retried and aborts the run. Setting
//! `max_retries` enables exponential backoff (`retry_backoff_ms * 2^attempt`),
//! e.g. 500 ms → 1 s → 2 s for three retries.

use crate::config::{ExtractionConfig, DEFAULT_PROVIDER};
use crate::error::ExtractError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One model reply plus token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl Completion {
    /// A reply with no usage information.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

/// Why a model call produced no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The provider returned an error (network, auth, rate limit, …).
    Api(String),
    /// The call exceeded the configured timeout.
    Timeout { secs: u64 },
}

impl CallFailure {
    /// Attach the file being processed to make this a fatal run error.
    pub fn into_extract_error(self, file_name: &str) -> ExtractError {
        match self {
            CallFailure::Api(message) => ExtractError::LlmApiError {
                file_name: file_name.to_string(),
                message,
            },
            CallFailure::Timeout { secs } => ExtractError::ApiTimeout {
                file_name: file_name.to_string(),
                secs,
            },
        }
    }
}

/// Sends a single-turn prompt and returns the raw reply text.
pub trait ModelClient: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Completion, CallFailure>> + Send;
}

/// [`ModelClient`] backed by an edgequake-llm provider.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    call_timeout_secs: Option<u64>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmClient {
    /// Wrap a provider using the call settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            call_timeout_secs: config.api_timeout_secs,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider named by `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    async fn call_once(&self, messages: &[ChatMessage]) -> Result<Completion, CallFailure> {
        let call = self.provider.chat(messages, Some(&self.options));
        let response = match self.call_timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| CallFailure::Timeout { secs })?,
            None => call.await,
        }
        .map_err(|e| CallFailure::Api(e.to_string()))?;

        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

impl ModelClient for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, CallFailure> {
        let messages = vec![ChatMessage::user(prompt)];
        let mut last_err = CallFailure::Api("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Model call retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.call_once(&messages).await {
                Ok(completion) => {
                    debug!(
                        "{} input tokens, {} output tokens",
                        completion.prompt_tokens, completion.completion_tokens
                    );
                    return Ok(completion);
                }
                Err(e) => {
                    warn!("Model call attempt {} failed — {:?}", attempt + 1, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

/// Build `CompletionOptions` from the run config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

/// Environment variable holding the credential for `provider`, if it needs one.
pub fn credential_env_var(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        _ => None,
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`;
/// 2. `config.provider_name` + model;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. the OpenAI provider with the default model.
///
/// Providers that need a key are gated on its environment variable being
/// non-empty, so a missing credential halts the run before any document is
/// touched.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let (name, model) = match config.provider_name {
        Some(ref name) => (name.clone(), config.model_or_default().to_string()),
        None => match (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            (Ok(prov), Ok(model)) if !prov.is_empty() && !model.is_empty() => (prov, model),
            _ => (
                DEFAULT_PROVIDER.to_string(),
                config.model_or_default().to_string(),
            ),
        },
    };

    require_credential(&name)?;

    ProviderFactory::create_llm_provider(&name, &model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: name.clone(),
            hint: format!("{e}"),
        }
    })
}

fn require_credential(provider: &str) -> Result<(), ExtractError> {
    require_credential_with(provider, |var| std::env::var(var).ok())
}

/// Credential gate with an injectable variable lookup.
fn require_credential_with<F>(provider: &str, lookup: F) -> Result<(), ExtractError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(var) = credential_env_var(provider) else {
        return Ok(());
    };
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ExtractError::missing(
            "API key",
            format!("Please enter your {provider} API key to proceed (set {var} or pass --api-key)."),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults_leave_provider_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, None);
        assert_eq!(opts.max_tokens, None);
    }

    #[test]
    fn build_options_carries_overrides() {
        let config = ExtractionConfig::builder()
            .temperature(0.0)
            .max_tokens(512)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(512));
    }

    #[test]
    fn credential_vars_per_provider() {
        assert_eq!(credential_env_var("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(credential_env_var("OpenAI"), Some("OPENAI_API_KEY"));
        assert_eq!(credential_env_var("ollama"), None);
    }

    #[test]
    fn providers_without_keys_pass_the_gate() {
        assert!(require_credential("ollama").is_ok());
    }

    #[test]
    fn missing_key_halts_the_run() {
        let err = require_credential_with("openai", |_| None).unwrap_err();
        assert!(
            matches!(err, ExtractError::MissingInput { ref what, ref hint } if what == "API key" && hint.contains("OPENAI_API_KEY")),
            "got: {err}"
        );
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = require_credential_with("anthropic", |_| Some("   ".into())).unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput { .. }));
    }

    #[test]
    fn present_key_passes_and_is_looked_up_by_provider_var() {
        let seen = std::sync::Mutex::new(Vec::new());
        let res = require_credential_with("gemini", |var| {
            seen.lock().unwrap().push(var.to_string());
            Some("k-123".into())
        });
        assert!(res.is_ok());
        assert_eq!(*seen.lock().unwrap(), ["GEMINI_API_KEY"]);
    }

    #[test]
    fn call_failure_names_the_file() {
        let e = CallFailure::Timeout { secs: 9 }.into_extract_error("doc1.pdf");
        assert!(matches!(e, ExtractError::ApiTimeout { ref file_name, secs: 9 } if file_name == "doc1.pdf"));
        let e = CallFailure::Api("429".into()).into_extract_error("doc2.pdf");
        assert!(e.to_string().contains("doc2.pdf"));
    }

    struct Echo;

    impl ModelClient for Echo {
        async fn complete(&self, prompt: &str) -> Result<Completion, CallFailure> {
            Ok(Completion::text(prompt.to_uppercase()))
        }
    }

    #[test]
    fn model_client_can_be_implemented_with_async_fn() {
        let out = tokio_test::block_on(Echo.complete("abc")).unwrap();
        assert_eq!(out.content, "ABC");
    }
}

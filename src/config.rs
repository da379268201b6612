//! Configuration types for a batch extraction run.
//!
//! Every knob of a run lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The requested fields are kept apart in
//! [`FieldList`] because they are operator input, not tuning.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0125";

/// Provider used when none is configured.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Default cap on the document text embedded in a prompt, in characters.
///
/// Roughly 12k tokens of English text, which leaves room for the instruction
/// and the reply inside the 16k context of the default model.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 48_000;

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use epc_extract::{ExtractionConfig, PromptVariant};
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o-mini")
///     .variant(PromptVariant::Enhanced)
///     .json_reprompts(1)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic"). If None, uses
    /// [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. None leaves the provider default in place.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate per document. None = provider default.
    pub max_tokens: Option<usize>,

    /// Transport-level retries for a failed model call. Default: 0.
    ///
    /// With 0 a failed call aborts the run immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. None = wait indefinitely (default).
    pub api_timeout_secs: Option<u64>,

    /// How many times to re-prompt with a stricter instruction when the reply
    /// is not valid JSON. Default: 1. Zero means a single parse attempt.
    pub json_reprompts: u32,

    /// Prompt template to use. Default: [`PromptVariant::Basic`].
    pub variant: PromptVariant,

    /// Field pair checked by the score-order correction (enhanced variant).
    pub score_pair: ScorePair,

    /// Cap on embedded document text, in characters. None = unlimited.
    pub max_text_chars: Option<usize>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: None,
            max_tokens: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: None,
            json_reprompts: 1,
            variant: PromptVariant::default(),
            score_pair: ScorePair::default(),
            max_text_chars: Some(DEFAULT_MAX_TEXT_CHARS),
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("json_reprompts", &self.json_reprompts)
            .field("variant", &self.variant)
            .field("score_pair", &self.score_pair)
            .field("max_text_chars", &self.max_text_chars)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier in effect for this run.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn json_reprompts(mut self, n: u32) -> Self {
        self.config.json_reprompts = n;
        self
    }

    pub fn variant(mut self, variant: PromptVariant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn score_pair(mut self, pair: ScorePair) -> Self {
        self.config.score_pair = pair;
        self
    }

    /// Cap embedded text at `n` characters; `None` disables truncation.
    pub fn max_text_chars(mut self, n: Option<usize>) -> Self {
        self.config.max_text_chars = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_text_chars == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "max_text_chars must be ≥ 1 (use None to disable truncation)".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.json_reprompts > 5 {
            return Err(ExtractError::InvalidConfig(format!(
                "json_reprompts must be 0–5, got {}",
                c.json_reprompts
            )));
        }
        c.score_pair.validate()?;
        Ok(self.config)
    }
}

// ── Enums and small types ────────────────────────────────────────────────

/// Which instruction template is sent to the model.
///
/// | Variant | Adds |
/// |---------|------|
/// | Basic | field list + source text only |
/// | Enhanced | rating-band lookup table, letter/integer normalisation, score-order correction |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptVariant {
    #[default]
    Basic,
    Enhanced,
}

/// Names of the current/potential field pairs used by the enhanced variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub current_rating: String,
    pub potential_rating: String,
    pub current_score: String,
    pub potential_score: String,
}

impl Default for ScorePair {
    fn default() -> Self {
        Self {
            current_rating: "energy_rating".into(),
            potential_rating: "potential_energy_rating".into(),
            current_score: "energy_score".into(),
            potential_score: "potential_energy_score".into(),
        }
    }
}

impl ScorePair {
    fn validate(&self) -> Result<(), ExtractError> {
        let names = [
            &self.current_rating,
            &self.potential_rating,
            &self.current_score,
            &self.potential_score,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig(
                "score pair field names must not be empty".into(),
            ));
        }
        if self.current_score == self.potential_score {
            return Err(ExtractError::InvalidConfig(format!(
                "current and potential score fields must differ (both '{}')",
                self.current_score
            )));
        }
        Ok(())
    }
}

/// Ordered, non-empty list of requested field names.
///
/// Duplicates are kept: each occurrence becomes its own column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldList(Vec<String>);

impl FieldList {
    /// Parse a comma-separated field string.
    ///
    /// All spaces are removed first, so `"address, postcode"` and
    /// `"address,postcode"` are equivalent. Empty segments are dropped.
    pub fn parse(input: &str) -> Result<Self, ExtractError> {
        let compact = input.replace(' ', "");
        let fields: Vec<String> = compact
            .split(',')
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(fields)
    }

    /// Build from already-split names. Fails on an empty list.
    pub fn new(fields: Vec<String>) -> Result<Self, ExtractError> {
        if fields.is_empty() {
            return Err(ExtractError::missing(
                "requested fields",
                "Enter the fields you want to extract, comma-separated (e.g. address,postcode).",
            ));
        }
        Ok(Self(fields))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_list_strips_spaces() {
        let f = FieldList::parse("address, postcode,energy rating").unwrap();
        assert_eq!(f.as_slice(), ["address", "postcode", "energyrating"]);
    }

    #[test]
    fn field_list_keeps_duplicates_and_order() {
        let f = FieldList::parse("postcode,address,postcode").unwrap();
        assert_eq!(f.as_slice(), ["postcode", "address", "postcode"]);
    }

    #[test]
    fn field_list_drops_empty_segments() {
        let f = FieldList::parse(",address,,").unwrap();
        assert_eq!(f.as_slice(), ["address"]);
    }

    #[test]
    fn field_list_rejects_empty() {
        assert!(matches!(
            FieldList::parse(" , "),
            Err(ExtractError::MissingInput { .. })
        ));
        assert!(FieldList::parse("").is_err());
    }

    #[test]
    fn defaults_are_single_call_without_timeout() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model_or_default(), "gpt-3.5-turbo-0125");
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.api_timeout_secs, None);
        assert_eq!(c.variant, PromptVariant::Basic);
    }

    #[test]
    fn builder_rejects_zero_text_cap() {
        let err = ExtractionConfig::builder()
            .max_text_chars(Some(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_identical_score_fields() {
        let pair = ScorePair {
            potential_score: "energy_score".into(),
            ..ScorePair::default()
        };
        assert!(ExtractionConfig::builder().score_pair(pair).build().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ExtractionConfig::builder()
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ExtractionConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, Some(2.0));
    }
}

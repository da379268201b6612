//! # epc-extract
//!
//! Pull operator-chosen fields out of batches of PDF documents (Energy
//! Performance Certificates, lease agreements) with a chat LLM, and export
//! the result as a one-sheet spreadsheet.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Input    read local files or download URLs
//!  ├─ 2. Text     concatenate page text via pdfium (spawn_blocking)
//!  ├─ 3. Prompt   field list + document text (+ rating bands, enhanced)
//!  ├─ 4. LLM      one chat call per document, in input order
//!  ├─ 5. Parse    JSON object → record; bad replies drop that document
//!  ├─ 6. Correct  swap current/potential scores when inverted (enhanced)
//!  └─ 7. Export   epc_data_<DD_MM_YY>.xlsx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use epc_extract::{extract_to_file, ExtractionConfig, FieldList};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from OPENAI_API_KEY
//!     let fields = FieldList::parse("address, postcode, energy_rating")?;
//!     let config = ExtractionConfig::default();
//!     let inputs = vec!["cert1.pdf".to_string(), "cert2.pdf".to_string()];
//!     let (output, path) = extract_to_file(&inputs, &fields, ".", &config).await?;
//!     for failure in &output.failures {
//!         eprintln!("{failure}");
//!     }
//!     eprintln!("{:.2}% extracted → {}", output.stats.success_percentage(), path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `epc-extract` binary (clap + anyhow + tracing-subscriber + indicatif + console) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! epc-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, FieldList, PromptVariant, ScorePair, DEFAULT_MODEL,
};
pub use document::{Document, SourceDocument};
pub use error::{DocumentError, ExtractError};
pub use extract::{
    extract, extract_documents, extract_documents_to_file, extract_from_bytes, extract_sources,
    extract_sync, extract_to_file,
};
pub use output::{
    ExtractionOutput, ExtractionRecord, ExtractionStats, FieldFillRate, ResultTable,
    FILE_NAME_COLUMN,
};
pub use pipeline::export::{export_file_name, export_to_dir, write_xlsx, XLSX_MIME_TYPE};
pub use pipeline::llm::{CallFailure, Completion, LlmClient, ModelClient};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};

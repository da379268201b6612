//! Error types for the epc-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the run cannot proceed at all (no fields,
//!   no documents, no credential, unreadable PDF, a failed model call).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`DocumentError`] — **Non-fatal**: the model answered for one document
//!   but the answer could not be turned into a record. The document is left
//!   out of the result table and the error is stored in
//!   [`crate::output::ExtractionOutput::failures`] so the operator sees which
//!   files were dropped.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the epc-extract library.
///
/// Per-document parse failures use [`DocumentError`] and are collected in the
/// output rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Preconditions ─────────────────────────────────────────────────────
    /// A required operator input (fields, documents, API key) is absent.
    #[error("Missing input: {what}\n{hint}")]
    MissingInput { what: String, hint: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("'{file_name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { file_name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{file_name}' is corrupt: {detail}")]
    CorruptPdf { file_name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{file_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { file_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{file_name}'")]
    WrongPassword { file_name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs the pdfium shared library. Either:\n\
  • install libpdfium where the system loader can find it, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed; the run is abandoned.
    #[error("LLM API error while processing '{file_name}': {message}")]
    LlmApiError { file_name: String, message: String },

    /// The model call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s while processing '{file_name}'")]
    ApiTimeout { file_name: String, secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The workbook could not be built.
    #[error("Failed to build spreadsheet: {0}")]
    SpreadsheetFailed(String),

    /// Could not create or write the exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub(crate) fn missing(what: impl Into<String>, hint: impl Into<String>) -> Self {
        ExtractError::MissingInput {
            what: what.into(),
            hint: hint.into(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExtractError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ExtractError::SpreadsheetFailed(e.to_string())
    }
}

/// A non-fatal error for a single document.
///
/// The document contributes no row to the result table; the run continues.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The reply was not valid JSON, even after re-prompting.
    #[error("Error parsing response for file {file_name}: {detail}")]
    InvalidJson {
        file_name: String,
        attempts: u32,
        detail: String,
    },

    /// The reply was valid JSON but not an object.
    #[error("Response for file {file_name} is JSON {found}, expected an object")]
    NotAnObject {
        file_name: String,
        attempts: u32,
        found: String,
    },
}

impl DocumentError {
    /// Model calls spent on the document before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            DocumentError::InvalidJson { attempts, .. } => *attempts,
            DocumentError::NotAnObject { attempts, .. } => *attempts,
        }
    }

    /// Name of the file this error belongs to.
    pub fn file_name(&self) -> &str {
        match self {
            DocumentError::InvalidJson { file_name, .. } => file_name,
            DocumentError::NotAnObject { file_name, .. } => file_name,
        }
    }
}

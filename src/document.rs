//! Documents as they move through the pipeline: raw PDF bytes first, then
//! extracted plain text.

use serde::{Deserialize, Serialize};

/// A PDF as supplied by the operator, resolved to bytes in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name shown in the result table (no directory part).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A document's extracted text.
///
/// Pages are concatenated in order with no separator, so page boundaries are
/// not recoverable from `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    pub text: String,
    /// Number of pages read from the PDF (0 when built from text directly).
    pub page_count: usize,
}

impl Document {
    /// Build a document directly from text, bypassing PDF extraction.
    pub fn from_text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            text: text.into(),
            page_count: 0,
        }
    }
}

//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the batch.
//!
//! Documents are processed one at a time in input order, so the events for a
//! run arrive strictly sequentially: `on_run_start`, then for each document
//! `on_document_start` followed by exactly one of `on_document_complete` or
//! `on_document_error`, then `on_run_complete`.
//!
//! # Example
//!
//! ```rust
//! use epc_extract::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, file_name: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {}/{} done", index + 1, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 0-based.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after text extraction, before the first model call.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before the model request is sent for a document.
    fn on_document_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a document produced a record.
    fn on_document_complete(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a document's reply could not be parsed.
    fn on_document_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        let _ = (index, total, file_name, error);
    }

    /// Called once after every document has been attempted.
    fn on_run_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// Fraction of the batch finished after the document at `index`.
pub fn fraction_done(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (index + 1).min(total) as f64 / total as f64
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

//! Pipeline stages for PDF field extraction.
//!
//! Each submodule implements one transformation step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ llm ──▶ parse ──▶ postprocess ──▶ export
//! (path/URL) (pdfium) (chat)  (JSON)   (score order)   (xlsx)
//! ```
//!
//! 1. [`input`]  — read local files or download URLs, check the `%PDF` magic
//! 2. [`text`]   — concatenate per-page text; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`llm`]    — one single-turn chat call per document; the only stage with
//!    network I/O
//! 4. [`parse`]  — reply text to a field map
//! 5. [`postprocess`] — current/potential score ordering (enhanced variant)
//! 6. [`export`] — one-sheet workbook named after the export date

pub mod export;
pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
pub mod text;

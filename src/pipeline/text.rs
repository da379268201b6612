//! PDF text extraction via pdfium.
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not be driven from async worker threads, so the whole batch
//! is extracted inside one `spawn_blocking` call with a single binding.
//!
//! A page without a text layer (a scanned image) contributes an empty string;
//! there is no OCR fallback.

use crate::document::{Document, SourceDocument};
use crate::error::ExtractError;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Extract the text of every document, in input order.
pub async fn extract_texts(
    sources: Vec<SourceDocument>,
    password: Option<String>,
) -> Result<Vec<Document>, ExtractError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<Document>, ExtractError> {
        let pdfium = bind_pdfium()?;
        sources
            .iter()
            .map(|src| extract_text_blocking(&pdfium, src, password.as_deref()))
            .collect()
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Text extraction task panicked: {}", e)))?
}

/// Bind to `PDFIUM_LIB_PATH` when set, else to the system library.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn extract_text_blocking(
    pdfium: &Pdfium,
    source: &SourceDocument,
    password: Option<&str>,
) -> Result<Document, ExtractError> {
    let document = pdfium
        .load_pdf_from_byte_slice(&source.bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ExtractError::WrongPassword {
                        file_name: source.file_name.clone(),
                    }
                } else {
                    ExtractError::PasswordRequired {
                        file_name: source.file_name.clone(),
                    }
                }
            } else {
                ExtractError::CorruptPdf {
                    file_name: source.file_name.clone(),
                    detail: err_str,
                }
            }
        })?;

    let pages = document.pages();
    let page_texts = pages.iter().map(|page| match page.text() {
        Ok(text) => text.all(),
        Err(e) => {
            debug!("{}: page has no text layer ({:?})", source.file_name, e);
            String::new()
        }
    });
    let text = concat_pages(page_texts);

    info!(
        "Extracted {} chars from {} ({} pages)",
        text.chars().count(),
        source.file_name,
        pages.len()
    );

    Ok(Document {
        file_name: source.file_name.clone(),
        text,
        page_count: pages.len() as usize,
    })
}

/// Join page texts in order with no delimiter.
pub(crate) fn concat_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pages.into_iter().fold(String::new(), |mut acc, p| {
        acc.push_str(p.as_ref());
        acc
    })
}

//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Each input is read fully into memory as a [`SourceDocument`]; pdfium loads
//! from the byte slice, so no temp files are needed for downloads. The PDF
//! magic bytes (`%PDF`) are checked here so callers get a meaningful error
//! rather than a pdfium failure.

use crate::document::SourceDocument;
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every input in order. The first failure aborts the batch.
pub async fn resolve_inputs(
    inputs: &[String],
    timeout_secs: u64,
) -> Result<Vec<SourceDocument>, ExtractError> {
    if inputs.is_empty() {
        return Err(ExtractError::missing(
            "PDF files",
            "Supply at least one PDF file path or URL.",
        ));
    }
    let mut docs = Vec::with_capacity(inputs.len());
    for input in inputs {
        docs.push(resolve_input(input, timeout_secs).await?);
    }
    Ok(docs)
}

/// Resolve one input string to a [`SourceDocument`].
///
/// URLs are downloaded; anything else is treated as a local file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Read a local file, validating existence, permissions and PDF magic bytes.
async fn read_local(path_str: &str) -> Result<SourceDocument, ExtractError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => return Err(ExtractError::FileNotFound { path }),
    };

    let file_name = file_name_of(&path);
    check_magic(&file_name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::new(file_name, bytes))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let file_name = file_name_from_url(url);
    check_magic(&file_name, &bytes)?;

    info!("Downloaded {} ({} bytes)", file_name, bytes.len());
    Ok(SourceDocument::new(file_name, bytes.to_vec()))
}

fn check_magic(file_name: &str, bytes: &[u8]) -> Result<(), ExtractError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(ExtractError::NotAPdf {
        file_name: file_name.to_string(),
        magic,
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty URL path segment containing a dot, else `downloaded.pdf`.
pub fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_file_name() {
        assert_eq!(file_name_from_url("https://x.org/certs/epc-12.pdf"), "epc-12.pdf");
        assert_eq!(file_name_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(file_name_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[test]
    fn magic_bytes_are_checked() {
        assert!(check_magic("a.pdf", b"%PDF-1.7\n").is_ok());
        let err = check_magic("a.pdf", b"PK\x03\x04zip").unwrap_err();
        assert!(matches!(err, ExtractError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
        assert!(check_magic("empty.pdf", b"").is_err());
    }

    #[tokio::test]
    async fn local_file_keeps_only_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lease.pdf");
        std::fs::write(&path, b"%PDF-1.4 minimal").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.file_name, "lease.pdf");
        assert!(doc.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let err = resolve_inputs(&[], 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput { .. }));
    }
}

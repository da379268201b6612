//! Batch extraction entry points.
//!
//! A run is a straight line: gate on inputs, extract every PDF's text, then
//! for each document in order build a prompt, call the model, parse the reply.
//! Parsed records are corrected (enhanced variant), tabulated and returned.
//! A reply that cannot be parsed drops that document only; a failed model
//! call aborts the whole run.

use crate::config::{ExtractionConfig, FieldList, PromptVariant};
use crate::document::{Document, SourceDocument};
use crate::error::{DocumentError, ExtractError};
use crate::output::{ExtractionOutput, ExtractionRecord, ExtractionStats, FieldFillRate, ResultTable};
use crate::pipeline::llm::{LlmClient, ModelClient};
use crate::pipeline::parse::{parse_reply, ReplyError};
use crate::pipeline::{export, input, postprocess, text};
use crate::prompts::{build_prompt, build_strict_prompt};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract `fields` from PDF files or URLs.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors: missing credential or
/// inputs, unreadable PDFs, or a failed model call. Documents whose reply
/// cannot be parsed are reported in [`ExtractionOutput::failures`].
pub async fn extract(
    inputs: &[String],
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let client = LlmClient::from_config(config)?;
    let sources = input::resolve_inputs(inputs, config.download_timeout_secs).await?;
    extract_sources(&client, sources, fields, config).await
}

/// Extract `fields` from PDFs already held in memory.
pub async fn extract_from_bytes(
    sources: Vec<SourceDocument>,
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let client = LlmClient::from_config(config)?;
    extract_sources(&client, sources, fields, config).await
}

/// Run [`extract`] and write the result table to
/// `<output_dir>/epc_data_<DD_MM_YY>.xlsx` dated today.
pub async fn extract_to_file(
    inputs: &[String],
    fields: &FieldList,
    output_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<(ExtractionOutput, PathBuf), ExtractError> {
    let output = extract(inputs, fields, config).await?;
    let path = export::export_to_dir(&output.table, output_dir, export::today()).await?;
    Ok((output, path))
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    inputs: &[String],
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(inputs, fields, config))
}

/// Text extraction followed by [`extract_documents`].
pub async fn extract_sources<C: ModelClient>(
    client: &C,
    sources: Vec<SourceDocument>,
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    if sources.is_empty() {
        return Err(no_documents());
    }

    let text_start = Instant::now();
    let documents = text::extract_texts(sources, config.password.clone()).await?;
    let text_duration_ms = text_start.elapsed().as_millis() as u64;
    info!(
        "Extracted text from {} documents in {}ms",
        documents.len(),
        text_duration_ms
    );

    let mut output = extract_documents(client, documents, fields, config).await?;
    output.stats.text_duration_ms = text_duration_ms;
    output.stats.total_duration_ms += text_duration_ms;
    Ok(output)
}

/// Prompt, call and parse each document in order, then build the table.
///
/// This is the model-facing half of the pipeline; it takes already-extracted
/// text so it can be driven by any [`ModelClient`].
pub async fn extract_documents<C: ModelClient>(
    client: &C,
    documents: Vec<Document>,
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    if documents.is_empty() {
        return Err(no_documents());
    }

    let start = Instant::now();
    let total = documents.len();
    info!("Extracting {} fields from {} documents", fields.len(), total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut records: Vec<ExtractionRecord> = Vec::with_capacity(total);
    let mut failures: Vec<DocumentError> = Vec::new();
    let mut truncated_documents = 0;
    let mut total_input_tokens = 0u64;
    let mut total_output_tokens = 0u64;
    let mut llm_duration_ms = 0u64;

    for (index, doc) in documents.iter().enumerate() {
        let (text, truncated) = truncate_text(&doc.text, config.max_text_chars);
        if truncated {
            truncated_documents += 1;
            warn!(
                "{}: text truncated from {} to {} chars",
                doc.file_name,
                doc.text.chars().count(),
                text.chars().count()
            );
        }
        let prompt = build_prompt(fields, &text, config.variant, &config.score_pair);

        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(index, total, &doc.file_name);
        }

        let call_start = Instant::now();
        let outcome = extract_one(client, &doc.file_name, &prompt, fields, config).await?;
        llm_duration_ms += call_start.elapsed().as_millis() as u64;
        total_input_tokens += outcome.input_tokens as u64;
        total_output_tokens += outcome.output_tokens as u64;

        match outcome.result {
            Ok(record) => {
                if !record.missing_fields.is_empty() {
                    warn!(
                        "{}: model omitted {:?}; filled with null",
                        doc.file_name, record.missing_fields
                    );
                }
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_complete(index, total, &doc.file_name);
                }
                records.push(record);
            }
            Err(err) => {
                warn!("{}", err);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(index, total, &doc.file_name, &err.to_string());
                }
                failures.push(err);
            }
        }
    }

    let swapped_scores = if config.variant == PromptVariant::Enhanced {
        postprocess::enforce_score_order(&mut records, &config.score_pair)
    } else {
        0
    };

    let table = ResultTable::from_records(fields, &records);
    let field_fill_rates = fill_rates(&table, fields);

    let stats = ExtractionStats {
        total_documents: total,
        extracted_documents: records.len(),
        failed_documents: failures.len(),
        field_fill_rates,
        swapped_scores,
        truncated_documents,
        total_input_tokens,
        total_output_tokens,
        text_duration_ms: 0,
        llm_duration_ms,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} documents ({:.2}%), {}ms",
        stats.extracted_documents,
        total,
        stats.success_percentage(),
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, stats.extracted_documents);
    }

    Ok(ExtractionOutput {
        table,
        records,
        failures,
        stats,
    })
}

/// [`extract_documents`] plus export to `output_dir` for a given date.
pub async fn extract_documents_to_file<C: ModelClient>(
    client: &C,
    documents: Vec<Document>,
    fields: &FieldList,
    output_dir: impl AsRef<Path>,
    date: NaiveDate,
    config: &ExtractionConfig,
) -> Result<(ExtractionOutput, PathBuf), ExtractError> {
    let output = extract_documents(client, documents, fields, config).await?;
    let path = export::export_to_dir(&output.table, output_dir, date).await?;
    Ok((output, path))
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct DocumentOutcome {
    result: Result<ExtractionRecord, DocumentError>,
    input_tokens: usize,
    output_tokens: usize,
}

/// Call the model for one document, re-prompting on an unparseable reply.
///
/// The outer `Result` is fatal (the call itself failed); the inner one is the
/// per-document outcome.
async fn extract_one<C: ModelClient>(
    client: &C,
    file_name: &str,
    prompt: &str,
    fields: &FieldList,
    config: &ExtractionConfig,
) -> Result<DocumentOutcome, ExtractError> {
    let start = Instant::now();
    let mut input_tokens = 0;
    let mut output_tokens = 0;
    let mut strict_prompt: Option<String> = None;
    let mut last_err = ReplyError::Syntax("no reply".to_string());
    let max_attempts = config.json_reprompts + 1;

    for attempt in 1..=max_attempts {
        let text = match attempt {
            1 => prompt,
            _ => strict_prompt
                .get_or_insert_with(|| build_strict_prompt(prompt))
                .as_str(),
        };

        let completion = client
            .complete(text)
            .await
            .map_err(|e| e.into_extract_error(file_name))?;
        input_tokens += completion.prompt_tokens;
        output_tokens += completion.completion_tokens;

        match parse_reply(&completion.content, fields) {
            Ok(parsed) => {
                debug!("{}: parsed on attempt {}", file_name, attempt);
                let record = ExtractionRecord {
                    file_name: file_name.to_string(),
                    values: parsed.values,
                    missing_fields: parsed.missing_fields,
                    attempts: attempt,
                    input_tokens,
                    output_tokens,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                return Ok(DocumentOutcome {
                    result: Ok(record),
                    input_tokens,
                    output_tokens,
                });
            }
            Err(e) => {
                if attempt < max_attempts {
                    warn!(
                        "{}: unusable reply on attempt {}/{} ({:?}); re-prompting",
                        file_name, attempt, max_attempts, e
                    );
                }
                last_err = e;
            }
        }
    }

    let err = match last_err {
        ReplyError::Syntax(detail) => DocumentError::InvalidJson {
            file_name: file_name.to_string(),
            attempts: max_attempts,
            detail,
        },
        ReplyError::NotAnObject { found } => DocumentError::NotAnObject {
            file_name: file_name.to_string(),
            attempts: max_attempts,
            found: found.to_string(),
        },
    };

    Ok(DocumentOutcome {
        result: Err(err),
        input_tokens,
        output_tokens,
    })
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_text(text: &str, max_chars: Option<usize>) -> (Cow<'_, str>, bool) {
    let Some(max) = max_chars else {
        return (Cow::Borrowed(text), false);
    };
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (Cow::Borrowed(&text[..byte_idx]), true),
        None => (Cow::Borrowed(text), false),
    }
}

/// Fill rate per distinct requested field, in request order.
fn fill_rates(table: &ResultTable, fields: &FieldList) -> Vec<FieldFillRate> {
    let mut rates: Vec<FieldFillRate> = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        if rates.iter().any(|r| r.field == field) {
            continue;
        }
        rates.push(FieldFillRate {
            field: field.to_string(),
            rate: table.fill_rate(field).unwrap_or(0.0),
        });
    }
    rates
}

fn no_documents() -> ExtractError {
    ExtractError::missing("PDF files", "Upload at least one PDF file to process.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let (t, cut) = truncate_text("ééééé", Some(3));
        assert_eq!(t, "ééé");
        assert!(cut);
    }

    #[test]
    fn truncate_is_noop_when_short_or_disabled() {
        assert_eq!(truncate_text("abc", Some(3)), (Cow::Borrowed("abc"), false));
        assert_eq!(truncate_text("abc", None), (Cow::Borrowed("abc"), false));
    }

    #[test]
    fn fill_rates_list_duplicates_once() {
        let fields = FieldList::parse("a,b,a").unwrap();
        let table = ResultTable {
            columns: vec!["file_name".into(), "a".into(), "b".into(), "a".into()],
            rows: vec![],
        };
        let rates = fill_rates(&table, &fields);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].field, "a");
        assert_eq!(rates[0].rate, 0.0);
    }
}

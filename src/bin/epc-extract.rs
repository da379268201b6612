//! CLI binary for epc-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, obtains the API key, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use console::Term;
use epc_extract::config::DEFAULT_PROVIDER;
use epc_extract::pipeline::llm::credential_env_var;
use epc_extract::progress::fraction_done;
use epc_extract::{
    extract_to_file, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, FieldList,
    ProgressCallback, PromptVariant, ScorePair, DEFAULT_MODEL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while text is extracted, then a
/// per-document bar with one log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the document currently in flight.
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting fields from {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, file_name: &str) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, file_name: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            file_name,
            dim(&format!("{:>6.2}%", fraction_done(index, total) * 100.0)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, _index: usize, _total: usize, file_name: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            file_name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents extracted  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract two fields from a batch of certificates
  epc-extract --fields address,postcode certs/*.pdf

  # Enhanced prompt: rating bands + score-order correction
  epc-extract --enhanced \
    --fields address,energy_rating,potential_energy_rating,energy_score,potential_energy_score \
    certs/*.pdf -o out/

  # Different model, longer call timeout, two transport retries
  epc-extract --model gpt-4o-mini --api-timeout 120 --max-retries 2 --fields address a.pdf

  # Send whole documents, however long
  epc-extract --no-truncate --fields address big.pdf

  # Print the full result as JSON as well
  epc-extract --json --fields address,postcode a.pdf b.pdf > result.json

OUTPUT:
  epc_data_<DD_MM_YY>.xlsx in --output-dir: a `file_name` column followed by
  the requested fields, one row per document whose reply parsed as JSON.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (prompted for if unset and on a terminal)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise ./ then the system library)
  RUST_LOG                Log filter, overrides -v/-q
"#;

/// Extract fields from PDF documents with an LLM and export them to a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "epc-extract",
    version,
    about = "Extract fields from PDF certificates and leases into a spreadsheet using an LLM",
    long_about = "Reads the text of each PDF, asks a chat model to return the requested fields \
as a JSON object, and writes one row per document to epc_data_<DD_MM_YY>.xlsx. Documents whose \
reply is not valid JSON are reported and left out of the table.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs, processed in the given order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Comma-separated field names, e.g. address,postcode,energy_rating.
    #[arg(short, long, env = "EPC_FIELDS")]
    fields: String,

    /// API key for the provider. Falls back to the provider's env var, then a masked prompt.
    #[arg(long)]
    api_key: Option<String>,

    /// LLM provider: openai, anthropic, gemini, mistral, ollama.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Use the enhanced prompt (rating bands, normalisation, score-order correction).
    #[arg(long, env = "EPC_ENHANCED")]
    enhanced: bool,

    /// Field holding the current energy rating letter (enhanced mode).
    #[arg(long, env = "EPC_CURRENT_RATING_FIELD", default_value = "energy_rating")]
    current_rating_field: String,

    /// Field holding the potential energy rating letter (enhanced mode).
    #[arg(long, env = "EPC_POTENTIAL_RATING_FIELD", default_value = "potential_energy_rating")]
    potential_rating_field: String,

    /// Field holding the current energy score (enhanced mode).
    #[arg(long, env = "EPC_CURRENT_SCORE_FIELD", default_value = "energy_score")]
    current_score_field: String,

    /// Field holding the potential energy score (enhanced mode).
    #[arg(long, env = "EPC_POTENTIAL_SCORE_FIELD", default_value = "potential_energy_score")]
    potential_score_field: String,

    /// Cap on document text sent to the model, in characters.
    #[arg(long, env = "EPC_MAX_TEXT_CHARS", default_value_t = epc_extract::config::DEFAULT_MAX_TEXT_CHARS)]
    max_text_chars: usize,

    /// Send the full document text regardless of length.
    #[arg(long, env = "EPC_NO_TRUNCATE")]
    no_truncate: bool,

    /// Re-prompts with a stricter instruction when a reply is not JSON (0–5).
    #[arg(long, env = "EPC_JSON_REPROMPTS", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(0..=5))]
    json_reprompts: u32,

    /// Transport retries per model call (exponential backoff).
    #[arg(long, env = "EPC_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call model timeout in seconds. Unset = wait indefinitely.
    #[arg(long, env = "EPC_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// LLM temperature (0.0–2.0). Unset = provider default.
    #[arg(long, env = "EPC_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens per document. Unset = provider default.
    #[arg(long, env = "EPC_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "EPC_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EPC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Directory the spreadsheet is written to.
    #[arg(short, long, env = "EPC_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Also print the structured result (ExtractionOutput) as JSON on stdout.
    #[arg(long, env = "EPC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EPC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EPC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EPC_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are hidden while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let fields = FieldList::parse(&cli.fields).context("No fields to extract")?;

    // ── Credential intake ────────────────────────────────────────────────
    // Done before the runtime starts: the key is handed to the provider
    // through its environment variable.
    let provider = cli
        .provider
        .clone()
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    ensure_api_key(&cli, &provider)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, provider, progress_cb)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let (output, path) = runtime
        .block_on(extract_to_file(&cli.inputs, &fields, &cli.output_dir, &config))
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        print_summary(&output, &path, show_progress);
    }

    Ok(())
}

/// Make the provider's API key available in its environment variable.
///
/// Order: `--api-key`, the variable itself, then a masked prompt when running
/// interactively. If none yields a key the library reports the missing input.
fn ensure_api_key(cli: &Cli, provider: &str) -> Result<()> {
    let Some(var) = credential_env_var(provider) else {
        return Ok(());
    };

    if let Some(key) = cli.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        std::env::set_var(var, key);
        return Ok(());
    }

    if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
        return Ok(());
    }

    let term = Term::stderr();
    if io::stdin().is_terminal() && term.is_term() {
        term.write_str(&format!("Enter your {provider} API key ({var}): "))
            .context("Failed to write prompt")?;
        let key = term
            .read_secure_line()
            .context("Failed to read API key")?;
        let key = key.trim();
        if !key.is_empty() {
            std::env::set_var(var, key);
        }
    }

    Ok(())
}

fn score_pair(cli: &Cli) -> ScorePair {
    ScorePair {
        current_rating: cli.current_rating_field.clone(),
        potential_rating: cli.potential_rating_field.clone(),
        current_score: cli.current_score_field.clone(),
        potential_score: cli.potential_score_field.clone(),
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(
    cli: &Cli,
    provider: String,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .provider_name(provider)
        .model(cli.model.clone())
        .variant(if cli.enhanced {
            PromptVariant::Enhanced
        } else {
            PromptVariant::Basic
        })
        .score_pair(score_pair(cli))
        .max_text_chars((!cli.no_truncate).then_some(cli.max_text_chars))
        .json_reprompts(cli.json_reprompts)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ExtractionOutput, path: &Path, show_progress: bool) {
    let stats = &output.stats;

    // The progress callback already printed one line per document.
    if !show_progress {
        for failure in &output.failures {
            eprintln!("  {} {}", red("✗"), failure);
        }
    }

    eprintln!(
        "{}  Success Percentage: {}  ({}/{} documents)",
        if stats.failed_documents == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&format!("{:.2}%", stats.success_percentage())),
        stats.extracted_documents,
        stats.total_documents,
    );

    if stats.extracted_documents > 0 {
        for rate in &stats.field_fill_rates {
            eprintln!(
                "   {:<32} {}",
                rate.field,
                dim(&format!("{:>6.2}% filled", rate.rate * 100.0))
            );
        }
    }
    if stats.swapped_scores > 0 {
        eprintln!("   {} rows had current/potential scores swapped", stats.swapped_scores);
    }
    if stats.truncated_documents > 0 {
        eprintln!(
            "   {} documents truncated to fit the text cap",
            stats.truncated_documents
        );
    }

    eprintln!(
        "   {} tokens in  /  {} tokens out  —  {}ms total",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.total_duration_ms,
    );
    eprintln!("   →  {}", bold(&path.display().to_string()));
}

//! CLI binary for searchable-pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use searchable_pdf::{
    check_service, convert_to_file, BboxOrder, CancellationToken, ConversionConfig,
    ConversionReport, ProgressEvent, SearchablePdfError, SharedObserver,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one scan (writes scan_ocr.pdf next to it)
  searchable-pdf scan.pdf

  # Choose the output file
  searchable-pdf scan.pdf -o searchable.pdf

  # Several documents against a remote GPU box
  searchable-pdf --service-url http://gpu-box:11434 *.pdf

  # Is the service up and the model pulled?
  searchable-pdf --check

  # Machine-readable per-page report
  searchable-pdf --json scan.pdf > report.json

SETUP:
  1. Install Ollama and pull the model:   ollama pull deepseek-ocr
  2. Make libpdfium available (next to the binary, in the working
     directory, or via PDFIUM_LIB_PATH)
  3. Convert:                             searchable-pdf scan.pdf

ENVIRONMENT VARIABLES:
  SEARCHABLE_PDF_SERVICE_URL   Ollama base URL
  SEARCHABLE_PDF_MODEL         Model name substring
  PDFIUM_LIB_PATH              Path to libpdfium (file or directory)
  RUST_LOG                     Log filter, overrides -v / -q
"#;

/// Turn scanned PDFs into searchable PDFs with DeepSeek-OCR.
#[derive(Parser, Debug)]
#[command(
    name = "searchable-pdf",
    version,
    about = "Turn scanned PDFs into searchable PDFs with DeepSeek-OCR via Ollama",
    long_about = "Recognise the text of scanned PDF pages with the DeepSeek-OCR vision model \
served by a local Ollama instance, and write a copy of each document with an invisible, \
position-matched text layer over the original scan.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned PDF files to convert.
    #[arg(required_unless_present = "check")]
    inputs: Vec<PathBuf>,

    /// Output file (only with a single input). Default: <stem>_ocr.pdf.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ollama base URL.
    #[arg(long, env = "SEARCHABLE_PDF_SERVICE_URL", default_value = "http://localhost:11434")]
    service_url: String,

    /// Model name substring matched against the Ollama catalog.
    #[arg(long, env = "SEARCHABLE_PDF_MODEL", default_value = "deepseek-ocr")]
    model: String,

    /// Grounded attempt timeout in seconds.
    #[arg(long, env = "SEARCHABLE_PDF_GROUNDED_TIMEOUT", default_value_t = 60)]
    grounded_timeout: u64,

    /// Free-text fallback timeout in seconds (must exceed the grounded timeout).
    #[arg(long, env = "SEARCHABLE_PDF_FALLBACK_TIMEOUT", default_value_t = 180)]
    fallback_timeout: u64,

    /// Maximum silence between streamed chunks in seconds.
    #[arg(long, env = "SEARCHABLE_PDF_CHUNK_TIMEOUT", default_value_t = 30)]
    chunk_timeout: u64,

    /// Rendering DPI for pages without a usable embedded scan (72–600).
    #[arg(long, env = "SEARCHABLE_PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// TrueType font for the text layer, tried before the built-in list.
    #[arg(long, env = "SEARCHABLE_PDF_FONT")]
    font: Option<PathBuf>,

    /// Coordinate order of the model's bounding boxes.
    #[arg(long, env = "SEARCHABLE_PDF_BBOX_ORDER", value_enum, default_value = "xyxy")]
    bbox_order: BboxOrderArg,

    /// Suffix appended to the input stem for default output names.
    #[arg(long, env = "SEARCHABLE_PDF_SUFFIX", default_value = "_ocr")]
    suffix: String,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// Only check that the service is reachable and the model is pulled.
    #[arg(long)]
    check: bool,

    /// Print conversion reports as JSON on stdout.
    #[arg(long, env = "SEARCHABLE_PDF_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "SEARCHABLE_PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SEARCHABLE_PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SEARCHABLE_PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BboxOrderArg {
    Xyxy,
    Yxyx,
}

impl From<BboxOrderArg> for BboxOrder {
    fn from(v: BboxOrderArg) -> Self {
        match v {
            BboxOrderArg::Xyxy => BboxOrder::XyXy,
            BboxOrderArg::Yxyx => BboxOrder::YxYx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v is given.
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

    let config = build_config(&cli)?;

    // ── Check-only mode ──────────────────────────────────────────────────
    if cli.check {
        let model = check_service(&config)
            .await
            .with_context(|| format!("OCR service check failed ({})", config.service_url))?;
        if !cli.quiet {
            eprintln!("{} {} serves {}", green("✔"), config.service_url, bold(&model));
        }
        return Ok(());
    }

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output can only be used with a single input file");
    }

    // ── Ctrl-C → cooperative cancellation ───────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", yellow("Cancelling after the current request..."));
                cancel.cancel();
            }
        });
    }

    // ── Run conversions ──────────────────────────────────────────────────
    let mut reports = Vec::with_capacity(cli.inputs.len());
    let mut failures = 0usize;

    for input in &cli.inputs {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output(input, &config.output_suffix));

        let bar = show_progress.then(|| document_bar(input));
        let observer: SharedObserver = match &bar {
            Some(bar) => bar_observer(bar.clone()),
            None => Arc::new(searchable_pdf::NoopProgress),
        };

        let result = convert_to_file(input, &output, &config, observer, cancel.clone()).await;
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }

        match result {
            Ok(report) => {
                if !cli.quiet && !cli.json {
                    print_summary(&report);
                }
                reports.push(report);
            }
            Err(SearchablePdfError::Cancelled) => {
                eprintln!("{} {}: cancelled, no output written", red("✘"), input.display());
                failures += 1;
                break;
            }
            Err(e) => {
                eprintln!("{} {}: {}", red("✘"), input.display(), red(&e.to_string()));
                failures += 1;
                if matches!(e, SearchablePdfError::Service(_)) {
                    // The next document would hit the same service.
                    break;
                }
            }
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialise reports")?;
        println!("{json}");
    }

    if failures > 0 {
        anyhow::bail!(
            "{} of {} document(s) failed",
            failures,
            cli.inputs.len()
        );
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .service_url(&cli.service_url)
        .model(&cli.model)
        .grounded_timeout_secs(cli.grounded_timeout)
        .fallback_timeout_secs(cli.fallback_timeout)
        .chunk_timeout_secs(cli.chunk_timeout)
        .render_dpi(cli.dpi)
        .bbox_order(cli.bbox_order.into())
        .output_suffix(&cli.suffix);

    if let Some(ref font) = cli.font {
        builder = builder.prefer_font(font);
    }
    if let Some(ref lib) = cli.pdfium {
        builder = builder.pdfium_library_path(lib);
    }

    builder.build().context("Invalid configuration")
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    searchable_pdf::pipeline::input::output_path_for(input, suffix)
}

/// One spinner-then-bar per document, labelled with the file name.
fn document_bar(input: &Path) -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix(
        input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string()),
    );
    bar.set_message("Opening PDF...");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Observer that mirrors the latest event onto `bar`, switching from the
/// spinner to a counted bar once the page total is known.
fn bar_observer(bar: ProgressBar) -> SharedObserver {
    Arc::new(move |event: &ProgressEvent| {
        if event.total > 0 && bar.length() != Some(event.total as u64) {
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>3}/{len}  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS);
            bar.set_style(style);
            bar.set_length(event.total as u64);
        }
        if event.total > 0 {
            // `current` is the page being worked on; count finished pages.
            let done = if event.current == event.total && event.message == "Done" {
                event.total
            } else {
                event.current.saturating_sub(1)
            };
            bar.set_position(done as u64);
        }
        bar.set_message(event.message.clone());
    })
}

fn print_summary(report: &ConversionReport) {
    let total = report.total_pages();
    let mark = if report.recognized_pages == total {
        green("✔")
    } else if report.recognized_pages + report.degraded_pages > 0 {
        yellow("⚠")
    } else {
        red("✘")
    };
    eprintln!(
        "{}  {}/{} pages recognised  {}ms  →  {}",
        mark,
        report.recognized_pages,
        total,
        report.total_duration_ms,
        bold(&report.output.display().to_string()),
    );
    if report.degraded_pages + report.empty_pages > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} page(s) with unpositioned text, {} page(s) without text",
                report.degraded_pages, report.empty_pages
            ))
        );
    }
}

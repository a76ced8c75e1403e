//! CLI binary for mmd2svg.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, wires Ctrl-C to an `Interrupt`, prints results, and
//! turns the batch status into the process exit code.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mmd2svg::{
    convert_with_interrupt, inspect, BatchReport, BatchStatus, ConversionConfig,
    ConversionProgressCallback, Interrupt, OutputFormat, ProgressCallback, EXIT_INTERRUPTED,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a progress bar plus one log line per failed
/// attempt and per finished diagram.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the diagram currently being rendered.
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_conversion_start
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} diagrams  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Rendering");

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_diagrams: usize) {
        self.bar.set_length(total_diagrams as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_diagrams} diagrams"))
        ));
    }

    fn on_diagram_start(&self, ordinal: usize, _total: usize) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("diagram {ordinal}"));
    }

    fn on_attempt_failed(
        &self,
        ordinal: usize,
        attempt: u32,
        max_attempts: u32,
        reason: &str,
        retry_in: Option<Duration>,
    ) {
        let next = match retry_in {
            Some(delay) => format!("retrying in {:.1}s", delay.as_secs_f64()),
            None => "giving up".to_string(),
        };
        self.bar.println(format!(
            "  {} Diagram {:>3}  attempt {}/{}: {}  {}",
            yellow("↻"),
            ordinal,
            attempt,
            max_attempts,
            reason,
            dim(&next),
        ));
    }

    fn on_diagram_complete(&self, ordinal: usize, total: usize, artifact_len: usize) {
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&format!("{artifact_len:>7} bytes")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {}  {}",
            red("✗"),
            ordinal,
            total,
            red(&msg),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render every ```mermaid block of deck.mmd into deck/diagram_NNN.svg
  mmd2svg deck.mmd

  # List the diagrams without contacting the service
  mmd2svg --list deck.mmd

  # PNG output into a custom directory
  mmd2svg --format png --output-dir build/diagrams deck.mmd

  # Self-hosted renderer, fewer and faster retries
  mmd2svg --base-url http://localhost:3000 --max-attempts 3 --retry-delay 0.5 deck.mmd

  # Machine-readable report
  mmd2svg --json deck.mmd > report.json

EXIT STATUS:
  0    at least one diagram rendered
  1    no diagrams found, none rendered, service unreachable, or a fatal error
  130  interrupted with Ctrl-C (partial results are kept)

ENVIRONMENT VARIABLES:
  MMD2SVG_BASE_URL      Rendering service root (default https://mermaid.ink)
  MMD2SVG_OUTPUT_DIR    Output directory override
  RUST_LOG              Log filter, e.g. RUST_LOG=mmd2svg=debug
"#;

/// Render the Mermaid diagrams of a document to SVG files.
#[derive(Parser, Debug)]
#[command(
    name = "mmd2svg",
    version,
    about = "Render the Mermaid diagrams embedded in a document to SVG files",
    long_about = "Extract every ```mermaid fenced block from a text document, render each one \
through a mermaid.ink-compatible service, and save the results as numbered files in a directory \
named after the document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document containing ```mermaid blocks (usually .mmd).
    input: PathBuf,

    /// Write files here instead of a directory named after the document.
    #[arg(short, long, env = "MMD2SVG_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Rendering service root URL.
    #[arg(long, env = "MMD2SVG_BASE_URL", default_value = mmd2svg::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Output format.
    #[arg(long, env = "MMD2SVG_FORMAT", value_enum, default_value = "svg")]
    format: FormatArg,

    /// Fence language tag that marks a diagram.
    #[arg(long = "lang", env = "MMD2SVG_LANG", default_value = "mermaid")]
    language: String,

    /// Attempts per diagram, including the first.
    #[arg(long, env = "MMD2SVG_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Seconds to wait between attempts.
    #[arg(long, env = "MMD2SVG_RETRY_DELAY", default_value_t = 2.0)]
    retry_delay: f64,

    /// Per-request timeout in seconds.
    #[arg(long, env = "MMD2SVG_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// List the diagrams found and exit; no network access.
    #[arg(long)]
    list: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "MMD2SVG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MMD2SVG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MMD2SVG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MMD2SVG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Svg,
    Png,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Svg => OutputFormat::Svg,
            FormatArg::Png => OutputFormat::Png,
        }
    }
}

/// What a Ctrl-C does, given how many have been received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Stop before the next diagram or attempt and keep partial results.
    Interrupt,
    /// Exit immediately without waiting for the in-flight request.
    ForceExit,
}

fn signal_action(received: usize) -> SignalAction {
    if received <= 1 {
        SignalAction::Interrupt
    } else {
        SignalAction::ForceExit
    }
}

/// First Ctrl-C triggers `interrupt`; a second one exits the process.
async fn watch_ctrl_c(interrupt: Interrupt) {
    let mut received = 0;
    while tokio::signal::ctrl_c().await.is_ok() {
        received += 1;
        match signal_action(received) {
            SignalAction::Interrupt => {
                interrupt.trigger();
                eprintln!(
                    "\n{} Stopping after the current request (Ctrl-C again to quit now)",
                    yellow("⚠")
                );
            }
            SignalAction::ForceExit => std::process::exit(EXIT_INTERRUPTED),
        }
    }
}

/// Exit status for fatal errors, shared with a run where nothing rendered.
const EXIT_FATAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs when it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list;
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

    let input = std::path::absolute(&cli.input)
        .with_context(|| format!("Failed to resolve path {:?}", cli.input))?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list {
        let config = build_config(&cli, None)?;
        let inspection = inspect(&input, &config)
            .await
            .context("Failed to read document")?;

        if cli.json {
            let json = serde_json::to_string_pretty(&inspection)
                .context("Failed to serialise diagrams")?;
            println!("{json}");
        } else {
            println!("File:         {}", inspection.source.display());
            println!("Output dir:   {}", inspection.output_dir.display());
            println!("Diagrams:     {}", inspection.diagrams.len());
            for block in &inspection.diagrams {
                let first = block.source.lines().next().unwrap_or("").trim();
                let lines = format!("{} lines", block.source.lines().count());
                println!("  {:>3}  {:<40}  {}", block.ordinal, first, dim(&lines));
            }
        }
        return Ok(if inspection.diagrams.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if !cli.quiet && !cli.json {
        let heading = format!("Converting {}", input.display());
        eprintln!("{} {}", cyan("◆"), bold(&heading));
    }

    // ── Ctrl-C → interrupt ───────────────────────────────────────────────
    let interrupt = Interrupt::new();
    tokio::spawn(watch_ctrl_c(interrupt.clone()));

    // ── Run conversion ───────────────────────────────────────────────────
    let report = convert_with_interrupt(&input, &config, &interrupt)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::json!({
            "status": report.status(),
            "exit_code": report.exit_code(),
            "report": &report,
        });
        let json = serde_json::to_string_pretty(&json)
            .context("Failed to serialise report")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(&report);
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let retry_delay = Duration::try_from_secs_f64(cli.retry_delay)
        .with_context(|| format!("Invalid --retry-delay {}", cli.retry_delay))?;

    let mut builder = ConversionConfig::builder()
        .base_url(&cli.base_url)
        .format(cli.format.into())
        .language(&cli.language)
        .max_attempts(cli.max_attempts)
        .retry_delay(retry_delay)
        .timeout(Duration::from_secs(cli.timeout));

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Final human-readable summary on stderr.
fn print_summary(report: &BatchReport) {
    let counts = bold(&format!("{}/{}", report.succeeded, report.total_diagrams));
    match report.status() {
        BatchStatus::AllSucceeded => {
            eprintln!("{} Conversion completed: {counts} diagrams", green("✔"));
        }
        BatchStatus::PartialSuccess => {
            eprintln!("{} Partially completed: {counts} diagrams", yellow("⚠"));
            eprintln!("  {} diagrams could not be rendered", report.failed());
        }
        BatchStatus::AllFailed => {
            eprintln!("{} Conversion failed: {counts} diagrams", red("✘"));
            eprintln!("  Check the diagram syntax and the rendering service");
        }
        BatchStatus::NoneFound => {
            let source = bold(&report.source.display().to_string());
            eprintln!("{} No diagrams found in {source}", red("✘"));
            return;
        }
        BatchStatus::Aborted => {
            eprintln!("{} Conversion aborted: {counts} diagrams", red("✘"));
            if let Some(ref e) = report.aborted {
                eprintln!("  {e}");
            }
            let skipped = report.not_attempted();
            eprintln!("  {skipped} diagrams not attempted; check your connection");
        }
        BatchStatus::Interrupted => {
            eprintln!("{} Interrupted by user: {counts} diagrams", yellow("⚠"));
        }
    }
    if report.succeeded > 0 {
        eprintln!("  Files saved to: {}", report.output_dir.display());
    }
    eprintln!("  {}", dim(&format!("{}ms total", report.duration_ms)));
}

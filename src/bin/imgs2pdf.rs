//! CLI binary for imgs2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` / `SelectionState` and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use imgs2pdf::{
    spawn_conversion, ConversionConfig, ConversionResult, FailureKind, OversizeWarning,
    ProgressCallback, ProgressEvent, ProgressSink, Selection, SelectionState, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Oversize warnings listed before the rest are summarised.
const MAX_LISTED_WARNINGS: usize = 10;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

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

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: a spinner while collecting, then a bar per
/// per-item stage. Also answers the oversize confirmation.
struct CliProgressSink {
    bar: ProgressBar,
    assume_yes: bool,
    quiet: bool,
}

impl CliProgressSink {
    fn new(show_progress: bool, assume_yes: bool, quiet: bool) -> Arc<Self> {
        let bar = if show_progress {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS),
            );
            bar.set_prefix("Preparing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        Arc::new(Self {
            bar,
            assume_yes,
            quiet,
        })
    }

    /// Switch to the full progress-bar style for a per-item stage.
    fn activate_bar(&self, prefix: &'static str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }

    fn print_warnings(&self, warnings: &[OversizeWarning]) {
        eprintln!(
            "{} {} image(s) exceed the resolution limit:",
            yellow("⚠"),
            bold(&warnings.len().to_string())
        );
        for w in warnings.iter().take(MAX_LISTED_WARNINGS) {
            eprintln!("    {w}");
        }
        if warnings.len() > MAX_LISTED_WARNINGS {
            eprintln!("    ... and {} more", warnings.len() - MAX_LISTED_WARNINGS);
        }
    }
}

impl ProgressSink for CliProgressSink {
    fn on_stage(&self, stage: Stage) {
        match stage {
            Stage::Collecting => self.bar.set_message("Collecting images…"),
            Stage::PolicyCheck => self.bar.set_message("Checking images…"),
            Stage::Done => self.bar.finish_and_clear(),
            _ => {}
        }
    }

    fn on_progress(&self, event: &ProgressEvent) {
        if event.current_index == 1 {
            let prefix = match event.stage {
                Stage::Assembling => "Embedding",
                _ => "Validating",
            };
            self.activate_bar(prefix, event.total);
        }
        let name = event
            .current_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_position(event.current_index as u64);
        self.bar.set_message(dim(&name));
    }

    fn confirm_oversized(&self, warnings: &[OversizeWarning]) -> bool {
        self.bar.suspend(|| {
            if !self.quiet {
                self.print_warnings(warnings);
            }
            if self.assume_yes || !io::stdin().is_terminal() {
                return true;
            }
            dialoguer::Confirm::new()
                .with_prompt("Large images make a large PDF. Continue?")
                .default(true)
                .interact()
                .unwrap_or(false)
        })
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every image in a folder → <folder>/result/merged_<timestamp>.pdf
  imgs2pdf ~/scans

  # Hand-picked files, explicit output
  imgs2pdf page1.jpg page2.jpg page10.png -o out -n chapter1

  # Include sub-folders, refuse anything above 20 MP
  imgs2pdf --recursive --max-pixels 20000000 --strict-resolution ~/photos

  # Machine-readable result
  imgs2pdf --json --yes ~/scans > result.json

ORDERING:
  Pages follow natural file-name order: img1, img2, img10 (not img1, img10, img2).

ENCODING:
  JPEG files are embedded byte-for-byte. Non-interlaced PNG files without a
  transparency chunk keep their compressed data. Other images are decoded once
  and stored with lossless Flate compression.

EXIT STATUS:
  0    PDF written
  130  cancelled (Ctrl-C, or oversize confirmation declined)
  1    any other failure
"#;

/// Merge images into a single PDF, one page per image, without re-encoding.
#[derive(Parser, Debug)]
#[command(
    name = "imgs2pdf",
    version,
    about = "Merge images into one PDF without re-encoding them",
    long_about = "Merge a folder, or a list of image files, into a single PDF. Each image \
becomes one page of exactly its own size. JPEG and most PNG data is embedded as-is.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files, or a folder (the first folder given wins).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory. Default: `result` inside the source folder.
    #[arg(short, long, env = "IMGS2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Output file name (`.pdf` is appended if missing).
    #[arg(short = 'n', long, env = "IMGS2PDF_NAME")]
    name: Option<String>,

    /// Include images in sub-folders.
    #[arg(short, long, env = "IMGS2PDF_RECURSIVE")]
    recursive: bool,

    /// Pixel-area ceiling (width × height) for the oversize warning.
    #[arg(long, env = "IMGS2PDF_MAX_PIXELS", default_value_t = imgs2pdf::config::DEFAULT_MAX_PIXELS,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_pixels: u64,

    /// Fail instead of warning when an image is at or above the ceiling.
    #[arg(long, env = "IMGS2PDF_STRICT_RESOLUTION")]
    strict_resolution: bool,

    /// Do not ask for confirmation on oversized images.
    #[arg(short = 'y', long, env = "IMGS2PDF_YES")]
    yes: bool,

    /// Document title stored in the PDF metadata.
    #[arg(long, env = "IMGS2PDF_TITLE")]
    title: Option<String>,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "IMGS2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMGS2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMGS2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMGS2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
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

    // ── Resolve selection ────────────────────────────────────────────────
    for missing in cli.inputs.iter().filter(|p| !p.exists()) {
        if !cli.quiet {
            eprintln!("{} skipping '{}': no such file", yellow("⚠"), missing.display());
        }
    }
    let mut state = SelectionState::with_default_output(Selection::from_dropped(&cli.inputs));
    if let Some(ref dir) = cli.output_dir {
        state = state.with_output_dir(dir);
    }
    if let Some(ref name) = cli.name {
        state = state.with_output_filename(name);
    }

    let sink = CliProgressSink::new(show_progress, cli.yes, cli.quiet);
    let config = build_config(&cli, sink)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let handle = spawn_conversion(state, config);
    let cancellation = handle.cancellation();
    let quiet = cli.quiet;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !quiet {
                eprintln!("{} cancelling after the current image…", yellow("⚠"));
            }
            cancellation.cancel();
        }
    });
    let result = handle.finish().await;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_summary(&result);
    } else if let ConversionResult::Failure { message, .. } = &result {
        eprintln!("{message}");
    }

    Ok(match result.failure_kind() {
        None => ExitCode::SUCCESS,
        Some(FailureKind::Cancelled) => ExitCode::from(130),
        Some(_) => ExitCode::FAILURE,
    })
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, sink: ProgressCallback) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_pixels(cli.max_pixels)
        .strict_resolution(cli.strict_resolution)
        .recursive(cli.recursive)
        .progress_sink(sink);
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(result: &ConversionResult) {
    let diagnostics = result.diagnostics();
    for excluded in &diagnostics.exclusions {
        eprintln!("  {} {}", red("✗"), excluded);
    }

    match result {
        ConversionResult::Success { output_path, .. } => {
            let stats = &diagnostics.stats;
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                green("✔"),
                stats.pages,
                stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} embedded as-is, {} re-encoded, {} skipped, {} bytes",
                    stats.embedded_direct,
                    stats.reencoded,
                    diagnostics.exclusions.len(),
                    stats.output_bytes
                )),
            );
        }
        ConversionResult::Failure { kind, message, .. } => {
            let mark = if *kind == FailureKind::Cancelled {
                yellow("■")
            } else {
                red("✘")
            };
            eprintln!("{mark} {message}");
        }
    }
}

//! CLI binary for pdf-sequencer.
//!
//! A thin shim over the library crate: loads credentials, configuration
//! files and the sequence, connects to the service and runs the batch.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_sequencer::{
    Admission, BatchOutput, BatchProgressCallback, Credentials, FileStatus, PollPolicy,
    ProgressCallback, RunConfig, RunOptions, RunSettings, Sequence, Sequencer, SequencerError,
    ServerFonts, ServiceClient, SupportedFormats,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
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

/// Terminal progress callback: one bar over the admitted files, one log line
/// per step and per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    root: PathBuf,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(root: &Path) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            root: root.to_path_buf(),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn short(&self, file: &Path) -> String {
        file.strip_prefix(&self.root)
            .unwrap_or(file)
            .display()
            .to_string()
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} files…"))
        ));
    }

    fn on_file_start(&self, file: &Path, _index: usize, _total_files: usize) {
        self.bar.set_message(self.short(file));
    }

    fn on_step_complete(&self, _file: &Path, index: usize, operation: &str, duration_ms: u64) {
        self.bar.println(format!(
            "    {} {:<2} {:<16} {}",
            dim("·"),
            index,
            operation,
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_file_complete(&self, file: &Path, outputs: usize, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            self.short(file),
            dim(&format!("{outputs} outputs")),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_file_skipped(&self, file: &Path, reason: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("–"),
            self.short(file),
            dim(reason)
        ));
        if self.bar.length().unwrap_or(0) > 0 {
            self.bar.inc(1);
        }
    }

    fn on_file_error(&self, file: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            self.short(file),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, completed: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if completed == total_files {
            eprintln!(
                "{} {} files processed successfully",
                green("✔"),
                bold(&completed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files processed  ({} failed)",
                if completed == 0 { red("✘") } else { cyan("⚠") },
                bold(&completed.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every Office document to PDF, then OCR it
  echo '[{"operation":"createpdf"},{"operation":"ocrpdf"}]' > seq.json
  pdf-sequencer ./in ./out seq.json

  # Protect with passwords supplied at run time, then move the sources
  pdf-sequencer ./in ./out protect.json userPassword=s3cret \
      permissions=PRINT_LOW_QUALITY,COPY_CONTENT moveProcessed=true

  # Page images and document properties
  echo '[{"operation":"pdftoimages","parameters":{"targetFormat":"jpeg"}},
         {"operation":"pdfproperties"}]' > seq.json
  pdf-sequencer ./scans ./out seq.json --json

RUN PARAMETERS (KEY=VALUE after the sequence file):
  ownerPassword   merged into protectpdf's passwordProtection
  userPassword    merged into protectpdf's passwordProtection
  permissions     comma-separated list, replaces protectpdf's permissions
  moveProcessed   true/1/yes: move each completed source into the output tree

CONFIGURATION FILES:
  config/config.json              {"preventFontSubstitution": true}
  config/supported-formats.json   {"all": ["docx", …], "fontCheck": ["docx"]}
  config/create-pdf-fonts.txt     one installed server font per line

ENVIRONMENT VARIABLES:
  CLIENT_ID       service client identifier (required)
  CLIENT_SECRET   service client secret (required)
  RUST_LOG        override log filter, e.g. pdf_sequencer=debug

  A .env file in the working directory is read first.
"#;

/// Run a sequence of remote document operations over a folder.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-sequencer",
    version,
    about = "Run a sequence of remote document operations over a folder",
    long_about = "Upload every file under INPUT_DIR, run each step of SEQUENCE_FILE as a remote \
job on the result of the step before it, and write the outputs under OUTPUT_DIR at the same \
relative path.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder whose files are processed (recursively).
    input_dir: PathBuf,

    /// Folder receiving the outputs; created if absent.
    output_dir: PathBuf,

    /// JSON array of {"operation": …, "parameters": {…}} steps.
    sequence_file: PathBuf,

    /// Run parameters as KEY=VALUE (ownerPassword, userPassword, permissions, moveProcessed).
    #[arg(value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Run settings file.
    #[arg(long, env = "PDF_SEQUENCER_CONFIG", default_value = "config/config.json")]
    config: PathBuf,

    /// Newline-delimited list of fonts installed on the service.
    #[arg(long, env = "PDF_SEQUENCER_FONTS", default_value = "config/create-pdf-fonts.txt")]
    fonts: PathBuf,

    /// Supported createpdf input formats.
    #[arg(
        long,
        env = "PDF_SEQUENCER_FORMATS",
        default_value = "config/supported-formats.json"
    )]
    formats: PathBuf,

    /// Service base URL.
    #[arg(long, env = "PDF_SEQUENCER_API_URL")]
    api_url: Option<String>,

    /// OAuth2 token endpoint.
    #[arg(long, env = "PDF_SEQUENCER_TOKEN_URL")]
    token_url: Option<String>,

    /// Initial wait between job status queries, in milliseconds.
    #[arg(long, env = "PDF_SEQUENCER_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Give up on a job after this many seconds; 0 waits forever, polling
    /// at a fixed interval.
    #[arg(long, env = "PDF_SEQUENCER_POLL_MAX_WAIT_SECS", default_value_t = 1800)]
    poll_max_wait_secs: u64,

    /// Service client identifier.
    #[arg(long, env = "CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// Service client secret.
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Print the batch report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_SEQUENCER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
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

    // ── Credentials and inputs ───────────────────────────────────────────
    let credentials = credentials(&cli)?;
    let sequence = Sequence::load(&cli.sequence_file).context("Invalid sequence")?;
    let options = RunOptions::parse(&cli.params);
    let settings = RunSettings::load(&cli.config)?;
    let formats = SupportedFormats::load(&cli.formats)?;
    let server_fonts = settings
        .prevent_font_substitution
        .then(|| ServerFonts::load(&cli.fonts));
    info!("Sequence: {}", sequence.describe());

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new(&cli.input_dir) as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, &settings, progress)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let client = ServiceClient::connect(&config, &credentials)
        .await
        .context("Could not authenticate with the document service")?;
    let sequencer = Sequencer::new(Arc::new(client), config, options)
        .with_admission(Admission::new(formats, server_fonts));
    let output = sequencer
        .run(&cli.input_dir, &cli.output_dir, &sequence)
        .await
        .context("Run aborted")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, show_progress);
    }
    Ok(())
}

fn credentials(cli: &Cli) -> Result<Credentials, SequencerError> {
    let require = |value: &Option<String>, var: &'static str| {
        value
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(SequencerError::MissingCredentials { var })
    };
    Ok(Credentials {
        client_id: require(&cli.client_id, Credentials::CLIENT_ID_VAR)?,
        client_secret: require(&cli.client_secret, Credentials::CLIENT_SECRET_VAR)?,
    })
}

/// Map CLI args and the settings file to `RunConfig`.
fn build_config(
    cli: &Cli,
    settings: &RunSettings,
    progress: Option<ProgressCallback>,
) -> Result<RunConfig> {
    let max_wait = (cli.poll_max_wait_secs > 0).then(|| Duration::from_secs(cli.poll_max_wait_secs));
    let poll = PollPolicy::starting_at(Duration::from_millis(cli.poll_interval_ms), max_wait);

    let mut builder = RunConfig::builder()
        .poll_policy(poll)
        .prevent_font_substitution(settings.prevent_font_substitution);
    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref url) = cli.token_url {
        builder = builder.token_url(url.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(output: &BatchOutput, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        for report in &output.files {
            match &report.status {
                FileStatus::Completed => eprintln!(
                    "  {} {}  {}",
                    green("✓"),
                    report.input.display(),
                    dim(&format!("{} outputs", report.outputs.len()))
                ),
                FileStatus::Skipped(reason) => eprintln!(
                    "  {} {}  {}",
                    yellow("–"),
                    report.input.display(),
                    dim(&reason.to_string())
                ),
                FileStatus::Failed(error) => eprintln!(
                    "  {} {}  {}",
                    red("✗"),
                    report.input.display(),
                    red(&error.to_string())
                ),
            }
        }
    }
    eprintln!(
        "{}  {} completed, {} skipped, {} failed  {} outputs  {}ms",
        if stats.failed_files == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.completed_files,
        stats.skipped_files,
        stats.failed_files,
        stats.outputs_written,
        stats.total_duration_ms,
    );
}

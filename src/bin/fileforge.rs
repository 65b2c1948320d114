//! CLI binary for fileforge.
//!
//! A thin shim over the library crate: flags map to `ClientConfig`, every
//! command drives a `Session`, and workflow runs render their step events
//! with an indicatif progress bar.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fileforge::auth::{FileCredentialStore, LoginPrompt, MemoryCredentialStore, LOGIN_SAVED_MESSAGE};
use fileforge::{
    Action, ActionResult, ClientConfig, CredentialStore, CropRect, ForgeClient, ImageMode, RecordError,
    ResizeSpec, Session, StepKind, WorkflowProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
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

/// Terminal progress for workflow runs: one bar over the steps plus a log
/// line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
    labels: Mutex<HashMap<usize, (String, Instant)>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Workflow");
        bar.set_message("Uploading…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            labels: Mutex::new(HashMap::new()),
        })
    }
}

impl WorkflowProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_steps: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len} steps  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_steps as u64);
        self.bar.set_style(style);
        self.bar.set_message("Starting workflow...");
    }

    fn on_step_start(&self, step: usize, label: &str, _total_steps: usize) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.insert(step, (label.to_string(), Instant::now()));
        }
        self.bar.set_message(format!("Processing: {label}"));
    }

    fn on_step_complete(&self, step: usize) {
        let (label, elapsed) = self
            .labels
            .lock()
            .ok()
            .and_then(|mut l| l.remove(&step))
            .map(|(label, t)| (label, t.elapsed()))
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} Step {:>2}  {:<20}  {}",
            green("✓"),
            step + 1,
            label,
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
        self.bar.inc(1);
    }

    fn on_record_skipped(&self, error: &RecordError) {
        self.bar.println(format!("  {} {}", cyan("⚠"), dim(&error.to_string())));
    }

    fn on_complete(&self, _result: &ActionResult) {
        self.bar.finish_and_clear();
    }

    fn on_error(&self, detail: &str) {
        self.bar.abandon_with_message(red(detail));
    }
}

/// Login prompt for a terminal: tells the user how to store a key.
struct TerminalLoginPrompt;

impl LoginPrompt for TerminalLoginPrompt {
    fn request_credential(&self) {
        eprintln!(
            "{} {}",
            red("✘"),
            bold("The server needs an API key. Run `fileforge login` and retry.")
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store the API key once
  fileforge login

  # PDF to Word, AI layout analysis, fetch the result
  fileforge convert report.pdf --ai -o .

  # Remove a PDF password
  fileforge unlock locked.pdf --password hunter2

  # Resize to half size, or to at most 300 KB
  fileforge resize photo.png --percentage 50
  fileforge resize photo.png --target-kb 300

  # Crop (centred 80% region unless a rectangle is given)
  fileforge crop photo.heic --x 10 --y 10 --width 400 --height 300

  # Chain steps server-side and follow their progress
  fileforge workflow scan.pdf --step remove_password:password=pw --step pdf_to_word -o out/

STEP SPECS:
  type[:key=value,...]   types: pdf_to_word (alias convert_word), remove_password,
                         resize_image, crop_image, heic_to_jpeg

ENVIRONMENT VARIABLES:
  FILEFORGE_URL           Server base URL (default http://127.0.0.1:8001)
  FILEFORGE_API_KEY       API key; overrides the stored one
  FILEFORGE_CREDENTIALS   Credential file (default <config dir>/fileforge/credentials.json)
  RUST_LOG                Overrides the log filter
"#;

/// Convert PDFs and images with a File Forge server.
#[derive(Parser, Debug)]
#[command(
    name = "fileforge",
    version,
    about = "Convert PDFs and images with a File Forge server",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Server base URL.
    #[arg(long, global = true, env = "FILEFORGE_URL")]
    url: Option<String>,

    /// API key for this invocation (not stored).
    #[arg(long, global = true, env = "FILEFORGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Credential file.
    #[arg(long, global = true, env = "FILEFORGE_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Request timeout in seconds (default: none).
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILEFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILEFORGE_QUIET")]
    quiet: bool,

    /// Disable the workflow progress bar.
    #[arg(long, global = true, env = "FILEFORGE_NO_PROGRESS")]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an API key (read from stdin when omitted).
    Login { key: Option<String> },
    /// Forget the stored API key.
    Logout,
    /// Convert a PDF to Word.
    Convert {
        file: PathBuf,
        /// Use AI layout analysis.
        #[arg(long)]
        ai: bool,
        #[arg(long)]
        password: Option<String>,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Remove the password from a PDF.
    Unlock {
        file: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Convert a HEIC/HEIF image to JPEG.
    Heic {
        file: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Resize an image.
    #[command(group(clap::ArgGroup::new("size").required(true).multiple(true)
        .args(["width", "height", "percentage", "target_kb"])))]
    Resize {
        file: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long, conflicts_with_all = ["width", "height", "target_kb"])]
        percentage: Option<u32>,
        #[arg(long, conflicts_with_all = ["width", "height"])]
        target_kb: Option<u32>,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Crop an image.
    Crop {
        file: PathBuf,
        #[arg(long, requires_all = ["y", "width", "height"])]
        x: Option<u32>,
        #[arg(long)]
        y: Option<u32>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Run a multi-step workflow.
    Workflow {
        file: PathBuf,
        /// Step spec `type[:key=value,...]`; repeat in execution order.
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
        #[arg(short = 'o', long)]
        download_to: Option<PathBuf>,
    },
    /// Download a produced file.
    Download {
        name: String,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep library logs quiet while the progress bar owns the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Workflow { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let store: Arc<dyn CredentialStore> = match config.credentials_path {
        Some(ref path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(MemoryCredentialStore::new()),
    };
    let client = ForgeClient::with_parts(config, store, Arc::new(TerminalLoginPrompt))
        .context("Failed to create HTTP client")?;
    let mut session = Session::new(client);

    let (result, download_to) = match cli.command {
        Command::Login { ref key } => return login(session.client(), key.clone(), cli.quiet),
        Command::Logout => {
            session.client().logout().context("Failed to forget the API key")?;
            if !cli.quiet {
                eprintln!("{} API key removed", green("✔"));
            }
            return Ok(());
        }
        Command::Download { ref name, ref output } => {
            let dest = destination(output.as_deref(), name);
            let bytes = session
                .client()
                .download(name, &dest)
                .await
                .with_context(|| format!("Failed to download {name}"))?;
            if !cli.quiet {
                eprintln!("{}  {} bytes  →  {}", green("✔"), bytes, bold(&dest.display().to_string()));
            }
            return Ok(());
        }
        Command::Convert {
            ref file,
            ai,
            ref password,
            ref download_to,
        } => {
            session.select_pdf(file)?;
            let action = Action::ConvertToWord {
                use_ai: ai,
                password: password.clone(),
            };
            (run_action(&mut session, &action, cli.quiet).await?, download_to.clone())
        }
        Command::Unlock {
            ref file,
            ref password,
            ref download_to,
        } => {
            session.select_pdf(file)?;
            let action = Action::RemovePassword {
                password: password.clone(),
            };
            (run_action(&mut session, &action, cli.quiet).await?, download_to.clone())
        }
        Command::Heic {
            ref file,
            quality,
            ref download_to,
        } => {
            session.select_image(file).await?;
            let quality = quality.unwrap_or(session.client().config().heic_quality);
            let action = Action::HeicToJpeg { quality };
            (run_action(&mut session, &action, cli.quiet).await?, download_to.clone())
        }
        Command::Resize {
            ref file,
            width,
            height,
            percentage,
            target_kb,
            ref download_to,
        } => {
            session.select_image(file).await?;
            let spec = match (percentage, target_kb) {
                (Some(p), _) => ResizeSpec::Percentage(p),
                (None, Some(kb)) => ResizeSpec::TargetSize { kb: Some(kb) },
                (None, None) => ResizeSpec::Dimensions { width, height },
            };
            (
                run_action(&mut session, &Action::Resize(spec), cli.quiet).await?,
                download_to.clone(),
            )
        }
        Command::Crop {
            ref file,
            x,
            y,
            width,
            height,
            ref download_to,
        } => {
            session.set_image_mode(ImageMode::Crop).await?;
            session.select_image(file).await.context("Failed to prepare the crop area")?;
            if let (Some(x), Some(y), Some(width), Some(height)) = (x, y, width, height) {
                session.select_crop(CropRect { x, y, width, height })?;
            }
            let result = session.crop().await.context("Crop failed")?;
            print_result(&session, &result, cli.quiet)?;
            (result, download_to.clone())
        }
        Command::Workflow {
            ref file,
            ref steps,
            ref download_to,
        } => {
            session.select_workflow_input(file)?;
            for spec in steps {
                add_step(&mut session, spec)?;
            }
            let result = if show_progress {
                let cb = CliProgressCallback::new();
                session.run_workflow(cb.as_ref()).await
            } else {
                session.run_workflow(&fileforge::NoopProgressCallback).await
            }
            .context("Workflow failed")?;
            print_result(&session, &result, cli.quiet)?;
            (result, download_to.clone())
        }
    };

    if let Some(dir) = download_to {
        let dest = destination(Some(dir.as_path()), &result.filename);
        session
            .client()
            .download(&result.filename, &dest)
            .await
            .with_context(|| format!("Failed to download {}", result.filename))?;
        if !cli.quiet {
            eprintln!("{}  saved  →  {}", green("✔"), bold(&dest.display().to_string()));
        }
    }
    Ok(())
}

/// Map global CLI flags to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder().completed_hold(Duration::ZERO);
    if let Some(ref url) = cli.url {
        builder = builder.base_url(url);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = cli.credentials {
        builder = builder.credentials_path(path);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout(Duration::from_secs(secs));
    }
    builder.build().context("Invalid configuration")
}

fn login(client: &ForgeClient, key: Option<String>, quiet: bool) -> Result<()> {
    let key = match key {
        Some(k) => k,
        None => {
            if io::stdin().is_terminal() {
                eprint!("Please enter your API Key: ");
                io::stderr().flush().ok();
            }
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read the API key")?;
            line.trim().to_string()
        }
    };
    if !client.login(&key).context("Failed to store the API key")? {
        bail!("No API key given");
    }
    if !quiet {
        eprintln!("{} {}", green("✔"), LOGIN_SAVED_MESSAGE);
    }
    Ok(())
}

async fn run_action(session: &mut Session, action: &Action, quiet: bool) -> Result<ActionResult> {
    if !quiet {
        eprintln!("{} {}", cyan("◆"), action.status_text());
    }
    let result = session.run_action(action).await?;
    print_result(session, &result, quiet)?;
    Ok(result)
}

fn print_result(session: &Session, result: &ActionResult, quiet: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", result.summary()).context("Failed to write to stdout")?;
    if !quiet {
        // The link may carry the API key; show it without the query.
        let mut shown = session.client().download_url(&result.filename)?;
        shown.set_query(None);
        eprintln!("   Download {}  {}", result.filename, dim(shown.as_str()));
    }
    Ok(())
}

/// Where to save `filename`: inside `target` when it is a directory.
fn destination(target: Option<&Path>, filename: &str) -> PathBuf {
    match target {
        Some(p) if p.is_dir() => p.join(filename),
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(filename),
    }
}

/// Add one `type[:key=value,...]` step to the session's workflow.
fn add_step(session: &mut Session, spec: &str) -> Result<()> {
    let (kind, options) = parse_step(spec)?;
    let workflow = session.workflow_mut();
    let index = workflow.add_palette_step(kind);
    workflow.close_config();
    if let Some(config) = workflow.config_mut(index) {
        for (key, value) in options {
            config
                .set(&key, &value)
                .with_context(|| format!("Invalid step spec '{spec}'"))?;
        }
    }
    Ok(())
}

fn parse_step(spec: &str) -> Result<(StepKind, Vec<(String, String)>)> {
    let (kind, rest) = spec.split_once(':').unwrap_or((spec, ""));
    let kind: StepKind = kind.parse()?;
    let options = rest
        .split(',')
        .filter(|kv| !kv.trim().is_empty())
        .map(|kv| {
            kv.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("Expected key=value in step spec, got '{kv}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((kind, options))
}

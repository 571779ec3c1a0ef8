//! pcv: password-protected file containers
//!
//! Commands:
//!   encrypt <input>   - seal a file into <input>.pcv
//!   decrypt <input>   - open a container
//!   run <input>       - encrypt or decrypt, chosen by the .pcv extension
//!   info <container>  - show header fields without a password
//!   config show       - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pcv_core::config::PcvConfig;
use pcv_core::{CancelToken, Mode, Outcome, Progress, ProgressFn, RunSummary};
use pcv_crypto::{FieldCodecs, OpenedContainer};
use pcv_engine::{Job, Pipeline, RunState, StateFn};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pcv",
    version,
    about = "Password-protected file containers",
    long_about = "pcv: seal files into error-correcting, authenticated containers"
)]
struct Cli {
    /// Path to pcv.toml configuration file
    #[arg(long, short = 'c', env = "PCV_CONFIG", default_value = "pcv.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "PCV_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "PCV_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a file into a container
    Encrypt {
        input: PathBuf,
        /// Output path (default: <input>.pcv)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Halve KDF memory and skip the whole-file digest
        #[arg(long)]
        fast: bool,
        /// Free-form text stored unencrypted in the header
        #[arg(long, short = 'm')]
        metadata: Option<String>,
        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Open a container
    Decrypt {
        input: PathBuf,
        /// Output path (default: input without .pcv)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Keep best-effort output when chunks fail authentication
        #[arg(long)]
        keep: bool,
        #[arg(long)]
        overwrite: bool,
    },

    /// Encrypt or decrypt depending on the input's extension
    Run {
        input: PathBuf,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long)]
        overwrite: bool,
    },

    /// Show what a container reveals without its password
    Info {
        container: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config).await?;
    let config = loaded.clone().unwrap_or_default();

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, format);

    if loaded.is_none() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    info!(version = env!("CARGO_PKG_VERSION"), "pcv starting");

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            fast,
            metadata,
            overwrite,
        } => {
            let password = read_password(password_from_env(), true)?;
            let mut job = Job::encrypt(input, password)
                .with_config(&config)
                .fast(fast)
                .metadata(metadata.unwrap_or_default());
            job.overwrite |= overwrite;
            if let Some(output) = output {
                job = job.output(output);
            }
            cmd_run(job).await
        }
        Commands::Decrypt {
            input,
            output,
            keep,
            overwrite,
        } => {
            let password = read_password(password_from_env(), false)?;
            let mut job = Job::decrypt(input, password).with_config(&config);
            job.keep_corrupted |= keep;
            job.overwrite |= overwrite;
            if let Some(output) = output {
                job = job.output(output);
            }
            cmd_run(job).await
        }
        Commands::Run {
            input,
            output,
            overwrite,
        } => {
            let confirm = Mode::infer(&input) == Mode::Encrypt;
            let password = read_password(password_from_env(), confirm)?;
            let mut job = Job::infer(input, password).with_config(&config);
            job.overwrite |= overwrite;
            if let Some(output) = output {
                job = job.output(output);
            }
            cmd_run(job).await
        }
        Commands::Info { container, json } => cmd_info(&container, json),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// Read and validate the config file. `None` when the file does not exist.
async fn load_config(path: &Path) -> Result<Option<PcvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: PcvConfig = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(Some(config))
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `info --json` output stays machine-readable
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Non-interactive password source. Environment only, never a flag.
const PASSWORD_ENV: &str = "PCV_PASSWORD";

fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty())
}

fn read_password(provided: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(password) = provided {
        return Ok(SecretString::from(password));
    }

    let password = SecretString::from(
        rpassword::prompt_password("Password: ").context("reading password")?,
    );
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ")
            .context("reading password confirmation")?;
        if again != password.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(password)
}

// ── `pcv encrypt` / `decrypt` / `run` ─────────────────────────────────────────

async fn cmd_run(job: Job) -> Result<()> {
    let mode = job.resolved_mode();
    let output = job.resolved_output();
    let pb = make_progress_bar(mode)?;

    let pipeline = Pipeline::new(job)
        .with_progress(progress_to_bar(&pb))
        .on_state(state_to_bar(&pb));
    let cancel = pipeline.cancel_token();

    let task = tokio::task::spawn_blocking(move || pipeline.run());
    let outcome = await_pipeline(task, tokio::signal::ctrl_c(), &cancel, &pb).await?;

    match outcome {
        Outcome::Done(summary) => {
            pb.finish_and_clear();
            print_summary(mode, &output, &summary);
            Ok(())
        }
        Outcome::Cancelled => {
            pb.abandon_with_message("cancelled");
            anyhow::bail!("{mode} cancelled, partial output removed")
        }
        Outcome::Failed { kind, message } => {
            pb.abandon_with_message("failed");
            anyhow::bail!("{mode} failed ({kind}): {message}")
        }
    }
}

/// Wait for the worker, cancelling it when `interrupt` fires. If the
/// interrupt source itself fails the run continues uninterruptible.
async fn await_pipeline<F>(
    mut task: JoinHandle<Outcome>,
    interrupt: F,
    cancel: &CancelToken,
    pb: &ProgressBar,
) -> Result<Outcome>
where
    F: Future<Output = std::io::Result<()>>,
{
    let interrupted = async {
        if let Err(e) = interrupt.await {
            warn!(error = %e, "cannot listen for Ctrl-C, the run cannot be interrupted");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        joined = &mut task => joined.context("pipeline task panicked"),
        () = interrupted => {
            pb.set_message("interrupted, stopping at the next chunk");
            cancel.cancel();
            task.await.context("pipeline task panicked")
        }
    }
}

fn make_progress_bar(mode: Mode) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .context("building progress bar style")?
        .progress_chars("=> "),
    );
    pb.set_prefix(match mode {
        Mode::Encrypt => "encrypting",
        Mode::Decrypt => "decrypting",
    });
    Ok(pb)
}

fn progress_to_bar(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |p: &Progress| {
        pb.set_length(p.bytes_total);
        pb.set_position(p.bytes_done);
        pb.set_message(format!("{} {}", p.percent(), p.status()));
    })
}

fn state_to_bar(pb: &ProgressBar) -> StateFn {
    let pb = pb.clone();
    Box::new(move |state| match state {
        RunState::DeriveKey => pb.set_message("deriving key"),
        RunState::VerifyPassword => pb.set_message("checking password"),
        RunState::Finalize => pb.set_message("finalizing"),
        _ => {}
    })
}

fn print_summary(mode: Mode, output: &Path, summary: &RunSummary) {
    let verb = match mode {
        Mode::Encrypt => "encrypted",
        Mode::Decrypt => "decrypted",
    };
    println!(
        "{verb} {} in {} chunk(s) -> {}",
        fmt_bytes(summary.bytes),
        summary.chunks,
        output.display()
    );
    if summary.corrupted_chunks > 0 {
        eprintln!(
            "warning: {} chunk(s) failed authentication and were kept as-is",
            summary.corrupted_chunks
        );
    }
    if !summary.digest_ok {
        eprintln!("warning: whole-file digest does not match; output may be damaged");
    }
}

// ── `pcv info` ────────────────────────────────────────────────────────────────

fn cmd_info(path: &Path, json: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();
    let codecs = FieldCodecs::new().context("building field codecs")?;
    let container = OpenedContainer::read(&mut BufReader::new(file), len, &codecs)
        .with_context(|| format!("reading container {}", path.display()))?;
    let info = container.info();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("serializing container info")?
        );
        return Ok(());
    }

    println!("container:   {}", path.display());
    let support = if info.version_supported {
        ""
    } else {
        " (unsupported)"
    };
    println!("version:     {}{support}", info.version);
    println!(
        "mode:        {}",
        if info.fast { "fast" } else { "secure" }
    );
    println!("chunks:      {}", info.chunk_count);
    println!("plaintext:   {}", fmt_bytes(info.plaintext_len));
    println!("size:        {}", fmt_bytes(info.container_len));
    if info.metadata_len > 0 {
        println!("metadata:    {}", info.metadata);
    }
    Ok(())
}

// ── `pcv config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &PcvConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

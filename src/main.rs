use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use bindiff::util::{self, format_bytes, format_duration};
use bindiff::{
    apply, decode, diff, encode, ApplyOptions, CancelToken, Config, DiffOptions, ProgressFn,
};

#[derive(Parser)]
#[command(name = "bindiff", version, about = "FFT-assisted binary diff and patch tool")]
struct Cli {
    /// Path to a YAML config file (BINDIFF_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a binary diff patch from OLD and NEW files
    Diff {
        /// Path to the old (original) file
        old: PathBuf,
        /// Path to the new (updated) file
        new: PathBuf,
        /// Output path for the patch file
        #[arg(long, short, default_value = "patch.bdf")]
        output: PathBuf,
        /// Disable FFT-based alignment
        #[arg(long)]
        no_fft: bool,
        /// Disable parallel processing
        #[arg(long)]
        no_parallel: bool,
        /// Maximum number of workers
        #[arg(long)]
        workers: Option<usize>,
        /// Block size for strategy selection
        #[arg(long)]
        block_size: Option<usize>,
        /// Minimum match length
        #[arg(long)]
        min_match: Option<usize>,
        /// Operation timeout in seconds (0 = no timeout)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Apply a binary patch to OLD and write the reconstructed file
    Apply {
        /// Path to the old (original) file
        old: PathBuf,
        /// Path to the patch file
        patch: PathBuf,
        /// Output file name (default: taken from the patch metadata)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Skip result hash verification
        #[arg(long)]
        no_verify: bool,
        /// Back up the original file before writing
        #[arg(long)]
        backup: bool,
        /// Operation timeout in seconds (0 = no timeout)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init {
        #[arg(default_value = "bindiff.yaml")]
        path: PathBuf,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    // size the shared worker pool once, up front
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .build_global();

    match cli.command {
        Commands::Diff {
            old,
            new,
            output,
            no_fft,
            no_parallel,
            workers,
            block_size,
            min_match,
            timeout,
            no_progress,
        } => {
            let mut config = config;
            config.enable_fft &= !no_fft;
            config.use_parallel &= !no_parallel;
            config.show_progress &= !no_progress;
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            if let Some(block_size) = block_size {
                config.block_size = block_size;
            }
            if let Some(min_match) = min_match {
                config.min_match_length = min_match;
            }
            config.validate()?;
            run_diff(&old, &new, &output, config, timeout).await
        }
        Commands::Apply {
            old,
            patch,
            output,
            no_verify,
            backup,
            timeout,
            no_progress,
        } => {
            let mut config = config;
            config.show_progress &= !no_progress;
            let verify = config.verify_checksums && !no_verify;
            run_apply(&old, &patch, output.as_deref(), config, verify, backup, timeout).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                Config::default().save(&path)?;
                println!("Default configuration saved to {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                println!("Current configuration:");
                println!("  Block size: {} bytes", config.block_size);
                println!("  Min match length: {} bytes", config.min_match_length);
                println!("  Max memory: {}", format_bytes(config.max_memory_bytes));
                println!("  Max workers: {}", config.max_workers);
                println!("  Enable FFT: {}", config.enable_fft);
                println!("  Use parallel: {}", config.use_parallel);
                println!("  Show progress: {}", config.show_progress);
                println!("  Verify checksums: {}", config.verify_checksums);
                println!("  Log level: {}", config.log_level);
                Ok(())
            }
        },
    }
}

async fn run_diff(
    old_path: &Path,
    new_path: &Path,
    output: &Path,
    config: Config,
    timeout: u64,
) -> Result<()> {
    let start = Instant::now();
    info!("Starting diff operation: {} -> {}", old_path.display(), new_path.display());
    validate_files(&[old_path, new_path])?;

    // map both inputs concurrently
    let old_owned = old_path.to_path_buf();
    let new_owned = new_path.to_path_buf();
    let (old_data, new_data) = tokio::try_join!(
        tokio::task::spawn_blocking(move || util::mmap_file(&old_owned)),
        tokio::task::spawn_blocking(move || util::mmap_file(&new_owned)),
    )?;
    let old_data = old_data?;
    let new_data = new_data?;

    info!(
        "File sizes: old={}, new={}",
        format_bytes(old_data.len() as u64),
        format_bytes(new_data.len() as u64)
    );

    let (bar, progress) = make_progress(config.show_progress)?;
    let options = DiffOptions {
        config,
        progress,
        cancel: make_token(timeout),
    };

    let mut patch = diff(&old_data, &new_data, &options)?;
    patch.old_name = file_name_bytes(old_path);
    patch.new_name = file_name_bytes(new_path);

    let encoded = encode(&patch);
    util::safe_write(output, &encoded)
        .with_context(|| format!("Failed to write patch file: {}", output.display()))?;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let elapsed = start.elapsed();
    let ratio = if new_data.is_empty() {
        0.0
    } else {
        encoded.len() as f64 / new_data.len() as f64
    };

    println!("\nPatch file generated: {}", output.display());
    println!("  Original size: {}", format_bytes(new_data.len() as u64));
    println!("  Patch size: {}", format_bytes(encoded.len() as u64));
    println!("  Compression: {:.2}%", ratio * 100.0);
    println!("  Alignment offset: {}", patch.offset);
    println!("  Operations: {}", patch.ops.len());
    println!("  Time elapsed: {}", format_duration(elapsed));

    Ok(())
}

async fn run_apply(
    old_path: &Path,
    patch_path: &Path,
    output: Option<&Path>,
    config: Config,
    verify_result: bool,
    backup: bool,
    timeout: u64,
) -> Result<()> {
    let start = Instant::now();
    info!(
        "Starting apply operation: {} + {}",
        old_path.display(),
        patch_path.display()
    );
    validate_files(&[old_path, patch_path])?;

    let old_owned = old_path.to_path_buf();
    let patch_owned = patch_path.to_path_buf();
    let (old_data, patch_bytes) = tokio::try_join!(
        tokio::task::spawn_blocking(move || util::mmap_file(&old_owned)),
        tokio::task::spawn_blocking(move || util::mmap_file(&patch_owned)),
    )?;
    let old_data = old_data?;
    let patch_bytes = patch_bytes?;

    let patch = decode(&patch_bytes).context("Failed to decode patch")?;
    info!(
        "Patch info: {} operations, offset={}",
        patch.ops.len(),
        patch.offset
    );

    if backup {
        let saved = util::backup_file(old_path)?;
        info!("Backed up original to {}", saved.display());
    }

    let (bar, progress) = make_progress(config.show_progress)?;
    let options = ApplyOptions {
        config,
        verify_result,
        progress,
        cancel: make_token(timeout),
    };

    let new_data = apply(&old_data, &patch, &options)?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let name = String::from_utf8_lossy(&patch.new_name);
            if name.is_empty() {
                bail!("patch has no target file name; use --output");
            }
            PathBuf::from(name.into_owned())
        }
    };
    util::safe_write(&output, &new_data)
        .with_context(|| format!("Failed to write new file: {}", output.display()))?;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let elapsed = start.elapsed();
    println!("\nPatch applied successfully: {}", output.display());
    println!("  Original size: {}", format_bytes(old_data.len() as u64));
    println!("  Result size: {}", format_bytes(new_data.len() as u64));
    println!("  Operations applied: {}", patch.ops.len());
    if verify_result {
        println!("  Hash verification: PASSED");
    }
    println!("  Time elapsed: {}", format_duration(elapsed));

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn validate_files(paths: &[&Path]) -> Result<()> {
    for path in paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("file {} not found", path.display()))?;
        if meta.is_dir() {
            bail!("{} is a directory, not a file", path.display());
        }
    }
    Ok(())
}

fn make_token(timeout_secs: u64) -> CancelToken {
    if timeout_secs == 0 {
        CancelToken::new()
    } else {
        CancelToken::with_deadline(Instant::now() + Duration::from_secs(timeout_secs))
    }
}

fn make_progress(enabled: bool) -> Result<(Option<ProgressBar>, Option<ProgressFn>)> {
    if !enabled {
        return Ok((None, None));
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40}] {bytes}/{total_bytes}")
            .context("invalid progress bar template")?
            .progress_chars("=> "),
    );
    let sink_bar = bar.clone();
    let sink: ProgressFn = Arc::new(move |done, total| {
        if sink_bar.length() != Some(total) {
            sink_bar.set_length(total);
        }
        sink_bar.set_position(done);
    });
    Ok((Some(bar), Some(sink)))
}

fn file_name_bytes(path: &Path) -> Vec<u8> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned().into_bytes())
        .unwrap_or_default()
}

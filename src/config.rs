use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const DEFAULT_MIN_MATCH_LENGTH: usize = 64;
/// Floor for the memory ceiling; the streaming window size derives from it.
pub const MIN_MEMORY_BYTES: u64 = 64 * 1024;

/// Tuning knobs consumed by the diff/apply pipeline.
///
/// Loaded from a YAML file with `BINDIFF_*` environment overrides, then
/// passed by value into the core. Nothing in the core reads process-wide
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub block_size: usize,
    pub min_match_length: usize,
    pub max_memory_bytes: u64,
    pub max_workers: usize,
    pub enable_fft: bool,
    pub use_parallel: bool,
    pub show_progress: bool,
    pub verify_checksums: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            min_match_length: DEFAULT_MIN_MATCH_LENGTH,
            max_memory_bytes: 512 * 1024 * 1024,
            max_workers: 4,
            enable_fft: true,
            use_parallel: true,
            show_progress: true,
            verify_checksums: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the YAML file (if any), then
    /// `BINDIFF_*` environment variables, highest precedence last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        env_parse("BINDIFF_BLOCK_SIZE", &mut self.block_size);
        env_parse("BINDIFF_MIN_MATCH_LENGTH", &mut self.min_match_length);
        env_parse("BINDIFF_MAX_MEMORY_BYTES", &mut self.max_memory_bytes);
        env_parse("BINDIFF_MAX_WORKERS", &mut self.max_workers);
        env_parse("BINDIFF_ENABLE_FFT", &mut self.enable_fft);
        env_parse("BINDIFF_USE_PARALLEL", &mut self.use_parallel);
        env_parse("BINDIFF_SHOW_PROGRESS", &mut self.show_progress);
        env_parse("BINDIFF_VERIFY_CHECKSUMS", &mut self.verify_checksums);
        if let Ok(level) = std::env::var("BINDIFF_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Serialize to YAML and write atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self).context("failed to serialize config")?;
        crate::util::safe_write(path, text.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > 1024 * 1024 {
            bail!(
                "block_size must be between 1 and 1048576, got {}",
                self.block_size
            );
        }
        if self.min_match_length == 0 || self.min_match_length > self.block_size {
            bail!(
                "min_match_length must be between 1 and block_size ({}), got {}",
                self.block_size,
                self.min_match_length
            );
        }
        if self.max_memory_bytes < MIN_MEMORY_BYTES {
            bail!(
                "max_memory_bytes must be at least {MIN_MEMORY_BYTES}, got {}",
                self.max_memory_bytes
            );
        }
        if self.max_workers == 0 {
            bail!("max_workers must be positive");
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!("invalid log_level: {other}"),
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        if let Ok(value) = raw.parse() {
            *slot = value;
        }
    }
}

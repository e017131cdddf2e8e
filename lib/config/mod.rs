use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::cli::Cli;
use crate::pipeline::OutputPaths;

const OUTPUT_PREFIX: &str = "record_loader";
const MAX_AUTO_WORKERS: usize = 32;
const AUTO_WORKER_HEADROOM: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("an input file is required (--file or LOADER_INPUT_FILE)")]
    MissingInput,
    #[error("input file {0} does not exist or is not a file")]
    InputNotFound(PathBuf),
    #[error("engine configuration is required (--config-json or LOADER_ENGINE_CONFIGURATION_JSON)")]
    MissingEngineConfig,
    #[error("--governor-rate must be > 0")]
    ZeroGovernorRate,
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub input: PathBuf,
    pub engine_config_json: String,
    pub with_info: bool,
    pub debug_trace: bool,
    /// Requested worker count; 0 means "resolve from available parallelism".
    pub requested_workers: usize,
    pub governor_rate: NonZeroU32,
    pub outputs: OutputPaths,
    pub log_level: String,
}

impl LoaderConfig {
    /// Validates CLI/env values. `now` stamps the output file names.
    pub fn from_cli(cli: &Cli, now: DateTime<Local>) -> Result<Self, ConfigError> {
        let input = cli.file.clone().ok_or(ConfigError::MissingInput)?;
        if !input.is_file() {
            return Err(ConfigError::InputNotFound(input));
        }

        let engine_config_json = cli
            .config_json
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or(ConfigError::MissingEngineConfig)?
            .to_string();

        let governor_rate =
            NonZeroU32::new(cli.governor_rate).ok_or(ConfigError::ZeroGovernorRate)?;

        Ok(Self {
            input,
            engine_config_json,
            with_info: cli.with_info,
            debug_trace: cli.debug_trace,
            requested_workers: cli.num_threads,
            governor_rate,
            outputs: output_paths(&cli.output_dir, now),
            log_level: cli.log_level.clone(),
        })
    }

    /// Console filter for this run. `--debug-trace` raises anything quieter than `debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug_trace && !self.log_level.trim().eq_ignore_ascii_case("trace") {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Worker count for this run, resolved once.
    pub fn workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        resolve_worker_count(self.requested_workers, available)
    }
}

pub fn resolve_worker_count(requested: usize, available_parallelism: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    (available_parallelism + AUTO_WORKER_HEADROOM).min(MAX_AUTO_WORKERS)
}

pub fn output_paths(dir: &Path, now: DateTime<Local>) -> OutputPaths {
    let stamp = now.format("%Y%m%d_%H%M%S");
    OutputPaths {
        with_info: dir.join(format!("{OUTPUT_PREFIX}_withInfo_{stamp}.jsonl")),
        errors: dir.join(format!("{OUTPUT_PREFIX}_errors_{stamp}.log")),
    }
}

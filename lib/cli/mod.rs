use std::path::PathBuf;

use crate::build_info;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    about = "Load JSON-lines records into the record engine, then drain its redo queue",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT,
    after_help = "Every option can also be set through the environment variable shown next to it. \
Command-line values take precedence over environment variables, which take precedence over \
defaults. A .env file in the working directory is read first."
)]
pub struct Cli {
    #[arg(short = 'f', long = "file", env = "LOADER_INPUT_FILE")]
    /// Input file with one JSON record per line
    pub file: Option<PathBuf>,

    #[arg(short = 'c', long = "config-json", env = "LOADER_ENGINE_CONFIGURATION_JSON")]
    /// Engine configuration JSON, passed to the engine as-is
    pub config_json: Option<String>,

    #[arg(short = 'i', long = "info", env = "LOADER_WITHINFO", default_value_t = false)]
    /// Capture with-info payloads to a JSON-lines file
    pub with_info: bool,

    #[arg(short = 't', long = "debug-trace", env = "LOADER_DEBUG", default_value_t = false)]
    /// Enable verbose engine logging
    pub debug_trace: bool,

    #[arg(
        short = 'n',
        long = "num-threads",
        env = "LOADER_THREADS_PER_PROCESS",
        default_value_t = 0
    )]
    /// Concurrent engine calls; 0 picks a value from available parallelism
    pub num_threads: usize,

    #[arg(long = "output-dir", env = "LOADER_OUTPUT_DIR", default_value = ".")]
    /// Directory for the with-info and error log files
    pub output_dir: PathBuf,

    #[arg(long = "governor-rate", env = "LOADER_GOVERNOR_RATE", default_value_t = 1000)]
    /// Records per second admitted when the database backend needs backpressure
    pub governor_rate: u32,

    #[arg(long = "log-level", env = "LOADER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

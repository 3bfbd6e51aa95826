//! VideoGapFinder - Main Application Entrypoint
//!
//! Parses command-line arguments, initializes logging and dispatches the
//! core processing logic.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;
use videogapfinder::model_gateway::{self, ModelSettings};
use videogapfinder::{run, utils};

/// Extracts frames from an educational video and uses a multimodal language model to find and fill content gaps.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input video file (e.g., lecture.mp4)
    #[arg(short, long)]
    input: PathBuf,

    /// Directory to save the output files
    #[arg(short, long)]
    output: PathBuf,

    /// Seconds between frames in the initial extraction pass
    #[arg(long, default_value_t = 5.0)]
    interval: f64,

    /// OpenAI API key; LLM analysis is disabled without one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = model_gateway::DEFAULT_API_BASE)]
    api_base: String,

    /// Model used for per-frame analysis
    #[arg(long, default_value = model_gateway::DEFAULT_VISION_MODEL)]
    vision_model: String,

    /// Model used for sequence review and timestamp extraction
    #[arg(long, default_value = model_gateway::DEFAULT_TEXT_MODEL)]
    text_model: String,

    /// Maximum tokens per frame analysis
    #[arg(long, default_value_t = model_gateway::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Model request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Number of frames analyzed concurrently
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// Skip the second extraction pass over detected gaps
    #[arg(long)]
    no_second_pass: bool,

    /// Do not assemble the frames into a PDF
    #[arg(long)]
    no_pdf: bool,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    if let Err(e) = utils::init_logging(log_level, args.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    info!("Starting VideoGapFinder...");

    // 2. Validate input path
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        std::process::exit(1);
    }

    // 3. Create a configuration object from arguments
    let config = videogapfinder::Config {
        input_file: args.input,
        output_dir: args.output,
        interval: args.interval,
        model: ModelSettings {
            api_key: args.api_key,
            api_base: args.api_base,
            vision_model: args.vision_model,
            text_model: args.text_model,
            max_tokens: args.max_tokens,
            timeout: Duration::from_secs(args.timeout),
        },
        concurrency: args.concurrency,
        second_pass: !args.no_second_pass,
        generate_pdf: !args.no_pdf,
    };

    // 4. Run the main application logic
    if let Err(e) = run(config) {
        error!("Application failed: {:#}", e);
        std::process::exit(2);
    }

    info!("Processing completed successfully.");
}

//! Utilities Module
//!
//! Logger setup, output directory layout, frame metadata files and the
//! end-of-run summary.

use crate::video_processor::FrameRecord;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const SUMMARY_PREVIEW_CHARS: usize = 200;

/// Writer that copies every log line to two sinks.
pub struct LogTee<A: Write, B: Write> {
    console: A,
    file: B,
}

impl<A: Write, B: Write> LogTee<A, B> {
    pub fn new(console: A, file: B) -> Self {
        LogTee { console, file }
    }
}

impl<A: Write, B: Write> Write for LogTee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

/// Installs the global logger. `RUST_LOG` overrides `default_level`. With a
/// `log_file`, every record goes to stderr and is appended to that file too.
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if let Some(path) = log_file {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(LogTee::new(io::stderr(), file))));
    }
    builder.try_init().context("Logger already initialized")
}

/// Directories created under the run's output directory.
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub frames: PathBuf,
    pub analysis: PathBuf,
    pub exports: PathBuf,
}

pub fn create_output_dirs(base_dir: &Path) -> Result<OutputDirs> {
    let dirs = OutputDirs {
        frames: base_dir.join("frames"),
        analysis: base_dir.join("analysis"),
        exports: base_dir.join("exports"),
    };
    for dir in [&dirs.frames, &dirs.analysis, &dirs.exports] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    Ok(dirs)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub total_frames: usize,
    pub frames: Vec<FrameRecord>,
}

/// Writes `metadata.json` describing every captured frame.
pub fn save_metadata(frames: &[FrameRecord], output_dir: &Path) -> Result<PathBuf> {
    let metadata = FrameMetadata {
        total_frames: frames.len(),
        frames: frames.to_vec(),
    };
    let metadata_path = output_dir.join("metadata.json");
    fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("Failed to write metadata to {:?}", metadata_path))?;
    info!("Metadata saved to: {:?}", metadata_path);
    Ok(metadata_path)
}

pub fn load_metadata(metadata_path: &Path) -> Result<FrameMetadata> {
    let contents = fs::read_to_string(metadata_path)
        .with_context(|| format!("Failed to read metadata file {:?}", metadata_path))?;
    serde_json::from_str(&contents).context("Failed to parse metadata file")
}

/// Human-readable summary of a run: the frame count plus a preview of each
/// pass's sequence review.
pub fn summarize(metadata: &FrameMetadata, analysis: Option<&Value>) -> String {
    let mut summary = format!(
        "Extraction Summary:\n- Total frames extracted: {}\n",
        metadata.total_frames
    );
    let Some(analysis) = analysis else {
        return summary;
    };

    summary.push_str("\nLLM Analysis Summary:\n");
    for (label, key) in [("Initial Analysis", "initial_analysis"), ("Final Analysis", "final_analysis")] {
        let review = analysis
            .get(key)
            .and_then(|pass| pass.get("sequence_analysis"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let preview: String = review.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        let ellipsis = if review.chars().count() > SUMMARY_PREVIEW_CHARS { "..." } else { "" };
        summary.push_str(&format!("{}: {}{}\n", label, preview, ellipsis));
    }
    summary
}

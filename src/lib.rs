//! VideoGapFinder - Core Library
//!
//! This file wires the modules together: frame extraction, per-frame and
//! sequence analysis through a language model, a second extraction pass over
//! the gaps the model finds, and the output files of a run.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;

pub mod analysis_store;
pub mod document_builder;
pub mod error;
pub mod frame_analyzer;
pub mod gap_extractor;
pub mod model_gateway;
pub mod pipeline;
pub mod sequence_analyzer;
pub mod utils;
pub mod video_processor;

use model_gateway::{ModelAccess, ModelSettings};
use pipeline::PipelineOptions;
use video_processor::VideoFrameExtractor;

/// Application configuration structure.
#[derive(Debug)]
pub struct Config {
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    /// Seconds between frames of the initial pass.
    pub interval: f64,
    pub model: ModelSettings,
    pub concurrency: usize,
    pub second_pass: bool,
    pub generate_pdf: bool,
}

/// Runs both extraction passes over the input video and writes the results.
pub fn run(config: Config) -> Result<()> {
    info!("Initializing processing with config: {:?}", config);

    // 1. Setup output directories
    let dirs = utils::create_output_dirs(&config.output_dir)?;

    // 2. Model access, decided once for the whole run
    let access = ModelAccess::from_settings(&config.model).context("Failed to set up the model client")?;

    match video_processor::probe_duration(&config.input_file) {
        Ok(duration) => info!("Video duration: {:.1}s", duration),
        Err(e) => warn!("Could not read video duration: {:#}", e),
    }

    // 3. Extract, analyze and fill gaps
    let mut extractor = VideoFrameExtractor::new(&config.input_file, &dirs.frames, config.interval)?;
    let mut options = PipelineOptions::new(dirs.analysis.clone(), &config.model);
    options.concurrency = config.concurrency;
    options.second_pass = config.second_pass;
    let report = pipeline::run_pipeline(&access, &mut extractor, &options)?;

    if report.frames.is_empty() {
        warn!("No frames were extracted from {:?}.", config.input_file);
    }

    // 4. Metadata and exports
    utils::save_metadata(&report.frames, &config.output_dir)?;
    if config.generate_pdf {
        let pdf_path = dirs.exports.join("frames.pdf");
        document_builder::generate_pdf(&report.frames, &pdf_path)
            .context("Failed to build PDF document")?;
    }

    // 5. Summary
    let metadata = utils::FrameMetadata {
        total_frames: report.frames.len(),
        frames: report.frames,
    };
    let analysis = match &report.saved_to {
        Ok(path) => match analysis_store::load_analysis(path) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Could not reload saved analysis: {:#}", e);
                None
            }
        },
        Err(_) => None,
    };
    println!("\n{}", utils::summarize(&metadata, analysis.as_ref()));

    Ok(())
}

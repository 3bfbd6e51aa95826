//! Analysis Pipeline
//!
//! Drives the two-pass loop: analyze the initial frames, review the
//! sequence, turn the review into gap timestamps, capture and analyze the
//! gap frames, and persist both passes.
//!
//! The final review is not mined for gaps again: no third pass runs, so the
//! final pass's `missing_timepoints` is always empty.
//!
//! Model failures never abort the run. They are logged and the affected
//! result is left empty; disabled mode is silent.

use crate::analysis_store::{self, PassAnalysis};
use crate::error::AnalysisError;
use crate::frame_analyzer::{FrameAnalysis, FrameAnalyzer};
use crate::gap_extractor::GapExtractor;
use crate::model_gateway::{ModelAccess, ModelGateway, ModelSettings};
use crate::sequence_analyzer::SequenceAnalyzer;
use crate::video_processor::{FrameExtractor, FrameRecord};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory that receives `frame_analysis.json`.
    pub analysis_dir: PathBuf,
    pub vision_model: String,
    pub text_model: String,
    pub max_tokens: u32,
    /// Maximum number of frame analyses in flight at once.
    pub concurrency: usize,
    pub second_pass: bool,
}

impl PipelineOptions {
    pub fn new(analysis_dir: PathBuf, settings: &ModelSettings) -> Self {
        PipelineOptions {
            analysis_dir,
            vision_model: settings.vision_model.clone(),
            text_model: settings.text_model.clone(),
            max_tokens: settings.max_tokens,
            concurrency: 1,
            second_pass: true,
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    /// Frames from both passes, ordered by timestamp.
    pub frames: Vec<FrameRecord>,
    pub initial: PassAnalysis,
    pub final_pass: Option<PassAnalysis>,
    /// Where the analysis was saved, or why saving failed.
    pub saved_to: Result<PathBuf, AnalysisError>,
}

pub fn run_pipeline<G, E>(
    access: &ModelAccess<G>,
    extractor: &mut E,
    options: &PipelineOptions,
) -> Result<PipelineReport>
where
    G: ModelGateway,
    E: FrameExtractor,
{
    let frame_analyzer = FrameAnalyzer::new(access, &options.vision_model, options.max_tokens);
    let sequence_analyzer = SequenceAnalyzer::new(access, &options.text_model);
    let gap_extractor = GapExtractor::new(access, &options.text_model);

    // 1. Initial pass
    let mut frames = extractor
        .extract_initial()
        .context("Initial frame extraction failed")?;
    info!("Extracted {} frames in the initial pass.", frames.len());

    let frame_analyses = frame_analyzer.analyze_frames(&frames, options.concurrency);
    let sequence_analysis = ok_or_log("Sequence analysis", sequence_analyzer.analyze_sequence(&frame_analyses));
    let missing_timepoints = sequence_analysis
        .as_deref()
        .and_then(|review| ok_or_log("Gap extraction", gap_extractor.find_missing_timepoints(review)))
        .unwrap_or_default();
    let initial = PassAnalysis {
        frame_analyses,
        sequence_analysis,
        missing_timepoints,
    };

    // 2. Second pass over the gaps
    let final_pass = if options.second_pass && !initial.missing_timepoints.is_empty() {
        match extractor.extract_at(&initial.missing_timepoints) {
            Ok(extra) if !extra.is_empty() => {
                info!("Extracted {} additional frames for content gaps.", extra.len());
                let extra_analyses = frame_analyzer.analyze_frames(&extra, options.concurrency);
                let merged = merge_by_timestamp(&initial.frame_analyses, &extra_analyses);
                let review = ok_or_log("Final sequence analysis", sequence_analyzer.analyze_sequence(&merged));
                frames.extend(extra);
                Some(PassAnalysis {
                    frame_analyses: extra_analyses,
                    sequence_analysis: review,
                    missing_timepoints: Vec::new(),
                })
            }
            Ok(_) => {
                warn!("Second extraction pass produced no frames.");
                None
            }
            Err(e) => {
                error!("Second extraction pass failed: {:#}", e);
                None
            }
        }
    } else {
        None
    };
    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    // 3. Persist
    let saved_to = analysis_store::save_analysis(&options.analysis_dir, &initial, final_pass.as_ref());
    if let Err(e) = &saved_to {
        error!("Error saving analysis: {}", e);
    }

    Ok(PipelineReport {
        frames,
        initial,
        final_pass,
        saved_to,
    })
}

/// Both passes in timestamp order; on equal timestamps first-pass frames come first.
fn merge_by_timestamp(initial: &[FrameAnalysis], extra: &[FrameAnalysis]) -> Vec<FrameAnalysis> {
    let mut merged: Vec<FrameAnalysis> = initial.iter().chain(extra).cloned().collect();
    merged.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    merged
}

fn ok_or_log<T>(stage: &str, result: Result<T, AnalysisError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_disabled() => None,
        Err(AnalysisError::NothingToAnalyze(reason)) => {
            warn!("{} skipped: {}", stage, reason);
            None
        }
        Err(e) => {
            error!("{} failed: {}", stage, e);
            None
        }
    }
}

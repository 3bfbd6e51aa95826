//! Analysis Store Module
//!
//! Persists the analysis of both capture passes as `frame_analysis.json`.
//!
//! Each save replaces the whole file. Concurrent runs writing into the same
//! directory are not supported: the last writer wins.

use crate::error::AnalysisError;
use crate::frame_analyzer::FrameAnalysis;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const ANALYSIS_FILE_NAME: &str = "frame_analysis.json";

/// Everything the model produced for one capture pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassAnalysis {
    pub frame_analyses: Vec<FrameAnalysis>,
    pub sequence_analysis: Option<String>,
    pub missing_timepoints: Vec<f64>,
}

/// Writes `{"initial_analysis": .., "final_analysis": ..}` to
/// `output_dir/frame_analysis.json`, replacing any previous file. A missing
/// final analysis is stored as `{}`. Returns the path written.
pub fn save_analysis<T: Serialize>(
    output_dir: &Path,
    initial_analysis: &T,
    final_analysis: Option<&T>,
) -> Result<PathBuf, AnalysisError> {
    let analysis_path = output_dir.join(ANALYSIS_FILE_NAME);
    let persistence_error = |reason: String| AnalysisError::Persistence {
        path: analysis_path.clone(),
        reason,
    };

    let initial = serde_json::to_value(initial_analysis).map_err(|e| persistence_error(e.to_string()))?;
    let final_value = match final_analysis {
        Some(analysis) => serde_json::to_value(analysis).map_err(|e| persistence_error(e.to_string()))?,
        None => json!({}),
    };
    let record = json!({
        "initial_analysis": initial,
        "final_analysis": final_value,
    });
    let contents = serde_json::to_string_pretty(&record).map_err(|e| persistence_error(e.to_string()))?;

    // Write beside the target and rename over it so a reader never sees a
    // half-written file.
    let temp_path = output_dir.join(format!(".{}.tmp", ANALYSIS_FILE_NAME));
    fs::write(&temp_path, contents).map_err(|e| persistence_error(e.to_string()))?;
    if let Err(e) = fs::rename(&temp_path, &analysis_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(persistence_error(e.to_string()));
    }

    info!("Analysis saved to: {:?}", analysis_path);
    Ok(analysis_path)
}

/// Reads a saved analysis record back.
pub fn load_analysis(analysis_path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(analysis_path)
        .with_context(|| format!("Failed to read analysis file {:?}", analysis_path))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse analysis file {:?}", analysis_path))
}

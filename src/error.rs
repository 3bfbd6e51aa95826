//! Error Module
//!
//! Typed failure reasons for the analysis core. Every analysis operation
//! returns one of these instead of an empty sentinel, so callers can tell
//! "nothing to report" apart from "something went wrong" while still
//! carrying on with the rest of the batch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No API key was configured; the LLM features are switched off.
    #[error("LLM analysis is disabled (no API key configured)")]
    Disabled,

    #[error("Model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Failed to read frame image {path:?}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to analyze: {0}")]
    NothingToAnalyze(&'static str),

    #[error("Failed to save analysis to {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

impl AnalysisError {
    /// True for the expected "feature switched off" outcome, which callers
    /// should not report as a failure.
    pub fn is_disabled(&self) -> bool {
        matches!(self, AnalysisError::Disabled)
    }
}

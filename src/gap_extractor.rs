//! Gap Extractor Module
//!
//! Turns a free-text sequence review into concrete timestamps for a second
//! capture pass.
//!
//! The model is asked for a comma-separated list of numbers. Parsing is
//! skip-and-continue: a piece that is not a finite, non-negative number is
//! logged, recorded in [`ParsedTimestamps::rejected`] and dropped, and the
//! remaining values are kept in the order the model listed them. Duplicates
//! are kept.

use crate::error::AnalysisError;
use crate::model_gateway::{ChatMessage, ChatRequest, ModelAccess, ModelGateway};
use log::{info, warn};

/// Outcome of parsing a timestamp list reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTimestamps {
    pub timestamps: Vec<f64>,
    pub rejected: Vec<String>,
}

/// Parses a comma-separated list of second offsets.
pub fn parse_timestamp_list(reply: &str) -> ParsedTimestamps {
    let mut parsed = ParsedTimestamps::default();
    for piece in reply.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match piece.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => parsed.timestamps.push(value),
            _ => parsed.rejected.push(piece.to_string()),
        }
    }
    parsed
}

pub struct GapExtractor<'a, G: ModelGateway> {
    access: &'a ModelAccess<G>,
    model: String,
}

impl<'a, G: ModelGateway> GapExtractor<'a, G> {
    pub fn new(access: &'a ModelAccess<G>, model: &str) -> Self {
        GapExtractor {
            access,
            model: model.to_string(),
        }
    }

    /// Asks the model to restate `sequence_review` as timestamps and parses
    /// the reply. A blank review yields no timestamps without a request.
    pub fn find_missing_timepoints(&self, sequence_review: &str) -> Result<Vec<f64>, AnalysisError> {
        let gateway = self.access.gateway()?;
        if sequence_review.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_text(format!(
                "Based on this analysis of video frames:\n\n{}\n\n\
                 Extract specific timestamps (in seconds) where additional frames should be captured. \
                 Return only a comma-separated list of numbers.",
                sequence_review
            ))],
            max_tokens: None,
        };
        let reply = gateway.complete(&request)?;

        let parsed = parse_timestamp_list(&reply);
        if !parsed.rejected.is_empty() {
            warn!(
                "Skipped {} unparsable timestamp(s) in model reply: {:?}",
                parsed.rejected.len(),
                parsed.rejected
            );
        }
        info!("Model suggested {} additional capture point(s).", parsed.timestamps.len());
        Ok(parsed.timestamps)
    }
}

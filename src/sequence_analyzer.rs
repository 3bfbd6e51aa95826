//! Sequence Analyzer Module
//!
//! Reviews all frame analyses of a pass together, in one request, so the
//! model can judge continuity across frames.

use crate::error::AnalysisError;
use crate::frame_analyzer::FrameAnalysis;
use crate::model_gateway::{ChatMessage, ChatRequest, ModelAccess, ModelGateway};
use log::{debug, info};

const REVIEW_QUESTIONS: &str = "Identify:\n\
    1. Any gaps in content or logical transitions\n\
    2. Potentially missing important frames\n\
    3. Suggestions for additional frames to capture";

pub struct SequenceAnalyzer<'a, G: ModelGateway> {
    access: &'a ModelAccess<G>,
    model: String,
}

impl<'a, G: ModelGateway> SequenceAnalyzer<'a, G> {
    pub fn new(access: &'a ModelAccess<G>, model: &str) -> Self {
        SequenceAnalyzer {
            access,
            model: model.to_string(),
        }
    }

    /// Returns the model's free-text review of the whole sequence.
    ///
    /// Absent and blank analyses are left out of the prompt. An empty
    /// sequence, or one with no non-blank analysis, is rejected without
    /// calling the model.
    pub fn analyze_sequence(&self, frame_analyses: &[FrameAnalysis]) -> Result<String, AnalysisError> {
        let gateway = self.access.gateway()?;
        if frame_analyses.is_empty() {
            return Err(AnalysisError::NothingToAnalyze("empty frame sequence"));
        }
        let prompt = build_sequence_prompt(frame_analyses)
            .ok_or(AnalysisError::NothingToAnalyze("no frame in the sequence has analysis text"))?;

        info!("Reviewing a sequence of {} frames...", frame_analyses.len());
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_text(prompt)],
            max_tokens: None,
        };
        let review = gateway.complete(&request)?;
        if review.trim().is_empty() {
            return Err(AnalysisError::MalformedResponse("empty sequence review".into()));
        }
        debug!("Sequence review: {}", review);
        Ok(review)
    }
}

fn build_sequence_prompt(frame_analyses: &[FrameAnalysis]) -> Option<String> {
    let blocks: Vec<String> = frame_analyses
        .iter()
        .filter_map(|a| {
            a.analysis()
                .filter(|text| !text.trim().is_empty())
                .map(|text| format!("Frame at {}s:\n{}", a.timestamp, text))
        })
        .collect();
    if blocks.is_empty() {
        return None;
    }
    Some(format!(
        "Review these {} sequential frames from an educational video:\n\n{}\n\n{}",
        blocks.len(),
        blocks.join("\n\n"),
        REVIEW_QUESTIONS
    ))
}

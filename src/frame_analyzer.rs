//! Frame Analyzer Module
//!
//! Sends individual frames to a vision-capable model and records what the
//! model sees in each one.

use crate::error::AnalysisError;
use crate::model_gateway::{ChatMessage, ChatRequest, ContentPart, ModelAccess, ModelGateway};
use crate::video_processor::FrameRecord;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_PROMPT: &str = "Analyze this frame from an educational video. Identify:\n\
    1. Main visual elements (diagrams, charts, text)\n\
    2. Key concepts or topics being presented\n\
    3. Any potential missing context or transitions\n\
    4. Completeness of information (are parts of diagrams/text cut off?)\n\
    5. Quality issues (blur, poor contrast, etc)";

/// Result of analyzing one frame. A failed frame keeps its slot (and its
/// timestamp) as `Absent` so sequence positions stay aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub timestamp: f64,
    pub frame_path: PathBuf,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Present { analysis: String },
    Absent { reason: String },
}

impl FrameAnalysis {
    pub fn present(frame: &FrameRecord, analysis: String) -> Self {
        FrameAnalysis {
            timestamp: frame.timestamp,
            frame_path: frame.path.clone(),
            outcome: AnalysisOutcome::Present { analysis },
        }
    }

    pub fn absent(frame: &FrameRecord, reason: impl Into<String>) -> Self {
        FrameAnalysis {
            timestamp: frame.timestamp,
            frame_path: frame.path.clone(),
            outcome: AnalysisOutcome::Absent { reason: reason.into() },
        }
    }

    /// The model's text, if the analysis succeeded.
    pub fn analysis(&self) -> Option<&str> {
        match &self.outcome {
            AnalysisOutcome::Present { analysis } => Some(analysis),
            AnalysisOutcome::Absent { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self.outcome, AnalysisOutcome::Present { .. })
    }
}

/// Per-frame analysis through a vision model.
pub struct FrameAnalyzer<'a, G: ModelGateway> {
    access: &'a ModelAccess<G>,
    model: String,
    max_tokens: u32,
}

impl<'a, G: ModelGateway> FrameAnalyzer<'a, G> {
    pub fn new(access: &'a ModelAccess<G>, model: &str, max_tokens: u32) -> Self {
        FrameAnalyzer {
            access,
            model: model.to_string(),
            max_tokens,
        }
    }

    /// Analyzes a single frame. The returned analysis always carries the
    /// frame's own timestamp and path.
    pub fn analyze_frame(&self, frame: &FrameRecord) -> Result<FrameAnalysis, AnalysisError> {
        let gateway = self.access.gateway()?;

        let bytes = fs::read(&frame.path).map_err(|source| AnalysisError::ImageRead {
            path: frame.path.clone(),
            source,
        })?;
        let request = self.build_request(&frame.path, &bytes);
        let text = gateway.complete(&request)?;

        Ok(FrameAnalysis::present(frame, text))
    }

    /// Analyzes every frame, `concurrency` at a time. Never fails: a frame
    /// that could not be analyzed is returned as `Absent` in its original
    /// position, so the output matches the input in length and order.
    pub fn analyze_frames(&self, frames: &[FrameRecord], concurrency: usize) -> Vec<FrameAnalysis> {
        if !self.access.is_enabled() {
            return frames
                .iter()
                .map(|frame| FrameAnalysis::absent(frame, AnalysisError::Disabled.to_string()))
                .collect();
        }

        info!("Analyzing {} frames with model '{}'...", frames.len(), self.model);
        let pb = ProgressBar::new(frames.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Analyzing frames [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let analyze = |frame: &FrameRecord| {
            let analysis = self.analyze_or_absent(frame);
            pb.inc(1);
            analysis
        };

        let results: Vec<FrameAnalysis> = match rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .build()
        {
            Ok(pool) => pool.install(|| frames.par_iter().map(analyze).collect()),
            Err(e) => {
                warn!("Could not start analysis thread pool ({}). Analyzing sequentially.", e);
                frames.iter().map(analyze).collect()
            }
        };

        let analyzed = results.iter().filter(|a| a.is_present()).count();
        pb.finish_with_message("Frame analysis complete");
        info!("Analyzed {} of {} frames.", analyzed, frames.len());
        results
    }

    fn analyze_or_absent(&self, frame: &FrameRecord) -> FrameAnalysis {
        match self.analyze_frame(frame) {
            Ok(analysis) => analysis,
            Err(e) => {
                if !e.is_disabled() {
                    error!("Error analyzing frame {:?}: {}", frame.path, e);
                }
                FrameAnalysis::absent(frame, e.to_string())
            }
        }
    }

    fn build_request(&self, path: &Path, bytes: &[u8]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(vec![
                ContentPart::text(FRAME_PROMPT),
                ContentPart::inline_image(image_mime(path), &BASE64.encode(bytes)),
            ])],
            max_tokens: Some(self.max_tokens),
        }
    }
}

fn image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_gateway::testing::ScriptedGateway;
    use tempfile::TempDir;

    fn write_frame(dir: &TempDir, name: &str, bytes: &[u8], timestamp: f64) -> FrameRecord {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        FrameRecord { timestamp, path }
    }

    #[test]
    fn disabled_access_makes_no_request() {
        let dir = TempDir::new().unwrap();
        let frame = write_frame(&dir, "a.png", b"png", 1.0);
        let access: ModelAccess<ScriptedGateway> = ModelAccess::Disabled;
        let analyzer = FrameAnalyzer::new(&access, "vision", 500);

        assert!(matches!(analyzer.analyze_frame(&frame), Err(AnalysisError::Disabled)));

        let results = analyzer.analyze_frames(&[frame.clone()], 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].timestamp, 1.0);
        assert!(!results[0].is_present());
    }

    #[test]
    fn analysis_keeps_frame_timestamp_and_path() {
        let dir = TempDir::new().unwrap();
        let frame = write_frame(&dir, "slide.png", b"\x89PNG", 12.75);
        let access = ModelAccess::Enabled(ScriptedGateway::replying(vec!["A bar chart."]));
        let analyzer = FrameAnalyzer::new(&access, "vision", 500);

        let analysis = analyzer.analyze_frame(&frame).unwrap();
        assert_eq!(analysis.timestamp, 12.75);
        assert_eq!(analysis.frame_path, frame.path);
        assert_eq!(analysis.analysis(), Some("A bar chart."));
    }

    #[test]
    fn request_embeds_prompt_and_inline_image() {
        let dir = TempDir::new().unwrap();
        let frame = write_frame(&dir, "slide.png", b"hello", 0.0);
        let access = ModelAccess::Enabled(ScriptedGateway::replying(vec!["ok"]));
        FrameAnalyzer::new(&access, "vision-model", 321).analyze_frame(&frame).unwrap();

        let gateway = access.gateway().unwrap();
        assert_eq!(gateway.call_count(), 1);
        let request = gateway.request(0);
        assert_eq!(request.model, "vision-model");
        assert_eq!(request.max_tokens, Some(321));
        assert_eq!(request.image_count(), 1);
        assert!(request.prompt_text().contains("Key concepts"));
        assert_eq!(
            request.messages[0].content[1],
            ContentPart::inline_image("image/png", "aGVsbG8=")
        );
    }

    #[test]
    fn unreadable_frame_fails_without_calling_model() {
        let access = ModelAccess::Enabled(ScriptedGateway::replying(vec!["unused"]));
        let analyzer = FrameAnalyzer::new(&access, "vision", 500);
        let frame = FrameRecord {
            timestamp: 3.0,
            path: PathBuf::from("/nonexistent/frame.jpg"),
        };

        assert!(matches!(
            analyzer.analyze_frame(&frame),
            Err(AnalysisError::ImageRead { .. })
        ));
        assert_eq!(access.gateway().unwrap().call_count(), 0);
    }

    #[test]
    fn failed_frame_keeps_its_slot() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            write_frame(&dir, "0.png", b"0", 0.0),
            FrameRecord { timestamp: 5.0, path: dir.path().join("missing.png") },
            write_frame(&dir, "2.png", b"2", 10.0),
        ];
        let access = ModelAccess::Enabled(ScriptedGateway::new(|_| Ok("content".to_string())));
        let results = FrameAnalyzer::new(&access, "vision", 500).analyze_frames(&frames, 1);

        assert_eq!(results.len(), 3);
        let timestamps: Vec<f64> = results.iter().map(|a| a.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 5.0, 10.0]);
        assert!(results[0].is_present());
        assert!(!results[1].is_present());
        assert!(results[2].is_present());
    }

    #[test]
    fn concurrent_analysis_preserves_input_order() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<FrameRecord> = (0..8)
            .map(|i| write_frame(&dir, &format!("{i}.jpg"), format!("frame-{i}").as_bytes(), i as f64))
            .collect();
        let access = ModelAccess::Enabled(ScriptedGateway::new(|request| {
            match &request.messages[0].content[1] {
                ContentPart::ImageUrl { image_url } => Ok(image_url.url.clone()),
                ContentPart::Text { .. } => Ok(String::new()),
            }
        }));
        let results = FrameAnalyzer::new(&access, "vision", 500).analyze_frames(&frames, 4);

        for (i, analysis) in results.iter().enumerate() {
            assert_eq!(analysis.timestamp, i as f64);
            let expected = format!("data:image/jpeg;base64,{}", BASE64.encode(format!("frame-{i}")));
            assert_eq!(analysis.analysis(), Some(expected.as_str()));
        }
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let frame = FrameRecord { timestamp: 2.0, path: PathBuf::from("f.png") };
        let value = serde_json::to_value(FrameAnalysis::present(&frame, "text".into())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"timestamp": 2.0, "frame_path": "f.png", "status": "present", "analysis": "text"})
        );
        let value = serde_json::to_value(FrameAnalysis::absent(&frame, "boom")).unwrap();
        assert_eq!(value["status"], "absent");
        assert_eq!(value["reason"], "boom");
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(image_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(image_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(image_mime(Path::new("noext")), "image/jpeg");
    }
}

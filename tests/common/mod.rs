#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use videogapfinder::error::AnalysisError;
use videogapfinder::model_gateway::{ChatRequest, ModelGateway};
use videogapfinder::video_processor::{FrameExtractor, FrameRecord};

/// Which analysis stage a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Frame,
    Sequence,
    Gaps,
}

pub fn stage_of(request: &ChatRequest) -> Stage {
    if request.image_count() > 0 {
        Stage::Frame
    } else if request.prompt_text().starts_with("Review these") {
        Stage::Sequence
    } else {
        Stage::Gaps
    }
}

/// Gateway answering each stage with a fixed reply (or failure) and
/// recording every request.
pub struct StageGateway {
    pub frame_reply: Result<String, u16>,
    pub sequence_reply: Result<String, u16>,
    pub gaps_reply: Result<String, u16>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl StageGateway {
    pub fn new(frame: &str, sequence: &str, gaps: &str) -> Self {
        StageGateway {
            frame_reply: Ok(frame.to_string()),
            sequence_reply: Ok(sequence.to_string()),
            gaps_reply: Ok(gaps.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request fails with the given HTTP status.
    pub fn failing(status: u16) -> Self {
        StageGateway {
            frame_reply: Err(status),
            sequence_reply: Err(status),
            gaps_reply: Err(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests_for(&self, stage: Stage) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| stage_of(r) == stage)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ModelGateway for StageGateway {
    fn complete(&self, request: &ChatRequest) -> Result<String, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = match stage_of(request) {
            Stage::Frame => &self.frame_reply,
            Stage::Sequence => &self.sequence_reply,
            Stage::Gaps => &self.gaps_reply,
        };
        reply.clone().map_err(|status| AnalysisError::Api {
            status,
            body: "scripted failure".to_string(),
        })
    }
}

/// Extractor that writes small placeholder files instead of decoding video.
pub struct StubExtractor {
    pub dir: PathBuf,
    pub initial: Vec<f64>,
    /// Initial-pass timestamps whose file is never written.
    pub unreadable: Vec<f64>,
    pub fail_second_pass: bool,
    pub second_pass_requests: Vec<Vec<f64>>,
}

impl StubExtractor {
    pub fn new(dir: &Path, initial: &[f64]) -> Self {
        StubExtractor {
            dir: dir.to_path_buf(),
            initial: initial.to_vec(),
            unreadable: Vec::new(),
            fail_second_pass: false,
            second_pass_requests: Vec::new(),
        }
    }

    fn record(&self, prefix: &str, timestamp: f64, write: bool) -> FrameRecord {
        let path = self.dir.join(format!("{}_{}.png", prefix, timestamp));
        if write {
            fs::write(&path, format!("{} frame at {}", prefix, timestamp)).unwrap();
        }
        FrameRecord { timestamp, path }
    }
}

impl FrameExtractor for StubExtractor {
    fn extract_initial(&mut self) -> Result<Vec<FrameRecord>> {
        Ok(self
            .initial
            .iter()
            .map(|t| self.record("frame", *t, !self.unreadable.contains(t)))
            .collect())
    }

    fn extract_at(&mut self, timestamps: &[f64]) -> Result<Vec<FrameRecord>> {
        self.second_pass_requests.push(timestamps.to_vec());
        if self.fail_second_pass {
            return Err(anyhow!("decoder exploded"));
        }
        Ok(timestamps.iter().map(|t| self.record("gap", *t, true)).collect())
    }
}

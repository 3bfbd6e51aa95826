//! Video Processing Module
//!
//! Decodes video files with the ffmpeg-next crate and captures still frames
//! either at a fixed interval (first pass) or at requested timestamps
//! (second pass, driven by the gap extractor).

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, flag::Flags};
use ffmpeg::util::frame::video::Video;
use image::{ImageBuffer, Rgb};
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

// Decoded timestamps rarely land exactly on a target.
const TIMESTAMP_EPSILON: f64 = 1e-3;

/// Smallest accepted sampling interval, in seconds.
pub const MIN_INTERVAL: f64 = 1e-3;

/// A captured frame: where in the video it was taken and where it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: f64,
    pub path: PathBuf,
}

/// Source of frames for the analysis pipeline.
pub trait FrameExtractor {
    /// Frames for the first pass, in chronological order.
    fn extract_initial(&mut self) -> Result<Vec<FrameRecord>>;

    /// Frames at (or just after) each of the given timestamps.
    fn extract_at(&mut self, timestamps: &[f64]) -> Result<Vec<FrameRecord>>;
}

/// Decides which decoded frames get captured.
#[derive(Debug)]
enum CapturePlan {
    Interval { every: f64, next: f64 },
    Targets(VecDeque<f64>),
}

impl CapturePlan {
    fn interval(every: f64) -> Self {
        CapturePlan::Interval { every, next: 0.0 }
    }

    fn targets(timestamps: &[f64]) -> Self {
        let mut sorted: Vec<f64> = timestamps.iter().copied().filter(|t| t.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        CapturePlan::Targets(sorted.into())
    }

    /// Returns true if the frame decoded at `seconds` should be captured, and
    /// advances past every target it satisfies.
    fn take_due(&mut self, seconds: f64) -> bool {
        let reached = seconds + TIMESTAMP_EPSILON;
        match self {
            CapturePlan::Interval { every, next } => {
                if reached < *next {
                    return false;
                }
                // Next slot boundary strictly after `reached`.
                *next = ((reached / *every).floor() + 1.0) * *every;
                true
            }
            CapturePlan::Targets(pending) => {
                let mut due = false;
                while pending.front().is_some_and(|t| *t <= reached) {
                    pending.pop_front();
                    due = true;
                }
                due
            }
        }
    }

    fn is_done(&self) -> bool {
        matches!(self, CapturePlan::Targets(pending) if pending.is_empty())
    }
}

/// ffmpeg-backed [`FrameExtractor`] writing PNG frames into `frames_dir`.
pub struct VideoFrameExtractor {
    input_file: PathBuf,
    frames_dir: PathBuf,
    interval: f64,
    captured: usize,
}

impl VideoFrameExtractor {
    pub fn new(input_file: &Path, frames_dir: &Path, interval: f64) -> Result<Self> {
        if !(interval.is_finite() && interval >= MIN_INTERVAL) {
            return Err(anyhow!(
                "Sampling interval must be at least {}s, got {}",
                MIN_INTERVAL,
                interval
            ));
        }
        Ok(VideoFrameExtractor {
            input_file: input_file.to_path_buf(),
            frames_dir: frames_dir.to_path_buf(),
            interval,
            captured: 0,
        })
    }

    fn run_plan(&mut self, mut plan: CapturePlan, prefix: &str) -> Result<Vec<FrameRecord>> {
        let records = capture_frames(&self.input_file, &mut plan, &self.frames_dir, prefix, self.captured)?;
        self.captured += records.len();
        Ok(records)
    }
}

impl FrameExtractor for VideoFrameExtractor {
    fn extract_initial(&mut self) -> Result<Vec<FrameRecord>> {
        info!("Sampling one frame every {}s from {:?}", self.interval, self.input_file);
        self.run_plan(CapturePlan::interval(self.interval), "frame")
    }

    fn extract_at(&mut self, timestamps: &[f64]) -> Result<Vec<FrameRecord>> {
        info!("Capturing {} additional frames from {:?}", timestamps.len(), self.input_file);
        let records = self.run_plan(CapturePlan::targets(timestamps), "gap")?;
        if records.len() < timestamps.len() {
            warn!(
                "Captured {} of {} requested frames (duplicates share a frame, targets past the end are skipped).",
                records.len(),
                timestamps.len()
            );
        }
        Ok(records)
    }
}

/// Reads the container duration in seconds.
pub fn probe_duration(path: &Path) -> Result<f64> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    let ictx = input(path).context("Failed to open input file for duration probe")?;
    let duration = ictx.duration();
    if duration > 0 {
        // AV_TIME_BASE units (microseconds)
        return Ok(duration as f64 / 1_000_000.0);
    }
    Err(anyhow!("Could not determine duration from video metadata"))
}

fn frame_file_name(prefix: &str, index: usize, seconds: f64) -> String {
    format!("{}_{:05}_{:08}ms.png", prefix, index, (seconds * 1000.0).round() as u64)
}

/// Decodes `path` once and saves every frame the plan asks for.
fn capture_frames(
    path: &Path,
    plan: &mut CapturePlan,
    frames_dir: &Path,
    prefix: &str,
    start_index: usize,
) -> Result<Vec<FrameRecord>> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;

    let mut ictx = input(path).context("Failed to open input file")?;
    let input = ictx
        .streams()
        .best(Type::Video)
        .context("Could not find video stream")?;
    let video_stream_index = input.index();
    let time_base = f64::from(input.time_base());

    let context_decoder = ffmpeg::codec::context::Context::from_parameters(input.parameters())
        .context("Failed to create decoder context")?;
    let mut decoder = context_decoder.decoder().video()
        .context("Failed to create video decoder")?;

    let mut scaler = ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    ).context("Failed to create scaler")?;

    let mut records = Vec::new();
    let mut receive_and_capture =
        |decoder: &mut ffmpeg::decoder::Video, plan: &mut CapturePlan, records: &mut Vec<FrameRecord>| -> Result<()> {
            let mut decoded = Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                let Some(ts) = decoded.timestamp().or(decoded.pts()) else {
                    continue;
                };
                let seconds = (ts as f64 * time_base).max(0.0);
                if !plan.take_due(seconds) {
                    continue;
                }

                let mut rgb_frame = Video::empty();
                scaler.run(&decoded, &mut rgb_frame).context("Scaler failed")?;
                let img = to_image_buffer(&rgb_frame)?;

                let frame_path = frames_dir.join(frame_file_name(prefix, start_index + records.len(), seconds));
                img.save(&frame_path)
                    .with_context(|| format!("Failed to save frame to {:?}", frame_path))?;
                records.push(FrameRecord { timestamp: seconds, path: frame_path });
            }
            Ok(())
        };

    for (stream, packet) in ictx.packets() {
        if plan.is_done() {
            break;
        }
        if stream.index() == video_stream_index {
            decoder.send_packet(&packet).context("Failed to send packet to decoder")?;
            receive_and_capture(&mut decoder, plan, &mut records)?;
        }
    }
    if !plan.is_done() {
        decoder.send_eof()?;
        receive_and_capture(&mut decoder, plan, &mut records)?;
    }

    info!("Captured {} frames from video stream.", records.len());
    Ok(records)
}

/// Copies an RGB24 ffmpeg frame into an image buffer, dropping row padding.
fn to_image_buffer(rgb_frame: &Video) -> Result<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let frame_data = rgb_frame.data(0);
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0);

    if stride == 0 {
        return Err(anyhow!("Invalid frame stride"));
    }

    let mut pixels = Vec::with_capacity(width * height * 3);
    for row in frame_data.chunks(stride).take(height) {
        if row.len() < width * 3 {
            return Err(anyhow!("Frame data is smaller than expected"));
        }
        pixels.extend_from_slice(&row[..width * 3]);
    }

    ImageBuffer::from_vec(width as u32, height as u32, pixels)
        .context("Failed to create image buffer from frame data")
}

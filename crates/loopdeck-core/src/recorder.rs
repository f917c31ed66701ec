use std::{
    io::Cursor,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::time::frames_to_seconds;

/// Clips under one second are almost always an accidental tap.
const MIN_CLIP_SECONDS: f64 = 1.0;

#[derive(Debug, Error)]
pub enum RecordingError {
    /// A record press with nothing audible is a common user mistake; it is
    /// surfaced, never silently ignored.
    #[error("recording captured no audio; make sure something is playing")]
    EmptyCapture,
    #[error("recording is too short ({seconds:.2}s); record at least one second")]
    TooShort { seconds: f64 },
    #[error("recording is not active")]
    NotRecording,
}

/// A finalized capture, ready for encoding and upload.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl RecordedClip {
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.samples.len(), self.sample_rate)
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Encodes the clip as 16-bit mono PCM wav.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn encode_wav(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create clip output directory: {}", parent.display())
            })?;
        }
        let bytes = self.encode_wav_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write clip: {}", path.display()))?;
        info!("clip encoded to wav");
        Ok(())
    }

    /// In-memory wav encode, used when the clip goes straight to the relay.
    pub fn encode_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("failed to start wav encode")?;
            for sample in &self.samples {
                let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
                writer
                    .write_sample(quantized)
                    .context("failed to encode wav sample")?;
            }
            writer.finalize().context("failed to finalize wav encode")?;
        }
        Ok(cursor.into_inner())
    }

    /// Hands the clip to the external mp3 encoder (ffmpeg). This is a
    /// separate, independently-failable step so nothing else waits on it.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn encode_mp3(&self, path: &Path, ffmpeg_binary: Option<&Path>) -> Result<PathBuf> {
        let wav_dir = tempfile::tempdir().context("failed to create mp3 staging directory")?;
        let wav_path = wav_dir.path().join("clip.wav");
        self.encode_wav(&wav_path)?;

        let binary = ffmpeg_binary.map_or_else(|| PathBuf::from("ffmpeg"), Path::to_path_buf);
        let output = Command::new(&binary)
            .arg("-y")
            .arg("-i")
            .arg(&wav_path)
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg("128k")
            .arg(path)
            .output()
            .with_context(|| format!("failed to run mp3 encoder: {}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("mp3 encode failed ({}): {}", output.status, stderr.trim());
        }

        info!("clip encoded to mp3");
        Ok(path.to_path_buf())
    }
}

/// Captures the transport's rendered mix while active.
///
/// Chunks are queue-appended per tick; finalize concatenates them. While
/// the transport is paused its voices render silence, so a pause shows up
/// in the capture as silence rather than a spliced-out gap.
#[derive(Debug)]
pub struct RecordingSession {
    recording: bool,
    chunks: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl RecordingSession {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            recording: false,
            chunks: Vec::new(),
            sample_rate,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn start(&mut self) {
        self.chunks.clear();
        self.recording = true;
        info!("recording started");
    }

    /// Appends one tick's rendered frames. Ignored while not recording.
    pub fn capture(&mut self, frames: &[f32]) {
        if !self.recording || frames.is_empty() {
            return;
        }
        self.chunks.push(frames.to_vec());
    }

    /// Stops capturing and finalizes the pending chunks into one clip.
    #[instrument(skip(self))]
    pub fn stop(&mut self) -> Result<RecordedClip, RecordingError> {
        if !self.recording {
            return Err(RecordingError::NotRecording);
        }
        self.recording = false;

        if self.chunks.is_empty() {
            warn!("recording stopped with no captured chunks");
            return Err(RecordingError::EmptyCapture);
        }

        let samples: Vec<f32> = self.chunks.drain(..).flatten().collect();
        let clip = RecordedClip {
            samples,
            sample_rate: self.sample_rate,
        };

        let seconds = clip.duration_seconds();
        if seconds < MIN_CLIP_SECONDS {
            warn!(seconds, "recording too short, discarding");
            return Err(RecordingError::TooShort { seconds });
        }

        debug!(seconds, "recording finalized");
        Ok(clip)
    }
}

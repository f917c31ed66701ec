use std::path::Path;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets::{AssetCache, LoadError, PreloadReport},
    host::HostSignals,
    model::{EngineConfig, SoundCategory},
    recorder::{RecordedClip, RecordingError, RecordingSession},
    relay::{RelayClient, RelayError, RelayTransport, SendAudioResponse},
    time::ms_to_frames,
    transport::{TickReport, Transport, TransportError},
};

/// A stalled frame loop advances playback by at most this much per tick.
const MAX_RENDER_SLICE_MS: f64 = 1_000.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// The whole pad session as one explicit value: asset cache, transport,
/// recorder, and the host seam. No module-level state anywhere, so several
/// independent engines can coexist (and be tested) in one process.
pub struct PadEngine {
    config: EngineConfig,
    cache: AssetCache,
    transport: Transport,
    recorder: RecordingSession,
    host: Box<dyn HostSignals>,
    last_tick_ms: Option<f64>,
    render_buf: Vec<f32>,
}

impl PadEngine {
    #[must_use]
    pub fn new(config: EngineConfig, host: Box<dyn HostSignals>) -> Self {
        host.signal_ready();
        Self {
            cache: AssetCache::new(config.sample_rate),
            transport: Transport::new(&config),
            recorder: RecordingSession::new(config.sample_rate),
            config,
            host,
            last_tick_ms: None,
            render_buf: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Loads the whole sample set up front, streaming progress to the
    /// host. Individual failures are reported but never block readiness.
    #[instrument(skip_all, fields(total = paths.len()))]
    pub fn preload(&mut self, paths: &[String]) -> PreloadReport {
        self.host.show_progress();
        let host = &self.host;
        let report = self.cache.preload_all(paths, |attempted, total| {
            host.set_progress_text(&format!("Loading sounds {attempted}/{total}"));
        });
        self.host.hide_progress();

        if !report.failed.is_empty() {
            self.host.show_alert(&format!(
                "{} of {} sounds failed to load",
                report.failed.len(),
                report.total
            ));
        }
        report
    }

    /// Pad press: immediate sound plus a timeline marker. Returns the new
    /// entry id so the UI can correlate its marker element.
    pub fn pad_tapped(
        &mut self,
        path: &str,
        category: SoundCategory,
        now_ms: f64,
    ) -> Result<Uuid, EngineError> {
        let asset = match self.cache.get_or_load(path) {
            Ok(asset) => asset,
            Err(error) => {
                self.host.show_alert(&format!("Sound failed to load: {error}"));
                return Err(error.into());
            }
        };
        match self.transport.pad_tapped(&asset, category, now_ms) {
            Ok(id) => Ok(id),
            Err(error) => {
                self.host.show_alert(&format!("Playback failed: {error}"));
                Err(error.into())
            }
        }
    }

    /// Toggle-selects the looping lead melody.
    pub fn select_melody(&mut self, path: &str, now_ms: f64) -> Result<bool, EngineError> {
        let asset = match self.cache.get_or_load(path) {
            Ok(asset) => asset,
            Err(error) => {
                self.host.show_alert(&format!("Sound failed to load: {error}"));
                return Err(error.into());
            }
        };
        Ok(self.transport.select_melody(&asset, now_ms)?)
    }

    pub fn play(&mut self, now_ms: f64) -> Result<(), EngineError> {
        match self.transport.play(now_ms) {
            Ok(()) => Ok(()),
            Err(TransportError::NoMelodySelected) => {
                self.host.show_alert("Choose a melody first!");
                Err(TransportError::NoMelodySelected.into())
            }
            Err(error) => {
                self.host.show_alert(&format!("Playback failed: {error}"));
                Err(error.into())
            }
        }
    }

    pub fn pause(&mut self, now_ms: f64) -> Result<(), EngineError> {
        Ok(self.transport.pause(now_ms)?)
    }

    pub fn resume(&mut self, now_ms: f64) -> Result<(), EngineError> {
        Ok(self.transport.resume(now_ms)?)
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    pub fn remove_marker(&mut self, id: Uuid) -> bool {
        self.transport.remove_entry(id)
    }

    /// One frame of the application loop: schedule due entries, render the
    /// mix for the elapsed wall time, and feed the recorder. A paused
    /// transport renders silence, so pauses show up as silence in the
    /// capture rather than as a spliced-out gap.
    pub fn tick(&mut self, now_ms: f64) -> TickReport {
        let report = self.transport.tick(now_ms);

        let delta_ms = self
            .last_tick_ms
            .map_or(0.0, |last| (now_ms - last).clamp(0.0, MAX_RENDER_SLICE_MS));
        self.last_tick_ms = Some(now_ms);

        let frames = ms_to_frames(delta_ms, self.config.sample_rate);
        if frames > 0 {
            self.render_buf.resize(frames, 0.0);
            self.transport.render_mix(&mut self.render_buf);
            if self.recorder.is_recording() {
                let buf = std::mem::take(&mut self.render_buf);
                self.recorder.capture(&buf);
                self.render_buf = buf;
            }
        }

        report
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn start_recording(&mut self) {
        self.recorder.start();
    }

    /// Finalizes the capture into a clip. Empty and too-short captures are
    /// surfaced to the user and abort the send pipeline.
    pub fn stop_recording(&mut self) -> Result<RecordedClip, EngineError> {
        match self.recorder.stop() {
            Ok(clip) => {
                info!(seconds = clip.duration_seconds(), "clip ready");
                Ok(clip)
            }
            Err(error) => {
                self.host.show_alert(&error.to_string());
                Err(error.into())
            }
        }
    }

    /// Encodes a finalized clip and delivers it through the relay.
    #[instrument(skip(self, clip, relay))]
    pub fn send_clip<T: RelayTransport>(
        &self,
        clip: &RecordedClip,
        chat_id: &str,
        relay: &RelayClient<T>,
    ) -> Result<SendAudioResponse, EngineError> {
        let bytes = clip.encode_wav_bytes()?;

        self.host.set_progress_text("Sending…");
        self.host.show_progress();
        let result = relay.send_audio(chat_id, &bytes, "recording.wav");
        self.host.hide_progress();

        match result {
            Ok(response) => {
                self.host.show_alert("Audio sent! Check the bot chat.");
                Ok(response)
            }
            Err(error) => {
                warn!(%error, "clip delivery failed");
                self.host.show_alert(&format!("Send failed: {error}"));
                Err(error.into())
            }
        }
    }

    /// Forwards the active lead melody's source file through the relay.
    #[instrument(skip(self, relay))]
    pub fn send_melody<T: RelayTransport>(
        &self,
        chat_id: &str,
        relay: &RelayClient<T>,
    ) -> Result<SendAudioResponse, EngineError> {
        let Some(path) = self.transport.active_melody_path() else {
            self.host.show_alert("Select a melody first!");
            return Err(TransportError::NoMelodySelected.into());
        };

        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read melody file: {path}"))
            .map_err(EngineError::from)?;
        let filename = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("melody.wav");

        self.host.set_progress_text("Sending melody…");
        self.host.show_progress();
        let result = relay.send_audio(chat_id, &bytes, filename);
        self.host.hide_progress();

        match result {
            Ok(response) => {
                self.host.show_alert("Melody sent to the chat!");
                Ok(response)
            }
            Err(error) => {
                self.host.show_alert(&format!("Send failed: {error}"));
                Err(error.into())
            }
        }
    }
}

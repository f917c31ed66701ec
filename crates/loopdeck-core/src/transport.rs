use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets::SoundAsset,
    model::{BeatTrack, EngineConfig, SoundCategory, TransportMode, TransportState},
    time::{cycle_index, cycle_position_ms, tap_offset_seconds, wrap_distance_ms},
    voice::{PlaybackController, PlaybackError, TriggerOptions},
};

/// Gain floor the lead melody is ducked to when a percussive entry fires.
const DUCK_FLOOR: f32 = 0.4;
/// Linear ramp back to unity gain after a duck, in milliseconds.
const DUCK_RECOVERY_MS: f64 = 150.0;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no melody selected")]
    NoMelodySelected,
    #[error("transport is not playing")]
    NotPlaying,
    #[error("transport is not paused")]
    NotPaused,
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// The single looping lead track; at most one may be selected.
#[derive(Debug, Clone)]
struct MelodySelection {
    path: String,
    asset: Arc<SoundAsset>,
}

/// Per-tick summary handed back to the embedding layer for progress bars
/// and marker highlighting.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// False when the transport was not running and the tick did nothing.
    pub active: bool,
    /// Playhead position within the cycle as a 0..1 ratio.
    pub progress: f64,
    pub cycle: u64,
    pub cycle_wrapped: bool,
    pub fired: Vec<Uuid>,
}

/// Frame-driven transport: advances the virtual playhead, fires due beat
/// track entries once per cycle, and owns play/pause/stop semantics.
///
/// All methods take explicit millisecond timestamps; the embedding layer
/// calls [`Transport::tick`] once per display refresh while playing.
#[derive(Debug)]
pub struct Transport {
    state: TransportState,
    beat_track: BeatTrack,
    melody: Option<MelodySelection>,
    playback: PlaybackController,
    fire_tolerance_ms: f64,
    auto_gain: bool,
    ducking: bool,
    duck_level: f32,
    last_tick_ms: Option<f64>,
}

impl Transport {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: TransportState::new(config.cycle_duration_ms),
            beat_track: BeatTrack::new(),
            melody: None,
            playback: PlaybackController::new(config),
            fire_tolerance_ms: config.fire_tolerance_ms,
            auto_gain: config.auto_gain,
            ducking: config.ducking,
            duck_level: 1.0,
            last_tick_ms: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &TransportState {
        &self.state
    }

    #[must_use]
    pub fn beat_track(&self) -> &BeatTrack {
        &self.beat_track
    }

    #[must_use]
    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController {
        &mut self.playback
    }

    #[must_use]
    pub fn active_melody_path(&self) -> Option<&str> {
        self.melody.as_ref().map(|melody| melody.path.as_str())
    }

    /// Starts the transport from Stopped. Requires a selected melody; the
    /// transition is rolled back (state stays Stopped) when there is none
    /// or the lead fails to start. A no-op while already playing.
    #[instrument(skip(self))]
    pub fn play(&mut self, now_ms: f64) -> Result<(), TransportError> {
        if self.state.is_playing {
            return Ok(());
        }

        let Some(melody) = self.melody.clone() else {
            return Err(TransportError::NoMelodySelected);
        };

        self.playback.trigger(
            &melody.asset,
            TriggerOptions {
                looping: true,
                reset_offset: true,
                gain_scale: 1.0,
            },
            now_ms,
        )?;

        self.beat_track.reset_fired_flags();
        self.state.is_playing = true;
        self.state.is_paused = false;
        self.state.play_start_ms = Some(now_ms);
        self.state.pause_ms = None;
        self.state.current_cycle = 0;
        self.last_tick_ms = None;
        info!(melody = %melody.path, "transport playing");
        Ok(())
    }

    /// Pauses in place: every playing voice keeps its position so resume
    /// continues mid-note.
    #[instrument(skip(self))]
    pub fn pause(&mut self, now_ms: f64) -> Result<(), TransportError> {
        if self.state.mode() != TransportMode::Playing {
            return Err(TransportError::NotPlaying);
        }

        self.state.is_paused = true;
        self.state.pause_ms = Some(now_ms);
        self.playback.pause_all();
        info!("transport paused");
        Ok(())
    }

    /// Resumes from a pause, shifting the play epoch forward by exactly the
    /// paused duration. That keeps every entry's cycle-relative offset
    /// unchanged, so a pause never desynchronizes the pattern.
    #[instrument(skip(self))]
    pub fn resume(&mut self, now_ms: f64) -> Result<(), TransportError> {
        if self.state.mode() != TransportMode::Paused {
            return Err(TransportError::NotPaused);
        }

        let paused_for = now_ms - self.state.pause_ms.take().unwrap_or(now_ms);
        if let Some(start) = self.state.play_start_ms.as_mut() {
            *start += paused_for;
        }
        self.state.is_paused = false;
        self.playback.resume_all();
        info!(paused_for_ms = paused_for, "transport resumed");
        Ok(())
    }

    /// Stops from Playing or Paused: clears the beat track, stops and
    /// drops the active melody, silences every voice, resets the clock.
    #[instrument(skip(self))]
    pub fn stop(&mut self) {
        self.beat_track.clear();
        if let Some(melody) = self.melody.take() {
            self.playback.stop_asset(&melody.path);
        }
        self.playback.stop_all();
        self.state.reset();
        self.duck_level = 1.0;
        self.last_tick_ms = None;
        info!("transport stopped");
    }

    /// Toggle-selects the looping lead. Selecting a new melody stops and
    /// replaces the previous one; selecting the active melody deselects
    /// it. Returns whether the asset is now the active lead.
    #[instrument(skip(self, asset), fields(path = asset.path()))]
    pub fn select_melody(
        &mut self,
        asset: &Arc<SoundAsset>,
        now_ms: f64,
    ) -> Result<bool, TransportError> {
        if let Some(current) = self.melody.take() {
            self.playback.stop_asset(&current.path);
            if current.path == asset.path() {
                debug!("melody deselected");
                return Ok(false);
            }
        }

        self.melody = Some(MelodySelection {
            path: asset.path().to_string(),
            asset: asset.clone(),
        });

        if self.state.mode() == TransportMode::Playing {
            self.playback.trigger(
                asset,
                TriggerOptions {
                    looping: true,
                    reset_offset: true,
                    gain_scale: 1.0,
                },
                now_ms,
            )?;
        }
        Ok(true)
    }

    /// Pad interaction: sounds the sample immediately and drops an entry on
    /// the timeline at the current playhead position (cycle start while
    /// stopped or paused). Returns the entry id for marker correlation.
    #[instrument(skip(self, asset), fields(path = asset.path(), ?category))]
    pub fn pad_tapped(
        &mut self,
        asset: &Arc<SoundAsset>,
        category: SoundCategory,
        now_ms: f64,
    ) -> Result<Uuid, TransportError> {
        self.playback
            .trigger(asset, TriggerOptions::default(), now_ms)?;

        let play_start = match self.state.mode() {
            TransportMode::Playing => self.state.play_start_ms,
            TransportMode::Stopped | TransportMode::Paused => None,
        };
        let offset_seconds =
            tap_offset_seconds(now_ms, play_start, self.state.cycle_duration_ms);
        let id = self.beat_track.add(asset.clone(), category, offset_seconds);
        debug!(%id, offset_seconds, "beat track entry added");
        Ok(id)
    }

    /// Marker removal callback; a stale id is a no-op.
    pub fn remove_entry(&mut self, id: Uuid) -> bool {
        self.beat_track.remove(id)
    }

    /// One scheduler step, invoked per display refresh while playing.
    ///
    /// Entries are evaluated in insertion order against a single snapshot
    /// of `now_ms`, so firing one entry never affects whether a later one
    /// fires in the same tick. A failing trigger is logged and swallowed;
    /// the loop's job is to keep time.
    pub fn tick(&mut self, now_ms: f64) -> TickReport {
        let mut report = TickReport {
            cycle: self.state.current_cycle,
            ..TickReport::default()
        };

        if self.state.mode() != TransportMode::Playing {
            return report;
        }

        self.advance_duck(now_ms);
        self.last_tick_ms = Some(now_ms);

        // First-tick bootstrap: Play may have been issued without a clock.
        let start = *self.state.play_start_ms.get_or_insert(now_ms);
        let elapsed = now_ms - start;
        let position = cycle_position_ms(elapsed, self.state.cycle_duration_ms);

        report.active = true;
        report.progress = position / self.state.cycle_duration_ms;

        let cycle = cycle_index(elapsed, self.state.cycle_duration_ms);
        if cycle != self.state.current_cycle {
            self.state.current_cycle = cycle;
            report.cycle_wrapped = true;
        }
        report.cycle = cycle;

        // An entry is due when the playhead enters its tolerance window; it
        // rearms only after the playhead leaves again. Resetting at the cycle
        // boundary instead would double-fire entries whose window straddles
        // the wrap point.
        let tolerance = self.fire_tolerance_ms;
        let cycle_ms = self.state.cycle_duration_ms;
        let mut due: Vec<(Uuid, Arc<SoundAsset>, SoundCategory)> = Vec::new();
        for entry in self.beat_track.entries_mut() {
            let in_window =
                wrap_distance_ms(position, entry.offset_ms(), cycle_ms) < tolerance;
            if entry.fired && !in_window {
                entry.fired = false;
            } else if !entry.fired && in_window {
                due.push((entry.id, entry.asset.clone(), entry.category));
            }
        }

        if due.is_empty() {
            return report;
        }

        // Simultaneous triggers share the headroom.
        let gain_scale = if self.auto_gain && due.len() > 1 {
            1.0 / (due.len() as f32).sqrt()
        } else {
            1.0
        };
        let percussive_due = due.iter().any(|(_, _, category)| category.is_percussive());

        for (id, asset, _) in &due {
            // Mark fired regardless of the outcome; a misfiring sound must
            // not retrigger on every frame inside the tolerance window.
            if let Some(entry) = self
                .beat_track
                .entries_mut()
                .iter_mut()
                .find(|entry| entry.id == *id)
            {
                entry.fired = true;
            }

            let options = TriggerOptions {
                looping: false,
                reset_offset: true,
                gain_scale,
            };
            if let Err(error) = self.playback.trigger(asset, options, now_ms) {
                warn!(path = asset.path(), %error, "scheduled trigger failed");
            } else {
                report.fired.push(*id);
            }
        }

        if self.ducking && percussive_due {
            if let Some(melody) = &self.melody {
                self.duck_level = DUCK_FLOOR;
                let path = melody.path.clone();
                self.playback.set_duck_level(&path, self.duck_level);
            }
        }

        report
    }

    /// Mixes all playing voices into `out`, advancing their playheads.
    /// The recording session captures exactly this buffer.
    pub fn render_mix(&mut self, out: &mut [f32]) {
        self.playback.render(out);
    }

    fn advance_duck(&mut self, now_ms: f64) {
        if self.duck_level >= 1.0 {
            return;
        }
        let delta = self
            .last_tick_ms
            .map_or(0.0, |last| (now_ms - last).max(0.0));
        self.duck_level =
            (self.duck_level + (delta / DUCK_RECOVERY_MS) as f32 * (1.0 - DUCK_FLOOR)).min(1.0);
        if let Some(melody) = &self.melody {
            let path = melody.path.clone();
            self.playback.set_duck_level(&path, self.duck_level);
        }
    }
}

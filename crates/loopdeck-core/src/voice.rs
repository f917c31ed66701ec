use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    assets::SoundAsset,
    model::{EngineConfig, OverflowPolicy},
};

pub type VoiceId = u64;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The host refused to bring the output out of its suspended state
    /// (autoplay policy before any user gesture).
    #[error("audio output is suspended and could not be resumed")]
    OutputSuspended,
    #[error("sound {path} has no samples to play")]
    EmptyAsset { path: String },
    #[error("polyphony cap reached for {path}, trigger dropped")]
    PolyphonyExhausted { path: String },
}

/// The shared audio output, which may start suspended per platform policy.
/// Resuming is a one-time awaited step; triggers issued against a suspended
/// output would be silently dropped by the host.
#[derive(Debug)]
pub struct OutputContext {
    running: bool,
    resume_denied: bool,
}

impl OutputContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: false,
            resume_denied: false,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulates a host that refuses resume attempts, for failure-path tests.
    pub fn deny_resume(&mut self, denied: bool) {
        self.resume_denied = denied;
    }

    pub fn ensure_running(&mut self) -> Result<(), PlaybackError> {
        if self.running {
            return Ok(());
        }
        if self.resume_denied {
            return Err(PlaybackError::OutputSuspended);
        }
        self.running = true;
        debug!("audio output resumed");
        Ok(())
    }
}

impl Default for OutputContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Playing,
    Paused,
}

/// One in-flight playback instance of an asset.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    samples: Arc<Vec<f32>>,
    position: usize,
    gain: f32,
    looping: bool,
    state: VoiceState,
    started_at_ms: f64,
}

impl Voice {
    #[must_use]
    pub fn id(&self) -> VoiceId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Mixes up to `out.len()` frames into `out`, advancing the playhead.
    /// Looping voices wrap; one-shots that reach the end go idle with their
    /// offset reset so the slot can be reused.
    fn render(&mut self, out: &mut [f32], duck: f32) {
        if self.state != VoiceState::Playing || self.samples.is_empty() {
            return;
        }

        let gain = self.gain * duck;
        let mut written = 0;
        while written < out.len() {
            let remaining = self.samples.len() - self.position;
            let take = remaining.min(out.len() - written);
            for (slot, sample) in out[written..written + take]
                .iter_mut()
                .zip(&self.samples[self.position..self.position + take])
            {
                *slot += sample * gain;
            }
            self.position += take;
            written += take;

            if self.position >= self.samples.len() {
                if self.looping {
                    self.position = 0;
                } else {
                    self.position = 0;
                    self.state = VoiceState::Idle;
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerOptions {
    pub looping: bool,
    pub reset_offset: bool,
    /// Extra scale applied on top of the asset gain, used by the
    /// transport's same-tick auto-gain.
    pub gain_scale: f32,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            looping: false,
            reset_offset: true,
            gain_scale: 1.0,
        }
    }
}

/// Allocates and drives voices, bounded per asset by the polyphony cap.
#[derive(Debug)]
pub struct PlaybackController {
    context: OutputContext,
    pools: HashMap<String, Vec<Voice>>,
    duck_levels: HashMap<String, f32>,
    polyphony_limit: usize,
    overflow_policy: OverflowPolicy,
    master_volume: f32,
    next_voice_id: VoiceId,
}

impl PlaybackController {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            context: OutputContext::new(),
            pools: HashMap::new(),
            duck_levels: HashMap::new(),
            polyphony_limit: config.polyphony_limit.max(1),
            overflow_policy: config.overflow_policy,
            master_volume: config.master_volume,
            next_voice_id: 0,
        }
    }

    pub fn context_mut(&mut self) -> &mut OutputContext {
        &mut self.context
    }

    pub fn ensure_output_running(&mut self) -> Result<(), PlaybackError> {
        self.context.ensure_running()
    }

    /// Starts (or restarts) a voice for the asset.
    ///
    /// Allocation order: reuse an idle voice, grow the pool while under the
    /// cap, then apply the configured overflow policy.
    #[instrument(skip(self, asset), fields(path = asset.path()))]
    pub fn trigger(
        &mut self,
        asset: &Arc<SoundAsset>,
        options: TriggerOptions,
        now_ms: f64,
    ) -> Result<VoiceId, PlaybackError> {
        self.context.ensure_running()?;
        if asset.samples().is_empty() {
            return Err(PlaybackError::EmptyAsset {
                path: asset.path().to_string(),
            });
        }

        let gain = asset.base_gain() * self.master_volume * options.gain_scale;
        let pool = self.pools.entry(asset.path().to_string()).or_default();

        let slot = if let Some(index) = pool
            .iter()
            .position(|voice| voice.state == VoiceState::Idle)
        {
            Some(index)
        } else if pool.len() < self.polyphony_limit {
            pool.push(Voice {
                id: 0,
                samples: asset.samples().clone(),
                position: 0,
                gain,
                looping: false,
                state: VoiceState::Idle,
                started_at_ms: now_ms,
            });
            Some(pool.len() - 1)
        } else {
            match self.overflow_policy {
                OverflowPolicy::EvictOldest => {
                    let oldest = pool
                        .iter()
                        .enumerate()
                        .min_by(|(_, a), (_, b)| a.started_at_ms.total_cmp(&b.started_at_ms))
                        .map(|(index, _)| index);
                    if let Some(index) = oldest {
                        debug!(voice = pool[index].id, "evicting oldest voice");
                    }
                    oldest
                }
                OverflowPolicy::DropNew => {
                    warn!("voice pool full, dropping trigger");
                    None
                }
            }
        };

        let Some(index) = slot else {
            return Err(PlaybackError::PolyphonyExhausted {
                path: asset.path().to_string(),
            });
        };

        let id = self.next_voice_id;
        self.next_voice_id += 1;

        let voice = &mut pool[index];
        voice.id = id;
        voice.samples = asset.samples().clone();
        voice.gain = gain;
        voice.looping = options.looping;
        voice.started_at_ms = now_ms;
        if options.reset_offset || voice.state == VoiceState::Idle {
            voice.position = 0;
        }
        voice.state = VoiceState::Playing;
        Ok(id)
    }

    /// True pause: every playing voice of the asset keeps its position.
    pub fn pause_asset(&mut self, path: &str) {
        if let Some(pool) = self.pools.get_mut(path) {
            for voice in pool.iter_mut().filter(|v| v.state == VoiceState::Playing) {
                voice.state = VoiceState::Paused;
            }
        }
    }

    /// Stops all voices of the asset and resets their offsets to zero.
    pub fn stop_asset(&mut self, path: &str) {
        if let Some(pool) = self.pools.get_mut(path) {
            for voice in pool.iter_mut() {
                voice.state = VoiceState::Idle;
                voice.position = 0;
            }
        }
    }

    pub fn pause_all(&mut self) {
        for pool in self.pools.values_mut() {
            for voice in pool.iter_mut().filter(|v| v.state == VoiceState::Playing) {
                voice.state = VoiceState::Paused;
            }
        }
    }

    pub fn resume_all(&mut self) {
        for pool in self.pools.values_mut() {
            for voice in pool.iter_mut().filter(|v| v.state == VoiceState::Paused) {
                voice.state = VoiceState::Playing;
            }
        }
    }

    pub fn stop_all(&mut self) {
        for pool in self.pools.values_mut() {
            for voice in pool.iter_mut() {
                voice.state = VoiceState::Idle;
                voice.position = 0;
            }
        }
        self.duck_levels.clear();
    }

    /// Temporary gain reduction for one asset (melody ducking); 1.0 clears.
    pub fn set_duck_level(&mut self, path: &str, level: f32) {
        if (level - 1.0).abs() < f32::EPSILON {
            self.duck_levels.remove(path);
        } else {
            self.duck_levels
                .insert(path.to_string(), level.clamp(0.0, 1.0));
        }
    }

    /// Mixes every playing voice into `out` and advances their playheads.
    /// The mix is clamped to [-1, 1]; this buffer is also what the
    /// recording session captures, so everything audible is recordable.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for (path, pool) in &mut self.pools {
            let duck = self.duck_levels.get(path).copied().unwrap_or(1.0);
            for voice in pool.iter_mut() {
                voice.render(out, duck);
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    #[must_use]
    pub fn active_voice_count(&self, path: &str) -> usize {
        self.pools.get(path).map_or(0, |pool| {
            pool.iter()
                .filter(|voice| voice.state == VoiceState::Playing)
                .count()
        })
    }

    #[must_use]
    pub fn pool_snapshot(&self, path: &str) -> Vec<(VoiceState, usize)> {
        self.pools.get(path).map_or_else(Vec::new, |pool| {
            pool.iter()
                .map(|voice| (voice.state, voice.position))
                .collect()
        })
    }
}

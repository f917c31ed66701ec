use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assets::SoundAsset;

pub const DEFAULT_CYCLE_DURATION_MS: f64 = 6_000.0;
pub const DEFAULT_FIRE_TOLERANCE_MS: f64 = 50.0;
pub const DEFAULT_POLYPHONY_LIMIT: usize = 8;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.8;
pub const DEFAULT_ENGINE_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_LOAD_TIMEOUT_SECONDS: u64 = 10;

/// Pad sound families from the sample bank layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SoundCategory {
    Kick,
    Melody,
    MelodyTop,
    Third,
    Fourth,
}

impl SoundCategory {
    /// Percussive categories duck the lead melody when they fire.
    #[must_use]
    pub fn is_percussive(self) -> bool {
        !matches!(self, Self::Melody | Self::MelodyTop)
    }
}

/// What happens when a trigger arrives and the voice pool is at its cap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Restart the oldest active voice. Truncating a note surprises users
    /// less than a trigger that never sounds.
    #[default]
    EvictOldest,
    /// Refuse the new trigger and log a warning.
    DropNew,
}

/// Engine-wide tunables. Serialized as JSON so an embedding shell can ship
/// its own profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub cycle_duration_ms: f64,
    pub fire_tolerance_ms: f64,
    pub polyphony_limit: usize,
    pub overflow_policy: OverflowPolicy,
    pub master_volume: f32,
    pub sample_rate: u32,
    /// Advisory per-asset load budget for degraded networks; enforced by
    /// the embedding layer, the synchronous decode path cannot be preempted.
    pub load_timeout_seconds: u64,
    pub auto_gain: bool,
    pub ducking: bool,
}

impl EngineConfig {
    /// Loads a config profile from a JSON file.
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config = serde_json::from_slice(&content).context("invalid config json")?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_duration_ms: DEFAULT_CYCLE_DURATION_MS,
            fire_tolerance_ms: DEFAULT_FIRE_TOLERANCE_MS,
            polyphony_limit: DEFAULT_POLYPHONY_LIMIT,
            overflow_policy: OverflowPolicy::default(),
            master_volume: DEFAULT_MASTER_VOLUME,
            sample_rate: DEFAULT_ENGINE_SAMPLE_RATE,
            load_timeout_seconds: DEFAULT_LOAD_TIMEOUT_SECONDS,
            auto_gain: true,
            ducking: true,
        }
    }
}

/// One scheduled trigger on the looping timeline.
///
/// The offset is fixed at creation; only the per-cycle `fired` flag is
/// mutated afterwards, and only by the transport.
#[derive(Debug, Clone)]
pub struct BeatTrackEntry {
    pub id: Uuid,
    pub asset: Arc<SoundAsset>,
    pub category: SoundCategory,
    pub offset_seconds: f64,
    pub fired: bool,
}

impl BeatTrackEntry {
    #[must_use]
    pub fn offset_ms(&self) -> f64 {
        self.offset_seconds * 1_000.0
    }
}

/// Ordered collection of scheduled triggers. Entries keep insertion order;
/// offset collisions are allowed and both fire.
#[derive(Debug, Clone, Default)]
pub struct BeatTrack {
    entries: Vec<BeatTrackEntry>,
}

impl BeatTrack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        asset: Arc<SoundAsset>,
        category: SoundCategory,
        offset_seconds: f64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(BeatTrackEntry {
            id,
            asset,
            category,
            offset_seconds,
            fired: false,
        });
        id
    }

    /// Deletes exactly one entry; a missing id is a no-op.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Re-arms every entry at once, used when playback starts. While
    /// running, the transport rearms entries individually as the playhead
    /// leaves their tolerance window.
    pub fn reset_fired_flags(&mut self) {
        for entry in &mut self.entries {
            entry.fired = false;
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[BeatTrackEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [BeatTrackEntry] {
        &mut self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transport mode derived from the two state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stopped,
    Playing,
    Paused,
}

/// Clock state for the looping transport.
///
/// `play_start_ms` marks the epoch of the current unpaused run; resume
/// shifts it forward by the paused duration so cycle-relative offsets
/// survive a pause unchanged.
#[derive(Debug, Clone)]
pub struct TransportState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub cycle_duration_ms: f64,
    pub play_start_ms: Option<f64>,
    pub pause_ms: Option<f64>,
    pub current_cycle: u64,
}

impl TransportState {
    #[must_use]
    pub fn new(cycle_duration_ms: f64) -> Self {
        Self {
            is_playing: false,
            is_paused: false,
            cycle_duration_ms,
            play_start_ms: None,
            pause_ms: None,
            current_cycle: 0,
        }
    }

    #[must_use]
    pub fn mode(&self) -> TransportMode {
        match (self.is_playing, self.is_paused) {
            (false, _) => TransportMode::Stopped,
            (true, false) => TransportMode::Playing,
            (true, true) => TransportMode::Paused,
        }
    }

    pub fn reset(&mut self) {
        self.is_playing = false;
        self.is_paused = false;
        self.play_start_ms = None;
        self.pause_ms = None;
        self.current_cycle = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_asset() -> Arc<SoundAsset> {
        Arc::new(SoundAsset::from_samples(
            "sounds/test.wav",
            vec![0.0; 480],
            DEFAULT_ENGINE_SAMPLE_RATE,
        ))
    }

    #[test]
    fn remove_is_idempotent() {
        let mut track = BeatTrack::new();
        let id = track.add(silent_asset(), SoundCategory::Kick, 0.5);
        assert!(track.remove(id));
        assert!(!track.remove(id));
        assert!(track.is_empty());
    }

    #[test]
    fn offset_collisions_are_kept() {
        let mut track = BeatTrack::new();
        track.add(silent_asset(), SoundCategory::Kick, 1.0);
        track.add(silent_asset(), SoundCategory::Third, 1.0);
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn reset_rearms_every_entry() {
        let mut track = BeatTrack::new();
        track.add(silent_asset(), SoundCategory::Kick, 0.0);
        track.add(silent_asset(), SoundCategory::Fourth, 2.0);
        for entry in track.entries_mut() {
            entry.fired = true;
        }
        track.reset_fired_flags();
        assert!(track.entries().iter().all(|entry| !entry.fired));
    }

    #[test]
    fn transport_mode_follows_flags() {
        let mut state = TransportState::new(DEFAULT_CYCLE_DURATION_MS);
        assert_eq!(state.mode(), TransportMode::Stopped);
        state.is_playing = true;
        assert_eq!(state.mode(), TransportMode::Playing);
        state.is_paused = true;
        assert_eq!(state.mode(), TransportMode::Paused);
        state.reset();
        assert_eq!(state.mode(), TransportMode::Stopped);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig {
            overflow_policy: OverflowPolicy::DropNew,
            polyphony_limit: 4,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).expect("config should serialize");
        let restored: EngineConfig = serde_json::from_str(&json).expect("config should parse");
        assert_eq!(config, restored);
    }
}

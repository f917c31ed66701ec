pub mod assets;
pub mod diagnostics;
pub mod engine;
pub mod fixtures;
pub mod host;
pub mod model;
pub mod recorder;
pub mod relay;
pub mod time;
pub mod transport;
pub mod voice;

pub use assets::{AssetCache, LoadError, PreloadReport, SoundAsset, scan_sample_dir};
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_with_options};
pub use engine::{EngineError, PadEngine};
pub use host::{HostSignals, LogHost};
pub use model::{
    BeatTrack, BeatTrackEntry, DEFAULT_CYCLE_DURATION_MS, DEFAULT_FIRE_TOLERANCE_MS,
    DEFAULT_POLYPHONY_LIMIT, EngineConfig, OverflowPolicy, SoundCategory, TransportMode,
    TransportState,
};
pub use recorder::{RecordedClip, RecordingError, RecordingSession};
pub use relay::{
    HttpRelayTransport, RelayClient, RelayError, RelayTransport, SendAudioResponse,
};
pub use transport::{TickReport, Transport, TransportError};
pub use voice::{
    OutputContext, PlaybackController, PlaybackError, TriggerOptions, VoiceId, VoiceState,
};

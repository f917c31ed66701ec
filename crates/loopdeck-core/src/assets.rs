use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::time::frames_to_seconds;

/// Gain correction aims every sample at this RMS level so quiet one-shots
/// are not buried under hot ones.
const REFERENCE_RMS: f32 = 0.1;
const MIN_NORMALIZATION_GAIN: f32 = 0.25;
const MAX_NORMALIZATION_GAIN: f32 = 4.0;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open sound {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode sound {path}: {cause}")]
    Decode { path: String, cause: String },
    #[error("decoded zero samples from {path}")]
    Empty { path: String },
}

impl LoadError {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Open { path, .. } | Self::Decode { path, .. } | Self::Empty { path } => path,
        }
    }
}

/// A loaded, playable sound: mono samples at the engine rate plus the
/// loudness-normalization gain computed at load time.
#[derive(Debug)]
pub struct SoundAsset {
    path: String,
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    base_gain: f32,
}

impl SoundAsset {
    #[must_use]
    pub fn from_samples(path: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        let base_gain = normalization_gain(&samples);
        Self {
            path: path.into(),
            samples: Arc::new(samples),
            sample_rate,
            base_gain,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn samples(&self) -> &Arc<Vec<f32>> {
        &self.samples
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn base_gain(&self) -> f32 {
        self.base_gain
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.samples.len(), self.sample_rate)
    }
}

/// Outcome of a batch preload. Failures are collected, never fatal: one bad
/// asset must not keep the pad grid from becoming ready.
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub total: usize,
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PreloadReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.attempted() == self.total
    }
}

/// Memoizing loader for the session's sample set.
///
/// Assets stay resident for the cache's lifetime; the sample bank is small
/// and known up front, so nothing is ever evicted.
#[derive(Debug)]
pub struct AssetCache {
    assets: HashMap<String, Arc<SoundAsset>>,
    sample_rate: u32,
    loads_performed: usize,
}

impl AssetCache {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            assets: HashMap::new(),
            sample_rate: sample_rate.max(8_000),
            loads_performed: 0,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of decodes actually performed, for cache-idempotence checks.
    #[must_use]
    pub fn loads_performed(&self) -> usize {
        self.loads_performed
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<SoundAsset>> {
        self.assets.get(path).cloned()
    }

    /// Idempotent load: repeated calls for one path return the same cached
    /// asset without re-decoding. A failed load leaves the cache
    /// unpopulated so a later retry is possible.
    #[instrument(skip(self))]
    pub fn get_or_load(&mut self, path: &str) -> Result<Arc<SoundAsset>, LoadError> {
        if let Some(asset) = self.assets.get(path) {
            return Ok(asset.clone());
        }

        let decoded = decode_sound_file(Path::new(path))?;
        let samples = resample_linear(&decoded.samples, decoded.sample_rate, self.sample_rate);
        let asset = Arc::new(SoundAsset::from_samples(path, samples, self.sample_rate));
        debug!(
            duration_seconds = asset.duration_seconds(),
            base_gain = asset.base_gain(),
            "sound cached"
        );
        self.loads_performed += 1;
        self.assets.insert(path.to_string(), asset.clone());
        Ok(asset)
    }

    /// Inject an already-decoded asset, mainly for fixtures and tests.
    pub fn insert(&mut self, asset: SoundAsset) -> Arc<SoundAsset> {
        let asset = Arc::new(asset);
        self.assets.insert(asset.path().to_string(), asset.clone());
        asset
    }

    /// Attempts every path, reporting `(attempted, total)` after each one.
    /// Success and failure both count, so the batch cannot hang on a bad
    /// asset and always reaches the ready state.
    #[instrument(skip_all, fields(total = paths.len()))]
    pub fn preload_all<P, F>(&mut self, paths: &[P], mut progress: F) -> PreloadReport
    where
        P: AsRef<str>,
        F: FnMut(usize, usize),
    {
        let mut report = PreloadReport {
            total: paths.len(),
            ..PreloadReport::default()
        };

        for path in paths {
            let path = path.as_ref();
            match self.get_or_load(path) {
                Ok(_) => report.loaded.push(path.to_string()),
                Err(error) => {
                    warn!(path, %error, "preload failed for one sound");
                    report.failed.push((path.to_string(), error.to_string()));
                }
            }
            progress(report.attempted(), report.total);
        }

        debug!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "preload complete"
        );
        report
    }
}

/// Discover playable sample files under a directory, sorted for a
/// deterministic preload order.
#[instrument(fields(directory = %directory.display()))]
pub fn scan_sample_dir(directory: &Path) -> Vec<PathBuf> {
    let extensions = supported_sound_extensions();
    let mut paths = Vec::new();

    for entry in walkdir::WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning samples");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(extension) = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
        else {
            continue;
        };
        if extensions.contains(extension.as_str()) {
            paths.push(entry.path().to_path_buf());
        }
    }

    paths.sort();
    debug!(count = paths.len(), "sample scan complete");
    paths
}

#[derive(Debug)]
struct DecodedSound {
    sample_rate: u32,
    samples: Vec<f32>,
}

fn decode_sound_file(path: &Path) -> Result<DecodedSound, LoadError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: display.clone(),
        source,
    })?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|error| LoadError::Decode {
            path: display.clone(),
            cause: error.to_string(),
        })?;
    let mut format = probed.format;
    let track = format.default_track().ok_or_else(|| LoadError::Decode {
        path: display.clone(),
        cause: "no default audio track".to_string(),
    })?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|error| LoadError::Decode {
            path: display.clone(),
            cause: error.to_string(),
        })?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(error) => {
                return Err(LoadError::Decode {
                    path: display,
                    cause: error.to_string(),
                });
            }
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(error) => {
                return Err(LoadError::Decode {
                    path: display,
                    cause: error.to_string(),
                });
            }
        };

        sample_rate = decoded.spec().rate;
        push_mono_samples(decoded, &mut samples);
    }

    if samples.is_empty() {
        return Err(LoadError::Empty { path: display });
    }

    Ok(DecodedSound {
        sample_rate,
        samples,
    })
}

fn push_mono_samples(decoded: symphonia::core::audio::AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    for frame in sample_buffer.samples().chunks(channel_count) {
        let sum: f32 = frame.iter().copied().sum();
        samples.push(sum / channel_count as f32);
    }
}

/// Linear resampler; good enough for one-shot pad samples, and it keeps
/// every cached asset at the single engine rate the mixer expects.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let mut output = Vec::with_capacity(output_len);

    for index in 0..output_len {
        let position = index as f64 * ratio;
        let left = position.floor() as usize;
        let right = (left + 1).min(samples.len() - 1);
        let fraction = (position - left as f64) as f32;
        let left_sample = samples[left.min(samples.len() - 1)];
        output.push(left_sample + (samples[right] - left_sample) * fraction);
    }

    output
}

fn normalization_gain(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 1.0;
    }

    let mean_square: f32 =
        samples.iter().map(|sample| sample * sample).sum::<f32>() / samples.len() as f32;
    let rms = mean_square.sqrt();
    if rms <= f32::EPSILON {
        return 1.0;
    }

    (REFERENCE_RMS / rms).clamp(MIN_NORMALIZATION_GAIN, MAX_NORMALIZATION_GAIN)
}

fn supported_sound_extensions() -> BTreeSet<&'static str> {
    ["wav", "flac", "mp3", "ogg", "m4a", "aiff", "aif"]
        .into_iter()
        .collect()
}

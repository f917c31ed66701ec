use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{
    assets::SoundAsset,
    model::{DEFAULT_ENGINE_SAMPLE_RATE, SoundCategory},
};

/// Synthesized in-memory asset for tests that never touch the filesystem.
#[must_use]
pub fn tone_asset(path: impl Into<String>, frequency: f32, seconds: f64) -> SoundAsset {
    let sample_rate = DEFAULT_ENGINE_SAMPLE_RATE;
    let frame_count = (seconds * f64::from(sample_rate)).round() as usize;
    let samples = (0..frame_count)
        .map(|frame| {
            let phase = frame as f32 / sample_rate as f32 * frequency * std::f32::consts::TAU;
            phase.sin() * 0.5
        })
        .collect();
    SoundAsset::from_samples(path, samples, sample_rate)
}

/// Writes a small bank of synthesized wav samples, one per pad category,
/// and returns them in preload order.
pub fn write_demo_samples(dir: &Path) -> Result<Vec<(SoundCategory, PathBuf)>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create sample directory: {}", dir.display()))?;

    let bank = [
        (SoundCategory::Kick, "kick0.wav", 60.0, 0.25),
        (SoundCategory::Third, "third0.wav", 220.0, 0.3),
        (SoundCategory::Fourth, "fourth0.wav", 330.0, 0.3),
        (SoundCategory::Melody, "melody0.wav", 440.0, 2.0),
        (SoundCategory::MelodyTop, "melodytop0.wav", 550.0, 2.0),
    ];

    let mut paths = Vec::with_capacity(bank.len());
    for (category, name, frequency, seconds) in bank {
        let path = dir.join(name);
        write_tone_wav(&path, frequency, seconds)?;
        paths.push((category, path));
    }
    Ok(paths)
}

/// The scripted demo beat: a kick on the downbeat and halfway point, with
/// accents on the off-cycle thirds.
#[must_use]
pub fn demo_pattern() -> Vec<(SoundCategory, f64)> {
    vec![
        (SoundCategory::Kick, 0.0),
        (SoundCategory::Kick, 3.0),
        (SoundCategory::Third, 1.5),
        (SoundCategory::Fourth, 4.5),
    ]
}

pub fn write_tone_wav(path: &Path, frequency: f32, seconds: f64) -> Result<()> {
    let sample_rate = DEFAULT_ENGINE_SAMPLE_RATE;
    let frame_count = (seconds * f64::from(sample_rate)).round() as usize;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create fixture wav: {}", path.display()))?;
    for frame in 0..frame_count {
        let phase = frame as f32 / sample_rate as f32 * frequency * std::f32::consts::TAU;
        let sample = (phase.sin() * 0.5 * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(sample)
            .context("failed to write fixture sample")?;
    }
    writer
        .finalize()
        .context("failed to finalize fixture wav")?;
    Ok(())
}

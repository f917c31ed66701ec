use std::path::PathBuf;

use clap::{Parser, Subcommand};
use loopdeck_core::{
    EngineConfig, HttpRelayTransport, LogHost, PadEngine, RelayClient,
    diagnostics::init_tracing,
    fixtures::{demo_pattern, write_demo_samples},
    model::SoundCategory,
    scan_sample_dir,
};

#[derive(Debug, Parser)]
#[command(name = "loopdeck-cli")]
#[command(about = "Headless tools for loopdeck preload/session/relay workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan a sample directory and preload every sound, reporting failures.
    Preload {
        #[arg(long, default_value = "data/samples")]
        dir: PathBuf,
    },
    /// Run a scripted pad session over the fixture bank and render the
    /// recorded mix to a wav file.
    DemoSession {
        #[arg(long, default_value = "data/demo-samples")]
        sample_dir: PathBuf,

        #[arg(long, default_value = "data/exports/demo-session.wav")]
        output: PathBuf,

        /// Simulated session length in seconds.
        #[arg(long, default_value_t = 12.0)]
        seconds: f64,
    },
    /// Upload an audio file through the relay endpoint.
    SendAudio {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        chat_id: String,

        #[arg(long, default_value = "http://localhost:8888/.netlify/functions/send-audio")]
        endpoint: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_dir)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Preload { dir } => {
            let paths: Vec<String> = scan_sample_dir(&dir)
                .into_iter()
                .map(|path| path.display().to_string())
                .collect();
            let mut engine = PadEngine::new(config, Box::new(LogHost));
            let report = engine.preload(&paths);
            println!(
                "loaded {} of {} sounds ({} failed)",
                report.loaded.len(),
                report.total,
                report.failed.len()
            );
            for (path, cause) in &report.failed {
                println!("  failed: {path}: {cause}");
            }
        }
        Commands::DemoSession {
            sample_dir,
            output,
            seconds,
        } => {
            let bank = write_demo_samples(&sample_dir)?;
            let paths: Vec<String> = bank
                .iter()
                .map(|(_, path)| path.display().to_string())
                .collect();

            let cycle_ms = config.cycle_duration_ms;
            let mut engine = PadEngine::new(config, Box::new(LogHost));
            engine.preload(&paths);

            let melody = bank
                .iter()
                .find(|(category, _)| *category == SoundCategory::MelodyTop)
                .map(|(_, path)| path.display().to_string())
                .expect("fixture bank always contains a melody");
            engine.select_melody(&melody, 0.0)?;
            engine.start_recording();
            engine.play(0.0)?;

            // 60 fps simulated clock; taps land when the playhead first
            // passes each scripted offset.
            let pattern = demo_pattern();
            let mut pending: Vec<(SoundCategory, f64)> = pattern;
            let frame_ms = 1_000.0 / 60.0;
            let total_ms = seconds * 1_000.0;
            let mut now_ms = 0.0;
            while now_ms < total_ms {
                let position_ms = now_ms % cycle_ms;
                pending.retain(|(category, offset_seconds)| {
                    let due = (position_ms - offset_seconds * 1_000.0).abs() < frame_ms;
                    if due {
                        let path = bank
                            .iter()
                            .find(|(bank_category, _)| bank_category == category)
                            .map(|(_, path)| path.display().to_string())
                            .expect("pattern categories exist in the bank");
                        if let Err(error) = engine.pad_tapped(&path, *category, now_ms) {
                            eprintln!("pad tap failed: {error}");
                        }
                    }
                    !due
                });
                engine.tick(now_ms);
                now_ms += frame_ms;
            }

            engine.stop();
            let clip = engine.stop_recording()?;
            clip.encode_wav(&output)?;
            println!(
                "rendered {:.1}s session to {}",
                clip.duration_seconds(),
                output.display()
            );
        }
        Commands::SendAudio {
            file,
            chat_id,
            endpoint,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("audio.wav");
            let relay = RelayClient::new(HttpRelayTransport::new(endpoint)?);
            let response = relay.send_audio(&chat_id, &bytes, filename)?;
            println!(
                "relay ok: {} {}",
                response.ok,
                response.description.unwrap_or_default()
            );
        }
    }

    Ok(())
}

use std::sync::Arc;

use loopdeck_core::{
    EngineConfig, SoundAsset, SoundCategory, Transport, TransportError, TransportMode,
    fixtures::tone_asset,
};
use uuid::Uuid;

const CYCLE_MS: f64 = 6_000.0;
const FRAME_MS: f64 = 1_000.0 / 60.0;

fn transport() -> Transport {
    Transport::new(&EngineConfig::default())
}

fn kick() -> Arc<SoundAsset> {
    Arc::new(tone_asset("sounds/kick0.wav", 80.0, 0.25))
}

fn melody() -> Arc<SoundAsset> {
    Arc::new(tone_asset("sounds/melodytop0.wav", 550.0, 2.0))
}

/// Runs the frame loop over `[from, to)` and returns `(fire_times, wraps)`
/// for the given entry.
fn scan(transport: &mut Transport, id: Uuid, from_ms: f64, to_ms: f64) -> (Vec<f64>, usize) {
    let mut fires = Vec::new();
    let mut wraps = 0;
    let mut now = from_ms;
    while now < to_ms {
        let report = transport.tick(now);
        if report.fired.contains(&id) {
            fires.push(now);
        }
        if report.cycle_wrapped {
            wraps += 1;
        }
        now += FRAME_MS;
    }
    (fires, wraps)
}

#[test]
fn play_without_melody_is_rejected_and_rolled_back() {
    let mut transport = transport();
    let error = transport.play(0.0).expect_err("no melody selected");
    assert!(matches!(error, TransportError::NoMelodySelected));
    assert_eq!(transport.state().mode(), TransportMode::Stopped);
}

#[test]
fn downbeat_entry_fires_once_per_cycle_with_one_flag_reset_per_boundary() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");

    // Tap while stopped: the entry anchors to the cycle start.
    let id = transport
        .pad_tapped(&kick(), SoundCategory::Kick, 0.0)
        .expect("tap should succeed");
    assert!(
        (transport.beat_track().entries()[0].offset_seconds).abs() < f64::EPSILON,
        "stopped taps land at offset zero"
    );

    transport.play(0.0).expect("play should start");
    // Stop shy of the fourth window; it opens up to one tolerance early.
    let (fires, wraps) = scan(&mut transport, id, 0.0, 3.0 * CYCLE_MS - 100.0);

    assert_eq!(fires.len(), 3, "one fire per 6000ms cycle");
    assert_eq!(wraps, 2, "flag reset runs exactly once per boundary crossing");
    for (index, fire) in fires.iter().enumerate() {
        let expected = index as f64 * CYCLE_MS;
        assert!(
            (fire - expected).abs() < 50.0 + FRAME_MS,
            "fire {index} at {fire} expected near {expected}"
        );
    }
}

#[test]
fn entry_near_the_boundary_fires_exactly_once_per_cycle() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport.play(0.0).expect("play should start");

    // Tap 20ms before the cycle boundary; with 50ms tolerance the window
    // straddles the wrap point.
    let tap_at = CYCLE_MS - 20.0;
    scan(&mut transport, Uuid::nil(), 0.0, tap_at);
    let id = transport
        .pad_tapped(&kick(), SoundCategory::Kick, tap_at)
        .expect("tap should succeed");

    let (fires, _) = scan(&mut transport, id, tap_at, tap_at + 4.0 * CYCLE_MS - 100.0);
    // The wraparound window opens once per cycle; the tap itself is inside
    // the first window.
    assert_eq!(fires.len(), 4, "exactly one fire per cycle across the wrap");
    for pair in fires.windows(2) {
        assert!(
            (pair[1] - pair[0] - CYCLE_MS).abs() < 2.0 * (50.0 + FRAME_MS),
            "consecutive fires are one cycle apart"
        );
    }
}

#[test]
fn pause_shifts_the_epoch_instead_of_losing_the_offset() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport.play(0.0).expect("play should start");

    // Tap mid-cycle at 2000ms: offset 2.0s.
    let (_, _) = scan(&mut transport, Uuid::nil(), 0.0, 2_000.0);
    let id = transport
        .pad_tapped(&kick(), SoundCategory::Kick, 2_000.0)
        .expect("tap should succeed");

    // Pause at 3000, resume at 5000: two seconds of silence.
    let (_, _) = scan(&mut transport, id, 2_000.0, 3_000.0);
    transport.pause(3_000.0).expect("pause from playing");
    assert_eq!(transport.state().mode(), TransportMode::Paused);
    let report = transport.tick(4_000.0);
    assert!(!report.active, "paused transport does not schedule");

    transport.resume(5_000.0).expect("resume from paused");

    // Without the epoch shift the entry would fire at 8000
    // (naive now - start). With it, the fire lands at
    // offset + pause + cycle = 2000 + 2000 + 6000 = 10000.
    let (fires, _) = scan(&mut transport, id, 5_000.0, 12_000.0);
    assert_eq!(fires.len(), 1);
    assert!(
        (fires[0] - 10_000.0).abs() < 50.0 + FRAME_MS,
        "fire at {} expected near 10000",
        fires[0]
    );
}

#[test]
fn stop_clears_track_melody_and_rejects_replay() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport.play(0.0).expect("play should start");
    transport
        .pad_tapped(&kick(), SoundCategory::Kick, 500.0)
        .expect("tap should succeed");
    transport
        .pad_tapped(&kick(), SoundCategory::Kick, 1_500.0)
        .expect("tap should succeed");
    assert_eq!(transport.beat_track().len(), 2);

    transport.stop();

    assert_eq!(transport.state().mode(), TransportMode::Stopped);
    assert!(transport.beat_track().is_empty());
    assert!(transport.active_melody_path().is_none());
    assert!(matches!(
        transport.play(2_000.0),
        Err(TransportError::NoMelodySelected)
    ));
}

#[test]
fn melody_selection_toggles_and_replaces() {
    let mut transport = transport();
    let first = melody();
    let second = Arc::new(tone_asset("sounds/melodytop1.wav", 660.0, 2.0));

    assert!(transport.select_melody(&first, 0.0).expect("select"));
    assert_eq!(transport.active_melody_path(), Some("sounds/melodytop0.wav"));

    // Selecting another lead replaces the previous one.
    assert!(transport.select_melody(&second, 10.0).expect("replace"));
    assert_eq!(transport.active_melody_path(), Some("sounds/melodytop1.wav"));

    // Selecting the active lead again deselects it.
    assert!(!transport.select_melody(&second, 20.0).expect("toggle off"));
    assert!(transport.active_melody_path().is_none());
}

#[test]
fn marker_removal_silences_future_cycles() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport.play(0.0).expect("play should start");

    let id = transport
        .pad_tapped(&kick(), SoundCategory::Kick, 1_000.0)
        .expect("tap should succeed");
    let (fires, _) = scan(&mut transport, id, 1_000.0, CYCLE_MS);
    assert_eq!(fires.len(), 1);

    assert!(transport.remove_entry(id));
    assert!(!transport.remove_entry(id), "second removal is a no-op");
    let (fires, _) = scan(&mut transport, id, CYCLE_MS, 3.0 * CYCLE_MS);
    assert!(fires.is_empty(), "removed markers never fire again");
}

#[test]
fn paused_taps_anchor_to_cycle_start() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport.play(0.0).expect("play should start");
    transport.pause(2_500.0).expect("pause from playing");

    transport
        .pad_tapped(&kick(), SoundCategory::Kick, 3_000.0)
        .expect("taps are allowed while paused");
    let entry = &transport.beat_track().entries()[0];
    assert!(entry.offset_seconds.abs() < f64::EPSILON);
}

/// A percussive sample of pure silence, so rendered peaks measure the
/// melody alone.
fn silent_kick() -> Arc<SoundAsset> {
    Arc::new(SoundAsset::from_samples(
        "sounds/kick0.wav",
        vec![0.0; 480],
        48_000,
    ))
}

fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0_f32, |acc, sample| acc.max(sample.abs()))
}

#[test]
fn percussive_fire_ducks_the_melody_then_recovers() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport
        .pad_tapped(&silent_kick(), SoundCategory::Kick, 0.0)
        .expect("tap should succeed");
    transport.play(0.0).expect("play should start");

    let mut buf = vec![0.0_f32; 480];

    let report = transport.tick(0.0);
    assert_eq!(report.fired.len(), 1, "the kick entry fires on the downbeat");
    transport.render_mix(&mut buf);
    let ducked = peak(&buf);

    // Halfway through the 150ms recovery ramp.
    transport.tick(75.0);
    transport.render_mix(&mut buf);
    let halfway = peak(&buf);

    // Well past the ramp the melody is back at unity gain.
    transport.tick(300.0);
    transport.render_mix(&mut buf);
    let recovered = peak(&buf);

    let floor_ratio = ducked / recovered;
    assert!(
        (floor_ratio - 0.4).abs() < 0.02,
        "melody dips to the duck floor, got ratio {floor_ratio}"
    );
    assert!(
        ducked < halfway && halfway < recovered,
        "recovery is monotonic: {ducked} -> {halfway} -> {recovered}"
    );
    let halfway_ratio = halfway / recovered;
    assert!(
        (halfway_ratio - 0.7).abs() < 0.03,
        "recovery ramps linearly, got {halfway_ratio} at the midpoint"
    );
}

#[test]
fn ducking_can_be_disabled_in_config() {
    let mut transport = Transport::new(&EngineConfig {
        ducking: false,
        ..EngineConfig::default()
    });
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");
    transport
        .pad_tapped(&silent_kick(), SoundCategory::Kick, 0.0)
        .expect("tap should succeed");
    transport.play(0.0).expect("play should start");

    let mut buf = vec![0.0_f32; 480];
    transport.tick(0.0);
    transport.render_mix(&mut buf);
    let after_fire = peak(&buf);

    transport.tick(300.0);
    transport.render_mix(&mut buf);
    let later = peak(&buf);

    assert!(
        (after_fire / later - 1.0).abs() < 0.02,
        "melody gain stays flat when ducking is off"
    );
}

#[test]
fn simultaneous_fires_share_headroom() {
    let mut transport = transport();
    transport
        .select_melody(&melody(), 0.0)
        .expect("melody selects");

    // Four entries stacked on the downbeat.
    let ids: Vec<Uuid> = (0..4)
        .map(|_| {
            transport
                .pad_tapped(&kick(), SoundCategory::Kick, 0.0)
                .expect("tap should succeed")
        })
        .collect();
    transport.play(0.0).expect("play should start");

    let report = transport.tick(0.0);
    assert!(report.active);
    for id in &ids {
        assert!(report.fired.contains(id), "all colliding entries fire");
    }
}

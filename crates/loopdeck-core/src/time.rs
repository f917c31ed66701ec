//! Cycle-clock arithmetic for the looping beat track.
//!
//! All transport math runs on caller-supplied millisecond timestamps, so the
//! scheduler stays deterministic under test.

/// Position within the repeating cycle, in milliseconds.
#[must_use]
pub fn cycle_position_ms(elapsed_ms: f64, cycle_duration_ms: f64) -> f64 {
    if cycle_duration_ms <= 0.0 {
        return 0.0;
    }

    elapsed_ms.rem_euclid(cycle_duration_ms)
}

/// Zero-based index of the cycle the elapsed time falls into.
#[must_use]
pub fn cycle_index(elapsed_ms: f64, cycle_duration_ms: f64) -> u64 {
    if cycle_duration_ms <= 0.0 || elapsed_ms <= 0.0 {
        return 0;
    }

    (elapsed_ms / cycle_duration_ms).floor() as u64
}

/// Distance between two cycle positions, measured around the loop.
///
/// An entry anchored 20 ms before the cycle boundary is 20 ms away from a
/// playhead sitting at position 0, not `cycle - 20` ms. Plain subtraction
/// would fire such entries zero or two times per cycle.
#[must_use]
pub fn wrap_distance_ms(a_ms: f64, b_ms: f64, cycle_duration_ms: f64) -> f64 {
    if cycle_duration_ms <= 0.0 {
        return (a_ms - b_ms).abs();
    }

    let direct = (a_ms - b_ms).abs();
    direct.min(cycle_duration_ms - direct)
}

/// Cycle-relative offset in seconds for a pad tapped at `now_ms`.
///
/// While the transport is running the tap lands at the current playhead
/// position; while stopped or paused it anchors to the start of the cycle.
#[must_use]
pub fn tap_offset_seconds(now_ms: f64, play_start_ms: Option<f64>, cycle_duration_ms: f64) -> f64 {
    match play_start_ms {
        Some(start) => cycle_position_ms(now_ms - start, cycle_duration_ms) / 1_000.0,
        None => 0.0,
    }
}

/// Frame count covering `ms` milliseconds at the given sample rate.
#[must_use]
pub fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    if ms <= 0.0 {
        return 0;
    }

    (ms / 1_000.0 * f64::from(sample_rate)).round() as usize
}

/// Duration in seconds of `frames` frames at the given sample rate.
#[must_use]
pub fn frames_to_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 / f64::from(sample_rate)
}

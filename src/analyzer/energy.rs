use super::features::{LoudnessProfile, TimeWindow};
use super::signal::{find_peaks, mean, smooth};
use super::spectrum::{centred_frame, frame_count};

/// RMS frame length in samples.
pub const FRAME_LENGTH: usize = 2048;

/// Smoothing divisor for the energy curve: window = frames / 20.
const CURVE_SMOOTH_DIVISOR: usize = 20;

/// Longest intro/outro window in seconds.
const EDGE_WINDOW_SECS: f64 = 30.0;

/// Drop detection
const DROP_MIN_HEIGHT: f64 = 0.6;
const DROP_HALF_WIDTH_FRAMES: isize = 8;
const MAX_DROPS: usize = 10;

/// Loudness thresholds on mean frame RMS
const QUIET_RMS: f64 = 0.02;
const LOUD_RMS: f64 = 0.15;

/// Frame-wise RMS over centred frames of `FRAME_LENGTH` samples.
pub fn frame_rms(samples: &[f32], hop: usize) -> Vec<f64> {
    (0..frame_count(samples.len(), hop))
        .map(|t| {
            let power: f64 = centred_frame(samples, t, hop, FRAME_LENGTH).map(|x| x * x).sum();
            (power / FRAME_LENGTH as f64).sqrt()
        })
        .collect()
}

/// Smoothed, min-max normalized energy curve and the overall energy score.
/// A flat signal gives a constant 0.5 curve and a 0.5 score.
pub fn energy_curve(rms: &[f64]) -> (Vec<f64>, f64) {
    if rms.is_empty() {
        return (vec![0.5], 0.5);
    }
    let smoothed = smooth(rms, (rms.len() / CURVE_SMOOTH_DIVISOR).max(1));
    let min = smoothed.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = smoothed.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range < 1e-8 {
        return (vec![0.5; smoothed.len()], 0.5);
    }

    let curve = smoothed.iter().map(|v| (v - min) / range).collect();
    let score = (mean(&smoothed) - min) / (range + 1e-8);
    (curve, score.clamp(0.0, 1.0))
}

/// Mean energy of the first, middle and last third. The last third absorbs
/// the remainder; curves shorter than three samples repeat the overall mean.
pub fn energy_segments(curve: &[f64]) -> (f64, f64, f64) {
    let n = curve.len();
    if n < 3 {
        let m = mean(curve);
        return (m, m, m);
    }
    let third = n / 3;
    (
        mean(&curve[..third]),
        mean(&curve[third..2 * third]),
        mean(&curve[2 * third..]),
    )
}

/// Intro and outro windows. Both are fixed-length heuristics; the energy of
/// the opening frames is measured but does not move either window.
pub fn intro_outro_windows(duration: f64, curve: &[f64], frame_secs: f64) -> (TimeWindow, TimeWindow) {
    let n = curve.len();
    if n < 4 {
        return (
            TimeWindow::new(0.0, (duration * 0.2).min(15.0)),
            TimeWindow::new((duration - 15.0).max(0.0), duration),
        );
    }

    let intro_frames = ((EDGE_WINDOW_SECS / frame_secs) as usize).min(n / 3);
    let intro_energy = if intro_frames > 0 { mean(&curve[..intro_frames]) } else { 0.5 };
    log::trace!("intro energy {:.4} over {} frames", intro_energy, intro_frames);

    let intro_end = EDGE_WINDOW_SECS.min(duration * 0.25);
    let outro_start = (duration - EDGE_WINDOW_SECS).max(0.0);
    (
        TimeWindow::new(0.0, intro_end),
        TimeWindow::new(outro_start, duration),
    )
}

/// Drop-like regions around local peaks of the smoothed energy curve, in
/// frame order, at most `MAX_DROPS`.
pub fn drop_regions(curve: &[f64], duration: f64, frame_secs: f64) -> Vec<TimeWindow> {
    let n = curve.len();
    if n < 10 {
        return Vec::new();
    }
    let smoothed = smooth(curve, (n / 30).max(3));
    find_peaks(&smoothed, DROP_MIN_HEIGHT, (n / 15).max(5))
        .into_iter()
        .take(MAX_DROPS)
        .map(|p| {
            let p = p as isize;
            let start = ((p - DROP_HALF_WIDTH_FRAMES) as f64 * frame_secs).max(0.0);
            let end = ((p + DROP_HALF_WIDTH_FRAMES) as f64 * frame_secs).min(duration);
            TimeWindow::new(start, end)
        })
        .collect()
}

pub fn classify_loudness(rms: &[f64]) -> LoudnessProfile {
    let m = mean(rms);
    if m < QUIET_RMS {
        LoudnessProfile::Quiet
    } else if m > LOUD_RMS {
        LoudnessProfile::Loud
    } else {
        LoudnessProfile::Normal
    }
}

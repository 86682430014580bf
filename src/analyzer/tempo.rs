//! Tempo and beat grid via stratum-dsp.

use super::signal::round_to;
use stratum_dsp::{analyze_audio, AnalysisConfig};

/// Tempo reported when no periodicity is found.
pub const FALLBACK_BPM: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BeatGrid {
    pub bpm: f64,
    /// Beat positions in seconds from the start of the waveform, ascending.
    pub beat_times_sec: Vec<f64>,
}

impl BeatGrid {
    fn fallback() -> Self {
        Self {
            bpm: FALLBACK_BPM,
            beat_times_sec: Vec::new(),
        }
    }
}

/// Tempo and beat grid of a mono waveform.
///
/// Silence trimming stays off so beat times keep the waveform's own time
/// origin. BPM is rounded to 2 decimals, beats to 2 decimals and limited to
/// `[0, duration)`. A failed or empty estimate gives 120 BPM with no beats.
pub fn beat_grid(samples: &[f32], sample_rate: u32, duration: f64) -> BeatGrid {
    if samples.iter().all(|&s| s == 0.0) {
        return BeatGrid::fallback();
    }
    let config = AnalysisConfig {
        enable_silence_trimming: false,
        ..AnalysisConfig::default()
    };

    let result = match analyze_audio(samples, sample_rate, config) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("Beat tracking unavailable ({}), using {} BPM", e, FALLBACK_BPM);
            return BeatGrid::fallback();
        }
    };

    let bpm = result.bpm as f64;
    if !(bpm.is_finite() && bpm > 0.0) {
        return BeatGrid::fallback();
    }

    let mut beat_times_sec: Vec<f64> = result
        .beat_grid
        .beats
        .iter()
        .map(|&b| b as f64)
        .filter(|b| b.is_finite() && *b >= 0.0)
        .map(|b| round_to(b, 2))
        .filter(|&b| b < duration)
        .collect();
    beat_times_sec.sort_by(|a, b| a.total_cmp(b));
    beat_times_sec.dedup();

    log::debug!(
        "tempo {:.2} BPM (confidence {:.2}), {} beats",
        bpm,
        result.bpm_confidence,
        beat_times_sec.len()
    );
    BeatGrid {
        bpm: round_to(bpm, 2),
        beat_times_sec,
    }
}

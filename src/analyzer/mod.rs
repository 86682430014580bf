pub mod decode;
pub mod energy;
pub mod features;
pub mod harmony;
pub mod signal;
pub mod spectrum;
pub mod tempo;

use crate::db::models::Track;
use crate::db::Database;
use decode::DecodeError;
use features::TrackFeatures;
use indicatif::{ProgressBar, ProgressStyle};
use signal::round_to;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Analysis sample rate in Hz. Waveforms at other rates are resampled first.
pub const SAMPLE_RATE: u32 = 22050;

/// Hop between RMS frames in samples.
pub const HOP_LENGTH: usize = 512;

/// Shortest waveform the extractor accepts, in seconds.
const MIN_DURATION_SECS: f64 = 0.1;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
    #[error("Decode failed for {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
}

pub struct AnalyzeResult {
    pub analyzed: u64,
    pub failed: u64,
}

/// Compute the feature record of a mono waveform.
///
/// Every output is a deterministic function of the samples: seconds are
/// rounded to 2 decimals, curves and scores to 4.
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<TrackFeatures, AnalyzeError> {
    if sample_rate == 0 {
        return Err(AnalyzeError::AnalysisFailed("sample rate is zero".to_string()));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(AnalyzeError::AnalysisFailed(
            "waveform contains non-finite samples".to_string(),
        ));
    }
    let samples: Cow<[f32]> = if sample_rate == SAMPLE_RATE {
        Cow::Borrowed(samples)
    } else {
        Cow::Owned(decode::resample(samples, sample_rate, SAMPLE_RATE))
    };

    let duration = round_to(samples.len() as f64 / SAMPLE_RATE as f64, 2);
    if duration < MIN_DURATION_SECS {
        return Err(AnalyzeError::AnalysisFailed(format!(
            "waveform too short ({:.2}s)",
            duration
        )));
    }
    let frame_secs = HOP_LENGTH as f64 / SAMPLE_RATE as f64;

    // Tempo and beat grid
    let tempo::BeatGrid { bpm, beat_times_sec } = tempo::beat_grid(&samples, SAMPLE_RATE, duration);
    let first_beat_sec = beat_times_sec.first().copied().unwrap_or(0.0);

    // Key and chords
    let chroma = harmony::chromagram(&samples, SAMPLE_RATE);
    let key = harmony::estimate_key(&chroma).key_label();
    let camelot_code = harmony::camelot_code(&key).to_string();
    let chord_segments = harmony::chord_segments(&chroma, SAMPLE_RATE, duration);

    // Energy
    let rms = energy::frame_rms(&samples, HOP_LENGTH);
    let (curve, score) = energy::energy_curve(&rms);
    let curve: Vec<f64> = curve.iter().map(|&v| round_to(v, 4)).collect();
    let (start, mid, end) = energy::energy_segments(&curve);
    let (intro, outro) = energy::intro_outro_windows(duration, &curve, frame_secs);
    let drops = energy::drop_regions(&curve, duration, frame_secs);
    let loudness_profile = energy::classify_loudness(&rms);

    let round_window = |w: features::TimeWindow| {
        features::TimeWindow::new(round_to(w.start, 2), round_to(w.end, 2))
    };

    log::debug!(
        "Extracted: {:.2}s, {} BPM, {} ({}), energy {:.3}, {} drops, {} chord segments",
        duration,
        bpm,
        key,
        camelot_code,
        score,
        drops.len(),
        chord_segments.len()
    );

    Ok(TrackFeatures {
        bpm,
        key,
        camelot_code,
        energy_score: round_to(score, 4),
        energy_curve: curve,
        energy_segments: (round_to(start, 4), round_to(mid, 4), round_to(end, 4)),
        intro_window: round_window(intro),
        outro_window: round_window(outro),
        first_beat_sec,
        beat_times_sec,
        drop_regions: drops.into_iter().map(round_window).collect(),
        chord_segments,
        duration_sec: duration,
        loudness_profile,
        vocal_phrase_starts: Vec::new(),
        vocal_phrase_ends: Vec::new(),
        vocal_segments: Vec::new(),
    })
}

/// Decode a file and extract its feature record. Errors name the file.
pub fn analyze_file(path: &Path, ffmpeg: &str) -> Result<TrackFeatures, AnalyzeError> {
    log::debug!(
        "Analyzing: {}",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("?")
    );

    let audio = decode::load_audio(path, ffmpeg).map_err(|e| match e {
        DecodeError::NotFound(p) => AnalyzeError::NotFound(p),
        other => AnalyzeError::Decode {
            path: path.to_path_buf(),
            source: other,
        },
    })?;
    log::debug!(
        "Decoded {}: {:.1}s at {} Hz",
        path.display(),
        audio.duration_secs(),
        audio.sample_rate
    );

    extract(&audio.samples, audio.sample_rate).map_err(|e| match e {
        AnalyzeError::AnalysisFailed(msg) => {
            AnalyzeError::AnalysisFailed(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Analyze library tracks in parallel and store their feature records.
///
/// Tracks are processed in chunks of `jobs * 2`: each chunk is analyzed on the
/// rayon pool and written before the next starts, so progress survives an
/// interrupted run. A failing track is logged with its path and counted; it
/// never affects the others.
pub fn analyze_tracks(
    db: &Database,
    force: bool,
    jobs: usize,
    filter: Option<&str>,
    ffmpeg: &str,
) -> std::result::Result<AnalyzeResult, AnalyzeError> {
    let tracks = if force {
        db.get_all_tracks()?
    } else {
        db.get_unanalyzed_tracks()?
    };

    let tracks: Vec<Track> = match filter {
        Some(pattern) => {
            let pattern_lower = pattern.to_lowercase();
            tracks
                .into_iter()
                .filter(|t| t.file_path.to_lowercase().contains(&pattern_lower))
                .collect()
        }
        None => tracks,
    };

    if tracks.is_empty() {
        log::info!("No tracks to analyze");
        return Ok(AnalyzeResult { analyzed: 0, failed: 0 });
    }

    let jobs = jobs.max(1);
    log::info!("Analyzing {} tracks with {} workers", tracks.len(), jobs);

    let pb = ProgressBar::new(tracks.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| AnalyzeError::AnalysisFailed(format!("thread pool: {e}")))?;

    let mut analyzed: u64 = 0;
    let mut failed: u64 = 0;

    for chunk in tracks.chunks(jobs * 2) {
        let results: Vec<_> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|track| {
                    pb.set_message(track.display_name());
                    let result = analyze_file(Path::new(&track.file_path), ffmpeg);
                    pb.inc(1);
                    (track, result)
                })
                .collect()
        });

        for (track, result) in results {
            match result {
                Ok(features) => match db.store_features(track.id, &features) {
                    Ok(()) => analyzed += 1,
                    Err(e) => {
                        log::error!("DB error storing features for {}: {}", track.file_path, e);
                        failed += 1;
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                    failed += 1;
                }
            }
        }

        pb.set_message(format!("{} stored, {} failed", analyzed, failed));
    }

    pb.finish_with_message(format!("Done: {} analyzed, {} failed", analyzed, failed));

    Ok(AnalyzeResult { analyzed, failed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(secs: f64) -> Vec<f32> {
        // Kick-like bursts at 120 BPM over an A minor drone, louder in the middle
        let n = (secs * SAMPLE_RATE as f64) as usize;
        let beat = SAMPLE_RATE as usize / 2;
        (0..n)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                let swell = 0.3 + 0.7 * (std::f64::consts::PI * t / secs).sin();
                let drone = [220.0, 261.63, 329.63]
                    .iter()
                    .map(|f| (2.0 * std::f64::consts::PI * f * t).sin())
                    .sum::<f64>()
                    / 3.0;
                let k = i % beat;
                let kick = (-(k as f64) / 300.0).exp() * (2.0 * std::f64::consts::PI * 60.0 * k as f64 / SAMPLE_RATE as f64).sin();
                (swell * (0.15 * drone + 0.5 * kick)) as f32
            })
            .collect()
    }

    #[test]
    fn test_extract_invariants() {
        let samples = test_signal(40.0);
        let f = extract(&samples, SAMPLE_RATE).unwrap();

        assert!(f.bpm > 0.0);
        assert!((0.0..=1.0).contains(&f.energy_score));
        assert_eq!(f.duration_sec, 40.0);
        assert_eq!(f.outro_window.end, f.duration_sec);
        assert_eq!(f.outro_window.start, 10.0);
        assert_eq!(f.intro_window, features::TimeWindow::new(0.0, 10.0));
        assert!(!f.energy_curve.is_empty());
        assert!(f.energy_curve.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(f.beat_times_sec.windows(2).all(|w| w[0] <= w[1]));
        assert!(f.beat_times_sec.iter().all(|&b| b < f.duration_sec));
        assert_eq!(f.first_beat_sec, f.beat_times_sec.first().copied().unwrap_or(0.0));
        assert!(f.drop_regions.len() <= 10);
        for d in &f.drop_regions {
            assert!(0.0 <= d.start && d.start < d.end && d.end <= f.duration_sec);
        }
        assert_eq!(f.camelot_code, harmony::camelot_code(&f.key));
        assert_eq!(f.chord_segments.first().map(|c| c.start), Some(0.0));
        assert_eq!(f.chord_segments.last().map(|c| c.end), Some(f.duration_sec));
    }

    #[test]
    fn test_energy_segments_match_emitted_curve() {
        let f = extract(&test_signal(17.0), SAMPLE_RATE).unwrap();
        let third = f.energy_curve.len() / 3;
        let mean_of = |s: &[f64]| round_to(s.iter().sum::<f64>() / s.len() as f64, 4);
        assert_eq!(
            f.energy_segments,
            (
                mean_of(&f.energy_curve[..third]),
                mean_of(&f.energy_curve[third..2 * third]),
                mean_of(&f.energy_curve[2 * third..]),
            )
        );
    }

    #[test]
    fn test_extract_is_deterministic() {
        let samples = test_signal(12.0);
        let a = extract(&samples, SAMPLE_RATE).unwrap();
        let b = extract(&samples, SAMPLE_RATE).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_extract_silence() {
        let f = extract(&vec![0.0; SAMPLE_RATE as usize * 5], SAMPLE_RATE).unwrap();
        assert_eq!(f.bpm, tempo::FALLBACK_BPM);
        assert_eq!(f.energy_score, 0.5);
        assert!(f.energy_curve.iter().all(|&v| v == 0.5));
        assert_eq!(f.key, "C major");
        assert_eq!(f.loudness_profile, features::LoudnessProfile::Quiet);
        assert!(f.beat_times_sec.is_empty());
        assert_eq!(f.first_beat_sec, 0.0);
    }

    #[test]
    fn test_extract_rejects_bad_input() {
        assert!(matches!(
            extract(&[], SAMPLE_RATE),
            Err(AnalyzeError::AnalysisFailed(_))
        ));
        assert!(matches!(
            extract(&[0.0, f32::NAN, 0.0], SAMPLE_RATE),
            Err(AnalyzeError::AnalysisFailed(_))
        ));
    }

    #[test]
    fn test_extract_resamples_other_rates() {
        let samples = vec![0.0f32; 44100 * 2];
        let f = extract(&samples, 44100).unwrap();
        assert_eq!(f.duration_sec, 2.0);
    }

    #[test]
    fn test_analyze_file_missing() {
        let err = analyze_file(Path::new("/no/such/file.wav"), "ffmpeg").unwrap_err();
        assert!(matches!(err, AnalyzeError::NotFound(_)));
    }

    #[test]
    fn test_analyze_tracks_counts_failures() {
        let db = Database::open_in_memory().unwrap();
        for (path, format) in [("/no/such/a.wav", "wav"), ("/no/such/b.mp3", "mp3")] {
            db.upsert_track(&crate::db::models::NewTrack {
                file_path: path.to_string(),
                file_size: 0,
                file_modified: "0".to_string(),
                format: format.to_string(),
                title: None,
                artist: None,
                duration_secs: None,
            })
            .unwrap();
        }
        let result = analyze_tracks(&db, false, 2, None, "ffmpeg").unwrap();
        assert_eq!(result.analyzed, 0);
        assert_eq!(result.failed, 2);
    }
}

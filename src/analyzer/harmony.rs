//! Pitch-class analysis: chroma, key estimation, Camelot codes and chord windows.

use super::features::ChordSegment;
use super::signal::{l2_normalize, mean, pearson, rotate, round_to};
use super::spectrum::{for_each_magnitude_frame, frame_count};

pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Krumhansl-Schmuckler style key profiles, tonic at index 0.
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Chroma STFT parameters
pub const CHROMA_FFT: usize = 4096;
pub const CHROMA_HOP: usize = 2048;
const CHROMA_MIN_HZ: f64 = 65.0;
const CHROMA_MAX_HZ: f64 = 2100.0;

/// Target chord window length in seconds.
const CHORD_WINDOW_SECS: f64 = 2.0;

/// Fallback code for keys outside the table.
pub const DEFAULT_CAMELOT: &str = "8A";

/// Camelot wheel, indexed by pitch class. Minor keys are `A`, major keys `B`.
const CAMELOT_MINOR: [&str; 12] = ["5A", "12A", "7A", "2A", "9A", "4A", "11A", "6A", "1A", "8A", "3A", "10A"];
const CAMELOT_MAJOR: [&str; 12] = ["8B", "3B", "10B", "5B", "12B", "7B", "2B", "9B", "4B", "11B", "6B", "1B"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub root: usize,
    pub minor: bool,
    pub correlation: f64,
}

impl KeyEstimate {
    /// `"A minor"`, `"C# major"`.
    pub fn key_label(&self) -> String {
        format!("{} {}", PITCH_CLASSES[self.root], if self.minor { "minor" } else { "major" })
    }

    /// `"Am"`, `"C#"`.
    pub fn chord_label(&self) -> String {
        format!("{}{}", PITCH_CLASSES[self.root], if self.minor { "m" } else { "" })
    }
}

/// Per-frame 12-bin chroma (spectral power folded onto pitch classes).
pub fn chromagram(samples: &[f32], sample_rate: u32) -> Vec<[f64; 12]> {
    let bin_hz = sample_rate as f64 / CHROMA_FFT as f64;

    // Precompute the pitch class of each usable bin
    let bin_classes: Vec<Option<usize>> = (0..CHROMA_FFT / 2 + 1)
        .map(|bin| {
            let hz = bin as f64 * bin_hz;
            (CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&hz).then(|| pitch_class(hz))
        })
        .collect();

    let mut frames = Vec::with_capacity(frame_count(samples.len(), CHROMA_HOP));
    for_each_magnitude_frame(samples, CHROMA_FFT, CHROMA_HOP, |_, magnitudes| {
        let mut chroma = [0.0; 12];
        for (mag, class) in magnitudes.iter().zip(&bin_classes) {
            if let Some(pc) = class {
                chroma[*pc] += mag * mag;
            }
        }
        frames.push(chroma);
    });
    frames
}

fn pitch_class(hz: f64) -> usize {
    let midi = 69.0 + 12.0 * (hz / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

fn average_chroma(frames: &[[f64; 12]]) -> [f64; 12] {
    let mut avg = [0.0; 12];
    for (pc, slot) in avg.iter_mut().enumerate() {
        let column: Vec<f64> = frames.iter().map(|f| f[pc]).collect();
        *slot = mean(&column);
    }
    avg
}

/// Correlate a chroma profile against all 24 rotated templates. Rotations are
/// visited in pitch-class order, major before minor at each rotation, and a
/// later candidate only wins with a strictly higher correlation. A profile with
/// no variance falls back to C major.
pub fn best_key(chroma: &[f64; 12]) -> KeyEstimate {
    let profile = l2_normalize(chroma);
    let mut best = KeyEstimate { root: 0, minor: false, correlation: -2.0 };

    for root in 0..12 {
        for (minor, template) in [(false, &MAJOR_PROFILE), (true, &MINOR_PROFILE)] {
            let rotated = l2_normalize(&rotate(template, root));
            if let Some(c) = pearson(&profile, &rotated) {
                if c > best.correlation {
                    best = KeyEstimate { root, minor, correlation: c };
                }
            }
        }
    }
    best
}

/// Whole-track key from the averaged chroma.
pub fn estimate_key(chroma_frames: &[[f64; 12]]) -> KeyEstimate {
    best_key(&average_chroma(chroma_frames))
}

/// Camelot code for a `"{pitch class} {major|minor}"` key label.
pub fn camelot_code(key: &str) -> &'static str {
    let mut parts = key.split_whitespace();
    let (Some(root), Some(mode), None) = (parts.next(), parts.next(), parts.next()) else {
        return DEFAULT_CAMELOT;
    };
    let Some(pc) = PITCH_CLASSES.iter().position(|&p| p == root) else {
        return DEFAULT_CAMELOT;
    };
    match mode {
        "major" => CAMELOT_MAJOR[pc],
        "minor" => CAMELOT_MINOR[pc],
        _ => DEFAULT_CAMELOT,
    }
}

fn parse_camelot(code: &str) -> Option<(u8, char)> {
    let letter = code.chars().last()?;
    if letter != 'A' && letter != 'B' {
        return None;
    }
    let number: u8 = code[..code.len() - 1].parse().ok()?;
    (1..=12).contains(&number).then_some((number, letter))
}

/// Harmonic-mixing compatibility: same code, a neighbouring number with the
/// same letter (12 wraps to 1), or the other letter at the same number.
pub fn camelot_compatible(a: &str, b: &str) -> bool {
    let (Some((na, la)), Some((nb, lb))) = (parse_camelot(a), parse_camelot(b)) else {
        return false;
    };
    if la == lb {
        let diff = (na as i32 - nb as i32).rem_euclid(12);
        diff == 0 || diff == 1 || diff == 11
    } else {
        na == nb
    }
}

/// Label consecutive ~2 s chroma windows with the best-matching chord and merge
/// runs of equal labels. Boundaries sit on window edges; the final segment
/// ends at `duration`.
pub fn chord_segments(chroma_frames: &[[f64; 12]], sample_rate: u32, duration: f64) -> Vec<ChordSegment> {
    let frames_per_window =
        ((CHORD_WINDOW_SECS * sample_rate as f64 / CHROMA_HOP as f64).round() as usize).max(1);
    let window_secs = frames_per_window as f64 * CHROMA_HOP as f64 / sample_rate as f64;

    let mut segments: Vec<ChordSegment> = Vec::new();
    for (i, window) in chroma_frames.chunks(frames_per_window).enumerate() {
        let start = i as f64 * window_secs;
        if start >= duration {
            break;
        }
        let end = ((i + 1) as f64 * window_secs).min(duration);
        let chord = best_key(&average_chroma(window)).chord_label();

        match segments.last_mut() {
            Some(last) if last.chord == chord => last.end = end,
            _ => segments.push(ChordSegment { start, end, chord }),
        }
    }

    for s in &mut segments {
        s.start = round_to(s.start, 2);
        s.end = round_to(s.end, 2);
    }
    segments
}

use serde::{Deserialize, Serialize};

/// A `(start_sec, end_sec)` span. Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: f64) -> bool {
        t.is_finite() && self.start <= t && t <= self.end
    }
}

impl From<(f64, f64)> for TimeWindow {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<TimeWindow> for (f64, f64) {
    fn from(w: TimeWindow) -> Self {
        (w.start, w.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoudnessProfile {
    Quiet,
    Normal,
    Loud,
}

impl LoudnessProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Normal => "normal",
            Self::Loud => "loud",
        }
    }
}

/// A contiguous span labelled with a chord root, `m` suffix for minor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    pub start: f64,
    pub end: f64,
    pub chord: String,
}

/// One transcribed vocal span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Per-track analysis summary. Produced once by the extractor and treated as
/// read-only afterwards; collaborator data is layered on with [`Enrichment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFeatures {
    pub bpm: f64,
    pub key: String,
    pub camelot_code: String,
    pub energy_score: f64,
    pub energy_curve: Vec<f64>,
    pub energy_segments: (f64, f64, f64),
    pub intro_window: TimeWindow,
    pub outro_window: TimeWindow,
    pub first_beat_sec: f64,
    #[serde(default)]
    pub beat_times_sec: Vec<f64>,
    #[serde(default)]
    pub drop_regions: Vec<TimeWindow>,
    #[serde(default)]
    pub chord_segments: Vec<ChordSegment>,
    pub duration_sec: f64,
    pub loudness_profile: LoudnessProfile,
    #[serde(default)]
    pub vocal_phrase_starts: Vec<f64>,
    #[serde(default)]
    pub vocal_phrase_ends: Vec<f64>,
    #[serde(default)]
    pub vocal_segments: Vec<VocalSegment>,
}

impl TrackFeatures {
    /// Produce a new record with the populated parts of `enrichment` applied.
    /// Fields the enrichment leaves empty keep their current values.
    pub fn enriched(&self, enrichment: &Enrichment) -> TrackFeatures {
        let mut next = self.clone();
        if let Some(beats) = &enrichment.beat_times_sec {
            next.beat_times_sec = beats.clone();
            if let Some(&first) = beats.first() {
                next.first_beat_sec = first;
            }
        }
        if let Some(chords) = &enrichment.chord_segments {
            next.chord_segments = chords.clone();
        }
        if let Some(segments) = &enrichment.vocal_segments {
            next.vocal_segments = segments.clone();
            let (starts, ends) = phrase_boundaries(segments);
            next.vocal_phrase_starts = starts;
            next.vocal_phrase_ends = ends;
        }
        next
    }
}

/// Collaborator-supplied data to overlay on a [`TrackFeatures`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub beat_times_sec: Option<Vec<f64>>,
    pub chord_segments: Option<Vec<ChordSegment>>,
    pub vocal_segments: Option<Vec<VocalSegment>>,
}

impl Enrichment {
    pub fn with_beats(mut self, beats: Vec<f64>) -> Self {
        if !beats.is_empty() {
            self.beat_times_sec = Some(beats);
        }
        self
    }

    pub fn with_chords(mut self, chords: Vec<ChordSegment>) -> Self {
        if !chords.is_empty() {
            self.chord_segments = Some(chords);
        }
        self
    }

    pub fn with_vocals(mut self, segments: Vec<VocalSegment>) -> Self {
        if !segments.is_empty() {
            self.vocal_segments = Some(segments);
        }
        self
    }

    /// Merge another enrichment on top; its populated fields win.
    pub fn merge(mut self, other: Enrichment) -> Self {
        if other.beat_times_sec.is_some() {
            self.beat_times_sec = other.beat_times_sec;
        }
        if other.chord_segments.is_some() {
            self.chord_segments = other.chord_segments;
        }
        if other.vocal_segments.is_some() {
            self.vocal_segments = other.vocal_segments;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.beat_times_sec.is_none() && self.chord_segments.is_none() && self.vocal_segments.is_none()
    }
}

/// Sorted, de-duplicated phrase starts and ends of a transcript.
pub fn phrase_boundaries(segments: &[VocalSegment]) -> (Vec<f64>, Vec<f64>) {
    let collect = |f: fn(&VocalSegment) -> f64| {
        let mut v: Vec<f64> = segments.iter().map(f).filter(|t| t.is_finite()).collect();
        v.sort_by(|a, b| a.total_cmp(b));
        v.dedup();
        v
    };
    (collect(|s| s.start), collect(|s| s.end))
}

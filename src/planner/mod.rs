//! Transition scheduling between consecutive tracks of a set.
//!
//! Every pair starts from the outgoing track's outro window and is then
//! tightened toward musical boundaries: vocal phrases, a shared word across
//! the two transcripts, beats and chord changes. Each adjustment is a local
//! nearest-neighbour search within a fixed radius, and the crossfade is always
//! kept within `[MIN_CROSSFADE_SECS, MAX_CROSSFADE_SECS]`.

pub mod lexical;
pub mod snap;

use crate::analyzer::features::TrackFeatures;
use serde::{Deserialize, Serialize};
use snap::{in_window, nearest, nearest_within, snap};

pub const MIN_CROSSFADE_SECS: f64 = 4.0;
pub const MAX_CROSSFADE_SECS: f64 = 14.0;
const FALLBACK_CROSSFADE_SECS: f64 = 8.0;

/// Snap radii in seconds
const PHRASE_END_RADIUS: f64 = 2.0;
const OUTGOING_BEAT_RADIUS: f64 = 2.0;
const INCOMING_BEAT_RADIUS: f64 = 1.5;
const CHORD_RADIUS: f64 = 1.5;
const DURATION_BEAT_RADIUS: f64 = 4.0;

pub const EQ_STRATEGY: &str = "swap at midpoint: cut A bass, bring B bass in over crossfade";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeCurve {
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub from_index: usize,
    pub to_index: usize,
    pub transition_start_time: f64,
    pub transition_end_time: f64,
    pub crossfade_duration_sec: f64,
    pub fade_curve: FadeCurve,
    pub eq_strategy: String,
    pub reasoning_text: String,
    #[serde(default)]
    pub incoming_start_offset: Option<f64>,
    #[serde(default)]
    pub matched_word: Option<String>,
}

/// One plan per adjacent pair of `tracks`, which are taken as already being in
/// play order. `reasoning[i]` describes the move from track `i` to `i + 1`;
/// missing entries become empty strings.
pub fn plan_transitions(tracks: &[TrackFeatures], reasoning: &[String]) -> Vec<TransitionPlan> {
    tracks
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let text = reasoning.get(i).cloned().unwrap_or_default();
            plan_pair(i, &pair[0], &pair[1], text)
        })
        .collect()
}

/// Plan the transition from `a` (outgoing, at `from_index`) to `b`.
pub fn plan_pair(from_index: usize, a: &TrackFeatures, b: &TrackFeatures, reasoning_text: String) -> TransitionPlan {
    let outro = a.outro_window;
    let intro = b.intro_window;

    let mut start = outro.start.max(0.0);
    let end = outro.end;
    let mut incoming_start_offset = None;
    let mut matched_word = None;

    let phrase_ends = in_window(&a.vocal_phrase_ends, outro);

    let lexical = if !a.vocal_segments.is_empty() && !b.vocal_segments.is_empty() {
        lexical::best_match(&a.vocal_segments, outro, &b.vocal_segments, intro)
    } else {
        None
    };

    match lexical {
        Some(m) => {
            log::debug!(
                "pair {}: matched '{}' ({:.2}s -> {:.2}s, score {})",
                from_index,
                m.word,
                m.from_segment_end,
                m.to_segment_start,
                m.score
            );
            start = snap(&phrase_ends, m.from_segment_end, PHRASE_END_RADIUS);
            incoming_start_offset = Some(m.to_segment_start);
            matched_word = Some(m.word);
        }
        None => {
            if let Some(t) = nearest(&phrase_ends, start) {
                start = t;
            }
        }
    }

    // Outgoing beat: nearest within the radius, else the nearest outro beat
    // that still leaves room for the shortest crossfade
    let a_beats = in_window(&a.beat_times_sec, outro);
    let roomy = || {
        let candidates: Vec<f64> = a_beats
            .iter()
            .copied()
            .filter(|&t| t + MIN_CROSSFADE_SECS <= end)
            .collect();
        nearest(&candidates, start)
    };
    if let Some(t) = nearest_within(&a_beats, start, OUTGOING_BEAT_RADIUS).or_else(roomy) {
        start = t;
    }

    let b_beats = in_window(&b.beat_times_sec, intro);
    if let Some(offset) = incoming_start_offset {
        incoming_start_offset = Some(snap(&b_beats, offset, INCOMING_BEAT_RADIUS));
    }

    let chord_edges: Vec<f64> = a
        .chord_segments
        .iter()
        .flat_map(|c| [c.start, c.end])
        .filter(|&t| outro.contains(t))
        .collect();
    start = snap(&chord_edges, start, CHORD_RADIUS);

    let mut crossfade = clamp_crossfade(end - start);
    if let Some(t) = nearest(&in_window(&b.vocal_phrase_starts, intro), crossfade) {
        crossfade = clamp_crossfade(t);
    }
    if let Some(t) = nearest_within(&b_beats, crossfade, DURATION_BEAT_RADIUS) {
        crossfade = clamp_crossfade(t);
    }

    TransitionPlan {
        from_index,
        to_index: from_index + 1,
        transition_start_time: start,
        transition_end_time: start + crossfade,
        crossfade_duration_sec: crossfade,
        fade_curve: FadeCurve::Linear,
        eq_strategy: EQ_STRATEGY.to_string(),
        reasoning_text,
        incoming_start_offset,
        matched_word,
    }
}

/// Clamp into the crossfade band; non-positive or non-finite input gives the fallback.
fn clamp_crossfade(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs.clamp(MIN_CROSSFADE_SECS, MAX_CROSSFADE_SECS)
    } else {
        FALLBACK_CROSSFADE_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::features::tests::sample_track;
    use crate::analyzer::features::{ChordSegment, Enrichment, TimeWindow, VocalSegment};

    fn seg(start: f64, end: f64, text: &str) -> VocalSegment {
        VocalSegment { start, end, text: text.to_string() }
    }

    /// A: 200 s with outro (170, 200). B: 100 s with intro (0, 25).
    fn pair() -> (TrackFeatures, TrackFeatures) {
        (sample_track(200.0), sample_track(100.0))
    }

    fn assert_invariants(p: &TransitionPlan) {
        assert!((MIN_CROSSFADE_SECS..=MAX_CROSSFADE_SECS).contains(&p.crossfade_duration_sec));
        assert_eq!(p.transition_end_time, p.transition_start_time + p.crossfade_duration_sec);
        assert_eq!(p.to_index, p.from_index + 1);
    }

    #[test]
    fn test_baseline_golden() {
        let (a, b) = pair();
        assert_eq!(a.outro_window, TimeWindow::new(170.0, 200.0));
        assert_eq!(b.intro_window, TimeWindow::new(0.0, 25.0));

        let plans = plan_transitions(&[a, b], &["same key, rising energy".to_string()]);
        assert_eq!(
            plans,
            vec![TransitionPlan {
                from_index: 0,
                to_index: 1,
                transition_start_time: 170.0,
                transition_end_time: 184.0,
                crossfade_duration_sec: 14.0,
                fade_curve: FadeCurve::Linear,
                eq_strategy: EQ_STRATEGY.to_string(),
                reasoning_text: "same key, rising energy".to_string(),
                incoming_start_offset: None,
                matched_word: None,
            }]
        );
    }

    #[test]
    fn test_outgoing_beat_snap() {
        let (a, b) = pair();
        let a = a.enriched(&Enrichment::default().with_beats(vec![100.0, 182.0]));
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 182.0);
        assert_eq!(p.crossfade_duration_sec, 14.0);
        assert_eq!(p.transition_end_time, 196.0);
        assert_invariants(&p);
    }

    #[test]
    fn test_outgoing_beat_within_radius_preferred() {
        let (a, b) = pair();
        let a = a.enriched(&Enrichment::default().with_beats(vec![171.5, 190.0]));
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 171.5);
        assert_eq!(p.transition_end_time, 185.5);
    }

    #[test]
    fn test_distant_beat_fallback_leaves_room() {
        let (a, b) = pair();
        let a = a.enriched(&Enrichment::default().with_beats(vec![199.5]));
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 170.0);
        assert_eq!(p.transition_end_time, 184.0);

        let a = sample_track(200.0).enriched(&Enrichment::default().with_beats(vec![194.0, 199.5]));
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 194.0);
        assert!(p.transition_start_time + MIN_CROSSFADE_SECS <= 200.0);
    }

    #[test]
    fn test_lexical_match() {
        let (a, b) = pair();
        let a = a.enriched(&Enrichment::default().with_vocals(vec![
            seg(120.0, 124.0, "burning bright"),
            seg(172.0, 175.3, "set the night on fire"),
        ]));
        let b = b.enriched(&Enrichment::default().with_vocals(vec![seg(3.1, 6.0, "Fire!")]));

        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 175.3);
        assert_eq!(p.incoming_start_offset, Some(3.1));
        assert_eq!(p.matched_word.as_deref(), Some("fire"));
        // B's only phrase start (3.1) replaces the duration, then clamps up
        assert_eq!(p.crossfade_duration_sec, MIN_CROSSFADE_SECS);
        assert_invariants(&p);
    }

    #[test]
    fn test_lexical_start_refined_to_phrase_end() {
        let (mut a, b) = pair();
        a.vocal_segments = vec![seg(172.0, 175.3, "fire")];
        a.vocal_phrase_ends = vec![176.5];
        let mut b = b;
        b.vocal_segments = vec![seg(3.1, 6.0, "fire")];

        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 176.5);
        assert_eq!(p.incoming_start_offset, Some(3.1));
    }

    #[test]
    fn test_incoming_offset_snaps_to_beat() {
        let (mut a, mut b) = pair();
        a.vocal_segments = vec![seg(172.0, 175.3, "fire")];
        b.vocal_segments = vec![seg(3.1, 6.0, "fire")];
        b.beat_times_sec = vec![2.0, 4.5, 30.0];

        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.incoming_start_offset, Some(2.0));
        // 24.7 clamps to 14; nearest intro beat within 4 s of 14 is none
        assert_eq!(p.crossfade_duration_sec, 14.0);
    }

    #[test]
    fn test_phrase_only_fallback() {
        let (mut a, b) = pair();
        a.vocal_phrase_ends = vec![150.0, 178.0, 190.0];
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 178.0);
        assert_eq!(p.crossfade_duration_sec, 14.0);
    }

    #[test]
    fn test_chord_boundary_snap() {
        let (mut a, b) = pair();
        a.chord_segments = vec![
            ChordSegment { start: 160.0, end: 171.2, chord: "Am".to_string() },
            ChordSegment { start: 171.2, end: 200.0, chord: "F".to_string() },
        ];
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 171.2);
        assert_eq!(p.crossfade_duration_sec, 14.0);
    }

    #[test]
    fn test_incoming_beats_adjust_duration() {
        let (a, mut b) = pair();
        b.beat_times_sec = vec![1.0, 11.0, 20.0];
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.crossfade_duration_sec, 11.0);
        assert_eq!(p.transition_end_time, 181.0);
    }

    #[test]
    fn test_short_outro_clamps_up() {
        let (mut a, b) = pair();
        a.outro_window = TimeWindow::new(198.0, 200.0);
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.crossfade_duration_sec, MIN_CROSSFADE_SECS);
        assert_eq!(p.transition_end_time, 202.0);
    }

    #[test]
    fn test_inverted_window_falls_back() {
        let (mut a, b) = pair();
        a.outro_window = TimeWindow::new(200.0, 200.0);
        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.crossfade_duration_sec, FALLBACK_CROSSFADE_SECS);
        assert_invariants(&p);
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let (mut a, mut b) = pair();
        a.beat_times_sec = vec![f64::NAN, f64::INFINITY];
        a.vocal_phrase_ends = vec![f64::NAN];
        a.chord_segments = vec![ChordSegment { start: f64::NAN, end: f64::NEG_INFINITY, chord: "C".to_string() }];
        b.beat_times_sec = vec![f64::NAN];
        b.vocal_phrase_starts = vec![f64::INFINITY];

        let p = plan_pair(0, &a, &b, String::new());
        assert_eq!(p.transition_start_time, 170.0);
        assert_eq!(p.crossfade_duration_sec, 14.0);
    }

    #[test]
    fn test_crossfade_bounds_hold_across_inputs() {
        let outros = [(170.0, 200.0), (195.0, 200.0), (190.0, 200.0), (0.0, 20.0), (200.0, 200.0)];
        let dense: Vec<f64> = (0..430).map(|i| i as f64 * 0.47).collect();
        let beat_sets: [Vec<f64>; 4] = [vec![], vec![177.3], vec![12.0, 199.9], dense];
        let phrase_starts: [Vec<f64>; 3] = [vec![], vec![3.0], vec![0.5, 9.0, 20.0]];
        let chord_edges: [Vec<f64>; 3] = [vec![], vec![171.0, 185.5], (0..100).map(|i| i as f64 * 2.0).collect()];

        let mut planned = 0;
        for &(start, end) in &outros {
            for a_beats in &beat_sets {
                for b_beats in &beat_sets {
                    for starts in &phrase_starts {
                        for edges in &chord_edges {
                            let mut a = sample_track(200.0);
                            a.outro_window = TimeWindow::new(start, end);
                            a.beat_times_sec = a_beats.clone();
                            a.vocal_phrase_ends = starts.iter().map(|t| end - t).collect();
                            a.chord_segments = edges
                                .windows(2)
                                .map(|w| ChordSegment { start: w[0], end: w[1], chord: "Am".to_string() })
                                .collect();
                            let mut b = sample_track(100.0);
                            b.beat_times_sec = b_beats.iter().map(|t| t / 8.0).collect();
                            b.vocal_phrase_starts = starts.clone();

                            let p = plan_pair(0, &a, &b, String::new());
                            assert_invariants(&p);
                            assert!(p.transition_start_time.is_finite());
                            planned += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(planned, 5 * 4 * 4 * 3 * 3);
    }

    #[test]
    fn test_reasoning_shorter_than_pairs() {
        let tracks = vec![sample_track(200.0), sample_track(180.0), sample_track(240.0)];
        let plans = plan_transitions(&tracks, &["first".to_string()]);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].reasoning_text, "first");
        assert_eq!(plans[1].reasoning_text, "");
        assert_eq!((plans[1].from_index, plans[1].to_index), (1, 2));
        assert_eq!(plans[1].transition_start_time, 150.0);
        plans.iter().for_each(assert_invariants);
    }

    #[test]
    fn test_fewer_than_two_tracks() {
        assert!(plan_transitions(&[], &[]).is_empty());
        assert!(plan_transitions(&[sample_track(120.0)], &[]).is_empty());
    }

    #[test]
    fn test_plan_serializes_lowercase_curve() {
        let (a, b) = pair();
        let json = serde_json::to_value(plan_pair(0, &a, &b, String::new())).unwrap();
        assert_eq!(json["fade_curve"], "linear");
        assert!(json["matched_word"].is_null());
    }
}

//! Bounded nearest-neighbour search over timestamp sets.

use crate::analyzer::features::TimeWindow;

/// Finite candidates inside `window` (inclusive), in input order.
pub fn in_window(candidates: &[f64], window: TimeWindow) -> Vec<f64> {
    candidates.iter().copied().filter(|&t| window.contains(t)).collect()
}

/// Candidate closest to `target`. Ties keep the earlier candidate.
pub fn nearest(candidates: &[f64], target: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &c in candidates.iter().filter(|c| c.is_finite()) {
        let d = (c - target).abs();
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((c, d));
        }
    }
    best.map(|(c, _)| c)
}

/// Candidate closest to `target`, if it lies within `radius` of it.
pub fn nearest_within(candidates: &[f64], target: f64, radius: f64) -> Option<f64> {
    nearest(candidates, target).filter(|c| (c - target).abs() <= radius)
}

/// `target` moved to the nearest candidate within `radius`, or unchanged.
pub fn snap(candidates: &[f64], target: f64, radius: f64) -> f64 {
    nearest_within(candidates, target, radius).unwrap_or(target)
}

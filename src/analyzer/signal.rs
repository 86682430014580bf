//! Numeric building blocks shared by the feature extractors.

/// Moving average with a window of `size` samples, edges extended with the
/// nearest sample. For even sizes the window leans left: it covers
/// `[i - size/2, i + (size-1)/2]`.
pub fn smooth(values: &[f64], size: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || size <= 1 {
        return values.to_vec();
    }
    let left = (size / 2) as isize;
    let right = ((size - 1) / 2) as isize;
    let at = |i: isize| values[i.clamp(0, n as isize - 1) as usize];

    // Running sum over the clamped window
    let mut sum: f64 = (-left..=right).map(at).sum();
    let mut out = Vec::with_capacity(n);
    for i in 0..n as isize {
        out.push(sum / size as f64);
        sum += at(i + right + 1) - at(i - left);
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Scale to unit Euclidean length. The small epsilon keeps all-zero input at zero.
pub fn l2_normalize(values: &[f64; 12]) -> [f64; 12] {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt() + 1e-8;
    let mut out = [0.0; 12];
    for (o, v) in out.iter_mut().zip(values) {
        *o = v / norm;
    }
    out
}

/// Rotate a 12-bin template right by `shift` bins, so bin 0 lands on `shift`.
pub fn rotate(template: &[f64; 12], shift: usize) -> [f64; 12] {
    let mut out = [0.0; 12];
    for (i, &v) in template.iter().enumerate() {
        out[(i + shift) % 12] = v;
    }
    out
}

/// Pearson correlation coefficient. `None` when either side has no variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    let denom = (va * vb).sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return None;
    }
    Some(cov / denom)
}

/// Local maxima of `values` with height >= `min_height`, thinned so that no two
/// kept peaks are closer than `min_distance` samples. Taller peaks win; among
/// equal heights the later one wins. Plateaus report their middle sample
/// (rounded down). Returns indices in ascending order.
pub fn find_peaks(values: &[f64], min_height: f64, min_distance: usize) -> Vec<usize> {
    let n = values.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            // Walk across a plateau
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks.retain(|&p| values[p] >= min_height);

    if min_distance > 1 && peaks.len() > 1 {
        let mut keep = vec![true; peaks.len()];
        // Priority order: height ascending, stable, so iterate from the back
        let mut order: Vec<usize> = (0..peaks.len()).collect();
        order.sort_by(|&a, &b| {
            values[peaks[a]]
                .partial_cmp(&values[peaks[b]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &j in order.iter().rev() {
            if !keep[j] {
                continue;
            }
            let mut k = j;
            while k > 0 && peaks[j] - peaks[k - 1] < min_distance {
                k -= 1;
                keep[k] = false;
            }
            let mut k = j + 1;
            while k < peaks.len() && peaks[k] - peaks[j] < min_distance {
                keep[k] = false;
                k += 1;
            }
        }
        peaks = peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    peaks
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_constant_is_identity() {
        let v = vec![2.0; 10];
        let s = smooth(&v, 4);
        assert!(s.iter().all(|x| (x - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_smooth_nearest_edges() {
        // size 3 at index 0 sees [v0, v0, v1]
        let s = smooth(&[0.0, 3.0, 6.0], 3);
        assert!((s[0] - 1.0).abs() < 1e-12);
        assert!((s[1] - 3.0).abs() < 1e-12);
        assert!((s[2] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_smooth_even_window_leans_left() {
        // size 2 covers [i-1, i]
        let s = smooth(&[0.0, 2.0, 4.0], 2);
        assert!((s[0] - 0.0).abs() < 1e-12);
        assert!((s[1] - 1.0).abs() < 1e-12);
        assert!((s[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson(&a, &[1.0; 4]).is_none());
    }

    #[test]
    fn test_rotate() {
        let mut t = [0.0; 12];
        t[0] = 1.0;
        let r = rotate(&t, 3);
        assert_eq!(r[3], 1.0);
        assert_eq!(r.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_find_peaks_height_and_distance() {
        let v = [0.0, 0.7, 0.0, 0.9, 0.0, 0.5, 0.0, 0.8, 0.0];
        assert_eq!(find_peaks(&v, 0.6, 1), vec![1, 3, 7]);
        // Distance 3 drops the 0.7 peak next to the taller 0.9
        assert_eq!(find_peaks(&v, 0.6, 3), vec![3, 7]);
    }

    #[test]
    fn test_find_peaks_plateau_and_edges() {
        let v = [1.0, 0.0, 0.8, 0.8, 0.8, 0.0, 1.0];
        assert_eq!(find_peaks(&v, 0.0, 1), vec![3]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(182.004, 2), 182.0);
    }
}

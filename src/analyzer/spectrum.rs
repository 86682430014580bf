use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Number of analysis frames for a centred framing of `len` samples.
pub fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Centred frame `index`: `n` samples around `index * hop`, zero outside the signal.
pub fn centred_frame(samples: &[f32], index: usize, hop: usize, n: usize) -> impl Iterator<Item = f64> + '_ {
    let start = (index * hop) as isize - (n / 2) as isize;
    (0..n as isize).map(move |k| {
        let pos = start + k;
        if pos < 0 || pos as usize >= samples.len() {
            0.0
        } else {
            samples[pos as usize] as f64
        }
    })
}

/// Hann-windowed STFT magnitudes, handed to `visit` one frame at a time so
/// that no full spectrogram is ever held. Frame `t` is centred on sample
/// `t * hop`; each frame holds `n_fft / 2 + 1` bins.
pub fn for_each_magnitude_frame<F>(samples: &[f32], n_fft: usize, hop: usize, mut visit: F)
where
    F: FnMut(usize, &[f64]),
{
    let window: Vec<f64> = (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n_fft as f64).cos())
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    let mut magnitudes = vec![0.0; n_fft / 2 + 1];

    for t in 0..frame_count(samples.len(), hop) {
        for ((slot, x), w) in buffer.iter_mut().zip(centred_frame(samples, t, hop, n_fft)).zip(&window) {
            *slot = Complex::new(x * w, 0.0);
        }
        fft.process(&mut buffer);
        for (m, c) in magnitudes.iter_mut().zip(&buffer) {
            *m = c.norm();
        }
        visit(t, &magnitudes);
    }
}

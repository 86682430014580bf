use rubato::{FftFixedInOut, Resampler};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::SAMPLE_RATE;

/// Extensions that are converted through ffmpeg before decoding.
pub const EXTERNAL_DECODER_EXTENSIONS: &[&str] = &["shn", "ape", "wv", "dsf", "dff"];

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported format: .{0}")]
    Unsupported(String),
    #[error("{tool} not found, required for .{ext} files. Install ffmpeg (e.g. `apt install ffmpeg` or `brew install ffmpeg`) or convert the file to FLAC/WAV first")]
    ExternalDecoderMissing { tool: String, ext: String },
    #[error("ffmpeg decode error: {0}")]
    Ffmpeg(String),
    #[error("Decode failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono PCM at the analysis sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Load an audio file as mono samples at [`SAMPLE_RATE`]: FLAC natively via
/// claxon, formats in [`EXTERNAL_DECODER_EXTENSIONS`] through an ffmpeg
/// subprocess, everything else through symphonia.
pub fn load_audio(path: &Path, ffmpeg: &str) -> Result<Waveform, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if !crate::SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(DecodeError::Unsupported(ext));
    }

    let (samples, rate) = if ext == "flac" {
        decode_flac(path)?
    } else if EXTERNAL_DECODER_EXTENSIONS.contains(&ext.as_str()) {
        decode_via_ffmpeg(path, &ext, ffmpeg)?
    } else {
        decode_symphonia(path)?
    };

    let samples = resample(&samples, rate, SAMPLE_RATE);
    log::debug!(
        "Decoded {} ({} Hz → {} Hz, {:.2}s)",
        path.display(),
        rate,
        SAMPLE_RATE,
        samples.len() as f64 / SAMPLE_RATE as f64
    );
    Ok(Waveform { samples, sample_rate: SAMPLE_RATE })
}

fn decode_flac(path: &Path) -> Result<(Vec<f32>, u32), DecodeError> {
    let mut reader = claxon::FlacReader::open(path).map_err(|e| DecodeError::Failed(e.to_string()))?;
    let info = reader.streaminfo();
    let channels = info.channels as usize;
    let scale = (1i64 << (info.bits_per_sample - 1)) as f32;

    let mut interleaved = Vec::with_capacity(info.samples.unwrap_or(0) as usize * channels);
    for sample in reader.samples() {
        let s = sample.map_err(|e| DecodeError::Failed(e.to_string()))?;
        interleaved.push(s as f32 / scale);
    }
    Ok((to_mono(&interleaved, channels), info.sample_rate))
}

fn decode_symphonia(path: &Path) -> Result<(Vec<f32>, u32), DecodeError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Failed(format!("probe: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Failed("no audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let rate = codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Failed(format!("codec: {e}")))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Failed(format!("packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::trace!("Skipping corrupt frame in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(DecodeError::Failed(e.to_string())),
        };
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mono.extend(to_mono(buf.samples(), spec.channels.count()));
    }

    Ok((mono, rate))
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Convert through ffmpeg into a temporary WAV, then decode that.
fn decode_via_ffmpeg(path: &Path, ext: &str, ffmpeg: &str) -> Result<(Vec<f32>, u32), DecodeError> {
    if Command::new(ffmpeg).arg("-version").output().is_err() {
        return Err(DecodeError::ExternalDecoderMissing {
            tool: ffmpeg.to_string(),
            ext: ext.to_string(),
        });
    }

    let tmp_wav = std::env::temp_dir().join(format!(
        "mixcut_{}_{}.wav",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let output = Command::new(ffmpeg)
        .args([
            "-i",
            &path.to_string_lossy(),
            "-f",
            "wav",
            "-acodec",
            "pcm_s16le",
            "-y",
            &tmp_wav.to_string_lossy(),
        ])
        .output()?;

    if !output.status.success() {
        std::fs::remove_file(&tmp_wav).ok();
        return Err(DecodeError::Ffmpeg(String::from_utf8_lossy(&output.stderr).to_string()));
    }

    let decoded = decode_symphonia(&tmp_wav);
    std::fs::remove_file(&tmp_wav).ok();
    decoded
}

/// Average interleaved channels into one.
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// FFT resampling via rubato; linear interpolation if rubato cannot be set up.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    const CHUNK_SIZE: usize = 1024;

    let mut resampler = match FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("rubato init failed ({}), using linear resampling", e);
            return resample_linear(samples, from_rate, to_rate);
        }
    };

    let input_len = resampler.input_frames_next();
    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + input_len).min(samples.len());
        let mut chunk = samples[pos..end].to_vec();
        chunk.resize(input_len, 0.0);
        match resampler.process(&[chunk], None) {
            Ok(out) => {
                if let Some(channel) = out.first() {
                    output.extend_from_slice(channel);
                }
            }
            Err(e) => {
                log::debug!("rubato process failed ({}), finishing with linear resampling", e);
                output.extend(resample_linear(&samples[pos..], from_rate, to_rate));
                break;
            }
        }
        pos += input_len;
    }

    // Drop the zero padding of the final chunk
    output.truncate(expected);
    output
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let step = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / step) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

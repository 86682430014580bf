//! Collaborator data for a track: beat/chord grids and vocal transcripts.
//!
//! Sources, later ones winning per field:
//! - `<stem>.beats.json` next to the audio file
//! - the configured beat/chord script, run as `<script> <audio path>`
//! - `<stem>.vocals.json` next to the audio file
//!
//! All parsing is tolerant: malformed entries are dropped, never reported.

use crate::analyzer::features::{ChordSegment, Enrichment, VocalSegment};
use crate::config::EnrichmentConfig;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Beat/chord script {script} failed: {message}")]
    Script { script: String, message: String },
}

pub fn beats_sidecar(audio: &Path) -> PathBuf {
    audio.with_extension("beats.json")
}

pub fn vocals_sidecar(audio: &Path) -> PathBuf {
    audio.with_extension("vocals.json")
}

/// Gather every configured source for `audio`. A failing source is logged
/// and skipped; the result may be empty.
pub fn load_enrichment(audio: &Path, config: &EnrichmentConfig) -> Enrichment {
    let mut enrichment = Enrichment::default();

    if config.sidecars {
        match read_sidecar(&beats_sidecar(audio)) {
            Ok(Some(value)) => enrichment = enrichment.merge(parse_beat_chord(&value)),
            Ok(None) => {}
            Err(e) => log::warn!("{}", e),
        }
    }

    if let Some(script) = &config.beat_chord_script {
        let timeout = Duration::from_secs(config.script_timeout_secs);
        match run_script(script, audio, timeout) {
            Ok(value) => enrichment = enrichment.merge(parse_beat_chord(&value)),
            Err(e) => log::warn!("{}", e),
        }
    }

    if config.sidecars {
        match read_sidecar(&vocals_sidecar(audio)) {
            Ok(Some(value)) => enrichment = enrichment.merge(parse_vocals(&value)),
            Ok(None) => {}
            Err(e) => log::warn!("{}", e),
        }
    }

    if !enrichment.is_empty() {
        log::debug!(
            "Enrichment for {}: beats={} chords={} vocal segments={}",
            audio.display(),
            enrichment.beat_times_sec.as_ref().map_or(0, Vec::len),
            enrichment.chord_segments.as_ref().map_or(0, Vec::len),
            enrichment.vocal_segments.as_ref().map_or(0, Vec::len),
        );
    }
    enrichment
}

fn read_sidecar(path: &Path) -> Result<Option<Value>, EnrichError> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|source| EnrichError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| EnrichError::Json {
            origin: path.display().to_string(),
            source,
        })
}

fn run_script(script: &str, audio: &Path, timeout: Duration) -> Result<Value, EnrichError> {
    let script_err = |message: String| EnrichError::Script {
        script: script.to_string(),
        message,
    };
    if !audio.is_file() {
        return Err(script_err(format!("{} is not a file", audio.display())));
    }

    let mut cmd = Command::new(script);
    cmd.arg(audio).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = audio.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn().map_err(|e| script_err(e.to_string()))?;

    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) if start.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(25)),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(e.to_string());
            }
        }
    };

    // Readers of a killed script are left to finish on their own
    let status = status.map_err(script_err)?;
    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    if !status.success() {
        return Err(script_err(format!(
            "{}: {}",
            status,
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    let stdout = String::from_utf8_lossy(&stdout);
    if stdout.trim().is_empty() {
        return Err(script_err("no output".to_string()));
    }
    serde_json::from_str(stdout.trim()).map_err(|source| EnrichError::Json {
        origin: format!("output of {script}"),
        source,
    })
}

/// Read a child pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// First populated array among `keys`: an empty or missing key falls through
/// to the next one.
fn first_array<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|k| value.get(k).and_then(Value::as_array))
        .find(|a| !a.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// `{"beats"|"beat_times_sec": [..], "chords"|"chord_segments": [{start, end, chord}]}`
pub fn parse_beat_chord(value: &Value) -> Enrichment {
    let mut beats: Vec<f64> = first_array(value, &["beats", "beat_times_sec"])
        .iter()
        .filter_map(finite)
        .collect();
    beats.sort_by(|a, b| a.total_cmp(b));

    let chords: Vec<ChordSegment> = first_array(value, &["chords", "chord_segments"])
        .iter()
        .filter_map(|c| {
            let chord = match c.get("chord")? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let time = |key: &str| c.get(key).and_then(finite).unwrap_or(0.0);
            Some(ChordSegment {
                start: time("start"),
                end: time("end"),
                chord,
            })
        })
        .collect();

    Enrichment::default().with_beats(beats).with_chords(chords)
}

/// `[{start, end, text}]` or `{"segments": [..]}`. Segments without numeric
/// start and end are dropped; text is trimmed.
pub fn parse_vocals(value: &Value) -> Enrichment {
    let items: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        other => first_array(other, &["segments", "vocal_segments"]),
    };
    let segments: Vec<VocalSegment> = items
        .iter()
        .filter_map(|s| {
            Some(VocalSegment {
                start: s.get("start").and_then(finite)?,
                end: s.get("end").and_then(finite)?,
                text: s
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string(),
            })
        })
        .collect();
    Enrichment::default().with_vocals(segments)
}

pub mod metadata;

use crate::db::models::NewTrack;
use crate::db::Database;
use crate::SUPPORTED_EXTENSIONS;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
}

pub struct ScanResult {
    pub scanned: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Absolute form of a path, used as the library key. Falls back to the path
/// as given when it cannot be resolved.
pub fn library_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Scan directories for audio files and insert/update tracks in the database.
pub fn scan(db: &Database, paths: &[PathBuf], force: bool) -> std::result::Result<ScanResult, ScanError> {
    let mut audio_files: Vec<PathBuf> = Vec::new();

    for root in paths {
        let root = library_path(root);
        for entry in WalkDir::new(&root).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_supported(entry.path()) {
                audio_files.push(entry.into_path());
            }
        }
    }

    let pb = ProgressBar::new(audio_files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Scanning...");

    let mut result = ScanResult {
        scanned: 0,
        new: 0,
        updated: 0,
        skipped: 0,
        errors: 0,
    };

    // One transaction for the whole pass
    let tx = db.conn.unchecked_transaction().map_err(crate::db::DbError::from)?;

    for path in &audio_files {
        result.scanned += 1;

        match process_file(db, path, force) {
            Ok(FileAction::New) => result.new += 1,
            Ok(FileAction::Updated) => result.updated += 1,
            Ok(FileAction::Skipped) => result.skipped += 1,
            Err(e) => {
                log::warn!("Error scanning {}: {}", path.display(), e);
                result.errors += 1;
            }
        }

        pb.inc(1);
    }

    tx.commit().map_err(crate::db::DbError::from)?;

    pb.finish_with_message(format!(
        "Done: {} new, {} updated, {} skipped, {} errors",
        result.new, result.updated, result.skipped, result.errors
    ));

    Ok(result)
}

enum FileAction {
    New,
    Updated,
    Skipped,
}

fn process_file(db: &Database, path: &Path, force: bool) -> std::result::Result<FileAction, ScanError> {
    let new_track = describe_file(path)?;

    let existing = db.find_track_by_path(&new_track.file_path)?;
    let unchanged = existing.is_some()
        && db.track_unchanged(&new_track.file_path, new_track.file_size, &new_track.file_modified)?;
    if !force && unchanged {
        return Ok(FileAction::Skipped);
    }

    let id = db.upsert_track(&new_track)?;
    if existing.is_none() {
        return Ok(FileAction::New);
    }
    // Features of the old contents no longer describe the file
    if !unchanged && db.clear_features(id)? {
        log::debug!("{} changed, features cleared", path.display());
    }
    Ok(FileAction::Updated)
}

/// Register a single file in the library, returning its track id.
pub fn register_file(db: &Database, path: &Path) -> std::result::Result<i64, ScanError> {
    let new_track = describe_file(&library_path(path))?;
    Ok(db.upsert_track(&new_track)?)
}

fn describe_file(path: &Path) -> std::result::Result<NewTrack, ScanError> {
    let meta = std::fs::metadata(path)?;
    let tags = metadata::read_tags(path);

    Ok(NewTrack {
        file_path: path.to_string_lossy().to_string(),
        file_size: meta.len() as i64,
        file_modified: format_mtime(&meta),
        format: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase(),
        title: tags.title,
        artist: tags.artist,
        duration_secs: tags.duration_secs,
    })
}

fn format_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

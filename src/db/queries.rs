use super::models::{LibraryStats, NewTrack, Track};
use super::{Database, Result};
use crate::analyzer::features::TrackFeatures;
use rusqlite::{params, OptionalExtension};

const TRACK_COLUMNS: &str = "t.id, t.file_path, t.format, t.title, t.artist";

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        file_path: row.get(1)?,
        format: row.get(2)?,
        title: row.get(3)?,
        artist: row.get(4)?,
    })
}

impl Database {
    /// Insert or update a track. Returns the track id.
    pub fn upsert_track(&self, t: &NewTrack) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tracks (
                file_path, file_size, file_modified, format,
                title, artist, duration_secs, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
            ON CONFLICT(file_path) DO UPDATE SET
                file_size = excluded.file_size,
                file_modified = excluded.file_modified,
                format = excluded.format,
                title = excluded.title,
                artist = excluded.artist,
                duration_secs = excluded.duration_secs,
                updated_at = datetime('now')
            ",
            params![
                t.file_path,
                t.file_size,
                t.file_modified,
                t.format,
                t.title,
                t.artist,
                t.duration_secs,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM tracks WHERE file_path = ?1",
            params![t.file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get all tracks that have no stored feature record.
    pub fn get_unanalyzed_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS}
             FROM tracks t
             LEFT JOIN track_features f ON f.track_id = t.id
             WHERE f.id IS NULL
             ORDER BY t.id"
        ))?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Get all tracks (for --force re-analysis).
    pub fn get_all_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TRACK_COLUMNS} FROM tracks t ORDER BY t.id"))?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    pub fn find_track_by_path(&self, file_path: &str) -> Result<Option<Track>> {
        let track = self
            .conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.file_path = ?1"),
                params![file_path],
                track_from_row,
            )
            .optional()?;
        Ok(track)
    }

    /// Store (or replace) the feature record of a track.
    pub fn store_features(&self, track_id: i64, f: &TrackFeatures) -> Result<()> {
        let json = serde_json::to_string(f)?;
        self.conn.execute(
            "INSERT INTO track_features (
                track_id, bpm, key, camelot_code, energy_score, duration_sec,
                loudness_profile, beat_count, drop_count, features_json, analyzed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
            ON CONFLICT(track_id) DO UPDATE SET
                bpm = excluded.bpm,
                key = excluded.key,
                camelot_code = excluded.camelot_code,
                energy_score = excluded.energy_score,
                duration_sec = excluded.duration_sec,
                loudness_profile = excluded.loudness_profile,
                beat_count = excluded.beat_count,
                drop_count = excluded.drop_count,
                features_json = excluded.features_json,
                analyzed_at = datetime('now')
            ",
            params![
                track_id,
                f.bpm,
                f.key,
                f.camelot_code,
                f.energy_score,
                f.duration_sec,
                f.loudness_profile.as_str(),
                f.beat_times_sec.len() as i64,
                f.drop_regions.len() as i64,
                json,
            ],
        )?;
        Ok(())
    }

    /// Drop the stored feature record of a track, leaving it pending analysis.
    pub fn clear_features(&self, track_id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM track_features WHERE track_id = ?1", params![track_id])?;
        Ok(removed > 0)
    }

    pub fn load_features(&self, track_id: i64) -> Result<Option<TrackFeatures>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT features_json FROM track_features WHERE track_id = ?1",
                params![track_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    /// Feature record cached for a file path, if the file was scanned and analyzed.
    pub fn load_features_by_path(&self, file_path: &str) -> Result<Option<TrackFeatures>> {
        match self.find_track_by_path(file_path)? {
            Some(track) => self.load_features(track.id),
            None => Ok(None),
        }
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let total_tracks: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;

        let analyzed_tracks: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM track_features", [], |row| row.get(0))?;

        let total_duration_hours: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(duration_sec), 0.0) / 3600.0 FROM track_features",
            [],
            |row| row.get(0),
        )?;

        let mean_bpm: Option<f64> =
            self.conn
                .query_row("SELECT AVG(bpm) FROM track_features", [], |row| row.get(0))?;

        let mut fmt_stmt = self.conn.prepare(
            "SELECT format, COUNT(*) FROM tracks GROUP BY format ORDER BY COUNT(*) DESC",
        )?;
        let formats: Vec<(String, i64)> = fmt_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut key_stmt = self.conn.prepare(
            "SELECT camelot_code, COUNT(*)
             FROM track_features
             GROUP BY camelot_code
             ORDER BY COUNT(*) DESC, camelot_code",
        )?;
        let camelot_codes: Vec<(String, i64)> = key_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(LibraryStats {
            total_tracks,
            analyzed_tracks,
            total_duration_hours,
            formats,
            camelot_codes,
            mean_bpm,
        })
    }

    /// Check if a file path already exists and hasn't changed (same size+mtime).
    pub fn track_unchanged(&self, file_path: &str, file_size: i64, file_modified: &str) -> Result<bool> {
        let result: std::result::Result<(i64, String), _> = self.conn.query_row(
            "SELECT file_size, file_modified FROM tracks WHERE file_path = ?1",
            params![file_path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );

        match result {
            Ok((size, mtime)) => Ok(size == file_size && mtime == file_modified),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::features::tests::sample_track;

    fn test_track() -> NewTrack {
        NewTrack {
            file_path: "/music/house/Night Drive.flac".to_string(),
            file_size: 12345678,
            file_modified: "1700000000".to_string(),
            format: "flac".to_string(),
            title: Some("Night Drive".to_string()),
            artist: Some("Example Artist".to_string()),
            duration_secs: Some(300.0),
        }
    }

    #[test]
    fn test_upsert_and_retrieve() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track();
        let id = db.upsert_track(&t).unwrap();
        assert!(id > 0);

        let tracks = db.get_unanalyzed_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].file_path, t.file_path);
        assert_eq!(tracks[0].artist.as_deref(), Some("Example Artist"));
        assert_eq!(tracks[0].display_name(), "Night Drive");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track();
        let id1 = db.upsert_track(&t).unwrap();
        let id2 = db.upsert_track(&t).unwrap();
        assert_eq!(id1, id2);

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_tracks, 1);
    }

    #[test]
    fn test_track_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track();
        db.upsert_track(&t).unwrap();

        assert!(db.track_unchanged(&t.file_path, t.file_size, &t.file_modified).unwrap());
        assert!(!db.track_unchanged(&t.file_path, 999, &t.file_modified).unwrap());
        assert!(!db.track_unchanged("/nonexistent", 0, "").unwrap());
    }

    #[test]
    fn test_stats_empty() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_tracks, 0);
        assert_eq!(stats.analyzed_tracks, 0);
        assert!(stats.mean_bpm.is_none());
    }

    #[test]
    fn test_features_round_trip_and_unanalyzed() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track();
        let id = db.upsert_track(&t).unwrap();
        assert_eq!(db.get_unanalyzed_tracks().unwrap().len(), 1);

        let features = sample_track(300.0);
        db.store_features(id, &features).unwrap();

        assert!(db.get_unanalyzed_tracks().unwrap().is_empty());
        assert_eq!(db.load_features_by_path(&t.file_path).unwrap(), Some(features));
        assert!(db.load_features_by_path("/elsewhere.mp3").unwrap().is_none());

        let stats = db.stats().unwrap();
        assert_eq!(stats.analyzed_tracks, 1);
        assert_eq!(stats.camelot_codes, vec![("8A".to_string(), 1)]);
        assert_eq!(stats.mean_bpm, Some(124.0));
        assert!((stats.total_duration_hours - 300.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn test_store_features_replaces() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track()).unwrap();

        db.store_features(id, &sample_track(300.0)).unwrap();
        let mut faster = sample_track(300.0);
        faster.bpm = 128.0;
        db.store_features(id, &faster).unwrap();

        assert_eq!(db.load_features(id).unwrap().map(|f| f.bpm), Some(128.0));
        assert_eq!(db.stats().unwrap().analyzed_tracks, 1);
    }

    #[test]
    fn test_clear_features() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track()).unwrap();
        assert!(!db.clear_features(id).unwrap());

        db.store_features(id, &sample_track(300.0)).unwrap();
        assert!(db.clear_features(id).unwrap());
        assert!(db.load_features(id).unwrap().is_none());
        assert_eq!(db.get_unanalyzed_tracks().unwrap().len(), 1);
    }
}

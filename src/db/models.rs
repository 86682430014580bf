/// Data for inserting or updating a track (scan phase).
pub struct NewTrack {
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: String,
    pub format: String,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration_secs: Option<f64>,
}

/// A track row read from the database.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: i64,
    pub file_path: String,
    pub format: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl Track {
    /// Title tag, falling back to the file stem.
    pub fn display_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            std::path::Path::new(&self.file_path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.file_path.clone())
        })
    }
}

/// Library-wide statistics.
pub struct LibraryStats {
    pub total_tracks: i64,
    pub analyzed_tracks: i64,
    pub total_duration_hours: f64,
    pub formats: Vec<(String, i64)>,
    /// Analyzed tracks per Camelot code, most common first.
    pub camelot_codes: Vec<(String, i64)>,
    pub mean_bpm: Option<f64>,
}

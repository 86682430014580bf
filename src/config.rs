use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to scan for music files (used when `scan` has no CLI args).
    pub music_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub enrichment: EnrichmentConfig,
    pub decode: DecodeConfig,
}

/// Where beat/chord and transcript data for a track come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Read `<stem>.beats.json` / `<stem>.vocals.json` next to the audio file.
    pub sidecars: bool,
    /// Command run as `<script> <audio path>`, printing beat/chord JSON on stdout.
    pub beat_chord_script: Option<String>,
    /// Seconds the script may run before it is killed and ignored.
    pub script_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            sidecars: true,
            beat_chord_script: None,
            script_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// ffmpeg binary used for formats without a native decoder.
    pub ffmpeg: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/mixcut/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("mixcut.db")
    } else {
        PathBuf::from("mixcut.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.music_dirs.is_empty());
        assert!(config.db_path.is_none());
        assert!(config.enrichment.sidecars);
        assert!(config.enrichment.beat_chord_script.is_none());
        assert_eq!(config.enrichment.script_timeout_secs, 120);
        assert_eq!(config.decode.ffmpeg, "ffmpeg");
        assert!(config.resolve_workers() >= 1);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
            workers = 3
            music_dirs = ["/srv/music"]

            [enrichment]
            beat_chord_script = "beat-this"
            script_timeout_secs = 30

            [decode]
            ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_workers(), 3);
        assert_eq!(config.music_dirs, vec![PathBuf::from("/srv/music")]);
        assert!(config.enrichment.sidecars);
        assert_eq!(config.enrichment.beat_chord_script.as_deref(), Some("beat-this"));
        assert_eq!(config.enrichment.script_timeout_secs, 30);
        assert_eq!(config.decode.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(AppConfig::parse("workers = \"many\"").is_err());
    }
}

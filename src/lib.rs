pub mod analyzer;
pub mod config;
pub mod db;
pub mod enrich;
pub mod planner;
pub mod scanner;

/// Audio file extensions we support
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Native (claxon for FLAC, symphonia for the rest)
    "mp3", "flac", "ogg", "wav", "aif", "aiff", "m4a", "aac", "opus",
    // ffmpeg conversion
    "shn", "ape", "wv", "dsf", "dff",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "mixcut";

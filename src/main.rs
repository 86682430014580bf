use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mixcut::analyzer::features::TrackFeatures;
use mixcut::analyzer::harmony::camelot_compatible;
use mixcut::config::AppConfig;
use mixcut::db::Database;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mixcut", version, about = "Track analysis and transition planning for automated DJ mixes")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan directories for audio files and add them to the library
    Scan {
        /// Directories to scan (defaults to config file music_dirs)
        paths: Vec<PathBuf>,

        /// Force re-scan even if files haven't changed
        #[arg(long)]
        force: bool,
    },

    /// Analyze library tracks and store their feature records
    Analyze {
        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Force re-analysis of already-analyzed tracks
        #[arg(long)]
        force: bool,

        /// Only analyze tracks whose path contains this pattern
        #[arg(long)]
        filter: Option<String>,
    },

    /// Analyze one file and print its feature record as JSON (no database)
    Features {
        file: PathBuf,

        /// Skip sidecar/script enrichment
        #[arg(long)]
        no_enrich: bool,
    },

    /// Plan transitions between files given in play order, printed as JSON
    Plan {
        /// Audio files in play order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON array of per-transition reasoning strings
        #[arg(long)]
        reasoning: Option<PathBuf>,

        /// Analyze files that have no stored feature record instead of failing
        #[arg(long)]
        analyze_missing: bool,
    },

    /// Show library statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(mixcut::config::default_db_path);
    let open_db = || -> Result<Database> {
        log::info!("Database: {}", db_path.display());
        Database::open(&db_path).context("Failed to open database")
    };

    match cli.command {
        Commands::Scan { paths, force } => {
            // Resolve scan paths: CLI args > config music_dirs
            let scan_paths = if !paths.is_empty() {
                paths
            } else if !config.music_dirs.is_empty() {
                config.music_dirs.clone()
            } else {
                anyhow::bail!("No directories to scan. Pass paths as arguments or set music_dirs in config.");
            };

            let db = open_db()?;
            let result = mixcut::scanner::scan(&db, &scan_paths, force).context("Scan failed")?;
            println!(
                "Scan complete: {} scanned, {} new, {} updated, {} skipped, {} errors",
                result.scanned, result.new, result.updated, result.skipped, result.errors
            );
        }

        Commands::Analyze { jobs, force, filter } => {
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let db = open_db()?;
            let result = mixcut::analyzer::analyze_tracks(
                &db,
                force,
                workers,
                filter.as_deref(),
                &config.decode.ffmpeg,
            )
            .context("Analysis failed")?;
            println!(
                "Analysis complete: {} analyzed, {} failed",
                result.analyzed, result.failed
            );
        }

        Commands::Features { file, no_enrich } => {
            let mut features = mixcut::analyzer::analyze_file(&file, &config.decode.ffmpeg)
                .with_context(|| format!("Failed to analyze {}", file.display()))?;
            if !no_enrich {
                let enrichment = mixcut::enrich::load_enrichment(&file, &config.enrichment);
                features = features.enriched(&enrichment);
            }
            println!("{}", serde_json::to_string_pretty(&features)?);
        }

        Commands::Plan { files, reasoning, analyze_missing } => {
            let reasoning: Vec<String> = match reasoning {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str(&text)
                        .with_context(|| format!("{} must be a JSON array of strings", path.display()))?
                }
                None => Vec::new(),
            };

            let db = open_db()?;
            let mut tracks = Vec::with_capacity(files.len());
            for file in &files {
                let features = load_or_analyze(&db, &config, file, analyze_missing)?;
                let enrichment = mixcut::enrich::load_enrichment(file, &config.enrichment);
                tracks.push(features.enriched(&enrichment));
            }

            for (i, pair) in tracks.windows(2).enumerate() {
                let (a, b) = (&pair[0], &pair[1]);
                log::info!(
                    "{} -> {}: {} ({}) -> {} ({}), {:.1} -> {:.1} BPM{}",
                    i,
                    i + 1,
                    a.key,
                    a.camelot_code,
                    b.key,
                    b.camelot_code,
                    a.bpm,
                    b.bpm,
                    if camelot_compatible(&a.camelot_code, &b.camelot_code) {
                        ", harmonically compatible"
                    } else {
                        ""
                    }
                );
            }

            let plans = mixcut::planner::plan_transitions(&tracks, &reasoning);
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }

        Commands::Stats => {
            let db = open_db()?;
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Total tracks:     {}", stats.total_tracks);
            println!("Analyzed tracks:  {}", stats.analyzed_tracks);
            println!("Total duration:   {:.1} hours", stats.total_duration_hours);
            if let Some(bpm) = stats.mean_bpm {
                println!("Mean tempo:       {:.1} BPM", bpm);
            }
            println!();

            if !stats.formats.is_empty() {
                println!("Formats:");
                for (fmt, count) in &stats.formats {
                    println!("  {:<8} {}", fmt, count);
                }
                println!();
            }

            if !stats.camelot_codes.is_empty() {
                println!("Keys (Camelot):");
                for (code, count) in &stats.camelot_codes {
                    println!("  {:<4} {}", code, count);
                }
            }
        }
    }

    Ok(())
}

/// Stored feature record for `file`, or a fresh analysis (stored for next
/// time) when `analyze_missing` is set.
fn load_or_analyze(db: &Database, config: &AppConfig, file: &Path, analyze_missing: bool) -> Result<TrackFeatures> {
    let key = mixcut::scanner::library_path(file);
    if let Some(features) = db
        .load_features_by_path(&key.to_string_lossy())
        .context("Failed to read stored features")?
    {
        log::debug!("Using stored features for {}", file.display());
        return Ok(features);
    }

    if !analyze_missing {
        anyhow::bail!(
            "No stored features for {}. Run `mixcut scan` and `mixcut analyze`, or pass --analyze-missing.",
            file.display()
        );
    }

    let features = mixcut::analyzer::analyze_file(file, &config.decode.ffmpeg)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    match mixcut::scanner::register_file(db, file) {
        Ok(id) => {
            if let Err(e) = db.store_features(id, &features) {
                log::warn!("Could not store features for {}: {}", file.display(), e);
            }
        }
        Err(e) => log::warn!("Could not register {}: {}", file.display(), e),
    }
    Ok(features)
}

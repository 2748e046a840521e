mod config;
mod error;
mod geocode;
mod metadata;
mod naming;
mod organizer;
mod report;
mod walker;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::geocode::Geocoder;
use crate::organizer::OrganizeOptions;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "photo-organizer",
    version,
    about = "Organizes photos and videos into date and location based folders"
)]
struct Cli {
    /// Directory to scan for photos and videos
    source: PathBuf,

    /// Root of the organized library
    destination: PathBuf,

    /// Move files instead of copying them
    #[arg(long = "move")]
    move_files: bool,

    /// Never talk to the geocoding service, always use the no-location naming
    #[arg(long)]
    offline: bool,

    /// Show what would happen without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero when any file was skipped or failed
    #[arg(long)]
    strict: bool,

    /// Configuration file to load instead of the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity, may be repeated
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn configure_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;

    if !cli.source.is_dir() {
        return Err(AppError::Setup(format!(
            "source {} is not a readable directory",
            cli.source.display()
        ))
        .into());
    }
    if cli.destination.exists() && !cli.destination.is_dir() {
        return Err(AppError::Setup(format!(
            "destination {} exists and is not a directory",
            cli.destination.display()
        ))
        .into());
    }

    info!("Starting photo-organizer");
    info!("Source: {}", cli.source.display());
    info!("Destination: {}", cli.destination.display());
    info!("Mode: {}", if cli.move_files { "move" } else { "copy" });
    if cli.offline {
        info!("Offline: reverse geocoding is disabled");
    }
    if cli.dry_run {
        info!("Dry run: no files will be written");
    }

    let mut geocoder = Geocoder::new(&config, cli.offline)?;
    let options = OrganizeOptions {
        move_files: cli.move_files,
        dry_run: cli.dry_run,
    };
    let report =
        organizer::organize(&cli.source, &cli.destination, &config, &mut geocoder, options);

    if let Err(e) = geocoder.persist() {
        log::warn!("Could not write the geocode cache: {}", e);
    }

    report.log_summary();

    if cli.strict && (report.failed() > 0 || report.skipped() > 0) {
        std::process::exit(1);
    }

    info!("Photo-organizer finished");
    Ok(())
}

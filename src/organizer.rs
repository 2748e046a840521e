use crate::config::AppConfig;
use crate::error::AppError;
use crate::geocode::Geocoder;
use crate::metadata::{self, MediaFile};
use crate::naming;
use crate::report::{Outcome, Report};
use crate::walker;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizeOptions {
    pub move_files: bool,
    pub dry_run: bool,
}

pub fn organize(
    source: &Path,
    destination: &Path,
    config: &AppConfig,
    geocoder: &mut Geocoder,
    options: OrganizeOptions,
) -> Report {
    let files = walker::collect_media_files(source, config);
    let total = files.len();
    let mut report = Report::default();
    // Destinations handed out during this run, keyed by destination path.
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    for (index, path) in files.iter().enumerate() {
        log::info!("Processing {}/{}: {}", index + 1, total, path.display());
        match process_file(
            path,
            destination,
            config,
            geocoder,
            options,
            &mut claimed,
            &mut report,
        ) {
            Ok(outcome) => report.record(path.clone(), outcome),
            Err(e) => {
                log::warn!("Failed to organize {}: {}", path.display(), e);
                report.record(
                    path.clone(),
                    Outcome::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    report
}

fn process_file(
    path: &Path,
    destination: &Path,
    config: &AppConfig,
    geocoder: &mut Geocoder,
    options: OrganizeOptions,
    claimed: &mut HashMap<PathBuf, PathBuf>,
    report: &mut Report,
) -> Result<Outcome, AppError> {
    let media = match metadata::extract(path, config) {
        Ok(media) => media,
        Err(AppError::UnreadableMetadata { reason, .. }) => {
            log::warn!(
                "{}: unreadable metadata ({}), falling back to the filesystem timestamp",
                path.display(),
                reason
            );
            MediaFile::from_filesystem(path)?
        }
        Err(e) => return Err(e),
    };
    if media.timestamp_is_fallback {
        report.metadata_fallbacks += 1;
    }

    let location = match media.coordinates {
        Some(coordinates) => match geocoder.resolve(coordinates) {
            Ok(location) => location,
            Err(e) => {
                log::warn!(
                    "{}: geocoding unavailable ({}), naming without a location",
                    path.display(),
                    e
                );
                report.geocode_fallbacks += 1;
                None
            }
        },
        None => None,
    };

    let relative = naming::build_path(
        media.timestamp,
        media.camera_model.as_deref(),
        location.as_ref().map(|l| l.label.as_str()),
        &media.extension,
    );
    let wanted = destination.join(relative);

    let (target, disambiguated) = match claim_destination(path, wanted, claimed) {
        Ok(claim) => claim,
        Err(AppError::NamingCollision { path: existing }) => {
            log::warn!(
                "{}: naming collision with existing {}, skipping",
                path.display(),
                existing.display()
            );
            return Ok(Outcome::SkippedCollision {
                destination: existing,
            });
        }
        Err(e) => return Err(e),
    };

    if options.dry_run {
        log::info!("[dry-run] {} -> {}", path.display(), target.display());
        return Ok(Outcome::WouldPlace {
            destination: target,
        });
    }

    place(path, &target, options.move_files)?;
    log::debug!("{} -> {}", path.display(), target.display());
    Ok(Outcome::Placed {
        destination: target,
        disambiguated,
    })
}

// Same-run duplicates get a numeric discriminator, anything already on disk
// is left alone and reported as a collision.
fn claim_destination(
    source: &Path,
    wanted: PathBuf,
    claimed: &mut HashMap<PathBuf, PathBuf>,
) -> Result<(PathBuf, bool), AppError> {
    if !claimed.contains_key(&wanted) {
        if wanted.exists() {
            return Err(AppError::NamingCollision { path: wanted });
        }
        claimed.insert(wanted.clone(), source.to_path_buf());
        return Ok((wanted, false));
    }

    let mut n = 1;
    loop {
        let candidate = naming::with_discriminator(&wanted, n);
        if !claimed.contains_key(&candidate) {
            if candidate.exists() {
                return Err(AppError::NamingCollision { path: candidate });
            }
            log::debug!(
                "{} is taken by {}, using discriminator {}",
                wanted.display(),
                claimed[&wanted].display(),
                n
            );
            claimed.insert(candidate.clone(), source.to_path_buf());
            return Ok((candidate, true));
        }
        n += 1;
    }
}

fn place(source: &Path, target: &Path, move_file: bool) -> Result<(), AppError> {
    let parent = target.parent().ok_or_else(|| AppError::DestinationWrite {
        path: target.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
    })?;
    fs::create_dir_all(parent).map_err(|e| AppError::DestinationWrite {
        path: target.to_path_buf(),
        source: e,
    })?;

    // Stage next to the target so the final rename stays on one filesystem.
    let staging = staging_path(target);
    if let Err(e) = write_copy(source, &staging) {
        let _ = fs::remove_file(&staging);
        return Err(AppError::DestinationWrite {
            path: target.to_path_buf(),
            source: e,
        });
    }
    if let Err(e) = fs::rename(&staging, target) {
        let _ = fs::remove_file(&staging);
        return Err(AppError::DestinationWrite {
            path: target.to_path_buf(),
            source: e,
        });
    }

    if move_file {
        fs::remove_file(source).map_err(|e| AppError::SourceRemoval {
            path: source.to_path_buf(),
            source: e,
        })?;
    }

    Ok(())
}

fn write_copy(source: &Path, staging: &Path) -> io::Result<()> {
    fs::copy(source, staging)?;
    let staged = fs::File::open(staging)?;
    staged.sync_all()?;
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("staging");
    target.with_file_name(format!(".{}.part-{}", name, std::process::id()))
}

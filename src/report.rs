use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Placed {
        destination: PathBuf,
        disambiguated: bool,
    },
    WouldPlace {
        destination: PathBuf,
    },
    SkippedCollision {
        destination: PathBuf,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub source: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct Report {
    pub records: Vec<FileRecord>,
    pub metadata_fallbacks: usize,
    pub geocode_fallbacks: usize,
}

impl Report {
    pub fn record(&mut self, source: PathBuf, outcome: Outcome) {
        self.records.push(FileRecord { source, outcome });
    }

    pub fn processed(&self) -> usize {
        self.records.len()
    }

    pub fn succeeded(&self) -> usize {
        self.records
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    Outcome::Placed { .. } | Outcome::WouldPlace { .. }
                )
            })
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::SkippedCollision { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn collisions(&self) -> usize {
        self.records
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    Outcome::SkippedCollision { .. }
                        | Outcome::Placed {
                            disambiguated: true,
                            ..
                        }
                )
            })
            .count()
    }

    pub fn log_summary(&self) {
        log::info!("--------------------------------------------------");
        log::info!(
            "Processed {} files: {} placed, {} skipped, {} failed.",
            self.processed(),
            self.succeeded(),
            self.skipped(),
            self.failed()
        );
        if self.metadata_fallbacks > 0 {
            log::info!(
                "Used the filesystem timestamp for {} files without readable metadata.",
                self.metadata_fallbacks
            );
        }
        if self.geocode_fallbacks > 0 {
            log::info!(
                "Named {} files without a location because geocoding was unavailable.",
                self.geocode_fallbacks
            );
        }
        if self.collisions() > 0 {
            log::info!("Hit {} naming collisions.", self.collisions());
        }
        for record in &self.records {
            match &record.outcome {
                Outcome::SkippedCollision { destination } => {
                    log::warn!(
                        "Skipped {}: {} already exists",
                        record.source.display(),
                        destination.display()
                    );
                }
                Outcome::Failed { reason } => {
                    log::warn!("Failed {}: {}", record.source.display(), reason);
                }
                _ => {}
            }
        }
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub image_extensions: HashSet<String>,
    pub video_extensions: HashSet<String>,
    pub geocode_endpoint: String,
    pub geocode_user_agent: String,
    pub geocode_interval_secs: f64,
    pub geocode_timeout_secs: u64,
    pub cache_file: String,
    pub cache_accuracy_km2: f64,
}

impl AppConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default(
                "image_extensions",
                vec!["jpg", "jpeg", "png", "heic", "tiff", "webp"],
            )?
            .set_default("video_extensions", vec!["mp4", "mov"])?
            .set_default(
                "geocode_endpoint",
                "https://nominatim.openstreetmap.org/reverse",
            )?
            .set_default("geocode_user_agent", "photo_organizer/0.1")?
            .set_default("geocode_interval_secs", 2.0)?
            .set_default("geocode_timeout_secs", 10)?
            .set_default("cache_file", ".cache/geodata.json")?
            .set_default("cache_accuracy_km2", 4.0)?;

        builder = match file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("photo_organizer").required(false)),
        };

        let s = builder
            .add_source(Environment::with_prefix("PHOTO_ORGANIZER").try_parsing(true))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.image_extensions = normalize_extensions(config.image_extensions);
        config.video_extensions = normalize_extensions(config.video_extensions);

        // Nominatim's usage policy caps lookups at one per second. Negated
        // comparisons so NaN falls back to the defaults too.
        if !(config.geocode_interval_secs >= 1.0) {
            log::warn!(
                "Geocode interval {}s is below the 1s floor, using 2s",
                config.geocode_interval_secs
            );
            config.geocode_interval_secs = 2.0;
        } else if config.geocode_interval_secs > 3600.0 {
            log::warn!(
                "Geocode interval {}s is above the 3600s ceiling, using 3600s",
                config.geocode_interval_secs
            );
            config.geocode_interval_secs = 3600.0;
        }
        if !(config.cache_accuracy_km2 > 0.0) {
            log::warn!(
                "Cache accuracy {} km2 is not positive, using 4 km2",
                config.cache_accuracy_km2
            );
            config.cache_accuracy_km2 = 4.0;
        }

        Ok(config)
    }

    pub fn allowed_extensions(&self) -> HashSet<String> {
        self.image_extensions
            .union(&self.video_extensions)
            .cloned()
            .collect()
    }
}

fn normalize_extensions(extensions: HashSet<String>) -> HashSet<String> {
    extensions
        .into_iter()
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .collect()
}

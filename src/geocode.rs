use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    display_name: Option<String>,
    #[serde(default)]
    address: Address,
}

impl LookupResponse {
    fn place_label(&self) -> Option<String> {
        let place = self
            .address
            .city
            .as_deref()
            .or(self.address.town.as_deref())
            .or(self.address.village.as_deref())
            .or(self.address.county.as_deref())?;
        let country = self.address.country.as_deref()?;
        Some(format!("{place}_{country}"))
    }
}

pub trait LookupService {
    fn lookup(&self, coordinates: Coordinates) -> Result<LookupResponse, AppError>;
}

pub struct NominatimLookup {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl NominatimLookup {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.geocode_user_agent.clone())
            .timeout(Duration::from_secs(config.geocode_timeout_secs))
            .build()?;
        Ok(NominatimLookup {
            client,
            endpoint: config.geocode_endpoint.clone(),
        })
    }
}

impl LookupService for NominatimLookup {
    fn lookup(&self, coordinates: Coordinates) -> Result<LookupResponse, AppError> {
        let latitude = coordinates.latitude.to_string();
        let longitude = coordinates.longitude.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", latitude.as_str()),
                ("lon", longitude.as_str()),
                ("addressdetails", "1"),
                ("accept-language", "en"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(AppError::GeocodeStatus(response.status().as_u16()));
        }

        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            min_interval,
            last_call: None,
        }
    }

    // Blocks until min_interval has passed since the last mark().
    pub fn wait(&self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                log::debug!(
                    "Rate limit: sleeping {:.2}s before next lookup",
                    remaining.as_secs_f64()
                );
                std::thread::sleep(remaining);
            }
        }
    }

    pub fn mark(&mut self) {
        self.last_call = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPlace {
    label: Option<String>,
    latitude: f64,
    longitude: f64,
}

impl CachedPlace {
    fn to_location(&self) -> Option<ResolvedLocation> {
        self.label.as_ref().map(|label| ResolvedLocation {
            label: label.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

pub struct Geocoder {
    service: Box<dyn LookupService>,
    limiter: RateLimiter,
    cache: HashMap<String, CachedPlace>,
    cache_file: PathBuf,
    accuracy_km2: f64,
    offline: bool,
    dirty: bool,
}

impl Geocoder {
    pub fn new(config: &AppConfig, offline: bool) -> Result<Self, AppError> {
        let service = NominatimLookup::new(config)?;
        Ok(Self::with_service(Box::new(service), config, offline))
    }

    pub fn with_service(service: Box<dyn LookupService>, config: &AppConfig, offline: bool) -> Self {
        let cache_file = PathBuf::from(&config.cache_file);
        let cache = load_cache(&cache_file);
        Geocoder {
            service,
            limiter: RateLimiter::new(Duration::from_secs_f64(config.geocode_interval_secs)),
            cache,
            cache_file,
            accuracy_km2: config.cache_accuracy_km2,
            offline,
            dirty: false,
        }
    }

    pub fn resolve(
        &mut self,
        coordinates: Coordinates,
    ) -> Result<Option<ResolvedLocation>, AppError> {
        if self.offline {
            return Ok(None);
        }

        let key = bucket_key(coordinates, self.accuracy_km2);
        if let Some(place) = self.cache.get(&key) {
            log::debug!("Geocode cache hit for {}", key);
            return Ok(place.to_location());
        }

        log::info!("Reverse geocoding {}", key);
        self.limiter.wait();
        let outcome = self.service.lookup(coordinates);
        self.limiter.mark();
        let response = outcome?;

        log::debug!("Geocoded {} to {:?}", key, response.display_name);
        let place = CachedPlace {
            label: response.place_label(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        };
        if place.label.is_none() {
            log::warn!("Geocode response for {} has no usable place name", key);
        }

        let resolved = place.to_location();
        self.cache.insert(key, place);
        self.dirty = true;
        Ok(resolved)
    }

    pub fn persist(&mut self) -> Result<(), AppError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.cache_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&self.cache)?;
        fs::write(&self.cache_file, body)?;
        self.dirty = false;
        log::debug!(
            "Wrote {} geocode cache entries to {}",
            self.cache.len(),
            self.cache_file.display()
        );
        Ok(())
    }
}

fn load_cache(path: &Path) -> HashMap<String, CachedPlace> {
    match fs::read_to_string(path) {
        Ok(body) => match serde_json::from_str::<HashMap<String, CachedPlace>>(&body) {
            Ok(cache) => {
                log::debug!(
                    "Loaded {} geocode cache entries from {}",
                    cache.len(),
                    path.display()
                );
                cache
            }
            Err(e) => {
                log::warn!("Ignoring unreadable geocode cache {}: {}", path.display(), e);
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}

// Snaps coordinates to a grid whose cells cover roughly accuracy_km2, so
// points within one cell share a single lookup.
fn approximate(coordinates: Coordinates, accuracy_km2: f64) -> (f64, f64) {
    let side_km = accuracy_km2.sqrt();
    let deg_lat = side_km / 111.0;
    let deg_lon = side_km / (111.0 * coordinates.latitude.to_radians().cos());
    let latitude = (coordinates.latitude / deg_lat).round() * deg_lat;
    let longitude = (coordinates.longitude / deg_lon).round() * deg_lon;
    (latitude, longitude)
}

fn bucket_key(coordinates: Coordinates, accuracy_km2: f64) -> String {
    let (latitude, longitude) = approximate(coordinates, accuracy_km2);
    format!("{latitude:.4},{longitude:.4}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn test_config(cache_file: &Path) -> AppConfig {
        AppConfig {
            image_extensions: ["jpg".to_string()].into_iter().collect(),
            video_extensions: ["mp4".to_string()].into_iter().collect(),
            geocode_endpoint: "http://unused.invalid/reverse".to_string(),
            geocode_user_agent: "photo_organizer tests".to_string(),
            geocode_interval_secs: 0.0,
            geocode_timeout_secs: 1,
            cache_file: cache_file.to_string_lossy().into_owned(),
            cache_accuracy_km2: 4.0,
        }
    }

    struct CountingLookup {
        calls: Rc<Cell<usize>>,
        city: Option<&'static str>,
        country: Option<&'static str>,
    }

    impl LookupService for CountingLookup {
        fn lookup(&self, _coordinates: Coordinates) -> Result<LookupResponse, AppError> {
            self.calls.set(self.calls.get() + 1);
            Ok(LookupResponse {
                display_name: None,
                address: Address {
                    city: self.city.map(str::to_string),
                    town: None,
                    village: None,
                    county: None,
                    country: self.country.map(str::to_string),
                },
            })
        }
    }

    struct FailingLookup {
        calls: Rc<Cell<usize>>,
    }

    impl LookupService for FailingLookup {
        fn lookup(&self, _coordinates: Coordinates) -> Result<LookupResponse, AppError> {
            self.calls.set(self.calls.get() + 1);
            Err(AppError::GeocodeStatus(503))
        }
    }

    fn paris() -> Coordinates {
        Coordinates {
            latitude: 48.8584,
            longitude: 2.2945,
        }
    }

    #[test]
    fn offline_mode_resolves_nothing_and_never_calls_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("cache.json"));
        let calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: calls.clone(),
            city: Some("Paris"),
            country: Some("France"),
        };

        let mut geocoder = Geocoder::with_service(Box::new(service), &config, true);
        assert_eq!(geocoder.resolve(paris()).unwrap(), None);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn first_lookup_hits_the_service_then_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("cache.json"));
        let calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: calls.clone(),
            city: Some("Paris"),
            country: Some("France"),
        };

        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        let first = geocoder.resolve(paris()).unwrap().unwrap();
        let second = geocoder.resolve(paris()).unwrap().unwrap();
        assert_eq!(first.label, "Paris_France");
        assert_eq!(second.label, "Paris_France");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn nearby_coordinates_share_a_cache_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("cache.json"));
        let calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: calls.clone(),
            city: Some("Paris"),
            country: Some("France"),
        };

        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        geocoder.resolve(paris()).unwrap();
        geocoder
            .resolve(Coordinates {
                latitude: 48.8584,
                longitude: 2.2950,
            })
            .unwrap();
        assert_eq!(calls.get(), 1);

        geocoder
            .resolve(Coordinates {
                latitude: 40.7128,
                longitude: -74.0060,
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unusable_responses_are_cached_as_no_label() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("cache.json"));
        let calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: calls.clone(),
            city: None,
            country: None,
        };

        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        assert_eq!(geocoder.resolve(paris()).unwrap(), None);
        assert_eq!(geocoder.resolve(paris()).unwrap(), None);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn place_label_falls_back_through_town_village_and_county() {
        fn label(address: Address) -> Option<String> {
            LookupResponse {
                display_name: None,
                address,
            }
            .place_label()
        }

        assert_eq!(
            label(Address {
                town: Some("Giverny".to_string()),
                country: Some("France".to_string()),
                ..Default::default()
            }),
            Some("Giverny_France".to_string())
        );
        assert_eq!(
            label(Address {
                village: Some("Hallstatt".to_string()),
                country: Some("Austria".to_string()),
                ..Default::default()
            }),
            Some("Hallstatt_Austria".to_string())
        );
        assert_eq!(
            label(Address {
                county: Some("Cornwall".to_string()),
                country: Some("United Kingdom".to_string()),
                ..Default::default()
            }),
            Some("Cornwall_United Kingdom".to_string())
        );
        // The city wins when several levels are present.
        assert_eq!(
            label(Address {
                city: Some("Vienna".to_string()),
                town: Some("Innere Stadt".to_string()),
                country: Some("Austria".to_string()),
                ..Default::default()
            }),
            Some("Vienna_Austria".to_string())
        );
    }

    #[test]
    fn place_without_a_country_is_unusable() {
        let response = LookupResponse {
            display_name: Some("Somewhere".to_string()),
            address: Address {
                city: Some("Atlantis".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(response.place_label(), None);
    }

    #[test]
    fn failures_are_surfaced_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("cache.json"));
        let calls = Rc::new(Cell::new(0));
        let service = FailingLookup {
            calls: calls.clone(),
        };

        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        assert!(geocoder.resolve(paris()).is_err());
        assert!(geocoder.resolve(paris()).is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn cache_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("nested").join("cache.json"));

        let calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: calls.clone(),
            city: Some("Paris"),
            country: Some("France"),
        };
        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        geocoder.resolve(paris()).unwrap();
        geocoder.persist().unwrap();
        assert_eq!(calls.get(), 1);

        let restart_calls = Rc::new(Cell::new(0));
        let service = CountingLookup {
            calls: restart_calls.clone(),
            city: Some("Paris"),
            country: Some("France"),
        };
        let mut geocoder = Geocoder::with_service(Box::new(service), &config, false);
        let resolved = geocoder.resolve(paris()).unwrap().unwrap();
        assert_eq!(resolved.label, "Paris_France");
        assert_eq!(restart_calls.get(), 0);
    }

    #[test]
    fn three_lookups_wait_out_two_intervals() {
        let mut limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait();
            limiter.mark();
        }
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn bucket_keys_are_stable() {
        let a = bucket_key(paris(), 4.0);
        let b = bucket_key(paris(), 4.0);
        assert_eq!(a, b);
        assert!(a.contains(','));
    }
}

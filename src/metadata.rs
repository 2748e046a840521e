use crate::config::AppConfig;
use crate::error::AppError;
use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Tag, Value};
use lazy_static::lazy_static;
use nom_exif::{MediaParser, MediaSource, TrackInfo, TrackInfoTag};
use regex::Regex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub timestamp_is_fallback: bool,
    pub camera_model: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub extension: String,
}

impl MediaFile {
    // Used when a file carries no readable metadata at all.
    pub fn from_filesystem(path: &Path) -> Result<Self, AppError> {
        Ok(MediaFile {
            path: path.to_path_buf(),
            timestamp: modified_time(path)?,
            timestamp_is_fallback: true,
            camera_model: None,
            coordinates: None,
            extension: extension_of(path),
        })
    }
}

struct RawFields {
    timestamp: Option<NaiveDateTime>,
    camera_model: Option<String>,
    coordinates: Option<Coordinates>,
}

pub fn extract(path: &Path, config: &AppConfig) -> Result<MediaFile, AppError> {
    let extension = extension_of(path);
    let fields = if config.video_extensions.contains(&extension) {
        extract_track_fields(path)?
    } else {
        extract_exif_fields(path)?
    };

    let (timestamp, timestamp_is_fallback) = match fields.timestamp {
        Some(timestamp) => (timestamp, false),
        None => {
            log::debug!(
                "No capture timestamp in {:?}, falling back to modification time",
                path
            );
            (modified_time(path)?, true)
        }
    };

    Ok(MediaFile {
        path: path.to_path_buf(),
        timestamp,
        timestamp_is_fallback,
        camera_model: fields.camera_model,
        coordinates: fields.coordinates,
        extension,
    })
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

fn modified_time(path: &Path) -> Result<NaiveDateTime, AppError> {
    let modified = std::fs::metadata(path)?.modified()?;
    let datetime: DateTime<Local> = modified.into();
    Ok(datetime.naive_local())
}

const EXIF_DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

fn extract_exif_fields(path: &Path) -> Result<RawFields, AppError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| AppError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let timestamp = EXIF_DATE_TAGS
        .iter()
        .find_map(|tag| string_field(&exif, *tag).and_then(|s| parse_exif_datetime(&s)));
    let camera_model = string_field(&exif, Tag::Model);
    let coordinates = extract_gps(&exif);

    log::trace!(
        "Extracted from {:?}: timestamp {:?}, camera {:?}, gps {:?}",
        path,
        timestamp,
        camera_model,
        coordinates
    );

    Ok(RawFields {
        timestamp,
        camera_model,
        coordinates,
    })
}

fn extract_track_fields(path: &Path) -> Result<RawFields, AppError> {
    let source =
        MediaSource::file_path(path).map_err(|e| AppError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !source.has_track() {
        return Err(AppError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: "no track metadata".to_string(),
        });
    }

    let mut parser = MediaParser::new();
    let info: TrackInfo = parser
        .parse(source)
        .map_err(|e| AppError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let timestamp = info
        .get(TrackInfoTag::CreateDate)
        .and_then(|value| value.as_time())
        .map(|time| time.naive_local())
        .filter(|time| time.and_utc().timestamp() != 0);
    let camera_model = info
        .get(TrackInfoTag::Model)
        .map(|value| value.to_string().trim().to_string())
        .filter(|value| !value.is_empty());
    let coordinates = info
        .get(TrackInfoTag::GpsIso6709)
        .and_then(|value| parse_iso6709(&value.to_string()));

    log::trace!(
        "Extracted from {:?}: timestamp {:?}, camera {:?}, gps {:?}",
        path,
        timestamp,
        camera_model,
        coordinates
    );

    Ok(RawFields {
        timestamp,
        camera_model,
        coordinates,
    })
}

fn string_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let raw = match field.value {
        Value::Ascii(ref parts) if !parts.is_empty() => {
            String::from_utf8_lossy(&parts[0]).into_owned()
        }
        _ => field.display_value().to_string(),
    };
    let cleaned = raw.trim_matches(char::from(0)).trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = raw.trim().trim_matches('"').trim_end_matches(" UTC").trim();
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cleaned, format).ok())?;
    // Epoch dates are placeholders written by cameras with an unset clock.
    if parsed.and_utc().timestamp() == 0 {
        return None;
    }
    Some(parsed)
}

fn extract_gps(exif: &exif::Exif) -> Option<Coordinates> {
    let latitude = gps_axis(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 90.0)?;
    let longitude = gps_axis(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 180.0)?;
    // A zero pair is the usual placeholder when there was no fix.
    if latitude == 0.0 && longitude == 0.0 {
        return None;
    }
    Some(Coordinates {
        latitude,
        longitude,
    })
}

fn gps_axis(exif: &exif::Exif, tag: Tag, ref_tag: Tag, limit: f64) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let parts: Vec<f64> = match field.value {
        Value::Rational(ref rationals) => rationals.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };
    let reference = string_field(exif, ref_tag)?;
    dms_to_degrees(&parts, &reference, limit)
}

fn dms_to_degrees(parts: &[f64], reference: &str, limit: f64) -> Option<f64> {
    let degrees = match parts {
        [] => return None,
        [d] => *d,
        [d, m] => d + m / 60.0,
        [d, m, s, ..] => d + m / 60.0 + s / 3600.0,
    };
    let signed = if matches!(reference, "S" | "W") {
        -degrees
    } else {
        degrees
    };
    // Zero-denominator rationals come out of to_f64 as NaN or infinity.
    if !signed.is_finite() || signed.abs() > limit {
        log::debug!("Rejecting out of range coordinate {}", signed);
        return None;
    }
    Some(signed)
}

fn parse_iso6709(value: &str) -> Option<Coordinates> {
    lazy_static! {
        static ref COORDINATE: Regex = Regex::new(r"[+-]\d+\.\d+").unwrap();
    }
    let mut numbers = COORDINATE
        .find_iter(value)
        .filter_map(|m| m.as_str().parse::<f64>().ok());
    let latitude = numbers.next()?;
    let longitude = numbers.next()?;
    if latitude == 0.0 && longitude == 0.0 {
        return None;
    }
    if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
        return None;
    }
    Some(Coordinates {
        latitude,
        longitude,
    })
}

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub fn build_path(
    timestamp: NaiveDateTime,
    camera: Option<&str>,
    location: Option<&str>,
    extension: &str,
) -> PathBuf {
    let camera = camera.map(sanitize).filter(|c| !c.is_empty());
    let location = location.map(sanitize).filter(|l| !l.is_empty());
    let extension = sanitize(&extension.trim_start_matches('.').to_lowercase());

    let year = timestamp.year();
    let month = timestamp.month();
    let month_folder = format!("{month:02}-{year:04}");

    let mut path = PathBuf::from(format!("{year:04}"));
    path.push(&month_folder);

    let mut name = match &location {
        Some(location) => {
            path.push(format!("{month_folder}-{location}"));
            format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}-{minute:02}-{second:02}_{location}",
                day = timestamp.day(),
                hour = timestamp.hour(),
                minute = timestamp.minute(),
                second = timestamp.second(),
            )
        }
        None => format!(
            "{year:04}{month:02}{day:02}T{hour:02}-{minute:02}-{second:02}",
            day = timestamp.day(),
            hour = timestamp.hour(),
            minute = timestamp.minute(),
            second = timestamp.second(),
        ),
    };
    if let Some(camera) = &camera {
        name.push('_');
        name.push_str(camera);
    }
    if !extension.is_empty() {
        name.push('.');
        name.push_str(&extension);
    }

    path.push(name);
    path
}

// Strips Windows-reserved characters and control characters, turns spaces into
// underscores. The result is always a single path component.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| {
            !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control()
        })
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

pub fn with_discriminator(path: &Path, n: u32) -> PathBuf {
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or_default();
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) => path.with_file_name(format!("{stem}.{n}.{ext}")),
        None => path.with_file_name(format!("{stem}.{n}")),
    }
}

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("Unreadable metadata in {}: {reason}", .path.display())]
    UnreadableMetadata { path: PathBuf, reason: String },

    #[error("Geocoding service returned HTTP {0}")]
    GeocodeStatus(u16),

    #[error("Naming collision with existing {}", .path.display())]
    NamingCollision { path: PathBuf },

    #[error("Writing {} failed: {source}", .path.display())]
    DestinationWrite { path: PathBuf, source: std::io::Error },

    #[error("Removing source {} after move failed: {source}", .path.display())]
    SourceRemoval { path: PathBuf, source: std::io::Error },

    #[error("Setup error: {0}")]
    Setup(String),
}

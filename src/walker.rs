use crate::config::AppConfig;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn collect_media_files(root: &Path, config: &AppConfig) -> Vec<PathBuf> {
    log::info!("Starting file discovery in {}", root.display());
    let allowed_extensions = config.allowed_extensions();
    log::debug!("Configured allowed extensions: {:?}", allowed_extensions);

    let mut files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let path = entry.path();
            log::trace!("Discovered file: {:?}", path);
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if allowed_extensions.contains(&ext.to_lowercase()) {
                    log::debug!("Queueing media file: {:?}", path);
                    files.push(path.to_path_buf());
                } else {
                    log::trace!("Skipping file due to unsupported extension: {:?}", path);
                }
            } else {
                log::trace!("Skipping file with no extension: {:?}", path);
            }
        } else {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
        }
    }

    // Walk order depends on the filesystem, sorting keeps runs reproducible.
    files.sort();

    log::info!("File discovery complete, {} media files found.", files.len());
    files
}

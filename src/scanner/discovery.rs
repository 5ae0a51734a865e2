use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::ImportConfig;
use crate::error::Result;
use crate::model::Medium;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Medium for a path according to the configured extension lists.
pub fn medium_for(path: &Path, config: &ImportConfig) -> Option<Medium> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let listed = |exts: &[String]| exts.iter().any(|e| e.to_lowercase() == ext);
    if listed(&config.photo_extensions) {
        Some(Medium::Photo)
    } else if listed(&config.audio_extensions) {
        Some(Medium::Audio)
    } else if listed(&config.video_extensions) {
        Some(Medium::Video)
    } else {
        None
    }
}

/// Media files under `roots`, skipping dot files and dot directories.
/// A root may also be a single file.
pub fn discover_media(roots: &[PathBuf], config: &ImportConfig) -> Result<Vec<(PathBuf, Medium)>> {
    let mut found = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(medium) = medium_for(path, config) {
                let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                found.push((path, medium));
            }
        }
    }

    found.sort();
    found.dedup_by(|a, b| a.0 == b.0);
    Ok(found)
}

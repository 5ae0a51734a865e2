//! Importing media files into the library.

pub mod discovery;
pub mod metadata;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::config::{Config, ImportConfig};
use crate::db::Database;
use crate::error::Result;
use crate::model::{Asset, Medium};
use crate::tags::{canonical_form, datetime_tags};
use crate::transcoder::Transcoder;

pub use discovery::{discover_media, medium_for};
pub use metadata::MediaMetadata;

const SLUG_LEN: usize = 16;

#[derive(Debug, Clone)]
pub enum ImportProgress {
    Started { total_files: usize },
    Importing { current: usize, total: usize, path: String },
    Completed { imported: usize, skipped: usize, failed: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub total_found: usize,
    pub imported: usize,
    /// Already in the library.
    pub skipped: usize,
    pub failed: usize,
}

/// Stable public identifier for a source path.
pub fn slug_for(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut slug = URL_SAFE_NO_PAD.encode(digest);
    slug.truncate(SLUG_LEN);
    slug
}

/// Tags from the names of the `count` directories closest to the file.
pub fn path_tags(path: &Path, count: usize) -> Vec<String> {
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    parent
        .components()
        .rev()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(canonical_form(&name.to_string_lossy())),
            _ => None,
        })
        .filter(|tag| !tag.is_empty())
        .take(count)
        .collect()
}

pub struct Importer {
    config: ImportConfig,
    ffprobe: Transcoder,
}

impl Importer {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.import.clone(),
            ffprobe: Transcoder::new(&config.tools.ffprobe),
        }
    }

    /// Read everything the library stores about a file, without touching the store.
    pub fn build_asset(&self, path: &Path, medium: Medium, extra_tags: &[String]) -> Asset {
        let mut asset = Asset::new(slug_for(path), medium, path.to_string_lossy());

        let read = match medium {
            Medium::Photo => metadata::photo_metadata(path),
            Medium::Audio | Medium::Video => metadata::probe_metadata(path, &self.ffprobe),
        };
        let meta = read.unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Could not read metadata");
            MediaMetadata::default()
        });

        asset.width = meta.width;
        asset.height = meta.height;
        asset.orientation = meta.orientation;
        asset.duration = meta.duration;
        asset.fps = meta.fps;
        asset.lat = meta.lat;
        asset.lng = meta.lng;
        asset.stamp = meta.stamp.or_else(|| metadata::file_stamp(path));

        asset.tags.extend(extra_tags.iter().map(|t| canonical_form(t)));
        asset.tags.extend(path_tags(path, self.config.path_tags));
        asset.tags.extend(meta.tags);
        if let Some(stamp) = &asset.stamp {
            asset.tags.extend(datetime_tags(stamp));
        }
        asset.tags.retain(|t| !t.is_empty());
        asset
    }

    /// Import every media file under `roots`. Files already in the library
    /// are skipped; a file that fails does not stop the run.
    pub fn import(
        &self,
        roots: &[PathBuf],
        extra_tags: &[String],
        db: &Database,
        progress_tx: Option<mpsc::Sender<ImportProgress>>,
    ) -> Result<ImportResult> {
        let media = discover_media(roots, &self.config)?;
        let total = media.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ImportProgress::Started { total_files: total });
        }

        let mut result = ImportResult {
            total_found: total,
            ..Default::default()
        };

        for (index, (path, medium)) in media.iter().enumerate() {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(ImportProgress::Importing {
                    current: index + 1,
                    total,
                    path: path.to_string_lossy().to_string(),
                });
            }

            if db.slug_exists(&slug_for(path))? {
                result.skipped += 1;
                continue;
            }

            let mut asset = self.build_asset(path, *medium, extra_tags);
            match db.insert_asset(&mut asset) {
                Ok(_) => {
                    tracing::info!(slug = %asset.slug, path = %path.display(), medium = %medium, "Imported");
                    result.imported += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Import failed");
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(ImportProgress::Error {
                            message: format!("Error importing {}: {}", path.display(), e),
                        });
                    }
                    result.failed += 1;
                }
            }
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ImportProgress::Completed {
                imported: result.imported,
                skipped: result.skipped,
                failed: result.failed,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_slug_is_stable_and_url_safe() {
        let a = slug_for(Path::new("/photos/2019/beach.jpg"));
        assert_eq!(a, slug_for(Path::new("/photos/2019/beach.jpg")));
        assert_ne!(a, slug_for(Path::new("/photos/2019/beach2.jpg")));
        assert_eq!(a.len(), SLUG_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_path_tags() {
        let path = Path::new("/photos/Summer Trip/Day 1/img.jpg");
        assert_eq!(path_tags(path, 0), Vec::<String>::new());
        assert_eq!(path_tags(path, 1), vec!["day-1"]);
        assert_eq!(path_tags(path, 5), vec!["day-1", "summer-trip", "photos"]);
    }

    #[test]
    fn test_import_directory() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("Birthday");
        std::fs::create_dir(&album).unwrap();
        RgbImage::from_pixel(8, 6, Rgb([200, 10, 10])).save(album.join("a.png")).unwrap();
        std::fs::write(album.join("notes.txt"), "not media").unwrap();

        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let importer = Importer::new(&Config::default());

        let (tx, rx) = mpsc::channel();
        let roots = vec![dir.path().to_path_buf()];
        let result = importer.import(&roots, &["Party".to_string()], &db, Some(tx)).unwrap();
        assert_eq!(
            result,
            ImportResult { total_found: 1, imported: 1, skipped: 0, failed: 0 }
        );
        assert!(matches!(rx.iter().last(), Some(ImportProgress::Completed { imported: 1, .. })));

        let assets = db.assets("birthday party", &Default::default()).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!((assets[0].width, assets[0].height), (Some(8), Some(6)));
        assert!(assets[0].stamp.is_some());

        let again = importer.import(&roots, &[], &db, None).unwrap();
        assert_eq!(again.skipped, 1);
        assert_eq!(db.count_assets().unwrap(), 1);
    }
}

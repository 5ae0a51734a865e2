//! Bulk export: one directory per format plus an `index.json` manifest.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc;

use super::{export_asset, ExportFormat, ExportOutcome};
use crate::error::Result;
use crate::model::Asset;
use crate::tags::{classify, sort_tags, TagClass};
use crate::tasks::{TaskProgress, WorkerPool};
use crate::transcoder::Transcoder;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub sizes: Vec<String>,
    pub pieces: Vec<Piece>,
    pub tags: Vec<TagCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Piece {
    pub stamp: Option<String>,
    pub img: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
    pub class: TagClass,
}

/// Which tags a manifest exposes.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// Regular expressions matched at the start of a tag; matching tags are hidden.
    pub hide_tags: Vec<String>,
    pub include_metadata: bool,
    pub include_datetime: bool,
    /// Keep tags carried by every exported asset.
    pub include_omnipresent: bool,
}

struct TagFilter {
    hidden: Vec<Regex>,
    metadata: bool,
    datetime: bool,
}

impl TagFilter {
    fn new(options: &ManifestOptions) -> Result<Self> {
        let hidden = options
            .hide_tags
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{pattern})")))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            hidden,
            metadata: options.include_metadata,
            datetime: options.include_datetime,
        })
    }

    fn visible(&self, tag: &str) -> bool {
        let class_ok = match classify(tag) {
            TagClass::User => true,
            TagClass::Metadata => self.metadata,
            TagClass::Datetime => self.datetime,
        };
        class_ok && !self.hidden.iter().any(|re| re.is_match(tag))
    }
}

fn format_stamp(stamp: &NaiveDateTime) -> String {
    stamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Build the manifest for `assets`. Image names follow the first format.
pub fn build_manifest(
    assets: &[Asset],
    formats: &[ExportFormat],
    options: &ManifestOptions,
) -> Result<Manifest> {
    let filter = TagFilter::new(options)?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for asset in assets {
        for tag in asset.tags.iter().filter(|t| filter.visible(t)) {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }
    if !options.include_omnipresent && !assets.is_empty() {
        counts.retain(|_, count| *count < assets.len());
    }

    let fallback = ExportFormat::default();
    let naming = formats.first().unwrap_or(&fallback);
    let pieces = assets
        .iter()
        .map(|asset| {
            let ext = naming.extension_for(asset.medium);
            Piece {
                stamp: asset.stamp.as_ref().map(format_stamp),
                img: format!("{}.{ext}", asset.slug),
                tags: sort_tags(
                    asset
                        .tags
                        .iter()
                        .filter(|t| counts.contains_key(t.as_str()))
                        .cloned(),
                ),
            }
        })
        .collect();

    let tags = sort_tags(counts.keys().copied())
        .into_iter()
        .map(|name| TagCount {
            count: counts[name.as_str()],
            class: classify(&name),
            name,
        })
        .collect();

    tracing::debug!(assets = assets.len(), tags = counts.len(), "Built export manifest");
    Ok(Manifest {
        sizes: formats.iter().map(ExportFormat::size_label).collect(),
        pieces,
        tags,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Export every asset in every format under `root/<size>/` and write
/// `root/index.json`. Individual failures are counted, not fatal.
#[allow(clippy::too_many_arguments)]
pub fn export_bundle(
    assets: &[Asset],
    root: &Path,
    formats: &[ExportFormat],
    options: &ManifestOptions,
    overwrite: bool,
    pool: &WorkerPool,
    transcoder: &Transcoder,
    progress: Option<&mpsc::Sender<TaskProgress>>,
) -> Result<(Manifest, BundleReport)> {
    let manifest = build_manifest(assets, formats, options)?;
    std::fs::create_dir_all(root)?;

    let jobs: Vec<(&Asset, &ExportFormat)> = formats
        .iter()
        .flat_map(|format| assets.iter().map(move |asset| (asset, format)))
        .collect();

    let results = pool.run(
        &jobs,
        |(asset, format)| format!("{} ({})", asset.slug, format.size_label()),
        progress,
        |(asset, format)| {
            let dir = root.join(format.size_label());
            export_asset(asset, &dir, None, format, overwrite, transcoder)
        },
    );

    let mut report = BundleReport::default();
    for result in &results {
        match result {
            Ok(ExportOutcome::Written(_)) => report.written += 1,
            Ok(ExportOutcome::Skipped(_)) => report.skipped += 1,
            Err(_) => report.failed += 1,
        }
    }

    let index = root.join("index.json");
    std::fs::write(&index, serde_json::to_string_pretty(&manifest)?)?;
    tracing::info!(
        root = %root.display(),
        written = report.written,
        skipped = report.skipped,
        failed = report.failed,
        "Bundle export finished"
    );
    Ok((manifest, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Medium;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn asset(slug: &str, tags: &[&str]) -> Asset {
        let mut asset = Asset::new(slug, Medium::Photo, format!("/lib/{slug}.jpg"));
        asset.tags = tags.iter().map(|t| t.to_string()).collect();
        asset
    }

    fn fixture() -> Vec<Asset> {
        let mut first = asset("one", &["trip", "beach", "2019", "kit-x100"]);
        first.stamp = NaiveDate::from_ymd_opt(2019, 7, 4)
            .unwrap()
            .and_hms_opt(9, 30, 0);
        vec![first, asset("two", &["trip", "city", "2019"]), asset("three", &["trip", "private-x"])]
    }

    #[test]
    fn test_manifest_hides_omnipresent_and_generated_tags() {
        let formats: Vec<ExportFormat> = vec!["jpg,200".parse().unwrap(), "jpg,1000".parse().unwrap()];
        let options = ManifestOptions {
            hide_tags: vec!["priv".to_string()],
            ..Default::default()
        };
        let manifest = build_manifest(&fixture(), &formats, &options).unwrap();

        assert_eq!(manifest.sizes, vec!["200x200", "1000x1000"]);
        assert_eq!(manifest.pieces[0].img, "one.jpg");
        assert_eq!(manifest.pieces[0].stamp.as_deref(), Some("2019-07-04T09:30:00"));
        assert_eq!(manifest.pieces[0].tags, vec!["beach"]);
        assert!(manifest.pieces[2].tags.is_empty());

        let names: Vec<&str> = manifest.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["beach", "city"]);
    }

    #[test]
    fn test_manifest_options_widen_tags() {
        let options = ManifestOptions {
            include_metadata: true,
            include_datetime: true,
            include_omnipresent: true,
            ..Default::default()
        };
        let formats: Vec<ExportFormat> = vec!["jpg".parse().unwrap()];
        let manifest = build_manifest(&fixture(), &formats, &options).unwrap();

        assert_eq!(manifest.pieces[0].tags, vec!["2019", "kit-x100", "beach", "trip"]);
        let trip = manifest.tags.iter().find(|t| t.name == "trip").unwrap();
        assert_eq!(trip.count, 3);
        assert_eq!(trip.class, TagClass::User);
        let year = manifest.tags.iter().find(|t| t.name == "2019").unwrap();
        assert_eq!(year.class, TagClass::Datetime);

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["tags"][0]["class"], "datetime");
        assert_eq!(json["pieces"][1]["stamp"], serde_json::Value::Null);
    }

    #[test]
    fn test_bad_hide_pattern_is_an_error() {
        let options = ManifestOptions {
            hide_tags: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(build_manifest(&fixture(), &[], &options).is_err());
    }

    #[test]
    fn test_export_bundle_writes_index_and_counts_failures() {
        let dir = tempdir().unwrap();
        let assets = fixture();
        let formats: Vec<ExportFormat> = vec!["jpg,200".parse().unwrap()];
        std::fs::create_dir_all(dir.path().join("200x200")).unwrap();
        std::fs::write(dir.path().join("200x200").join("one.jpg"), b"done").unwrap();

        let pool = WorkerPool::new(2).unwrap();
        let transcoder = Transcoder::new("/nonexistent/lumio-ffmpeg");
        let (manifest, report) = export_bundle(
            &assets,
            dir.path(),
            &formats,
            &ManifestOptions::default(),
            false,
            &pool,
            &transcoder,
            None,
        )
        .unwrap();

        assert_eq!(report, BundleReport { written: 0, skipped: 1, failed: 2 });
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("index.json")).unwrap())
                .unwrap();
        assert_eq!(written, serde_json::to_value(&manifest).unwrap());
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub hashing: HashingConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_photo_extensions")]
    pub photo_extensions: Vec<String>,

    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// How many parent directory names become tags on import.
    #[serde(default = "default_path_tags")]
    pub path_tags: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_photo_extensions() -> Vec<String> {
    strings(&["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "bmp"])
}

fn default_audio_extensions() -> Vec<String> {
    strings(&["mp3", "wav", "flac", "ogg", "m4a", "opus"])
}

fn default_video_extensions() -> Vec<String> {
    strings(&["mp4", "mov", "m4v", "mkv", "webm", "avi", "mts"])
}

fn default_path_tags() -> usize {
    1
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            photo_extensions: default_photo_extensions(),
            audio_extensions: default_audio_extensions(),
            video_extensions: default_video_extensions(),
            path_tags: default_path_tags(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Difference hash sizes computed for photos.
    #[serde(default = "default_photo_sizes")]
    pub photo_sizes: Vec<u32>,

    #[serde(default = "default_histogram_sizes")]
    pub histogram_sizes: Vec<u32>,

    /// Seconds between temporal hashes of audio and video.
    #[serde(default = "default_stride")]
    pub stride: f64,

    #[serde(default = "default_temporal_size")]
    pub temporal_size: u32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_photo_sizes() -> Vec<u32> {
    vec![4, 8, 16]
}

fn default_histogram_sizes() -> Vec<u32> {
    vec![4, 8, 16]
}

fn default_stride() -> f64 {
    10.0
}

fn default_temporal_size() -> u32 {
    8
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            photo_sizes: default_photo_sizes(),
            histogram_sizes: default_histogram_sizes(),
            stride: default_stride(),
            temporal_size: default_temporal_size(),
            sample_rate: default_sample_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_method")]
    pub method: String,

    /// Maximum number of differing bits for content neighbors.
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,

    /// Minimum tag-overlap score for related assets.
    #[serde(default = "default_tag_threshold")]
    pub tag_threshold: f64,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_method() -> String {
    "dhash-8".to_string()
}

fn default_max_distance() -> usize {
    3
}

fn default_tag_threshold() -> f64 {
    0.2
}

fn default_limit() -> usize {
    20
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            max_distance: default_max_distance(),
            tag_threshold: default_tag_threshold(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_format")]
    pub format: String,

    /// Worker threads for bulk work; 0 lets rayon decide.
    #[serde(default)]
    pub threads: usize,

    #[serde(default)]
    pub overwrite: bool,

    /// Regular expressions for tags left out of export manifests.
    #[serde(default)]
    pub hide_tags: Vec<String>,
}

fn default_format() -> String {
    "jpg,1920x1080".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            threads: 0,
            overwrite: false,
            hide_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lumio")
        .join("lumio.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            import: ImportConfig::default(),
            hashing: HashingConfig::default(),
            similarity: SimilarityConfig::default(),
            export: ExportConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load from `LUMIO_CONFIG` or the default location, writing defaults on
    /// first run.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("LUMIO_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumio")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/lib.db"

            [similarity]
            max_distance = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/lib.db"));
        assert_eq!(config.similarity.max_distance, 5);
        assert_eq!(config.similarity.method, "dhash-8");
        assert_eq!(config.hashing.photo_sizes, vec![4, 8, 16]);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.export.hide_tags = vec!["^kit-".to_string()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.export.hide_tags, vec!["^kit-"]);
        assert_eq!(loaded.hashing.stride, 10.0);
    }
}

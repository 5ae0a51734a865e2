//! Rendering assets to output files through the transcoder.
//!
//! An export is described by an [`ExportFormat`] such as `mp4,1280x720,crf=28`.
//! [`plan_export`] turns an asset plus a format into the exact transcoder
//! invocations; [`export_asset`] runs them unless the target already exists.

pub mod manifest;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::filters::graph::{compile_filter_graph, replay_asset, scale_filter};
use crate::model::{Asset, Medium};
use crate::transcoder::Transcoder;

pub use manifest::{build_manifest, export_bundle, BundleReport, Manifest, ManifestOptions};

const GIF_PALETTE: &str = "split[u][q];[u]fifo[v];[q]palettegen[p];[v][p]paletteuse";

/// Output file settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFormat {
    /// Output extension. Empty means the medium's default.
    pub ext: String,
    /// Bounding box the output must fit in, aspect ratio preserved.
    pub bbox: Option<(u32, u32)>,
    /// Frame rate, either plain (`10`) or rational (`30000/1001`).
    pub fps: Option<String>,
    pub ar: Option<u32>,
    pub ac: Option<u32>,
    pub crf: Option<u32>,
    pub quality: Option<u32>,
    pub speed: Option<u32>,
    /// Audio bitrate in kbit/s.
    pub abr: Option<u32>,
    /// Video bitrate in kbit/s.
    pub vbr: Option<u32>,
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::InvalidFormat(format!("{key}={value}")))
}

fn parse_bbox(part: &str) -> Option<(u32, u32)> {
    match part.split_once('x') {
        Some((w, h)) => Some((w.parse().ok()?, h.parse().ok()?)),
        None => part.parse().ok().map(|n| (n, n)),
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut format = ExportFormat::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some((key, value)) = part.split_once('=') {
                let slot = match key {
                    "fps" => {
                        format.fps = Some(value.to_string());
                        continue;
                    }
                    "bbox" => {
                        format.bbox = Some(
                            parse_bbox(value)
                                .ok_or_else(|| Error::InvalidFormat(part.to_string()))?,
                        );
                        continue;
                    }
                    "ext" => {
                        format.ext = value.to_lowercase();
                        continue;
                    }
                    "ar" => &mut format.ar,
                    "ac" => &mut format.ac,
                    "crf" => &mut format.crf,
                    "quality" => &mut format.quality,
                    "speed" => &mut format.speed,
                    "abr" => &mut format.abr,
                    "vbr" => &mut format.vbr,
                    _ => return Err(Error::InvalidFormat(format!("unknown key {key:?}"))),
                };
                *slot = Some(parse_number(key, value)?);
            } else if part.starts_with(|c: char| c.is_ascii_digit()) {
                format.bbox =
                    Some(parse_bbox(part).ok_or_else(|| Error::InvalidFormat(part.to_string()))?);
            } else if part.chars().all(|c| c.is_ascii_alphanumeric()) {
                format.ext = part.to_lowercase();
            } else {
                return Err(Error::InvalidFormat(part.to_string()));
            }
        }
        Ok(format)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.ext.is_empty() {
            parts.push(self.ext.clone());
        }
        if let Some((w, h)) = self.bbox {
            parts.push(format!("{w}x{h}"));
        }
        if let Some(fps) = &self.fps {
            parts.push(format!("fps={fps}"));
        }
        for (key, value) in self.numeric_args() {
            parts.push(format!("{key}={value}"));
        }
        for (key, value) in [("abr", self.abr), ("vbr", self.vbr)] {
            if let Some(value) = value {
                parts.push(format!("{key}={value}"));
            }
        }
        f.write_str(&parts.join(","))
    }
}

impl ExportFormat {
    /// Extension used for an asset of `medium`.
    pub fn extension_for(&self, medium: Medium) -> &str {
        if !self.ext.is_empty() {
            return &self.ext;
        }
        match medium {
            Medium::Photo => "jpg",
            Medium::Audio => "mp3",
            Medium::Video => "mp4",
        }
    }

    /// Directory name for this format in a bulk export.
    pub fn size_label(&self) -> String {
        if let Some((w, h)) = self.bbox {
            format!("{w}x{h}")
        } else if let Some(fps) = &self.fps {
            fps.replace('/', "_")
        } else if let Some(abr) = self.abr {
            format!("{abr}k")
        } else {
            "media".to_string()
        }
    }

    fn numeric_args(&self) -> Vec<(&'static str, u32)> {
        [
            ("ar", self.ar),
            ("ac", self.ac),
            ("crf", self.crf),
            ("quality", self.quality),
            ("speed", self.speed),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }
}

/// Container-specific encoder arguments, looked up by output extension.
pub fn encoder_args(ext: &str) -> &'static [&'static str] {
    match ext {
        "mp4" => &[
            "-c:v",
            "h264_nvenc",
            "-level:v",
            "4.1",
            "-profile:v",
            "main",
            "-rc:v",
            "vbr_hq",
            "-rc-lookahead:v",
            "32",
            "-c:a",
            "aac",
            "-pix_fmt",
            "yuv420p",
        ],
        "webm" => &["-c:v", "libvpx-vp9", "-c:a", "libopus", "-row-mt", "1"],
        _ => &[],
    }
}

/// Transcoder invocations producing one export, run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodePlan {
    pub commands: Vec<Vec<String>>,
}

fn strings<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

/// Work out the transcoder commands that render `asset` to `output`.
pub fn plan_export(asset: &Asset, output: &Path, format: &ExportFormat) -> Result<TranscodePlan> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| format.extension_for(asset.medium).to_string());

    let replay = replay_asset(asset);
    let mut filters = replay.filters;
    if let Some((w, h)) = format.bbox {
        filters.push(scale_filter(w, h));
    }
    if let Some(fps) = &format.fps {
        filters.push(format!("fps={fps}"));
    }

    let mut base = strings(["-y", "-i", asset.path.as_str()]);
    for (key, value) in format.numeric_args() {
        base.push(format!("-{key}"));
        base.push(value.to_string());
    }
    let target = output.display().to_string();

    let duration = asset.duration.unwrap_or(0.0);
    let middle = duration / 2.0;

    if asset.is_audio() && ext == "png" {
        let (w, h) = format
            .bbox
            .ok_or_else(|| Error::InvalidFormat("spectrogram export needs a size".to_string()))?;
        let trim = format!("atrim={}:{}", (middle - 30.0).max(0.0), (middle + 30.0).min(duration));
        let spectrum = format!("showspectrumpic=s={w}x{h}:color=viridis:scale=log:fscale=log");
        let mut cmd = base;
        cmd.extend([
            "-af".to_string(),
            format!("{trim},{spectrum}"),
            target,
        ]);
        return Ok(TranscodePlan { commands: vec![cmd] });
    }

    if asset.is_video() && (ext == "gif" || ext == "webp") {
        let mut clip = base;
        clip.extend([
            "-ss".to_string(),
            (middle - 5.0).max(0.0).to_string(),
            "-t".to_string(),
            "10".to_string(),
            "-an".to_string(),
            "-vf".to_string(),
        ]);
        let chain = |extra: Option<&str>| {
            let mut all: Vec<&str> = filters.iter().map(String::as_str).collect();
            all.extend(extra);
            if all.is_empty() {
                "null".to_string()
            } else {
                all.join(",")
            }
        };

        let poster = output.with_extension("png").display().to_string();
        let mut still = clip.clone();
        still.extend([chain(None), "-frames:v".to_string(), "1".to_string(), poster]);

        let mut animation = clip;
        if ext == "gif" {
            animation.push(chain(Some(GIF_PALETTE)));
        } else {
            animation.extend([chain(None), "-codec:v".to_string(), "libwebp".to_string()]);
        }
        animation.extend(["-loop".to_string(), "0".to_string(), target]);
        return Ok(TranscodePlan {
            commands: vec![still, animation],
        });
    }

    let graph = compile_filter_graph(
        asset.medium.has_video(),
        asset.medium.has_audio(),
        &replay.slices,
        &filters,
    );

    let mut cmd = base;
    if !graph.is_empty() {
        cmd.extend([
            "-filter_complex".to_string(),
            graph.render(),
            "-map".to_string(),
            graph.video_pad(),
            "-map".to_string(),
            graph.audio_pad(),
        ]);
    }
    if let Some(abr) = format.abr {
        cmd.extend(["-b:a".to_string(), format!("{abr}k")]);
    }
    if let Some(vbr) = format.vbr {
        cmd.extend(["-b:v".to_string(), format!("{vbr}k")]);
    }
    cmd.extend(strings(encoder_args(&ext).iter().copied()));
    cmd.extend(strings(["-avoid_negative_ts", "1", "-g", "240"]));
    cmd.push(target);

    Ok(TranscodePlan { commands: vec![cmd] })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(PathBuf),
    /// The target existed and overwriting was not requested.
    Skipped(PathBuf),
}

impl ExportOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ExportOutcome::Written(path) | ExportOutcome::Skipped(path) => path,
        }
    }
}

/// Export one asset to `dir/<basename>.<ext>`, where the basename defaults to
/// the slug. Existing targets are left alone unless `overwrite` is set.
pub fn export_asset(
    asset: &Asset,
    dir: &Path,
    basename: Option<&str>,
    format: &ExportFormat,
    overwrite: bool,
    transcoder: &Transcoder,
) -> Result<ExportOutcome> {
    let name = basename.unwrap_or(&asset.slug);
    let output = dir.join(format!("{name}.{}", format.extension_for(asset.medium)));

    if output.exists() && !overwrite {
        tracing::debug!(slug = %asset.slug, path = %output.display(), "Export exists, skipping");
        return Ok(ExportOutcome::Skipped(output));
    }

    std::fs::create_dir_all(dir)?;
    let plan = plan_export(asset, &output, format)?;
    let source = Path::new(&asset.path);
    for command in &plan.commands {
        transcoder.run(source, command)?;
    }

    tracing::info!(slug = %asset.slug, path = %output.display(), format = %format, "Exported asset");
    Ok(ExportOutcome::Written(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterOp;
    use tempfile::tempdir;

    #[test]
    fn test_parse_format() {
        let format: ExportFormat = "mp4,1280x720,fps=30000/1001,crf=28,abr=128".parse().unwrap();
        assert_eq!(format.ext, "mp4");
        assert_eq!(format.bbox, Some((1280, 720)));
        assert_eq!(format.fps.as_deref(), Some("30000/1001"));
        assert_eq!(format.crf, Some(28));
        assert_eq!(format.abr, Some(128));
        assert_eq!(format.to_string(), "mp4,1280x720,fps=30000/1001,crf=28,abr=128");
        assert_eq!(format.size_label(), "1280x720");

        let square: ExportFormat = "500".parse().unwrap();
        assert_eq!(square.bbox, Some((500, 500)));
        assert_eq!(square.extension_for(Medium::Audio), "mp3");
        assert_eq!(square.extension_for(Medium::Photo), "jpg");

        assert!("mp4,crf=high".parse::<ExportFormat>().is_err());
        assert!("mp4,color=red".parse::<ExportFormat>().is_err());
        assert!("mp4,10xtall".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_size_label_fallbacks() {
        let fps: ExportFormat = "gif,fps=10".parse().unwrap();
        assert_eq!(fps.size_label(), "10");
        let abr: ExportFormat = "mp3,abr=96".parse().unwrap();
        assert_eq!(abr.size_label(), "96k");
        assert_eq!(ExportFormat::default().size_label(), "media");
    }

    #[test]
    fn test_plan_photo() {
        let mut asset = Asset::new("abc", Medium::Photo, "/lib/a.jpg");
        asset.width = Some(400);
        asset.height = Some(300);
        asset.filters.add(&FilterOp::Hflip).unwrap();

        let format: ExportFormat = "jpg,200x200".parse().unwrap();
        let plan = plan_export(&asset, Path::new("/out/abc.jpg"), &format).unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(
            plan.commands[0].join(" "),
            "-y -i /lib/a.jpg -filter_complex \
             [0:v]hflip,scale=200:200:force_original_aspect_ratio=decrease:flags=lanczos[filtv] \
             -map [filtv] -map 0:a? -avoid_negative_ts 1 -g 240 /out/abc.jpg"
        );
    }

    #[test]
    fn test_plan_audio_spectrogram() {
        let mut asset = Asset::new("snd", Medium::Audio, "/lib/s.mp3");
        asset.duration = Some(100.0);

        let format: ExportFormat = "png,800x200".parse().unwrap();
        let plan = plan_export(&asset, Path::new("/out/snd.png"), &format).unwrap();
        assert_eq!(
            plan.commands[0],
            vec![
                "-y",
                "-i",
                "/lib/s.mp3",
                "-af",
                "atrim=20:80,showspectrumpic=s=800x200:color=viridis:scale=log:fscale=log",
                "/out/snd.png",
            ]
        );

        let no_size: ExportFormat = "png".parse().unwrap();
        assert!(matches!(
            plan_export(&asset, Path::new("/out/snd.png"), &no_size),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_plan_video_gif_makes_poster_and_palette() {
        let mut asset = Asset::new("vid", Medium::Video, "/lib/v.mp4");
        asset.duration = Some(6.0);

        let format: ExportFormat = "gif".parse().unwrap();
        let plan = plan_export(&asset, Path::new("/out/vid.gif"), &format).unwrap();
        assert_eq!(plan.commands.len(), 2);
        assert_eq!(
            plan.commands[0].join(" "),
            "-y -i /lib/v.mp4 -ss 0 -t 10 -an -vf null -frames:v 1 /out/vid.png"
        );
        assert_eq!(
            plan.commands[1].join(" "),
            format!("-y -i /lib/v.mp4 -ss 0 -t 10 -an -vf {GIF_PALETTE} -loop 0 /out/vid.gif")
        );
    }

    #[test]
    fn test_plan_video_with_cuts_uses_presets() {
        let mut asset = Asset::new("vid", Medium::Video, "/lib/v.mov");
        asset.width = Some(1920);
        asset.height = Some(1080);
        asset.duration = Some(60.0);
        asset
            .filters
            .add(&FilterOp::Cut { start: Some(10.0), duration: Some(5.0) })
            .unwrap();

        let format: ExportFormat = "mp4,crf=23,vbr=2000".parse().unwrap();
        let plan = plan_export(&asset, Path::new("/out/vid.mp4"), &format).unwrap();
        let cmd = plan.commands[0].join(" ");
        assert!(cmd.starts_with("-y -i /lib/v.mov -crf 23 -filter_complex "));
        assert!(cmd.contains("[1v][1a]concat=n=1:v=1:a=1[outv][outa]"));
        assert!(cmd.contains("-map [outv] -map [outa] -b:v 2000k -c:v h264_nvenc"));
        assert!(cmd.ends_with("-pix_fmt yuv420p -avoid_negative_ts 1 -g 240 /out/vid.mp4"));
    }

    #[test]
    fn test_export_asset_skips_existing() {
        let dir = tempdir().unwrap();
        let asset = Asset::new("abc", Medium::Photo, "/lib/a.jpg");
        std::fs::write(dir.path().join("abc.jpg"), b"old").unwrap();

        let transcoder = Transcoder::new("/nonexistent/lumio-ffmpeg");
        let format = ExportFormat::default();
        let outcome = export_asset(&asset, dir.path(), None, &format, false, &transcoder).unwrap();
        assert_eq!(outcome, ExportOutcome::Skipped(dir.path().join("abc.jpg")));

        let err = export_asset(&asset, dir.path(), None, &format, true, &transcoder).unwrap_err();
        assert!(matches!(err, Error::Processing { .. }));
    }
}

//! Replaying edit operations and compiling them into a transcoder filter graph.

use std::fmt;

use super::geometry::{crop_after_rotate, CropBox, Geometry};
use super::FilterOp;
use crate::model::Asset;

/// A `(start, duration)` segment taken from the source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub start: f64,
    pub duration: f64,
}

impl Slice {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Outcome of replaying an operation list.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub slices: Vec<Slice>,
    pub filters: Vec<String>,
    pub geometry: Geometry,
}

/// Operations that bring a photo with the given EXIF orientation upright.
pub fn orientation_ops(code: u8) -> Vec<FilterOp> {
    use FilterOp::{Hflip, Transpose, Vflip};
    match code {
        2 => vec![Hflip],
        3 => vec![Hflip, Vflip],
        4 => vec![Vflip],
        5 => vec![Transpose],
        6 => vec![Transpose, Hflip],
        7 => vec![Transpose, Hflip, Vflip],
        8 => vec![Transpose, Vflip],
        _ => Vec::new(),
    }
}

pub fn scale_filter(width: u32, height: u32) -> String {
    format!("scale={width}:{height}:force_original_aspect_ratio=decrease:flags=lanczos")
}

fn crop_filter(rect: &CropBox) -> String {
    format!("crop={}:{}:{}:{}", rect.width, rect.height, rect.x, rect.y)
}

fn rotate_filter(radians: f64) -> String {
    format!("rotate={radians}:ow=rotw({radians}):oh=roth({radians})")
}

/// Seven-point S-curve: `x^ratio` below the midpoint, mirrored above it.
fn sigmoid_curve(ratio: f64) -> String {
    fn curve(x: f64, ratio: f64) -> f64 {
        if x < 0.5 {
            x.powf(ratio)
        } else if x > 0.5 {
            1.0 - curve(1.0 - x, ratio)
        } else {
            0.5
        }
    }
    [0.0, 0.1, 0.3, 0.5, 0.7, 0.9, 1.0]
        .iter()
        .map(|&x| format!("{x}/{}", curve(x, ratio)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replay operations in order against a starting geometry.
pub fn replay(ops: &[FilterOp], initial: Geometry) -> Replay {
    let mut geometry = initial;
    let mut slices = Vec::new();
    let mut filters = Vec::new();

    for op in ops {
        match *op {
            FilterOp::Rotate { degrees } => {
                filters.push(rotate_filter(degrees.to_radians()));
                let rect = crop_after_rotate(geometry.width, geometry.height, degrees);
                if degrees % 90.0 != 0.0 {
                    filters.push(crop_filter(&rect));
                }
                geometry.width = rect.width;
                geometry.height = rect.height;
            }
            FilterOp::Crop { x1, y1, x2, y2 } => {
                let rect = geometry.crop_fraction(x1, y1, x2, y2);
                filters.push(crop_filter(&rect));
            }
            FilterOp::Scale { factor } => {
                let (w, h) = geometry.scale(factor);
                filters.push(scale_filter(w, h));
            }
            FilterOp::Cut { start, duration } => {
                let (start, duration) = geometry.cut(start, duration);
                slices.push(Slice { start, duration });
            }
            FilterOp::Saturation { percent } => filters.push(format!("hue=s={}", percent / 100.0)),
            FilterOp::Brightness { percent } => {
                filters.push(format!("hue=b={}", percent / 100.0 - 1.0))
            }
            FilterOp::Contrast { percent } => {
                filters.push(format!("curves=m='{}'", sigmoid_curve(percent / 100.0)))
            }
            FilterOp::Hue { degrees } => filters.push(format!("hue=h={degrees}")),
            FilterOp::Autocontrast { percent } => {
                filters.push(format!("histeq=strength={}", percent / 100.0))
            }
            FilterOp::Hflip => filters.push("hflip".to_string()),
            FilterOp::Vflip => filters.push("vflip".to_string()),
            FilterOp::Transpose => {
                geometry.transpose();
                filters.push("transpose".to_string());
            }
            FilterOp::Fps { fps } => filters.push(format!("fps={fps}")),
        }
    }

    Replay {
        slices,
        filters,
        geometry,
    }
}

/// Replay an asset's stored operations, preceded by auto-orientation for photos.
pub fn replay_asset(asset: &Asset) -> Replay {
    let mut ops = match (asset.is_photo(), asset.orientation) {
        (true, Some(code)) => orientation_ops(code),
        _ => Vec::new(),
    };
    ops.extend(asset.filters.ops());

    let initial = Geometry::new(
        asset.width.unwrap_or(0),
        asset.height.unwrap_or(0),
        asset.duration.unwrap_or(0.0),
    );
    replay(&ops, initial)
}

/// One `[in]filter,filter[out]` chain of a filter graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<String>,
    pub outputs: Vec<String>,
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        f.write_str(&self.filters.join(","))?;
        for output in &self.outputs {
            write!(f, "[{output}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn last_pad(&self, suffix: char) -> Option<String> {
        self.chains
            .iter()
            .flat_map(|chain| chain.outputs.iter())
            .filter(|pad| pad.ends_with(suffix))
            .last()
            .map(|pad| format!("[{pad}]"))
    }

    /// Pad to map as the video output, or the optional source stream.
    pub fn video_pad(&self) -> String {
        self.last_pad('v').unwrap_or_else(|| "0:v?".to_string())
    }

    pub fn audio_pad(&self) -> String {
        self.last_pad('a').unwrap_or_else(|| "0:a?".to_string())
    }

    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Build the graph for a replay: one trim per slice and stream, a concat
/// joining them, then the remaining filters on the video output.
pub fn compile_filter_graph(
    use_video: bool,
    use_audio: bool,
    slices: &[Slice],
    filters: &[String],
) -> FilterGraph {
    let mut chains = Vec::new();
    let mut pads = Vec::new();

    for (i, slice) in slices.iter().enumerate() {
        if use_video {
            let pad = format!("{}v", i + 1);
            chains.push(FilterChain {
                inputs: vec!["0:v".to_string()],
                filters: vec![
                    format!("trim={}:{}", slice.start, slice.end()),
                    "setpts=PTS-STARTPTS".to_string(),
                    "format=yuv420p".to_string(),
                ],
                outputs: vec![pad.clone()],
            });
            pads.push(pad);
        }
        if use_audio {
            let pad = format!("{}a", i + 1);
            chains.push(FilterChain {
                inputs: vec!["0:a".to_string()],
                filters: vec![
                    format!("atrim={}:{}", slice.start, slice.end()),
                    "asetpts=PTS-STARTPTS".to_string(),
                ],
                outputs: vec![pad.clone()],
            });
            pads.push(pad);
        }
    }

    let concatenated = !pads.is_empty();
    if concatenated {
        let mut outputs = Vec::new();
        if use_video {
            outputs.push("outv".to_string());
        }
        if use_audio {
            outputs.push("outa".to_string());
        }
        chains.push(FilterChain {
            inputs: pads,
            filters: vec![format!(
                "concat=n={}:v={}:a={}",
                slices.len(),
                use_video as u8,
                use_audio as u8
            )],
            outputs,
        });
    }

    if !filters.is_empty() {
        if use_video {
            let source = if concatenated { "outv" } else { "0:v" };
            chains.push(FilterChain {
                inputs: vec![source.to_string()],
                filters: filters.to_vec(),
                outputs: vec!["filtv".to_string()],
            });
        } else {
            tracing::debug!(count = filters.len(), "Dropping video filters for audio-only output");
        }
    }

    FilterGraph { chains }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Medium;

    #[test]
    fn test_replay_rotate_adds_crop_and_shrinks_frame() {
        let out = replay(&[FilterOp::Rotate { degrees: 30.0 }], Geometry::new(100, 50, 0.0));
        assert_eq!(out.filters.len(), 2);
        assert!(out.filters[0].starts_with("rotate=0.523598"));
        assert!(out.filters[0].contains(":ow=rotw("));
        assert_eq!(out.filters[1], "crop=50:28:30:32");
        assert_eq!((out.geometry.width, out.geometry.height), (50, 28));

        let right = replay(&[FilterOp::Rotate { degrees: 90.0 }], Geometry::new(100, 50, 0.0));
        assert_eq!(right.filters.len(), 1);
        assert_eq!((right.geometry.width, right.geometry.height), (50, 100));
    }

    #[test]
    fn test_replay_order_matters() {
        let crop = FilterOp::Crop { x1: 0.0, y1: 0.0, x2: 0.5, y2: 1.0 };
        let scale = FilterOp::Scale { factor: 0.5 };

        let a = replay(&[crop.clone(), scale.clone()], Geometry::new(400, 200, 0.0));
        let b = replay(&[scale, crop], Geometry::new(400, 200, 0.0));
        assert_eq!((a.geometry.width, a.geometry.height), (100, 100));
        assert_eq!((b.geometry.width, b.geometry.height), (100, 100));
        assert_eq!(a.filters[0], "crop=200:200:0:0");
        assert_eq!(b.filters[1], "crop=100:100:0:0");
    }

    #[test]
    fn test_replay_color_ops() {
        let out = replay(
            &[
                FilterOp::Saturation { percent: 150.0 },
                FilterOp::Brightness { percent: 120.0 },
                FilterOp::Hue { degrees: 30.0 },
                FilterOp::Autocontrast { percent: 50.0 },
                FilterOp::Fps { fps: 12.0 },
            ],
            Geometry::new(10, 10, 0.0),
        );
        assert_eq!(
            out.filters,
            vec![
                "hue=s=1.5",
                "hue=b=0.19999999999999996",
                "hue=h=30",
                "histeq=strength=0.5",
                "fps=12",
            ]
        );
    }

    #[test]
    fn test_contrast_curve_is_symmetric() {
        let out = replay(&[FilterOp::Contrast { percent: 100.0 }], Geometry::new(10, 10, 0.0));
        assert_eq!(out.filters[0], "curves=m='0/0 0.1/0.1 0.3/0.3 0.5/0.5 0.7/0.7 0.9/0.9 1/1'");
    }

    #[test]
    fn test_auto_orient_prepends_ops() {
        let mut asset = Asset::new("p", Medium::Photo, "/p.jpg");
        asset.width = Some(400);
        asset.height = Some(300);
        asset.orientation = Some(6);
        asset.filters.add(&FilterOp::Vflip).unwrap();

        let out = replay_asset(&asset);
        assert_eq!(out.filters, vec!["transpose", "hflip", "vflip"]);
        assert_eq!((out.geometry.width, out.geometry.height), (300, 400));

        asset.medium = Medium::Video;
        assert_eq!(replay_asset(&asset).filters, vec!["vflip"]);
    }

    #[test]
    fn test_graph_with_slices() {
        let out = replay(
            &[
                FilterOp::Cut { start: Some(5.0), duration: Some(10.0) },
                FilterOp::Cut { start: Some(30.0), duration: None },
                FilterOp::Hflip,
            ],
            Geometry::new(640, 480, 60.0),
        );
        assert_eq!(
            out.slices,
            vec![Slice { start: 5.0, duration: 10.0 }, Slice { start: 30.0, duration: 20.0 }]
        );

        let graph = compile_filter_graph(true, true, &out.slices, &out.filters);
        assert_eq!(
            graph.render(),
            "[0:v]trim=5:15,setpts=PTS-STARTPTS,format=yuv420p[1v];\
             [0:a]atrim=5:15,asetpts=PTS-STARTPTS[1a];\
             [0:v]trim=30:50,setpts=PTS-STARTPTS,format=yuv420p[2v];\
             [0:a]atrim=30:50,asetpts=PTS-STARTPTS[2a];\
             [1v][1a][2v][2a]concat=n=2:v=1:a=1[outv][outa];\
             [outv]hflip[filtv]"
        );
        assert_eq!(graph.video_pad(), "[filtv]");
        assert_eq!(graph.audio_pad(), "[outa]");
    }

    #[test]
    fn test_graph_without_slices() {
        let graph = compile_filter_graph(true, false, &[], &["hflip".to_string()]);
        assert_eq!(graph.render(), "[0:v]hflip[filtv]");
        assert_eq!(graph.audio_pad(), "0:a?");

        let empty = compile_filter_graph(true, true, &[], &[]);
        assert!(empty.is_empty());
        assert_eq!(empty.video_pad(), "0:v?");

        let audio = compile_filter_graph(false, true, &[Slice { start: 0.0, duration: 3.0 }], &["hflip".into()]);
        assert_eq!(
            audio.render(),
            "[0:a]atrim=0:3,asetpts=PTS-STARTPTS[1a];[1a]concat=n=1:v=0:a=1[outa]"
        );
    }
}

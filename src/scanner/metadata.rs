use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::Result;
use crate::model::parse_stamp;
use crate::tags::canonical_form;
use crate::transcoder::Transcoder;

const CAMERA_WORDS: [&str; 7] = ["canon", "nikon", "kodak", "digital", "camera", "super", "powershot"];

/// Facts read from a media file on import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Option<u8>,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub stamp: Option<NaiveDateTime>,
    /// Camera kit, aperture, focal length and ISO tags.
    pub tags: Vec<String>,
}

fn rational(field: &exif::Field) -> Option<f64> {
    match field.value {
        exif::Value::Rational(ref v) => v.first().map(|r| r.num as f64 / r.denom as f64),
        _ => None,
    }
}

fn unsigned(field: &exif::Field) -> Option<u32> {
    field.value.get_uint(0)
}

fn text(field: &exif::Field) -> String {
    field.display_value().to_string().trim_matches('"').trim().to_string()
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

/// Round to one significant digit, leaving values under 10 alone.
fn round_to_leading_digit(value: f64) -> u32 {
    let n = value as u32;
    if n < 10 {
        return n;
    }
    let shift = 10u32.pow(n.ilog10());
    ((n as f64 / shift as f64).round() as u32) * shift
}

/// Camera kit tag from a model name with maker words stripped.
pub fn kit_tag(model: &str) -> Option<String> {
    let mut words: Vec<String> = model
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !CAMERA_WORDS.contains(w))
        .map(str::to_string)
        .collect();
    if let Some(last) = words.last_mut() {
        for suffix in ["ed", "is"] {
            if let Some(stripped) = last.strip_suffix(suffix) {
                *last = stripped.to_string();
            }
        }
    }
    let model = canonical_form(&words.join(" "));
    (!model.is_empty()).then(|| format!("kit-{model}"))
}

pub fn aperture_tag(fnumber: f64) -> String {
    canonical_form(&format!("f/{}", (fnumber * 10.0).round() / 10.0))
}

pub fn focal_length_tag(mm: f64) -> String {
    format!("{}mm", round_to_leading_digit(mm))
}

fn read_exif(path: &Path, metadata: &mut MediaMetadata) {
    let Ok(file) = File::open(path) else {
        return;
    };
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::trace!(path = %path.display(), error = %e, "No EXIF data");
            return;
        }
    };
    let field = |tag| exif.get_field(tag, exif::In::PRIMARY);

    metadata.orientation = field(exif::Tag::Orientation)
        .and_then(unsigned)
        .and_then(|o| u8::try_from(o).ok())
        .filter(|o| (1..=8).contains(o));

    if let Some(stamp) = field(exif::Tag::DateTimeOriginal)
        .or_else(|| field(exif::Tag::DateTime))
        .and_then(|f| parse_stamp(&text(f)))
    {
        metadata.stamp = Some(stamp);
    }

    if let Some(model) = field(exif::Tag::Model).map(text) {
        metadata.tags.extend(kit_tag(&model));
    }
    if let Some(fnumber) = field(exif::Tag::FNumber).and_then(rational) {
        metadata.tags.push(aperture_tag(fnumber));
    }
    let focal = field(exif::Tag::FocalLengthIn35mmFilm)
        .and_then(unsigned)
        .map(f64::from)
        .or_else(|| field(exif::Tag::FocalLength).and_then(rational));
    if let Some(mm) = focal.filter(|mm| *mm > 0.0) {
        metadata.tags.push(focal_length_tag(mm));
    }
    if let Some(iso) = field(exif::Tag::PhotographicSensitivity).and_then(unsigned) {
        metadata.tags.push(format!("iso-{iso}"));
    }

    if let (Some(lat), Some(lat_ref), Some(lng), Some(lng_ref)) = (
        field(exif::Tag::GPSLatitude),
        field(exif::Tag::GPSLatitudeRef),
        field(exif::Tag::GPSLongitude),
        field(exif::Tag::GPSLongitudeRef),
    ) {
        if let (exif::Value::Rational(lat_vals), exif::Value::Rational(lng_vals)) =
            (&lat.value, &lng.value)
        {
            if lat_vals.len() >= 3 && lng_vals.len() >= 3 {
                let lat = dms_to_decimal(lat_vals[0].to_f64(), lat_vals[1].to_f64(), lat_vals[2].to_f64());
                let lng = dms_to_decimal(lng_vals[0].to_f64(), lng_vals[1].to_f64(), lng_vals[2].to_f64());
                metadata.lat = Some(if text(lat_ref).contains('S') { -lat } else { lat });
                metadata.lng = Some(if text(lng_ref).contains('W') { -lng } else { lng });
            }
        }
    }
}

/// Dimensions and EXIF facts for a photo.
pub fn photo_metadata(path: &Path) -> Result<MediaMetadata> {
    let mut metadata = MediaMetadata::default();
    let (width, height) = image::ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;
    metadata.width = Some(width);
    metadata.height = Some(height);
    read_exif(path, &mut metadata);
    Ok(metadata)
}

fn frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let (num, den): (f64, f64) = (num.parse().ok()?, den.parse().ok()?);
            (den > 0.0 && num > 0.0).then(|| num / den)
        }
        None => raw.parse().ok().filter(|r: &f64| *r > 0.0),
    }
}

/// Read `ffprobe -print_format json` output into metadata.
pub fn parse_probe(json: &Value) -> MediaMetadata {
    let mut metadata = MediaMetadata::default();
    let format = &json["format"];

    metadata.duration = format["duration"].as_str().and_then(|d| d.parse().ok());
    metadata.stamp = format["tags"]["creation_time"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.naive_utc());

    let streams = json["streams"].as_array().map(Vec::as_slice).unwrap_or_default();
    if let Some(video) = streams.iter().find(|s| s["codec_type"] == "video") {
        metadata.width = video["width"].as_u64().and_then(|w| u32::try_from(w).ok());
        metadata.height = video["height"].as_u64().and_then(|h| u32::try_from(h).ok());
        metadata.fps = video["avg_frame_rate"]
            .as_str()
            .and_then(frame_rate)
            .or_else(|| video["r_frame_rate"].as_str().and_then(frame_rate));
    }
    metadata
}

/// Duration, frame size and rate for audio or video via ffprobe.
pub fn probe_metadata(path: &Path, ffprobe: &Transcoder) -> Result<MediaMetadata> {
    let args = [
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.display().to_string(),
    ];
    let output = ffprobe.run(path, &args)?;
    let json: Value = serde_json::from_slice(&output)?;
    Ok(parse_probe(&json))
}

/// Modification time of a file as local time.
pub fn file_stamp(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

//! Core library records: assets, media kinds and content hashes.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::filters::FilterList;

/// Coarse type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    Photo,
    Audio,
    Video,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Photo => "photo",
            Medium::Audio => "audio",
            Medium::Video => "video",
        }
    }

    /// Guess a medium from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "tif" | "tiff" | "bmp" | "heic" | "heif" => {
                Some(Medium::Photo)
            }
            "mp3" | "wav" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "opus" => Some(Medium::Audio),
            "mp4" | "mov" | "m4v" | "mkv" | "webm" | "avi" | "mts" | "3gp" => Some(Medium::Video),
            _ => None,
        }
    }

    pub fn has_video(&self) -> bool {
        matches!(self, Medium::Photo | Medium::Video)
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, Medium::Audio | Medium::Video)
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Medium {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photo" => Ok(Medium::Photo),
            "audio" => Ok(Medium::Audio),
            "video" => Ok(Medium::Video),
            other => Err(Error::QueryParse(format!("unknown medium: {other}"))),
        }
    }
}

/// A stored content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    #[serde(skip)]
    pub asset_id: i64,
    pub method: String,
    pub nibbles: String,
    pub time: Option<f64>,
}

impl HashRecord {
    pub fn new(method: impl Into<String>, nibbles: impl Into<String>) -> Self {
        Self {
            asset_id: 0,
            method: method.into(),
            nibbles: nibbles.into(),
            time: None,
        }
    }

    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }
}

/// A single media asset in the library.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: i64,
    pub slug: String,
    pub medium: Medium,
    pub path: String,
    pub caption: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// EXIF orientation code (1-8).
    pub orientation: Option<u8>,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub stamp: Option<NaiveDateTime>,
    pub filters: FilterList,
    pub tags: BTreeSet<String>,
}

impl Asset {
    pub fn new(slug: impl Into<String>, medium: Medium, path: impl Into<String>) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            medium,
            path: path.into(),
            caption: String::new(),
            width: None,
            height: None,
            orientation: None,
            duration: None,
            fps: None,
            lat: None,
            lng: None,
            stamp: None,
            filters: FilterList::default(),
            tags: BTreeSet::new(),
        }
    }

    pub fn is_photo(&self) -> bool {
        self.medium == Medium::Photo
    }

    pub fn is_audio(&self) -> bool {
        self.medium == Medium::Audio
    }

    pub fn is_video(&self) -> bool {
        self.medium == Medium::Video
    }
}

/// Storage and display format for timestamps.
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_stamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    [STAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y:%m:%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Resolve a timestamp edit.
///
/// `when` is either an absolute time (`2019-07-04 09:30:00`) or a list of
/// shifts such as `+1y -2d +3h` applied to `current`.
pub fn update_stamp(current: Option<NaiveDateTime>, when: &str) -> Result<NaiveDateTime> {
    if let Some(stamp) = parse_stamp(when) {
        return Ok(stamp);
    }

    static SHIFT: OnceLock<Regex> = OnceLock::new();
    let shift = SHIFT.get_or_init(|| Regex::new(r"([-+])(\d+)([ymdh])").unwrap());

    let invalid = || Error::InvalidStamp(when.to_string());
    let mut stamp = current.ok_or_else(invalid)?;
    let mut shifted = false;
    for caps in shift.captures_iter(when) {
        let amount: u32 = caps[2].parse().map_err(|_| invalid())?;
        let forward = &caps[1] == "+";
        stamp = match &caps[3] {
            "y" | "m" => {
                let months = if &caps[3] == "y" {
                    amount.checked_mul(12).ok_or_else(invalid)?
                } else {
                    amount
                };
                let months = Months::new(months);
                if forward {
                    stamp.checked_add_months(months)
                } else {
                    stamp.checked_sub_months(months)
                }
            }
            unit => {
                let delta = if unit == "d" {
                    Duration::try_days(amount.into())
                } else {
                    Duration::try_hours(amount.into())
                }
                .ok_or_else(invalid)?;
                if forward {
                    stamp.checked_add_signed(delta)
                } else {
                    stamp.checked_sub_signed(delta)
                }
            }
        }
        .ok_or_else(invalid)?;
        shifted = true;
    }

    if shifted {
        Ok(stamp)
    } else {
        Err(invalid())
    }
}

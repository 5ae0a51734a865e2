//! Tag canonicalization and classification.
//!
//! Tags are plain strings. Their class (datetime, metadata or user) is derived
//! from the string on demand and only drives display and sort order.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

pub const DAYS: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagClass {
    Datetime,
    Metadata,
    User,
}

impl TagClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagClass::Datetime => "datetime",
            TagClass::Metadata => "metadata",
            TagClass::User => "user",
        }
    }
}

struct Patterns {
    year: Regex,
    day: Regex,
    hour: Regex,
    metadata: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        year: Regex::new(r"^(19|20)\d\d$").unwrap(),
        day: Regex::new(r"^(\d{1,2})(st|nd|rd|th)$").unwrap(),
        hour: Regex::new(r"^(\d{1,2})(am|pm)$").unwrap(),
        metadata: Regex::new(
            r"^(kit-\S+|f-\d+(-\d+)?|\d{1,4}mm|iso-\d+|(country|state|city|place)-\S+)$",
        )
        .unwrap(),
    })
}

/// Lowercase a tag and join its words with `-`.
pub fn canonical_form(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut pending_dash = false;
    for ch in tag.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

pub fn classify(tag: &str) -> TagClass {
    let p = patterns();
    if p.year.is_match(tag)
        || p.day.is_match(tag)
        || p.hour.is_match(tag)
        || MONTHS.contains(&tag)
        || DAYS.contains(&tag)
    {
        TagClass::Datetime
    } else if p.metadata.is_match(tag) {
        TagClass::Metadata
    } else {
        TagClass::User
    }
}

/// Sort key placing datetime tags first (hours, weekdays, days, months, years),
/// then metadata tags, then user tags.
pub fn sort_key(tag: &str) -> (TagClass, u8, u32, String) {
    let class = classify(tag);
    if class != TagClass::Datetime {
        return (class, 0, 0, tag.to_string());
    }

    let p = patterns();
    let (subgroup, ordinal) = if let Some(caps) = p.hour.captures(tag) {
        let hour: u32 = caps[1].parse().unwrap_or(0);
        let subgroup = if &caps[2] == "am" { 1 } else { 2 };
        (subgroup, hour % 12)
    } else if let Some(index) = DAYS.iter().position(|d| *d == tag) {
        (3, index as u32)
    } else if let Some(caps) = p.day.captures(tag) {
        (4, caps[1].parse().unwrap_or(0))
    } else if let Some(index) = MONTHS.iter().position(|m| *m == tag) {
        (5, index as u32)
    } else {
        (6, tag.parse().unwrap_or(0))
    };

    (class, subgroup, ordinal, tag.to_string())
}

pub fn sort_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tags: Vec<String> = tags.into_iter().map(Into::into).collect();
    tags.sort_by_cached_key(|t| sort_key(t));
    tags
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Datetime tags for a timestamp: year, month, ordinal day, weekday and hour.
///
/// The hour boundary sits at 48 minutes past, so 10:48 through 11:47 are all
/// tagged `11am`.
pub fn datetime_tags(stamp: &NaiveDateTime) -> Vec<String> {
    let day = stamp.day();
    let shifted = *stamp + Duration::minutes(12);
    let hour12 = match shifted.hour() % 12 {
        0 => 12,
        h => h,
    };
    let meridiem = if shifted.hour() < 12 { "am" } else { "pm" };

    vec![
        stamp.year().to_string(),
        MONTHS[stamp.month0() as usize].to_string(),
        format!("{}{}", day, ordinal_suffix(day)),
        DAYS[stamp.weekday().num_days_from_monday() as usize].to_string(),
        format!("{hour12}{meridiem}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_canonical_form() {
        assert_eq!(canonical_form("Hello World"), "hello-world");
        assert_eq!(canonical_form("  --Ice  Cream!! "), "ice-cream");
        assert_eq!(canonical_form("kit:EOS 5D"), "kit-eos-5d");
        assert_eq!(canonical_form("snake_case"), "snake_case");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("2019"), TagClass::Datetime);
        assert_eq!(classify("march"), TagClass::Datetime);
        assert_eq!(classify("22nd"), TagClass::Datetime);
        assert_eq!(classify("sunday"), TagClass::Datetime);
        assert_eq!(classify("11am"), TagClass::Datetime);
        assert_eq!(classify("kit-eos-5d"), TagClass::Metadata);
        assert_eq!(classify("f-2-8"), TagClass::Metadata);
        assert_eq!(classify("50mm"), TagClass::Metadata);
        assert_eq!(classify("iso-800"), TagClass::Metadata);
        assert_eq!(classify("city-paris"), TagClass::Metadata);
        assert_eq!(classify("cake"), TagClass::User);
        assert_eq!(classify("1850"), TagClass::User);
    }

    #[test]
    fn test_sort_tags() {
        let sorted = sort_tags(["cake", "2019", "kit-x100", "june", "3pm", "12am", "monday", "2nd"]);
        assert_eq!(
            sorted,
            vec!["12am", "3pm", "monday", "2nd", "june", "2019", "kit-x100", "cake"]
        );
    }

    #[test]
    fn test_datetime_tags() {
        let stamp = NaiveDate::from_ymd_opt(2009, 1, 22)
            .unwrap()
            .and_hms_opt(10, 48, 0)
            .unwrap();
        assert_eq!(
            datetime_tags(&stamp),
            vec!["2009", "january", "22nd", "thursday", "11am"]
        );

        let late = NaiveDate::from_ymd_opt(2015, 6, 11)
            .unwrap()
            .and_hms_opt(23, 50, 0)
            .unwrap();
        assert_eq!(datetime_tags(&late)[2], "11th");
        assert_eq!(datetime_tags(&late)[4], "12am");
    }
}

//! Non-destructive edit operations.
//!
//! An asset stores an ordered list of filter records such as
//! `{"filter": "rotate", "degrees": 10}`. The list is kept as raw JSON values so
//! that records written by newer versions survive a load/save cycle; replay
//! parses each record into a [`FilterOp`] and skips anything it cannot read.

pub mod geometry;
pub mod graph;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use geometry::{crop_after_rotate, CropBox, Geometry};
pub use graph::{compile_filter_graph, replay, FilterChain, FilterGraph, Replay, Slice};

/// A single edit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "lowercase")]
pub enum FilterOp {
    Rotate {
        degrees: f64,
    },
    /// Box given as fractions of the current frame.
    Crop {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Scale {
        factor: f64,
    },
    Cut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    Saturation {
        percent: f64,
    },
    Brightness {
        percent: f64,
    },
    Contrast {
        percent: f64,
    },
    Hue {
        degrees: f64,
    },
    Autocontrast {
        percent: f64,
    },
    Hflip,
    Vflip,
    Transpose,
    Fps {
        fps: f64,
    },
}

impl FilterOp {
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Rotate { .. } => "rotate",
            FilterOp::Crop { .. } => "crop",
            FilterOp::Scale { .. } => "scale",
            FilterOp::Cut { .. } => "cut",
            FilterOp::Saturation { .. } => "saturation",
            FilterOp::Brightness { .. } => "brightness",
            FilterOp::Contrast { .. } => "contrast",
            FilterOp::Hue { .. } => "hue",
            FilterOp::Autocontrast { .. } => "autocontrast",
            FilterOp::Hflip => "hflip",
            FilterOp::Vflip => "vflip",
            FilterOp::Transpose => "transpose",
            FilterOp::Fps { .. } => "fps",
        }
    }

    /// Build an operation from a name and positional numeric arguments, as
    /// typed on the command line (`rotate 10`, `crop 0.1 0.1 0.9 0.9`).
    pub fn from_args(name: &str, args: &[f64]) -> Result<Self> {
        let arg = |i: usize| {
            args.get(i).copied().ok_or_else(|| {
                Error::InvalidFormat(format!("{name}: missing argument {}", i + 1))
            })
        };
        let op = match name {
            "rotate" => FilterOp::Rotate { degrees: arg(0)? },
            "crop" => FilterOp::Crop {
                x1: arg(0)?,
                y1: arg(1)?,
                x2: arg(2)?,
                y2: arg(3)?,
            },
            "scale" => FilterOp::Scale { factor: arg(0)? },
            "cut" => FilterOp::Cut {
                start: args.first().copied(),
                duration: args.get(1).copied(),
            },
            "saturation" => FilterOp::Saturation { percent: arg(0)? },
            "brightness" => FilterOp::Brightness { percent: arg(0)? },
            "contrast" => FilterOp::Contrast { percent: arg(0)? },
            "hue" => FilterOp::Hue { degrees: arg(0)? },
            "autocontrast" => FilterOp::Autocontrast { percent: arg(0)? },
            "hflip" => FilterOp::Hflip,
            "vflip" => FilterOp::Vflip,
            "transpose" => FilterOp::Transpose,
            "fps" => FilterOp::Fps { fps: arg(0)? },
            other => return Err(Error::InvalidFormat(format!("unknown filter: {other}"))),
        };
        Ok(op)
    }
}

/// Ordered filter records attached to an asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterList {
    entries: Vec<Value>,
}

impl FilterList {
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn add(&mut self, op: &FilterOp) -> Result<()> {
        self.entries.push(serde_json::to_value(op)?);
        Ok(())
    }

    /// Remove the record at `index` (negative counts from the end), checking
    /// that it is a `name` filter. Returns the removed record.
    pub fn remove(&mut self, name: &str, index: i64) -> Result<Value> {
        let len = self.entries.len();
        let resolved = if index < 0 { index + len as i64 } else { index };
        if resolved < 0 || resolved >= len as i64 {
            return Err(Error::FilterIndex { index, len });
        }
        let resolved = resolved as usize;

        let actual = record_name(&self.entries[resolved]).unwrap_or_default();
        if actual != name {
            return Err(Error::FilterMismatch {
                index: resolved,
                actual: actual.to_string(),
                expected: name.to_string(),
            });
        }

        Ok(self.entries.remove(resolved))
    }

    /// Parsed operations in list order. Unreadable records are skipped.
    pub fn ops(&self) -> Vec<FilterOp> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry.clone()) {
                Ok(op) => Some(op),
                Err(e) => {
                    tracing::warn!(
                        index,
                        filter = record_name(entry).unwrap_or("?"),
                        error = %e,
                        "Skipping unrecognized filter"
                    );
                    None
                }
            })
            .collect()
    }
}

fn record_name(entry: &Value) -> Option<&str> {
    entry.get("filter").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_op_shape() {
        let op = FilterOp::Rotate { degrees: 10.0 };
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"filter": "rotate", "degrees": 10.0}));

        let flip: FilterOp = serde_json::from_value(json!({"filter": "hflip"})).unwrap();
        assert_eq!(flip, FilterOp::Hflip);

        let cut: FilterOp = serde_json::from_value(json!({"filter": "cut", "duration": 5})).unwrap();
        assert_eq!(cut, FilterOp::Cut { start: None, duration: Some(5.0) });
    }

    #[test]
    fn test_add_then_remove_restores_list() {
        let mut list = FilterList::default();
        list.add(&FilterOp::Rotate { degrees: 90.0 }).unwrap();
        list.add(&FilterOp::Hflip).unwrap();
        let before = list.clone();

        let op = FilterOp::Crop { x1: 0.1, y1: 0.1, x2: 0.9, y2: 0.9 };
        list.add(&op).unwrap();
        assert_eq!(list.len(), 3);
        list.remove(op.name(), -1).unwrap();

        assert_eq!(list, before);
    }

    #[test]
    fn test_remove_errors() {
        let mut list = FilterList::default();
        assert!(matches!(list.remove("rotate", -1), Err(Error::FilterIndex { .. })));

        list.add(&FilterOp::Vflip).unwrap();
        assert!(matches!(list.remove("vflip", 1), Err(Error::FilterIndex { index: 1, len: 1 })));
        assert!(matches!(list.remove("vflip", -2), Err(Error::FilterIndex { .. })));
        assert!(matches!(
            list.remove("hflip", 0),
            Err(Error::FilterMismatch { index: 0, .. })
        ));
        assert_eq!(list.len(), 1);
        list.remove("vflip", 0).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_unknown_records_survive_and_are_skipped() {
        let list = FilterList::from_json(
            r#"[{"filter":"sepia","amount":3},{"filter":"scale","factor":0.5}]"#,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.ops(), vec![FilterOp::Scale { factor: 0.5 }]);
        assert!(list.to_json().unwrap().contains("sepia"));
    }

    #[test]
    fn test_from_args() {
        assert_eq!(
            FilterOp::from_args("crop", &[0.0, 0.1, 0.5, 1.0]).unwrap(),
            FilterOp::Crop { x1: 0.0, y1: 0.1, x2: 0.5, y2: 1.0 }
        );
        assert_eq!(
            FilterOp::from_args("cut", &[2.0]).unwrap(),
            FilterOp::Cut { start: Some(2.0), duration: None }
        );
        assert!(FilterOp::from_args("rotate", &[]).is_err());
        assert!(FilterOp::from_args("sepia", &[1.0]).is_err());
    }
}

//! Query AST.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::model::Medium;

/// A parsed query expression.
///
/// `And` members are applied left to right: a `Not` member subtracts from
/// what has been accumulated so far, any other member intersects with it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    Term(Predicate),
    Not(Box<QueryExpression>),
    And(Vec<QueryExpression>),
    Or(Vec<QueryExpression>),
}

/// Leaf predicate, each resolving to a set of asset ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact tag name.
    Tag(String),
    /// Quoted text: caption substring or exact tag name.
    Text(String),
    Stamp(StampFilter),
    /// Substring of the source path.
    Path(String),
    /// Prefix of the slug.
    Slug(String),
    /// Prefix of a stored digest, optionally for one method only.
    Hash {
        method: Option<String>,
        prefix: String,
    },
    Medium(Medium),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampFilter {
    Before(NaiveDateTime),
    After(NaiveDateTime),
    During(DatePeriod),
}

/// Half-open `[start, end)` span covered by a partial date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DatePeriod {
    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::QueryParse(format!("invalid date: {raw:?}"));
        let fields = raw
            .split('-')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    Err(invalid())
                } else {
                    part.parse::<u32>().map_err(|_| invalid())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let (start, end) = match fields[..] {
            [year] => {
                let year = year as i32;
                (
                    NaiveDate::from_ymd_opt(year, 1, 1),
                    NaiveDate::from_ymd_opt(year + 1, 1, 1),
                )
            }
            [year, month] => {
                let start = NaiveDate::from_ymd_opt(year as i32, month, 1);
                let end = start.and_then(|d| {
                    if d.month() == 12 {
                        NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
                    } else {
                        NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
                    }
                });
                (start, end)
            }
            [year, month, day] => {
                let start = NaiveDate::from_ymd_opt(year as i32, month, day);
                (start, start.and_then(|d| d.succ_opt()))
            }
            _ => (None, None),
        };

        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                start: start.and_time(chrono::NaiveTime::MIN),
                end: end.and_time(chrono::NaiveTime::MIN),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Whether an expression names any predicate at all.
pub fn has_terms(expression: &QueryExpression) -> bool {
    match expression {
        QueryExpression::Term(_) => true,
        QueryExpression::Not(inner) => has_terms(inner),
        QueryExpression::And(parts) | QueryExpression::Or(parts) => parts.iter().any(has_terms),
    }
}

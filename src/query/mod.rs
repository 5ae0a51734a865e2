//! Boolean query language over the asset library.
//!
//! A query such as `cake 2019 not (birthday or party) after:2015-06` is parsed
//! into a [`QueryExpression`] and evaluated into a set of asset ids by asking
//! an [`AssetIndex`] for the ids matching each leaf predicate.

pub mod eval;
pub mod expression;
pub mod parser;

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use eval::evaluate;
pub use expression::{DatePeriod, Predicate, QueryExpression, StampFilter};
pub use parser::QueryParser;

pub type IdSet = BTreeSet<i64>;

/// Source of asset ids for leaf predicates.
pub trait AssetIndex {
    /// Every asset id in the library.
    fn universe(&self) -> Result<IdSet>;

    fn matching(&self, predicate: &Predicate) -> Result<IdSet>;
}

/// Parse and evaluate a query in one step.
pub fn select<I: AssetIndex + ?Sized>(index: &I, query: &str) -> Result<IdSet> {
    let expression = QueryParser::parse(query)?;
    evaluate(&expression, index)
}

/// Asset fields results can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Id,
    Slug,
    Medium,
    Path,
    Caption,
    Width,
    Height,
    Duration,
    Fps,
    Lat,
    Lng,
    Stamp,
}

impl OrderField {
    pub fn column(&self) -> &'static str {
        match self {
            OrderField::Id => "id",
            OrderField::Slug => "slug",
            OrderField::Medium => "medium",
            OrderField::Path => "path",
            OrderField::Caption => "caption",
            OrderField::Width => "width",
            OrderField::Height => "height",
            OrderField::Duration => "duration",
            OrderField::Fps => "fps",
            OrderField::Lat => "lat",
            OrderField::Lng => "lng",
            OrderField::Stamp => "stamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Random,
    Field { field: OrderField, descending: bool },
}

impl FromStr for Order {
    type Err = Error;

    /// `stamp`, `stamp-` (descending) or anything starting with `rand`.
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("rand") {
            return Ok(Order::Random);
        }
        let (name, descending) = match s.strip_suffix('-') {
            Some(name) => (name, true),
            None => (s, false),
        };
        let field = match name {
            "id" => OrderField::Id,
            "slug" => OrderField::Slug,
            "medium" => OrderField::Medium,
            "path" => OrderField::Path,
            "caption" => OrderField::Caption,
            "width" => OrderField::Width,
            "height" => OrderField::Height,
            "duration" => OrderField::Duration,
            "fps" => OrderField::Fps,
            "lat" => OrderField::Lat,
            "lng" => OrderField::Lng,
            "stamp" => OrderField::Stamp,
            _ => return Err(Error::UnknownOrder(s.to_string())),
        };
        Ok(Order::Field { field, descending })
    }
}

/// Ordering and paging for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert_eq!("random".parse::<Order>().unwrap(), Order::Random);
        assert_eq!("rand".parse::<Order>().unwrap(), Order::Random);
        assert_eq!(
            "stamp-".parse::<Order>().unwrap(),
            Order::Field { field: OrderField::Stamp, descending: true }
        );
        assert_eq!(
            "slug".parse::<Order>().unwrap(),
            Order::Field { field: OrderField::Slug, descending: false }
        );
        assert!(matches!("color".parse::<Order>(), Err(Error::UnknownOrder(_))));
    }
}

//! Set-algebra interpreter for parsed queries.

use crate::error::Result;

use super::expression::QueryExpression;
use super::{AssetIndex, IdSet};

/// Evaluate an expression against an index.
pub fn evaluate<I: AssetIndex + ?Sized>(expression: &QueryExpression, index: &I) -> Result<IdSet> {
    Evaluator {
        index,
        universe: None,
    }
    .eval(expression)
}

struct Evaluator<'a, I: ?Sized> {
    index: &'a I,
    universe: Option<IdSet>,
}

impl<I: AssetIndex + ?Sized> Evaluator<'_, I> {
    fn universe(&mut self) -> Result<IdSet> {
        if let Some(universe) = &self.universe {
            return Ok(universe.clone());
        }
        let universe = self.index.universe()?;
        self.universe = Some(universe.clone());
        Ok(universe)
    }

    fn eval(&mut self, expression: &QueryExpression) -> Result<IdSet> {
        match expression {
            QueryExpression::Term(predicate) => self.index.matching(predicate),
            QueryExpression::Not(inner) => {
                let excluded = self.eval(inner)?;
                let mut universe = self.universe()?;
                universe.retain(|id| !excluded.contains(id));
                Ok(universe)
            }
            QueryExpression::Or(parts) => {
                let mut ids = IdSet::new();
                for part in parts {
                    ids.extend(self.eval(part)?);
                }
                Ok(ids)
            }
            QueryExpression::And(parts) => {
                let mut acc: Option<IdSet> = None;
                for part in parts {
                    let next = match (acc.take(), part) {
                        (None, part) => self.eval(part)?,
                        (Some(mut ids), QueryExpression::Not(inner)) => {
                            let excluded = self.eval(inner)?;
                            ids.retain(|id| !excluded.contains(id));
                            ids
                        }
                        (Some(ids), part) => {
                            let other = self.eval(part)?;
                            ids.intersection(&other).copied().collect()
                        }
                    };
                    let empty = next.is_empty();
                    acc = Some(next);
                    if empty {
                        break;
                    }
                }
                match acc {
                    Some(ids) => Ok(ids),
                    None => self.universe(),
                }
            }
        }
    }
}

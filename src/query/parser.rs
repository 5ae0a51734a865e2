//! Query tokenizer and recursive-descent parser.
//!
//! ```text
//! query    := union*                    (juxtaposition is AND)
//! union    := negation ("or" negation)*
//! negation := "not"? set
//! set      := "(" query ")" | PREDICATE
//! ```

use crate::error::{Error, Result};
use crate::model::Medium;

use super::expression::{has_terms, DatePeriod, Predicate, QueryExpression, StampFilter};

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QueryToken {
    kind: QueryTokenKind,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTokenKind {
    Word(String),
    Phrase(String),
    LParen,
    RParen,
    Or,
    Not,
}

// ---------------------------------------------------------------------------
// Query parser
// ---------------------------------------------------------------------------

pub struct QueryParser {
    tokens: Vec<QueryToken>,
    index: usize,
}

impl QueryParser {
    /// Parse a query string. An empty query parses to `And([])`, which
    /// matches every asset.
    pub fn parse(input: &str) -> Result<QueryExpression> {
        let tokens = tokenize_query_input(input)?;
        let mut parser = Self { tokens, index: 0 };

        let expression = parser.parse_query(false)?;
        if let Some(token) = parser.peek() {
            return Err(Error::QueryParse(format!(
                "unexpected token near byte {}",
                token.position
            )));
        }
        Ok(expression)
    }

    fn parse_query(&mut self, in_group: bool) -> Result<QueryExpression> {
        let mut parts = Vec::new();

        while !self.is_end() && !(in_group && self.next_is(&QueryTokenKind::RParen)) {
            parts.push(self.parse_union()?);
        }

        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => QueryExpression::And(parts),
        })
    }

    fn parse_union(&mut self) -> Result<QueryExpression> {
        let mut parts = vec![self.parse_negation()?];

        while self.consume(&QueryTokenKind::Or) {
            if self.is_end() || self.next_is(&QueryTokenKind::RParen) {
                return Err(Error::QueryParse(format!(
                    "expected query term after 'or' near byte {}",
                    self.current_position()
                )));
            }
            parts.push(self.parse_negation()?);
        }

        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => QueryExpression::Or(parts),
        })
    }

    fn parse_negation(&mut self) -> Result<QueryExpression> {
        if !self.consume(&QueryTokenKind::Not) {
            return self.parse_set();
        }
        if self.next_is(&QueryTokenKind::Not) {
            return Err(Error::QueryParse(format!(
                "repeated 'not' near byte {}",
                self.current_position()
            )));
        }
        Ok(QueryExpression::Not(Box::new(self.parse_set()?)))
    }

    fn parse_set(&mut self) -> Result<QueryExpression> {
        let token = self.next().ok_or_else(|| {
            Error::QueryParse("expected query term but reached end of query".to_string())
        })?;

        match token.kind {
            QueryTokenKind::LParen => self.parse_group(token.position),
            QueryTokenKind::Word(_) | QueryTokenKind::Phrase(_) => {
                Ok(QueryExpression::Term(parse_query_term(&token)?))
            }
            QueryTokenKind::RParen => Err(Error::QueryParse(format!(
                "unexpected ')' near byte {}",
                token.position
            ))),
            QueryTokenKind::Or | QueryTokenKind::Not => Err(Error::QueryParse(format!(
                "expected query term near byte {}",
                token.position
            ))),
        }
    }

    fn parse_group(&mut self, open: usize) -> Result<QueryExpression> {
        let expression = self.parse_query(true)?;
        if !self.consume(&QueryTokenKind::RParen) {
            return Err(Error::QueryParse(format!(
                "missing closing ')' for group at byte {open}"
            )));
        }
        if !has_terms(&expression) {
            return Err(Error::QueryParse(format!("empty group at byte {open}")));
        }
        Ok(expression)
    }

    fn next_is(&self, kind: &QueryTokenKind) -> bool {
        self.peek().map(|token| &token.kind) == Some(kind)
    }

    fn consume(&mut self, kind: &QueryTokenKind) -> bool {
        self.next_is(kind) && {
            self.index += 1;
            true
        }
    }

    fn is_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn peek(&self) -> Option<&QueryToken> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<QueryToken> {
        let token = self.tokens.get(self.index).cloned()?;
        self.index += 1;
        Some(token)
    }

    fn current_position(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|token| token.position)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Term parsing
// ---------------------------------------------------------------------------

fn is_word(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn parse_query_term(token: &QueryToken) -> Result<Predicate> {
    let raw = match &token.kind {
        QueryTokenKind::Phrase(text) if text.is_empty() => {
            return Err(Error::QueryParse(format!(
                "empty quoted text near byte {}",
                token.position
            )));
        }
        QueryTokenKind::Phrase(text) => return Ok(Predicate::Text(text.clone())),
        QueryTokenKind::Word(raw) => raw,
        _ => {
            return Err(Error::QueryParse(
                "invalid query token while parsing term".to_string(),
            ))
        }
    };

    let Some((name, argument)) = raw.split_once(':') else {
        if let Ok(medium) = raw.parse::<Medium>() {
            return Ok(Predicate::Medium(medium));
        }
        if !is_word(raw) {
            return Err(Error::QueryParse(format!(
                "invalid tag {raw:?} near byte {}",
                token.position
            )));
        }
        return Ok(Predicate::Tag(raw.clone()));
    };

    if argument.is_empty() {
        return Err(Error::QueryParse(format!(
            "{name}: requires a value near byte {}",
            token.position
        )));
    }

    match name {
        "before" => Ok(Predicate::Stamp(StampFilter::Before(
            DatePeriod::parse(argument)?.start,
        ))),
        "after" => Ok(Predicate::Stamp(StampFilter::After(
            DatePeriod::parse(argument)?.start,
        ))),
        "during" => Ok(Predicate::Stamp(StampFilter::During(DatePeriod::parse(
            argument,
        )?))),
        "path" => Ok(Predicate::Path(argument.to_string())),
        "slug" => Ok(Predicate::Slug(argument.to_string())),
        "hash" => {
            let (method, prefix) = match argument.split_once('=') {
                Some((method, prefix)) => (Some(method), prefix),
                None => (None, argument),
            };
            if !is_word(prefix) || method.is_some_and(|m| !is_word(m)) {
                return Err(Error::QueryParse(format!(
                    "invalid hash filter {argument:?} near byte {}",
                    token.position
                )));
            }
            Ok(Predicate::Hash {
                method: method.map(str::to_string),
                prefix: prefix.to_string(),
            })
        }
        _ => Err(Error::QueryParse(format!(
            "unknown filter {name:?} near byte {}",
            token.position
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize_query_input(input: &str) -> Result<Vec<QueryToken>> {
    let mut tokens = Vec::new();
    let mut cursor = 0usize;

    while let Some(ch) = input[cursor..].chars().next() {
        if ch.is_whitespace() {
            cursor += ch.len_utf8();
            continue;
        }

        let position = cursor;
        match ch {
            '(' => {
                tokens.push(QueryToken {
                    kind: QueryTokenKind::LParen,
                    position,
                });
                cursor += 1;
            }
            ')' => {
                tokens.push(QueryToken {
                    kind: QueryTokenKind::RParen,
                    position,
                });
                cursor += 1;
            }
            '"' => {
                let (phrase, next_cursor) = consume_quoted_phrase(input, cursor)?;
                tokens.push(QueryToken {
                    kind: QueryTokenKind::Phrase(phrase),
                    position,
                });
                cursor = next_cursor;
            }
            _ => {
                let end = input[cursor..]
                    .find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
                    .map_or(input.len(), |offset| cursor + offset);

                let raw = &input[cursor..end];
                let kind = match raw {
                    "or" => QueryTokenKind::Or,
                    "not" => QueryTokenKind::Not,
                    _ => QueryTokenKind::Word(raw.to_string()),
                };
                tokens.push(QueryToken { kind, position });
                cursor = end;
            }
        }
    }

    Ok(tokens)
}

fn consume_quoted_phrase(input: &str, start: usize) -> Result<(String, usize)> {
    let mut phrase = String::new();
    let mut escaped = false;

    for (offset, ch) in input[start + 1..].char_indices() {
        if escaped {
            phrase.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Ok((phrase, start + 1 + offset + 1)),
            _ => phrase.push(ch),
        }
    }

    Err(Error::QueryParse(format!(
        "missing closing quote near byte {start}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> QueryExpression {
        QueryExpression::Term(Predicate::Tag(name.to_string()))
    }

    fn not(inner: QueryExpression) -> QueryExpression {
        QueryExpression::Not(Box::new(inner))
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(QueryParser::parse("").unwrap(), QueryExpression::And(vec![]));
        assert_eq!(QueryParser::parse("   ").unwrap(), QueryExpression::And(vec![]));
    }

    #[test]
    fn test_parse_chain() {
        assert_eq!(
            QueryParser::parse("a not b not c").unwrap(),
            QueryExpression::And(vec![tag("a"), not(tag("b")), not(tag("c"))])
        );
        assert_eq!(
            QueryParser::parse("a not (b not c)").unwrap(),
            QueryExpression::And(vec![
                tag("a"),
                not(QueryExpression::And(vec![tag("b"), not(tag("c"))]))
            ])
        );
    }

    #[test]
    fn test_or_binds_inside_chain() {
        assert_eq!(
            QueryParser::parse("a or b c").unwrap(),
            QueryExpression::And(vec![QueryExpression::Or(vec![tag("a"), tag("b")]), tag("c")])
        );
        assert_eq!(
            QueryParser::parse("(a not b) or c").unwrap(),
            QueryExpression::Or(vec![
                QueryExpression::And(vec![tag("a"), not(tag("b"))]),
                tag("c")
            ])
        );
    }

    #[test]
    fn test_parse_leaf_predicates() {
        let parsed = QueryParser::parse(
            r#"video path:/home/x slug:ab hash:dhash-8=0f3 hash:aud "birthday cake""#,
        )
        .unwrap();
        let QueryExpression::And(parts) = parsed else {
            panic!("expected chain");
        };
        assert_eq!(parts[0], QueryExpression::Term(Predicate::Medium(Medium::Video)));
        assert_eq!(parts[1], QueryExpression::Term(Predicate::Path("/home/x".into())));
        assert_eq!(parts[2], QueryExpression::Term(Predicate::Slug("ab".into())));
        assert_eq!(
            parts[3],
            QueryExpression::Term(Predicate::Hash {
                method: Some("dhash-8".into()),
                prefix: "0f3".into()
            })
        );
        assert_eq!(
            parts[4],
            QueryExpression::Term(Predicate::Hash { method: None, prefix: "aud".into() })
        );
        assert_eq!(parts[5], QueryExpression::Term(Predicate::Text("birthday cake".into())));
    }

    #[test]
    fn test_parse_dates() {
        let parsed = QueryParser::parse("during:2015-06").unwrap();
        let QueryExpression::Term(Predicate::Stamp(StampFilter::During(period))) = parsed else {
            panic!("expected during");
        };
        assert_eq!(period.start.to_string(), "2015-06-01 00:00:00");
        assert_eq!(period.end.to_string(), "2015-07-01 00:00:00");

        assert!(matches!(
            QueryParser::parse("before:2019").unwrap(),
            QueryExpression::Term(Predicate::Stamp(StampFilter::Before(_)))
        ));
    }

    #[test]
    fn test_parse_errors() {
        for query in [
            "a or",
            "or a",
            "a (b",
            "a b)",
            "()",
            "not",
            "not not a",
            "before:20x",
            "after:",
            "color:red",
            "a+b",
            "\"open",
            "hash:ab=",
        ] {
            assert!(
                matches!(QueryParser::parse(query), Err(Error::QueryParse(_))),
                "{query}"
            );
        }
    }

    #[test]
    fn test_tokenizer_positions() {
        let tokens = tokenize_query_input("a (\"x y\")").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 2, 3, 8]);
        assert_eq!(tokens[2].kind, QueryTokenKind::Phrase("x y".into()));
    }
}

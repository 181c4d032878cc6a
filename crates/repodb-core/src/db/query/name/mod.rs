//! Module: query::name
//! Responsibility: tokenize method-style identifiers into predicate tokens.
//! Does not own: plan compilation, argument binding, or execution.
//! Boundary: `findByUsernameAndAgeGreaterThan` in, `ParsedMethod` out.

mod keyword;


use crate::{
    db::query::{
        order::{OrderDirection, SortKey},
        predicate::{Conjunction, Operator, PredicateToken},
    },
    model::EntityModel,
};
use derive_more::Display;
use keyword::{
    AND, ASC, BY, DESC, DISTINCT, LIMIT_KEYWORDS, OPERATOR_KEYWORDS, OR, ORDER_BY, VERBS,
};
use thiserror::Error as ThisError;

///
/// QueryKind
///
/// What a derived method does with the matching rows.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum QueryKind {
    #[display("select")]
    Select,
    #[display("count")]
    Count,
    #[display("exists")]
    Exists,
    #[display("delete")]
    Delete,
}

///
/// ParsedMethod
///
/// Result of tokenizing one method name. `tokens` keeps source order; the
/// first token carries `Conjunction::None`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedMethod {
    pub kind: QueryKind,
    pub subject: String,
    pub distinct: bool,
    pub limit: Option<u32>,
    pub tokens: Vec<PredicateToken>,
    pub order: Vec<SortKey>,
}

///
/// ParseError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot derive a query from '{method}': {kind}")]
pub struct ParseError {
    pub method: String,
    pub kind: ParseErrorKind,
}

///
/// ParseErrorKind
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ParseErrorKind {
    #[display("method names must be ASCII alphanumeric identifiers")]
    InvalidIdentifier,

    #[display("no recognized query prefix")]
    UnknownPrefix,

    #[display("nothing to filter on after the prefix")]
    EmptyPredicate,

    #[display("cannot resolve an operator or field in '{part}'")]
    UnknownOperator { part: String },

    #[display("result limit must be an explicit integer >= 1")]
    InvalidLimit,

    #[display("unknown field '{field}'")]
    UnknownField { field: String },

    #[display("malformed order clause '{clause}'")]
    InvalidOrderClause { clause: String },
}

/// Parse a method name without schema knowledge.
///
/// Every capitalized token is accepted as a field name.
pub fn parse(method_name: &str) -> Result<ParsedMethod, ParseError> {
    Parser::new(method_name, None).parse()
}

/// Parse a method name, validating every field against `model`.
///
/// Relation names resolve to their foreign-key fields.
pub fn parse_with_model(model: &EntityModel, method_name: &str) -> Result<ParsedMethod, ParseError> {
    Parser::new(method_name, Some(model)).parse()
}

///
/// Parser
///

struct Parser<'a> {
    method: &'a str,
    model: Option<&'a EntityModel>,
}

impl<'a> Parser<'a> {
    const fn new(method: &'a str, model: Option<&'a EntityModel>) -> Self {
        Self { method, model }
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            method: self.method.to_string(),
            kind,
        }
    }

    fn parse(&self) -> Result<ParsedMethod, ParseError> {
        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(self.err(ParseErrorKind::InvalidIdentifier));
        }

        let (kind, rest) = self.strip_verb()?;
        let by = find_keyword(rest, BY, 0, false)
            .ok_or_else(|| self.err(ParseErrorKind::UnknownPrefix))?;

        let subject = &rest[..by];
        let remainder = &rest[by + BY.len()..];
        let distinct = find_keyword(subject, DISTINCT, 0, false).is_some();
        let limit = self.parse_limit(subject)?;

        let (predicate, order_clause) = split_order_clause(remainder);
        let order = match order_clause {
            Some(clause) => self.parse_order(clause)?,
            None => Vec::new(),
        };

        // A TopN subject or an explicit order clause stands in for a predicate.
        if predicate.is_empty() && limit.is_none() && order_clause.is_none() {
            return Err(self.err(ParseErrorKind::EmptyPredicate));
        }

        let tokens = if predicate.is_empty() {
            Vec::new()
        } else {
            self.parse_predicate(predicate)?
        };

        Ok(ParsedMethod {
            kind,
            subject: subject.to_string(),
            distinct,
            limit,
            tokens,
            order,
        })
    }

    fn strip_verb(&self) -> Result<(QueryKind, &'a str), ParseError> {
        for (verb, kind) in VERBS {
            if let Some(rest) = self.method.strip_prefix(verb)
                && rest.bytes().next().is_some_and(|b| b.is_ascii_uppercase())
            {
                return Ok((*kind, rest));
            }
        }

        Err(self.err(ParseErrorKind::UnknownPrefix))
    }

    // `Top3`/`First10` anywhere in the subject; the count is mandatory and >= 1.
    fn parse_limit(&self, subject: &str) -> Result<Option<u32>, ParseError> {
        for keyword in LIMIT_KEYWORDS {
            let mut from = 0;
            while let Some(at) = subject[from..].find(keyword).map(|i| i + from) {
                let digits_start = at + keyword.len();
                let digits_len = subject[digits_start..]
                    .bytes()
                    .take_while(u8::is_ascii_digit)
                    .count();
                let end = digits_start + digits_len;

                if !is_token_end(subject, end) {
                    from = at + 1;
                    continue;
                }

                if digits_len == 0 {
                    return Err(self.err(ParseErrorKind::InvalidLimit));
                }

                return match subject[digits_start..end].parse::<u32>() {
                    Ok(n) if n >= 1 => Ok(Some(n)),
                    _ => Err(self.err(ParseErrorKind::InvalidLimit)),
                };
            }
        }

        Ok(None)
    }

    fn parse_order(&self, clause: &str) -> Result<Vec<SortKey>, ParseError> {
        let invalid = || {
            self.err(ParseErrorKind::InvalidOrderClause {
                clause: clause.to_string(),
            })
        };

        let mut keys = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < clause.len() {
            let direction = if i > start && starts_keyword(clause, i, DESC, false) {
                Some((OrderDirection::Desc, DESC.len()))
            } else if i > start && starts_keyword(clause, i, ASC, false) {
                Some((OrderDirection::Asc, ASC.len()))
            } else {
                None
            };

            if let Some((direction, len)) = direction {
                let field = self.order_field(&clause[start..i])?;
                keys.push(SortKey { field, direction });
                i += len;
                start = i;
            } else {
                i += 1;
            }
        }

        if start < clause.len() {
            let field = self.order_field(&clause[start..])?;
            keys.push(SortKey::asc(field));
        }

        if keys.is_empty() {
            return Err(invalid());
        }

        Ok(keys)
    }

    fn order_field(&self, part: &str) -> Result<String, ParseError> {
        self.resolve_field(part).ok_or_else(|| {
            self.err(ParseErrorKind::UnknownField {
                field: decapitalize(part),
            })
        })
    }

    fn parse_predicate(&self, predicate: &str) -> Result<Vec<PredicateToken>, ParseError> {
        split_conjunctions(predicate)
            .into_iter()
            .map(|(conjunction, part)| {
                let (field, operator) = self.resolve_part(part)?;
                Ok(PredicateToken {
                    field,
                    operator,
                    conjunction,
                })
            })
            .collect()
    }

    // Longest operator suffix whose head is a real field wins; otherwise the
    // whole part is read as plain equality.
    fn resolve_part(&self, part: &str) -> Result<(String, Operator), ParseError> {
        for (keyword, operator) in OPERATOR_KEYWORDS {
            if part.len() > keyword.len()
                && let Some(head) = part.strip_suffix(keyword)
                && let Some(field) = self.resolve_field(head)
            {
                return Ok((field, *operator));
            }
        }

        if let Some(field) = self.resolve_field(part) {
            return Ok((field, Operator::Equals));
        }

        Err(self.err(ParseErrorKind::UnknownOperator {
            part: part.to_string(),
        }))
    }

    fn resolve_field(&self, part: &str) -> Option<String> {
        if !part.bytes().next().is_some_and(|b| b.is_ascii_uppercase()) {
            return None;
        }

        let name = decapitalize(part);
        match self.model {
            Some(model) => model.resolve_field(&name).map(ToString::to_string),
            None => Some(name),
        }
    }
}

///
/// TOKEN HELPERS
///

// Split `Username AND Age...` style text on capitalized `And`/`Or` boundaries.
fn split_conjunctions(predicate: &str) -> Vec<(Conjunction, &str)> {
    let mut parts = Vec::new();
    let mut conjunction = Conjunction::None;
    let mut start = 0;
    let mut i = 1;

    while i < predicate.len() {
        let found = if starts_keyword(predicate, i, AND, true) {
            Some((Conjunction::And, AND.len()))
        } else if starts_keyword(predicate, i, OR, true) {
            Some((Conjunction::Or, OR.len()))
        } else {
            None
        };

        match found {
            Some((next, len)) if i > start => {
                parts.push((conjunction, &predicate[start..i]));
                conjunction = next;
                start = i + len;
                i = start + 1;
            }
            _ => i += 1,
        }
    }

    parts.push((conjunction, &predicate[start..]));
    parts
}

// Split off a trailing `OrderBy...` clause.
fn split_order_clause(remainder: &str) -> (&str, Option<&str>) {
    let mut found = None;
    let mut from = 0;
    while let Some(at) = find_keyword(remainder, ORDER_BY, from, false) {
        found = Some(at);
        from = at + 1;
    }

    match found {
        Some(at) => (&remainder[..at], Some(&remainder[at + ORDER_BY.len()..])),
        None => (remainder, None),
    }
}

// First index >= `from` where `keyword` starts and ends on a token boundary.
fn find_keyword(text: &str, keyword: &str, from: usize, needs_follower: bool) -> Option<usize> {
    (from..text.len()).find(|&i| starts_keyword(text, i, keyword, needs_follower))
}

fn starts_keyword(text: &str, at: usize, keyword: &str, needs_follower: bool) -> bool {
    text.get(at..).is_some_and(|rest| rest.starts_with(keyword)) && {
        let end = at + keyword.len();
        if needs_follower {
            text.as_bytes().get(end).is_some_and(u8::is_ascii_uppercase)
        } else {
            is_token_end(text, end)
        }
    }
}

fn is_token_end(text: &str, end: usize) -> bool {
    text.as_bytes()
        .get(end)
        .is_none_or(u8::is_ascii_uppercase)
}

fn decapitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

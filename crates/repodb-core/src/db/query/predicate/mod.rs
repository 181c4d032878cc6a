//! Module: query::predicate
//! Responsibility: derived-query predicate vocabulary and its compiled filter form.
//! Does not own: method-name parsing or storage access.
//! Boundary: tokens flow from the name parser into the compiler; filters flow to stores.

mod eval;


use derive_more::Display;
use std::fmt;

///
/// Operator
///
/// Comparison applied by one derived predicate term.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operator {
    #[display("=")]
    Equals,
    #[display("<>")]
    NotEquals,
    #[display(">")]
    GreaterThan,
    #[display(">=")]
    GreaterThanEqual,
    #[display("<")]
    LessThan,
    #[display("<=")]
    LessThanEqual,
    #[display("IS NULL")]
    IsNull,
    #[display("IS NOT NULL")]
    IsNotNull,
    #[display("IN")]
    In,
    #[display("NOT IN")]
    NotIn,
    #[display("LIKE")]
    Like,
    #[display("NOT LIKE")]
    NotLike,
    #[display("STARTS WITH")]
    StartingWith,
    #[display("ENDS WITH")]
    EndingWith,
    #[display("CONTAINS")]
    Containing,
    #[display("IS TRUE")]
    True,
    #[display("IS FALSE")]
    False,
}

impl Operator {
    /// Number of caller arguments this operator consumes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            _ => 1,
        }
    }

    /// Whether the bound argument must be a collection.
    #[must_use]
    pub const fn takes_collection(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

///
/// Conjunction
///
/// How a token joins its predecessor. The first token always carries `None`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Conjunction {
    #[display("AND")]
    And,
    #[display("OR")]
    Or,
    #[display("")]
    None,
}

///
/// PredicateToken
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PredicateToken {
    pub field: String,
    pub operator: Operator,
    pub conjunction: Conjunction,
}

impl PredicateToken {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, conjunction: Conjunction) -> Self {
        Self {
            field: field.into(),
            operator,
            conjunction,
        }
    }
}

///
/// Combinator
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum Combinator {
    #[default]
    #[display("AND")]
    All,
    #[display("OR")]
    Any,
}

///
/// Term
///
/// One compiled comparison; `param` names the argument slot it reads, if any.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Term {
    pub field: String,
    pub operator: Operator,
    pub param: Option<String>,
}

///
/// Filter
///
/// Flat conjunctive or disjunctive filter evaluated left to right.
/// An empty filter matches every row.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Filter {
    pub combinator: Combinator,
    pub terms: Vec<Term>,
}

impl Filter {
    /// Filter that accepts every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("TRUE");
        }

        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", self.combinator)?;
            }
            match &term.param {
                Some(param) => write!(f, "{} {} :{param}", term.field, term.operator)?,
                None => write!(f, "{} {}", term.field, term.operator)?,
            }
        }

        Ok(())
    }
}

use crate::db::query::{name::QueryKind, predicate::Operator};

///
/// OPERATOR_KEYWORDS
///
/// Operator suffixes recognized at the end of a predicate part.
/// Kept in descending keyword length so the first match is the longest one.
///

pub(super) const OPERATOR_KEYWORDS: &[(&str, Operator)] = &[
    ("GreaterThanEqual", Operator::GreaterThanEqual),
    ("LessThanEqual", Operator::LessThanEqual),
    ("StartingWith", Operator::StartingWith),
    ("GreaterThan", Operator::GreaterThan),
    ("StartsWith", Operator::StartingWith),
    ("EndingWith", Operator::EndingWith),
    ("Containing", Operator::Containing),
    ("IsNotNull", Operator::IsNotNull),
    ("LessThan", Operator::LessThan),
    ("Contains", Operator::Containing),
    ("EndsWith", Operator::EndingWith),
    ("NotNull", Operator::IsNotNull),
    ("NotLike", Operator::NotLike),
    ("IsFalse", Operator::False),
    ("IsNull", Operator::IsNull),
    ("IsTrue", Operator::True),
    ("Equals", Operator::Equals),
    ("Before", Operator::LessThan),
    ("NotIn", Operator::NotIn),
    ("After", Operator::GreaterThan),
    ("False", Operator::False),
    ("IsNot", Operator::NotEquals),
    ("Null", Operator::IsNull),
    ("Like", Operator::Like),
    ("True", Operator::True),
    ("Not", Operator::NotEquals),
    ("In", Operator::In),
    ("Is", Operator::Equals),
];

/// Query verbs; `find`-family verbs are aliases of one another.
pub(super) const VERBS: &[(&str, QueryKind)] = &[
    ("exists", QueryKind::Exists),
    ("delete", QueryKind::Delete),
    ("remove", QueryKind::Delete),
    ("search", QueryKind::Select),
    ("stream", QueryKind::Select),
    ("count", QueryKind::Count),
    ("query", QueryKind::Select),
    ("find", QueryKind::Select),
    ("read", QueryKind::Select),
    ("get", QueryKind::Select),
];

pub(super) const LIMIT_KEYWORDS: &[&str] = &["First", "Top"];

pub(super) const DISTINCT: &str = "Distinct";
pub(super) const BY: &str = "By";
pub(super) const ORDER_BY: &str = "OrderBy";
pub(super) const AND: &str = "And";
pub(super) const OR: &str = "Or";
pub(super) const ASC: &str = "Asc";
pub(super) const DESC: &str = "Desc";


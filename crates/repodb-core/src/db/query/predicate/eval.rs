use crate::{
    db::query::{
        Arguments,
        predicate::{Combinator, Filter, Operator, Term},
    },
    model::Row,
    value::{Value, like_match, strict_order_cmp},
};
use std::cmp::Ordering;

impl Filter {
    ///
    /// Evaluate this filter against a single row.
    ///
    /// This is pure runtime evaluation: no schema access, no validation.
    /// Missing fields read as `Null`, and any comparison that is undefined for
    /// the operand variants evaluates to `false`.
    ///
    #[must_use]
    pub fn matches(&self, row: &Row, args: &Arguments) -> bool {
        match self.combinator {
            Combinator::All => self.terms.iter().all(|term| term.matches(row, args)),
            Combinator::Any => {
                self.terms.is_empty() || self.terms.iter().any(|term| term.matches(row, args))
            }
        }
    }
}

impl Term {
    #[must_use]
    pub fn matches(&self, row: &Row, args: &Arguments) -> bool {
        let actual = row.get(&self.field).unwrap_or(&Value::Null);
        let arg = self
            .param
            .as_deref()
            .and_then(|name| args.get(name))
            .unwrap_or(&Value::Null);

        match self.operator {
            // Equality against a null argument reads as IS NULL.
            Operator::Equals if arg.is_null() => actual.is_null(),
            Operator::NotEquals if arg.is_null() => !actual.is_null(),
            Operator::Equals => values_equal(actual, arg),
            Operator::NotEquals => !actual.is_null() && !values_equal(actual, arg),

            Operator::GreaterThan => ordered(actual, arg, Ordering::is_gt),
            Operator::GreaterThanEqual => ordered(actual, arg, Ordering::is_ge),
            Operator::LessThan => ordered(actual, arg, Ordering::is_lt),
            Operator::LessThanEqual => ordered(actual, arg, Ordering::is_le),

            Operator::IsNull => actual.is_null(),
            Operator::IsNotNull => !actual.is_null(),

            Operator::In => arg
                .as_list()
                .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
            Operator::NotIn => {
                !actual.is_null()
                    && arg
                        .as_list()
                        .is_some_and(|items| !items.iter().any(|item| values_equal(actual, item)))
            }

            Operator::Like => text_op(actual, arg, like_match),
            Operator::NotLike => {
                !actual.is_null() && !text_op(actual, arg, like_match)
            }
            Operator::StartingWith => text_op(actual, arg, |a, b| a.starts_with(b)),
            Operator::EndingWith => text_op(actual, arg, |a, b| a.ends_with(b)),
            Operator::Containing => text_op(actual, arg, |a, b| a.contains(b)),

            Operator::True => actual.as_bool() == Some(true),
            Operator::False => actual.as_bool() == Some(false),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => a == b,
        _ => strict_order_cmp(left, right) == Some(Ordering::Equal),
    }
}

fn ordered(left: &Value, right: &Value, accept: impl FnOnce(Ordering) -> bool) -> bool {
    strict_order_cmp(left, right).is_some_and(accept)
}

fn text_op(left: &Value, right: &Value, op: impl FnOnce(&str, &str) -> bool) -> bool {
    match (left.as_text(), right.as_text()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

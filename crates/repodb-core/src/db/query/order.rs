use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum OrderDirection {
    #[default]
    #[display("ASC")]
    Asc,
    #[display("DESC")]
    Desc,
}

///
/// SortKey
///
/// One `(field, direction)` ordering step.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: OrderDirection,
}

impl SortKey {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

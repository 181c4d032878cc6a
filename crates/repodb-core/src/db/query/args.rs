use crate::value::Value;
use derive_more::{Deref, IntoIterator};
use std::collections::BTreeMap;

///
/// Arguments
///
/// Named runtime bindings for one plan invocation.
///

#[derive(Clone, Debug, Default, Deref, Eq, IntoIterator, PartialEq)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bind; a repeated name replaces the earlier value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

//! Promoted fields: bag keys that are also exposed as typed attributes.

use std::collections::BTreeMap;
use std::fmt::Debug;

use sessionkit_core::{SessionBag, Value};

/// Typed view layered over the generic session bag.
///
/// Implement this on an application struct to get typed accessors for the
/// keys it names. Values flow in through `mirror` whenever the bag receives a
/// promoted key, and flow out through `snapshot` on every write (bag values win
/// on collision).
pub trait SessionFields: Debug + Send {
    fn is_promoted(&self, name: &str) -> bool;

    /// Current values of every promoted field, `Null` when unset
    fn snapshot(&self) -> SessionBag;

    fn mirror(&mut self, name: &str, value: &Value);
}

/// No promoted fields
impl SessionFields for () {
    fn is_promoted(&self, _name: &str) -> bool {
        false
    }

    fn snapshot(&self) -> SessionBag {
        SessionBag::new()
    }

    fn mirror(&mut self, _name: &str, _value: &Value) {}
}

/// Promoted fields named at configuration time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotedFields {
    names: Vec<String>,
    values: BTreeMap<String, Value>,
}

impl PromotedFields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            values: BTreeMap::new(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Set a promoted field directly; unknown names are ignored
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        if !self.is_promoted(name) {
            return false;
        }
        self.values.insert(name.to_string(), value.into());
        true
    }
}

impl SessionFields for PromotedFields {
    fn is_promoted(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn snapshot(&self) -> SessionBag {
        self.names
            .iter()
            .map(|name| {
                let value = self.values.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }

    fn mirror(&mut self, name: &str, value: &Value) {
        if self.is_promoted(name) {
            self.values.insert(name.to_string(), value.clone());
        }
    }
}

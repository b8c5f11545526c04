//! Shared key-value scratchpad visible to every nested read and write.
//!
//! The caller owns the context and passes it by reference through the whole
//! parse tree. Keys are dot-paths; setting `a.b.c` creates the intermediate
//! maps on demand.

use crate::value::Value;
use derive_more::{Deref, DerefMut};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// CtxSlot
///

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CtxSlot {
    Value(Value),
    Map(BTreeMap<String, CtxSlot>),
}

///
/// Context
///

#[derive(Clone, Debug, Default, Deref, DerefMut, PartialEq, Serialize)]
pub struct Context(BTreeMap<String, CtxSlot>);

impl Context {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Look up a dot-path. `None` when any segment is missing or a segment
    /// other than the last lands on a plain value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut map = &self.0;
        let mut segments = key.split('.').peekable();

        while let Some(segment) = segments.next() {
            let slot = map.get(segment)?;
            if segments.peek().is_none() {
                return match slot {
                    CtxSlot::Value(value) => Some(value),
                    CtxSlot::Map(_) => None,
                };
            }
            match slot {
                CtxSlot::Map(inner) => map = inner,
                CtxSlot::Value(_) => return None,
            }
        }

        None
    }

    /// Store `value` at the dot-path, creating intermediate maps. Existing
    /// slots along the way are overwritten.
    pub fn set(&mut self, key: &str, value: Value) {
        let mut map = &mut self.0;
        let mut segments = key.split('.').peekable();

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                map.insert(segment.to_string(), CtxSlot::Value(value));
                return;
            }

            let slot = map
                .entry(segment.to_string())
                .or_insert_with(|| CtxSlot::Map(BTreeMap::new()));
            if !matches!(slot, CtxSlot::Map(_)) {
                *slot = CtxSlot::Map(BTreeMap::new());
            }
            match slot {
                CtxSlot::Map(inner) => map = inner,
                CtxSlot::Value(_) => unreachable!("slot was just replaced with a map"),
            }
        }
    }

    /// Treat the slot as a list: push scalars, concatenate lists.
    pub fn append(&mut self, key: &str, value: Value) {
        let mut items = match self.get(key) {
            Some(Value::List(existing)) => existing.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };

        match value {
            Value::List(mut more) => items.append(&mut more),
            single => items.push(single),
        }

        self.set(key, Value::List(items));
    }
}

///
/// TESTS
///

//! Named-attribute facts: a convenience surface over triples
//!
//! A fact is an object with named attributes; adding one allocates a fresh
//! identifier and inserts one `(id, attr, value)` triple per attribute.
//! The match network itself only ever sees the triples.

use crate::error::EngineResult;
use crate::network::ReteNetwork;
use sift_types::{Triple, Value};

/// An object with named attributes, expanded into triples on insertion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fact {
    attrs: Vec<(String, Value)>,
}

impl Fact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter
    pub fn set(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push((attr.into(), value.into()));
        self
    }

    /// Attributes in insertion order
    pub fn attrs(&self) -> &[(String, Value)] {
        &self.attrs
    }
}

impl<A: Into<String>, V: Into<Value>> FromIterator<(A, V)> for Fact {
    fn from_iter<I: IntoIterator<Item = (A, V)>>(iter: I) -> Self {
        Self { attrs: iter.into_iter().map(|(a, v)| (a.into(), v.into())).collect() }
    }
}

/// Receipt for an inserted fact: the allocated identifier and the triples
/// it expanded into, used for retraction
#[derive(Debug, Clone, PartialEq)]
pub struct FactHandle {
    /// Identifier shared by the fact's triples
    pub id: Value,
    /// The triples inserted for this fact
    pub triples: Vec<Triple>,
}

impl<P> ReteNetwork<P> {
    /// Expand a fact into triples under a fresh identifier and insert them
    pub fn add_fact(&mut self, fact: &Fact) -> EngineResult<FactHandle> {
        let id = Value::String(format!("fact:{}", self.next_fact_id));
        self.next_fact_id += 1;
        let mut triples = Vec::with_capacity(fact.attrs().len());
        for (attr, value) in fact.attrs() {
            let triple = Triple {
                id: id.clone(),
                attr: Value::String(attr.clone()),
                value: value.clone(),
            };
            self.add_wme(triple.clone())?;
            triples.push(triple);
        }
        Ok(FactHandle { id, triples })
    }

    /// Retract every triple of a previously added fact
    pub fn remove_fact(&mut self, handle: &FactHandle) -> EngineResult<()> {
        for triple in &handle.triples {
            self.remove_wme(triple)?;
        }
        Ok(())
    }
}

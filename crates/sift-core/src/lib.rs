#![deny(warnings)]
#![allow(missing_docs)]
//! # Sift Core - Incremental Rete Match Engine
//!
//! ## Overview
//!
//! Sift Core maintains, incrementally, the set of variable bindings under
//! which declaratively specified production rules are satisfied as working
//! memory changes. Facts are `(id, attr, value)` triples; rules are boolean
//! condition trees over triple patterns, negations, negated conjunctions,
//! value bindings, and filters. Matching never re-evaluates the whole rule
//! set: additions and removals flow through a Rete network that shares
//! structure across rules.
//!
//! ## Quick Start
//!
//! ```rust
//! use sift_core::{Condition, Production, ReteNetwork, Triple, Variable};
//!
//! let mut net: ReteNetwork = ReteNetwork::new();
//!
//! let rule = net.add_production(Production::new(
//!     "red on top",
//!     Condition::pattern(Variable::new("x"), "on", Variable::new("y"))
//!         & Condition::pattern(Variable::new("x"), "color", "red"),
//! ))?;
//!
//! net.add_wme(Triple::new("B1", "on", "B2"))?;
//! net.add_wme(Triple::new("B1", "color", "red"))?;
//!
//! let activations = net.activations(rule);
//! assert_eq!(activations.len(), 1);
//! assert_eq!(activations[0].bindings.get("y"), Some(&"B2".into()));
//!
//! net.remove_wme(&Triple::new("B1", "on", "B2"))?;
//! assert!(net.activations(rule).is_empty());
//! # Ok::<(), sift_core::EngineError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`network`] | The network itself: WME mutations, activations, teardown |
//! | [`compile`] | DNF normalization and rule-to-network construction |
//! | [`conditions`] | Condition trees, thunk specs, operator sugar |
//! | [`alpha`] | Constant-test discrimination and shared alpha memories |
//! | [`nodes`] | Beta-network node kinds and join tests |
//! | [`token`] | Token arena and ancestry walks |
//! | [`wme`] | Interned working-memory store with back-references |
//! | [`fact`] | Named-attribute facts expanded into triples |
//! | [`error`] | Error types |
//!
//! ## Concurrency
//!
//! The engine is single-threaded cooperative: every mutation runs to
//! completion before the next begins, and for a fixed operation sequence
//! the resulting activations are deterministic. Callers needing
//! parallelism shard rules across independent networks.

pub mod alpha;
pub mod compile;
pub mod conditions;
pub mod error;
pub mod fact;
pub mod network;
pub mod nodes;
pub mod token;
pub mod wme;

pub use compile::{Leaf, dnf, dnf_to_condition};
pub use conditions::{BindSpec, BindingScope, Condition, FilterSpec, Thunk};
pub use error::{EngineError, EngineResult};
pub use fact::{Fact, FactHandle};
pub use network::{Activation, Match, NetworkStats, Production, ReteNetwork};
pub use nodes::{NodeId, ProductionId};
pub use wme::WmeId;

// Re-export the vocabulary crate so downstream users need only one import.
pub use sift_types::{Pattern, PatternField, Slot, Triple, Value, Variable};

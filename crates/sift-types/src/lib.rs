//! Sift Types
//!
//! This crate defines the vocabulary shared across the Sift workspace
//! (currently `sift-core`): the scalar [`Value`] stored in working-memory
//! triples, the [`Triple`] itself, pattern [`Variable`]s, and the
//! [`Slot`]/[`Pattern`] types used to describe triple templates.

#![deny(warnings)]
#![deny(missing_docs)]

mod types;

pub use types::{Pattern, PatternField, Slot, Triple, Value, Variable};

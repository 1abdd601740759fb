//! Alpha network: constant-test discrimination and shared alpha memories
//!
//! Since every WME is a triple, a fresh element can only ever land in the
//! memories reachable through the eight constant-test keys derived from its
//! fields (each field either pinned to its value or wildcarded), so routing
//! is eight hash lookups rather than a test-tree walk. Patterns with
//! identical constant fields share one memory; the all-wildcard key is the
//! match-all memory.

use crate::nodes::NodeId;
use crate::wme::WmeId;
use sift_types::{Pattern, PatternField, Slot, Triple, Value};

/// The constant fields of a pattern; the sharing key for alpha memories
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantTest {
    fields: [Option<Value>; 3],
}

impl ConstantTest {
    /// All constant-test keys a triple can satisfy, wildcards included
    pub fn permutations(triple: &Triple) -> impl Iterator<Item = ConstantTest> + '_ {
        (0..8u8).map(|mask| {
            let pick = |bit: u8, slot: Slot| {
                ((mask & (1 << bit)) != 0).then(|| triple.get(slot).clone())
            };
            ConstantTest {
                fields: [pick(0, Slot::Id), pick(1, Slot::Attr), pick(2, Slot::Value)],
            }
        })
    }

    /// Whether a triple satisfies these constant fields
    pub fn matches(&self, triple: &Triple) -> bool {
        Slot::ALL.iter().zip(&self.fields).all(|(slot, field)| match field {
            Some(value) => triple.get(*slot) == value,
            None => true,
        })
    }
}

impl From<&Pattern> for ConstantTest {
    fn from(pattern: &Pattern) -> Self {
        let constant = |slot: Slot| match pattern.get(slot) {
            PatternField::Const(v) => Some(v.clone()),
            PatternField::Var(_) => None,
        };
        Self { fields: [constant(Slot::Id), constant(Slot::Attr), constant(Slot::Value)] }
    }
}

/// A shared alpha memory: the WMEs passing one constant test, plus the
/// join/negative nodes to right-activate when membership changes
#[derive(Debug)]
pub struct AlphaMemory {
    /// Node id of this memory
    pub id: NodeId,
    /// Sharing key, kept for index cleanup on teardown
    pub(crate) key: ConstantTest,
    /// Member WMEs in insertion order
    pub(crate) wmes: Vec<WmeId>,
    /// Successor nodes, right-activated in insertion order
    pub(crate) successors: Vec<NodeId>,
}

impl AlphaMemory {
    pub(crate) fn new(id: NodeId, key: ConstantTest) -> Self {
        Self { id, key, wmes: Vec::new(), successors: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_types::Variable;

    #[test]
    fn pattern_constants_become_the_key() {
        let pattern = Pattern::new(Variable::new("x"), "color", "red");
        let test = ConstantTest::from(&pattern);
        assert!(test.matches(&Triple::new("B1", "color", "red")));
        assert!(test.matches(&Triple::new("B9", "color", "red")));
        assert!(!test.matches(&Triple::new("B1", "color", "blue")));
    }

    #[test]
    fn all_variable_pattern_matches_everything() {
        let pattern =
            Pattern::new(Variable::new("x"), Variable::new("y"), Variable::new("z"));
        let test = ConstantTest::from(&pattern);
        assert!(test.matches(&Triple::new("B1", "on", "B2")));
        assert!(test.matches(&Triple::new(1, 2, 3)));
    }

    #[test]
    fn a_triple_has_eight_permutations() {
        let triple = Triple::new("B1", "on", "B2");
        let keys: Vec<_> = ConstantTest::permutations(&triple).collect();
        assert_eq!(keys.len(), 8);
        for key in &keys {
            assert!(key.matches(&triple));
        }
        // and they are pairwise distinct
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

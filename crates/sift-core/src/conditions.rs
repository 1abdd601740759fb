//! Condition trees for production rules
//!
//! A rule's left-hand side is a boolean tree over five leaf constructs:
//! positive patterns, negated patterns, negated conjunctions (NCC), value
//! bindings, and filters. The tree is normalized to disjunctive normal form
//! by the compiler before any network is built; see [`crate::compile::dnf`].
//!
//! `&`, `|` and `!` are overloaded so trees compose the way they read:
//! `a | b & c` parses as `a | (b & c)`.

use crate::error::{EngineError, EngineResult};
use sift_types::{Pattern, PatternField, Value, Variable};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lookup scope handed to `Filter`/`Bind` thunks: the variable bindings
/// accumulated by the token under evaluation.
pub struct BindingScope<'a> {
    bindings: &'a HashMap<Variable, Value>,
}

impl<'a> BindingScope<'a> {
    pub(crate) fn new(bindings: &'a HashMap<Variable, Value>) -> Self {
        Self { bindings }
    }

    /// Resolve a variable by name, failing with
    /// [`EngineError::UnboundVariable`] when no earlier clause bound it.
    pub fn get(&self, name: &str) -> EngineResult<&Value> {
        self.bindings
            .get(name)
            .ok_or_else(|| EngineError::unbound(&Variable::new(name), "thunk evaluation"))
    }

    /// Resolve a variable without failing
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Opaque user callable evaluated against a [`BindingScope`]
pub type Thunk = Arc<dyn Fn(&BindingScope<'_>) -> EngineResult<Value> + Send + Sync>;

/// A filter clause: succeeds iff the thunk returns a truthy value
#[derive(Clone)]
pub struct FilterSpec {
    /// Variables the thunk reads, checked against earlier clauses at
    /// rule-add time
    pub vars: Vec<Variable>,
    /// The predicate itself
    pub thunk: Thunk,
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.vars).finish()
    }
}

impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.vars == other.vars && Arc::ptr_eq(&self.thunk, &other.thunk)
    }
}

/// A bind clause: computes a value and binds it to a target variable
#[derive(Clone)]
pub struct BindSpec {
    /// Variables the thunk reads
    pub vars: Vec<Variable>,
    /// Variable receiving the computed value
    pub target: Variable,
    /// The computation itself; must be deterministic
    pub thunk: Thunk,
}

impl fmt::Debug for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bind").field(&self.vars).field(&self.target).finish()
    }
}

impl PartialEq for BindSpec {
    fn eq(&self, other: &Self) -> bool {
        self.vars == other.vars
            && self.target == other.target
            && Arc::ptr_eq(&self.thunk, &other.thunk)
    }
}

/// A boolean condition tree over pattern and thunk leaves
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Positive pattern: matches when a WME satisfies it
    Pattern(Pattern),
    /// Negated pattern: matches when no WME satisfies it
    Negated(Pattern),
    /// Negated conjunction: matches when the sub-conjunction has no match
    Ncc(Vec<Condition>),
    /// Deterministic computation bound to a variable
    Bind(BindSpec),
    /// Predicate over accumulated bindings
    Filter(FilterSpec),
    /// Conjunction
    And(Vec<Condition>),
    /// Disjunction
    Or(Vec<Condition>),
    /// Negation; pushed through `And`/`Or`, preserved on pattern leaves
    Not(Box<Condition>),
}

impl Condition {
    /// Positive pattern clause
    pub fn pattern(
        id: impl Into<PatternField>,
        attr: impl Into<PatternField>,
        value: impl Into<PatternField>,
    ) -> Self {
        Self::Pattern(Pattern::new(id, attr, value))
    }

    /// Negated pattern clause
    pub fn negated(
        id: impl Into<PatternField>,
        attr: impl Into<PatternField>,
        value: impl Into<PatternField>,
    ) -> Self {
        Self::Negated(Pattern::new(id, attr, value))
    }

    /// Negated conjunction over the given sub-conditions
    pub fn ncc(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Ncc(conditions.into_iter().collect())
    }

    /// Filter clause reading the listed variables
    pub fn filter(
        vars: Vec<Variable>,
        thunk: impl Fn(&BindingScope<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::Filter(FilterSpec { vars, thunk: Arc::new(thunk) })
    }

    /// Bind clause computing a value for `target`
    pub fn bind(
        vars: Vec<Variable>,
        target: impl Into<Variable>,
        thunk: impl Fn(&BindingScope<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::Bind(BindSpec { vars, target: target.into(), thunk: Arc::new(thunk) })
    }

    /// Conjunction of the given conditions
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(conditions.into_iter().collect())
    }

    /// Disjunction of the given conditions
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    /// The always-true condition: a rule with this left-hand side has
    /// exactly one activation with empty bindings
    pub fn always() -> Self {
        Self::And(Vec::new())
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

impl std::ops::BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        match (self, rhs) {
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), rhs) => {
                left.push(rhs);
                Condition::And(left)
            }
            (lhs, Condition::And(mut right)) => {
                right.insert(0, lhs);
                Condition::And(right)
            }
            (lhs, rhs) => Condition::And(vec![lhs, rhs]),
        }
    }
}

impl std::ops::BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        match (self, rhs) {
            (Condition::Or(mut left), Condition::Or(right)) => {
                left.extend(right);
                Condition::Or(left)
            }
            (Condition::Or(mut left), rhs) => {
                left.push(rhs);
                Condition::Or(left)
            }
            (lhs, Condition::Or(mut right)) => {
                right.insert(0, lhs);
                Condition::Or(right)
            }
            (lhs, rhs) => Condition::Or(vec![lhs, rhs]),
        }
    }
}

impl std::ops::Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_types::Variable;

    fn truthy() -> Condition {
        Condition::filter(vec![], |_| Ok(Value::Boolean(true)))
    }

    #[test]
    fn operator_precedence_builds_expected_tree() {
        let a = Condition::pattern("a", "is", "a");
        let b = Condition::pattern("b", "is", "b");
        let c = Condition::pattern("c", "is", "c");

        // a | b & c groups as a | (b & c)
        let sugar = a.clone() | b.clone() & c.clone();
        let explicit = Condition::or([a, Condition::and([b, c])]);
        assert_eq!(sugar, explicit);
    }

    #[test]
    fn chained_connectives_flatten() {
        let a = Condition::pattern("a", "is", "a");
        let b = Condition::pattern("b", "is", "b");
        let c = Condition::pattern("c", "is", "c");

        let chained = a.clone() & b.clone() & c.clone();
        assert_eq!(chained, Condition::and([a.clone(), b.clone(), c.clone()]));

        let chained = a.clone() | b.clone() | c.clone();
        assert_eq!(chained, Condition::or([a, b, c]));
    }

    #[test]
    fn filter_equality_is_identity() {
        let f = truthy();
        assert_eq!(f.clone(), f.clone());
        assert_ne!(f, truthy());
    }

    #[test]
    fn binding_scope_lookup() {
        let mut bindings = HashMap::new();
        bindings.insert(Variable::new("x"), Value::from(3));
        let scope = BindingScope::new(&bindings);
        assert_eq!(scope.get("x").unwrap(), &Value::Integer(3));
        assert!(matches!(
            scope.get("missing"),
            Err(crate::error::EngineError::UnboundVariable { .. })
        ));
    }
}

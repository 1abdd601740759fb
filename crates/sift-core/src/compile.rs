//! Rule compilation: DNF normalization and network construction
//!
//! A condition tree is first rewritten to disjunctive normal form (double
//! negation elimination, De Morgan through `And`/`Or` only, distribution of
//! `And` over `Or`), leaving a list of conjuncts of leaf clauses. Negation
//! over a pattern leaf never De Morgans: `Not(Pattern)` becomes a negative
//! clause and `Not(Negated)` folds back to the positive pattern.
//!
//! Each conjunct is then compiled left-to-right under the prefix already in
//! the network, sharing memories, joins, negative nodes, and NCC pairs
//! whenever the right alpha memory and (order-insensitively) the test list
//! agree.

use crate::conditions::{BindSpec, Condition, FilterSpec};
use crate::error::{EngineError, EngineResult};
use crate::network::{Production, ProductionEntry, ReteNetwork};
use crate::nodes::{
    BetaMemoryNode, BindNode, FilterNode, JoinNode, JoinTest, NccNode, NccPartnerNode,
    NegativeNode, NodeId, ProductionId, ProductionNode, ReteNode,
};
use sift_types::{Pattern, Slot, Variable};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, trace};

/// A leaf clause of a normalized conjunct
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Positive pattern
    Pattern(Pattern),
    /// Negated pattern (negation as failure)
    Negated(Pattern),
    /// Negated conjunction of leaf clauses
    Ncc(Vec<Leaf>),
    /// Value computation
    Bind(BindSpec),
    /// Predicate
    Filter(FilterSpec),
}

impl Leaf {
    /// Rebuild a condition from this leaf
    pub fn to_condition(&self) -> Condition {
        match self {
            Self::Pattern(p) => Condition::Pattern(p.clone()),
            Self::Negated(p) => Condition::Negated(p.clone()),
            Self::Ncc(leaves) => Condition::Ncc(leaves.iter().map(Leaf::to_condition).collect()),
            Self::Bind(spec) => Condition::Bind(spec.clone()),
            Self::Filter(spec) => Condition::Filter(spec.clone()),
        }
    }
}

/// Normalize a condition tree to disjunctive normal form: a disjunction of
/// conjuncts, each a list of leaf clauses in source order.
///
/// Fails on structures that cannot be compiled: negation over a thunk
/// clause or an NCC, and NCC bodies that are empty or disjunctive.
pub fn dnf(condition: &Condition) -> EngineResult<Vec<Vec<Leaf>>> {
    match condition {
        Condition::And(conditions) => {
            let mut conjuncts = vec![Vec::new()];
            for condition in conditions {
                let clauses = dnf(condition)?;
                let mut distributed = Vec::with_capacity(conjuncts.len() * clauses.len());
                for prefix in &conjuncts {
                    for clause in &clauses {
                        let mut conjunct = prefix.clone();
                        conjunct.extend(clause.iter().cloned());
                        distributed.push(conjunct);
                    }
                }
                conjuncts = distributed;
            }
            Ok(conjuncts)
        }
        Condition::Or(conditions) => {
            let mut conjuncts = Vec::new();
            for condition in conditions {
                conjuncts.extend(dnf(condition)?);
            }
            Ok(conjuncts)
        }
        Condition::Not(inner) => match &**inner {
            Condition::Not(inner) => dnf(inner),
            Condition::And(conditions) => dnf(&Condition::Or(
                conditions.iter().map(|c| Condition::Not(Box::new(c.clone()))).collect(),
            )),
            Condition::Or(conditions) => dnf(&Condition::And(
                conditions.iter().map(|c| Condition::Not(Box::new(c.clone()))).collect(),
            )),
            Condition::Pattern(pattern) => Ok(vec![vec![Leaf::Negated(pattern.clone())]]),
            Condition::Negated(pattern) => Ok(vec![vec![Leaf::Pattern(pattern.clone())]]),
            Condition::Ncc(_) => {
                Err(EngineError::malformed("negation over an NCC is not supported"))
            }
            Condition::Bind(_) | Condition::Filter(_) => Err(EngineError::malformed(
                "only patterns and boolean connectives can be negated",
            )),
        },
        Condition::Pattern(pattern) => Ok(vec![vec![Leaf::Pattern(pattern.clone())]]),
        Condition::Negated(pattern) => Ok(vec![vec![Leaf::Negated(pattern.clone())]]),
        Condition::Bind(spec) => Ok(vec![vec![Leaf::Bind(spec.clone())]]),
        Condition::Filter(spec) => Ok(vec![vec![Leaf::Filter(spec.clone())]]),
        Condition::Ncc(sub_conditions) => {
            let mut leaves = Vec::new();
            for sub in sub_conditions {
                let mut clauses = dnf(sub)?;
                if clauses.len() != 1 {
                    return Err(EngineError::malformed(
                        "NCC sub-conditions must form a single conjunction",
                    ));
                }
                leaves.append(&mut clauses[0]);
            }
            if leaves.is_empty() {
                return Err(EngineError::malformed("NCC requires at least one sub-condition"));
            }
            Ok(vec![vec![Leaf::Ncc(leaves)]])
        }
    }
}

/// Rebuild a condition tree from a normal form (an `Or` of `And`s)
pub fn dnf_to_condition(conjuncts: &[Vec<Leaf>]) -> Condition {
    Condition::Or(
        conjuncts
            .iter()
            .map(|conjunct| Condition::And(conjunct.iter().map(Leaf::to_condition).collect()))
            .collect(),
    )
}

/// Verify that every variable a thunk declares is bound by an earlier
/// clause of its conjunct. Sub-network variables stay local to their NCC.
fn check_conjunct_variables(conjunct: &[Leaf], bound: &mut HashSet<Variable>) -> EngineResult<()> {
    for leaf in conjunct {
        match leaf {
            Leaf::Pattern(pattern) => {
                for (_, var) in pattern.variables() {
                    bound.insert(var.clone());
                }
            }
            // Negative clauses constrain but never bind.
            Leaf::Negated(_) => {}
            Leaf::Ncc(sub) => {
                let mut inner = bound.clone();
                check_conjunct_variables(sub, &mut inner)?;
            }
            Leaf::Filter(spec) => {
                for var in &spec.vars {
                    if !bound.contains(var) {
                        return Err(EngineError::unbound(var, "filter clause"));
                    }
                }
            }
            Leaf::Bind(spec) => {
                for var in &spec.vars {
                    if !bound.contains(var) {
                        return Err(EngineError::unbound(var, "bind clause"));
                    }
                }
                bound.insert(spec.target.clone());
            }
        }
    }
    Ok(())
}

/// Where a variable's current value can be read from during a join
#[derive(Debug, Clone)]
enum Binder {
    /// Bound by the pattern at this chain level, in this slot
    Level { level: usize, slot: Slot },
    /// Bound by a `Bind` clause; resolved through token bindings
    Computed,
}

/// Compiler state for one conjunct (or one NCC sub-network, which starts
/// from a clone of the enclosing state so it shares the prefix)
#[derive(Debug, Clone)]
struct BuildState {
    /// Node the next clause attaches under
    current: NodeId,
    /// Chain levels already materialized below `current`'s memory;
    /// `None` entries are negative/NCC/bind/filter levels
    levels: Vec<Option<Pattern>>,
    /// The level the next memory-like node will materialize
    pending: Option<Option<Pattern>>,
    /// Closest binder for each variable seen so far
    catalog: HashMap<Variable, Binder>,
}

impl<P> ReteNetwork<P> {
    /// Compile a rule and link its terminals into the network.
    ///
    /// Compile-structure errors are reported before anything is mutated.
    /// A thunk failure while populating new nodes escapes immediately; the
    /// clauses already compiled stay in place.
    #[instrument(skip(self, production), level = "debug")]
    pub fn add_production(&mut self, production: Production<P>) -> EngineResult<ProductionId> {
        let conjuncts = dnf(&production.condition)?;
        for conjunct in &conjuncts {
            check_conjunct_variables(conjunct, &mut HashSet::new())?;
        }

        let id = self.next_production_id;
        self.next_production_id += 1;
        debug!(production = id, name = %production.name, conjuncts = conjuncts.len(), "adding production");
        self.productions.insert(
            id,
            ProductionEntry {
                name: production.name,
                payload: production.payload,
                terminals: Vec::new(),
            },
        );
        for conjunct in &conjuncts {
            let terminal = self.build_conjunct(conjunct, id)?;
            self.productions
                .get_mut(&id)
                .expect("production just inserted")
                .terminals
                .push(terminal);
        }
        Ok(id)
    }

    fn build_conjunct(&mut self, conjunct: &[Leaf], production: ProductionId) -> EngineResult<NodeId> {
        let mut state = BuildState {
            current: self.beta_root,
            levels: Vec::new(),
            pending: None,
            catalog: HashMap::new(),
        };
        self.extend_network(&mut state, conjunct)?;

        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::Production(ProductionNode {
                id,
                parent: state.current,
                production,
                items: Vec::new(),
            }),
        );
        self.add_child(state.current, id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    /// Build (or share) nodes for a run of leaf clauses below `state`
    fn extend_network(&mut self, state: &mut BuildState, leaves: &[Leaf]) -> EngineResult<()> {
        for leaf in leaves {
            match leaf {
                Leaf::Pattern(pattern) => {
                    if state.pending.is_some() {
                        state.current = self.build_or_share_beta_memory(state.current)?;
                        state.levels.push(state.pending.take().expect("pending level"));
                    }
                    let (tests, var_bindings) = compute_join_tests(state, pattern);
                    record_binders(state, pattern);
                    let alpha = self.build_or_share_alpha_memory(pattern);
                    state.current =
                        self.build_or_share_join_node(state.current, alpha, tests, var_bindings);
                    state.pending = Some(Some(pattern.clone()));
                }
                Leaf::Negated(pattern) => {
                    state.levels.push(state.pending.take().unwrap_or(None));
                    let (tests, _) = compute_join_tests(state, pattern);
                    let alpha = self.build_or_share_alpha_memory(pattern);
                    state.current =
                        self.build_or_share_negative_node(state.current, alpha, tests)?;
                    state.pending = Some(None);
                }
                Leaf::Filter(spec) => {
                    state.levels.push(state.pending.take().unwrap_or(None));
                    state.current = self.add_filter_node(state.current, spec.clone())?;
                    state.pending = Some(None);
                }
                Leaf::Bind(spec) => {
                    state.levels.push(state.pending.take().unwrap_or(None));
                    state.current = self.add_bind_node(state.current, spec.clone())?;
                    state.catalog.entry(spec.target.clone()).or_insert(Binder::Computed);
                    state.pending = Some(None);
                }
                Leaf::Ncc(sub) => {
                    self.build_or_share_ncc(state, sub)?;
                }
            }
        }
        Ok(())
    }

    fn build_or_share_beta_memory(&mut self, parent: NodeId) -> EngineResult<NodeId> {
        let shared = self
            .node(parent)
            .children()
            .iter()
            .copied()
            .find(|&c| matches!(self.node(c), ReteNode::BetaMemory(_)));
        if let Some(id) = shared {
            trace!(node = id, "sharing beta memory");
            return Ok(id);
        }
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::BetaMemory(BetaMemoryNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                items: Vec::new(),
            }),
        );
        self.add_child(parent, id);
        self.update_new_node_with_matches_from_above(id)?;
        trace!(node = id, "built beta memory");
        Ok(id)
    }

    fn build_or_share_join_node(
        &mut self,
        parent: NodeId,
        alpha: NodeId,
        tests: Vec<JoinTest>,
        var_bindings: Vec<(Variable, Slot)>,
    ) -> NodeId {
        for &child in self.node(parent).children() {
            if let ReteNode::Join(join) = self.node(child) {
                if join.alpha_memory == alpha
                    && tests_equal_unordered(&join.tests, &tests)
                    && join.var_bindings == var_bindings
                {
                    trace!(node = child, "sharing join node");
                    return child;
                }
            }
        }
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::Join(JoinNode {
                id,
                parent,
                children: Vec::new(),
                alpha_memory: alpha,
                tests,
                var_bindings,
            }),
        );
        self.add_child(parent, id);
        self.alpha_memories
            .get_mut(&alpha)
            .expect("live alpha memory")
            .successors
            .push(id);
        trace!(node = id, "built join node");
        id
    }

    fn build_or_share_negative_node(
        &mut self,
        parent: NodeId,
        alpha: NodeId,
        tests: Vec<JoinTest>,
    ) -> EngineResult<NodeId> {
        for &child in self.node(parent).children() {
            if let ReteNode::Negative(negative) = self.node(child) {
                if negative.alpha_memory == alpha && tests_equal_unordered(&negative.tests, &tests)
                {
                    trace!(node = child, "sharing negative node");
                    return Ok(child);
                }
            }
        }
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::Negative(NegativeNode {
                id,
                parent,
                children: Vec::new(),
                alpha_memory: alpha,
                tests,
                items: Vec::new(),
            }),
        );
        self.add_child(parent, id);
        self.alpha_memories
            .get_mut(&alpha)
            .expect("live alpha memory")
            .successors
            .push(id);
        self.update_new_node_with_matches_from_above(id)?;
        trace!(node = id, "built negative node");
        Ok(id)
    }

    fn add_filter_node(&mut self, parent: NodeId, spec: FilterSpec) -> EngineResult<NodeId> {
        // Thunks are opaque, so filter nodes are never shared.
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::Filter(FilterNode {
                id,
                parent,
                children: Vec::new(),
                items: Vec::new(),
                spec,
            }),
        );
        self.add_child(parent, id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    fn add_bind_node(&mut self, parent: NodeId, spec: BindSpec) -> EngineResult<NodeId> {
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            ReteNode::Bind(BindNode {
                id,
                parent,
                children: Vec::new(),
                items: Vec::new(),
                spec,
            }),
        );
        self.add_child(parent, id);
        self.update_new_node_with_matches_from_above(id)?;
        Ok(id)
    }

    fn build_or_share_ncc(&mut self, state: &mut BuildState, sub: &[Leaf]) -> EngineResult<()> {
        // The sub-network grows from the same prefix, on a parallel branch.
        let mut sub_state = state.clone();
        if sub_state.pending.is_none() {
            // The prefix ends in a memory: pin a memory at the top of the
            // sub-network so owner and result chains stay level-aligned.
            sub_state.current = self.build_or_share_beta_memory(sub_state.current)?;
            sub_state.levels.push(None);
        }
        self.extend_network(&mut sub_state, sub)?;
        let result_chain_len = sub_state.levels.len() + usize::from(sub_state.pending.is_some());

        // The NCC memory materializes the pending level on the owner branch.
        state.levels.push(state.pending.take().unwrap_or(None));
        let owner_chain_len = state.levels.len();
        let levels_above = result_chain_len - owner_chain_len;

        // Share an existing NCC over the same prefix and sub-network.
        for &child in self.node(sub_state.current).children() {
            if let ReteNode::NccPartner(partner) = self.node(child) {
                if partner.levels_above == levels_above
                    && self.node(partner.ncc_node).parent() == Some(state.current)
                {
                    trace!(node = partner.ncc_node, "sharing NCC");
                    state.current = partner.ncc_node;
                    state.pending = Some(None);
                    return Ok(());
                }
            }
        }

        let ncc_id = self.next_node_id();
        let partner_id = self.next_node_id();
        self.nodes.insert(
            ncc_id,
            ReteNode::Ncc(NccNode {
                id: ncc_id,
                parent: state.current,
                children: Vec::new(),
                items: Vec::new(),
                partner: partner_id,
            }),
        );
        // Register the NCC memory ahead of the sub-network's top node:
        // children activate in reverse registration order, so the
        // sub-network settles (and the partner buffers its results)
        // before the NCC memory admits the owner.
        let subnet_top = self.child_on_path(state.current, sub_state.current);
        let siblings = self
            .node_mut(state.current)
            .children_mut()
            .expect("prefix node accepts children");
        let position = siblings.iter().position(|&c| c == subnet_top).unwrap_or(siblings.len());
        siblings.insert(position, ncc_id);

        self.nodes.insert(
            partner_id,
            ReteNode::NccPartner(NccPartnerNode {
                id: partner_id,
                parent: sub_state.current,
                ncc_node: ncc_id,
                levels_above,
                new_result_buffer: Vec::new(),
            }),
        );
        self.add_child(sub_state.current, partner_id);

        // Owners first, then their results: the partner pass finds every
        // owner already in the memory.
        self.update_new_node_with_matches_from_above(ncc_id)?;
        self.update_new_node_with_matches_from_above(partner_id)?;

        trace!(node = ncc_id, partner = partner_id, levels_above, "built NCC pair");
        state.current = ncc_id;
        state.pending = Some(None);
        Ok(())
    }

    /// The child of `ancestor` on the parent path from `descendant`
    fn child_on_path(&self, ancestor: NodeId, descendant: NodeId) -> NodeId {
        let mut node = descendant;
        loop {
            let parent = self.node(node).parent().expect("descendant reaches ancestor");
            if parent == ancestor {
                return node;
            }
            node = parent;
        }
    }
}

/// Tests linking a pattern's variables to their closest earlier binders,
/// plus the variables this pattern binds for downstream clauses
fn compute_join_tests(
    state: &BuildState,
    pattern: &Pattern,
) -> (Vec<JoinTest>, Vec<(Variable, Slot)>) {
    let mut tests = Vec::new();
    let mut var_bindings = Vec::new();
    let mut seen: Vec<(&Variable, Slot)> = Vec::new();
    for (slot, var) in pattern.variables() {
        if let Some(&(_, first)) = seen.iter().find(|(v, _)| *v == var) {
            // Repeated within this pattern: both fields must agree.
            tests.push(JoinTest::RightFields { first, second: slot });
            continue;
        }
        seen.push((var, slot));
        match state.catalog.get(var) {
            Some(Binder::Level { level, slot: left_slot }) => tests.push(JoinTest::WmeField {
                right_slot: slot,
                ancestor_depth: state.levels.len() - 1 - level,
                left_slot: *left_slot,
            }),
            Some(Binder::Computed) => {
                tests.push(JoinTest::Binding { right_slot: slot, variable: var.clone() })
            }
            None => var_bindings.push((var.clone(), slot)),
        }
    }
    (tests, var_bindings)
}

/// Point every variable of the pattern at this level as its closest binder
fn record_binders(state: &mut BuildState, pattern: &Pattern) {
    let level = state.levels.len();
    let mut recorded: HashSet<&Variable> = HashSet::new();
    for (slot, var) in pattern.variables() {
        if recorded.insert(var) {
            state.catalog.insert(var.clone(), Binder::Level { level, slot });
        }
    }
}

/// Order-insensitive test-list equality, with multiplicity
fn tests_equal_unordered(a: &[JoinTest], b: &[JoinTest]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut matched = vec![false; b.len()];
    for test in a {
        match b
            .iter()
            .enumerate()
            .find(|(i, candidate)| !matched[*i] && *candidate == test)
        {
            Some((i, _)) => matched[i] = true,
            None => return false,
        }
    }
    true
}

//! The Rete network: incremental match over working-memory triples
//!
//! [`ReteNetwork`] owns every arena (nodes, alpha memories, WMEs, tokens)
//! and implements the four mutations (`add_wme`, `remove_wme`,
//! `add_production`, `remove_production`) plus the activation surface.
//! Mutations run to completion before the next begins; propagation is
//! depth-first from the triggering node, and a node's children are
//! activated in reverse registration order (NCC partner sub-networks must
//! settle before the NCC memory evaluates emptiness).
//!
//! Rule compilation lives in [`crate::compile`].

use crate::alpha::{AlphaMemory, ConstantTest};
use crate::conditions::BindingScope;
use crate::error::EngineResult;
use crate::nodes::{
    BetaMemoryNode, JoinTest, NodeId, NodeKind, ProductionId, ReteNode,
};
use crate::token::{TokenId, TokenStore};
use crate::wme::{WmeId, WmeStore};
use sift_types::{Pattern, Slot, Triple, Value, Variable};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, trace};

/// A rule handed to the engine: a condition tree, a name for diagnostics,
/// and an opaque payload surfaced with every activation
#[derive(Debug, Clone)]
pub struct Production<P = ()> {
    /// Diagnostic name
    pub name: String,
    /// Left-hand side
    pub condition: crate::conditions::Condition,
    /// Attached to every activation of this rule
    pub payload: P,
}

impl Production<()> {
    /// A rule with no payload
    pub fn new(name: impl Into<String>, condition: crate::conditions::Condition) -> Self {
        Self { name: name.into(), condition, payload: () }
    }
}

impl<P> Production<P> {
    /// A rule with an attached payload
    pub fn with_payload(
        name: impl Into<String>,
        condition: crate::conditions::Condition,
        payload: P,
    ) -> Self {
        Self { name: name.into(), condition, payload }
    }
}

#[derive(Debug)]
pub(crate) struct ProductionEntry<P> {
    pub(crate) name: String,
    pub(crate) payload: P,
    /// One terminal per conjunct of the rule's normal form
    pub(crate) terminals: Vec<NodeId>,
}

/// One live match of one conjunct of one rule
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    /// Per-level WMEs in clause order; `None` at negative/NCC/bind/filter
    /// levels
    pub wmes: Vec<Option<Triple>>,
    /// Variable bindings accumulated along the match
    pub bindings: HashMap<Variable, Value>,
}

/// An activation paired with the rule it belongs to
#[derive(Debug)]
pub struct Match<'a, P> {
    /// Id of the matched rule
    pub production: ProductionId,
    /// The rule's diagnostic name
    pub name: &'a str,
    /// The rule's payload
    pub payload: &'a P,
    /// The match itself
    pub activation: Activation,
}

/// Aggregate counts over the network, for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStats {
    pub wme_count: usize,
    pub token_count: usize,
    pub node_count: usize,
    pub alpha_memory_count: usize,
    pub production_count: usize,
}

/// The match network. Generic over the payload type attached to rules.
#[derive(Debug)]
pub struct ReteNetwork<P = ()> {
    pub(crate) nodes: HashMap<NodeId, ReteNode>,
    pub(crate) alpha_memories: HashMap<NodeId, AlphaMemory>,
    pub(crate) alpha_index: HashMap<ConstantTest, NodeId>,
    pub(crate) wmes: WmeStore,
    pub(crate) tokens: TokenStore,
    pub(crate) productions: BTreeMap<ProductionId, ProductionEntry<P>>,
    pub(crate) beta_root: NodeId,
    next_node_id: NodeId,
    pub(crate) next_production_id: ProductionId,
    pub(crate) next_fact_id: u64,
}

impl<P> Default for ReteNetwork<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ReteNetwork<P> {
    /// Create an empty network: a root beta memory holding the sentinel
    /// token, and nothing else
    pub fn new() -> Self {
        let beta_root: NodeId = 0;
        let mut nodes = HashMap::new();
        nodes.insert(
            beta_root,
            ReteNode::BetaMemory(BetaMemoryNode {
                id: beta_root,
                parent: None,
                children: Vec::new(),
                items: Vec::new(),
            }),
        );
        let mut tokens = TokenStore::new();
        let root_token = tokens.create(beta_root, None, None, HashMap::new());
        if let Some(ReteNode::BetaMemory(root)) = nodes.get_mut(&beta_root) {
            root.items.push(root_token);
        }
        Self {
            nodes,
            alpha_memories: HashMap::new(),
            alpha_index: HashMap::new(),
            wmes: WmeStore::new(),
            tokens,
            productions: BTreeMap::new(),
            beta_root,
            next_node_id: 1,
            next_production_id: 0,
            next_fact_id: 0,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &ReteNode {
        self.nodes.get(&id).expect("live node id")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ReteNode {
        self.nodes.get_mut(&id).expect("live node id")
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent)
            .children_mut()
            .expect("parent accepts children")
            .push(child);
    }

    // ---------------------------------------------------------------------
    // Working memory
    // ---------------------------------------------------------------------

    /// Insert a triple into working memory and run it through the network.
    ///
    /// Triples are interned: re-adding a live triple returns the existing
    /// id without re-activating anything.
    #[instrument(skip(self, triple), level = "debug")]
    pub fn add_wme(&mut self, triple: Triple) -> EngineResult<WmeId> {
        let (id, new) = self.wmes.insert(triple);
        if !new {
            trace!(wme = id, "triple already interned");
            return Ok(id);
        }
        let triple = self.wmes.get(id).triple.clone();
        debug!(wme = id, %triple, "adding WME");
        let landing: Vec<NodeId> = ConstantTest::permutations(&triple)
            .filter_map(|key| self.alpha_index.get(&key).copied())
            .collect();
        for memory in landing {
            self.activate_alpha_memory(memory, id)?;
        }
        Ok(id)
    }

    /// Remove a triple from working memory, retracting every dependent
    /// partial match. Unknown triples are a silent no-op.
    #[instrument(skip(self, triple), level = "debug")]
    pub fn remove_wme(&mut self, triple: &Triple) -> EngineResult<()> {
        let Some(id) = self.wmes.id_of(triple) else {
            debug!(%triple, "remove_wme: unknown triple");
            return Ok(());
        };
        debug!(wme = id, %triple, "removing WME");

        // Leave every alpha memory first so no propagation below can see
        // the departing element.
        let memberships = std::mem::take(&mut self.wmes.get_mut(id).alpha_memories);
        for memory in memberships {
            if let Some(am) = self.alpha_memories.get_mut(&memory) {
                am.wmes.retain(|&w| w != id);
            }
        }

        // Dematerialize every token embedding this WME.
        loop {
            let Some(&token) = self.wmes.get(id).tokens.first() else { break };
            self.delete_token_and_descendants(token)?;
        }

        // Unblock negative-node tokens, in the order the blocks were taken.
        loop {
            if self.wmes.get(id).negative_results.is_empty() {
                break;
            }
            let token = self.wmes.get_mut(id).negative_results.remove(0);
            let results = &mut self.tokens.get_mut(token).join_results;
            if let Some(pos) = results.iter().position(|&w| w == id) {
                results.remove(pos);
            }
            if self.tokens.get(token).join_results.is_empty() {
                let node = self.tokens.get(token).node;
                let children: Vec<NodeId> = self.node(node).children().to_vec();
                for child in children.into_iter().rev() {
                    self.left_activate(child, token, None, HashMap::new())?;
                }
            }
        }

        self.wmes.remove(id);
        Ok(())
    }

    fn activate_alpha_memory(&mut self, memory: NodeId, wme: WmeId) -> EngineResult<()> {
        let am = self.alpha_memories.get_mut(&memory).expect("live alpha memory");
        am.wmes.push(wme);
        self.wmes.get_mut(wme).alpha_memories.push(memory);
        trace!(alpha = memory, wme, "alpha memory activation");
        // Successors fire in insertion order.
        let successors = self
            .alpha_memories
            .get(&memory)
            .expect("live alpha memory")
            .successors
            .clone();
        for successor in successors {
            self.right_activate(successor, wme)?;
        }
        Ok(())
    }

    /// Create (or return) the alpha memory for a pattern's constant tests.
    /// Fresh memories are back-filled from current working memory.
    pub fn build_or_share_alpha_memory(&mut self, pattern: &Pattern) -> NodeId {
        let key = ConstantTest::from(pattern);
        if let Some(&id) = self.alpha_index.get(&key) {
            trace!(alpha = id, "sharing alpha memory");
            return id;
        }
        let id = self.next_node_id();
        let mut memory = AlphaMemory::new(id, key.clone());
        let matching: Vec<WmeId> =
            self.wmes.iter().filter(|w| key.matches(&w.triple)).map(|w| w.id).collect();
        for wme in matching {
            memory.wmes.push(wme);
            self.wmes.get_mut(wme).alpha_memories.push(id);
        }
        debug!(alpha = id, backfilled = memory.wmes.len(), "built alpha memory");
        self.alpha_index.insert(key, id);
        self.alpha_memories.insert(id, memory);
        id
    }

    /// Current contents of an alpha memory, in insertion order
    pub fn alpha_memory_wmes(&self, id: NodeId) -> Vec<Triple> {
        self.alpha_memories
            .get(&id)
            .map(|am| am.wmes.iter().map(|&w| self.wmes.get(w).triple.clone()).collect())
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Activations (data flowing through the network)
    // ---------------------------------------------------------------------

    fn make_token(
        &mut self,
        node: NodeId,
        parent: TokenId,
        wme: Option<WmeId>,
        bindings: HashMap<Variable, Value>,
    ) -> TokenId {
        let token = self.tokens.create(node, Some(parent), wme, bindings);
        if let Some(wme) = wme {
            self.wmes.get_mut(wme).tokens.push(token);
        }
        token
    }

    fn make_binding(
        &self,
        var_bindings: &[(Variable, Slot)],
        wme: WmeId,
    ) -> HashMap<Variable, Value> {
        let triple = &self.wmes.get(wme).triple;
        var_bindings
            .iter()
            .map(|(var, slot)| (var.clone(), triple.get(*slot).clone()))
            .collect()
    }

    /// Evaluate join tests for a candidate right-side WME against the
    /// anchor token: the left token for joins, the stored token for
    /// negative nodes. The compiler fixes depths accordingly.
    fn eval_tests(&self, tests: &[JoinTest], anchor: TokenId, wme: WmeId) -> bool {
        let triple = &self.wmes.get(wme).triple;
        for test in tests {
            match test {
                JoinTest::WmeField { right_slot, ancestor_depth, left_slot } => {
                    let Some(ancestor) = self.tokens.nth_parent(anchor, *ancestor_depth) else {
                        return false;
                    };
                    let Some(left_wme) = self.tokens.get(ancestor).wme else {
                        return false;
                    };
                    let left = self.wmes.get(left_wme).triple.get(*left_slot);
                    if triple.get(*right_slot) != left {
                        return false;
                    }
                }
                JoinTest::Binding { right_slot, variable } => {
                    match self.tokens.binding_lookup(anchor, variable) {
                        Some(value) => {
                            if triple.get(*right_slot) != value {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                JoinTest::RightFields { first, second } => {
                    if triple.get(*first) != triple.get(*second) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// A new WME entered the given node's right alpha memory
    pub(crate) fn right_activate(&mut self, node_id: NodeId, wme: WmeId) -> EngineResult<()> {
        trace!(node = node_id, wme, "right activation");
        match self.node(node_id).node_kind() {
            NodeKind::Join => {
                let (parent, tests, var_bindings, children) = match self.node(node_id) {
                    ReteNode::Join(j) => {
                        (j.parent, j.tests.clone(), j.var_bindings.clone(), j.children.clone())
                    }
                    _ => unreachable!(),
                };
                let left_tokens: Vec<TokenId> =
                    self.node(parent).items().expect("join parent is a memory").clone();
                for token in left_tokens {
                    if self.eval_tests(&tests, token, wme) {
                        let binding = self.make_binding(&var_bindings, wme);
                        for &child in children.iter().rev() {
                            self.left_activate(child, token, Some(wme), binding.clone())?;
                        }
                    }
                }
            }
            NodeKind::Negative => {
                let (tests, items) = match self.node(node_id) {
                    ReteNode::Negative(n) => (n.tests.clone(), n.items.clone()),
                    _ => unreachable!(),
                };
                for token in items {
                    if self.eval_tests(&tests, token, wme) {
                        let was_unblocked = self.tokens.get(token).join_results.is_empty();
                        self.tokens.get_mut(token).join_results.push(wme);
                        self.wmes.get_mut(wme).negative_results.push(token);
                        if was_unblocked {
                            self.delete_descendants_of_token(token)?;
                        }
                    }
                }
            }
            other => {
                debug_assert!(false, "right activation of {other:?}");
            }
        }
        Ok(())
    }

    /// A token (plus optional WME and binding extension) arrives from
    /// upstream. Memory-like nodes materialize their own token; join nodes
    /// use the incoming token as the left side of the join.
    pub(crate) fn left_activate(
        &mut self,
        node_id: NodeId,
        parent_token: TokenId,
        wme: Option<WmeId>,
        binding: HashMap<Variable, Value>,
    ) -> EngineResult<()> {
        trace!(node = node_id, token = parent_token, "left activation");
        match self.node(node_id).node_kind() {
            NodeKind::BetaMemory => {
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                if let ReteNode::BetaMemory(m) = self.node_mut(node_id) {
                    m.items.push(new_token);
                }
                let children = self.node(node_id).children().to_vec();
                for child in children.into_iter().rev() {
                    self.left_activate(child, new_token, None, HashMap::new())?;
                }
            }
            NodeKind::Join => {
                let (alpha, tests, var_bindings, children) = match self.node(node_id) {
                    ReteNode::Join(j) => (
                        j.alpha_memory,
                        j.tests.clone(),
                        j.var_bindings.clone(),
                        j.children.clone(),
                    ),
                    _ => unreachable!(),
                };
                let candidates =
                    self.alpha_memories.get(&alpha).expect("live alpha memory").wmes.clone();
                for candidate in candidates {
                    if self.eval_tests(&tests, parent_token, candidate) {
                        let extension = self.make_binding(&var_bindings, candidate);
                        for &child in children.iter().rev() {
                            self.left_activate(
                                child,
                                parent_token,
                                Some(candidate),
                                extension.clone(),
                            )?;
                        }
                    }
                }
            }
            NodeKind::Negative => {
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                let (alpha, tests) = match self.node_mut(node_id) {
                    ReteNode::Negative(n) => {
                        n.items.push(new_token);
                        (n.alpha_memory, n.tests.clone())
                    }
                    _ => unreachable!(),
                };
                let candidates =
                    self.alpha_memories.get(&alpha).expect("live alpha memory").wmes.clone();
                for candidate in candidates {
                    if self.eval_tests(&tests, new_token, candidate) {
                        self.tokens.get_mut(new_token).join_results.push(candidate);
                        self.wmes.get_mut(candidate).negative_results.push(new_token);
                    }
                }
                if self.tokens.get(new_token).join_results.is_empty() {
                    let children = self.node(node_id).children().to_vec();
                    for child in children.into_iter().rev() {
                        self.left_activate(child, new_token, None, HashMap::new())?;
                    }
                }
            }
            NodeKind::Ncc => {
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                let partner = match self.node_mut(node_id) {
                    ReteNode::Ncc(n) => {
                        n.items.push(new_token);
                        n.partner
                    }
                    _ => unreachable!(),
                };
                // Claim buffered sub-network results for this prefix. The
                // partner ran first (reverse-order child activation), so
                // any results for this token are already waiting.
                let (levels_above, buffered) = match self.node(partner) {
                    ReteNode::NccPartner(p) => (p.levels_above, p.new_result_buffer.clone()),
                    _ => unreachable!(),
                };
                let mut remaining = Vec::new();
                for result in buffered {
                    if self.ncc_prefix_matches(result, new_token, levels_above) {
                        self.tokens.get_mut(new_token).ncc_results.push(result);
                        self.tokens.get_mut(result).owner = Some(new_token);
                    } else {
                        remaining.push(result);
                    }
                }
                if let ReteNode::NccPartner(p) = self.node_mut(partner) {
                    p.new_result_buffer = remaining;
                }
                if self.tokens.get(new_token).ncc_results.is_empty() {
                    let children = self.node(node_id).children().to_vec();
                    for child in children.into_iter().rev() {
                        self.left_activate(child, new_token, None, HashMap::new())?;
                    }
                }
            }
            NodeKind::NccPartner => {
                let new_result = self.make_token(node_id, parent_token, wme, binding);
                let (ncc_node, levels_above) = match self.node(node_id) {
                    ReteNode::NccPartner(p) => (p.ncc_node, p.levels_above),
                    _ => unreachable!(),
                };
                let owners: Vec<TokenId> =
                    self.node(ncc_node).items().expect("ncc is a memory").clone();
                let owner = owners
                    .into_iter()
                    .find(|&o| self.ncc_prefix_matches(new_result, o, levels_above));
                match owner {
                    Some(owner) => {
                        self.tokens.get_mut(owner).ncc_results.push(new_result);
                        self.tokens.get_mut(new_result).owner = Some(owner);
                        // The owner stops being an empty negation; anything
                        // it propagated must go.
                        self.delete_descendants_of_token(owner)?;
                    }
                    None => {
                        if let ReteNode::NccPartner(p) = self.node_mut(node_id) {
                            p.new_result_buffer.push(new_result);
                        }
                    }
                }
            }
            NodeKind::Bind => {
                let spec = match self.node(node_id) {
                    ReteNode::Bind(b) => b.spec.clone(),
                    _ => unreachable!(),
                };
                let mut scope_bindings = self.tokens.all_bindings(parent_token);
                for (var, value) in &binding {
                    scope_bindings.insert(var.clone(), value.clone());
                }
                let value = (spec.thunk)(&BindingScope::new(&scope_bindings))?;
                let extension = match scope_bindings.get(&spec.target) {
                    Some(existing) if *existing == value => HashMap::new(),
                    Some(_) => return Ok(()),
                    None => {
                        let mut extension = HashMap::new();
                        extension.insert(spec.target.clone(), value);
                        extension
                    }
                };
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                if let ReteNode::Bind(b) = self.node_mut(node_id) {
                    b.items.push(new_token);
                }
                let children = self.node(node_id).children().to_vec();
                for child in children.into_iter().rev() {
                    self.left_activate(child, new_token, None, extension.clone())?;
                }
            }
            NodeKind::Filter => {
                let spec = match self.node(node_id) {
                    ReteNode::Filter(f) => f.spec.clone(),
                    _ => unreachable!(),
                };
                let mut scope_bindings = self.tokens.all_bindings(parent_token);
                for (var, value) in &binding {
                    scope_bindings.insert(var.clone(), value.clone());
                }
                let value = (spec.thunk)(&BindingScope::new(&scope_bindings))?;
                if !value.is_truthy() {
                    return Ok(());
                }
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                if let ReteNode::Filter(f) = self.node_mut(node_id) {
                    f.items.push(new_token);
                }
                let children = self.node(node_id).children().to_vec();
                for child in children.into_iter().rev() {
                    self.left_activate(child, new_token, None, HashMap::new())?;
                }
            }
            NodeKind::Production => {
                let new_token = self.make_token(node_id, parent_token, wme, binding);
                if let ReteNode::Production(p) = self.node_mut(node_id) {
                    trace!(production = p.production, "activation added");
                    p.items.push(new_token);
                }
            }
        }
        Ok(())
    }

    /// Does walking `levels_above` levels up from `result` land on the same
    /// prefix extension as `owner`? Owner and result live on parallel
    /// branches, so the comparison is by (parent, wme), not identity.
    fn ncc_prefix_matches(&self, result: TokenId, owner: TokenId, levels_above: usize) -> bool {
        let Some(ancestor) = self.tokens.nth_parent(result, levels_above) else {
            return false;
        };
        let ancestor = self.tokens.get(ancestor);
        let owner = self.tokens.get(owner);
        ancestor.parent == owner.parent && ancestor.wme == owner.wme
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    pub(crate) fn delete_descendants_of_token(&mut self, token: TokenId) -> EngineResult<()> {
        loop {
            let Some(&child) = self.tokens.get(token).children.first() else {
                return Ok(());
            };
            self.delete_token_and_descendants(child)?;
        }
    }

    /// Remove a token, its descendants, and every back-reference the
    /// network holds to any of them
    pub(crate) fn delete_token_and_descendants(&mut self, token: TokenId) -> EngineResult<()> {
        self.delete_descendants_of_token(token)?;

        let node_id = self.tokens.get(token).node;
        if let Some(items) = self.node_mut(node_id).items_mut() {
            if let Some(pos) = items.iter().position(|&t| t == token) {
                items.remove(pos);
            }
        }
        if let Some(wme) = self.tokens.get(token).wme {
            let tokens = &mut self.wmes.get_mut(wme).tokens;
            if let Some(pos) = tokens.iter().position(|&t| t == token) {
                tokens.remove(pos);
            }
        }
        if let Some(parent) = self.tokens.get(token).parent {
            let children = &mut self.tokens.get_mut(parent).children;
            if let Some(pos) = children.iter().position(|&t| t == token) {
                children.remove(pos);
            }
        }

        match self.node(node_id).node_kind() {
            NodeKind::Negative => {
                let blockers = self.tokens.get(token).join_results.clone();
                for wme in blockers {
                    let results = &mut self.wmes.get_mut(wme).negative_results;
                    if let Some(pos) = results.iter().position(|&t| t == token) {
                        results.remove(pos);
                    }
                }
            }
            NodeKind::Ncc => {
                // Results die with their owner.
                let results = self.tokens.get(token).ncc_results.clone();
                for result in results {
                    if let Some(wme) = self.tokens.get(result).wme {
                        let tokens = &mut self.wmes.get_mut(wme).tokens;
                        if let Some(pos) = tokens.iter().position(|&t| t == result) {
                            tokens.remove(pos);
                        }
                    }
                    if let Some(parent) = self.tokens.get(result).parent {
                        let children = &mut self.tokens.get_mut(parent).children;
                        if let Some(pos) = children.iter().position(|&t| t == result) {
                            children.remove(pos);
                        }
                    }
                    self.tokens.remove(result);
                }
            }
            NodeKind::NccPartner => {
                if let ReteNode::NccPartner(p) = self.node_mut(node_id) {
                    if let Some(pos) = p.new_result_buffer.iter().position(|&t| t == token) {
                        p.new_result_buffer.remove(pos);
                    }
                }
                if let Some(owner) = self.tokens.get(token).owner {
                    let results = &mut self.tokens.get_mut(owner).ncc_results;
                    if let Some(pos) = results.iter().position(|&t| t == token) {
                        results.remove(pos);
                    }
                    if self.tokens.get(owner).ncc_results.is_empty() {
                        // Negation became satisfied again.
                        let owner_node = self.tokens.get(owner).node;
                        let children = self.node(owner_node).children().to_vec();
                        self.tokens.remove(token);
                        for child in children.into_iter().rev() {
                            self.left_activate(child, owner, None, HashMap::new())?;
                        }
                        return Ok(());
                    }
                }
            }
            _ => {}
        }

        self.tokens.remove(token);
        Ok(())
    }

    /// Tear down a node and, recursively, ancestors left without children.
    /// Memories are emptied first so every WME back-reference is cleared.
    pub(crate) fn delete_node_and_any_unused_ancestors(
        &mut self,
        node_id: NodeId,
    ) -> EngineResult<()> {
        debug!(node = node_id, kind = self.node(node_id).kind(), "deleting node");

        // Empty the memory first. For an NCC this also unlinks its owners'
        // sub-network results, which must happen before the partner's
        // sub-network goes away.
        loop {
            let Some(&token) = self.node(node_id).items().and_then(|items| items.first())
            else {
                break;
            };
            self.delete_token_and_descendants(token)?;
        }
        if let ReteNode::Ncc(n) = self.node(node_id) {
            let partner = n.partner;
            self.delete_node_and_any_unused_ancestors(partner)?;
        }
        if let ReteNode::NccPartner(p) = self.node(node_id) {
            let buffered = p.new_result_buffer.clone();
            for token in buffered {
                self.delete_token_and_descendants(token)?;
            }
        }

        let alpha = match self.node(node_id) {
            ReteNode::Join(j) => Some(j.alpha_memory),
            ReteNode::Negative(n) => Some(n.alpha_memory),
            _ => None,
        };
        if let Some(alpha) = alpha {
            let memory = self.alpha_memories.get_mut(&alpha).expect("live alpha memory");
            memory.successors.retain(|&s| s != node_id);
            if memory.successors.is_empty() {
                self.delete_alpha_memory(alpha);
            }
        }

        let parent = self.node(node_id).parent();
        self.nodes.remove(&node_id);
        if let Some(parent) = parent {
            if let Some(children) = self.node_mut(parent).children_mut() {
                children.retain(|&c| c != node_id);
            }
            if parent != self.beta_root && self.node(parent).children().is_empty() {
                self.delete_node_and_any_unused_ancestors(parent)?;
            }
        }
        Ok(())
    }

    fn delete_alpha_memory(&mut self, id: NodeId) {
        let Some(memory) = self.alpha_memories.remove(&id) else { return };
        debug!(alpha = id, "deleting alpha memory");
        self.alpha_index.remove(&memory.key);
        for wme in memory.wmes {
            let memberships = &mut self.wmes.get_mut(wme).alpha_memories;
            if let Some(pos) = memberships.iter().position(|&m| m == id) {
                memberships.remove(pos);
            }
        }
    }

    /// Unlink a production's terminals and prune every node that no longer
    /// feeds any rule. Unknown ids are a silent no-op.
    #[instrument(skip(self), level = "debug")]
    pub fn remove_production(&mut self, id: ProductionId) -> EngineResult<()> {
        let Some(entry) = self.productions.remove(&id) else {
            debug!(production = id, "remove_production: unknown production");
            return Ok(());
        };
        debug!(production = id, name = %entry.name, "removing production");
        for terminal in entry.terminals {
            self.delete_node_and_any_unused_ancestors(terminal)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Activation surface
    // ---------------------------------------------------------------------

    fn activation_for(&self, token: TokenId) -> Activation {
        let wmes = self
            .tokens
            .wme_chain(token)
            .into_iter()
            .map(|wme| wme.map(|w| self.wmes.get(w).triple.clone()))
            .collect();
        Activation { wmes, bindings: self.tokens.all_bindings(token) }
    }

    /// Current activations of one rule (the union over its conjuncts).
    /// Unknown ids yield an empty list.
    pub fn activations(&self, id: ProductionId) -> Vec<Activation> {
        let Some(entry) = self.productions.get(&id) else { return Vec::new() };
        let mut activations = Vec::new();
        for &terminal in &entry.terminals {
            if let Some(ReteNode::Production(node)) = self.nodes.get(&terminal) {
                for &token in &node.items {
                    activations.push(self.activation_for(token));
                }
            }
        }
        activations
    }

    /// All current `(rule, activation)` pairs, in production-id order
    pub fn matches(&self) -> Vec<Match<'_, P>> {
        let mut matches = Vec::new();
        for (&id, entry) in &self.productions {
            for &terminal in &entry.terminals {
                if let Some(ReteNode::Production(node)) = self.nodes.get(&terminal) {
                    for &token in &node.items {
                        matches.push(Match {
                            production: id,
                            name: &entry.name,
                            payload: &entry.payload,
                            activation: self.activation_for(token),
                        });
                    }
                }
            }
        }
        matches
    }

    /// Aggregate counts for diagnostics; also handy for asserting that a
    /// mutation sequence restored the network to a prior state
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            wme_count: self.wmes.len(),
            token_count: self.tokens.len(),
            node_count: self.nodes.len(),
            alpha_memory_count: self.alpha_memories.len(),
            production_count: self.productions.len(),
        }
    }

    // ---------------------------------------------------------------------
    // New-node population
    // ---------------------------------------------------------------------

    /// Run existing matches from the parent through a freshly attached
    /// node, leaving sibling subtrees untouched
    pub(crate) fn update_new_node_with_matches_from_above(
        &mut self,
        node_id: NodeId,
    ) -> EngineResult<()> {
        let Some(parent) = self.node(node_id).parent() else { return Ok(()) };
        trace!(node = node_id, parent, "updating new node with matches from above");
        match self.node(parent).node_kind() {
            NodeKind::BetaMemory => {
                let items = self.node(parent).items().expect("memory").clone();
                for token in items {
                    self.left_activate(node_id, token, None, HashMap::new())?;
                }
            }
            NodeKind::Join => {
                let (alpha, saved) = match self.node_mut(parent) {
                    ReteNode::Join(j) => {
                        let saved = std::mem::replace(&mut j.children, vec![node_id]);
                        (j.alpha_memory, saved)
                    }
                    _ => unreachable!(),
                };
                let candidates =
                    self.alpha_memories.get(&alpha).expect("live alpha memory").wmes.clone();
                let mut outcome = Ok(());
                for wme in candidates {
                    if let Err(err) = self.right_activate(parent, wme) {
                        outcome = Err(err);
                        break;
                    }
                }
                if let ReteNode::Join(j) = self.node_mut(parent) {
                    j.children = saved;
                }
                outcome?;
            }
            NodeKind::Negative => {
                let items = self.node(parent).items().expect("memory").clone();
                for token in items {
                    if self.tokens.get(token).join_results.is_empty() {
                        self.left_activate(node_id, token, None, HashMap::new())?;
                    }
                }
            }
            NodeKind::Ncc => {
                let items = self.node(parent).items().expect("memory").clone();
                for token in items {
                    if self.tokens.get(token).ncc_results.is_empty() {
                        self.left_activate(node_id, token, None, HashMap::new())?;
                    }
                }
            }
            NodeKind::Filter => {
                // Stored tokens are exactly the ones that passed.
                let items = self.node(parent).items().expect("memory").clone();
                for token in items {
                    self.left_activate(node_id, token, None, HashMap::new())?;
                }
            }
            NodeKind::Bind => {
                let (spec, items) = match self.node(parent) {
                    ReteNode::Bind(b) => (b.spec.clone(), b.items.clone()),
                    _ => unreachable!(),
                };
                for token in items {
                    let bindings = self.tokens.all_bindings(token);
                    let value = (spec.thunk)(&BindingScope::new(&bindings))?;
                    let extension = match bindings.get(&spec.target) {
                        Some(existing) if *existing == value => HashMap::new(),
                        Some(_) => continue,
                        None => {
                            let mut extension = HashMap::new();
                            extension.insert(spec.target.clone(), value);
                            extension
                        }
                    };
                    self.left_activate(node_id, token, None, extension)?;
                }
            }
            NodeKind::NccPartner | NodeKind::Production => {
                unreachable!("terminal nodes have no children")
            }
        }
        Ok(())
    }
}

//! Tokens: partial matches threaded through the beta network
//!
//! A token is one level of a chain reaching back to the sentinel root; the
//! chain's per-level WMEs (with `None` at negative/NCC/bind/filter levels)
//! form the partial match, and the per-level binding extensions union into
//! the match's full variable bindings. Tokens live in an arena and refer to
//! each other by id, so the WME↔token reference cycle never needs owning
//! pointers.

use crate::nodes::NodeId;
use crate::wme::WmeId;
use sift_types::{Value, Variable};
use std::collections::HashMap;

/// Unique identifier for tokens
pub type TokenId = u64;

/// One level of a partial match
#[derive(Debug)]
pub struct Token {
    /// Arena id of this token
    pub id: TokenId,
    /// Previous level; `None` only for the root sentinel
    pub parent: Option<TokenId>,
    /// WME bound at this level; `None` at negative/NCC/bind/filter levels
    pub wme: Option<WmeId>,
    /// Node whose memory holds (or produced) this token
    pub node: NodeId,
    /// Tokens extending this one
    pub(crate) children: Vec<TokenId>,
    /// Binding extension introduced at this level
    pub(crate) bindings: HashMap<Variable, Value>,
    /// For negative-node tokens: WMEs currently blocking propagation
    pub(crate) join_results: Vec<WmeId>,
    /// For NCC-memory tokens: sub-network results sharing this prefix
    pub(crate) ncc_results: Vec<TokenId>,
    /// For NCC-partner results: the owning NCC-memory token, once linked
    pub(crate) owner: Option<TokenId>,
}

/// Arena of tokens with monotone ids
#[derive(Default, Debug)]
pub struct TokenStore {
    tokens: Vec<Option<Token>>,
    live: usize,
    next_id: TokenId,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a token and link it under its parent
    pub fn create(
        &mut self,
        node: NodeId,
        parent: Option<TokenId>,
        wme: Option<WmeId>,
        bindings: HashMap<Variable, Value>,
    ) -> TokenId {
        let id = self.next_id;
        self.next_id += 1;
        let token = Token {
            id,
            parent,
            wme,
            node,
            children: Vec::new(),
            bindings,
            join_results: Vec::new(),
            ncc_results: Vec::new(),
            owner: None,
        };
        if self.tokens.len() <= id as usize {
            self.tokens.resize_with(id as usize + 1, || None);
        }
        self.tokens[id as usize] = Some(token);
        self.live += 1;
        if let Some(parent) = parent {
            self.get_mut(parent).children.push(id);
        }
        id
    }

    pub fn get(&self, id: TokenId) -> &Token {
        self.tokens[id as usize].as_ref().expect("live token id")
    }

    pub fn get_mut(&mut self, id: TokenId) -> &mut Token {
        self.tokens[id as usize].as_mut().expect("live token id")
    }

    pub fn remove(&mut self, id: TokenId) -> Token {
        self.live -= 1;
        self.tokens[id as usize].take().expect("live token id")
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Walk `n` levels up the chain. `nth_parent(t, 0)` is `t` itself.
    pub fn nth_parent(&self, id: TokenId, n: usize) -> Option<TokenId> {
        let mut current = id;
        for _ in 0..n {
            current = self.get(current).parent?;
        }
        Some(current)
    }

    /// Union of binding extensions along the ancestry. Ancestors never
    /// disagree with descendants, so insertion order is immaterial.
    pub fn all_bindings(&self, id: TokenId) -> HashMap<Variable, Value> {
        let mut merged = HashMap::new();
        let mut current = Some(id);
        while let Some(t) = current {
            let token = self.get(t);
            for (var, value) in &token.bindings {
                merged.entry(var.clone()).or_insert_with(|| value.clone());
            }
            current = token.parent;
        }
        merged
    }

    /// Resolve one variable against the chain without merging maps
    pub fn binding_lookup(&self, id: TokenId, var: &Variable) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(t) = current {
            let token = self.get(t);
            if let Some(value) = token.bindings.get(var) {
                return Some(value);
            }
            current = token.parent;
        }
        None
    }

    /// Per-level WMEs from the first condition down to this token, the root
    /// sentinel excluded, `None`s preserved positionally
    pub fn wme_chain(&self, id: TokenId) -> Vec<Option<WmeId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(t) = current {
            let token = self.get(t);
            if token.parent.is_some() {
                chain.push(token.wme);
            }
            current = token.parent;
        }
        chain.reverse();
        chain
    }
}

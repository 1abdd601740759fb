//! Beta-network node kinds
//!
//! The network is a tagged sum over node kinds rather than a trait object
//! hierarchy: activation handlers in [`crate::network`] dispatch on the
//! variant. Memory-like variants (beta memory, negative, NCC, bind, filter,
//! production) store tokens; join nodes store only their tests.

use crate::conditions::{BindSpec, FilterSpec};
use crate::token::TokenId;
use sift_types::{Slot, Variable};

/// Unique identifier for nodes in the network
pub type NodeId = u64;

/// Unique identifier for productions
pub type ProductionId = u64;

/// A consistency test applied when joining a token with a right-side WME
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTest {
    /// The right WME's slot must equal a slot of the WME bound
    /// `ancestor_depth` levels up the left token's chain
    WmeField {
        /// Field of the candidate WME
        right_slot: Slot,
        /// How many levels up the chain the earlier binding lives
        ancestor_depth: usize,
        /// Field of the ancestor's WME
        left_slot: Slot,
    },
    /// The right WME's slot must equal the token's accumulated binding for
    /// a variable (bound by a `Bind` level, which has no WME to index into)
    Binding {
        /// Field of the candidate WME
        right_slot: Slot,
        /// Variable to resolve against the token
        variable: Variable,
    },
    /// Two slots of the right WME must agree (a variable repeated within
    /// one pattern)
    RightFields {
        /// First occurrence
        first: Slot,
        /// Repeated occurrence
        second: Slot,
    },
}

/// Dummy-capable beta memory; the root memory holds the sentinel token
#[derive(Debug)]
pub struct BetaMemoryNode {
    pub id: NodeId,
    /// `None` only for the root memory
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub items: Vec<TokenId>,
}

/// Two-input join between a beta memory (left) and an alpha memory (right)
#[derive(Debug)]
pub struct JoinNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    /// Right input
    pub alpha_memory: NodeId,
    pub tests: Vec<JoinTest>,
    /// Variables first bound by this condition, with the slot they read
    pub var_bindings: Vec<(Variable, Slot)>,
}

/// Negation-as-failure over a single pattern; stores prefix tokens with
/// their blocker sets
#[derive(Debug)]
pub struct NegativeNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub alpha_memory: NodeId,
    pub tests: Vec<JoinTest>,
    pub items: Vec<TokenId>,
}

/// Memory gating on emptiness of a negated sub-conjunction
#[derive(Debug)]
pub struct NccNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub items: Vec<TokenId>,
    /// Terminal of the sub-conjunction's network
    pub partner: NodeId,
}

/// Terminal of an NCC sub-network; produces result tokens and routes them
/// to their owners in the NCC memory
#[derive(Debug)]
pub struct NccPartnerNode {
    pub id: NodeId,
    pub parent: NodeId,
    /// The NCC memory this partner feeds
    pub ncc_node: NodeId,
    /// Chain levels the sub-network adds below the shared prefix; walking a
    /// result up this many levels reaches the owner's level
    pub levels_above: usize,
    /// Results produced before their owner entered the NCC memory
    pub new_result_buffer: Vec<TokenId>,
}

/// Binds a computed value to a variable; stores the tokens it passed
#[derive(Debug)]
pub struct BindNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub items: Vec<TokenId>,
    pub spec: BindSpec,
}

/// Gates propagation on a predicate; stores the tokens it passed
#[derive(Debug)]
pub struct FilterNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub items: Vec<TokenId>,
    pub spec: FilterSpec,
}

/// Terminal node: accumulates the full matches of one conjunct
#[derive(Debug)]
pub struct ProductionNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub production: ProductionId,
    pub items: Vec<TokenId>,
}

/// Sum over the beta-network node kinds
#[derive(Debug)]
pub enum ReteNode {
    BetaMemory(BetaMemoryNode),
    Join(JoinNode),
    Negative(NegativeNode),
    Ncc(NccNode),
    NccPartner(NccPartnerNode),
    Bind(BindNode),
    Filter(FilterNode),
    Production(ProductionNode),
}

/// Copyable discriminant used to dispatch activations without holding a
/// borrow on the node map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    BetaMemory,
    Join,
    Negative,
    Ncc,
    NccPartner,
    Bind,
    Filter,
    Production,
}

impl ReteNode {
    pub fn node_kind(&self) -> NodeKind {
        match self {
            Self::BetaMemory(_) => NodeKind::BetaMemory,
            Self::Join(_) => NodeKind::Join,
            Self::Negative(_) => NodeKind::Negative,
            Self::Ncc(_) => NodeKind::Ncc,
            Self::NccPartner(_) => NodeKind::NccPartner,
            Self::Bind(_) => NodeKind::Bind,
            Self::Filter(_) => NodeKind::Filter,
            Self::Production(_) => NodeKind::Production,
        }
    }

    /// Node kind name for logs
    pub fn kind(&self) -> &'static str {
        match self.node_kind() {
            NodeKind::BetaMemory => "beta_memory",
            NodeKind::Join => "join",
            NodeKind::Negative => "negative",
            NodeKind::Ncc => "ncc",
            NodeKind::NccPartner => "ncc_partner",
            NodeKind::Bind => "bind",
            NodeKind::Filter => "filter",
            NodeKind::Production => "production",
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Self::BetaMemory(n) => n.parent,
            Self::Join(n) => Some(n.parent),
            Self::Negative(n) => Some(n.parent),
            Self::Ncc(n) => Some(n.parent),
            Self::NccPartner(n) => Some(n.parent),
            Self::Bind(n) => Some(n.parent),
            Self::Filter(n) => Some(n.parent),
            Self::Production(n) => Some(n.parent),
        }
    }

    /// Downstream nodes; empty for terminals
    pub fn children(&self) -> &[NodeId] {
        match self {
            Self::BetaMemory(n) => &n.children,
            Self::Join(n) => &n.children,
            Self::Negative(n) => &n.children,
            Self::Ncc(n) => &n.children,
            Self::Bind(n) => &n.children,
            Self::Filter(n) => &n.children,
            Self::NccPartner(_) | Self::Production(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Self::BetaMemory(n) => Some(&mut n.children),
            Self::Join(n) => Some(&mut n.children),
            Self::Negative(n) => Some(&mut n.children),
            Self::Ncc(n) => Some(&mut n.children),
            Self::Bind(n) => Some(&mut n.children),
            Self::Filter(n) => Some(&mut n.children),
            Self::NccPartner(_) | Self::Production(_) => None,
        }
    }

    /// Token memory of memory-like kinds; `None` for joins and partners
    pub fn items(&self) -> Option<&Vec<TokenId>> {
        match self {
            Self::BetaMemory(n) => Some(&n.items),
            Self::Negative(n) => Some(&n.items),
            Self::Ncc(n) => Some(&n.items),
            Self::Bind(n) => Some(&n.items),
            Self::Filter(n) => Some(&n.items),
            Self::Production(n) => Some(&n.items),
            Self::Join(_) | Self::NccPartner(_) => None,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vec<TokenId>> {
        match self {
            Self::BetaMemory(n) => Some(&mut n.items),
            Self::Negative(n) => Some(&mut n.items),
            Self::Ncc(n) => Some(&mut n.items),
            Self::Bind(n) => Some(&mut n.items),
            Self::Filter(n) => Some(&mut n.items),
            Self::Production(n) => Some(&mut n.items),
            Self::Join(_) | Self::NccPartner(_) => None,
        }
    }
}

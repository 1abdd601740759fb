//! Working-memory element store
//!
//! WMEs live in an arena indexed by monotone ids; the triple-keyed map
//! interns duplicates so a triple is present at most once. Each WME carries
//! the back-references the network needs to make removal O(affected): the
//! alpha memories holding it, the tokens embedding it, and the
//! negative-node tokens whose blocker sets mention it.

use crate::nodes::NodeId;
use crate::token::TokenId;
use sift_types::Triple;
use std::collections::HashMap;

/// Unique identifier for working-memory elements
pub type WmeId = u64;

/// A working-memory element: an interned triple plus network back-references
#[derive(Debug)]
pub struct Wme {
    /// Arena id of this element
    pub id: WmeId,
    /// The fact itself
    pub triple: Triple,
    /// Alpha memories currently containing this WME
    pub(crate) alpha_memories: Vec<NodeId>,
    /// Tokens embedding this WME at some level
    pub(crate) tokens: Vec<TokenId>,
    /// Negative-node tokens blocked (in part) by this WME
    pub(crate) negative_results: Vec<TokenId>,
}

/// Arena-based store with triple interning
#[derive(Default, Debug)]
pub struct WmeStore {
    wmes: Vec<Option<Wme>>,
    by_triple: HashMap<Triple, WmeId>,
    next_id: WmeId,
}

impl WmeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a triple. Returns the id and whether the element is new.
    pub fn insert(&mut self, triple: Triple) -> (WmeId, bool) {
        if let Some(&id) = self.by_triple.get(&triple) {
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_triple.insert(triple.clone(), id);
        let wme = Wme {
            id,
            triple,
            alpha_memories: Vec::new(),
            tokens: Vec::new(),
            negative_results: Vec::new(),
        };
        if self.wmes.len() <= id as usize {
            self.wmes.resize_with(id as usize + 1, || None);
        }
        self.wmes[id as usize] = Some(wme);
        (id, true)
    }

    pub fn get(&self, id: WmeId) -> &Wme {
        self.wmes[id as usize].as_ref().expect("live WME id")
    }

    pub fn get_mut(&mut self, id: WmeId) -> &mut Wme {
        self.wmes[id as usize].as_mut().expect("live WME id")
    }

    pub fn id_of(&self, triple: &Triple) -> Option<WmeId> {
        self.by_triple.get(triple).copied()
    }

    pub fn remove(&mut self, id: WmeId) -> Option<Wme> {
        let wme = self.wmes.get_mut(id as usize)?.take()?;
        self.by_triple.remove(&wme.triple);
        Some(wme)
    }

    /// Iterate all live elements in id order
    pub fn iter(&self) -> impl Iterator<Item = &Wme> {
        self.wmes.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_triple.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_triple.is_empty()
    }
}

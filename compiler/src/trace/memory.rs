//! Memories and impressions
//!
//! A [`Memory`] is the set of allocations a named reference may point at.
//! Each possibility is an [`Impression`]: a snapshot of the allocation's
//! shadow taken when the aliasing fact was formed, plus the attribute path
//! (root) through which the allocation is reached. Consumers that need the
//! allocation's current state re-fetch its shadow by entity ID; the stored
//! snapshot only pins down identity and formation-time structure.

use crate::tast::{EntityId, FunctionId};
use crate::trace::entanglement::Entanglement;
use crate::trace::entity::Trait;
use crate::trace::shadow::Shadow;
use fxhash::{FxHashMap, FxHasher};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Ordered set of function identities attached to a value
///
/// Kept sorted so equality and hashing are order-independent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FunctionSet {
    ids: SmallVec<[FunctionId; 2]>,
}

impl FunctionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(id: FunctionId) -> Self {
        let mut set = Self::new();
        set.insert(id);
        set
    }

    pub fn insert(&mut self, id: FunctionId) {
        if let Err(pos) = self.ids.binary_search(&id) {
            self.ids.insert(pos, id);
        }
    }

    pub fn union(&self, other: &FunctionSet) -> FunctionSet {
        let mut out = self.clone();
        for id in other.ids.iter() {
            out.insert(*id);
        }
        out
    }

    pub fn contains(&self, id: FunctionId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The sole member, if there is exactly one.
    pub fn sole(&self) -> Option<FunctionId> {
        if self.ids.len() == 1 {
            Some(self.ids[0])
        } else {
            None
        }
    }
}

impl FromIterator<FunctionId> for FunctionSet {
    fn from_iter<I: IntoIterator<Item = FunctionId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// One aliasing possibility: "this reference may point at that allocation,
/// reached through this attribute path"
#[derive(Debug, Clone)]
pub struct Impression {
    /// Snapshot of the allocation's shadow at formation time
    pub shadow: Arc<Shadow>,
    /// Attribute path from the allocation to the aliased storage
    pub root: Trait,
    /// Reality tag, if the fact was formed in a divergent branch
    pub entanglement: Option<Entanglement>,
}

impl Impression {
    pub fn new(shadow: Arc<Shadow>, root: Trait, entanglement: Option<Entanglement>) -> Self {
        Self {
            shadow,
            root,
            entanglement,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.shadow.entity.id
    }

    pub fn with_entanglement(&self, entanglement: Entanglement) -> Impression {
        Impression {
            shadow: self.shadow.clone(),
            root: self.root.clone(),
            entanglement: Some(entanglement),
        }
    }
}

// Entanglement tags are bookkeeping for branch fusion and do not change
// which allocation an impression denotes.
impl PartialEq for Impression {
    fn eq(&self, other: &Self) -> bool {
        self.shadow == other.shadow && self.root == other.root
    }
}

impl Eq for Impression {}

impl Hash for Impression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_id().hash(state);
        self.root.hash(state);
    }
}

/// Set of impressions, at most one per backing entity (latest wins)
#[derive(Debug, Clone, Default)]
pub struct ImpressionSet {
    impressions: Vec<Impression>,
}

impl ImpressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(impression: Impression) -> Self {
        let mut set = Self::new();
        set.add(impression);
        set
    }

    pub fn add(&mut self, impression: Impression) {
        if let Some(existing) = self
            .impressions
            .iter_mut()
            .find(|i| i.entity_id() == impression.entity_id())
        {
            *existing = impression;
        } else {
            self.impressions.push(impression);
        }
    }

    pub fn add_all<'a>(&mut self, impressions: impl IntoIterator<Item = &'a Impression>) {
        for i in impressions {
            self.add(i.clone());
        }
    }

    pub fn union(&self, other: &ImpressionSet) -> ImpressionSet {
        let mut out = self.clone();
        out.add_all(other.iter());
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Impression> {
        self.impressions.iter()
    }

    pub fn first(&self) -> Option<&Impression> {
        self.impressions.first()
    }

    pub fn len(&self) -> usize {
        self.impressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impressions.is_empty()
    }

    pub fn retain(&mut self, f: impl FnMut(&Impression) -> bool) {
        self.impressions.retain(f);
    }
}

impl PartialEq for ImpressionSet {
    fn eq(&self, other: &Self) -> bool {
        self.impressions.len() == other.impressions.len()
            && self
                .impressions
                .iter()
                .all(|i| other.impressions.contains(i))
    }
}

impl Eq for ImpressionSet {}

impl Hash for ImpressionSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: combine per-element hashes commutatively
        let mut sum: u64 = 0;
        for i in &self.impressions {
            let mut h = FxHasher::default();
            i.hash(&mut h);
            sum = sum.wrapping_add(h.finish());
        }
        state.write_u64(sum);
    }
}

impl FromIterator<Impression> for ImpressionSet {
    fn from_iter<I: IntoIterator<Item = Impression>>(iter: I) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.add(i);
        }
        set
    }
}

/// The aliasing state of one named reference
///
/// `depth` is the lexical depth of the reference itself; an impression
/// whose entity is deeper than the memory is a lifetime violation.
/// `rewrites` controls how assignment updates combine: replacement for a
/// definite update, accumulation when the update may not happen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Memory {
    pub name: Arc<str>,
    pub rewrites: bool,
    pub depth: u32,
    pub impressions: ImpressionSet,
    pub functions: FunctionSet,
}

/// Projection target when rewriting a callee-local memory into caller
/// terms
#[derive(Debug, Clone)]
pub enum RemapTarget {
    One(Memory),
    Many(Vec<Memory>),
}

impl RemapTarget {
    pub fn memories(&self) -> impl Iterator<Item = &Memory> {
        match self {
            RemapTarget::One(m) => std::slice::from_ref(m).iter(),
            RemapTarget::Many(ms) => ms.iter(),
        }
    }
}

/// Maps callee-frame entity IDs to the caller memories they stand for
pub type RemapIndex = FxHashMap<EntityId, RemapTarget>;

impl Memory {
    /// An empty, definitely-rewriting memory (fresh `var` declaration).
    pub fn empty(name: &str, depth: u32) -> Self {
        Self {
            name: Arc::from(name),
            rewrites: true,
            depth,
            impressions: ImpressionSet::new(),
            functions: FunctionSet::new(),
        }
    }

    pub fn of_impression(name: &str, impression: Impression, depth: u32) -> Self {
        Self {
            name: Arc::from(name),
            rewrites: true,
            depth,
            impressions: ImpressionSet::of(impression),
            functions: FunctionSet::new(),
        }
    }

    pub fn with_depth(&self, depth: u32) -> Memory {
        Memory {
            depth,
            ..self.clone()
        }
    }

    /// Apply an update coming from `other`. A rewriting update replaces the
    /// impression set; an accumulating one unions into it. The receiver's
    /// name and depth are preserved; the result adopts the update's rewrite
    /// mode, so a definite assignment after an accumulating one replaces
    /// again.
    pub fn update_with(&self, other: &Memory) -> Memory {
        let (impressions, functions) = if other.rewrites {
            (other.impressions.clone(), other.functions.clone())
        } else {
            (
                self.impressions.union(&other.impressions),
                self.functions.union(&other.functions),
            )
        };
        Memory {
            name: self.name.clone(),
            rewrites: other.rewrites,
            depth: self.depth,
            impressions,
            functions,
        }
    }

    /// Union of several memories; used when branch realities are fused.
    /// The result takes the first memory's name and depth.
    pub fn merge_all(memories: &[Memory], rewrites: bool) -> Memory {
        let mut impressions = ImpressionSet::new();
        let mut functions = FunctionSet::new();
        for m in memories {
            impressions.add_all(m.impressions.iter());
            functions = functions.union(&m.functions);
        }
        let (name, depth) = memories
            .first()
            .map(|m| (m.name.clone(), m.depth))
            .unwrap_or_else(|| (Arc::from(""), 0));
        Memory {
            name,
            rewrites,
            depth,
            impressions,
            functions,
        }
    }

    /// Rewrite callee-frame impressions into caller terms. Impressions of
    /// entities not in the index (callee locals that survived into a
    /// summary, origin entities) are kept as-is.
    pub fn remap_via_index(&self, index: &RemapIndex) -> Memory {
        let mut impressions = ImpressionSet::new();
        for i in self.impressions.iter() {
            match index.get(&i.entity_id()) {
                Some(target) => {
                    for m in target.memories() {
                        impressions.add_all(m.impressions.iter());
                    }
                }
                None => impressions.add(i.clone()),
            }
        }
        Memory {
            name: self.name.clone(),
            rewrites: self.rewrites,
            depth: self.depth,
            impressions,
            functions: self.functions.clone(),
        }
    }

    /// Drop impressions whose allocation is more deeply nested than the
    /// reference. Called after a violation is reported so analysis can
    /// continue from a consistent state.
    pub fn restore_to_healthy(&self) -> Memory {
        let mut out = self.clone();
        let depth = self.depth;
        out.impressions.retain(|i| i.shadow.entity.depth <= depth);
        out
    }

    /// Impressions that violate the depth rule, if any.
    pub fn unhealthy_impressions(&self) -> Vec<&Impression> {
        self.impressions
            .iter()
            .filter(|i| i.shadow.entity.depth > self.depth)
            .collect()
    }

    /// Tag every impression with a reality marker.
    pub fn with_entanglement(&self, entanglement: &Entanglement) -> Memory {
        let mut out = self.clone();
        out.impressions = self
            .impressions
            .iter()
            .map(|i| i.with_entanglement(entanglement.clone()))
            .collect();
        out
    }

    /// Restrict to impressions compatible with the given reality.
    pub fn for_entanglement(&self, entanglement: &Entanglement) -> Memory {
        let mut out = self.clone();
        out.impressions.retain(|i| match &i.entanglement {
            None => true,
            Some(e) => e.matches(Some(entanglement)),
        });
        out
    }

    /// Drop impressions belonging to the given reality.
    pub fn not_for_entanglement(&self, entanglement: &Entanglement) -> Memory {
        let mut out = self.clone();
        out.impressions.retain(|i| match &i.entanglement {
            None => true,
            Some(e) => !e.matches(Some(entanglement)),
        });
        out
    }

    /// The first reality tag found on any impression, if any.
    pub fn first_entanglement(&self) -> Option<&Entanglement> {
        self.impressions.iter().find_map(|i| i.entanglement.as_ref())
    }
}

//! Shadows and personalities
//!
//! A [`Shadow`] is the evolving analysis-time image of one entity. Its
//! [`Personality`] maps attribute paths to the memories those attributes
//! may alias. Shadows are immutable values; an update produces a new
//! shadow, which the current scope frame then records as the entity's
//! latest image.

use crate::trace::entity::{Entity, Trait};
use crate::trace::memory::{FunctionSet, Memory, RemapIndex};
use fxhash::FxHasher;
use indexmap::IndexMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Attribute path -> memory map for one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Personality {
    memories: IndexMap<Trait, Memory>,
}

impl Personality {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(trait_: Trait, memory: Memory) -> Self {
        let mut memories = IndexMap::new();
        memories.insert(trait_, memory);
        Self { memories }
    }

    pub fn get_memory(&self, trait_: &Trait) -> Option<&Memory> {
        self.memories.get(trait_)
    }

    pub fn traits(&self) -> impl Iterator<Item = &Trait> {
        self.memories.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Trait, &Memory)> {
        self.memories.iter()
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Fold another personality into this one. Each incoming trait is
    /// prefixed with `root` (the path at which the other entity's state is
    /// being grafted in); existing entries take the incoming memory as an
    /// update, new entries are adopted at `depth`.
    pub fn update_with(&self, other: &Personality, root: &Trait, depth: u32) -> Personality {
        let mut merged = self.memories.clone();
        for (trait_, memory) in other.memories.iter() {
            let full = root.join(trait_);
            match merged.get(&full) {
                Some(existing) => {
                    let updated = existing.update_with(memory);
                    merged.insert(full, updated);
                }
                None => {
                    merged.insert(full, memory.with_depth(depth));
                }
            }
        }
        Personality { memories: merged }
    }

    pub fn remap_via_index(&self, index: &RemapIndex) -> Personality {
        Personality {
            memories: self
                .memories
                .iter()
                .map(|(t, m)| (t.clone(), m.remap_via_index(index)))
                .collect(),
        }
    }

    /// Drop impressions deeper than `depth` from every attribute memory.
    pub fn restore_to_healthy(&self, depth: u32) -> Personality {
        Personality {
            memories: self
                .memories
                .iter()
                .map(|(t, m)| (t.clone(), m.with_depth(depth).restore_to_healthy()))
                .collect(),
        }
    }

    /// Union several personalities attribute-by-attribute.
    pub fn merge_all(personalities: &[&Personality], rewrites: bool) -> Personality {
        let mut memories: IndexMap<Trait, Vec<Memory>> = IndexMap::new();
        for p in personalities {
            for (t, m) in p.memories.iter() {
                memories.entry(t.clone()).or_default().push(m.clone());
            }
        }
        Personality {
            memories: memories
                .into_iter()
                .map(|(t, ms)| (t, Memory::merge_all(&ms, rewrites)))
                .collect(),
        }
    }
}

impl Hash for Personality {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent over entries
        let mut sum: u64 = 0;
        for (t, m) in self.memories.iter() {
            let mut h = FxHasher::default();
            t.hash(&mut h);
            m.hash(&mut h);
            sum = sum.wrapping_add(h.finish());
        }
        state.write_u64(sum);
    }
}

/// The analysis-time image of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub entity: Arc<Entity>,
    pub personality: Personality,
    /// Function identities this value may carry
    pub functions: FunctionSet,
}

impl Shadow {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            personality: Personality::new(),
            functions: FunctionSet::new(),
        }
    }

    pub fn with_functions(entity: Arc<Entity>, functions: FunctionSet) -> Self {
        Self {
            entity,
            personality: Personality::new(),
            functions,
        }
    }

    /// Graft another shadow's state onto this one at path `root`.
    pub fn update_with(&self, other: &Shadow, root: &Trait, depth: u32) -> Shadow {
        Shadow {
            entity: self.entity.clone(),
            personality: self.personality.update_with(&other.personality, root, depth),
            functions: self.functions.union(&other.functions),
        }
    }

    /// Fold attribute memories in at path `root`, keeping this entity's
    /// own depth.
    pub fn update_personality(&self, other: &Personality, root: &Trait) -> Shadow {
        Shadow {
            entity: self.entity.clone(),
            personality: self
                .personality
                .update_with(other, root, self.entity.depth),
            functions: self.functions.clone(),
        }
    }

    pub fn remap_via_index(&self, index: &RemapIndex) -> Shadow {
        Shadow {
            entity: self.entity.clone(),
            personality: self.personality.remap_via_index(index),
            functions: self.functions.clone(),
        }
    }

    pub fn restore_to_healthy(&self) -> Shadow {
        Shadow {
            entity: self.entity.clone(),
            personality: self.personality.restore_to_healthy(self.entity.depth),
            functions: self.functions.clone(),
        }
    }

    /// Attribute memories that point at allocations deeper than this
    /// entity lives.
    pub fn unhealthy_traits(&self) -> Vec<(&Trait, &Memory)> {
        let depth = self.entity.depth;
        self.personality
            .iter()
            .filter(|(_, m)| m.impressions.iter().any(|i| i.shadow.entity.depth > depth))
            .collect()
    }

    /// Union several shadows of the same entity.
    pub fn merge_all(shadows: &[&Shadow]) -> Shadow {
        let entity = shadows[0].entity.clone();
        let personalities: Vec<&Personality> = shadows.iter().map(|s| &s.personality).collect();
        let mut functions = FunctionSet::new();
        for s in shadows {
            functions = functions.union(&s.functions);
        }
        Shadow {
            entity,
            personality: Personality::merge_all(&personalities, true),
            functions,
        }
    }
}

impl Eq for Shadow {}

impl Hash for Shadow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.id.hash(state);
        self.personality.hash(state);
        self.functions.hash(state);
    }
}

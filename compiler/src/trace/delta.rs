//! Function summaries
//!
//! A [`FunctionDelta`] records everything a call does to aliasing state, in
//! terms of the callee's own parameter, return, and angel entities. Call
//! sites project the delta into caller terms through a remap index, so each
//! function body is analyzed once and its summary replayed per call.
//!
//! The [`FunctionDb`] caches deltas by qualified name. Summaries built
//! under a blessing (concrete bindings for function-typed parameters) are
//! never cached, since a different call site may bless differently.

use crate::tast::{EntityId, FunctionId};
use crate::trace::entity::Entity;
use crate::trace::memory::Memory;
use crate::trace::shadow::Shadow;
use fxhash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;

/// Summary of one function's effect on aliasing state
#[derive(Debug, Clone)]
pub struct FunctionDelta {
    pub function_name: String,
    /// Final shadows of the parameter entities: attribute updates the
    /// callee made to its arguments
    pub arg_shadows: Vec<Arc<Shadow>>,
    /// Final shadows of the return slot entities
    pub ret_shadows: Vec<Arc<Shadow>>,
    /// Angels conjured while analyzing the body, in creation order
    pub angels: Vec<Arc<Entity>>,
    /// Final shadow of each angel
    pub angel_shadows: FxHashMap<EntityId, Arc<Shadow>>,
    /// Final memory of each return slot, in callee terms
    pub ret_memories: Vec<Memory>,
}

impl FunctionDelta {
    /// A summary that changes nothing: arguments keep their state and
    /// returns carry no dependencies. Used as the recursion fallback.
    pub fn identity(
        function_name: &str,
        arg_entities: &[Arc<Entity>],
        ret_entities: &[Arc<Entity>],
    ) -> Self {
        Self {
            function_name: function_name.to_string(),
            arg_shadows: arg_entities
                .iter()
                .map(|e| Arc::new(Shadow::new(e.clone())))
                .collect(),
            ret_shadows: ret_entities
                .iter()
                .map(|e| Arc::new(Shadow::new(e.clone())))
                .collect(),
            angels: vec![],
            angel_shadows: FxHashMap::default(),
            ret_memories: ret_entities
                .iter()
                .map(|e| Memory::empty(&e.name, 0))
                .collect(),
        }
    }
}

/// Cache of function summaries for one analysis session
#[derive(Debug, Default)]
pub struct FunctionDb {
    deltas: FxHashMap<String, FunctionDelta>,
    in_progress: FxHashSet<FunctionId>,
    builds: u32,
}

impl FunctionDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&FunctionDelta> {
        self.deltas.get(qualified_name)
    }

    pub fn insert(&mut self, qualified_name: String, delta: FunctionDelta) {
        self.deltas.insert(qualified_name, delta);
    }

    /// Mark a function as currently being summarized. A second entry for
    /// the same function means recursion.
    pub fn begin_build(&mut self, id: FunctionId) {
        self.in_progress.insert(id);
        self.builds += 1;
    }

    pub fn end_build(&mut self, id: FunctionId) {
        self.in_progress.remove(&id);
    }

    pub fn is_in_progress(&self, id: FunctionId) -> bool {
        self.in_progress.contains(&id)
    }

    /// How many times a body has actually been analyzed; cache hits do not
    /// count.
    pub fn build_count(&self) -> u32 {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn summary(&self) -> DbSummary {
        let mut functions: Vec<DeltaSummary> = self
            .deltas
            .iter()
            .map(|(name, d)| DeltaSummary {
                function: name.clone(),
                parameters: d.arg_shadows.len(),
                returns: d.ret_memories.len(),
                angels: d.angels.len(),
            })
            .collect();
        functions.sort_by(|a, b| a.function.cmp(&b.function));
        DbSummary {
            builds: self.builds,
            cached: self.deltas.len(),
            functions,
        }
    }
}

/// Serializable view of the cache, for tooling and debug output
#[derive(Debug, Serialize)]
pub struct DbSummary {
    pub builds: u32,
    pub cached: usize,
    pub functions: Vec<DeltaSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeltaSummary {
    pub function: String,
    pub parameters: usize,
    pub returns: usize,
    pub angels: usize,
}

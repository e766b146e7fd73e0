//! Scope frames and the context arena
//!
//! Scope state is a chain of frames: each frame holds the memories,
//! shadows, and entities recorded at its own nesting level and points at
//! its parent. Lookups walk the chain outward; writes always land in the
//! frame they are addressed to, so sibling branches forked from the same
//! parent never observe each other's updates.

use crate::tast::{ContextId, EntityId};
use crate::trace::memory::Memory;
use crate::trace::shadow::Shadow;
use fxhash::FxHashMap;
use std::sync::Arc;

/// One scope frame
#[derive(Debug, Clone, Default)]
pub struct Frame {
    parent: Option<ContextId>,
    memories: FxHashMap<Arc<str>, Memory>,
    shadows: FxHashMap<EntityId, Arc<Shadow>>,
}

/// Arena of all frames created during one analysis session
///
/// Frames are never removed; conditional branches and loop iterations keep
/// cheap handles into past state for fusion and fixed-point comparison.
#[derive(Debug, Default)]
pub struct ContextArena {
    frames: Vec<Frame>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, frame: Frame) -> ContextId {
        let id = ContextId::from_raw(self.frames.len() as u32);
        self.frames.push(frame);
        id
    }

    /// A frame with no parent; the base of a function analysis.
    pub fn new_isolated(&mut self) -> ContextId {
        self.push(Frame::default())
    }

    /// A frame chained under `parent`.
    pub fn new_child(&mut self, parent: ContextId) -> ContextId {
        self.push(Frame {
            parent: Some(parent),
            ..Frame::default()
        })
    }

    /// A copy of `ctx`'s own entries under the same parent.
    pub fn fork(&mut self, ctx: ContextId) -> ContextId {
        let frame = self.frames[ctx.as_raw() as usize].clone();
        self.push(frame)
    }

    fn frame(&self, ctx: ContextId) -> &Frame {
        &self.frames[ctx.as_raw() as usize]
    }

    fn frame_mut(&mut self, ctx: ContextId) -> &mut Frame {
        &mut self.frames[ctx.as_raw() as usize]
    }

    /// Walk the chain from `ctx` outward.
    fn chain(&self, ctx: ContextId) -> impl Iterator<Item = &Frame> {
        let mut current = Some(ctx);
        std::iter::from_fn(move || {
            let id = current?;
            let frame = self.frame(id);
            current = frame.parent;
            Some(frame)
        })
    }

    pub fn get_memory(&self, ctx: ContextId, name: &str) -> Option<&Memory> {
        self.chain(ctx).find_map(|f| f.memories.get(name))
    }

    pub fn set_memory(&mut self, ctx: ContextId, name: Arc<str>, memory: Memory) {
        self.frame_mut(ctx).memories.insert(name, memory);
    }

    pub fn get_shadow(&self, ctx: ContextId, entity: EntityId) -> Option<&Arc<Shadow>> {
        self.chain(ctx).find_map(|f| f.shadows.get(&entity))
    }

    pub fn set_shadow(&mut self, ctx: ContextId, shadow: Arc<Shadow>) {
        let id = shadow.entity.id;
        self.frame_mut(ctx).shadows.insert(id, shadow);
    }

    /// Names with a memory entry in `ctx`'s own frame.
    pub fn local_memory_names(&self, ctx: ContextId) -> impl Iterator<Item = &Arc<str>> {
        self.frame(ctx).memories.keys()
    }

    /// Entities with a shadow entry in `ctx`'s own frame.
    pub fn local_shadow_ids(&self, ctx: ContextId) -> impl Iterator<Item = EntityId> + '_ {
        self.frame(ctx).shadows.keys().copied()
    }

    pub fn local_shadow(&self, ctx: ContextId, entity: EntityId) -> Option<&Arc<Shadow>> {
        self.frame(ctx).shadows.get(&entity)
    }

    /// All memories visible from `ctx`, innermost definition winning.
    pub fn visible_memories(&self, ctx: ContextId) -> FxHashMap<Arc<str>, Memory> {
        let mut out: FxHashMap<Arc<str>, Memory> = FxHashMap::default();
        for frame in self.chain(ctx) {
            for (name, memory) in frame.memories.iter() {
                out.entry(name.clone()).or_insert_with(|| memory.clone());
            }
        }
        out
    }
}

/// Cursor identifying where in the scope chain the visitor currently is
#[derive(Debug, Clone, Copy)]
pub struct Env {
    /// Frame that receives writes
    pub ctx: ContextId,
    /// Base frame of the function under analysis; angels register their
    /// shadows here so they survive block scopes
    pub function_base: ContextId,
    /// Current lexical nesting depth
    pub depth: u32,
    /// Line of the statement being visited, for diagnostics
    pub line: usize,
}

impl Env {
    pub fn at_line(self, line: usize) -> Env {
        Env { line, ..self }
    }

    pub fn deeper(self, ctx: ContextId) -> Env {
        Env {
            ctx,
            depth: self.depth + 1,
            ..self
        }
    }
}

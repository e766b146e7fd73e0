//! Attribute chain resolution
//!
//! Resolving `x.b.c` walks the chain left to right, accumulating a trait
//! relative to the allocations `x` may point at. The subtlety is the
//! ownership switch: if `b` was declared as a reference (`var`), then `c`
//! is an attribute of whatever `b` currently points at, not of `x`'s
//! allocation. At such a step resolution re-roots itself at the current
//! owner, consulting the owner's personality and conjuring an angel when
//! the owner is externally owned and its attribute has never been seen.

use crate::tast::{TypedExpression, TypedExpressionKind};
use crate::trace::entity::Trait;
use crate::trace::memory::{FunctionSet, ImpressionSet, Memory};
use crate::trace::state::Env;
use crate::trace::validate::Validate;
use crate::trace::visitor::MemoryVisitor;
use crate::trace::TraceFault;
use std::sync::Arc;

/// Partial result of walking an attribute chain
pub(crate) struct AttributeResolution {
    pub memories: Vec<Memory>,
    pub trait_: Trait,
    /// Set when the last attribute seen aliases storage owned elsewhere;
    /// the next step (or a read of the whole chain) must re-root at the
    /// current owner first
    pub pending_switch: bool,
}

impl<'m> MemoryVisitor<'m> {
    /// Memories a fully resolved attribute chain may read.
    pub(crate) fn attribute_memories(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<Vec<Memory>, TraceFault> {
        let resolution = self.resolve_attribute_chain(env, expr)?;

        if self.module.types.is_novel(expr.ty) {
            // primitive leaf; nothing to alias
            return Ok(vec![Memory::empty("", env.depth)]);
        }

        if resolution.pending_switch {
            let memories =
                self.owner_switch(env, &resolution.memories, &resolution.trait_, false)?;
            Ok(vec![form_memory(&memories, &Trait::empty(), env.depth)])
        } else {
            Ok(vec![form_memory(
                &resolution.memories,
                &resolution.trait_,
                env.depth,
            )])
        }
    }

    /// Assignment targets for an attribute chain. The final attribute is
    /// being rebound, so no ownership switch is performed for it.
    pub(crate) fn attribute_lvals(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<Vec<crate::trace::lval::Lval>, TraceFault> {
        let resolution = self.resolve_attribute_chain(env, expr)?;
        let memory = Memory::merge_all(&resolution.memories, true);
        Ok(vec![crate::trace::lval::Lval::attribute(
            Arc::from(render_path(expr).as_str()),
            memory,
            resolution.trait_,
        )])
    }

    pub(crate) fn resolve_attribute_chain(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<AttributeResolution, TraceFault> {
        match &expr.kind {
            TypedExpressionKind::Ref { name } => {
                let memory =
                    self.get_memory(env, name)
                        .ok_or_else(|| TraceFault::UnknownReference {
                            name: name.clone(),
                            line: env.line,
                        })?;
                Validate::dependencies_not_moved(
                    &mut self.diagnostics,
                    env.line,
                    &memory,
                    &self.moved,
                );
                Ok(AttributeResolution {
                    memories: vec![memory],
                    trait_: Trait::empty(),
                    pending_switch: false,
                })
            }
            TypedExpressionKind::Cast { inner } => self.resolve_attribute_chain(env, inner),
            TypedExpressionKind::Call { callee, arguments } => {
                let values = self.visit_call(env, callee, arguments)?;
                let memories = values
                    .into_iter()
                    .map(|v| self.coerce_value(env, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttributeResolution {
                    memories,
                    trait_: Trait::empty(),
                    pending_switch: false,
                })
            }
            TypedExpressionKind::Attribute { object, attribute } => {
                let inner = self.resolve_attribute_chain(env, object)?;
                if inner.pending_switch {
                    let novel = self.module.types.is_novel(object.ty);
                    let memories =
                        self.owner_switch(env, &inner.memories, &inner.trait_, novel)?;
                    let pending = self.induces_switch(object.ty, attribute, expr.ty);
                    Ok(AttributeResolution {
                        memories,
                        trait_: Trait::new(attribute),
                        pending_switch: pending,
                    })
                } else {
                    let pending = self.induces_switch(object.ty, attribute, expr.ty);
                    Ok(AttributeResolution {
                        memories: inner.memories,
                        trait_: inner.trait_.join_str(attribute),
                        pending_switch: pending,
                    })
                }
            }
            _ => Err(TraceFault::UnknownReference {
                name: "<expression>".to_string(),
                line: env.line,
            }),
        }
    }

    /// Whether reading `attribute` off a value of `object_ty` crosses an
    /// ownership boundary.
    fn induces_switch(
        &self,
        object_ty: crate::tast::TypeId,
        attribute: &str,
        result_ty: crate::tast::TypeId,
    ) -> bool {
        if self.module.types.is_novel(result_ty) {
            return false;
        }
        match self.module.types.attribute(object_ty, attribute) {
            Some(attr) => !attr.binding.owns_attribute(),
            None => false,
        }
    }

    /// Re-root resolution at the current owner of each aliased attribute.
    /// For every impression, the owner's shadow is consulted for the path;
    /// an unseen path on an externally owned entity conjures an angel.
    pub(crate) fn owner_switch(
        &mut self,
        env: &Env,
        memories: &[Memory],
        trait_: &Trait,
        result_is_novel: bool,
    ) -> Result<Vec<Memory>, TraceFault> {
        let mut out = vec![];
        for memory in memories {
            for impression in memory.impressions.iter() {
                if impression.shadow.entity.is_origin() {
                    continue;
                }
                let current = self.shadow_of(env, impression.entity_id())?;
                let key = impression.root.join(trait_);
                if let Some(owned) = current.personality.get_memory(&key) {
                    out.push(owned.clone());
                } else if !result_is_novel {
                    let owner = current.entity.clone();
                    out.push(self.create_angel_memory(env, key, &owner)?);
                }
            }
        }
        Ok(out)
    }
}

/// New memory holding the resolved impressions, rooted at the remaining
/// trait.
fn form_memory(memories: &[Memory], trait_: &Trait, depth: u32) -> Memory {
    let mut impressions = ImpressionSet::new();
    let mut functions = FunctionSet::new();
    for memory in memories {
        for impression in memory.impressions.iter() {
            let mut rerooted = impression.clone();
            rerooted.root = impression.root.join(trait_);
            impressions.add(rerooted);
        }
        functions = functions.union(&memory.functions);
    }
    Memory {
        name: Arc::from(""),
        rewrites: true,
        depth,
        impressions,
        functions,
    }
}

fn render_path(expr: &TypedExpression) -> String {
    match &expr.kind {
        TypedExpressionKind::Ref { name } => name.clone(),
        TypedExpressionKind::Attribute { object, attribute } => {
            format!("{}.{}", render_path(object), attribute)
        }
        TypedExpressionKind::Cast { inner } => render_path(inner),
        _ => "<expression>".to_string(),
    }
}

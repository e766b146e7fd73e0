//! Conditional realities and branch fusion
//!
//! Each arm of a conditional runs in its own child frame. Afterwards the
//! branch states are fused back into the enclosing frame: every name or
//! attribute updated in any branch gets the union of its per-branch
//! possibilities. A conditional without a trailing `else` is not
//! exhaustive, so the pre-conditional state contributes as one more
//! reality. Branches that unconditionally return contribute nothing for
//! state that outlives the function frame.
//!
//! While loops run their body in one shared frame until the aliasing state
//! reaches a fixed point (detected by fingerprint), then fuse with the
//! not-entered reality. Diagnostics from superseded iterations are
//! discarded; only the final iteration's survive.

use crate::tast::{block_returns, ContextId, EntityId, TypedExpression, TypedStatement};
use crate::trace::entanglement::Entanglement;
use crate::trace::entity::Trait;
use crate::trace::memory::Memory;
use crate::trace::shadow::Personality;
use crate::trace::state::Env;
use crate::trace::validate::TraceDiagnostic;
use crate::trace::visitor::MemoryVisitor;
use crate::trace::TraceFault;
use fxhash::{FxHashSet, FxHasher};
use log::debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Iteration cap before a loop is reported as non-converging
pub const WHILE_ITERATION_CAP: usize = 64;

/// One explored branch of a conditional
#[derive(Debug, Clone, Copy)]
pub(crate) struct BranchState {
    pub ctx: ContextId,
    /// The branch body unconditionally returns
    pub returns: bool,
}

impl<'m> MemoryVisitor<'m> {
    pub(crate) fn visit_if(
        &mut self,
        env: &Env,
        arms: &[crate::tast::CondArm],
    ) -> Result<(), TraceFault> {
        let mut branches = vec![];
        for arm in arms {
            let ctx = self.arena.new_child(env.ctx);
            let benv = env.deeper(ctx);
            if let Some(condition) = &arm.condition {
                self.visit_expression(&benv.at_line(condition.line), condition)?;
            }
            for statement in &arm.body {
                self.visit_statement(&benv.at_line(statement.line()), statement)?;
            }
            branches.push(BranchState {
                ctx,
                returns: block_returns(&arm.body),
            });
        }
        let exhaustive = arms.last().map_or(false, |a| a.condition.is_none());
        self.fuse_realities(env, &branches, exhaustive)
    }

    pub(crate) fn visit_while(
        &mut self,
        env: &Env,
        condition: &TypedExpression,
        body: &[TypedStatement],
        line: usize,
    ) -> Result<(), TraceFault> {
        let loop_ctx = self.arena.new_child(env.ctx);
        let benv = env.deeper(loop_ctx);
        let returns = block_returns(body);

        let mark = self.diagnostics.len();
        let mut seen: FxHashSet<u64> = FxHashSet::default();
        seen.insert(self.loop_fingerprint(loop_ctx));

        // the loop may exit after any number of iterations, so every
        // distinct iteration state is a reality of its own
        let mut branches: Vec<BranchState> = vec![];
        let mut iterations = 0usize;
        loop {
            iterations += 1;
            // superseded iterations would report stale possibilities
            self.diagnostics.truncate(mark);

            self.visit_expression(&benv.at_line(condition.line), condition)?;
            for statement in body {
                self.visit_statement(&benv.at_line(statement.line()), statement)?;
            }

            let fingerprint = self.loop_fingerprint(loop_ctx);
            if !seen.insert(fingerprint) {
                debug!("while loop stabilized after {} iterations", iterations);
                break;
            }
            branches.push(BranchState {
                ctx: self.arena.fork(loop_ctx),
                returns,
            });
            if iterations >= WHILE_ITERATION_CAP {
                self.diagnostics
                    .push(TraceDiagnostic::non_convergence(line, iterations));
                break;
            }
        }

        let finals = self.diagnostics.split_off(mark);
        for diagnostic in finals {
            if !self.diagnostics[mark..].contains(&diagnostic) {
                self.diagnostics.push(diagnostic);
            }
        }

        // the loop may also run zero times, so fusion keeps the prior
        // state as its own reality
        self.fuse_realities(env, &branches, false)
    }

    /// Hash of everything the loop body has updated so far, resolved to
    /// current values.
    fn loop_fingerprint(&self, ctx: ContextId) -> u64 {
        let mut names: Vec<Arc<str>> = self.arena.local_memory_names(ctx).cloned().collect();
        names.sort();
        let mut ids: Vec<EntityId> = self.arena.local_shadow_ids(ctx).collect();
        ids.sort();

        let mut hasher = FxHasher::default();
        for name in &names {
            name.hash(&mut hasher);
            if let Some(memory) = self.arena.get_memory(ctx, name) {
                memory.hash(&mut hasher);
            }
        }
        for id in &ids {
            id.hash(&mut hasher);
            if let Some(shadow) = self.arena.get_shadow(ctx, *id) {
                shadow.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Fold branch states back into the enclosing frame.
    pub(crate) fn fuse_realities(
        &mut self,
        env: &Env,
        branches: &[BranchState],
        exhaustive: bool,
    ) -> Result<(), TraceFault> {
        self.fuse_memories(env, branches, exhaustive);
        self.fuse_personalities(env, branches, exhaustive)
    }

    fn fuse_memories(&mut self, env: &Env, branches: &[BranchState], exhaustive: bool) {
        // names updated in any branch that were declared outside it
        let mut names: Vec<Arc<str>> = vec![];
        for branch in branches {
            for name in self.arena.local_memory_names(branch.ctx) {
                if self.arena.get_memory(env.ctx, name).is_some() && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        if names.is_empty() {
            return;
        }

        // realities per name, in slot order: branches then (if the
        // conditional may be skipped) the prior state
        let mut per_name: Vec<(Arc<str>, Memory, Vec<Option<Memory>>)> = vec![];
        for name in &names {
            let prior = match self.arena.get_memory(env.ctx, name) {
                Some(m) => m.clone(),
                None => continue,
            };
            let mut realities: Vec<Option<Memory>> = vec![];
            for branch in branches {
                if branch.returns && prior.depth > 0 {
                    realities.push(None);
                } else {
                    let seen = self
                        .arena
                        .get_memory(branch.ctx, name)
                        .cloned()
                        .unwrap_or_else(|| prior.clone());
                    realities.push(Some(seen));
                }
            }
            if !exhaustive {
                realities.push(Some(prior.clone()));
            }
            per_name.push((name.clone(), prior, realities));
        }

        // correlated divergence across several names means the per-branch
        // facts must not recombine later; tag each reality slot
        let divergent = per_name
            .iter()
            .filter(|(_, _, realities)| diverges(realities))
            .count();
        let tags: Option<Vec<Entanglement>> = if divergent >= 2 {
            let slots = branches.len() + usize::from(!exhaustive);
            Some(
                (0..slots)
                    .map(|_| Entanglement::new(self.entanglement_ids.next()))
                    .collect(),
            )
        } else {
            None
        };

        for (name, prior, realities) in per_name {
            // every slot of a diverging name gets its reality's tag, the
            // not-taken prior state included, so no slot's facts can later
            // combine with a sibling reality's
            let tag_slots = tags.is_some() && diverges(&realities);
            let tagged: Vec<Memory> = realities
                .into_iter()
                .enumerate()
                .filter_map(|(slot, m)| m.map(|m| (slot, m)))
                .map(|(slot, m)| match &tags {
                    Some(tags) if tag_slots => {
                        // a fact already tagged in an enclosing reality
                        // stays compatible with it
                        let tag = match m.first_entanglement() {
                            Some(parent) => parent.nested(tags[slot].id),
                            None => tags[slot].clone(),
                        };
                        m.with_entanglement(&tag)
                    }
                    _ => m,
                })
                .collect();
            if tagged.is_empty() {
                continue;
            }
            let fused = Memory {
                name: prior.name.clone(),
                rewrites: prior.rewrites,
                depth: prior.depth,
                ..Memory::merge_all(&tagged, prior.rewrites)
            };
            self.arena.set_memory(env.ctx, name, fused);
        }
    }

    fn fuse_personalities(
        &mut self,
        env: &Env,
        branches: &[BranchState],
        exhaustive: bool,
    ) -> Result<(), TraceFault> {
        let mut ids: Vec<EntityId> = vec![];
        for branch in branches {
            for id in self.arena.local_shadow_ids(branch.ctx) {
                if self.arena.get_shadow(env.ctx, id).is_some() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids.sort();

        for id in ids {
            let prior = match self.arena.get_shadow(env.ctx, id) {
                Some(s) => s.clone(),
                None => continue,
            };

            // traits whose memory any branch changed
            let mut traits: Vec<Trait> = vec![];
            for branch in branches {
                if let Some(shadow) = self.arena.local_shadow(branch.ctx, id) {
                    for (trait_, memory) in shadow.personality.iter() {
                        let changed = prior.personality.get_memory(trait_) != Some(memory);
                        if changed && !traits.contains(trait_) {
                            traits.push(trait_.clone());
                        }
                    }
                }
            }
            traits.sort();
            if traits.is_empty() {
                continue;
            }

            let mut fused = Personality::new();
            for trait_ in &traits {
                let mut realities: Vec<Memory> = vec![];
                for branch in branches {
                    if branch.returns && prior.entity.depth > 0 {
                        continue;
                    }
                    let in_branch = self
                        .arena
                        .get_shadow(branch.ctx, id)
                        .and_then(|s| s.personality.get_memory(trait_).cloned());
                    if let Some(memory) = in_branch {
                        realities.push(memory);
                    }
                }
                if realities.is_empty() {
                    continue;
                }
                // rewrites only when every path through the conditional
                // reached this update
                fused = fused.update_with(
                    &Personality::of(trait_.clone(), Memory::merge_all(&realities, exhaustive)),
                    &Trait::empty(),
                    prior.entity.depth,
                );
            }
            self.update_personality(env, id, &fused, &Trait::empty())?;
        }
        Ok(())
    }
}

/// Whether the realities of one name disagree about what it may point at.
fn diverges(realities: &[Option<Memory>]) -> bool {
    let present: Vec<&Memory> = realities.iter().flatten().collect();
    present
        .windows(2)
        .any(|w| w[0].impressions != w[1].impressions || w[0].functions != w[1].functions)
}

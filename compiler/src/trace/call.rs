//! Call handling
//!
//! A call site is assessed into one or more [`Situation`]s: concrete
//! (function instance, argument reality, blessing) combinations. Each
//! situation is summarized via the delta cache and the summary is replayed
//! against the caller's state through a remap index; the outcomes of all
//! situations are then fused positionally.

use crate::tast::{Callee, FunctionId, TypedExpression};
use crate::trace::blessing::{blessing_combinations, call_requires_blessing, BlessingRow};
use crate::trace::delta::FunctionDelta;
use crate::trace::entanglement::Entanglement;
use crate::trace::memory::{Impression, Memory, RemapIndex, RemapTarget};
use crate::trace::shadow::Shadow;
use crate::trace::state::Env;
use crate::trace::entity::{Entity, EntityKind, Trait};
use crate::trace::visitor::{MemoryVisitor, Value};
use crate::trace::TraceFault;
use log::trace;
use std::sync::Arc;

/// One concrete way a call site may go
#[derive(Debug)]
pub(crate) struct Situation {
    pub function: FunctionId,
    pub parameters: Vec<Memory>,
    /// Reality the arguments (and therefore the returns) belong to
    pub entanglement: Option<Entanglement>,
    pub blessings: Option<BlessingRow>,
}

impl<'m> MemoryVisitor<'m> {
    pub(crate) fn visit_call(
        &mut self,
        env: &Env,
        callee: &Callee,
        arguments: &[TypedExpression],
    ) -> Result<Vec<Value>, TraceFault> {
        let mut args: Vec<Memory> = vec![];
        for argument in arguments {
            args.extend(self.expr_memories(&env.at_line(argument.line), argument)?);
        }

        let instances = self.callee_instances(env, callee)?;
        let mut situations = vec![];
        for (function, caller_entanglement) in instances {
            let scoped: Vec<Memory> = match &caller_entanglement {
                Some(e) => args.iter().map(|m| m.for_entanglement(e)).collect(),
                None => args.clone(),
            };
            for (parameters, division) in divide_by_entanglement(scoped) {
                let entanglement = division.or_else(|| caller_entanglement.clone());
                situations.extend(self.bless_situation(env, function, parameters, entanglement)?);
            }
        }

        let mut outcomes = vec![];
        for situation in situations {
            trace!(
                "call situation: {} with {} parameter memories",
                situation.function,
                situation.parameters.len()
            );
            let delta = self
                .summarize(situation.function, situation.blessings.clone())?
                .ok_or(TraceFault::NoFunctionInstance { line: env.line })?;
            outcomes.push(self.apply_call(env, &situation, &delta)?);
        }
        Ok(self.fuse_outcomes(env, outcomes))
    }

    /// Concrete function instances the callee may be, each with the
    /// reality tag of the aliasing fact that names it.
    fn callee_instances(
        &mut self,
        env: &Env,
        callee: &Callee,
    ) -> Result<Vec<(FunctionId, Option<Entanglement>)>, TraceFault> {
        match callee {
            Callee::Direct { function } => Ok(vec![(*function, None)]),
            Callee::Dynamic { expr } => {
                let memories = self.expr_memories(&env.at_line(expr.line), expr)?;
                let memory = memories
                    .into_iter()
                    .next()
                    .ok_or(TraceFault::NoFunctionInstance { line: env.line })?;
                let mut out = vec![];
                for impression in memory.impressions.iter() {
                    // the snapshot may predate a blessing; consult the
                    // current shadow
                    let current = self
                        .get_shadow(env, impression.entity_id())
                        .unwrap_or_else(|| impression.shadow.clone());
                    let function = current
                        .functions
                        .sole()
                        .ok_or(TraceFault::NoFunctionInstance { line: env.line })?;
                    out.push((function, impression.entanglement.clone()));
                }
                if out.is_empty() {
                    if let Some(function) = memory.functions.sole() {
                        out.push((function, None));
                    }
                }
                if out.is_empty() {
                    return Err(TraceFault::NoFunctionInstance { line: env.line });
                }
                Ok(out)
            }
        }
    }

    /// Expand one (instance, reality) pair into situations, one per
    /// blessing combination.
    fn bless_situation(
        &mut self,
        env: &Env,
        function: FunctionId,
        parameters: Vec<Memory>,
        entanglement: Option<Entanglement>,
    ) -> Result<Vec<Situation>, TraceFault> {
        let module = self.module;
        let definition = module.functions.get(function);
        let parameter_types: Vec<_> = definition.parameters.iter().map(|p| p.ty).collect();

        if !call_requires_blessing(&module.types, &parameter_types) {
            return Ok(vec![Situation {
                function,
                parameters,
                entanglement,
                blessings: None,
            }]);
        }

        // impression snapshots may predate attribute writes; identities
        // are read off the allocations' current shadows
        let refreshed: Vec<Memory> = parameters
            .iter()
            .map(|m| self.refreshed_memory(env, m))
            .collect();
        let rows = blessing_combinations(&module.types, &parameter_types, &refreshed);
        Ok(rows
            .into_iter()
            .map(|row| Situation {
                function,
                parameters: parameters.clone(),
                entanglement: entanglement.clone(),
                blessings: Some(row),
            })
            .collect())
    }

    /// A copy of `memory` with each impression's shadow replaced by the
    /// allocation's current shadow, where one is registered.
    fn refreshed_memory(&self, env: &Env, memory: &Memory) -> Memory {
        let mut out = memory.clone();
        out.impressions = memory
            .impressions
            .iter()
            .map(|i| match self.get_shadow(env, i.entity_id()) {
                Some(current) => Impression::new(current, i.root.clone(), i.entanglement.clone()),
                None => i.clone(),
            })
            .collect();
        out
    }

    /// Replay a summary against the caller's state.
    pub(crate) fn apply_call(
        &mut self,
        env: &Env,
        situation: &Situation,
        delta: &FunctionDelta,
    ) -> Result<Vec<Value>, TraceFault> {
        let module = self.module;
        let definition = module.functions.get(situation.function);

        // 1. map parameter entities to the argument memories
        let mut index = RemapIndex::default();
        for (shadow, memory) in delta.arg_shadows.iter().zip(situation.parameters.iter()) {
            index.insert(shadow.entity.id, RemapTarget::One(memory.clone()));
        }

        // 2. resolve angels, in creation order, so earlier angels can back
        // later ones
        for angel in &delta.angels {
            let memories = self.resolve_angel_into_memories(env, angel, &index)?;
            index.insert(angel.id, RemapTarget::Many(memories));
        }

        // 3. write back attribute updates the callee made through angels
        for angel in &delta.angels {
            if let Some(shadow) = delta.angel_shadows.get(&angel.id) {
                if shadow.personality.is_empty() && shadow.functions.is_empty() {
                    continue;
                }
                let remapped = shadow.remap_via_index(&index);
                let targets: Vec<Memory> = match index.get(&angel.id) {
                    Some(target) => target.memories().cloned().collect(),
                    None => vec![],
                };
                for memory in targets {
                    for impression in memory.impressions.iter() {
                        self.update_source_of_impression(
                            env,
                            impression,
                            &remapped,
                            &Trait::empty(),
                        )?;
                    }
                }
            }
        }

        // 4. write back attribute updates made directly to arguments
        for (shadow, memory) in delta.arg_shadows.iter().zip(situation.parameters.iter()) {
            if shadow.personality.is_empty() && shadow.functions.is_empty() {
                continue;
            }
            let remapped = shadow.remap_via_index(&index);
            for impression in memory.impressions.iter() {
                self.update_source_of_impression(env, impression, &remapped, &Trait::empty())?;
            }
        }

        // 5. mark moved-from allocations
        for (parameter, memory) in definition.parameters.iter().zip(situation.parameters.iter()) {
            if parameter.binding.consumes() {
                for impression in memory.impressions.iter() {
                    self.moved.insert(impression.entity_id());
                }
            }
        }

        // 6. surface returns
        let mut out = vec![];
        for (i, ret) in definition.returns.iter().enumerate() {
            if ret.binding.returns_allocation() {
                let shadow = delta.ret_shadows[i].remap_via_index(&index);
                out.push(Value::Shadow(Arc::new(shadow)));
            } else {
                let mut memory = delta.ret_memories[i]
                    .remap_via_index(&index)
                    .with_depth(env.depth);
                if let Some(e) = &situation.entanglement {
                    memory = memory.with_entanglement(e);
                }
                out.push(Value::Memory(memory));
            }
        }
        Ok(out)
    }

    /// Project an angel into the caller memories it stands for. The
    /// owner's current shadow is consulted for the guarded path; an unseen
    /// path conjures a caller-side angel in turn.
    pub(crate) fn resolve_angel_into_memories(
        &mut self,
        env: &Env,
        angel: &Arc<Entity>,
        index: &RemapIndex,
    ) -> Result<Vec<Memory>, TraceFault> {
        let (owner, guarded) = match &angel.kind {
            EntityKind::Angel { owner, guarded } => (*owner, guarded.clone()),
            _ => {
                return Err(TraceFault::UnresolvedAngel {
                    name: angel.name.to_string(),
                    line: env.line,
                })
            }
        };
        let target = index
            .get(&owner)
            .ok_or_else(|| TraceFault::UnresolvedAngel {
                name: angel.name.to_string(),
                line: env.line,
            })?;
        let sources: Vec<Memory> = target.memories().cloned().collect();

        let mut out = vec![];
        for memory in sources {
            for impression in memory.impressions.iter() {
                if impression.shadow.entity.is_origin() {
                    continue;
                }
                let current = self.shadow_of(env, impression.entity_id())?;
                let key = impression.root.join(&guarded);
                match current.personality.get_memory(&key) {
                    Some(owned) => out.push(owned.clone()),
                    None => {
                        let owner_entity = current.entity.clone();
                        out.push(self.create_angel_memory(env, key, &owner_entity)?);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Fuse per-situation outcomes positionally.
    pub(crate) fn fuse_outcomes(&mut self, env: &Env, mut outcomes: Vec<Vec<Value>>) -> Vec<Value> {
        if outcomes.len() <= 1 {
            return outcomes.pop().unwrap_or_default();
        }
        let width = outcomes.iter().map(|o| o.len()).min().unwrap_or(0);
        let mut fused = Vec::with_capacity(width);
        for i in 0..width {
            let all_shadows = outcomes.iter().all(|o| matches!(o[i], Value::Shadow(_)));
            if all_shadows {
                let shadows: Vec<Arc<Shadow>> = outcomes
                    .iter()
                    .map(|o| match &o[i] {
                        Value::Shadow(s) => s.clone(),
                        Value::Memory(_) => unreachable!(),
                    })
                    .collect();
                let refs: Vec<&Shadow> = shadows.iter().map(|s| s.as_ref()).collect();
                fused.push(Value::Shadow(Arc::new(Shadow::merge_all(&refs))));
            } else {
                let memories: Vec<Memory> = outcomes
                    .iter()
                    .map(|o| match &o[i] {
                        Value::Memory(m) => m.clone(),
                        Value::Shadow(s) => Memory::of_impression(
                            "",
                            Impression::new(s.clone(), Trait::empty(), None),
                            env.depth,
                        ),
                    })
                    .collect();
                fused.push(Value::Memory(Memory::merge_all(&memories, true)));
            }
        }
        fused
    }
}

/// Split argument memories into realities. Facts tagged with incompatible
/// entanglements must not feed the same summarized call, so each distinct
/// tag produces its own argument vector (keeping untagged facts), until
/// only untagged facts remain.
pub(crate) fn divide_by_entanglement(
    parameters: Vec<Memory>,
) -> Vec<(Vec<Memory>, Option<Entanglement>)> {
    let mut remaining = parameters;
    let mut out: Vec<(Vec<Memory>, Option<Entanglement>)> = vec![];
    loop {
        let tag = remaining
            .iter()
            .find_map(|m| m.first_entanglement().cloned());
        match tag {
            Some(e) => {
                out.push((
                    remaining.iter().map(|m| m.for_entanglement(&e)).collect(),
                    Some(e.clone()),
                ));
                remaining = remaining
                    .iter()
                    .map(|m| m.not_for_entanglement(&e))
                    .collect();
            }
            None => break,
        }
    }
    if out.is_empty() {
        out.push((remaining, None));
    }
    out
}

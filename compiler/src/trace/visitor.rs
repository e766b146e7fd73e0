//! The trace visitor
//!
//! [`MemoryVisitor`] owns all per-session analysis state: the context
//! arena, the summary cache, the moved-allocation set, and the recorded
//! diagnostics. It walks function bodies statement by statement, keeping
//! the per-name [`Memory`] and per-entity [`Shadow`] maps current in the
//! active scope frame.

use crate::tast::{
    Binding, EntanglementId, EntityId, FunctionId, IdGenerator, TypeId,
    TypedExpression, TypedExpressionKind, TypedFunction, TypedModule, TypedStatement,
};
use crate::trace::delta::FunctionDb;
use crate::trace::entity::{Entity, EntityKind, Trait};
use crate::trace::lval::Lval;
use crate::trace::memory::{FunctionSet, Impression, Memory};
use crate::trace::shadow::{Personality, Shadow};
use crate::trace::state::{ContextArena, Env};
use crate::trace::validate::{TraceDiagnostic, Validate};
use crate::trace::TraceFault;
use fxhash::{FxHashMap, FxHashSet};
use log::{debug, info};
use std::sync::Arc;

/// One value produced by evaluating an expression
///
/// Most expressions yield memories. A call whose return slot owns a fresh
/// allocation yields the allocation's shadow instead, which an
/// initializing assignment grafts directly onto its target.
#[derive(Debug, Clone)]
pub enum Value {
    Memory(Memory),
    Shadow(Arc<Shadow>),
}

/// Per-function bookkeeping pushed around each summary build
#[derive(Debug, Default)]
pub(crate) struct FunctionFrame {
    pub args: Vec<Arc<Entity>>,
    pub rets: Vec<Arc<Entity>>,
    pub ret_bindings: Vec<Binding>,
    pub angels: Vec<Arc<Entity>>,
}

/// Result of checking one function in isolation
#[derive(Debug)]
pub struct FunctionCheck {
    /// Final memory of every name visible at the end of the body
    pub bindings: Vec<(Arc<str>, Memory)>,
    pub diagnostics: Vec<TraceDiagnostic>,
}

impl FunctionCheck {
    pub fn memory_of(&self, name: &str) -> Option<&Memory> {
        self.bindings
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, m)| m)
    }
}

/// The ownership/lifetime analysis session over one typed module
pub struct MemoryVisitor<'m> {
    pub(crate) module: &'m TypedModule,
    pub db: FunctionDb,
    pub(crate) arena: ContextArena,
    pub(crate) entity_ids: IdGenerator<EntityId>,
    pub(crate) entanglement_ids: IdGenerator<EntanglementId>,
    /// Synthetic source of values with no tracked dependencies
    pub(crate) origin: Arc<Entity>,
    /// One angel per (owner, guarded path), session-wide
    pub(crate) angel_cache: FxHashMap<(EntityId, Trait), Arc<Entity>>,
    pub(crate) moved: FxHashSet<EntityId>,
    pub(crate) frames: Vec<FunctionFrame>,
    pub(crate) diagnostics: Vec<TraceDiagnostic>,
    temp_counter: u32,
}

impl<'m> MemoryVisitor<'m> {
    pub fn new(module: &'m TypedModule) -> Self {
        let entity_ids = IdGenerator::new();
        let origin = Arc::new(Entity::new(
            entity_ids.next(),
            "origin",
            0,
            module.types.void(),
            EntityKind::Origin,
        ));
        Self {
            module,
            db: FunctionDb::new(),
            arena: ContextArena::new(),
            entity_ids,
            entanglement_ids: IdGenerator::new(),
            origin,
            angel_cache: FxHashMap::default(),
            moved: FxHashSet::default(),
            frames: vec![],
            diagnostics: vec![],
            temp_counter: 0,
        }
    }

    /// Summarize every function in the module, reusing cached summaries,
    /// and return all recorded diagnostics.
    pub fn check_module(&mut self) -> Result<Vec<TraceDiagnostic>, TraceFault> {
        let module = self.module;
        info!(
            "trace analysis over {} functions",
            module.functions.len()
        );
        for function in module.functions.iter() {
            let needs_blessing = function
                .parameters
                .iter()
                .any(|p| module.types.requires_blessing(p.ty));
            if needs_blessing {
                // summarized per call site instead
                continue;
            }
            if self.db.get(&function.qualified_name).is_some() {
                continue;
            }
            self.summarize(function.id, None)?;
        }
        Ok(self.diagnostics.clone())
    }

    /// Analyze one function body and report its final scope bindings and
    /// the diagnostics it produced.
    pub fn check_function(&mut self, id: FunctionId) -> Result<FunctionCheck, TraceFault> {
        let module = self.module;
        let function = module.functions.get(id);
        let mark = self.diagnostics.len();

        self.db.begin_build(id);
        let built = self.build_delta(function, None);
        self.db.end_build(id);
        let (delta, ctx) = built?;

        let needs_blessing = function
            .parameters
            .iter()
            .any(|p| module.types.requires_blessing(p.ty));
        if !needs_blessing {
            self.db.insert(function.qualified_name.clone(), delta);
        }

        let mut bindings: Vec<(Arc<str>, Memory)> =
            self.arena.visible_memories(ctx).into_iter().collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(FunctionCheck {
            bindings,
            diagnostics: self.diagnostics[mark..].to_vec(),
        })
    }

    pub fn diagnostics(&self) -> &[TraceDiagnostic] {
        &self.diagnostics
    }

    /// All diagnostics as a renderable collection.
    pub fn report(&self) -> diagnostics::Diagnostics {
        let mut out = diagnostics::Diagnostics::new();
        for d in &self.diagnostics {
            out.push(d.diagnostic.clone());
        }
        out
    }

    // ------------------------------------------------------------------
    // Summary construction

    /// Get the summary for a call, building and caching it if necessary.
    /// Returns `None` when the callee needs a blessing but none was given.
    pub(crate) fn summarize(
        &mut self,
        id: FunctionId,
        blessings: Option<crate::trace::blessing::BlessingRow>,
    ) -> Result<Option<crate::trace::delta::FunctionDelta>, TraceFault> {
        let module = self.module;
        let function = module.functions.get(id);

        if blessings.is_none() {
            if let Some(cached) = self.db.get(&function.qualified_name) {
                debug!("delta cache hit for {}", function.qualified_name);
                return Ok(Some(cached.clone()));
            }
            let needs_blessing = function
                .parameters
                .iter()
                .any(|p| module.types.requires_blessing(p.ty));
            if needs_blessing {
                return Ok(None);
            }
        }

        if self.db.is_in_progress(id) {
            log::warn!(
                "recursive call to {}; assuming it changes no aliasing state",
                function.qualified_name
            );
            return Ok(Some(self.identity_delta(function)));
        }

        let cacheable = blessings.is_none();
        self.db.begin_build(id);
        let built = self.build_delta(function, blessings);
        self.db.end_build(id);
        let (delta, _ctx) = built?;

        if cacheable {
            self.db
                .insert(function.qualified_name.clone(), delta.clone());
        }
        Ok(Some(delta))
    }

    /// Walk a function body in a fresh, isolated context and collect its
    /// effect on arguments, angels, and returns.
    fn build_delta(
        &mut self,
        function: &'m TypedFunction,
        blessings: Option<crate::trace::blessing::BlessingRow>,
    ) -> Result<(crate::trace::delta::FunctionDelta, crate::tast::ContextId), TraceFault> {
        debug!("building delta for {}", function.qualified_name);
        let ctx = self.arena.new_isolated();
        let env = Env {
            ctx,
            function_base: ctx,
            depth: 0,
            line: function.line,
        };

        self.frames.push(FunctionFrame {
            ret_bindings: function.returns.iter().map(|r| r.binding).collect(),
            ..FunctionFrame::default()
        });

        let mut args = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            let entity =
                self.create_new_entity(&env, &parameter.name, parameter.ty, EntityKind::Parameter)?;
            args.push(entity);
        }
        if let Some(row) = &blessings {
            for (entity, blessing) in args.iter().zip(row.iter()) {
                if let Some(b) = blessing {
                    if b.is_empty() {
                        continue;
                    }
                    let current = self.shadow_of(&env, entity.id)?;
                    // attribute-level identities become personality
                    // entries, so reads through the parameter resolve to
                    // the blessed functions
                    let mut personality = current.personality.clone();
                    for (trait_, functions) in &b.attributes {
                        let name = format!("{}.{}", entity.name, trait_);
                        let mut memory = Memory::empty(&name, 0);
                        memory.functions = functions.clone();
                        personality = personality.update_with(
                            &Personality::of(trait_.clone(), memory),
                            &Trait::empty(),
                            0,
                        );
                    }
                    let blessed = Shadow {
                        entity: current.entity.clone(),
                        personality,
                        functions: b.functions.clone(),
                    };
                    self.add_shadow(&env, blessed);
                }
            }
        }

        let mut rets = Vec::with_capacity(function.returns.len());
        for ret in &function.returns {
            let entity = self.create_new_entity(&env, &ret.name, ret.ty, EntityKind::Return)?;
            rets.push(entity);
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.args = args.clone();
            frame.rets = rets.clone();
        }

        let body_env = Env { depth: 1, ..env };
        for statement in &function.body {
            self.visit_statement(&body_env.at_line(statement.line()), statement)?;
        }

        let frame = self.frames.pop().unwrap_or_default();

        let mut arg_shadows = Vec::with_capacity(args.len());
        for entity in &args {
            arg_shadows.push(self.shadow_of(&env, entity.id)?);
        }
        let mut ret_shadows = Vec::with_capacity(rets.len());
        let mut ret_memories = Vec::with_capacity(rets.len());
        for entity in &rets {
            ret_shadows.push(self.shadow_of(&env, entity.id)?);
            let memory = self
                .arena
                .get_memory(ctx, &entity.name)
                .cloned()
                .ok_or_else(|| TraceFault::UnknownReference {
                    name: entity.name.to_string(),
                    line: function.line,
                })?;
            ret_memories.push(memory);
        }
        let mut angel_shadows = FxHashMap::default();
        for angel in &frame.angels {
            angel_shadows.insert(angel.id, self.shadow_of(&env, angel.id)?);
        }

        Ok((
            crate::trace::delta::FunctionDelta {
                function_name: function.qualified_name.clone(),
                arg_shadows,
                ret_shadows,
                angels: frame.angels,
                angel_shadows,
                ret_memories,
            },
            ctx,
        ))
    }

    fn identity_delta(&self, function: &TypedFunction) -> crate::trace::delta::FunctionDelta {
        let args: Vec<Arc<Entity>> = function
            .parameters
            .iter()
            .map(|p| {
                Arc::new(Entity::new(
                    self.entity_ids.next(),
                    &p.name,
                    0,
                    p.ty,
                    EntityKind::Parameter,
                ))
            })
            .collect();
        let rets: Vec<Arc<Entity>> = function
            .returns
            .iter()
            .map(|r| {
                Arc::new(Entity::new(
                    self.entity_ids.next(),
                    &r.name,
                    0,
                    r.ty,
                    EntityKind::Return,
                ))
            })
            .collect();
        crate::trace::delta::FunctionDelta::identity(&function.qualified_name, &args, &rets)
    }

    // ------------------------------------------------------------------
    // Scope state

    pub(crate) fn get_memory(&self, env: &Env, name: &str) -> Option<Memory> {
        self.arena.get_memory(env.ctx, name).cloned()
    }

    pub(crate) fn add_memory(&mut self, env: &Env, name: Arc<str>, memory: Memory) {
        self.arena.set_memory(env.ctx, name, memory);
    }

    pub(crate) fn get_shadow(&self, env: &Env, entity: EntityId) -> Option<Arc<Shadow>> {
        self.arena.get_shadow(env.ctx, entity).cloned()
    }

    pub(crate) fn shadow_of(&self, env: &Env, entity: EntityId) -> Result<Arc<Shadow>, TraceFault> {
        self.get_shadow(env, entity)
            .ok_or_else(|| TraceFault::UnknownShadow {
                entity: format!("{}", entity),
                line: env.line,
            })
    }

    /// Record a new shadow in the current frame, validating and healing
    /// its attribute dependencies first.
    pub(crate) fn add_shadow(&mut self, env: &Env, shadow: Shadow) -> Arc<Shadow> {
        let healthy = Validate::dependencies_outlive_shadow(&mut self.diagnostics, env.line, &shadow);
        let shadow = if healthy {
            shadow
        } else {
            shadow.restore_to_healthy()
        };
        let arc = Arc::new(shadow);
        self.arena.set_shadow(env.ctx, arc.clone());
        arc
    }

    /// Declare a fresh allocation: entity, shadow, and memory.
    pub(crate) fn create_new_entity(
        &mut self,
        env: &Env,
        name: &str,
        ty: TypeId,
        kind: EntityKind,
    ) -> Result<Arc<Entity>, TraceFault> {
        let entity = Arc::new(Entity::new(self.entity_ids.next(), name, env.depth, ty, kind));
        let shadow = self.add_shadow(env, Shadow::new(entity.clone()));
        let memory = Memory::of_impression(
            name,
            Impression::new(shadow, Trait::empty(), None),
            env.depth,
        );
        self.add_memory(env, entity.name.clone(), memory);
        Ok(entity)
    }

    /// Conjure (or re-use) the angel guarding `key` under `owner`, record
    /// the alias on the owner's shadow, and return the angel's memory.
    ///
    /// Angel identity is memoized per (owner, path) for the whole session,
    /// so repeated resolution of the same external attribute is
    /// deterministic.
    pub(crate) fn create_angel_memory(
        &mut self,
        env: &Env,
        key: Trait,
        owner: &Arc<Entity>,
    ) -> Result<Memory, TraceFault> {
        let cache_key = (owner.id, key.clone());
        let angel = match self.angel_cache.get(&cache_key) {
            Some(a) => a.clone(),
            None => {
                let name = format!("{}.{}", owner.name, key);
                let a = Arc::new(Entity::new(
                    self.entity_ids.next(),
                    &name,
                    0,
                    owner.ty,
                    EntityKind::Angel {
                        owner: owner.id,
                        guarded: key.clone(),
                    },
                ));
                debug!("conjured angel {}", a.name);
                self.angel_cache.insert(cache_key, a.clone());
                a
            }
        };

        if let Some(frame) = self.frames.last_mut() {
            if !frame.angels.iter().any(|e| e.id == angel.id) {
                frame.angels.push(angel.clone());
            }
        }

        // the angel's shadow lives at the function base so it survives
        // block scopes
        let shadow = match self.arena.get_shadow(env.function_base, angel.id) {
            Some(s) => s.clone(),
            None => {
                let s = Arc::new(Shadow::new(angel.clone()));
                self.arena.set_shadow(env.function_base, s.clone());
                s
            }
        };
        let memory = Memory::of_impression(
            &angel.name,
            Impression::new(shadow, Trait::empty(), None),
            env.depth,
        );

        let owner_current = self.shadow_of(env, owner.id)?;
        let updated =
            owner_current.update_personality(&Personality::of(key, memory.clone()), &Trait::empty());
        self.add_shadow(env, updated);

        Ok(memory)
    }

    /// Graft `with_shadow` onto the current shadow of the allocation an
    /// impression points at, at the impression's path extended by
    /// `extra_trait`.
    pub(crate) fn update_source_of_impression(
        &mut self,
        env: &Env,
        impression: &Impression,
        with_shadow: &Shadow,
        extra_trait: &Trait,
    ) -> Result<(), TraceFault> {
        if impression.shadow.entity.is_origin() {
            return Ok(());
        }
        let current = self.shadow_of(env, impression.entity_id())?;
        let root = impression.root.join(extra_trait);
        let updated = current.update_with(with_shadow, &root, env.depth);
        self.add_shadow(env, updated);
        Ok(())
    }

    /// Fold attribute memories into the current shadow of an entity.
    pub(crate) fn update_personality(
        &mut self,
        env: &Env,
        entity: EntityId,
        personality: &Personality,
        root: &Trait,
    ) -> Result<(), TraceFault> {
        let current = self.shadow_of(env, entity)?;
        let updated = current.update_personality(personality, root);
        self.add_shadow(env, updated);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements

    pub(crate) fn visit_statement(
        &mut self,
        env: &Env,
        statement: &TypedStatement,
    ) -> Result<(), TraceFault> {
        match statement {
            TypedStatement::Declare {
                name, ty, binding, ..
            } => self.declare(env, name, *ty, *binding),
            TypedStatement::DeclareAssign { targets, value, .. } => {
                for target in targets {
                    self.declare(env, &target.name, target.ty, target.binding)?;
                }
                let mut lvals = Vec::with_capacity(targets.len());
                for target in targets {
                    let memory = self.get_memory(env, &target.name).ok_or_else(|| {
                        TraceFault::UnknownReference {
                            name: target.name.clone(),
                            line: env.line,
                        }
                    })?;
                    lvals.push(Lval::variable(Arc::from(target.name.as_str()), memory));
                }
                let bindings: Vec<Binding> = targets.iter().map(|t| t.binding).collect();
                let values = self.visit_expression(env, value)?;
                self.update_lvals(env, &lvals, values, Some(&bindings))
            }
            TypedStatement::Assign { targets, value, .. } => {
                let mut lvals = vec![];
                for target in targets {
                    lvals.extend(self.lvals_of(env, target)?);
                }
                let values = self.visit_expression(env, value)?;
                self.update_lvals(env, &lvals, values, None)
            }
            TypedStatement::If { arms, .. } => self.visit_if(env, arms),
            TypedStatement::While {
                condition,
                body,
                line,
            } => self.visit_while(env, condition, body, *line),
            TypedStatement::Return { values, .. } => self.visit_return(env, values),
            TypedStatement::Expression(expr) => {
                self.visit_expression(&env.at_line(expr.line), expr)?;
                Ok(())
            }
        }
    }

    fn declare(
        &mut self,
        env: &Env,
        name: &str,
        ty: TypeId,
        binding: Binding,
    ) -> Result<(), TraceFault> {
        if binding.owns_attribute() {
            self.create_new_entity(env, name, ty, EntityKind::Local)?;
        } else {
            self.add_memory(env, Arc::from(name), Memory::empty(name, env.depth));
        }
        Ok(())
    }

    fn visit_return(&mut self, env: &Env, values: &[TypedExpression]) -> Result<(), TraceFault> {
        if values.is_empty() {
            return Ok(());
        }
        let (rets, ret_bindings) = match self.frames.last() {
            Some(frame) => (frame.rets.clone(), frame.ret_bindings.clone()),
            None => return Ok(()),
        };
        let mut lvals = Vec::with_capacity(rets.len());
        for entity in &rets {
            let memory =
                self.get_memory(env, &entity.name)
                    .ok_or_else(|| TraceFault::UnknownReference {
                        name: entity.name.to_string(),
                        line: env.line,
                    })?;
            lvals.push(Lval::variable(entity.name.clone(), memory));
        }
        let mut evaluated = vec![];
        for value in values {
            evaluated.extend(self.visit_expression(&env.at_line(value.line), value)?);
        }
        self.update_lvals(env, &lvals, evaluated, Some(&ret_bindings))
    }

    // ------------------------------------------------------------------
    // Assignment

    /// Apply evaluated values to resolved targets, pairwise.
    ///
    /// `target_bindings` is given for declarations and return slots; a
    /// target whose binding owns its allocation may take a construction
    /// shadow directly, anything else receives memories.
    pub(crate) fn update_lvals(
        &mut self,
        env: &Env,
        lvals: &[Lval],
        values: Vec<Value>,
        target_bindings: Option<&[Binding]>,
    ) -> Result<(), TraceFault> {
        for (i, (lval, value)) in lvals.iter().zip(values.into_iter()).enumerate() {
            match value {
                Value::Shadow(shadow) => {
                    let takes_shadow = target_bindings
                        .and_then(|bs| bs.get(i))
                        .map(|b| b.owns_attribute() || b.returns_allocation())
                        .unwrap_or(false);
                    if takes_shadow {
                        self.update_lval_shadow(env, lval, &shadow)?;
                    } else {
                        let memory = self.coerce_shadow(env, &shadow)?;
                        self.update_lval_memory(env, lval, memory)?;
                    }
                }
                Value::Memory(memory) => self.update_lval_memory(env, lval, memory)?,
            }
        }
        Ok(())
    }

    /// Initialize an owned allocation from a construction shadow.
    fn update_lval_shadow(
        &mut self,
        env: &Env,
        lval: &Lval,
        shadow: &Shadow,
    ) -> Result<(), TraceFault> {
        if lval.memory.impressions.len() != 1 {
            return Err(TraceFault::AmbiguousConstruction { line: env.line });
        }
        let impression = lval
            .memory
            .impressions
            .first()
            .cloned()
            .ok_or(TraceFault::AmbiguousConstruction { line: env.line })?;
        self.update_source_of_impression(env, &impression, shadow, &lval.trait_)
    }

    fn update_lval_memory(
        &mut self,
        env: &Env,
        lval: &Lval,
        memory: Memory,
    ) -> Result<(), TraceFault> {
        if lval.is_variable() {
            let current =
                self.get_memory(env, &lval.name)
                    .ok_or_else(|| TraceFault::UnknownReference {
                        name: lval.name.to_string(),
                        line: env.line,
                    })?;
            let mut updated = current.update_with(&memory);
            if !Validate::dependencies_outlive_memory(&mut self.diagnostics, env.line, &updated) {
                updated = updated.restore_to_healthy();
            }
            self.add_memory(env, lval.name.clone(), updated);
            Ok(())
        } else {
            let personality = Personality::of(lval.trait_.clone(), memory);
            for impression in lval.memory.impressions.iter() {
                if impression.shadow.entity.is_origin() {
                    continue;
                }
                let entity = impression.entity_id();
                let root = impression.root.clone();
                self.update_personality(env, entity, &personality, &root)?;
            }
            Ok(())
        }
    }

    /// Resolve assignment targets without reading through the final
    /// attribute.
    pub(crate) fn lvals_of(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<Vec<Lval>, TraceFault> {
        match &expr.kind {
            TypedExpressionKind::Ref { name } => {
                let memory =
                    self.get_memory(env, name)
                        .ok_or_else(|| TraceFault::UnknownReference {
                            name: name.clone(),
                            line: env.line,
                        })?;
                Ok(vec![Lval::variable(Arc::from(name.as_str()), memory)])
            }
            TypedExpressionKind::Tuple { elements } => {
                let mut out = vec![];
                for element in elements {
                    out.extend(self.lvals_of(env, element)?);
                }
                Ok(out)
            }
            TypedExpressionKind::Attribute { .. } => self.attribute_lvals(env, expr),
            _ => Err(TraceFault::UnknownReference {
                name: "<expression>".to_string(),
                line: env.line,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    pub(crate) fn visit_expression(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<Vec<Value>, TraceFault> {
        let env = env.at_line(expr.line);
        match &expr.kind {
            TypedExpressionKind::Ref { name } => {
                let memory =
                    self.get_memory(&env, name)
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
                Ok(vec![Value::Memory(memory)])
            }
            TypedExpressionKind::Attribute { .. } => {
                let memories = self.attribute_memories(&env, expr)?;
                Ok(memories.into_iter().map(Value::Memory).collect())
            }
            TypedExpressionKind::Call { callee, arguments } => {
                self.visit_call(&env, callee, arguments)
            }
            TypedExpressionKind::FunctionLiteral { function } => {
                let shadow = Arc::new(Shadow::with_functions(
                    self.origin.clone(),
                    FunctionSet::single(*function),
                ));
                Ok(vec![Value::Memory(Memory::of_impression(
                    "",
                    Impression::new(shadow, Trait::empty(), None),
                    env.depth,
                ))])
            }
            TypedExpressionKind::Literal(_) => {
                Ok(vec![Value::Memory(Memory::empty("", env.depth))])
            }
            TypedExpressionKind::Binary { lhs, rhs, .. } => {
                self.visit_expression(&env, lhs)?;
                self.visit_expression(&env, rhs)?;
                Ok(vec![Value::Memory(Memory::empty("", env.depth))])
            }
            TypedExpressionKind::Cast { inner } => self.visit_expression(&env, inner),
            TypedExpressionKind::Tuple { elements } => {
                let mut out = vec![];
                for element in elements {
                    out.extend(self.visit_expression(&env, element)?);
                }
                Ok(out)
            }
        }
    }

    /// Evaluate an expression and coerce every value to a memory.
    pub(crate) fn expr_memories(
        &mut self,
        env: &Env,
        expr: &TypedExpression,
    ) -> Result<Vec<Memory>, TraceFault> {
        let values = self.visit_expression(env, expr)?;
        values
            .into_iter()
            .map(|v| self.coerce_value(env, v))
            .collect()
    }

    pub(crate) fn coerce_value(&mut self, env: &Env, value: Value) -> Result<Memory, TraceFault> {
        match value {
            Value::Memory(m) => Ok(m),
            Value::Shadow(s) => self.coerce_shadow(env, &s),
        }
    }

    /// Bind a construction shadow to a synthetic temporary so it can flow
    /// on as an ordinary memory.
    fn coerce_shadow(&mut self, env: &Env, shadow: &Shadow) -> Result<Memory, TraceFault> {
        self.temp_counter += 1;
        let name = format!("tmp${}", self.temp_counter);
        self.create_new_entity(env, &name, shadow.entity.ty, EntityKind::Local)?;
        let memory = self
            .get_memory(env, &name)
            .ok_or_else(|| TraceFault::UnknownReference {
                name: name.clone(),
                line: env.line,
            })?;
        if let Some(impression) = memory.impressions.first() {
            let impression = impression.clone();
            self.update_source_of_impression(env, &impression, shadow, &Trait::empty())?;
        }
        Ok(memory)
    }
}

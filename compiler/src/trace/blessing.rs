//! Blessings: concrete bindings for function-carrying parameters
//!
//! A function whose parameter is itself a function (or a trait, or a
//! struct holding a function attribute) cannot be summarized in the
//! abstract: what its body does depends on which concrete function flows
//! in. A [`Blessing`] pins one concrete identity onto such a parameter —
//! either the parameter value's own identity, or the identities its
//! function-typed attributes carry. Call sites expand every combination
//! of concrete identities the arguments may carry and summarize the
//! callee once per combination.

use crate::tast::{TypeId, TypeKind, TypeTable};
use crate::trace::entity::Trait;
use crate::trace::memory::{FunctionSet, Memory};
use crate::trace::shadow::Shadow;

/// One concrete identity choice for a blessed parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blessing {
    /// Identity of the parameter value itself (function and trait
    /// parameters)
    pub functions: FunctionSet,
    /// Identities carried by function-typed attributes of a struct
    /// parameter
    pub attributes: Vec<(Trait, FunctionSet)>,
}

impl Blessing {
    pub fn of_functions(functions: FunctionSet) -> Self {
        Self {
            functions,
            attributes: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.attributes.is_empty()
    }
}

/// The per-parameter blessings of one summarized call; `None` for
/// parameters that need no blessing
pub type BlessingRow = Vec<Option<Blessing>>;

/// Whether any parameter of the callee needs a blessing.
pub fn call_requires_blessing(types: &TypeTable, parameter_types: &[TypeId]) -> bool {
    parameter_types.iter().any(|t| types.requires_blessing(*t))
}

/// Expand every combination of concrete identities the arguments may
/// carry. Returns one row per combination; a call with no blessed
/// parameters yields a single row of `None`s.
pub fn blessing_combinations(
    types: &TypeTable,
    parameter_types: &[TypeId],
    arguments: &[Memory],
) -> Vec<BlessingRow> {
    let mut rows: Vec<BlessingRow> = vec![vec![]];

    for (i, ty) in parameter_types.iter().enumerate() {
        if !types.requires_blessing(*ty) {
            for row in rows.iter_mut() {
                row.push(None);
            }
            continue;
        }

        let choices = identity_choices(types, *ty, arguments.get(i));
        let mut next: Vec<BlessingRow> = Vec::with_capacity(rows.len() * choices.len());
        for row in rows.iter() {
            for choice in choices.iter() {
                let mut extended = row.clone();
                extended.push(Some(choice.clone()));
                next.push(extended);
            }
        }
        rows = next;
    }

    rows
}

/// The concrete identities one argument may carry, one entry per aliasing
/// possibility.
fn identity_choices(types: &TypeTable, ty: TypeId, argument: Option<&Memory>) -> Vec<Blessing> {
    let mut choices: Vec<Blessing> = vec![];
    if let Some(memory) = argument {
        for impression in memory.impressions.iter() {
            if let Some(blessing) = shadow_identity(types, ty, &impression.shadow) {
                choices.push(blessing);
            }
        }
        if choices.is_empty() && !memory.functions.is_empty() {
            choices.push(Blessing::of_functions(memory.functions.clone()));
        }
    }
    if choices.is_empty() {
        // no identity known; summarize with an unbound parameter
        choices.push(Blessing::default());
    }
    choices
}

/// The identity one aliasing possibility pins down, if any. For a struct
/// parameter this is the set of function identities its function- and
/// trait-typed attributes alias.
fn shadow_identity(types: &TypeTable, ty: TypeId, shadow: &Shadow) -> Option<Blessing> {
    match types.get(ty) {
        TypeKind::Struct { attributes, .. } => {
            let mut carried = vec![];
            for attribute in attributes {
                if !matches!(
                    types.get(attribute.ty),
                    TypeKind::Function { .. } | TypeKind::Trait { .. }
                ) {
                    continue;
                }
                let trait_ = Trait::new(&attribute.name);
                if let Some(memory) = shadow.personality.get_memory(&trait_) {
                    let mut functions = memory.functions.clone();
                    for i in memory.impressions.iter() {
                        functions = functions.union(&i.shadow.functions);
                    }
                    if !functions.is_empty() {
                        carried.push((trait_, functions));
                    }
                }
            }
            if carried.is_empty() {
                None
            } else {
                Some(Blessing {
                    functions: FunctionSet::new(),
                    attributes: carried,
                })
            }
        }
        _ => {
            if shadow.functions.is_empty() {
                None
            } else {
                Some(Blessing::of_functions(shadow.functions.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tast::{Binding, EntityId, FunctionId, StructAttribute, TypeKind};
    use crate::trace::entity::{Entity, EntityKind, Trait};
    use crate::trace::memory::Impression;
    use crate::trace::shadow::{Personality, Shadow};
    use std::sync::Arc;

    fn function_memory(name: &str, raw: u32, ids: &[u32]) -> Memory {
        let entity = Arc::new(Entity::new(
            EntityId::from_raw(raw),
            name,
            0,
            TypeId::from_raw(1),
            EntityKind::Local,
        ));
        let functions: FunctionSet = ids.iter().map(|i| FunctionId::from_raw(*i)).collect();
        Memory::of_impression(
            name,
            Impression::new(
                Arc::new(Shadow::with_functions(entity, functions)),
                Trait::empty(),
                None,
            ),
            0,
        )
    }

    fn tables() -> (TypeTable, TypeId, TypeId) {
        let mut types = TypeTable::new();
        let int = types.add(TypeKind::Primitive {
            name: "int".to_string(),
        });
        let f = types.add(TypeKind::Function {
            parameters: vec![int],
            returns: vec![],
        });
        (types, int, f)
    }

    #[test]
    fn test_no_blessing_needed() {
        let (types, int, _) = tables();
        let rows = blessing_combinations(&types, &[int, int], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec![None, None]);
        assert!(!call_requires_blessing(&types, &[int]));
    }

    #[test]
    fn test_single_identity() {
        let (types, int, f) = tables();
        assert!(call_requires_blessing(&types, &[int, f]));

        let args = vec![
            Memory::empty("n", 0),
            function_memory("cb", 0, &[4]),
        ];
        let rows = blessing_combinations(&types, &[int, f], &args);
        assert_eq!(rows.len(), 1);
        assert!(rows[0][0].is_none());
        let blessing = rows[0][1].as_ref().unwrap();
        assert!(blessing.functions.contains(FunctionId::from_raw(4)));
        assert!(blessing.attributes.is_empty());
    }

    #[test]
    fn test_cartesian_product_of_possibilities() {
        let (types, _, f) = tables();

        // one argument that may be either of two functions, and another
        // with a single identity
        let mut ambiguous = function_memory("cb", 0, &[4]);
        ambiguous
            .impressions
            .add_all(function_memory("cb2", 1, &[5]).impressions.iter());
        let args = vec![ambiguous, function_memory("other", 2, &[6])];

        let rows = blessing_combinations(&types, &[f, f], &args);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row[1]
                .as_ref()
                .unwrap()
                .functions
                .contains(FunctionId::from_raw(6)));
        }
    }

    #[test]
    fn test_struct_attribute_identity() {
        let (mut types, _, f) = tables();
        let holder = types.add(TypeKind::Struct {
            name: "holder".to_string(),
            attributes: vec![StructAttribute {
                name: "cb".to_string(),
                ty: f,
                binding: Binding::Var,
            }],
        });
        assert!(call_requires_blessing(&types, &[holder]));

        // a holder whose cb attribute aliases a known function literal
        let entity = Arc::new(Entity::new(
            EntityId::from_raw(0),
            "h",
            0,
            holder,
            EntityKind::Local,
        ));
        let shadow = Shadow {
            entity,
            personality: Personality::of(Trait::new("cb"), function_memory("cb", 1, &[4])),
            functions: FunctionSet::new(),
        };
        let arg = Memory::of_impression(
            "h",
            Impression::new(Arc::new(shadow), Trait::empty(), None),
            0,
        );

        let rows = blessing_combinations(&types, &[holder], &[arg]);
        assert_eq!(rows.len(), 1);
        let blessing = rows[0][0].as_ref().unwrap();
        assert!(blessing.functions.is_empty());
        assert_eq!(blessing.attributes.len(), 1);
        assert_eq!(blessing.attributes[0].0, Trait::new("cb"));
        assert!(blessing.attributes[0].1.contains(FunctionId::from_raw(4)));
    }
}

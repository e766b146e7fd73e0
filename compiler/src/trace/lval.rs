//! Assignment targets
//!
//! An [`Lval`] is a resolved assignment target: the name being written (or
//! the name at the base of an attribute chain), the memory of possible
//! holders, and the attribute path being written through. A plain variable
//! target has an empty trait; `x.b.c = e` resolves to the memory of the
//! owner of `b` with trait `c`.

use crate::trace::entity::Trait;
use crate::trace::memory::Memory;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Lval {
    pub name: Arc<str>,
    pub memory: Memory,
    pub trait_: Trait,
}

impl Lval {
    pub fn variable(name: Arc<str>, memory: Memory) -> Self {
        Self {
            name,
            memory,
            trait_: Trait::empty(),
        }
    }

    pub fn attribute(name: Arc<str>, memory: Memory, trait_: Trait) -> Self {
        Self {
            name,
            memory,
            trait_,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.trait_.is_empty()
    }
}

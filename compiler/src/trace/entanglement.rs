//! Conditional-reality markers
//!
//! When sibling branches of a conditional disagree about what a name may
//! point at, the fused aliasing facts from each branch are tagged with a
//! distinct [`Entanglement`]. Facts from different realities must never be
//! combined as if they could hold at once; a call site that receives
//! entangled arguments splits into one summarized call per reality.

use crate::tast::EntanglementId;
use smallvec::SmallVec;

/// Tag identifying which conditional reality a fact was formed in
///
/// Realities can nest: the returns of a call made inside reality `A` carry
/// a fresh tag with `A` recorded as an ancestor, so facts from the nested
/// reality still combine with facts from `A` itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entanglement {
    pub id: EntanglementId,
    ancestors: SmallVec<[EntanglementId; 2]>,
}

impl Entanglement {
    pub fn new(id: EntanglementId) -> Self {
        Self {
            id,
            ancestors: SmallVec::new(),
        }
    }

    /// A fresh entanglement that remains compatible with `self`.
    pub fn nested(&self, id: EntanglementId) -> Self {
        let mut ancestors = self.ancestors.clone();
        if !ancestors.contains(&self.id) {
            ancestors.push(self.id);
        }
        Self { id, ancestors }
    }

    /// Whether facts tagged `self` may be combined with facts tagged
    /// `other`. Untagged facts (None) combine with everything.
    pub fn matches(&self, other: Option<&Entanglement>) -> bool {
        match other {
            None => true,
            Some(o) => {
                self.id == o.id || self.ancestors.contains(&o.id) || o.ancestors.contains(&self.id)
            }
        }
    }
}

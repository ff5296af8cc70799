//! Module A: the two-point security lattice and the polymorphic constraint
//! element algebra built over it (spec §4.A).
//!
//! `SecurityLevel` is the lattice proper (`L ⊑ H`); `Element` is the term
//! algebra constraints are built from (`Const`, `Var`, `Join`). Joins are
//! content-addressed through [`crate::kit::Kit`] so two structurally equal
//! joins are the same interned value for the lifetime of a `Kit`.

use std::collections::BTreeSet;
use std::fmt;

use lazy_static::lazy_static;

/// A point in the two-element security lattice `{L, H}` with `L ⊑ H`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityLevel {
    /// Untainted.
    Low,
    /// Tainted.
    High,
}

impl SecurityLevel {
    /// `self ⊑ other`.
    pub fn leq(self, other: SecurityLevel) -> bool {
        use SecurityLevel::*;
        !(self == High && other == Low)
    }

    /// Pointwise maximum.
    pub fn join(self, other: SecurityLevel) -> SecurityLevel {
        use SecurityLevel::*;
        if self == High || other == High {
            High
        } else {
            Low
        }
    }

    /// The lattice value a solver seeds unconstrained variables with for the
    /// given solution shape.
    pub fn default_for(least: bool) -> SecurityLevel {
        if least {
            SecurityLevel::Low
        } else {
            SecurityLevel::High
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLevel::Low => write!(f, "L"),
            SecurityLevel::High => write!(f, "H"),
        }
    }
}

lazy_static! {
    /// Process-wide singleton for the untainted constant element (spec §5
    /// "the canonical lattice constants L, H are process-wide singletons").
    pub static ref LOW: Element = Element::Const(SecurityLevel::Low);
    /// Process-wide singleton for the tainted constant element.
    pub static ref HIGH: Element = Element::Const(SecurityLevel::High);
}

/// Returns the untainted constant element.
pub fn low() -> Element {
    LOW.clone()
}

/// Returns the tainted constant element.
pub fn high() -> Element {
    HIGH.clone()
}

/// Identity of a fresh variable. Equal only to itself; never compared by the
/// `description` carried alongside it in [`crate::kit::VariableManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

/// Identity of an interned, non-empty join of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinId(pub(crate) usize);

/// A polymorphic constraint element (spec §3 "Constraint element").
///
/// `Join` never legally appears on the right-hand side of a *stored*
/// constraint; [`crate::constraints::ConstraintStore::add`] expands it into
/// one constraint per member before storage, so solvers never need to handle
/// that case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// A lattice constant.
    Const(SecurityLevel),
    /// A fresh variable, identity-equal only to itself.
    Var(VarId),
    /// The least upper bound of a non-empty, interned set of elements.
    Join(JoinId),
}

impl Element {
    /// `true` iff this element is a variable.
    pub fn is_var(&self) -> bool {
        matches!(self, Element::Var(_))
    }

    /// `true` iff this element is a join.
    pub fn is_join(&self) -> bool {
        matches!(self, Element::Join(_))
    }
}

/// Flattens a set of elements for [`join_many`]: nested `Join`s are replaced
/// by their own members, so the resulting set never itself contains a
/// `Join`.
pub(crate) fn flatten_members(
    members: impl IntoIterator<Item = Element>,
    resolve: &impl Fn(JoinId) -> BTreeSet<Element>,
) -> BTreeSet<Element> {
    let mut out = BTreeSet::new();
    let mut stack: Vec<Element> = members.into_iter().collect();
    while let Some(e) = stack.pop() {
        match e {
            Element::Join(j) => stack.extend(resolve(j)),
            other => {
                out.insert(other);
            }
        }
    }
    out
}

/// `a ⊑ b`, interpreting `Join` as its least-upper-bound meaning.
///
/// Two distinct variables are never comparable; a variable is comparable
/// only to itself. This is the general definition spec §4.A asks for; the
/// solvers never call it on anything but fully-substituted (`Const`-only)
/// elements, since [`crate::solver::worklist::subst`] always resolves down
/// to a constant before comparing.
pub fn leq(a: &Element, b: &Element, join_members: &impl Fn(JoinId) -> BTreeSet<Element>) -> bool {
    match a {
        Element::Join(j) => join_members(*j).iter().all(|m| leq(m, b, join_members)),
        _ => match b {
            Element::Join(j) => join_members(*j).iter().any(|m| leq(a, m, join_members)),
            Element::Const(lvl_b) => match a {
                Element::Const(lvl_a) => lvl_a.leq(*lvl_b),
                _ => false,
            },
            Element::Var(id_b) => matches!(a, Element::Var(id_a) if id_a == id_b),
            Element::Join(_) => unreachable!("handled above"),
        },
    }
}

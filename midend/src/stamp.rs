// stamp.rs — Result-type lattice for graph nodes
//
// A stamp describes the kind and (for object kinds) the best-known type of
// a node's result value. Two lattice operations:
//   join — intersection, used for narrowing (Pi nodes, declared types)
//   meet — union, used where values merge (Phi nodes)
// An unknown type is a valid, common outcome, never an error.
//
// Preconditions: none (value types only).
// Failure modes: incompatible joins produce the Illegal stamp.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Kind ────────────────────────────────────────────────────────────────────

/// The value kind a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StampKind {
    Void,
    Int,
    Long,
    Float,
    Object,
    /// Bottom of the lattice: no value can satisfy this stamp.
    Illegal,
}

/// Element kind of an array access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemKind {
    Int,
    Long,
    Float,
    Object,
}

impl ElemKind {
    pub fn stamp_kind(self) -> StampKind {
        match self {
            ElemKind::Int => StampKind::Int,
            ElemKind::Long => StampKind::Long,
            ElemKind::Float => StampKind::Float,
            ElemKind::Object => StampKind::Object,
        }
    }
}

// ── Stamp ───────────────────────────────────────────────────────────────────

/// The inferred/declared type-and-legality descriptor of a node's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub kind: StampKind,
    /// Best-known type name for object kinds. `None` means unknown.
    #[serde(default)]
    pub ty: Option<String>,
    /// The type in `ty` is exactly precise (not merely an upper bound).
    #[serde(default)]
    pub exact: bool,
}

impl Stamp {
    pub fn new(kind: StampKind) -> Self {
        Stamp {
            kind,
            ty: None,
            exact: false,
        }
    }

    pub fn void() -> Self {
        Stamp::new(StampKind::Void)
    }

    pub fn int() -> Self {
        Stamp::new(StampKind::Int)
    }

    pub fn long() -> Self {
        Stamp::new(StampKind::Long)
    }

    pub fn float() -> Self {
        Stamp::new(StampKind::Float)
    }

    pub fn illegal() -> Self {
        Stamp::new(StampKind::Illegal)
    }

    /// An object stamp with unknown type.
    pub fn object() -> Self {
        Stamp::new(StampKind::Object)
    }

    /// An object stamp with a declared (non-exact) type.
    pub fn object_typed(ty: impl Into<String>) -> Self {
        Stamp {
            kind: StampKind::Object,
            ty: Some(ty.into()),
            exact: false,
        }
    }

    /// An object stamp with an exactly precise type.
    pub fn object_exact(ty: impl Into<String>) -> Self {
        Stamp {
            kind: StampKind::Object,
            ty: Some(ty.into()),
            exact: true,
        }
    }

    pub fn of_elem(elem: ElemKind) -> Self {
        Stamp::new(elem.stamp_kind())
    }

    pub fn is_illegal(&self) -> bool {
        self.kind == StampKind::Illegal
    }

    /// Intersection of two stamps. The result admits only values legal
    /// under both operands, so it is never wider than either side.
    pub fn join(&self, other: &Stamp) -> Stamp {
        if self.kind != other.kind {
            return Stamp::illegal();
        }
        if self.kind != StampKind::Object {
            return self.clone();
        }
        match (&self.ty, &other.ty) {
            (None, None) => Stamp::object(),
            (Some(t), None) => Stamp {
                kind: StampKind::Object,
                ty: Some(t.clone()),
                exact: self.exact,
            },
            (None, Some(t)) => Stamp {
                kind: StampKind::Object,
                ty: Some(t.clone()),
                exact: other.exact,
            },
            (Some(a), Some(b)) => {
                if a == b {
                    Stamp {
                        kind: StampKind::Object,
                        ty: Some(a.clone()),
                        exact: self.exact || other.exact,
                    }
                } else {
                    // Distinct named types with no subtype relation recorded:
                    // the intersection is empty.
                    Stamp::illegal()
                }
            }
        }
    }

    /// Union of two stamps. The result admits every value legal under
    /// either operand. Used for merge points (Phi).
    pub fn meet(&self, other: &Stamp) -> Stamp {
        if self.is_illegal() {
            return other.clone();
        }
        if other.is_illegal() {
            return self.clone();
        }
        if self.kind != other.kind {
            return Stamp::illegal();
        }
        if self.kind != StampKind::Object {
            return self.clone();
        }
        match (&self.ty, &other.ty) {
            (Some(a), Some(b)) if a == b => Stamp {
                kind: StampKind::Object,
                ty: Some(a.clone()),
                exact: self.exact && other.exact,
            },
            _ => Stamp::object(),
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StampKind::Void => write!(f, "void"),
            StampKind::Int => write!(f, "i32"),
            StampKind::Long => write!(f, "i64"),
            StampKind::Float => write!(f, "f64"),
            StampKind::Illegal => write!(f, "illegal"),
            StampKind::Object => match &self.ty {
                Some(t) if self.exact => write!(f, "obj:{t}!"),
                Some(t) => write!(f, "obj:{t}"),
                None => write!(f, "obj:?"),
            },
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_same_primitive_is_identity() {
        assert_eq!(Stamp::int().join(&Stamp::int()), Stamp::int());
    }

    #[test]
    fn join_mismatched_kinds_is_illegal() {
        assert!(Stamp::int().join(&Stamp::float()).is_illegal());
    }

    #[test]
    fn join_narrows_unknown_to_typed() {
        let narrowed = Stamp::object().join(&Stamp::object_typed("List"));
        assert_eq!(narrowed, Stamp::object_typed("List"));
    }

    #[test]
    fn join_typed_with_exact_keeps_exact() {
        let j = Stamp::object_typed("List").join(&Stamp::object_exact("List"));
        assert!(j.exact);
        assert_eq!(j.ty.as_deref(), Some("List"));
    }

    #[test]
    fn join_distinct_types_is_illegal() {
        let j = Stamp::object_typed("List").join(&Stamp::object_typed("Map"));
        assert!(j.is_illegal());
    }

    #[test]
    fn meet_distinct_types_widens_to_unknown() {
        let m = Stamp::object_typed("List").meet(&Stamp::object_typed("Map"));
        assert_eq!(m, Stamp::object());
    }

    #[test]
    fn meet_exact_only_if_both_exact() {
        let m = Stamp::object_exact("List").meet(&Stamp::object_typed("List"));
        assert!(!m.exact);
        let m2 = Stamp::object_exact("List").meet(&Stamp::object_exact("List"));
        assert!(m2.exact);
    }

    #[test]
    fn join_is_never_wider() {
        // For any a, b: a.join(b).join(a) == a.join(b) — the joined stamp
        // stays fixed under further intersection with its operands.
        let cases = [
            Stamp::object(),
            Stamp::object_typed("List"),
            Stamp::object_exact("List"),
            Stamp::int(),
        ];
        for a in &cases {
            for b in &cases {
                let j = a.join(b);
                assert_eq!(j.join(a), j, "join not idempotent for {a} x {b}");
            }
        }
    }
}

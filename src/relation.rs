//! Relation types - typed dependency edges
//!
//! Every edge produced by the relation counter carries one of nine kinds.
//! The kind always comes from the reference token recorded by a front-end;
//! it is never inferred from syntax afterwards.

use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dependency kinds between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationKind {
    /// Callable invokes another callable
    Call,
    /// Type extends a base type
    Extend,
    /// Type implements an interface
    Implement,
    /// Callable takes a parameter of this type
    Parameter,
    /// Callable returns this type
    Return,
    /// Callable throws this type
    Throw,
    /// Entity reads or writes another entity
    Use,
    /// Entity instantiates a type
    Create,
    /// Type holds a member of this type
    Contain,
}

impl RelationKind {
    /// Get the string representation of the relation kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Call => "Call",
            RelationKind::Extend => "Extend",
            RelationKind::Implement => "Implement",
            RelationKind::Parameter => "Parameter",
            RelationKind::Return => "Return",
            RelationKind::Throw => "Throw",
            RelationKind::Use => "Use",
            RelationKind::Create => "Create",
            RelationKind::Contain => "Contain",
        }
    }

    /// Get all relation kinds
    pub fn all() -> &'static [RelationKind] {
        &[
            RelationKind::Call,
            RelationKind::Extend,
            RelationKind::Implement,
            RelationKind::Parameter,
            RelationKind::Return,
            RelationKind::Throw,
            RelationKind::Use,
            RelationKind::Create,
            RelationKind::Contain,
        ]
    }

    /// Whether the token names a type rather than a value or callable
    pub fn refers_to_type(&self) -> bool {
        matches!(
            self,
            RelationKind::Extend
                | RelationKind::Implement
                | RelationKind::Parameter
                | RelationKind::Return
                | RelationKind::Throw
                | RelationKind::Create
                | RelationKind::Contain
        )
    }

    /// Whether a binding of this kind may be redirected from an abstract
    /// declaration to its implementations
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, RelationKind::Call | RelationKind::Use)
    }
}

impl FromStr for RelationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "calls" => Ok(RelationKind::Call),
            "extend" | "extends" | "inherit" => Ok(RelationKind::Extend),
            "implement" | "implements" => Ok(RelationKind::Implement),
            "parameter" | "param" => Ok(RelationKind::Parameter),
            "return" | "returns" => Ok(RelationKind::Return),
            "throw" | "throws" => Ok(RelationKind::Throw),
            "use" | "uses" => Ok(RelationKind::Use),
            "create" | "new" => Ok(RelationKind::Create),
            "contain" | "contains" => Ok(RelationKind::Contain),
            _ => Err(crate::Error::InvalidName(format!("Unknown relation kind: {}", s))),
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, directed edge stored on the source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Target entity
    pub target: EntityId,
    /// Type of relationship
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(target: EntityId, kind: RelationKind) -> Self {
        Self { target, kind }
    }
}

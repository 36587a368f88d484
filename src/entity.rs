//! Entity types - the nodes of the dependency graph
//!
//! Every declaration maps into one of five closed variants:
//! - `File`: one per source file, qualified by absolute path
//! - `Type`: class, interface, struct, enum
//! - `Function`: function, method, constructor
//! - `Variable`: field, parameter, local
//! - `MultiDeclare`: container for declarations colliding on one name key
//!
//! Entities never hold references to each other; every link is an
//! `EntityId` looked up through the store.

use crate::name::GenericName;
use crate::relation::{Relation, RelationKind};
use crate::resolver::ResolutionStrategy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process-unique entity identifier, assigned monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entity kinds, one per `EntityData` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    File,
    Type,
    Function,
    Variable,
    MultiDeclare,
}

impl EntityKind {
    /// Get the string representation of the entity kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Type => "type",
            EntityKind::Function => "function",
            EntityKind::Variable => "variable",
            EntityKind::MultiDeclare => "multideclare",
        }
    }

    /// Get all entity kinds
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::File,
            EntityKind::Type,
            EntityKind::Function,
            EntityKind::Variable,
            EntityKind::MultiDeclare,
        ]
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" | "module" => Ok(EntityKind::File),
            "type" | "class" | "interface" | "struct" => Ok(EntityKind::Type),
            "function" | "method" | "fn" | "def" => Ok(EntityKind::Function),
            "variable" | "var" | "field" | "parameter" => Ok(EntityKind::Variable),
            "multideclare" | "multi" => Ok(EntityKind::MultiDeclare),
            _ => Err(Error::InvalidName(format!("Unknown entity kind: {}", s))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A type mentioned by name, bound to a declaration once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: GenericName,
    pub target: Option<EntityId>,
}

impl TypeRef {
    pub fn new(name: impl Into<GenericName>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }
}

/// An import/use declaration of a file.
///
/// `path` is the dotted target (`java.util.List`, `os.path`). The name the
/// import binds in the file is `alias` when present, else the last segment
/// of `path`. Wildcard imports bind every member of `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub wildcard: bool,
}

impl Import {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            wildcard: false,
        }
    }

    pub fn wildcard(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            wildcard: true,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The short name this import introduces, if it introduces exactly one
    pub fn bound_name(&self) -> Option<&str> {
        if self.wildcard {
            return None;
        }
        self.alias
            .as_deref()
            .or_else(|| self.path.rsplit('.').next())
    }
}

/// A raw, unresolved reference recorded by a front-end.
///
/// `name` is a dotted path (`s.area`, `this.repo.save`, `pkg.Type`). A
/// leading `.` marks a member access on a receiver the front-end could not
/// name (`.area` for `make().area()`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceToken {
    pub from: EntityId,
    pub name: String,
    pub kind: RelationKind,
    /// Argument count for calls and instantiations
    pub arity: Option<usize>,
    pub line: u32,
}

impl ReferenceToken {
    pub fn new(from: EntityId, name: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            from,
            name: name.into(),
            kind,
            arity: None,
            line: 0,
        }
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

/// A resolved reference: the input of the relation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// One target for precise strategies; duck typing may yield several
    pub targets: Vec<EntityId>,
    pub kind: RelationKind,
    pub strategy: ResolutionStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub package: Option<String>,
    /// Dotted module path for languages that name modules after files
    pub module: Option<String>,
    pub imports: Vec<Import>,
    /// Cached until the binding resolver drains it
    pub references: Vec<ReferenceToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeData {
    pub extends: Vec<TypeRef>,
    pub implements: Vec<TypeRef>,
    pub is_interface: bool,
    pub is_abstract: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionData {
    /// Parameter variables in declaration order
    pub parameters: Vec<EntityId>,
    pub return_type: Option<TypeRef>,
    pub throws: Vec<TypeRef>,
    pub is_abstract: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableData {
    pub declared_type: Option<TypeRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiDeclareData {
    /// Colliding declarations in insertion order
    pub entities: Vec<EntityId>,
}

/// Variant payload of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityData {
    File(FileData),
    Type(TypeData),
    Function(FunctionData),
    Variable(VariableData),
    #[serde(rename = "multideclare")]
    MultiDeclare(MultiDeclareData),
}

/// A node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub raw_name: GenericName,
    /// Globally unique key when known (absolute path, `pkg.Type.method`)
    pub qualified_name: Option<String>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub relations: Vec<Relation>,
    pub bindings: Vec<Binding>,
    /// Declaration line (1-indexed, 0 when unknown)
    pub line: u32,
    /// Declared under an include path rather than the analyzed tree
    pub external: bool,
    #[serde(skip)]
    pub(crate) relations_computed: bool,
    pub data: EntityData,
}

impl Entity {
    /// Create an entity with the given payload
    pub fn new(id: EntityId, raw_name: impl Into<GenericName>, data: EntityData) -> Self {
        Self {
            id,
            raw_name: raw_name.into(),
            qualified_name: None,
            parent: None,
            children: Vec::new(),
            relations: Vec::new(),
            bindings: Vec::new(),
            line: 0,
            external: false,
            relations_computed: false,
            data,
        }
    }

    /// A file entity qualified by its path
    pub fn file(id: EntityId, path: impl Into<String>, data: FileData) -> Self {
        let path = path.into();
        let short = path.rsplit(['/', '\\']).next().unwrap_or(&path).to_string();
        Self::new(id, GenericName::new(short), EntityData::File(data)).with_qualified_name(path)
    }

    /// Set the qualified name; an empty string clears it
    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        self.qualified_name = (!qualified_name.is_empty()).then_some(qualified_name);
        self
    }

    /// Set the enclosing entity
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the declaration line
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Mark the entity as declared outside the analyzed tree
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    pub fn kind(&self) -> EntityKind {
        match &self.data {
            EntityData::File(_) => EntityKind::File,
            EntityData::Type(_) => EntityKind::Type,
            EntityData::Function(_) => EntityKind::Function,
            EntityData::Variable(_) => EntityKind::Variable,
            EntityData::MultiDeclare(_) => EntityKind::MultiDeclare,
        }
    }

    /// Key under which the store indexes this entity by name
    pub fn name_key(&self) -> String {
        match &self.qualified_name {
            Some(qn) => qn.clone(),
            None => self.raw_name.uniq_name(),
        }
    }

    /// Short name used for scope lookups
    pub fn short_name(&self) -> &str {
        self.raw_name.name()
    }

    pub fn as_file(&self) -> Option<&FileData> {
        match &self.data {
            EntityData::File(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeData> {
        match &self.data {
            EntityData::Type(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.data {
            EntityData::Function(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableData> {
        match &self.data {
            EntityData::Variable(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_multi_declare(&self) -> Option<&MultiDeclareData> {
        match &self.data {
            EntityData::MultiDeclare(d) => Some(d),
            _ => None,
        }
    }

    /// Number of declared parameters, for functions
    pub fn arity(&self) -> Option<usize> {
        self.as_function().map(|f| f.parameters.len())
    }

    /// Relations of a given kind
    pub fn relations_of(&self, kind: RelationKind) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.kind == kind)
    }
}

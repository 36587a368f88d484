//! Language Front-End Framework
//!
//! A front-end turns one source file into raw entities and unresolved
//! reference tokens. It never resolves names itself; everything it learns
//! goes through an `EntitySink`, which registers declarations in the store
//! and caches references on the file for the binding resolver.
//!
//! Methods are also registered under a signature role key of the form
//! `Owner,method,p1,p2`. Each parameter contributes the `uniq_name` of its
//! declared type, so `scale(double factor, unit)` on `p.Shape` becomes
//! `p.Shape,scale,double,unit`. Only an untyped parameter contributes its
//! name. Overrides in implementors then share the key whatever their
//! parameter names are.

pub mod java;
pub mod python;

pub use java::JavaFrontEnd;
pub use python::PythonFrontEnd;

use crate::entity::{
    Entity, EntityData, EntityId, EntityKind, FileData, FunctionData, ReferenceToken, TypeData,
    TypeRef, VariableData,
};
use crate::lang::Language;
use crate::name::{GenericName, qualify, signature_role_key};
use crate::relation::RelationKind;
use crate::store::EntityStore;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// A source file handed to a front-end.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Absolute path; becomes the file entity's qualified name
    pub path: PathBuf,
    /// Path relative to the analysis root, used to derive module names
    pub relative_path: String,
    /// Parsed from an include path rather than the analyzed tree
    pub external: bool,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, relative_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            external: false,
        }
    }

    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub(crate) fn parse_failure(&self, reason: impl Into<String>) -> Error {
        Error::ParseFailure {
            path: self.display_path(),
            reason: reason.into(),
        }
    }
}

/// Trait for language front-ends
///
/// Each front-end is responsible for:
/// 1. Identifying files it can parse
/// 2. Rejecting syntactically invalid files before registering anything
/// 3. Declaring files, types, functions and variables through the sink
/// 4. Recording every reference as an unresolved token
pub trait FrontEnd: Send + Sync {
    fn language(&self) -> Language;

    /// Get file extensions this front-end handles
    fn file_extensions(&self) -> &[&str];

    /// Check if this front-end can handle a file
    fn can_handle(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.file_extensions().contains(&ext))
    }

    /// Parse a file, register its entities and complete it.
    /// Returns the file entity.
    fn parse_file(&self, unit: &SourceUnit, content: &str, sink: &EntitySink<'_>) -> Result<EntityId>;
}

/// A parameter as written in a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDecl {
    pub name: String,
    pub type_name: Option<String>,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name,
        }
    }

    /// Component of the signature role key
    fn role_name(&self) -> String {
        match &self.type_name {
            Some(t) => GenericName::from(t.as_str()).uniq_name(),
            None => self.name.clone(),
        }
    }
}

/// A function, method or constructor declaration.
#[derive(Debug, Clone, Default)]
pub struct FunctionDecl {
    pub name: String,
    pub parameters: Vec<ParameterDecl>,
    pub return_type: Option<String>,
    pub throws: Vec<String>,
    pub is_abstract: bool,
    pub line: u32,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            line,
            ..Default::default()
        }
    }
}

/// Registration API front-ends write through.
pub struct EntitySink<'a> {
    store: &'a EntityStore,
    external: bool,
}

impl<'a> EntitySink<'a> {
    pub fn new(store: &'a EntityStore, external: bool) -> Self {
        Self { store, external }
    }

    pub fn store(&self) -> &EntityStore {
        self.store
    }

    /// Register the file entity
    pub fn file(&self, path: &str, data: FileData) -> EntityId {
        let entity = Entity::file(self.store.generate_id(), path, data).external(self.external);
        self.store.add(entity)
    }

    /// Register a type under `parent` (a file, type or function)
    pub fn declare_type(&self, parent: EntityId, name: &str, data: TypeData, line: u32) -> Result<EntityId> {
        let qualified = self.member_key(parent, name)?;
        let entity = Entity::new(self.store.generate_id(), name, EntityData::Type(data))
            .with_qualified_name(qualified)
            .with_parent(parent)
            .at_line(line)
            .external(self.external);
        Ok(self.store.add(entity))
    }

    /// Register a function with its parameter variables.
    ///
    /// Methods are also indexed under their signature role key, and the
    /// declared parameter, return and thrown types become reference tokens.
    pub fn declare_function(&self, parent: EntityId, decl: FunctionDecl) -> Result<EntityId> {
        let qualified = self.member_key(parent, &decl.name)?;
        let data = FunctionData {
            parameters: Vec::new(),
            return_type: decl.return_type.as_deref().map(TypeRef::new),
            throws: decl.throws.iter().map(|t| TypeRef::new(t.as_str())).collect(),
            is_abstract: decl.is_abstract,
        };
        let id = self.store.add(
            Entity::new(self.store.generate_id(), decl.name.as_str(), EntityData::Function(data))
                .with_qualified_name(qualified)
                .with_parent(parent)
                .at_line(decl.line)
                .external(self.external),
        );

        let mut parameters = Vec::with_capacity(decl.parameters.len());
        for param in &decl.parameters {
            let variable = Entity::new(
                self.store.generate_id(),
                param.name.as_str(),
                EntityData::Variable(VariableData {
                    declared_type: param.type_name.as_deref().map(TypeRef::new),
                }),
            )
            .with_parent(id)
            .at_line(decl.line)
            .external(self.external);
            parameters.push(self.store.add(variable));
            if let Some(type_name) = &param.type_name {
                self.type_reference(id, type_name, RelationKind::Parameter, decl.line)?;
            }
        }
        self.store.update(id, |entity| {
            if let EntityData::Function(f) = &mut entity.data {
                f.parameters = parameters;
            }
        });

        if let Some(owner_key) = self.type_key(parent) {
            let params: Vec<String> = decl.parameters.iter().map(ParameterDecl::role_name).collect();
            let params: Vec<&str> = params.iter().map(String::as_str).collect();
            self.store
                .register_role(signature_role_key(&owner_key, &decl.name, &params), id);
        }

        if let Some(return_type) = &decl.return_type {
            self.type_reference(id, return_type, RelationKind::Return, decl.line)?;
        }
        for thrown in &decl.throws {
            self.type_reference(id, thrown, RelationKind::Throw, decl.line)?;
        }
        Ok(id)
    }

    /// Register a variable. Members of a type or file are qualified; the
    /// declared type of a type member becomes a CONTAIN reference of the type.
    pub fn declare_variable(
        &self,
        parent: EntityId,
        name: &str,
        type_name: Option<&str>,
        line: u32,
    ) -> Result<EntityId> {
        let owner_key = self.type_key(parent);
        let parent_kind = self.store.get_by_id(parent).map(|e| e.kind());
        let qualified = match parent_kind {
            Some(EntityKind::Type | EntityKind::File) => Some(self.member_key(parent, name)?),
            _ => None,
        };
        let entity = Entity::new(
            self.store.generate_id(),
            name,
            EntityData::Variable(VariableData {
                declared_type: type_name.map(TypeRef::new),
            }),
        )
        .with_qualified_name(qualified.unwrap_or_default())
        .with_parent(parent)
        .at_line(line)
        .external(self.external);
        let id = self.store.add(entity);

        if let (Some(_), Some(type_name)) = (owner_key, type_name) {
            self.type_reference(parent, type_name, RelationKind::Contain, line)?;
        }
        Ok(id)
    }

    /// Record an unresolved reference
    pub fn reference(&self, token: ReferenceToken) -> Result<()> {
        self.store.submit_reference(token)
    }

    /// Record a reference to a type name, including its generic arguments
    pub fn type_reference(&self, from: EntityId, type_name: &str, kind: RelationKind, line: u32) -> Result<()> {
        let name = GenericName::from(type_name);
        self.type_reference_of(from, &name, kind, line)
    }

    fn type_reference_of(&self, from: EntityId, name: &GenericName, kind: RelationKind, line: u32) -> Result<()> {
        if name.name() != "?" {
            self.reference(ReferenceToken::new(from, name.name(), kind).at_line(line))?;
        }
        for argument in name.arguments() {
            self.type_reference_of(from, argument, kind, line)?;
        }
        Ok(())
    }

    /// Mark the file as fully parsed
    pub fn complete_file(&self, file: EntityId) {
        self.store.complete_file(file);
    }

    /// Qualified name of a declaration inside `parent`; files contribute
    /// their package (or module)
    fn member_key(&self, parent: EntityId, name: &str) -> Result<String> {
        let entity = self.store.get_by_id(parent).ok_or(Error::StoreConsistency(parent))?;
        let prefix = match &entity.data {
            EntityData::File(data) => data.module.clone().or_else(|| data.package.clone()),
            _ => entity.qualified_name.clone(),
        };
        Ok(qualify(prefix.as_deref(), name))
    }

    fn type_key(&self, id: EntityId) -> Option<String> {
        let entity = self.store.get_by_id(id)?;
        (entity.kind() == EntityKind::Type).then(|| entity.name_key())
    }
}

/// 1-based line of a tree-sitter node
pub(crate) fn line_of(node: tree_sitter::Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Source text of a node
pub(crate) fn text_of<'s>(node: tree_sitter::Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Line of the first error or missing node below `node`
pub(crate) fn first_error_line(node: tree_sitter::Node<'_>) -> u32 {
    if node.is_error() || node.is_missing() {
        return line_of(node);
    }
    let mut cursor = node.walk();
    let children: Vec<tree_sitter::Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .map(first_error_line)
        .next()
        .unwrap_or_else(|| line_of(node))
}

/// Whether an identifier is the name a declaration, parameter list or
/// assignment target introduces rather than a read of an existing name
pub(crate) fn binds_name(node: tree_sitter::Node<'_>, binding_parents: &[&str]) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    binding_parents.contains(&parent.kind())
        || ["name", "alias", "left", "parameters"]
            .iter()
            .any(|field| parent.child_by_field_name(field) == Some(node))
}

/// First named child of the given kind
pub(crate) fn child_of_kind<'t>(node: tree_sitter::Node<'t>, kind: &str) -> Option<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_fixture() -> (EntityStore, EntityId) {
        let store = EntityStore::new();
        let file = {
            let sink = EntitySink::new(&store, false);
            sink.file(
                "/src/p/Shape.java",
                FileData {
                    package: Some("p".to_string()),
                    ..Default::default()
                },
            )
        };
        (store, file)
    }

    #[test]
    fn test_declare_function_registers_parameters_and_role() {
        let (store, file) = sink_fixture();
        let sink = EntitySink::new(&store, false);
        let shape = sink.declare_type(file, "Shape", TypeData::default(), 1).unwrap();

        let mut decl = FunctionDecl::new("scale", 2);
        decl.parameters = vec![
            ParameterDecl::new("factor", Some("double".to_string())),
            ParameterDecl::new("unit", None),
        ];
        decl.return_type = Some("List<Shape>".to_string());
        let scale = sink.declare_function(shape, decl).unwrap();

        let entity = store.get_by_id(scale).unwrap();
        assert_eq!(entity.qualified_name.as_deref(), Some("p.Shape.scale"));
        assert_eq!(entity.arity(), Some(2));
        drop(entity);

        assert_eq!(store.lookup_role("p.Shape,scale,double,unit"), vec![scale]);

        let tokens = store.take_references(file);
        let names: Vec<(&str, RelationKind)> = tokens.iter().map(|t| (t.name.as_str(), t.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("double", RelationKind::Parameter),
                ("List", RelationKind::Return),
                ("Shape", RelationKind::Return),
            ]
        );
    }

    #[test]
    fn test_field_contains_type() {
        let (store, file) = sink_fixture();
        let sink = EntitySink::new(&store, false);
        let shape = sink.declare_type(file, "Shape", TypeData::default(), 1).unwrap();
        let field = sink.declare_variable(shape, "origin", Some("Point"), 2).unwrap();
        let area = sink.declare_function(shape, FunctionDecl::new("area", 3)).unwrap();
        let local = sink.declare_variable(area, "tmp", Some("Point"), 4).unwrap();

        assert_eq!(store.get_by_id(field).unwrap().qualified_name.as_deref(), Some("p.Shape.origin"));
        assert!(store.get_by_id(local).unwrap().qualified_name.is_none());

        let tokens = store.take_references(file);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].from, shape);
        assert_eq!(tokens[0].kind, RelationKind::Contain);
    }
}

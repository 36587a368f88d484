//! Python front-end
//!
//! Modules are named after their path relative to the analysis root
//! (`pkg/shapes.py` → `pkg.shapes`, `pkg/__init__.py` → `pkg`). Relative
//! imports are resolved against the file's package here, so the import
//! lookup only ever sees absolute module paths.
//!
//! `self`/`cls` are dropped from method parameters; attributes assigned
//! through `self` become fields of the enclosing class.
//!
//! `return Foo(...)` and `raise Foo(...)` record `Foo` as the returned or
//! thrown type besides the call itself.

use super::{
    EntitySink, FrontEnd, FunctionDecl, ParameterDecl, SourceUnit, binds_name, child_of_kind,
    first_error_line, line_of, text_of,
};
use crate::Result;
use crate::entity::{EntityData, EntityId, EntityKind, FileData, Import, ReferenceToken, TypeData, TypeRef};
use crate::lang::Language;
use crate::relation::RelationKind;
use std::cell::RefCell;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

/// Parents whose identifiers never read a variable
const PYTHON_BINDING_PARENTS: &[&str] = &[
    "lambda_parameters",
    "global_statement",
    "nonlocal_statement",
    "pattern_list",
    "tuple_pattern",
    "list_pattern",
    "as_pattern_target",
    "dotted_name",
];

/// Python front-end
#[derive(Debug, Default)]
pub struct PythonFrontEnd;

impl PythonFrontEnd {
    pub fn new() -> Self {
        Self
    }
}

impl FrontEnd for PythonFrontEnd {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }

    fn parse_file(&self, unit: &SourceUnit, content: &str, sink: &EntitySink<'_>) -> Result<EntityId> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| unit.parse_failure(format!("Failed to set language: {}", e)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| unit.parse_failure("parser produced no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(unit.parse_failure(format!("syntax error at line {}", first_error_line(root))));
        }

        let (module, package) = module_path(&unit.relative_path);
        let walker = PythonWalker {
            source: content,
            sink,
            package: package.clone(),
            declared: RefCell::new(HashSet::new()),
        };

        let mut imports = Vec::new();
        walker.collect_imports(root, &mut imports);
        let file = sink.file(
            &unit.display_path(),
            FileData {
                package,
                module,
                imports,
                references: Vec::new(),
            },
        );
        walker.visit_children(root, file)?;
        sink.complete_file(file);
        Ok(file)
    }
}

/// Module and package of a file from its relative path
pub fn module_path(relative_path: &str) -> (Option<String>, Option<String>) {
    let normalized = relative_path.replace('\\', "/");
    let Some(stem) = normalized
        .strip_suffix(".pyi")
        .or_else(|| normalized.strip_suffix(".py"))
    else {
        return (None, None);
    };
    let mut parts: Vec<&str> = stem.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let is_package = parts.last() == Some(&"__init__");
    if is_package {
        parts.pop();
    }
    if parts.is_empty() {
        return (None, None);
    }

    let module = parts.join(".");
    let package = if is_package {
        Some(module.clone())
    } else {
        module.rsplit_once('.').map(|(package, _)| package.to_string())
    };
    (Some(module), package)
}

/// `List[Shape]` → `List<Shape>`, `"Shape"` → `Shape`, `Shape | None` → `Shape`
fn normalize_annotation(text: &str) -> Option<String> {
    let unquoted = text.trim().trim_matches(|c| c == '"' || c == '\'');
    let primary = unquoted
        .split('|')
        .map(str::trim)
        .find(|part| !part.is_empty() && *part != "None")?;
    Some(primary.replace('[', "<").replace(']', ">"))
}

struct PythonWalker<'s, 'a> {
    source: &'s str,
    sink: &'s EntitySink<'a>,
    package: Option<String>,
    /// (scope, name) pairs already declared, so reassignments don't redeclare
    declared: RefCell<HashSet<(EntityId, String)>>,
}

impl<'s, 'a> PythonWalker<'s, 'a> {
    fn text(&self, node: Node<'_>) -> &'s str {
        text_of(node, self.source)
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn collect_imports(&self, node: Node<'_>, imports: &mut Vec<Import>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_statement" => self.plain_import(child, imports),
                "import_from_statement" => self.from_import(child, imports),
                _ => self.collect_imports(child, imports),
            }
        }
    }

    fn plain_import(&self, node: Node<'_>, imports: &mut Vec<Import>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => imports.push(Import::new(self.text(child))),
                "aliased_import" => {
                    let name = child.child_by_field_name("name").map(|n| self.text(n));
                    let alias = child.child_by_field_name("alias").map(|n| self.text(n));
                    if let (Some(name), Some(alias)) = (name, alias) {
                        imports.push(Import::new(name).with_alias(alias));
                    }
                }
                _ => {}
            }
        }
    }

    fn from_import(&self, node: Node<'_>, imports: &mut Vec<Import>) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = match module_node.kind() {
            "relative_import" => self.resolve_relative(self.text(module_node)),
            _ => self.text(module_node).to_string(),
        };

        if child_of_kind(node, "wildcard_import").is_some() {
            imports.push(Import::wildcard(module));
            return;
        }

        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (imported, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name").map(|n| self.text(n)),
                    name.child_by_field_name("alias").map(|n| self.text(n)),
                ),
                _ => (Some(self.text(name)), None),
            };
            let Some(imported) = imported else {
                continue;
            };
            let bound = alias.unwrap_or_else(|| imported.rsplit('.').next().unwrap_or(imported));
            let path = if module.is_empty() {
                imported.to_string()
            } else {
                format!("{}.{}", module, imported)
            };
            imports.push(Import::new(path).with_alias(bound));
        }
    }

    /// `..util` from package `app.core` → `app.util`
    fn resolve_relative(&self, text: &str) -> String {
        let dots = text.chars().take_while(|c| *c == '.').count();
        let rest = &text[dots..];
        let mut base: Vec<&str> = self
            .package
            .as_deref()
            .map(|p| p.split('.').collect())
            .unwrap_or_default();
        for _ in 1..dots {
            base.pop();
        }
        if !rest.is_empty() {
            base.push(rest);
        }
        base.join(".")
    }

    // ------------------------------------------------------------------
    // Declarations and references
    // ------------------------------------------------------------------

    fn visit(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        match node.kind() {
            "function_definition" => self.function(node, scope, &[]),
            "class_definition" => self.class(node, scope),
            "decorated_definition" => {
                let mut cursor = node.walk();
                let decorators: Vec<&str> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "decorator")
                    .map(|d| self.text(d).trim_start_matches('@').trim())
                    .collect();
                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "function_definition" => self.function(def, scope, &decorators),
                    Some(def) => self.visit(def, scope),
                    None => Ok(()),
                }
            }
            "import_statement" | "import_from_statement" => Ok(()),
            "call" => self.call(node, scope),
            "attribute" => match self.path_of(node) {
                Some(path) => self.reference(scope, path, RelationKind::Use, None, node),
                None => self.visit_children(node, scope),
            },
            "assignment" => self.assignment(node, scope),
            "raise_statement" => {
                let Some(raised) = node.named_child(0) else {
                    return Ok(());
                };
                match self.instantiated(raised).or_else(|| self.path_of(raised)) {
                    Some(path) => {
                        self.reference(scope, path, RelationKind::Throw, None, node)?;
                        if raised.kind() == "call" {
                            self.visit(raised, scope)?;
                        }
                        match node.child_by_field_name("cause") {
                            Some(cause) => self.visit(cause, scope),
                            None => Ok(()),
                        }
                    }
                    None => self.visit_children(node, scope),
                }
            }
            "return_statement" => {
                if let Some(returned) = node.named_child(0).and_then(|r| self.instantiated(r)) {
                    self.reference(scope, returned, RelationKind::Return, None, node)?;
                }
                self.visit_children(node, scope)
            }
            "identifier" => {
                let name = self.text(node);
                if !binds_name(node, PYTHON_BINDING_PARENTS) && !matches!(name, "self" | "cls") {
                    self.reference(scope, name.to_string(), RelationKind::Use, None, node)?;
                }
                Ok(())
            }
            _ => self.visit_children(node, scope),
        }
    }

    fn visit_children(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope)?;
        }
        Ok(())
    }

    fn scope_kind(&self, scope: EntityId) -> Option<EntityKind> {
        self.sink.store().get_by_id(scope).map(|e| e.kind())
    }

    fn function(&self, node: Node<'_>, scope: EntityId, decorators: &[&str]) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return Ok(());
        };
        let in_class = self.scope_kind(scope) == Some(EntityKind::Type);
        let is_static = decorators.iter().any(|d| d.ends_with("staticmethod"));
        let is_abstract = in_class && decorators.iter().any(|d| d.ends_with("abstractmethod"));

        let mut parameters = node
            .child_by_field_name("parameters")
            .map(|p| self.parameters(p))
            .unwrap_or_default();
        if in_class && !is_static && !parameters.is_empty() {
            parameters.remove(0);
        }

        let mut decl = FunctionDecl::new(name, line_of(node));
        decl.return_type = node
            .child_by_field_name("return_type")
            .and_then(|r| normalize_annotation(self.text(r)));
        decl.is_abstract = is_abstract;
        decl.parameters = parameters;

        let param_names: Vec<String> = decl.parameters.iter().map(|p| p.name.clone()).collect();
        let id = self.sink.declare_function(scope, decl)?;
        {
            let mut declared = self.declared.borrow_mut();
            for param in param_names {
                declared.insert((id, param));
            }
        }

        if is_abstract {
            self.sink.store().update(scope, |entity| {
                if let EntityData::Type(data) = &mut entity.data {
                    data.is_abstract = true;
                }
            });
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, id)?;
        }
        Ok(())
    }

    fn parameters(&self, node: Node<'_>) -> Vec<ParameterDecl> {
        let mut params = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let (name, ty) = match child.kind() {
                "identifier" => (Some(self.text(child)), None),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (child.named_child(0).map(|n| self.text(n)), None)
                }
                "typed_parameter" => (
                    child.named_child(0).and_then(|n| match n.kind() {
                        "identifier" => Some(self.text(n)),
                        _ => n.named_child(0).map(|inner| self.text(inner)),
                    }),
                    child.child_by_field_name("type"),
                ),
                "default_parameter" => (child.child_by_field_name("name").map(|n| self.text(n)), None),
                "typed_default_parameter" => (
                    child.child_by_field_name("name").map(|n| self.text(n)),
                    child.child_by_field_name("type"),
                ),
                _ => (None, None),
            };
            if let Some(name) = name {
                let ty = ty.and_then(|t| normalize_annotation(self.text(t)));
                params.push(ParameterDecl::new(name, ty));
            }
        }
        params
    }

    fn class(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return Ok(());
        };

        let mut data = TypeData::default();
        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                match base.kind() {
                    "identifier" | "attribute" => {
                        let text = self.text(base);
                        if text == "ABC" || text.ends_with(".ABC") {
                            data.is_abstract = true;
                        }
                        data.extends.push(TypeRef::new(text));
                    }
                    "keyword_argument" => {
                        let metaclass = base.child_by_field_name("value").map(|v| self.text(v));
                        if metaclass.is_some_and(|m| m.ends_with("ABCMeta")) {
                            data.is_abstract = true;
                        }
                    }
                    _ => {}
                }
            }
        }

        let id = self.sink.declare_type(scope, name, data, line_of(node))?;
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, id)?;
        }
        Ok(())
    }

    fn assignment(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let right = node.child_by_field_name("right");
        let declared_type = node
            .child_by_field_name("type")
            .and_then(|t| normalize_annotation(self.text(t)))
            .or_else(|| {
                // `x = Circle(2)` types `x` as whatever `Circle` names
                right
                    .filter(|r| r.kind() == "call")
                    .and_then(|r| r.child_by_field_name("function"))
                    .and_then(|f| self.path_of(f))
            });

        if let Some(left) = node.child_by_field_name("left") {
            match left.kind() {
                "identifier" => {
                    self.declare_once(scope, self.text(left), declared_type.as_deref(), left)?;
                }
                "attribute" => {
                    self.instance_field(left, scope, declared_type.as_deref())?;
                    self.visit(left, scope)?;
                }
                _ => self.visit(left, scope)?,
            }
        }
        if let Some(right) = right {
            self.visit(right, scope)?;
        }
        Ok(())
    }

    /// `self.radius = ...` inside a method declares `radius` on the class
    fn instance_field(&self, target: Node<'_>, scope: EntityId, declared_type: Option<&str>) -> Result<()> {
        let (Some(object), Some(attribute)) = (
            target.child_by_field_name("object"),
            target.child_by_field_name("attribute"),
        ) else {
            return Ok(());
        };
        if object.kind() != "identifier" || !matches!(self.text(object), "self" | "cls") {
            return Ok(());
        }
        let owner = self.sink.store().get_by_id(scope).and_then(|e| e.parent);
        match owner {
            Some(owner) if self.scope_kind(owner) == Some(EntityKind::Type) => {
                self.declare_once(owner, self.text(attribute), declared_type, target)
            }
            _ => Ok(()),
        }
    }

    fn declare_once(&self, scope: EntityId, name: &str, declared_type: Option<&str>, node: Node<'_>) -> Result<()> {
        let fresh = self.declared.borrow_mut().insert((scope, name.to_string()));
        if fresh {
            self.sink.declare_variable(scope, name, declared_type, line_of(node))?;
        }
        Ok(())
    }

    fn call(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let arguments = node.child_by_field_name("arguments");
        let arity = arguments
            .filter(|a| a.kind() == "argument_list")
            .map(|a| a.named_child_count())
            .unwrap_or(1);

        let Some(function) = node.child_by_field_name("function") else {
            return self.visit_children(node, scope);
        };
        let target = match function.kind() {
            "identifier" => Some(self.text(function).to_string()),
            "attribute" => match self.path_of(function) {
                Some(path) => Some(path),
                None => {
                    if let Some(object) = function.child_by_field_name("object") {
                        self.visit(object, scope)?;
                    }
                    function
                        .child_by_field_name("attribute")
                        .map(|a| format!(".{}", self.text(a)))
                }
            },
            _ => {
                self.visit(function, scope)?;
                None
            }
        };
        if let Some(target) = target {
            self.reference(scope, target, RelationKind::Call, Some(arity), node)?;
        }

        if let Some(arguments) = arguments {
            self.visit_children(arguments, scope)?;
        }
        Ok(())
    }

    /// Callee path of `Foo(...)`, the type a returned or raised call
    /// instantiates when it names a class
    fn instantiated(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "call" {
            return None;
        }
        node.child_by_field_name("function").and_then(|f| self.path_of(f))
    }

    /// Dotted path of a nameable expression; `super()` names the base
    fn path_of(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "attribute" => {
                let object = self.path_of(node.child_by_field_name("object")?)?;
                let attribute = self.text(node.child_by_field_name("attribute")?);
                Some(format!("{}.{}", object, attribute))
            }
            "call" => {
                let function = node.child_by_field_name("function")?;
                (self.text(function) == "super").then(|| "super".to_string())
            }
            _ => None,
        }
    }

    fn reference(
        &self,
        from: EntityId,
        name: String,
        kind: RelationKind,
        arity: Option<usize>,
        node: Node<'_>,
    ) -> Result<()> {
        let mut token = ReferenceToken::new(from, name, kind).at_line(line_of(node));
        token.arity = arity;
        self.sink.reference(token)
    }
}

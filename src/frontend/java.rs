//! Java front-end
//!
//! Declares packages, imports, classes, interfaces, enums, records, methods,
//! constructors, fields and locals, and records calls, instantiations,
//! field accesses and bare identifier reads as reference tokens.

use super::{
    EntitySink, FrontEnd, FunctionDecl, ParameterDecl, SourceUnit, binds_name, child_of_kind,
    first_error_line, line_of, text_of,
};
use crate::Result;
use crate::entity::{EntityId, FileData, Import, ReferenceToken, TypeData, TypeRef};
use crate::lang::Language;
use crate::relation::RelationKind;
use tree_sitter::{Node, Parser};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Parents whose identifiers never read a variable
const JAVA_BINDING_PARENTS: &[&str] = &[
    "field_access",
    "inferred_parameters",
    "labeled_statement",
    "break_statement",
    "continue_statement",
    "element_value_pair",
    "method_reference",
];

/// Java front-end
#[derive(Debug, Default)]
pub struct JavaFrontEnd;

impl JavaFrontEnd {
    pub fn new() -> Self {
        Self
    }
}

impl FrontEnd for JavaFrontEnd {
    fn language(&self) -> Language {
        Language::Java
    }

    fn file_extensions(&self) -> &[&str] {
        &["java"]
    }

    fn parse_file(&self, unit: &SourceUnit, content: &str, sink: &EntitySink<'_>) -> Result<EntityId> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| unit.parse_failure(format!("Failed to set language: {}", e)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| unit.parse_failure("parser produced no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(unit.parse_failure(format!("syntax error at line {}", first_error_line(root))));
        }

        let walker = JavaWalker { source: content, sink };
        let file = walker.file(unit, root);
        walker.declarations(root, file)?;
        sink.complete_file(file);
        Ok(file)
    }
}

struct JavaWalker<'s, 'a> {
    source: &'s str,
    sink: &'s EntitySink<'a>,
}

impl<'s, 'a> JavaWalker<'s, 'a> {
    fn text(&self, node: Node<'_>) -> &'s str {
        text_of(node, self.source)
    }

    fn file(&self, unit: &SourceUnit, root: Node<'_>) -> EntityId {
        let mut data = FileData::default();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_declaration" => {
                    data.package = self.dotted_name(child).map(str::to_string);
                }
                "import_declaration" => {
                    if let Some(path) = self.dotted_name(child) {
                        let import = if child_of_kind(child, "asterisk").is_some() {
                            Import::wildcard(path)
                        } else {
                            Import::new(path)
                        };
                        data.imports.push(import);
                    }
                }
                _ => {}
            }
        }
        self.sink.file(&unit.display_path(), data)
    }

    fn dotted_name(&self, node: Node<'_>) -> Option<&'s str> {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"));
        found.map(|n| self.text(n))
    }

    fn declarations(&self, node: Node<'_>, parent: EntityId) -> Result<()> {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if TYPE_DECLARATIONS.contains(&child.kind()) {
                self.type_declaration(child, parent)?;
            }
        }
        Ok(())
    }

    fn type_declaration(&self, node: Node<'_>, parent: EntityId) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return Ok(());
        };
        let is_interface = matches!(node.kind(), "interface_declaration" | "annotation_type_declaration");
        let mut data = TypeData {
            is_interface,
            is_abstract: has_modifier(node, self.source, "abstract"),
            ..Default::default()
        };
        if let Some(superclass) = node.child_by_field_name("superclass") {
            data.extends.extend(self.listed_types(superclass).into_iter().map(TypeRef::new));
        }
        if let Some(extends) = child_of_kind(node, "extends_interfaces") {
            data.extends.extend(self.listed_types(extends).into_iter().map(TypeRef::new));
        }
        if let Some(interfaces) = node.child_by_field_name("interfaces") {
            data.implements.extend(self.listed_types(interfaces).into_iter().map(TypeRef::new));
        }

        let id = self.sink.declare_type(parent, name, data, line_of(node))?;

        if node.kind() == "record_declaration" {
            if let Some(components) = node.child_by_field_name("parameters") {
                for param in self.parameters(components) {
                    self.sink
                        .declare_variable(id, &param.name, param.type_name.as_deref(), line_of(components))?;
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.type_body(body, id, is_interface)?;
        }
        Ok(())
    }

    fn listed_types(&self, node: Node<'_>) -> Vec<&'s str> {
        let list = child_of_kind(node, "type_list").unwrap_or(node);
        let mut cursor = list.walk();
        let types: Vec<&'s str> = list.named_children(&mut cursor).map(|t| self.text(t)).collect();
        types
    }

    fn type_body(&self, body: Node<'_>, owner: EntityId, in_interface: bool) -> Result<()> {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match child.kind() {
                "method_declaration" => self.method(child, owner, in_interface)?,
                "constructor_declaration" | "compact_constructor_declaration" => {
                    self.constructor(child, owner)?
                }
                "field_declaration" | "constant_declaration" => self.fields(child, owner)?,
                "enum_constant" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        let constant = self.sink.declare_variable(owner, self.text(name), None, line_of(child))?;
                        if let Some(arguments) = child.child_by_field_name("arguments") {
                            self.visit_children(arguments, constant)?;
                        }
                    }
                }
                "enum_body_declarations" => self.type_body(child, owner, in_interface)?,
                "static_initializer" | "block" => self.visit_children(child, owner)?,
                kind if TYPE_DECLARATIONS.contains(&kind) => self.type_declaration(child, owner)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn method(&self, node: Node<'_>, owner: EntityId, in_interface: bool) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return Ok(());
        };
        let body = node.child_by_field_name("body");

        let mut decl = FunctionDecl::new(name, line_of(node));
        decl.parameters = node
            .child_by_field_name("parameters")
            .map(|p| self.parameters(p))
            .unwrap_or_default();
        decl.return_type = node
            .child_by_field_name("type")
            .map(|t| self.text(t))
            .filter(|t| *t != "void")
            .map(str::to_string);
        decl.throws = child_of_kind(node, "throws")
            .map(|t| self.listed_types(t).into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        decl.is_abstract = has_modifier(node, self.source, "abstract")
            || (in_interface && body.is_none() && !has_modifier(node, self.source, "static"));

        let id = self.sink.declare_function(owner, decl)?;
        if let Some(body) = body {
            self.visit_children(body, id)?;
        }
        Ok(())
    }

    fn constructor(&self, node: Node<'_>, owner: EntityId) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return Ok(());
        };
        let mut decl = FunctionDecl::new(name, line_of(node));
        decl.parameters = node
            .child_by_field_name("parameters")
            .map(|p| self.parameters(p))
            .unwrap_or_default();
        decl.throws = child_of_kind(node, "throws")
            .map(|t| self.listed_types(t).into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        let id = self.sink.declare_function(owner, decl)?;
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, id)?;
        }
        Ok(())
    }

    fn parameters(&self, node: Node<'_>) -> Vec<ParameterDecl> {
        let mut params = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "formal_parameter" => {
                    let name = child.child_by_field_name("name").map(|n| self.text(n));
                    let ty = child.child_by_field_name("type").map(|t| self.text(t).to_string());
                    if let Some(name) = name {
                        params.push(ParameterDecl::new(name, ty));
                    }
                }
                "spread_parameter" => {
                    let name = child_of_kind(child, "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"))
                        .map(|n| self.text(n));
                    let mut inner = child.walk();
                    let ty = child
                        .named_children(&mut inner)
                        .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"))
                        .map(|t| self.text(t).to_string());
                    if let Some(name) = name {
                        params.push(ParameterDecl::new(name, ty));
                    }
                }
                _ => {}
            }
        }
        params
    }

    fn fields(&self, node: Node<'_>, owner: EntityId) -> Result<()> {
        let ty = node.child_by_field_name("type").map(|t| self.text(t));
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let field = self
                .sink
                .declare_variable(owner, self.text(name), ty, line_of(declarator))?;
            if let Some(value) = declarator.child_by_field_name("value") {
                self.visit(value, field)?;
            }
        }
        Ok(())
    }

    fn local_variables(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let declared = node.child_by_field_name("type").map(|t| self.text(t));
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let value = declarator.child_by_field_name("value");
            // `var x = new T()` takes its type from the instantiation
            let ty = match (declared, value) {
                (Some("var"), Some(v)) if v.kind() == "object_creation_expression" => {
                    v.child_by_field_name("type").map(|t| self.base_type_name(t))
                }
                _ => declared,
            };
            self.sink
                .declare_variable(scope, self.text(name), ty, line_of(declarator))?;
            if let Some(value) = value {
                self.visit(value, scope)?;
            }
        }
        Ok(())
    }

    fn visit(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        match node.kind() {
            "method_invocation" => self.invocation(node, scope),
            "object_creation_expression" => self.creation(node, scope),
            "field_access" => match self.path_of(node) {
                Some(path) => self.reference(scope, path, RelationKind::Use, None, node),
                None => self.visit_children(node, scope),
            },
            "identifier" if !binds_name(node, JAVA_BINDING_PARENTS) => {
                self.reference(scope, self.text(node).to_string(), RelationKind::Use, None, node)
            }
            "local_variable_declaration" => self.local_variables(node, scope),
            kind if TYPE_DECLARATIONS.contains(&kind) => self.type_declaration(node, scope),
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

    fn invocation(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return self.visit_children(node, scope);
        };
        let arguments = node.child_by_field_name("arguments");
        let arity = arguments.map(|a| a.named_child_count()).unwrap_or(0);

        let target = match node.child_by_field_name("object") {
            Some(object) => match self.path_of(object) {
                Some(path) => format!("{}.{}", path, name),
                None => {
                    self.visit(object, scope)?;
                    format!(".{}", name)
                }
            },
            None => name.to_string(),
        };
        self.reference(scope, target, RelationKind::Call, Some(arity), node)?;

        if let Some(arguments) = arguments {
            self.visit_children(arguments, scope)?;
        }
        Ok(())
    }

    fn creation(&self, node: Node<'_>, scope: EntityId) -> Result<()> {
        let arguments = node.child_by_field_name("arguments");
        if let Some(ty) = node.child_by_field_name("type") {
            let arity = arguments.map(|a| a.named_child_count()).unwrap_or(0);
            let name = self.base_type_name(ty).to_string();
            self.reference(scope, name, RelationKind::Create, Some(arity), node)?;
        }
        if let Some(arguments) = arguments {
            self.visit_children(arguments, scope)?;
        }
        // anonymous class bodies count towards the enclosing scope
        if let Some(body) = child_of_kind(node, "class_body") {
            self.visit_children(body, scope)?;
        }
        Ok(())
    }

    /// `Foo` for `Foo<Bar>` / `Foo<>`
    fn base_type_name(&self, node: Node<'_>) -> &'s str {
        if node.kind() == "generic_type" {
            if let Some(base) = node.named_child(0) {
                return self.text(base);
            }
        }
        self.text(node)
    }

    /// Dotted path of a nameable receiver (`a`, `this.repo`, `super`)
    fn path_of(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" | "this" | "super" | "scoped_identifier" => Some(self.text(node).to_string()),
            "field_access" => {
                let object = self.path_of(node.child_by_field_name("object")?)?;
                let field = self.text(node.child_by_field_name("field")?);
                Some(format!("{}.{}", object, field))
            }
            "parenthesized_expression" => self.path_of(node.named_child(0)?),
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

fn has_modifier(node: Node<'_>, source: &str, modifier: &str) -> bool {
    child_of_kind(node, "modifiers")
        .map(|m| text_of(m, source).split_whitespace().any(|w| w == modifier))
        .unwrap_or(false)
}

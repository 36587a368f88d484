//! Built-in name tables
//!
//! Names every program of a language can use without declaring or importing
//! them. References to these bind to the store's shared sentinel so they
//! never count as unresolved and never produce edges.

/// Per-language table of primitive and standard-library names.
pub trait BuiltInTypes: Send + Sync {
    /// Whether a bare or dotted name denotes a built-in
    fn is_built_in(&self, name: &str) -> bool;

    /// Whether the name refers to the enclosing type's instance
    fn is_self_keyword(&self, name: &str) -> bool {
        name == "this" || name == "self"
    }

    /// Whether the name refers to the enclosing type's base
    fn is_super_keyword(&self, name: &str) -> bool {
        name == "super"
    }
}

const JAVA_BUILT_INS: &[&str] = &[
    // primitives
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void", "var",
    // java.lang
    "Object", "String", "StringBuilder", "StringBuffer", "CharSequence", "Boolean", "Byte",
    "Character", "Short", "Integer", "Long", "Float", "Double", "Number", "Void", "Math",
    "System", "Thread", "Runnable", "Class", "Enum", "Record", "Iterable", "Comparable",
    "AutoCloseable", "Cloneable", "Exception", "RuntimeException", "Error", "Throwable",
    "IllegalArgumentException", "IllegalStateException", "NullPointerException",
    "UnsupportedOperationException", "IndexOutOfBoundsException", "InterruptedException",
    "Override", "Deprecated", "SuppressWarnings", "FunctionalInterface",
    // java.util staples
    "List", "ArrayList", "LinkedList", "Map", "HashMap", "TreeMap", "LinkedHashMap", "Set",
    "HashSet", "TreeSet", "Collection", "Collections", "Arrays", "Optional", "Objects",
    "Iterator", "Stream", "Collectors",
];

const JAVA_BUILT_IN_PACKAGES: &[&str] = &["java.", "javax."];

/// Java primitives, `java.lang`, and common collection types.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaBuiltIns;

impl BuiltInTypes for JavaBuiltIns {
    fn is_built_in(&self, name: &str) -> bool {
        if JAVA_BUILT_IN_PACKAGES.iter().any(|p| name.starts_with(p)) {
            return true;
        }
        let head = name.split('.').next().unwrap_or(name);
        JAVA_BUILT_INS.contains(&head)
    }

    fn is_self_keyword(&self, name: &str) -> bool {
        name == "this"
    }
}

const PYTHON_BUILT_INS: &[&str] = &[
    "int", "float", "complex", "str", "bytes", "bytearray", "bool", "list", "tuple", "dict",
    "set", "frozenset", "object", "type", "None", "True", "False", "print", "len", "range",
    "enumerate", "zip", "map", "filter", "sorted", "reversed", "min", "max", "sum", "abs",
    "any", "all", "iter", "next", "open", "input", "repr", "hash", "id", "isinstance",
    "issubclass", "getattr", "setattr", "hasattr", "delattr", "super", "property",
    "staticmethod", "classmethod", "vars", "dir", "format", "round", "divmod", "pow",
    "Exception", "BaseException", "ValueError", "TypeError", "KeyError", "IndexError",
    "AttributeError", "RuntimeError", "NotImplementedError", "StopIteration", "OSError",
    "ABC", "ABCMeta", "abstractmethod",
];

/// Python builtins module plus the `abc` helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonBuiltIns;

impl BuiltInTypes for PythonBuiltIns {
    fn is_built_in(&self, name: &str) -> bool {
        let head = name.split('.').next().unwrap_or(name);
        PYTHON_BUILT_INS.contains(&head)
    }

    fn is_self_keyword(&self, name: &str) -> bool {
        name == "self" || name == "cls"
    }
}

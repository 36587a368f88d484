//! Import lookup strategies
//!
//! Map a dotted reference plus the referencing file's package and imports
//! to the qualified keys it may denote. The resolver tries the keys in the
//! order returned; the first key that resolves wins.

use crate::entity::Import;
use crate::name::qualify;

/// Namespace context of the file a reference was recorded in.
#[derive(Debug, Clone, Copy)]
pub struct FileScope<'a> {
    pub package: Option<&'a str>,
    pub module: Option<&'a str>,
    pub imports: &'a [Import],
}

impl<'a> FileScope<'a> {
    pub fn new(package: Option<&'a str>, module: Option<&'a str>, imports: &'a [Import]) -> Self {
        Self {
            package,
            module,
            imports,
        }
    }
}

/// Per-language import and namespace rules.
pub trait ImportLookupStrategy: Send + Sync {
    /// Candidate qualified keys for `name`, most specific first
    fn candidate_keys(&self, name: &str, scope: &FileScope<'_>) -> Vec<String>;
}

fn split_head(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (name, None),
    }
}

fn join_rest(prefix: &str, rest: Option<&str>) -> String {
    match rest {
        Some(rest) => format!("{}.{}", prefix, rest),
        None => prefix.to_string(),
    }
}

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

/// Java: single-type imports, then the file's own package, then on-demand
/// (`.*`) imports.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaImportLookup;

impl ImportLookupStrategy for JavaImportLookup {
    fn candidate_keys(&self, name: &str, scope: &FileScope<'_>) -> Vec<String> {
        let (head, rest) = split_head(name);
        let mut keys = Vec::new();

        for import in scope.imports.iter().filter(|i| !i.wildcard) {
            if import.bound_name() == Some(head) {
                push_unique(&mut keys, join_rest(&import.path, rest));
            }
        }

        if let Some(package) = scope.package {
            push_unique(&mut keys, qualify(Some(package), name));
        }

        for import in scope.imports.iter().filter(|i| i.wildcard) {
            push_unique(&mut keys, qualify(Some(&import.path), name));
        }

        keys
    }
}

/// Python: aliased and `from` imports bind their alias, plain imports bind
/// the dotted module path, then sibling modules of the file's package, then
/// star imports.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonImportLookup;

impl ImportLookupStrategy for PythonImportLookup {
    fn candidate_keys(&self, name: &str, scope: &FileScope<'_>) -> Vec<String> {
        let (head, rest) = split_head(name);
        let mut keys = Vec::new();

        for import in scope.imports.iter().filter(|i| !i.wildcard) {
            match &import.alias {
                // `import a.b as c` / `from a import b`
                Some(alias) if alias == head => {
                    push_unique(&mut keys, join_rest(&import.path, rest));
                }
                Some(_) => {}
                // `import a.b` binds `a`; references spell the full path
                None => {
                    let bound = import.path.split('.').next().unwrap_or(&import.path);
                    if bound == head {
                        push_unique(&mut keys, name.to_string());
                    }
                }
            }
        }

        if let Some(module) = scope.module {
            push_unique(&mut keys, qualify(Some(module), name));
        }
        if let Some(package) = scope.package {
            push_unique(&mut keys, qualify(Some(package), name));
        }

        for import in scope.imports.iter().filter(|i| i.wildcard) {
            push_unique(&mut keys, qualify(Some(&import.path), name));
        }

        keys
    }
}

//! Binding Resolver - turns raw reference tokens into bindings
//!
//! Resolution runs once, after every file has been parsed. Each token is
//! tried against a fixed chain and the first strategy that yields a
//! candidate wins:
//! 1. Local scope (ancestors, inherited members, `this`/`self`/`super`)
//! 2. Import-qualified lookup (per-language `ImportLookupStrategy`)
//! 3. Built-in table (per-language `BuiltInTypes`)
//! 4. Duck typing (opt-in member search by name and arity)

pub mod binding;
pub mod builtin;
pub mod lookup;

pub use binding::{BindingResolver, ResolverStats};
pub use builtin::{BuiltInTypes, JavaBuiltIns, PythonBuiltIns};
pub use lookup::{FileScope, ImportLookupStrategy, JavaImportLookup, PythonImportLookup};

use serde::{Deserialize, Serialize};

/// Which step of the resolution chain produced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Local,
    Import,
    BuiltIn,
    DuckTyping,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Local => "local",
            ResolutionStrategy::Import => "import",
            ResolutionStrategy::BuiltIn => "built_in",
            ResolutionStrategy::DuckTyping => "duck_typing",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

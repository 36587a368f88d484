//! # Depgraph - Multi-Language Dependency Extraction
//!
//! Builds a unified entity graph from a source tree and computes typed
//! relations between its declarations.
//!
//! Depgraph provides:
//! - An entity graph store shared by all language front-ends
//! - Tree-sitter based front-ends for Java and Python
//! - A binding resolver (local scope, imports, built-ins, duck typing)
//! - A relation counter expanding interface calls to their implementations

pub mod name;
pub mod entity;
pub mod relation;
pub mod store;
pub mod resolver;
pub mod counter;
pub mod frontend;
pub mod lang;
pub mod config;
pub mod discovery;
pub mod analyzer;
pub mod ui;

// Re-exports for convenient access
pub use analyzer::{AnalysisContext, AnalysisReport};
pub use config::AnalysisConfig;
pub use entity::{Entity, EntityData, EntityId, EntityKind, ReferenceToken};
pub use lang::Language;
pub use name::GenericName;
pub use relation::{Relation, RelationKind};
pub use store::EntityStore;

/// Result type alias for Depgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Depgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Failed to parse {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("No source file could be parsed ({failures} failed)")]
    EmptyProject { failures: usize },

    #[error("Store consistency violated: entity {0} is missing")]
    StoreConsistency(EntityId),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message sent from parallel parse workers to the coordinator
#[derive(Debug)]
pub enum ParseEvent {
    Parsed {
        relative_path: String,
        file: EntityId,
    },
    Failed(Error),
}

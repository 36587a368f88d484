//! Language capabilities
//!
//! A `LanguageSupport` bundles everything language specific the pipeline
//! needs: the front-end, the import lookup rules and the built-in table.

use crate::frontend::{FrontEnd, JavaFrontEnd, PythonFrontEnd};
use crate::resolver::{
    BuiltInTypes, ImportLookupStrategy, JavaBuiltIns, JavaImportLookup, PythonBuiltIns,
    PythonImportLookup,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Java,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "python",
        }
    }

    pub fn all() -> &'static [Language] {
        &[Language::Java, Language::Python]
    }

    /// Front-end, import rules and built-ins for this language
    pub fn support(&self) -> LanguageSupport {
        match self {
            Language::Java => LanguageSupport {
                language: *self,
                front_end: Box::new(JavaFrontEnd::new()),
                import_lookup: Box::new(JavaImportLookup),
                built_ins: Box::new(JavaBuiltIns),
            },
            Language::Python => LanguageSupport {
                language: *self,
                front_end: Box::new(PythonFrontEnd::new()),
                import_lookup: Box::new(PythonImportLookup),
                built_ins: Box::new(PythonBuiltIns),
            },
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything language specific the pipeline needs.
pub struct LanguageSupport {
    pub language: Language,
    pub front_end: Box<dyn FrontEnd>,
    pub import_lookup: Box<dyn ImportLookupStrategy>,
    pub built_ins: Box<dyn BuiltInTypes>,
}

impl fmt::Debug for LanguageSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageSupport")
            .field("language", &self.language)
            .field("extensions", &self.front_end.file_extensions())
            .finish()
    }
}

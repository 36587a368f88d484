//! Name model - canonical identity for entities
//!
//! A `GenericName` is a short name plus generic arguments as written in
//! source: `Map<String, List<Foo>>`, `pkg.Outer.Inner`, `T[]`.
//! Its `uniq_name()` is the canonical key used by the store whenever an
//! entity has no qualified name.
//!
//! Examples:
//! - `List< Foo >` → `List<Foo>`
//! - `String[]` → `String`
//! - `Map<K, List<V>>` → `Map<K,List<V>>`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Short name plus generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GenericName {
    name: String,
    arguments: Vec<GenericName>,
}

impl GenericName {
    /// Create a name without generic arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Create a name with generic arguments
    pub fn with_arguments(name: impl Into<String>, arguments: Vec<GenericName>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Parse a name as written in source.
    ///
    /// Array markers (`[]`, `...`) are dropped; whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = strip_array_markers(&compact);
        if compact.is_empty() {
            return Err(Error::InvalidName(text.to_string()));
        }

        let Some(open) = compact.find('<') else {
            if compact.contains('>') || compact.contains(',') {
                return Err(Error::InvalidName(text.to_string()));
            }
            return Ok(Self::new(compact));
        };

        if !compact.ends_with('>') || open == 0 {
            return Err(Error::InvalidName(text.to_string()));
        }

        let inner = &compact[open + 1..compact.len() - 1];
        let mut arguments = Vec::new();
        for part in split_top_level(inner, text)? {
            // `?` wildcards and bare bounds are kept verbatim
            arguments.push(Self::parse(part)?);
        }

        Ok(Self {
            name: compact[..open].to_string(),
            arguments,
        })
    }

    /// The name without generic arguments (`pkg.List` for `pkg.List<T>`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generic arguments in declaration order
    pub fn arguments(&self) -> &[GenericName] {
        &self.arguments
    }

    /// Last dotted segment of the name (`Inner` for `pkg.Outer.Inner`)
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether the name carries a dotted prefix
    pub fn is_qualified(&self) -> bool {
        self.name.contains('.')
    }

    /// Canonical lookup key
    pub fn uniq_name(&self) -> String {
        if self.arguments.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self.arguments.iter().map(|a| a.uniq_name()).collect();
        format!("{}<{}>", self.name, args.join(","))
    }
}

fn strip_array_markers(text: &str) -> &str {
    let mut current = text;
    loop {
        if let Some(rest) = current.strip_suffix("[]") {
            current = rest;
        } else if let Some(rest) = current.strip_suffix("...") {
            current = rest;
        } else {
            return current;
        }
    }
}

/// Split generic arguments on commas that are not nested inside `<...>`.
fn split_top_level<'a>(inner: &'a str, original: &str) -> Result<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::InvalidName(original.to_string()));
                }
            }
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::InvalidName(original.to_string()));
    }
    parts.push(&inner[start..]);
    Ok(parts)
}

impl fmt::Display for GenericName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uniq_name())
    }
}

impl FromStr for GenericName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&str> for GenericName {
    /// Infallible conversion for plain identifiers; falls back to the raw
    /// text when it does not parse as a generic name.
    fn from(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|_| Self::new(value))
    }
}

impl Serialize for GenericName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.uniq_name())
    }
}

impl<'de> Deserialize<'de> for GenericName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        GenericName::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Split a dotted reference path into segments.
///
/// A leading `.` (member access on an unnamed receiver) yields an empty
/// first segment.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Join `prefix` and `name` with a dot, skipping an empty prefix
pub fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}.{}", p, name),
        _ => name.to_string(),
    }
}

/// Role key grouping overloads/implementations of one method signature:
/// `TypeName,method,param1,param2`
pub fn signature_role_key(type_name: &str, function: &str, params: &[&str]) -> String {
    format!("{},{},{}", type_name, function, params.join(","))
}

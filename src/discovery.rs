//! Source file discovery
//!
//! Walks an analysis root and collects the files a front-end can parse,
//! skipping build output, VCS metadata and anything matched by the
//! project's ignore files or the configured excludes.

use crate::frontend::{FrontEnd, SourceUnit};
use crate::{Error, Result};
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

const DEFAULT_EXCLUDES: &[&str] = &[
    // Build and tooling directories
    "target/", "build/", "out/", "dist/", "bin/", "node_modules/", "venv/", ".venv/",
    "__pycache__/", "*.egg-info/", ".tox/", ".gradle/", ".mvn/",
    ".git/", ".hg/", ".svn/", ".idea/", ".vscode/",

    // Compiled artifacts
    "*.class", "*.jar", "*.war", "*.pyc", "*.pyo", "*.pyd",
];

pub struct IgnoreFilter {
    inner: Gitignore,
}

impl IgnoreFilter {
    pub fn new(root: &Path, extra_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        builder.add(root.join(".gitignore"));
        builder.add(root.join(".ignore"));

        for pattern in DEFAULT_EXCLUDES {
            builder.add_line(None, pattern).ok();
        }

        for pattern in extra_excludes {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", pattern, e);
            }
        }

        Self {
            inner: builder.build().unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched(path, is_dir).is_ignore()
    }
}

/// Collect every file under `root` the front-end can handle, sorted by path.
pub fn discover(root: &Path, front_end: &dyn FrontEnd, excludes: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", root.display()),
        )));
    }
    if root.is_file() {
        return Ok(if front_end.can_handle(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let filter = IgnoreFilter::new(root, excludes);
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !filter.is_ignored(entry.path(), is_dir)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|t| t.is_file());
                if is_file && front_end.can_handle(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => tracing::debug!("Skipping unreadable entry: {}", e),
        }
    }

    files.sort();
    tracing::debug!("Discovered {} {} files under {}", files.len(), front_end.language(), root.display());
    Ok(files)
}

/// Discover `root` and turn each file into a `SourceUnit`.
pub fn source_units(
    root: &Path,
    front_end: &dyn FrontEnd,
    excludes: &[String],
    external: bool,
) -> Result<Vec<SourceUnit>> {
    let base = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };

    let units = discover(root, front_end, excludes)?
        .into_iter()
        .map(|path| {
            let relative = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            SourceUnit::new(path.clone(), relative).external(external)
        })
        .collect();
    Ok(units)
}

use crate::lang::Language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for one analysis run, loaded from `depgraph.toml` and overridden
/// by CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub language: Language,
    /// Extra source roots parsed as external dependencies
    pub include_paths: Vec<PathBuf>,
    pub enable_duck_typing: bool,
    pub emit_external_dependencies: bool,
    /// Gitignore-style patterns added to the discovery defaults
    pub excludes: Vec<String>,
    /// Parse workers; defaults to the available parallelism
    pub threads: Option<usize>,
}

impl AnalysisConfig {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        self.threads
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("depgraph.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<AnalysisConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: AnalysisConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &AnalysisConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(Some(&dir.path().join("depgraph.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depgraph.toml");
        let config = AnalysisConfig {
            language: Language::Python,
            include_paths: vec![PathBuf::from("vendor/lib")],
            enable_duck_typing: true,
            emit_external_dependencies: false,
            excludes: vec!["generated/".to_string()],
            threads: Some(2),
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_write_refuses_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depgraph.toml");
        write_config(&path, &AnalysisConfig::default(), false).unwrap();

        let err = write_config(&path, &AnalysisConfig::default(), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        write_config(&path, &AnalysisConfig::new(Language::Python), true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().unwrap().language, Language::Python);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depgraph.toml");
        std::fs::write(&path, "language = \"python\"\nenable_duck_typing = true\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.language, Language::Python);
        assert!(config.enable_duck_typing);
        assert!(config.include_paths.is_empty());
        assert!(config.threads.is_none());
    }

    #[test]
    fn test_worker_count() {
        let mut config = AnalysisConfig::default();
        assert!(config.worker_count() >= 1);
        config.threads = Some(3);
        assert_eq!(config.worker_count(), 3);
        config.threads = Some(0);
        assert!(config.worker_count() >= 1);
    }
}

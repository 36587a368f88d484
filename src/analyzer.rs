//! Analysis pipeline
//!
//! Owns the store for one run and drives the two phases:
//! 1. Parse every discovered file in parallel through the language front-end
//! 2. After all workers joined, resolve bindings and count relations

use crate::config::AnalysisConfig;
use crate::counter::{CounterStats, RelationCounter};
use crate::discovery;
use crate::entity::{EntityId, EntityKind};
use crate::frontend::{EntitySink, FrontEnd, SourceUnit};
use crate::lang::LanguageSupport;
use crate::relation::RelationKind;
use crate::resolver::{BindingResolver, ResolverStats};
use crate::store::{EntityStore, StoreStats};
use crate::ui::{ProgressMessage, ProgressPhase};
use crate::{Error, ParseEvent, Result};
use crossbeam::channel::{self, Sender};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Outcome of one analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub root: PathBuf,
    pub files_parsed: usize,
    pub external_files: usize,
    /// One entry per file that failed to read or parse
    pub warnings: Vec<String>,
    pub resolver: ResolverStats,
    pub counter: CounterStats,
    pub store: StoreStats,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis of {}:", self.root.display())?;
        writeln!(f, "  Files parsed: {} ({} external)", self.files_parsed, self.external_files)?;
        writeln!(f, "  Warnings: {}", self.warnings.len())?;
        write!(f, "{}", self.store)?;
        write!(f, "{}", self.resolver)?;
        write!(f, "{}", self.counter)?;
        writeln!(f, "  Elapsed: {:?}", self.elapsed)
    }
}

/// One outgoing relation of an entity, with its target spelled out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationView {
    pub kind: RelationKind,
    pub target: EntityId,
    pub target_name: String,
    pub target_kind: EntityKind,
}

#[derive(Debug, Default)]
struct ParseOutcome {
    parsed: usize,
    external: usize,
    warnings: Vec<String>,
}

pub struct AnalysisContext {
    config: AnalysisConfig,
    support: LanguageSupport,
    store: EntityStore,
    progress: Option<Sender<ProgressMessage>>,
}

impl AnalysisContext {
    pub fn new(config: AnalysisConfig) -> Self {
        let support = config.language.support();
        Self {
            config,
            support,
            store: EntityStore::new(),
            progress: None,
        }
    }

    /// Report phase progress over `tx`
    pub fn with_progress(mut self, tx: Sender<ProgressMessage>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop reporting progress; the receiver sees the channel close once
    /// every other sender is gone
    pub fn detach_progress(&mut self) {
        self.progress = None;
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Drop every entity of the previous run
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Analyze the tree under `root` plus the configured include paths.
    ///
    /// Files that fail to read or parse are reported as warnings; the run
    /// fails only when no file could be parsed at all.
    pub fn run(&mut self, root: &Path) -> Result<AnalysisReport> {
        let start = Instant::now();
        if self.store.len() > 1 {
            tracing::debug!("Clearing {} entities from the previous run", self.store.len());
            self.clear();
        }

        let root = root.canonicalize()?;
        let units = self.collect_units(&root)?;
        tracing::info!(
            "Analyzing {} {} files under {}",
            units.len(),
            self.config.language,
            root.display()
        );

        let outcome = self.parse_all(units);
        if outcome.parsed == 0 {
            return Err(Error::EmptyProject {
                failures: outcome.warnings.len(),
            });
        }

        self.notify(ProgressMessage::Started {
            phase: ProgressPhase::Resolving,
            total: self.store.files_in_completion_order().len(),
        });
        let resolver = BindingResolver::new(
            &self.store,
            self.support.import_lookup.as_ref(),
            self.support.built_ins.as_ref(),
            self.config.enable_duck_typing,
        )
        .run()?;
        self.notify(ProgressMessage::Finished {
            phase: ProgressPhase::Resolving,
        });

        self.notify(ProgressMessage::Started {
            phase: ProgressPhase::Counting,
            total: self.store.len(),
        });
        let counter = RelationCounter::new(&self.store, self.config.emit_external_dependencies).run()?;
        self.notify(ProgressMessage::Finished {
            phase: ProgressPhase::Counting,
        });

        Ok(AnalysisReport {
            root,
            files_parsed: outcome.parsed,
            external_files: outcome.external,
            warnings: outcome.warnings,
            resolver,
            counter,
            store: self.store.stats(),
            elapsed: start.elapsed(),
        })
    }

    fn collect_units(&self, root: &Path) -> Result<Vec<SourceUnit>> {
        let front_end = self.support.front_end.as_ref();
        let mut units = discovery::source_units(root, front_end, &self.config.excludes, false)?;

        for include in &self.config.include_paths {
            let include = if include.is_absolute() {
                include.clone()
            } else {
                root.join(include)
            };
            match include.canonicalize() {
                Ok(path) => {
                    units.extend(discovery::source_units(&path, front_end, &self.config.excludes, true)?);
                }
                Err(e) => tracing::warn!("Skipping include path {}: {}", include.display(), e),
            }
        }

        // An include path nested in the root is external, not analyzed twice
        let external: Vec<PathBuf> = units.iter().filter(|u| u.external).map(|u| u.path.clone()).collect();
        units.retain(|u| u.external || !external.contains(&u.path));
        let mut seen = std::collections::HashSet::new();
        units.retain(|u| seen.insert(u.path.clone()));
        Ok(units)
    }

    /// Parse pass: one job per file over a pool of scoped workers.
    /// Returns once every worker has joined.
    fn parse_all(&self, units: Vec<SourceUnit>) -> ParseOutcome {
        let total = units.len();
        let workers = self.config.worker_count().min(total).max(1);
        self.notify(ProgressMessage::Started {
            phase: ProgressPhase::Parsing,
            total,
        });
        tracing::debug!("Parsing {} files with {} workers", total, workers);

        let (job_tx, job_rx) = channel::unbounded::<SourceUnit>();
        let (event_tx, event_rx) = channel::unbounded::<(bool, ParseEvent)>();
        for unit in units {
            job_tx.send(unit).ok();
        }
        drop(job_tx);

        let front_end = self.support.front_end.as_ref();
        let store = &self.store;
        let mut outcome = ParseOutcome::default();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let events = event_tx.clone();
                scope.spawn(move || {
                    for unit in jobs.iter() {
                        let event = parse_unit(front_end, store, &unit);
                        if events.send((unit.external, event)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(event_tx);

            for (current, (external, event)) in event_rx.iter().enumerate() {
                match event {
                    ParseEvent::Parsed { relative_path, file } => {
                        tracing::debug!("Parsed {} as entity {}", relative_path, file);
                        outcome.parsed += 1;
                        if external {
                            outcome.external += 1;
                        }
                        self.notify(ProgressMessage::Progress {
                            phase: ProgressPhase::Parsing,
                            current: current + 1,
                            file: Some(relative_path),
                        });
                    }
                    ParseEvent::Failed(e) => {
                        tracing::warn!("{}", e);
                        self.notify(ProgressMessage::Warning(e.to_string()));
                        self.notify(ProgressMessage::Progress {
                            phase: ProgressPhase::Parsing,
                            current: current + 1,
                            file: None,
                        });
                        outcome.warnings.push(e.to_string());
                    }
                }
            }
        });

        outcome.warnings.sort();
        self.notify(ProgressMessage::Finished {
            phase: ProgressPhase::Parsing,
        });
        tracing::info!("Parsed {} of {} files", outcome.parsed, total);
        outcome
    }

    fn notify(&self, message: ProgressMessage) {
        if let Some(tx) = &self.progress {
            tx.send(message).ok();
        }
    }

    /// Look an entity up by qualified name, falling back to a unique short
    /// name match
    pub fn find(&self, name: &str) -> Result<EntityId> {
        if let Some(id) = self.store.id_by_name(name) {
            return Ok(id);
        }

        let matches: Vec<EntityId> = self
            .store
            .iter_all()
            .filter(|e| e.short_name() == name)
            .map(|e| e.id)
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(Error::EntityNotFound(name.to_string())),
            _ => Err(Error::EntityNotFound(format!(
                "{} is ambiguous ({} matches, use the qualified name)",
                name,
                matches.len()
            ))),
        }
    }

    /// Outgoing relations of `id`, in emission order
    pub fn relations_of(&self, id: EntityId) -> Result<Vec<RelationView>> {
        let relations = self
            .store
            .get_by_id(id)
            .map(|e| e.relations.clone())
            .ok_or(Error::StoreConsistency(id))?;

        relations
            .into_iter()
            .map(|relation| {
                let target = self
                    .store
                    .get_by_id(relation.target)
                    .ok_or(Error::StoreConsistency(relation.target))?;
                Ok(RelationView {
                    kind: relation.kind,
                    target: relation.target,
                    target_name: target.name_key(),
                    target_kind: target.kind(),
                })
            })
            .collect()
    }
}

fn parse_unit(front_end: &dyn FrontEnd, store: &EntityStore, unit: &SourceUnit) -> ParseEvent {
    let content = match std::fs::read_to_string(&unit.path) {
        Ok(content) => content,
        Err(e) => return ParseEvent::Failed(unit.parse_failure(format!("unreadable: {}", e))),
    };

    let sink = EntitySink::new(store, unit.external);
    match front_end.parse_file(unit, &content, &sink) {
        Ok(file) => ParseEvent::Parsed {
            relative_path: unit.relative_path.clone(),
            file,
        },
        Err(e) => ParseEvent::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn targets(ctx: &AnalysisContext, from: &str, kind: RelationKind) -> Vec<String> {
        let id = ctx.find(from).unwrap();
        ctx.relations_of(id)
            .unwrap()
            .into_iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.target_name)
            .collect()
    }

    /// Every relation as `(from, kind, to)` by name, independent of ids
    fn snapshot(ctx: &AnalysisContext) -> BTreeSet<(String, RelationKind, String)> {
        let mut edges = BTreeSet::new();
        for id in ctx.store().ids() {
            let from = ctx.store().get_by_id(id).unwrap().name_key();
            for view in ctx.relations_of(id).unwrap() {
                edges.insert((from.clone(), view.kind, view.target_name));
            }
        }
        edges
    }

    const SHAPE: &str = r#"
package shapes;

public interface Shape {
    double area();
}
"#;

    const CIRCLE: &str = r#"
package shapes;

public class Circle implements Shape {
    private double radius;

    public Circle(double radius) { this.radius = radius; }

    public double area() { return 3.14 * radius * radius; }
}
"#;

    const MAIN: &str = r#"
package app;

import shapes.Shape;
import shapes.Circle;

public class Main {
    public double total(Shape s) {
        return s.area();
    }

    public Shape make() {
        return new Circle(2.0);
    }
}
"#;

    fn java_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/shapes/Shape.java", SHAPE);
        write(dir.path(), "src/shapes/Circle.java", CIRCLE);
        write(dir.path(), "src/app/Main.java", MAIN);
        dir
    }

    #[test]
    fn test_interface_call_reaches_implementation() {
        let dir = java_project();
        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        let report = ctx.run(dir.path()).unwrap();

        assert_eq!(report.files_parsed, 3);
        assert!(report.warnings.is_empty());
        assert_eq!(targets(&ctx, "app.Main.total", RelationKind::Call), vec!["shapes.Circle.area"]);
        assert_eq!(targets(&ctx, "app.Main.total", RelationKind::Parameter), vec!["shapes.Shape"]);
        assert_eq!(targets(&ctx, "app.Main.make", RelationKind::Create), vec!["shapes.Circle"]);
        assert_eq!(targets(&ctx, "shapes.Circle", RelationKind::Implement), vec!["shapes.Shape"]);
    }

    #[test]
    fn test_sibling_method_call() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "A.java",
            "class A {\n    void f() { g(); }\n    void g() { }\n}\n",
        );

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        ctx.run(dir.path()).unwrap();

        assert_eq!(targets(&ctx, "A.f", RelationKind::Call), vec!["A.g"]);
        assert!(targets(&ctx, "A.g", RelationKind::Call).is_empty());
    }

    #[test]
    fn test_bare_field_read_is_a_use() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "C.java",
            "class C {\n    int radius;\n    int area() { return radius * radius; }\n    int twice() { return this.radius; }\n}\n",
        );

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        ctx.run(dir.path()).unwrap();

        assert_eq!(targets(&ctx, "C.area", RelationKind::Use), vec!["C.radius"]);
        assert_eq!(targets(&ctx, "C.twice", RelationKind::Use), vec!["C.radius"]);
    }

    #[test]
    fn test_python_instances_are_created_returned_and_thrown() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "throw_return.py",
            "class Bar(Exception):\n    pass\n\n\ndef t1():\n    raise Bar()\n\n\ndef t2():\n    return Bar()\n",
        );

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Python));
        ctx.run(dir.path()).unwrap();

        assert_eq!(targets(&ctx, "throw_return.t1", RelationKind::Throw), vec!["throw_return.Bar"]);
        assert_eq!(targets(&ctx, "throw_return.t1", RelationKind::Create), vec!["throw_return.Bar"]);
        assert_eq!(targets(&ctx, "throw_return.t2", RelationKind::Return), vec!["throw_return.Bar"]);
        assert_eq!(targets(&ctx, "throw_return.t2", RelationKind::Create), vec!["throw_return.Bar"]);
        assert!(targets(&ctx, "throw_return.t2", RelationKind::Call).is_empty());
    }

    #[test]
    fn test_rerun_after_clear_is_isomorphic() {
        let dir = java_project();
        let mut config = AnalysisConfig::new(Language::Java);
        config.threads = Some(2);
        let mut ctx = AnalysisContext::new(config);

        let first = ctx.run(dir.path()).unwrap();
        let before = snapshot(&ctx);
        ctx.clear();
        assert_eq!(ctx.store().len(), 1);

        let second = ctx.run(dir.path()).unwrap();
        assert_eq!(snapshot(&ctx), before);
        assert_eq!(first.store, second.store);
        assert_eq!(first.resolver, second.resolver);
    }

    #[test]
    fn test_python_project() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "shapes.py",
            r#"
from abc import ABC, abstractmethod


class Shape(ABC):
    @abstractmethod
    def area(self):
        ...


class Circle(Shape):
    def __init__(self, radius):
        self.radius = radius

    def area(self):
        return 3.14 * self.radius * self.radius
"#,
        );
        write(
            dir.path(),
            "main.py",
            r#"
from shapes import Circle


def build():
    c = Circle(2)
    return c.area()
"#,
        );

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Python));
        let report = ctx.run(dir.path()).unwrap();

        assert_eq!(report.files_parsed, 2);
        assert!(targets(&ctx, "main.build", RelationKind::Call).contains(&"shapes.Circle.area".to_string()));
        assert_eq!(targets(&ctx, "shapes.Circle", RelationKind::Extend), vec!["shapes.Shape"]);
    }

    #[test]
    fn test_duck_typing_is_opt_in() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app.py",
            r#"
class Duck:
    def quack(self):
        pass


def speak(thing):
    thing.quack()
"#,
        );

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Python));
        let report = ctx.run(dir.path()).unwrap();
        assert!(targets(&ctx, "app.speak", RelationKind::Call).is_empty());
        assert_eq!(report.resolver.duck_typed, 0);

        let mut config = AnalysisConfig::new(Language::Python);
        config.enable_duck_typing = true;
        let mut ctx = AnalysisContext::new(config);
        let report = ctx.run(dir.path()).unwrap();
        assert_eq!(targets(&ctx, "app.speak", RelationKind::Call), vec!["app.Duck.quack"]);
        assert!(report.resolver.duck_typed >= 1);
    }

    #[test]
    fn test_failed_file_is_a_warning() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Good.java", "class Good { void f() { } }\n");
        write(dir.path(), "Bad.java", "class Bad { void f( { }\n");

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        let report = ctx.run(dir.path()).unwrap();
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Bad.java"));
        assert!(ctx.store().get_by_name("Bad").is_none());
    }

    #[test]
    fn test_no_parsable_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Bad.java", "class Bad {\n");

        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        let err = ctx.run(dir.path()).unwrap_err();
        assert!(matches!(err, Error::EmptyProject { failures: 1 }));

        let empty = TempDir::new().unwrap();
        let err = ctx.run(empty.path()).unwrap_err();
        assert!(matches!(err, Error::EmptyProject { failures: 0 }));
    }

    #[test]
    fn test_include_paths_are_external() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app/App.java",
            "package app;\nimport lib.Util;\nclass App { void run() { Util.help(); } }\n",
        );
        let lib = TempDir::new().unwrap();
        write(lib.path(), "lib/Util.java", "package lib;\npublic class Util { public static void help() { } }\n");

        let mut config = AnalysisConfig::new(Language::Java);
        config.include_paths = vec![lib.path().to_path_buf()];
        let mut ctx = AnalysisContext::new(config.clone());
        let report = ctx.run(dir.path()).unwrap();
        assert_eq!(report.external_files, 1);
        assert!(ctx.store().get_by_name("lib.Util").unwrap().external);
        assert!(targets(&ctx, "app.App.run", RelationKind::Call).is_empty());
        assert!(report.counter.skipped_external >= 1);

        config.emit_external_dependencies = true;
        let mut ctx = AnalysisContext::new(config);
        ctx.run(dir.path()).unwrap();
        assert_eq!(targets(&ctx, "app.App.run", RelationKind::Call), vec!["lib.Util.help"]);
    }

    #[test]
    fn test_progress_messages() {
        let dir = java_project();
        let (tx, rx) = channel::unbounded();
        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java)).with_progress(tx);
        ctx.run(dir.path()).unwrap();
        drop(ctx);

        let messages: Vec<ProgressMessage> = rx.iter().collect();
        let parsed = messages
            .iter()
            .filter(|m| matches!(m, ProgressMessage::Progress { phase: ProgressPhase::Parsing, .. }))
            .count();
        assert_eq!(parsed, 3);
        assert!(matches!(
            messages.last(),
            Some(ProgressMessage::Finished {
                phase: ProgressPhase::Counting
            })
        ));
    }

    #[test]
    fn test_find_by_short_name() {
        let dir = java_project();
        let mut ctx = AnalysisContext::new(AnalysisConfig::new(Language::Java));
        ctx.run(dir.path()).unwrap();

        let id = ctx.find("Main").unwrap();
        assert_eq!(ctx.store().get_by_id(id).unwrap().name_key(), "app.Main");
        assert!(matches!(ctx.find("area"), Err(Error::EntityNotFound(_))));
        assert!(matches!(ctx.find("Nothing"), Err(Error::EntityNotFound(_))));
    }
}

//! Depgraph CLI - Dependency extraction for Java and Python source trees

use clap::{Args, Parser, Subcommand};
use depgraph::config::{self, AnalysisConfig};
use depgraph::ui::{self, Icons, ProgressManager};
use depgraph::{AnalysisContext, AnalysisReport, Language};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "depgraph")]
#[command(version)]
#[command(about = "Multi-language entity graph and dependency relation extractor")]
#[command(long_about = r#"
Depgraph parses a source tree, builds a graph of its files, types, functions
and variables, and computes typed relations between them: calls, inheritance,
implementation, parameter/return/throw usage, instantiation and containment.

Example usage:
  depgraph init --language python
  depgraph analyze ./src
  depgraph relations ./src --name shapes.Circle.area
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct AnalysisArgs {
    /// Root of the source tree to analyze
    path: PathBuf,

    /// Path to the config file (defaults to depgraph.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source language (java, python)
    #[arg(short, long)]
    language: Option<Language>,

    /// Extra source roots parsed as external dependencies
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Additional gitignore-style exclude patterns
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Resolve unknown receivers by member name and arity
    #[arg(long)]
    duck_typing: bool,

    /// Keep edges into include-path entities
    #[arg(long)]
    emit_external: bool,

    /// Number of parse workers
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a source tree and print a summary
    Analyze {
        #[command(flatten)]
        args: AnalysisArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the outgoing relations of one entity
    Relations {
        #[command(flatten)]
        args: AnalysisArgs,

        /// Qualified name (or unique short name) of the entity
        #[arg(short, long)]
        name: String,

        /// Print the relations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Init {
        /// Path of the config file to write
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source language recorded in the config
        #[arg(short, long, default_value = "java")]
        language: Language,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Analyze { args, json } => {
            let config = resolve_config(&args)?;
            let (_, report) = if json {
                analyze_quiet(config, &args.path)?
            } else {
                analyze_with_progress(config, &args.path)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Relations { args, name, json } => {
            let config = resolve_config(&args)?;
            let (ctx, report) = analyze_quiet(config, &args.path)?;
            for warning in &report.warnings {
                ui::warn(warning);
            }

            let id = ctx.find(&name)?;
            let relations = ctx.relations_of(id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&relations)?);
            } else {
                let (display, kind) = ctx
                    .store()
                    .get_by_id(id)
                    .map(|e| (e.name_key(), e.kind()))
                    .ok_or_else(|| anyhow::anyhow!("entity {} vanished", id))?;
                ui::section(&format!(" {} ({}) ", display, kind));
                if relations.is_empty() {
                    println!("  {}", ui::dim("no outgoing relations"));
                }
                for relation in &relations {
                    ui::relation(relation);
                }
            }
        }

        Commands::Init { config, language, force } => {
            let path = config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &AnalysisConfig::new(language), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

/// Config file (if any) overridden by command-line flags
fn resolve_config(args: &AnalysisArgs) -> anyhow::Result<AnalysisConfig> {
    let explicit = args.config.as_deref();
    let mut config = match config::load_config(explicit)? {
        Some(config) => config,
        None => match explicit {
            Some(path) => anyhow::bail!("config file not found: {}", path.display()),
            None => AnalysisConfig::default(),
        },
    };

    if let Some(language) = args.language {
        config.language = language;
    }
    config.include_paths.extend(args.include.iter().cloned());
    config.excludes.extend(args.exclude.iter().cloned());
    config.enable_duck_typing |= args.duck_typing;
    config.emit_external_dependencies |= args.emit_external;
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    tracing::debug!("Effective config: {:?}", config);
    Ok(config)
}

fn analyze_quiet(config: AnalysisConfig, path: &Path) -> anyhow::Result<(AnalysisContext, AnalysisReport)> {
    let mut ctx = AnalysisContext::new(config);
    let report = ctx.run(path)?;
    Ok((ctx, report))
}

fn analyze_with_progress(config: AnalysisConfig, path: &Path) -> anyhow::Result<(AnalysisContext, AnalysisReport)> {
    ui::header(&format!("Analyzing {} ({})", path.display(), config.language));

    let (mut progress, tx) = ProgressManager::new();
    let mut ctx = AnalysisContext::new(config).with_progress(tx);
    let result = ctx.run(path);
    ctx.detach_progress();

    match result {
        Ok(report) => {
            progress.finish_with_summary(&report);
            Ok((ctx, report))
        }
        Err(e) => {
            progress.join();
            progress.clear();
            ui::error(&e.to_string());
            Err(e.into())
        }
    }
}

fn print_report(report: &AnalysisReport) {
    ui::section(&format!(" {} Summary ", Icons::STATS));
    println!("{}", ui::report_table(report));

    if !report.warnings.is_empty() {
        ui::section(&format!(" {} warning(s) ", report.warnings.len()));
        for warning in &report.warnings {
            ui::warn(warning);
        }
    }

    ui::status(Icons::FILE, "Root", &report.root.display().to_string());
    ui::timing(&format!("{:.2?}", report.elapsed));
}

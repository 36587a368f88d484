use crate::analyzer::AnalysisReport;
use crate::ui::progress_message::{ProgressMessage, ProgressPhase};
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, MultiProgress, ProgressBar};
use owo_colors::OwoColorize;
use std::thread;
use std::time::Duration;

pub struct ProgressManager {
    mp: MultiProgress,
    handle: Option<thread::JoinHandle<Vec<String>>>,
}

fn visible(bar: ProgressBar) -> ProgressBar {
    if console::Term::stdout().is_term() {
        bar
    } else {
        ProgressBar::hidden()
    }
}

impl ProgressManager {
    /// Spawn the renderer; the returned sender feeds it until every clone
    /// is dropped.
    pub fn new() -> (Self, crossbeam::channel::Sender<ProgressMessage>) {
        let (tx, rx) = crossbeam::channel::unbounded::<ProgressMessage>();

        let mp = MultiProgress::new();
        let parsing = visible(mp.add(ProgressBar::new(0).with_message(ProgressPhase::Parsing.to_string())));
        let resolving = visible(mp.add(ProgressBar::new_spinner().with_message(ProgressPhase::Resolving.to_string())));
        let counting = visible(mp.add(ProgressBar::new_spinner().with_message(ProgressPhase::Counting.to_string())));

        let handle = thread::spawn(move || {
            let bars = [parsing, resolving, counting];
            let bar = |phase: ProgressPhase| bars[phase as usize].clone();
            let mut warnings = Vec::new();

            for msg in rx {
                match msg {
                    ProgressMessage::Started {
                        phase: ProgressPhase::Parsing,
                        total,
                    } => {
                        bar(ProgressPhase::Parsing).set_length(total as u64);
                    }
                    ProgressMessage::Started { phase, total: _ } => {
                        bar(phase).enable_steady_tick(Duration::from_millis(100));
                    }
                    ProgressMessage::Progress { phase, current, file } => {
                        let pb = bar(phase);
                        pb.set_position(current as u64);
                        if let Some(ref f) = file {
                            pb.set_message(format!("Parsing: {}", f));
                        }
                    }
                    ProgressMessage::Finished { phase } => {
                        bar(phase).finish_with_message(format!("{}: done", phase));
                    }
                    ProgressMessage::Warning(w) => warnings.push(w),
                }
            }
            warnings
        });

        (
            Self {
                mp,
                handle: Some(handle),
            },
            tx,
        )
    }

    pub fn clear(&self) {
        self.mp.clear().ok();
    }

    /// Wait for the renderer to drain; returns the warnings it saw
    pub fn join(&mut self) -> Vec<String> {
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }

    pub fn finish_with_summary(&mut self, report: &AnalysisReport) {
        self.join();
        self.clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Complete in {}", HumanDuration(report.elapsed)).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().info.clone()),
            report.files_parsed,
            Icons::PACKAGE.style(theme().info.clone()),
            report.store.entities(),
            Icons::LINK.style(theme().info.clone()),
            report.counter.edges
        );
    }
}

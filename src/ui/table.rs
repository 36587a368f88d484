use crate::analyzer::AnalysisReport;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: impl ToString) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

/// Summary of a run as a two-column table
pub fn report_table(report: &AnalysisReport) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Files parsed", report.files_parsed);
    builder.add_row("External files", report.external_files);
    builder.add_row("Warnings", report.warnings.len());
    builder.add_row("Types", report.store.types);
    builder.add_row("Functions", report.store.functions);
    builder.add_row("Variables", report.store.variables);
    builder.add_row("Multi-declared", report.store.multi_declares);
    builder.add_row(
        "References resolved",
        format!("{} / {}", report.resolver.resolved(), report.resolver.total),
    );
    builder.add_row("  local", report.resolver.local);
    builder.add_row("  import", report.resolver.import);
    builder.add_row("  built-in", report.resolver.built_in);
    builder.add_row("  duck typed", report.resolver.duck_typed);
    builder.add_row("Relations", report.counter.edges);
    builder.add_row("  calls", report.store.calls);
    builder.add_row("Expanded to implementors", report.counter.expanded);
    builder.add_row("Skipped external", report.counter.skipped_external);
    builder.build()
}

//! Markdown and JSON report generation.
//!
//! Renders analysis results and dashboard snapshots for humans (Markdown)
//! and for tools (pretty JSON of the same structs).

use crate::analysis::aggregator::{AggregateSummary, EntityBreakdown};
use crate::analysis::charts::{ChartKind, ChartSet};
use crate::analysis::context::{ContextBundle, ContextValue};
use crate::models::Domain;
use crate::service::{
    Analysis, AnalysisOutcome, ChartedOutcome, DashboardSnapshot, DomainDashboard,
};
use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;

/// How an analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    NoData,
    Failed,
}

/// Metadata about an analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub question: String,
    pub user_id: String,
    pub generated_at: NaiveDateTime,
    pub model_used: String,
    pub duration_seconds: f64,
}

/// Everything shown for one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub status: ReportStatus,
    /// Narrative on success, guidance message otherwise.
    pub text: String,
    pub domains: Vec<Domain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextBundle>,
    #[serde(skip_serializing_if = "ChartSet::is_empty")]
    pub charts: ChartSet,
}

impl AnalysisReport {
    /// Report for a plain analysis. The bundle the prompt was built from is
    /// shown as supporting data.
    pub fn from_analysis(metadata: ReportMetadata, analysis: Analysis) -> Self {
        let (status, text) = match analysis.outcome {
            AnalysisOutcome::Narrative(t) => (ReportStatus::Complete, t),
            AnalysisOutcome::NoData(t) => (ReportStatus::NoData, t),
            AnalysisOutcome::Failed(t) => (ReportStatus::Failed, t),
        };
        let context = Some(analysis.context).filter(|c| !c.is_empty());

        Self {
            metadata,
            status,
            text,
            domains: context.as_ref().map(ContextBundle::domains).unwrap_or_default(),
            context,
            charts: ChartSet::new(),
        }
    }

    /// Report for an analysis with charts.
    pub fn from_charted(metadata: ReportMetadata, outcome: ChartedOutcome) -> Self {
        match outcome {
            ChartedOutcome::Complete(result) => Self {
                metadata,
                status: ReportStatus::Complete,
                text: result.narrative,
                domains: result.context.domains(),
                context: Some(result.context),
                charts: result.charts,
            },
            ChartedOutcome::NoData(t) => Self::bare(metadata, ReportStatus::NoData, t),
            ChartedOutcome::Failed(t) => Self::bare(metadata, ReportStatus::Failed, t),
        }
    }

    fn bare(metadata: ReportMetadata, status: ReportStatus, text: String) -> Self {
        Self {
            metadata,
            status,
            text,
            domains: Vec::new(),
            context: None,
            charts: ChartSet::new(),
        }
    }
}

/// Generate a complete Markdown analysis report.
pub fn generate_markdown_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str("# Operations Analysis Report\n\n");
    output.push_str(&generate_metadata_section(report));

    output.push_str("## Analysis\n\n");
    output.push_str(report.text.trim());
    output.push_str("\n\n");

    if let Some(context) = &report.context {
        output.push_str(&generate_context_section(context));
    }

    if !report.charts.is_empty() {
        output.push_str(&generate_charts_section(&report.charts));
    }

    output.push_str(&generate_footer());
    output
}

fn generate_metadata_section(report: &AnalysisReport) -> String {
    let metadata = &report.metadata;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Question:** {}\n", metadata.question));
    section.push_str(&format!("- **User:** {}\n", metadata.user_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Status:** {}\n", status_label(report.status)));
    if !report.domains.is_empty() {
        let domains: Vec<&str> = report.domains.iter().map(|d| d.as_str()).collect();
        section.push_str(&format!("- **Dimensions:** {}\n", domains.join(", ")));
    }
    if report.context.as_ref().is_some_and(|c| c.fallback) {
        section.push_str("- **Selection:** no keyword matched, all data used\n");
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn status_label(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Complete => "complete",
        ReportStatus::NoData => "no data",
        ReportStatus::Failed => "failed",
    }
}

fn domain_heading(domain: Domain) -> String {
    let name = domain.as_str();
    let mut chars = name.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{} ({})", title, domain.native_label())
}

/// Supporting data tables for every bundle entry.
fn generate_context_section(context: &ContextBundle) -> String {
    let mut section = String::new();

    section.push_str("## Data Used\n\n");

    for entry in &context.entries {
        match &entry.value {
            ContextValue::Summary(summary) => {
                section.push_str(&format!(
                    "### {} summary (recent window)\n\n",
                    domain_heading(entry.domain)
                ));
                section.push_str(&summary_table(summary));
            }
            ContextValue::Breakdown(breakdown) => {
                section.push_str(&format!(
                    "### {} by product\n\n",
                    domain_heading(entry.domain)
                ));
                section.push_str(&breakdown_table(breakdown));
            }
        }
    }

    section
}

fn summary_table(summary: &AggregateSummary) -> String {
    let mut table = String::new();

    table.push_str(&format!("*Records: {}*\n\n", summary.record_count()));
    table.push_str("| Metric | Value |\n");
    table.push_str("|:---|---:|\n");
    for (name, value) in summary.metrics() {
        table.push_str(&format!("| {} | {} |\n", name, value));
    }
    table.push('\n');

    table
}

fn breakdown_table(breakdown: &EntityBreakdown) -> String {
    let mut table = String::new();

    table.push_str(&format!(
        "*Records: {} | Date range: {}*\n\n",
        breakdown.total_records, breakdown.date_range
    ));

    let Some(first) = breakdown.entities.first() else {
        table.push_str("No records.\n\n");
        return table;
    };

    let names: Vec<&str> = first.summary.metrics().into_iter().map(|(n, _)| n).collect();
    table.push_str(&format!("| Product | {} |\n", names.join(" | ")));
    table.push_str(&format!("|:---|{}\n", "---:|".repeat(names.len())));

    for stats in &breakdown.entities {
        let values: Vec<String> = stats.summary.metrics().into_iter().map(|(_, v)| v).collect();
        table.push_str(&format!("| {} | {} |\n", stats.entity, values.join(" | ")));
    }
    table.push('\n');

    table
}

/// One table per chart series.
fn generate_charts_section(charts: &ChartSet) -> String {
    let mut section = String::new();

    section.push_str("## Charts\n\n");

    for (name, series) in charts {
        let kind = match series.kind {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        };
        section.push_str(&format!("### {} (`{}`, {})\n\n", series.title, name, kind));

        if series.is_empty() {
            section.push_str("No data.\n\n");
            continue;
        }

        let axis = series.axis_label.as_deref().unwrap_or("Value");
        section.push_str(&format!("| Category | {} |\n", axis));
        section.push_str("|:---|---:|\n");
        for (category, value) in series.points() {
            section.push_str(&format!("| {} | {:.2} |\n", category, value));
        }
        section.push('\n');
    }

    section
}

/// Generate a Markdown dashboard from a full-history snapshot.
pub fn generate_dashboard_markdown(snapshot: &DashboardSnapshot) -> String {
    let mut output = String::new();

    output.push_str("# Operations Dashboard\n\n");
    output.push_str(&format!(
        "*Last updated: {}*\n\n",
        snapshot.last_updated.format("%Y-%m-%d %H:%M:%S")
    ));

    let panels: [(Domain, &DomainDashboard); 4] = [
        (Domain::Production, &snapshot.production),
        (Domain::Sales, &snapshot.sales),
        (Domain::Inventory, &snapshot.inventory),
        (Domain::Feedback, &snapshot.feedback),
    ];

    for (domain, panel) in panels {
        output.push_str(&format!("## {}\n\n", domain_heading(domain)));
        output.push_str(&summary_table(&panel.summary));
        output.push_str(&breakdown_table(&panel.breakdown));
    }

    output.push_str(&generate_footer());
    output
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by opsight v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON document for any report struct.
pub fn generate_json_report<T: Serialize>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

//! Human-readable output

use envmig_core::{
    CutoverOutcome, MigrationCatalog, MigrationVersion, Readiness, RunReport, RunTarget,
};
use serde::Serialize;

/// What a run would do, computed without touching the backend
#[derive(Debug, Serialize)]
pub(crate) struct Plan<'a> {
    pub(crate) target: &'a RunTarget,
    pub(crate) migrations: Vec<&'a MigrationVersion>,
}

impl<'a> Plan<'a> {
    pub(crate) fn new(target: &'a RunTarget, catalog: &'a MigrationCatalog) -> Self {
        Self {
            target,
            migrations: catalog.versions().collect(),
        }
    }
}

fn join(versions: &[MigrationVersion]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    versions.iter().map(MigrationVersion::as_str).collect::<Vec<_>>().join(", ")
}

pub(crate) fn render_report(report: &RunReport) -> String {
    let readiness = match report.readiness {
        Readiness::Ready => "ready".to_string(),
        Readiness::Assumed { attempts, last } => {
            format!("assumed after {attempts} attempts (last status: {last})")
        }
    };
    let cutover = match &report.cutover {
        CutoverOutcome::Skipped => "skipped".to_string(),
        CutoverOutcome::Switched {
            alias,
            previous,
            environment,
        } => format!("{alias} -> {environment} (was {previous})"),
        CutoverOutcome::Failed { alias, reason } => format!("{alias} not switched: {reason}"),
    };

    let lines = [
        format!("Environment:      {}", report.environment),
        format!("Run kind:         {} ({})", report.kind, report.branch),
        format!("Readiness:        {readiness}"),
        format!(
            "API keys:         {} linked, {} already linked",
            report.linked_keys.updated.len(),
            report.linked_keys.already_linked.len()
        ),
        format!("Starting version: {}", report.starting_version),
        format!("Applied:          {}", join(&report.applied)),
        format!("Final version:    {}", report.final_version),
        format!("Alias cutover:    {cutover}"),
    ];
    lines.join("\n") + "\n"
}

pub(crate) fn render_plan(plan: &Plan<'_>) -> String {
    let mut lines = vec![
        format!("Environment: {}", plan.target.environment),
        format!("Run kind:    {} ({})", plan.target.kind, plan.target.branch),
        format!("Migrations:  {}", plan.migrations.len()),
    ];
    lines.extend(plan.migrations.iter().map(|version| format!("  {version}")));
    lines.join("\n") + "\n"
}

/// GitHub Actions `::error::` workflow command for `message`
pub(crate) fn annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{escaped}")
}

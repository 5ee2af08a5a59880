//! Markdown rendering of [`ArtifactReport`]

use super::ArtifactReport;

/// Human-readable report, also printed by the `report` command
pub fn to_markdown(report: &ArtifactReport) -> String {
    let mut out = String::from("# Artifact Report\n\n");

    out.push_str(&format!("Generated: {}\n\n", report.generated.to_rfc3339()));

    out.push_str("## Run\n\n");
    out.push_str(&format!("- Project: `{}`\n", report.project_root));
    out.push_str(&format!("- Branch: {}\n", report.run.branch));
    out.push_str(&format!("- Commit: {}\n", report.run.commit_id));
    out.push_str(&format!("- Build: {}\n", report.run.build_id));
    out.push_str(&format!("- Environment: {}\n", report.run.environment));
    out.push_str(&format!(
        "- Initialized: {}\n\n",
        report.run.initialized.to_rfc3339()
    ));

    out.push_str("## Phases\n\n");
    if report.phases.is_empty() {
        out.push_str("No phases finalized.\n\n");
    } else {
        out.push_str("| Phase | Recorded files | Recorded bytes | Live files | Live bytes | Drift |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for phase in &report.phases {
            let (live_files, live_bytes) = match phase.live {
                Some(live) => (live.file_count.to_string(), live.total_size.to_string()),
                None => ("-".to_string(), "-".to_string()),
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                phase.phase,
                phase.recorded.count,
                phase.recorded.total_size,
                live_files,
                live_bytes,
                if phase.drift { "yes" } else { "no" }
            ));
        }
        out.push('\n');
    }

    out.push_str("## Security\n\n");
    match &report.security {
        Some(security) => {
            out.push_str(&format!("- Scanned files: {}\n", security.scanned_files));
            if security.skipped_files > 0 {
                out.push_str(&format!("- Skipped (oversized): {}\n", security.skipped_files));
            }
            out.push_str(&format!("- Violations: {}\n", security.violation_count));
            if let Some(severity) = security.highest_severity {
                out.push_str(&format!("- Highest severity: {}\n", severity));
            }
            out.push_str(&format!(
                "- Scanned at: {}\n\n",
                security.scanned_at.to_rfc3339()
            ));
        }
        None => out.push_str("No security scan recorded.\n\n"),
    }

    out.push_str("## Settings\n\n");
    out.push_str(&format!(
        "- Retention: {} days\n",
        report.settings.retention_days
    ));
    out.push_str(&format!("- Compression: {}\n", report.settings.compression));
    out.push_str(&format!("- Encryption: {}\n", report.settings.encryption));
    out.push_str(&format!("- Validation: {}\n", report.settings.validation));

    out
}

//! Plain-text rendering of analysis reports and change sets.

use std::io::{self, Write};

use gridlens_core::diff::{ChangeSet, RowStatus};
use gridlens_core::{ModelAnalysis, RiskAlert, Tier};

const RULE: &str = "────────────────────────────────────────────────────────────";

fn alert_line(alert: &RiskAlert) -> String {
    let mut line = format!(
        "  {:<8} {:<21} {}!{}",
        alert.severity.as_str(),
        alert.risk_type.as_str(),
        alert.sheet,
        alert.location
    );
    if alert.instance_count() > 1 {
        line.push_str(&format!(" (x{})", alert.instance_count()));
    }
    let context = alert.context_display();
    if !context.is_empty() {
        line.push_str(&format!("  [{}]", context));
    }
    line
}

pub fn write_analysis(out: &mut dyn Write, analysis: &ModelAnalysis) -> io::Result<()> {
    writeln!(out, "{}", analysis.filename)?;
    writeln!(out, "Health score: {}/100", analysis.health_score)?;
    let counts = analysis.tier_counts();
    writeln!(
        out,
        "Fatal: {}  Integrity: {}  Structural: {}",
        counts.get(&Tier::Fatal).copied().unwrap_or(0),
        counts.get(&Tier::Integrity).copied().unwrap_or(0),
        counts.get(&Tier::Structural).copied().unwrap_or(0)
    )?;

    if analysis.alerts.is_empty() {
        writeln!(out, "\nNo risks found.")?;
    }
    for tier in [Tier::Fatal, Tier::Integrity, Tier::Structural] {
        let mut alerts = analysis.alerts_in(tier).peekable();
        if alerts.peek().is_none() {
            continue;
        }
        writeln!(out, "\n{}\n{}", tier, RULE)?;
        for alert in alerts {
            writeln!(out, "{}", alert_line(alert))?;
            writeln!(out, "           {}", alert.description)?;
            if let Some(impact) = &alert.impact {
                let mut detail = format!("           impact: {} dependent cells", impact.dominance);
                if let Some(prescription) = impact.prescription {
                    detail.push_str(&format!(", suggested: {}", prescription.as_str()));
                }
                if impact.copy_pasted {
                    detail.push_str(", copy-pasted");
                }
                writeln!(out, "{}", detail)?;
            }
        }
    }

    if !analysis.diagnostics.is_empty() {
        writeln!(out, "\nDiagnostics\n{}", RULE)?;
        for diagnostic in &analysis.diagnostics {
            writeln!(out, "  {}", diagnostic)?;
        }
    }
    Ok(())
}

pub fn write_changes(out: &mut dyn Write, changes: &ChangeSet) -> io::Result<()> {
    writeln!(
        out,
        "Sheet {} keyed on {}",
        changes.sheet,
        changes.key_columns.join(",")
    )?;
    writeln!(
        out,
        "Rows: {} matched, {} inserted, {} deleted",
        changes.count_rows(RowStatus::Matched),
        changes.count_rows(RowStatus::Inserted),
        changes.count_rows(RowStatus::Deleted)
    )?;
    for (side, stats) in [("old", &changes.old_keys), ("new", &changes.new_keys)] {
        if !stats.is_unique() {
            writeln!(
                out,
                "Warning: {} keys {:.0}% unique; duplicates paired in order",
                side,
                stats.uniqueness * 100.0
            )?;
            for dup in &stats.duplicates {
                writeln!(out, "  '{}' x{} (rows {:?})", dup.key, dup.count, dup.rows)?;
            }
        }
    }
    writeln!(
        out,
        "Health: {} -> {} ({:+})",
        changes.health_before, changes.health_after, changes.health_delta
    )?;

    if changes.changes.is_empty() {
        writeln!(out, "\nNo changes.")?;
        return Ok(());
    }
    writeln!(out, "\n{}", RULE)?;
    for change in &changes.changes {
        let location = match (&change.old_location, &change.new_location) {
            (Some(old), Some(new)) if old != new => format!("{} -> {}", old, new),
            (_, Some(loc)) | (Some(loc), None) => loc.clone(),
            (None, None) => String::new(),
        };
        let place = if location.is_empty() {
            change.sheet.clone()
        } else {
            format!("{}!{}", change.sheet, location)
        };
        write!(
            out,
            "  {:<8} {:<15} {}  {}",
            change.severity.as_str(),
            change.kind.as_str(),
            place,
            change.description
        )?;
        if change.old_value.is_some() || change.new_value.is_some() {
            write!(
                out,
                ": {} -> {}",
                change.old_value.as_deref().unwrap_or("(empty)"),
                change.new_value.as_deref().unwrap_or("(empty)")
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

//! Risk and diff exports.
//!
//! Every risk type shares one flat record so downstream tools never need
//! type-specific columns.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::diff::ChangeSet;
use crate::error::Result;
use crate::model::ModelAnalysis;
use crate::risk::RiskAlert;

/// One exported risk row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskRecord {
    pub risk_type: String,
    pub severity: String,
    pub tier: String,
    pub sheet: String,
    /// `F4` or `F4...F6`.
    pub location: String,
    pub instances: usize,
    pub context: String,
    pub description: String,
    pub dominance: usize,
    pub prescription: String,
}

impl From<&RiskAlert> for RiskRecord {
    fn from(alert: &RiskAlert) -> Self {
        RiskRecord {
            risk_type: alert.risk_type.to_string(),
            severity: alert.severity.to_string(),
            tier: alert.tier.map(|t| t.to_string()).unwrap_or_default(),
            sheet: alert.sheet.clone(),
            location: alert.location.to_string(),
            instances: alert.instance_count(),
            context: alert.context_display().to_string(),
            description: alert.description.clone(),
            dominance: alert.impact.as_ref().map_or(0, |i| i.dominance),
            prescription: alert
                .impact
                .as_ref()
                .and_then(|i| i.prescription)
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

pub fn risk_records(analysis: &ModelAnalysis) -> Vec<RiskRecord> {
    analysis.alerts.iter().map(RiskRecord::from).collect()
}

/// Guard against CSV formula injection in spreadsheet apps.
fn neutralize(field: &str) -> String {
    let first_non_space = field.trim_start_matches([' ', '\t']).chars().next();
    if matches!(first_non_space, Some('=' | '+' | '-' | '@')) {
        format!("'{}", field)
    } else {
        field.to_string()
    }
}

/// Write risk records as CSV with a header row.
pub fn write_risks_csv<W: Write>(out: W, analysis: &ModelAnalysis) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for record in risk_records(analysis) {
        writer.serialize(RiskRecord {
            risk_type: neutralize(&record.risk_type),
            sheet: neutralize(&record.sheet),
            context: neutralize(&record.context),
            description: neutralize(&record.description),
            ..record
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct RiskReport<'a> {
    file: &'a str,
    health_score: u32,
    risks: Vec<RiskRecord>,
    diagnostics: Vec<String>,
}

/// Write the analysis summary and risk records as pretty JSON.
pub fn write_risks_json<W: Write>(out: W, analysis: &ModelAnalysis) -> Result<()> {
    let report = RiskReport {
        file: &analysis.filename,
        health_score: analysis.health_score,
        risks: risk_records(analysis),
        diagnostics: analysis.diagnostics.iter().map(|d| d.to_string()).collect(),
    };
    serde_json::to_writer_pretty(out, &report)?;
    Ok(())
}

pub fn write_changes_json<W: Write>(out: W, changes: &ChangeSet) -> Result<()> {
    serde_json::to_writer_pretty(out, changes)?;
    Ok(())
}

/// Export risks to a file, choosing CSV or JSON by extension.
pub fn export_risks(path: &Path, analysis: &ModelAnalysis) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        write_risks_json(file, analysis)
    } else {
        write_risks_csv(file, analysis)
    }
}

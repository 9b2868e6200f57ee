//! Triage: tiering, the inconsistent-value pass, quantitative severity,
//! ordering and the workbook health score.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use gridlens_engine::engine::format_number;

use crate::risk::{LabelSource, RiskAlert, RiskDetails, RiskType, Severity, Tier};

const HEALTH_FLOOR: f64 = 30.0;

pub fn tier_of(alert: &RiskAlert) -> Tier {
    match alert.risk_type {
        RiskType::CircularReference | RiskType::PhantomLink | RiskType::FormulaError => Tier::Fatal,
        RiskType::InconsistentFormula
        | RiskType::InconsistentValue
        | RiskType::ValueConflict
        | RiskType::TimelineGap => Tier::Integrity,
        RiskType::HiddenHardcode | RiskType::MergedCellRisk | RiskType::CrossSheetSpaghetti => {
            Tier::Structural
        }
    }
}

fn tier_weight(tier: Tier) -> f64 {
    match tier {
        Tier::Fatal => 1.0,
        Tier::Integrity => 0.7,
        Tier::Structural => 0.3,
    }
}

/// How likely the finding is a real mistake rather than intent.
fn error_probability(alert: &RiskAlert) -> f64 {
    match alert.details {
        RiskDetails::InconsistentFormula { deviations: 1, .. } => 0.5,
        _ => 1.0,
    }
}

fn severity_for(score: f64) -> Severity {
    if score >= 50.0 {
        Severity::Critical
    } else if score >= 20.0 {
        Severity::High
    } else if score >= 5.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Hardcodes whose label maps to more than one distinct literal are
/// integrity risks, not structural debt. Needs labelled alerts; placeholder
/// labels never group. Allow-listed constants are left alone.
pub fn reclassify_inconsistent_values(alerts: Vec<RiskAlert>) -> Vec<RiskAlert> {
    let label_key = |alert: &RiskAlert| -> Option<String> {
        if alert.risk_type != RiskType::HiddenHardcode || alert.is_allowed_hardcode() {
            return None;
        }
        let context = alert.context.as_ref()?;
        if context.source == LabelSource::Placeholder {
            return None;
        }
        context.row.as_ref().map(|r| r.to_lowercase())
    };

    let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for alert in &alerts {
        if let (Some(key), Some(value)) = (label_key(alert), alert.hardcode_value()) {
            values.entry(key).or_default().insert(format_number(value));
        }
    }
    values.retain(|_, v| v.len() > 1);
    if values.is_empty() {
        return alerts;
    }

    alerts
        .into_iter()
        .map(|alert| {
            let Some(seen) = label_key(&alert).and_then(|k| values.get(&k)) else {
                return alert;
            };
            let label = alert
                .context
                .as_ref()
                .and_then(|c| c.row.clone())
                .unwrap_or_default();
            let values: Vec<String> = seen.iter().cloned().collect();
            let description = format!(
                "Label '{}' uses different hardcoded values: {}",
                label,
                values.join(", ")
            );
            RiskAlert {
                risk_type: RiskType::InconsistentValue,
                severity: alert.severity.max(Severity::High),
                description,
                details: RiskDetails::InconsistentValue { label, values },
                ..alert
            }
        })
        .collect()
}

/// Assign tiers and scores, escalate severities, and order the alerts.
pub fn triage(alerts: Vec<RiskAlert>) -> Vec<RiskAlert> {
    let mut out: Vec<RiskAlert> = alerts
        .into_iter()
        .map(|alert| {
            let tier = tier_of(&alert);
            let impact = alert.impact.as_ref().map_or(0, |i| i.dominance).max(1) as f64;
            let score = tier_weight(tier) * impact * error_probability(&alert);
            let severity = if alert.is_allowed_hardcode() {
                Severity::Low
            } else {
                alert.severity.max(severity_for(score))
            };
            RiskAlert {
                tier: Some(tier),
                score,
                severity,
                ..alert
            }
        })
        .collect();
    out.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then(b.severity.cmp(&a.severity))
            .then(b.score.total_cmp(&a.score))
            .then_with(|| a.sheet.cmp(&b.sheet))
            .then_with(|| a.location.first().cmp(&b.location.first()))
    });
    debug!(alerts = out.len(), "alerts triaged");
    out
}

/// 100 minus weighted penalties, never below 30.
pub fn health_score(alerts: &[RiskAlert]) -> u32 {
    let penalty: f64 = alerts
        .iter()
        .map(|a| {
            let base = match a.severity {
                Severity::Critical => 5.0,
                Severity::High => 4.0,
                Severity::Medium => 3.0,
                Severity::Low => 1.0,
            };
            let multiplier = match a.tier.unwrap_or_else(|| tier_of(a)) {
                Tier::Fatal => 1.0,
                Tier::Integrity => 0.5,
                Tier::Structural => 0.1,
            };
            base * multiplier
        })
        .sum();
    (100.0 - penalty).max(HEALTH_FLOOR).round() as u32
}

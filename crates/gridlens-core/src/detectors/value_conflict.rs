use std::collections::BTreeMap;

use gridlens_engine::engine::{CellRef, CellValue, format_number};

use super::{DetectionContext, Detector, DetectorError};
use crate::context::rules;
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

const MIN_VALUES: usize = 3;
const MAJORITY_SHARE: f64 = 0.7;

/// Plain numeric inputs sharing a row label should agree. When most of them
/// hold one value, the rest were probably missed by an update.
pub struct ValueConflictDetector;

struct Input {
    sheet: String,
    cell: CellRef,
    /// Rounded to cents, so 0.3 and 0.30000001 agree.
    value: String,
}

impl Detector for ValueConflictDetector {
    fn id(&self) -> &'static str {
        "value_conflict"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        // label (lowercased) -> (label as written, inputs)
        let mut groups: BTreeMap<String, (String, Vec<Input>)> = BTreeMap::new();
        for sheet in ctx.store.sheets() {
            for (cell_ref, cell) in sheet.cells() {
                if !cell.is_numeric_input() {
                    continue;
                }
                let CellValue::Number(n) = cell.value else {
                    continue;
                };
                let Some(label) = rules::row_label(sheet, *cell_ref) else {
                    continue;
                };
                if rules::is_poor_quality(&label) {
                    continue;
                }
                let entry = groups
                    .entry(label.to_lowercase())
                    .or_insert_with(|| (label.clone(), Vec::new()));
                entry.1.push(Input {
                    sheet: sheet.name().to_string(),
                    cell: *cell_ref,
                    value: format_number((n * 100.0).round() / 100.0),
                });
            }
        }

        let mut alerts = Vec::new();
        for (label, inputs) in groups.values() {
            alerts.extend(conflicts(label, inputs));
        }
        Ok(alerts)
    }
}

fn conflicts(label: &str, inputs: &[Input]) -> Vec<RiskAlert> {
    if inputs.len() < MIN_VALUES {
        return Vec::new();
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for input in inputs {
        *counts.entry(input.value.as_str()).or_default() += 1;
    }
    if counts.len() < 2 {
        return Vec::new();
    }
    let Some((majority, majority_count)) = counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(v, c)| (v.to_string(), *c))
    else {
        return Vec::new();
    };
    if (majority_count as f64) < inputs.len() as f64 * MAJORITY_SHARE {
        return Vec::new();
    }
    inputs
        .iter()
        .filter(|i| i.value != majority)
        .map(|i| {
            RiskAlert::new(
                RiskType::ValueConflict,
                Severity::High,
                i.sheet.clone(),
                i.cell,
                format!(
                    "Value {} differs from {} other cells with label '{}' (expected {})",
                    i.value, majority_count, label, majority
                ),
                RiskDetails::ValueConflict {
                    label: label.to_string(),
                    majority: majority.clone(),
                    value: i.value.clone(),
                },
            )
        })
        .collect()
}

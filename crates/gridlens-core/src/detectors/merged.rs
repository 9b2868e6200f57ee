use gridlens_engine::engine::{RefTarget, extract_references};

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// Formulas whose range operand overlaps a merged region. Aggregates over
/// such ranges count the merge's virtual copies as real data.
pub struct MergedCellDetector;

impl Detector for MergedCellDetector {
    fn id(&self) -> &'static str {
        "merged_cell"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for home in ctx.store.sheets() {
            for (cell_ref, cell) in home.formula_cells() {
                if cell.is_virtual() {
                    continue;
                }
                let Some(formula) = cell.formula.as_deref() else {
                    continue;
                };
                for reference in extract_references(formula) {
                    if !reference.is_range() || reference.is_external() || reference.target == RefTarget::Invalid {
                        continue;
                    }
                    let target = match reference.sheet.as_deref() {
                        Some(name) => match ctx.store.sheet(name) {
                            Some(sheet) => sheet,
                            None => continue,
                        },
                        None => home,
                    };
                    let Some(bounds) = reference.bounds(Some(target.extent())) else {
                        continue;
                    };
                    let Some(merge) = target.merges().iter().find(|m| m.intersects(&bounds)) else {
                        continue;
                    };
                    alerts.push(RiskAlert::new(
                        RiskType::MergedCellRisk,
                        Severity::Medium,
                        home.name(),
                        *cell_ref,
                        format!("Formula references merged cell range: {}", reference.text),
                        RiskDetails::MergedCell {
                            merge: merge.to_string(),
                            reference: reference.text.clone(),
                        },
                    ));
                }
            }
        }
        Ok(alerts)
    }
}

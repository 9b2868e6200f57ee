use std::collections::BTreeSet;

use gridlens_engine::engine::extract_references;

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// A formula reading more distinct other sheets than this is spaghetti.
const MAX_OTHER_SHEETS: usize = 2;

pub struct CrossSheetDetector;

impl Detector for CrossSheetDetector {
    fn id(&self) -> &'static str {
        "cross_sheet_spaghetti"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for sheet in ctx.store.sheets() {
            let home = sheet.name().to_lowercase();
            for (cell_ref, cell) in sheet.formula_cells() {
                if cell.is_virtual() {
                    continue;
                }
                let Some(formula) = cell.formula.as_deref() else {
                    continue;
                };
                let others: BTreeSet<String> = extract_references(formula)
                    .into_iter()
                    .filter(|r| !r.is_external())
                    .filter_map(|r| r.sheet)
                    .filter(|s| s.to_lowercase() != home)
                    .collect();
                if others.len() <= MAX_OTHER_SHEETS {
                    continue;
                }
                let sheets: Vec<String> = others.into_iter().collect();
                alerts.push(RiskAlert::new(
                    RiskType::CrossSheetSpaghetti,
                    Severity::Low,
                    sheet.name(),
                    *cell_ref,
                    format!("Formula references {} external sheets", sheets.len()),
                    RiskDetails::CrossSheet { sheets },
                ));
            }
        }
        Ok(alerts)
    }
}

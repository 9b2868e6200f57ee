use gridlens_engine::engine::{CellRef, numeric_literals};

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// One alert per numeric literal in every authored formula. Allow-listed
/// constants are reported at Low severity, never dropped.
pub struct HardcodeDetector;

impl Detector for HardcodeDetector {
    fn id(&self) -> &'static str {
        "hidden_hardcode"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for sheet in ctx.store.sheets() {
            for (cell_ref, cell) in sheet.formula_cells() {
                if cell.is_virtual() {
                    continue;
                }
                let Some(formula) = cell.formula.as_deref() else {
                    continue;
                };
                alerts.extend(literal_alerts(ctx, sheet.name(), *cell_ref, formula));
            }
        }
        Ok(alerts)
    }
}

fn literal_alerts<'a>(
    ctx: &'a DetectionContext,
    sheet: &'a str,
    cell: CellRef,
    formula: &'a str,
) -> impl Iterator<Item = RiskAlert> + 'a {
    numeric_literals(formula).into_iter().map(move |literal| {
        let allowed = ctx.config.is_allowed_constant(literal.value);
        let severity = if allowed { Severity::Low } else { Severity::High };
        RiskAlert::new(
            RiskType::HiddenHardcode,
            severity,
            sheet,
            cell,
            format!("Hardcoded value '{}' in ={}", literal.text, formula),
            RiskDetails::Hardcode {
                literal: literal.text,
                value: literal.value,
                formula: formula.to_string(),
                allowed,
            },
        )
    })
}

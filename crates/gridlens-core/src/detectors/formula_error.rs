use gridlens_engine::engine::CellValue;

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

fn describe(code: &str) -> &'static str {
    match code {
        "#REF!" => "Reference to deleted cell or sheet",
        "#DIV/0!" => "Division by zero",
        "#VALUE!" => "Wrong type of argument or operand",
        "#NAME?" => "Unrecognized function or name",
        "#N/A" => "Value not available",
        "#NUM!" => "Invalid numeric value",
        "#NULL!" => "Incorrect range operator",
        _ => "Formula error",
    }
}

/// Authored cells showing an error value.
pub struct FormulaErrorDetector;

impl Detector for FormulaErrorDetector {
    fn id(&self) -> &'static str {
        "formula_error"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for sheet in ctx.store.sheets() {
            for (cell_ref, cell) in sheet.cells() {
                if cell.is_virtual() {
                    continue;
                }
                let CellValue::Error(code) = &cell.value else {
                    continue;
                };
                alerts.push(RiskAlert::new(
                    RiskType::FormulaError,
                    Severity::Critical,
                    sheet.name(),
                    *cell_ref,
                    format!("{}: {}", code, describe(code)),
                    RiskDetails::FormulaError { code: code.clone() },
                ));
            }
        }
        Ok(alerts)
    }
}

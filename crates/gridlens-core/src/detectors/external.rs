use gridlens_engine::engine::UnresolvedReason;

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// Phantom links: references the graph builder could not resolve to stored
/// cells. Ranges too large to expand are a resource limit rather than a
/// broken link and surface as diagnostics instead.
pub struct PhantomLinkDetector;

impl Detector for PhantomLinkDetector {
    fn id(&self) -> &'static str {
        "phantom_link"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let alerts = ctx
            .graph
            .unresolved()
            .iter()
            .filter_map(|u| {
                let (severity, description) = match u.reason {
                    UnresolvedReason::ExternalWorkbook => (
                        Severity::High,
                        format!("Formula references external file: {}", u.reference),
                    ),
                    UnresolvedReason::UnknownSheet => (
                        Severity::Critical,
                        format!("Formula references a sheet that does not exist: {}", u.reference),
                    ),
                    UnresolvedReason::InvalidAddress => (
                        Severity::Critical,
                        format!("Formula references an invalid address: {}", u.reference),
                    ),
                    UnresolvedReason::OversizedRange => return None,
                };
                Some(RiskAlert::new(
                    RiskType::PhantomLink,
                    severity,
                    u.from.sheet.clone(),
                    u.from.cell,
                    description,
                    RiskDetails::PhantomLink {
                        reference: u.reference.clone(),
                        reason: u.reason,
                    },
                ))
            })
            .collect();
        Ok(alerts)
    }
}

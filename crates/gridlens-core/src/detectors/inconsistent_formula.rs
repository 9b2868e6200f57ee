use std::collections::{BTreeMap, HashMap};

use gridlens_engine::engine::{CellRef, Sheet, formula_pattern};

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// Runs shorter than this have no meaningful majority.
const MIN_RUN: usize = 3;
/// Share of the run the majority shape must cover.
const MAJORITY_SHARE: f64 = 0.7;

/// Flags formulas that break the pattern of their row or column: within
/// each run of adjacent authored formulas, cells whose R1C1 pattern differs
/// from a clear majority. Anchored references compare by position only, so
/// `$Z$1` and `$Z$2` read alike. A cell flagged along both axes is reported
/// once, at the higher severity.
pub struct InconsistentFormulaDetector;

impl Detector for InconsistentFormulaDetector {
    fn id(&self) -> &'static str {
        "inconsistent_formula"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for sheet in ctx.store.sheets() {
            let shaped = shaped_cells(sheet);
            let mut flagged: BTreeMap<CellRef, RiskAlert> = BTreeMap::new();
            for axis in [Axis::Row, Axis::Column] {
                for run in formula_runs(&shaped, axis) {
                    for alert in check_run(sheet.name(), &run, axis) {
                        let cell = alert.location.first();
                        match flagged.get(&cell) {
                            Some(existing) if existing.severity >= alert.severity => {}
                            _ => {
                                flagged.insert(cell, alert);
                            }
                        }
                    }
                }
            }
            alerts.extend(flagged.into_values());
        }
        Ok(alerts)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
}

impl Axis {
    fn noun(self) -> &'static str {
        match self {
            Axis::Row => "row",
            Axis::Column => "column",
        }
    }

    /// Sort key that puts neighbours along this axis next to each other.
    fn key(self, cell: CellRef) -> (usize, usize) {
        match self {
            Axis::Row => (cell.row, cell.col),
            Axis::Column => (cell.col, cell.row),
        }
    }
}

#[derive(Clone)]
struct Shaped {
    cell: CellRef,
    shape: String,
}

fn shaped_cells(sheet: &Sheet) -> Vec<Shaped> {
    sheet
        .formula_cells()
        .filter(|(_, cell)| !cell.is_virtual())
        .filter_map(|(cell_ref, cell)| {
            let formula = cell.formula.as_deref()?;
            Some(Shaped {
                cell: *cell_ref,
                shape: formula_pattern(formula, *cell_ref),
            })
        })
        .collect()
}

/// Maximal runs of formula cells that are consecutive along `axis`.
fn formula_runs(shaped: &[Shaped], axis: Axis) -> Vec<Vec<Shaped>> {
    let mut ordered: Vec<&Shaped> = shaped.iter().collect();
    ordered.sort_by_key(|s| axis.key(s.cell));

    let mut runs: Vec<Vec<Shaped>> = Vec::new();
    let mut current: Vec<Shaped> = Vec::new();
    for s in ordered {
        let (line, pos) = axis.key(s.cell);
        let adjacent = current.last().is_some_and(|prev| {
            let (prev_line, prev_pos) = axis.key(prev.cell);
            prev_line == line && prev_pos + 1 == pos
        });
        if !adjacent && !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
        current.push(s.clone());
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs.retain(|r| r.len() >= MIN_RUN);
    runs
}

fn check_run(sheet: &str, run: &[Shaped], axis: Axis) -> Vec<RiskAlert> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for s in run {
        *counts.entry(s.shape.as_str()).or_default() += 1;
    }
    if counts.len() < 2 {
        return Vec::new();
    }
    let mut majority = run[0].shape.as_str();
    for s in run {
        if counts[s.shape.as_str()] > counts[majority] {
            majority = s.shape.as_str();
        }
    }
    let majority_count = counts[majority];
    if (majority_count as f64) < run.len() as f64 * MAJORITY_SHARE {
        return Vec::new();
    }
    let deviations = run.len() - majority_count;
    let (severity, description) = if deviations == 1 {
        (
            Severity::Low,
            format!(
                "Formula pattern differs from the other {} cells in this {}; possibly intentional",
                majority_count,
                axis.noun()
            ),
        )
    } else {
        (
            Severity::High,
            format!(
                "{} of {} cells in this {} break the common formula pattern; likely an error",
                deviations,
                run.len(),
                axis.noun()
            ),
        )
    };
    run.iter()
        .filter(|s| s.shape != majority)
        .map(|s| {
            RiskAlert::new(
                RiskType::InconsistentFormula,
                severity,
                sheet,
                s.cell,
                description.clone(),
                RiskDetails::InconsistentFormula {
                    expected_shape: majority.to_string(),
                    actual_shape: s.shape.clone(),
                    run_length: run.len(),
                    deviations,
                },
            )
        })
        .collect()
}

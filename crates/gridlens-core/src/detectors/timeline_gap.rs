use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use gridlens_engine::engine::{CellRef, CellValue, Sheet};

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// A header row needs this many periods before its cadence means anything.
const MIN_RUN: usize = 3;

/// Flags missing periods in a row of time headers: `Jan 2024, Feb 2024,
/// Apr 2024` lost March. The cadence is the most common step along the run
/// and must be a plausible one (monthly, quarterly, half-yearly or annual).
pub struct TimelineGapDetector;

impl Detector for TimelineGapDetector {
    fn id(&self) -> &'static str {
        "timeline_gap"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let mut alerts = Vec::new();
        for sheet in ctx.store.sheets() {
            for run in period_runs(sheet) {
                alerts.extend(check_run(sheet.name(), &run));
            }
        }
        Ok(alerts)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scale {
    Month,
    Quarter,
    Year,
}

impl Scale {
    fn allows_step(self, step: i64) -> bool {
        match self {
            Scale::Month => matches!(step, 1 | 3 | 6 | 12),
            Scale::Quarter | Scale::Year => step == 1,
        }
    }
}

/// A period as a position on its scale's own axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Period {
    scale: Scale,
    index: i64,
}

impl Period {
    fn month(year: i32, month: u32) -> Self {
        Period {
            scale: Scale::Month,
            index: year as i64 * 12 + (month as i64 - 1),
        }
    }

    fn quarter(year: i32, quarter: u32) -> Self {
        Period {
            scale: Scale::Quarter,
            index: year as i64 * 4 + (quarter as i64 - 1),
        }
    }

    fn year(year: i32) -> Self {
        Period {
            scale: Scale::Year,
            index: year as i64,
        }
    }

    fn shifted(self, by: i64) -> Self {
        Period {
            index: self.index + by,
            ..self
        }
    }

    fn label(self) -> String {
        match self.scale {
            Scale::Month => format!("{}-{:02}", self.index.div_euclid(12), self.index.rem_euclid(12) + 1),
            Scale::Quarter => format!("Q{} {}", self.index.rem_euclid(4) + 1, self.index.div_euclid(4)),
            Scale::Year => self.index.to_string(),
        }
    }
}

fn month_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d{4})-(\d{2})|(\d{2})-(\d{4})|([A-Za-z]{3,9})[\s\-']+(\d{4}|\d{2}))$")
            .expect("month regex must compile")
    })
}

fn quarter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Q([1-4])[\s\-']*(?:FY)?\s*(\d{4}|\d{2})$").expect("quarter regex must compile")
    })
}

fn fiscal_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^FY\s*'?(\d{4}|\d{2})$").expect("fiscal year regex must compile"))
}

fn full_year(text: &str) -> Option<i32> {
    let n: i32 = text.parse().ok()?;
    Some(if text.len() == 2 { 2000 + n } else { n })
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    let pos = MONTHS.iter().position(|m| lower.starts_with(m))?;
    Some(pos as u32 + 1)
}

fn is_year(year: i32) -> bool {
    (1900..=2100).contains(&year)
}

fn parse_period(text: &str) -> Option<Period> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Period::month(date.year(), date.month()));
    }
    if let Some(caps) = month_year_re().captures(text) {
        let (year, month) = if let (Some(y), Some(m)) = (caps.get(1), caps.get(2)) {
            (full_year(y.as_str())?, m.as_str().parse().ok()?)
        } else if let (Some(m), Some(y)) = (caps.get(3), caps.get(4)) {
            (full_year(y.as_str())?, m.as_str().parse().ok()?)
        } else {
            let name = caps.get(5)?.as_str();
            (full_year(caps.get(6)?.as_str())?, month_number(name)?)
        };
        return ((1..=12).contains(&month) && is_year(year)).then(|| Period::month(year, month));
    }
    if let Some(caps) = quarter_re().captures(text) {
        let quarter = caps[1].parse().ok()?;
        let year = full_year(&caps[2])?;
        return is_year(year).then(|| Period::quarter(year, quarter));
    }
    if let Some(caps) = fiscal_year_re().captures(text) {
        let year = full_year(&caps[1])?;
        return is_year(year).then(|| Period::year(year));
    }
    if text.len() == 4 {
        let year: i32 = text.parse().ok()?;
        return is_year(year).then(|| Period::year(year));
    }
    None
}

fn cell_period(value: &CellValue) -> Option<Period> {
    match value {
        CellValue::Text(s) => parse_period(s),
        CellValue::Number(n) if n.fract() == 0.0 && is_year(*n as i32) => Some(Period::year(*n as i32)),
        _ => None,
    }
}

struct Dated {
    cell: CellRef,
    period: Period,
}

/// Maximal runs of period cells in one row with consecutive columns and a
/// shared scale. Formulas count when their cached value reads as a period.
fn period_runs(sheet: &Sheet) -> Vec<Vec<Dated>> {
    let mut runs: Vec<Vec<Dated>> = Vec::new();
    let mut current: Vec<Dated> = Vec::new();
    for (cell_ref, cell) in sheet.cells() {
        if cell.is_virtual() {
            continue;
        }
        let Some(period) = cell_period(&cell.value) else {
            continue;
        };
        let adjacent = current.last().is_some_and(|prev| {
            prev.cell.row == cell_ref.row
                && prev.cell.col + 1 == cell_ref.col
                && prev.period.scale == period.scale
        });
        if !adjacent && !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
        current.push(Dated {
            cell: *cell_ref,
            period,
        });
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs.retain(|r| r.len() >= MIN_RUN);
    runs
}

fn check_run(sheet: &str, run: &[Dated]) -> Vec<RiskAlert> {
    let mut steps: Vec<i64> = run
        .windows(2)
        .map(|w| w[1].period.index - w[0].period.index)
        .collect();
    // Descending timelines read the same way once flipped.
    let direction = if steps.iter().all(|&s| s > 0) {
        1
    } else if steps.iter().all(|&s| s < 0) {
        -1
    } else {
        return Vec::new();
    };
    for s in &mut steps {
        *s *= direction;
    }

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &s in &steps {
        *counts.entry(s).or_default() += 1;
    }
    let Some(cadence) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&step, _)| step)
    else {
        return Vec::new();
    };
    let scale = run[0].period.scale;
    if !scale.allows_step(cadence) {
        return Vec::new();
    }

    let mut alerts = Vec::new();
    for (i, &step) in steps.iter().enumerate() {
        if step <= cadence {
            continue;
        }
        let before = run[i].period;
        let found = run[i + 1].period;
        let expected = before.shifted(cadence * direction);
        let missing = (step / cadence - 1).max(1) as usize;
        alerts.push(RiskAlert::new(
            RiskType::TimelineGap,
            Severity::Medium,
            sheet,
            run[i + 1].cell,
            format!(
                "Timeline jumps from {} to {}; expected {} ({} period(s) missing)",
                before.label(),
                found.label(),
                expected.label(),
                missing
            ),
            RiskDetails::TimelineGap {
                expected: expected.label(),
                found: found.label(),
                missing,
            },
        ));
    }
    alerts
}

//! Content-based diff of two analysed snapshots.
//!
//! Rows are matched by a composite business key rather than position, so
//! inserted, deleted and reordered rows are tracked correctly. The engine
//! moves through four states, each a separate type:
//!
//! `DiffEngine` (idle) -> `KeyedDiff` -> `MatchedDiff` -> `ChangeSet`

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use gridlens_engine::engine::{Cell, CellRef, Sheet, formula_shape};

use crate::error::{GridlensError, Result};
use crate::model::ModelAnalysis;
use crate::risk::{RiskType, Severity};

const KEY_SEPARATOR: &str = "|";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffConfig {
    pub sheet: String,
    /// Ordered key column letters, e.g. `["A", "C"]`.
    pub key_columns: Vec<String>,
}

impl DiffConfig {
    pub fn new(sheet: impl Into<String>, key_columns: &[&str]) -> Self {
        DiffConfig {
            sheet: sheet.into(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Parse a comma-separated list like `A,C`.
    pub fn parse_key_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn key_indices(&self) -> Result<Vec<usize>> {
        if self.key_columns.is_empty() {
            return Err(GridlensError::EmptyKeyColumns);
        }
        self.key_columns
            .iter()
            .map(|letters| {
                CellRef::col_from_letters(letters.trim().trim_start_matches('$'))
                    .ok_or_else(|| GridlensError::InvalidKeyColumn(letters.clone()))
            })
            .collect()
    }
}

/// Normalize one key part: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_key_part(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A row's identity within one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompositeKey {
    pub sheet: String,
    /// 0-indexed row.
    pub row: usize,
    /// Key cell values as displayed.
    pub raw: Vec<String>,
    pub normalized: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    pub key: String,
    pub count: usize,
    /// 1-based row numbers holding the key.
    pub rows: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyStats {
    pub total: usize,
    pub distinct: usize,
    /// distinct / total; 1.0 for an empty snapshot.
    pub uniqueness: f64,
    pub duplicates: Vec<DuplicateKey>,
}

impl KeyStats {
    pub fn from_keys(keys: &[CompositeKey]) -> Self {
        let mut rows_by_key: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for key in keys {
            rows_by_key.entry(&key.normalized).or_default().push(key.row + 1);
        }
        let duplicates: Vec<DuplicateKey> = rows_by_key
            .iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|(key, rows)| DuplicateKey {
                key: key.to_string(),
                count: rows.len(),
                rows: rows.clone(),
            })
            .collect();
        let total = keys.len();
        let distinct = rows_by_key.len();
        KeyStats {
            total,
            distinct,
            uniqueness: if total == 0 { 1.0 } else { distinct as f64 / total as f64 },
            duplicates,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.duplicates.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Matched,
    Inserted,
    Deleted,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Matched => "matched",
            RowStatus::Inserted => "inserted",
            RowStatus::Deleted => "deleted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowDiff {
    pub status: RowStatus,
    pub key: String,
    /// 1-based row numbers.
    pub old_row: Option<usize>,
    pub new_row: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Formula structure changed, or a formula appeared or vanished.
    LogicChange,
    /// Only a literal input value changed.
    InputUpdate,
    RiskImproved,
    RiskDegraded,
    SheetAdded,
    SheetRemoved,
    RowInserted,
    RowDeleted,
    ColumnAdded,
    ColumnRemoved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Logic,
    Input,
    Risk,
    Structural,
}

impl ChangeKind {
    pub fn category(&self) -> ChangeCategory {
        match self {
            ChangeKind::LogicChange => ChangeCategory::Logic,
            ChangeKind::InputUpdate => ChangeCategory::Input,
            ChangeKind::RiskImproved | ChangeKind::RiskDegraded => ChangeCategory::Risk,
            _ => ChangeCategory::Structural,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.category() {
            ChangeCategory::Logic => Severity::High,
            ChangeCategory::Input => Severity::Low,
            ChangeCategory::Risk | ChangeCategory::Structural => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::LogicChange => "Logic Change",
            ChangeKind::InputUpdate => "Input Update",
            ChangeKind::RiskImproved => "Risk Improved",
            ChangeKind::RiskDegraded => "Risk Degraded",
            ChangeKind::SheetAdded => "Sheet Added",
            ChangeKind::SheetRemoved => "Sheet Removed",
            ChangeKind::RowInserted => "Row Inserted",
            ChangeKind::RowDeleted => "Row Deleted",
            ChangeKind::ColumnAdded => "Column Added",
            ChangeKind::ColumnRemoved => "Column Removed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub category: ChangeCategory,
    pub severity: Severity,
    pub sheet: String,
    pub old_location: Option<String>,
    pub new_location: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
}

impl Change {
    fn new(kind: ChangeKind, sheet: &str, description: String) -> Self {
        Change {
            kind,
            category: kind.category(),
            severity: kind.severity(),
            sheet: sheet.to_string(),
            old_location: None,
            new_location: None,
            old_value: None,
            new_value: None,
            description,
        }
    }

    fn locations(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_location = old;
        self.new_location = new;
        self
    }

    fn values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// Final diff result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeSet {
    pub sheet: String,
    pub key_columns: Vec<String>,
    pub old_keys: KeyStats,
    pub new_keys: KeyStats,
    /// old row -> new row, 1-based.
    pub mapping: BTreeMap<usize, usize>,
    pub rows: Vec<RowDiff>,
    pub changes: Vec<Change>,
    pub health_before: u32,
    pub health_after: u32,
    pub health_delta: i64,
}

impl ChangeSet {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    pub fn count_rows(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn has_logic_changes(&self) -> bool {
        self.changes.iter().any(|c| c.kind == ChangeKind::LogicChange)
    }
}

/// Idle: both snapshots and the configuration, validated.
pub struct DiffEngine<'a> {
    old: &'a ModelAnalysis,
    new: &'a ModelAnalysis,
    old_sheet: &'a Sheet,
    new_sheet: &'a Sheet,
    config: DiffConfig,
    key_cols: Vec<usize>,
}

/// Composite keys built for both snapshots.
pub struct KeyedDiff<'a> {
    engine: DiffEngine<'a>,
    old_keys: Vec<CompositeKey>,
    new_keys: Vec<CompositeKey>,
}

/// Rows paired by key.
pub struct MatchedDiff<'a> {
    keyed: KeyedDiff<'a>,
    /// old row -> new row, 0-indexed.
    mapping: BTreeMap<usize, usize>,
    rows: Vec<RowDiff>,
}

impl<'a> DiffEngine<'a> {
    pub fn new(old: &'a ModelAnalysis, new: &'a ModelAnalysis, config: DiffConfig) -> Result<Self> {
        let key_cols = config.key_indices()?;
        let old_sheet = old
            .store
            .sheet(&config.sheet)
            .ok_or_else(|| GridlensError::UnknownSheet(format!("{} (in {})", config.sheet, old.filename)))?;
        let new_sheet = new
            .store
            .sheet(&config.sheet)
            .ok_or_else(|| GridlensError::UnknownSheet(format!("{} (in {})", config.sheet, new.filename)))?;
        Ok(DiffEngine {
            old,
            new,
            old_sheet,
            new_sheet,
            config,
            key_cols,
        })
    }

    /// Run every stage.
    pub fn run(self) -> ChangeSet {
        self.build_keys().match_rows().classify()
    }

    pub fn build_keys(self) -> KeyedDiff<'a> {
        let old_keys = composite_keys(self.old_sheet, &self.key_cols);
        let new_keys = composite_keys(self.new_sheet, &self.key_cols);
        debug!(old = old_keys.len(), new = new_keys.len(), "composite keys built");
        KeyedDiff {
            engine: self,
            old_keys,
            new_keys,
        }
    }
}

fn composite_keys(sheet: &Sheet, key_cols: &[usize]) -> Vec<CompositeKey> {
    let rows: BTreeSet<usize> = sheet.cells().map(|(c, _)| c.row).collect();
    rows.into_iter()
        .filter_map(|row| {
            let raw: Vec<String> = key_cols
                .iter()
                .map(|&col| {
                    sheet
                        .get(&CellRef::new(row, col))
                        .map(|c| c.value.display())
                        .unwrap_or_default()
                })
                .collect();
            let parts: Vec<String> = raw.iter().map(|r| normalize_key_part(r)).collect();
            if parts.iter().all(String::is_empty) {
                return None;
            }
            Some(CompositeKey {
                sheet: sheet.name().to_string(),
                row,
                raw,
                normalized: parts.join(KEY_SEPARATOR),
            })
        })
        .collect()
}

impl<'a> KeyedDiff<'a> {
    pub fn old_keys(&self) -> &[CompositeKey] {
        &self.old_keys
    }

    pub fn new_keys(&self) -> &[CompositeKey] {
        &self.new_keys
    }

    /// Pair rows sharing a key. When a key repeats, its k-th old occurrence
    /// pairs with its k-th new occurrence.
    pub fn match_rows(self) -> MatchedDiff<'a> {
        let mut new_by_key: HashMap<&str, Vec<usize>> = HashMap::new();
        for key in &self.new_keys {
            new_by_key.entry(&key.normalized).or_default().push(key.row);
        }
        let mut taken: HashMap<&str, usize> = HashMap::new();
        let mut mapping = BTreeMap::new();
        let mut rows = Vec::new();
        for key in &self.old_keys {
            let k = taken.entry(&key.normalized).or_default();
            let partner = new_by_key.get(key.normalized.as_str()).and_then(|rows| rows.get(*k));
            *k += 1;
            match partner {
                Some(&new_row) => {
                    mapping.insert(key.row, new_row);
                    rows.push(RowDiff {
                        status: RowStatus::Matched,
                        key: key.normalized.clone(),
                        old_row: Some(key.row + 1),
                        new_row: Some(new_row + 1),
                    });
                }
                None => rows.push(RowDiff {
                    status: RowStatus::Deleted,
                    key: key.normalized.clone(),
                    old_row: Some(key.row + 1),
                    new_row: None,
                }),
            }
        }
        let matched_new: BTreeSet<usize> = mapping.values().copied().collect();
        for key in &self.new_keys {
            if !matched_new.contains(&key.row) {
                rows.push(RowDiff {
                    status: RowStatus::Inserted,
                    key: key.normalized.clone(),
                    old_row: None,
                    new_row: Some(key.row + 1),
                });
            }
        }
        debug!(matched = mapping.len(), rows = rows.len(), "rows matched");
        MatchedDiff {
            keyed: self,
            mapping,
            rows,
        }
    }
}

impl MatchedDiff<'_> {
    /// old row -> new row, 0-indexed.
    pub fn mapping(&self) -> &BTreeMap<usize, usize> {
        &self.mapping
    }

    pub fn rows(&self) -> &[RowDiff] {
        &self.rows
    }

    pub fn classify(self) -> ChangeSet {
        let engine = &self.keyed.engine;
        let sheet = engine.config.sheet.as_str();
        let old_keys = KeyStats::from_keys(&self.keyed.old_keys);
        let new_keys = KeyStats::from_keys(&self.keyed.new_keys);
        for (side, stats) in [("old", &old_keys), ("new", &new_keys)] {
            if !stats.is_unique() {
                warn!(
                    side,
                    uniqueness = stats.uniqueness,
                    duplicates = stats.duplicates.len(),
                    "composite key is not unique; pairing duplicates in order"
                );
            }
        }

        let mut changes = Vec::new();
        changes.extend(sheet_changes(engine.old, engine.new));
        changes.extend(column_changes(sheet, engine.old_sheet, engine.new_sheet));
        for row in &self.rows {
            match row.status {
                RowStatus::Inserted => changes.push(
                    Change::new(ChangeKind::RowInserted, sheet, format!("Row '{}' inserted", row.key))
                        .locations(None, row.new_row.map(|r| r.to_string())),
                ),
                RowStatus::Deleted => changes.push(
                    Change::new(ChangeKind::RowDeleted, sheet, format!("Row '{}' deleted", row.key))
                        .locations(row.old_row.map(|r| r.to_string()), None),
                ),
                RowStatus::Matched => {}
            }
        }
        for (&old_row, &new_row) in &self.mapping {
            changes.extend(cell_changes(sheet, engine.old_sheet, engine.new_sheet, old_row, new_row));
        }
        changes.extend(risk_changes(sheet, engine.old, engine.new, &self.mapping));

        let health_before = engine.old.health_score;
        let health_after = engine.new.health_score;
        info!(
            sheet,
            matched = self.mapping.len(),
            changes = changes.len(),
            health_delta = health_after as i64 - health_before as i64,
            "diff classified"
        );
        ChangeSet {
            sheet: sheet.to_string(),
            key_columns: engine.config.key_columns.clone(),
            old_keys,
            new_keys,
            mapping: self.mapping.iter().map(|(o, n)| (o + 1, n + 1)).collect(),
            rows: self.rows,
            changes,
            health_before,
            health_after,
            health_delta: health_after as i64 - health_before as i64,
        }
    }
}

fn sheet_changes(old: &ModelAnalysis, new: &ModelAnalysis) -> Vec<Change> {
    let mut changes = Vec::new();
    for sheet in old.store.sheets() {
        if new.store.sheet(sheet.name()).is_none() {
            changes.push(Change::new(
                ChangeKind::SheetRemoved,
                sheet.name(),
                format!("Sheet '{}' removed", sheet.name()),
            ));
        }
    }
    for sheet in new.store.sheets() {
        if old.store.sheet(sheet.name()).is_none() {
            changes.push(Change::new(
                ChangeKind::SheetAdded,
                sheet.name(),
                format!("Sheet '{}' added", sheet.name()),
            ));
        }
    }
    changes
}

fn occupied_columns(sheet: &Sheet) -> BTreeSet<usize> {
    sheet.cells().map(|(c, _)| c.col).collect()
}

fn column_changes(name: &str, old: &Sheet, new: &Sheet) -> Vec<Change> {
    let before = occupied_columns(old);
    let after = occupied_columns(new);
    let removed = before.difference(&after).map(|&col| {
        let letters = CellRef::col_to_letters(col);
        Change::new(ChangeKind::ColumnRemoved, name, format!("Column {} no longer used", letters))
            .locations(Some(letters), None)
    });
    let added = after.difference(&before).map(|&col| {
        let letters = CellRef::col_to_letters(col);
        Change::new(ChangeKind::ColumnAdded, name, format!("Column {} now used", letters))
            .locations(None, Some(letters))
    });
    removed.chain(added).collect()
}

fn content(cell: Option<&Cell>) -> Option<String> {
    cell.map(Cell::to_input_string).filter(|s| !s.is_empty())
}

fn cell_changes(name: &str, old: &Sheet, new: &Sheet, old_row: usize, new_row: usize) -> Vec<Change> {
    let cols: BTreeSet<usize> = old
        .row(old_row)
        .chain(new.row(new_row))
        .map(|(c, _)| c.col)
        .collect();
    let mut changes = Vec::new();
    for col in cols {
        let old_ref = CellRef::new(old_row, col);
        let new_ref = CellRef::new(new_row, col);
        let before = old.get(&old_ref);
        let after = new.get(&new_ref);
        let old_formula = before.and_then(|c| c.formula.as_deref());
        let new_formula = after.and_then(|c| c.formula.as_deref());

        let kind = match (old_formula, new_formula) {
            (Some(a), Some(b)) => {
                let old_shape = formula_shape(a, old_ref);
                let new_shape = formula_shape(b, new_ref);
                if old_shape == new_shape {
                    continue;
                }
                ChangeKind::LogicChange
            }
            (Some(_), None) | (None, Some(_)) => ChangeKind::LogicChange,
            (None, None) => {
                if content(before) == content(after) {
                    continue;
                }
                ChangeKind::InputUpdate
            }
        };
        let description = match (kind, old_formula, new_formula) {
            (ChangeKind::LogicChange, Some(_), None) => "Formula replaced by a value".to_string(),
            (ChangeKind::LogicChange, None, Some(_)) => "Value replaced by a formula".to_string(),
            (ChangeKind::LogicChange, _, _) => "Formula structure changed".to_string(),
            _ => "Input value changed".to_string(),
        };
        changes.push(
            Change::new(kind, name, description)
                .locations(Some(old_ref.to_string()), Some(new_ref.to_string()))
                .values(content(before), content(after)),
        );
    }
    changes
}

/// type | sheet | row | col, rows of the diffed sheet expressed in new-row
/// coordinates.
type RiskSignature = (RiskType, String, usize, usize);

fn risk_signatures(
    analysis: &ModelAnalysis,
    diffed: &str,
    map_row: impl Fn(usize) -> Option<usize>,
) -> BTreeSet<RiskSignature> {
    let diffed = diffed.to_lowercase();
    let mut out = BTreeSet::new();
    for alert in &analysis.alerts {
        let same_sheet = alert.sheet.to_lowercase() == diffed;
        for member in &alert.members {
            let row = if same_sheet {
                match map_row(member.row) {
                    Some(row) => row,
                    None => continue,
                }
            } else {
                member.row
            };
            out.insert((alert.risk_type, alert.sheet.to_lowercase(), row, member.col));
        }
    }
    out
}

fn risk_changes(
    name: &str,
    old: &ModelAnalysis,
    new: &ModelAnalysis,
    mapping: &BTreeMap<usize, usize>,
) -> Vec<Change> {
    let matched_new: BTreeSet<usize> = mapping.values().copied().collect();
    let before = risk_signatures(old, name, |row| mapping.get(&row).copied());
    let after = risk_signatures(new, name, |row| matched_new.contains(&row).then_some(row));

    let describe = |kind: ChangeKind, (risk, sheet, row, col): &RiskSignature| {
        let cell = CellRef::new(*row, *col).to_string();
        let verb = if kind == ChangeKind::RiskImproved { "resolved" } else { "introduced" };
        Change::new(kind, sheet, format!("{} {} at {}", risk, verb, cell))
            .locations(None, Some(cell))
    };
    let improved = before.difference(&after).map(|s| describe(ChangeKind::RiskImproved, s));
    let degraded = after.difference(&before).map(|s| describe(ChangeKind::RiskDegraded, s));
    improved.chain(degraded).collect()
}

//! Context recovery collaborators.
//!
//! When no usable label is found on the sheet, the labeler asks a
//! [`ContextRecovery`] implementation with a value-masked window around the
//! cell. Raw numbers and formulas never leave the process; only text labels
//! are passed through.

use serde::Serialize;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use gridlens_engine::engine::{CellRef, CellValue, Sheet};

use crate::config::{RecoveryConfig, RecoveryProvider};

/// Sentinel a collaborator returns when it has no label to offer.
pub const NO_ANSWER: &str = "NONE";

const MAX_RESPONSE_CHARS: usize = 100;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const MASK_FORMULA: &str = "[FORMULA]";
pub const MASK_NUMBER: &str = "[NUM]";
pub const MASK_EMPTY: &str = "[EMPTY]";
pub const MASK_BOOL: &str = "[BOOL]";
pub const MASK_ERROR: &str = "[ERROR]";

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("recovery timed out after {0} ms")]
    Timeout(u64),

    #[error("recovery provider unavailable: {0}")]
    Unavailable(String),

    #[error("recovery provider failed: {0}")]
    Failed(String),

    #[error("IO error talking to recovery provider: {0}")]
    Io(#[from] std::io::Error),
}

/// A bounded rectangular window around the target, values masked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryRequest {
    pub sheet: String,
    /// Target address, e.g. "F5".
    pub target: String,
    /// Address of the window's top-left cell.
    pub origin: String,
    /// Target position inside `cells` as (row, col).
    pub target_offset: (usize, usize),
    /// Row-major masked cell texts.
    pub cells: Vec<Vec<String>>,
}

impl RecoveryRequest {
    pub fn build(sheet: &Sheet, target: CellRef, half_rows: usize, half_cols: usize) -> Self {
        let top = target.row.saturating_sub(half_rows);
        let left = target.col.saturating_sub(half_cols);
        let bottom = target.row + half_rows;
        let right = target.col + half_cols;
        let cells = (top..=bottom)
            .map(|row| {
                (left..=right)
                    .map(|col| mask_cell(sheet, CellRef::new(row, col)))
                    .collect()
            })
            .collect();
        RecoveryRequest {
            sheet: sheet.name().to_string(),
            target: target.to_string(),
            origin: CellRef::new(top, left).to_string(),
            target_offset: (target.row - top, target.col - left),
            cells,
        }
    }

    /// Two requests with the same key would get the same answer.
    pub fn shape_key(&self) -> String {
        let mut key = format!("{}:{}|", self.target_offset.0, self.target_offset.1);
        for row in &self.cells {
            key.push_str(&row.join("\u{1f}"));
            key.push('\u{1e}');
        }
        key
    }
}

fn mask_cell(sheet: &Sheet, cell: CellRef) -> String {
    let Some(stored) = sheet.get(&cell) else {
        return MASK_EMPTY.to_string();
    };
    if stored.is_formula() {
        return MASK_FORMULA.to_string();
    }
    match &stored.value {
        CellValue::Empty => MASK_EMPTY.to_string(),
        CellValue::Number(_) => MASK_NUMBER.to_string(),
        CellValue::Bool(_) => MASK_BOOL.to_string(),
        CellValue::Error(_) => MASK_ERROR.to_string(),
        CellValue::Text(s) => {
            if s.replace(',', "").trim().parse::<f64>().is_ok() {
                MASK_NUMBER.to_string()
            } else {
                s.clone()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryResponse {
    Label(String),
    NoAnswer,
}

impl RecoveryResponse {
    /// Interpret raw provider output. Anything but a single short line of
    /// text is treated as no answer.
    pub fn parse(raw: &str) -> Self {
        let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let [line] = lines.as_slice() else {
            return RecoveryResponse::NoAnswer;
        };
        let label = line.trim_matches(|c: char| c == '"' || c == '\'').trim();
        if label.is_empty()
            || label.eq_ignore_ascii_case(NO_ANSWER)
            || label.chars().count() > MAX_RESPONSE_CHARS
            || label.chars().any(char::is_control)
        {
            return RecoveryResponse::NoAnswer;
        }
        RecoveryResponse::Label(label.to_string())
    }
}

/// Something that can suggest a label for a masked window.
pub trait ContextRecovery: Send + Sync {
    fn name(&self) -> &'static str;
    fn recover(&self, request: &RecoveryRequest) -> Result<RecoveryResponse, RecoveryError>;
}

/// Always answers "no answer"; labels fall back to placeholders.
pub struct NoRecovery;

impl ContextRecovery for NoRecovery {
    fn name(&self) -> &'static str {
        "none"
    }

    fn recover(&self, _request: &RecoveryRequest) -> Result<RecoveryResponse, RecoveryError> {
        Ok(RecoveryResponse::NoAnswer)
    }
}

/// Runs an external program per request: the request as JSON on stdin, the
/// label (or `NONE`) on stdout.
pub struct CommandRecovery {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRecovery {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self, RecoveryError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RecoveryError::Unavailable("empty recovery command".to_string()))?;
        Ok(CommandRecovery {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    /// Kill the provider once the deadline has passed. The pipe threads are
    /// left to finish on their own when the pipes close.
    fn give_up(&self, child: &mut Child) -> RecoveryError {
        let _ = child.kill();
        let _ = child.wait();
        debug!(program = %self.program, timeout_ms = self.timeout.as_millis() as u64, "recovery provider killed");
        RecoveryError::Timeout(self.timeout.as_millis() as u64)
    }
}

impl ContextRecovery for CommandRecovery {
    fn name(&self) -> &'static str {
        "command"
    }

    fn recover(&self, request: &RecoveryRequest) -> Result<RecoveryResponse, RecoveryError> {
        let payload = serde_json::to_vec(request).map_err(|e| RecoveryError::Failed(e.to_string()))?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RecoveryError::Unavailable(format!("{}: {}", self.program, e)))?;

        let deadline = Instant::now() + self.timeout;

        // The provider may never read its input; the write must not block the deadline.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let result = stdin.write_all(&payload);
                drop(stdin);
                result
            })
        });
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecoveryError::Failed("stdout not captured".to_string()))?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut out = String::new();
            let _ = tx.send(stdout.read_to_string(&mut out).map(|_| out));
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                return Err(self.give_up(&mut child));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match rx.recv_timeout(remaining) {
            Ok(read) => read?,
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(self.give_up(&mut child)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(RecoveryError::Failed("stdout reader stopped".to_string()));
            }
        };
        if let Some(writer) = writer.filter(|w| w.is_finished()) {
            // A provider that exits without reading its input is not an error.
            if let Ok(Err(e)) = writer.join() {
                debug!(error = %e, "recovery provider closed stdin early");
            }
        }
        if !status.success() {
            return Err(RecoveryError::Failed(format!("exited with {}", status)));
        }
        Ok(RecoveryResponse::parse(&output))
    }
}

/// Pick the collaborator the configuration asks for.
pub fn provider_from_config(config: &RecoveryConfig) -> Result<Arc<dyn ContextRecovery>, RecoveryError> {
    match config.provider {
        RecoveryProvider::None => Ok(Arc::new(NoRecovery)),
        RecoveryProvider::Command => Ok(Arc::new(CommandRecovery::new(
            &config.command,
            Duration::from_millis(config.timeout_ms),
        )?)),
    }
}

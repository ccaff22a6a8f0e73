//! Per-table issues collected during a run.
//!
//! Errors that only affect one table or schema (an unmapped column type, a
//! foreign key to a table missing from the document) are recorded here and
//! the run carries on with the siblings. Disabled constraints are recorded
//! too, so the operator can audit them without grepping the output.

use crate::error::NormalizeError;
use crate::schema::DisableReason;
use serde::Serialize;
use std::fmt;

/// Issue severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// One recorded issue; names are the original (pre-normalization) ones
#[derive(Debug, Clone, Serialize)]
pub struct TableIssue {
    pub code: &'static str,
    pub severity: Severity,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub message: String,
}

impl TableIssue {
    /// Issue for a per-table or per-schema error
    pub fn from_error(schema: &str, table: Option<&str>, err: &NormalizeError) -> Self {
        let code = match err {
            NormalizeError::MissingTable { .. } => "missing-table",
            NormalizeError::UnsupportedType { .. } => "unsupported-type",
            NormalizeError::MissingTsvColumn { .. } => "missing-tsv-column",
            _ => "error",
        };
        Self {
            code,
            severity: Severity::Error,
            schema: schema.to_string(),
            table: table.map(str::to_string),
            message: err.to_string(),
        }
    }

    /// Warning for a foreign key that was disabled
    pub fn disabled(schema: &str, table: &str, constraint: &str, reason: DisableReason) -> Self {
        Self {
            code: "disabled-constraint",
            severity: Severity::Warning,
            schema: schema.to_string(),
            table: Some(table.to_string()),
            message: format!("foreign key {constraint} disabled ({reason})"),
        }
    }
}

impl fmt::Display for TableIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] schema={}", self.severity, self.code, self.schema)?;
        if let Some(ref table) = self.table {
            write!(f, " table={}", table)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Collects issues for one run
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Vec<TableIssue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: TableIssue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[TableIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<TableIssue> {
        self.issues
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }
}

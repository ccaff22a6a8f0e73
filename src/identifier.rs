//! Identifier normalization.
//!
//! Maps raw schema/table/column/constraint names onto identifiers every
//! supported target dialect accepts:
//! - lowercased, with the three Norwegian letters folded to ASCII digraphs
//! - reserved words suffixed with `_`
//! - names longer than [`MAX_IDENTIFIER_LENGTH`] truncated and suffixed with
//!   `_<N>_`, where `N` comes from a per-category run counter

use crate::error::{NormalizeError, Result};
use ahash::AHashSet;

/// Longest identifier accepted by the most restrictive supported dialect
pub const MAX_IDENTIFIER_LENGTH: usize = 29;

/// Give up re-suffixing after this many attempts
const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

const FOLDS: [(char, &str); 3] = [('æ', "ae"), ('ø', "oe"), ('å', "aa")];

/// Reserved words of ISO SQL, Oracle, PostgreSQL and SQLite that show up as
/// table or column names in real exports.
pub const DEFAULT_ILLEGAL_TERMS: &[&str] = &[
    "access", "add", "all", "alter", "and", "any", "as", "asc", "audit", "between", "by",
    "char", "check", "cluster", "column", "comment", "compress", "connect", "create",
    "current", "date", "decimal", "default", "delete", "desc", "distinct", "drop", "else",
    "exclusive", "exists", "file", "float", "for", "from", "grant", "group", "having",
    "identified", "immediate", "in", "increment", "index", "initial", "insert", "integer",
    "intersect", "into", "is", "key", "level", "like", "limit", "lock", "long", "maxextents",
    "minus", "mode", "modify", "noaudit", "nocompress", "not", "nowait", "null", "number",
    "of", "offline", "offset", "on", "online", "option", "or", "order", "pctfree", "primary",
    "prior", "public", "raw", "references", "rename", "resource", "row", "rowid", "rownum",
    "rows", "select", "session", "set", "share", "size", "smallint", "start", "successful",
    "synonym", "sysdate", "table", "then", "time", "timestamp", "to", "trigger", "uid",
    "union", "unique", "update", "user", "validate", "values", "varchar", "varchar2", "view",
    "whenever", "where", "with",
];

/// The built-in illegal-term set
pub fn default_illegal_terms() -> AHashSet<String> {
    DEFAULT_ILLEGAL_TERMS.iter().map(|t| t.to_string()).collect()
}

/// Kind of identifier being renamed; each kind has its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameCategory {
    Table,
    Column,
    Constraint,
}

impl std::fmt::Display for NameCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameCategory::Table => write!(f, "table"),
            NameCategory::Column => write!(f, "column"),
            NameCategory::Constraint => write!(f, "constraint"),
        }
    }
}

/// Rename state owned by one normalization run.
#[derive(Debug, Default)]
pub struct NormalizationContext {
    illegal_terms: AHashSet<String>,
    table_counter: u32,
    column_counter: u32,
    constraint_counter: u32,
}

impl NormalizationContext {
    /// Create a context with the given illegal terms (compared lowercased)
    pub fn new(illegal_terms: AHashSet<String>) -> Self {
        Self {
            illegal_terms: illegal_terms
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
            ..Default::default()
        }
    }

    /// Current counter value for a category
    pub fn counter(&self, category: NameCategory) -> u32 {
        match category {
            NameCategory::Table => self.table_counter,
            NameCategory::Column => self.column_counter,
            NameCategory::Constraint => self.constraint_counter,
        }
    }

    fn counter_mut(&mut self, category: NameCategory) -> &mut u32 {
        match category {
            NameCategory::Table => &mut self.table_counter,
            NameCategory::Column => &mut self.column_counter,
            NameCategory::Constraint => &mut self.constraint_counter,
        }
    }

    /// Normalize a name without checking it against other names
    pub fn normalize(&mut self, name: &str, category: NameCategory) -> String {
        let terms = &self.illegal_terms;
        let counter = match category {
            NameCategory::Table => &mut self.table_counter,
            NameCategory::Column => &mut self.column_counter,
            NameCategory::Constraint => &mut self.constraint_counter,
        };
        normalize(name, terms, counter)
    }

    /// Normalize a name and make it unique within `taken`, inserting the
    /// result. `scope` only feeds the error message.
    pub fn normalize_unique(
        &mut self,
        name: &str,
        category: NameCategory,
        taken: &mut AHashSet<String>,
        scope: &str,
    ) -> Result<String> {
        let base = self.normalize(name, category);
        let mut candidate = base.clone();
        let mut attempts = 0;

        while taken.contains(&candidate) {
            attempts += 1;
            if attempts > MAX_COLLISION_ATTEMPTS {
                return Err(NormalizeError::IdentifierCollisionUnresolved {
                    name: name.to_string(),
                    scope: scope.to_string(),
                });
            }
            let counter = self.counter_mut(category);
            *counter += 1;
            candidate = with_suffix(&base, *counter);
        }

        taken.insert(candidate.clone());
        Ok(candidate)
    }
}

/// Lowercase and fold æ/ø/å into ASCII digraphs
pub fn fold(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    for ch in lower.chars() {
        match FOLDS.iter().find(|(c, _)| *c == ch) {
            Some((_, digraph)) => out.push_str(digraph),
            None => out.push(ch),
        }
    }
    out
}

/// Normalize one identifier.
///
/// The counter is only advanced when a name has to be truncated.
pub fn normalize(name: &str, illegal_terms: &AHashSet<String>, counter: &mut u32) -> String {
    let folded = fold(name);
    let named = if illegal_terms.contains(&folded) {
        format!("{folded}_")
    } else {
        folded
    };

    if named.chars().count() > MAX_IDENTIFIER_LENGTH {
        *counter += 1;
        with_suffix(&named, *counter)
    } else {
        named
    }
}

/// Truncate `name` and append `_<n>_` so the result fits the length cap
pub fn with_suffix(name: &str, n: u32) -> String {
    let suffix = format!("_{n}_");
    let keep = MAX_IDENTIFIER_LENGTH.saturating_sub(suffix.len());
    let prefix: String = name.chars().take(keep).collect();
    format!("{prefix}{suffix}")
}

//! Schema document model for normalization runs.
//!
//! This module provides:
//! - Data models for table, column, index and foreign key definitions
//! - Reading and writing the `metadata.xml` schema report
//! - Dependency graph construction with topological sorting
//! - Row reordering for self-referencing tables
//! - DDL and SQL*Loader control file generation

mod ddl;
mod graph;
mod rows;
mod xml;

pub use ddl::*;
pub use graph::*;
pub use rows::*;
pub use xml::{load_document, parse_document, render_document, save_document};

use std::fmt;

/// Schema label used when a table-def carries no schema
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

/// Prefix marking a foreign key that is kept for audit but never enforced
pub const DISABLED_PREFIX: &str = "_disabled_";

/// Index of a table within a [`SchemaDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Column-level foreign key pointer (`column-def/references`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnReference {
    pub table_name: String,
    pub column_name: String,
    pub constraint_name: Option<String>,
}

/// Descriptive column fields carried through unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMeta {
    pub position: Option<String>,
    pub data_type: Option<String>,
    pub digits: Option<String>,
    pub nullable: Option<String>,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

/// Column definition within a table
#[derive(Debug, Clone, Default)]
pub struct ColumnDef {
    /// Current (normalized after a run) column name
    pub name: String,
    /// Name before normalization, once recorded
    pub original_name: Option<String>,
    /// JDBC type code
    pub type_code: i32,
    /// Declared size
    pub size: i64,
    /// Whether this column is part of the primary key
    pub is_primary_key: bool,
    /// Direct column-level reference, if any
    pub references: Option<ColumnReference>,
    pub meta: ColumnMeta,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_code: i32, size: i64) -> Self {
        Self {
            name: name.into(),
            type_code,
            size,
            ..Default::default()
        }
    }

    /// Name as it appears in the source database
    pub fn original(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }
}

/// Index definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub columns: Vec<String>,
}

/// Table-level foreign key constraint
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyDef {
    /// Constraint name, prefixed with [`DISABLED_PREFIX`] when disabled
    pub name: String,
    /// Name before normalization, once recorded
    pub original_name: Option<String>,
    /// Referenced table name
    pub target_table: String,
    /// Referenced schema (owner's schema when absent)
    pub target_schema: Option<String>,
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
}

impl ForeignKeyDef {
    /// Name as it appears in the source database
    pub fn original(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_disabled(&self) -> bool {
        self.name.starts_with(DISABLED_PREFIX)
    }

    /// Mark this constraint disabled; a no-op if it already is
    pub fn disable(&mut self) {
        if !self.is_disabled() {
            self.name = format!("{DISABLED_PREFIX}{}", self.name);
        }
    }

    /// Whether this key points back at its own table
    pub fn is_self_reference(&self, owner: &TableDef) -> bool {
        self.target_table.eq_ignore_ascii_case(&owner.name)
            && self
                .target_schema
                .as_deref()
                .map_or(true, |s| s.eq_ignore_ascii_case(&owner.schema))
    }
}

/// Complete table definition
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    /// Current (normalized after a run) table name
    pub name: String,
    /// Name before normalization, once recorded
    pub original_name: Option<String>,
    /// Owning schema
    pub schema: String,
    /// Empty or excluded table, skipped by every downstream step
    pub disposed: bool,
    pub primary_key_name: Option<String>,
    /// Column definitions in order
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    /// Position in the schema's dependency order
    pub dep_position: Option<usize>,
    pub catalog: Option<String>,
    pub comment: Option<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            ..Default::default()
        }
    }

    /// Name as it appears in the source database
    pub fn original(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }

    /// Get a column by original or current name (see [`best_match`])
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        let names: Vec<(&str, &str)> = self
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.original()))
            .collect();
        best_match(&names, name).and_then(|i| self.columns.get(i))
    }

    /// Primary key columns in key order.
    ///
    /// Uses the primary-key index when present, otherwise the column flags
    /// in column order.
    pub fn primary_key_columns(&self) -> Vec<String> {
        if let Some(idx) = self
            .indexes
            .iter()
            .find(|i| i.is_primary_key && !i.columns.is_empty())
        {
            return idx.columns.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Column sets of unique, non-primary-key indexes.
    ///
    /// First occurrence in document order wins; sets equal to the primary
    /// key and repeated sets are dropped.
    pub fn unique_column_sets(&self) -> Vec<Vec<String>> {
        let pk = lowered(&self.primary_key_columns());
        let mut seen: Vec<Vec<String>> = Vec::new();
        let mut sets = Vec::new();

        for idx in &self.indexes {
            if !idx.is_unique || idx.is_primary_key || idx.columns.is_empty() {
                continue;
            }
            let key = lowered(&idx.columns);
            if key == pk || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            sets.push(idx.columns.clone());
        }

        sets
    }

    /// Enabled foreign keys pointing back at this table
    pub fn self_references(&self) -> Vec<&ForeignKeyDef> {
        self.foreign_keys
            .iter()
            .filter(|fk| !fk.is_disabled() && fk.is_self_reference(self))
            .collect()
    }
}

/// Position of the entry `name` refers to, given `(current, original)` pairs.
///
/// Exact matches win over case-insensitive ones, and original names over
/// current ones, so names that differ only by case stay distinct.
pub(crate) fn best_match(names: &[(&str, &str)], name: &str) -> Option<usize> {
    names
        .iter()
        .position(|&(_, original)| original == name)
        .or_else(|| names.iter().position(|&(current, _)| current == name))
        .or_else(|| names.iter().position(|&(current, _)| current.eq_ignore_ascii_case(name)))
        .or_else(|| names.iter().position(|&(_, original)| original.eq_ignore_ascii_case(name)))
}

/// Lowercased, sorted copy of a column list for set comparison
pub(crate) fn lowered(columns: &[String]) -> Vec<String> {
    let mut out: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    out.sort();
    out
}

/// The parsed schema report: every table of every schema, in document order
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    pub tables: Vec<TableDef>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, returning its ID
    pub fn add_table(&mut self, table: TableDef) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(table);
        id
    }

    pub fn table(&self, id: TableId) -> Option<&TableDef> {
        self.tables.get(id.0 as usize)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut TableDef> {
        self.tables.get_mut(id.0 as usize)
    }

    /// Schema names in order of first appearance
    pub fn schemas(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for table in &self.tables {
            if !out.iter().any(|s| s.eq_ignore_ascii_case(&table.schema)) {
                out.push(table.schema.clone());
            }
        }
        out
    }

    /// IDs of the tables belonging to a schema, in document order
    pub fn table_ids_in(&self, schema: &str) -> Vec<TableId> {
        self.tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.schema.eq_ignore_ascii_case(schema))
            .map(|(i, _)| TableId(i as u32))
            .collect()
    }

    /// Find a table by schema and original or current name (see [`best_match`])
    pub fn find_table(&self, schema: &str, name: &str) -> Option<TableId> {
        let ids = self.table_ids_in(schema);
        let names: Vec<(&str, &str)> = ids
            .iter()
            .filter_map(|id| self.table(*id))
            .map(|t| (t.name.as_str(), t.original()))
            .collect();
        best_match(&names, name).and_then(|i| ids.get(i).copied())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter()
    }
}

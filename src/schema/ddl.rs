//! DDL and SQL*Loader control file generation.
//!
//! Statements are assembled per schema from the (already normalized and
//! ordered) document:
//! - column fragments come from the [`TypeMapper`]
//! - primary key and unique columns are always `NOT NULL`
//! - constraint clauses are emitted only for enabled foreign keys whose
//!   target is part of the same generated script

use super::{lowered, SchemaDocument, TableDef, TableId, TableOrder};
use crate::error::{NormalizeError, Result};
use crate::typemap::{Dialect, TypeMapper};
use ahash::{AHashMap, AHashSet};
use tracing::debug;

/// DDL generation options
#[derive(Debug, Clone, Copy)]
pub struct DdlOptions {
    /// Emit PRIMARY KEY / UNIQUE / FOREIGN KEY clauses
    pub include_constraints: bool,
    /// Prefix each table with `DROP TABLE IF EXISTS`
    pub drop_existing: bool,
    pub dialect: Dialect,
}

impl Default for DdlOptions {
    fn default() -> Self {
        Self {
            include_constraints: true,
            drop_existing: false,
            dialect: Dialect::Iso,
        }
    }
}

/// Generated DDL for one schema
#[derive(Debug, Default)]
pub struct SchemaDdl {
    pub schema: String,
    /// Concatenated statements in dependency order
    pub script: String,
    /// Tables with a statement in `script`, in order
    pub tables: Vec<TableId>,
    /// Tables left out because a column type could not be mapped
    pub failed: Vec<(TableId, NormalizeError)>,
}

/// One mapped column line
struct ColumnFragment {
    name: String,
    sql_type: String,
}

/// Map every column of a table, reporting the first unmapped type
fn column_fragments(table: &TableDef, dialect: Dialect) -> Result<Vec<ColumnFragment>> {
    table
        .columns
        .iter()
        .map(|col| {
            TypeMapper::map_type(col.type_code, col.size, dialect)
                .map(|sql_type| ColumnFragment {
                    name: col.name.clone(),
                    sql_type,
                })
                .map_err(|e| e.for_column(table.original(), col.original()))
        })
        .collect()
}

/// Resolve a foreign key's target among the tables of `included`
fn resolve_target(
    doc: &SchemaDocument,
    owner: &TableDef,
    target_schema: Option<&str>,
    target_table: &str,
    included: &AHashSet<TableId>,
) -> Option<TableId> {
    let schema = target_schema.unwrap_or(&owner.schema);
    doc.find_table(schema, target_table)
        .filter(|id| included.contains(id))
}

/// Extra unique column sets needed so every emitted foreign key references
/// a primary key or unique set, keyed by target table.
///
/// Sets are collected in dependency order of the referencing tables and
/// deduplicated case-insensitively.
pub fn referenced_unique_sets(
    doc: &SchemaDocument,
    tables: &[TableId],
) -> AHashMap<TableId, Vec<Vec<String>>> {
    let included: AHashSet<TableId> = tables.iter().copied().collect();
    let mut extra: AHashMap<TableId, Vec<Vec<String>>> = AHashMap::new();

    for id in tables {
        let Some(table) = doc.table(*id) else { continue };
        for fk in table.foreign_keys.iter().filter(|fk| !fk.is_disabled()) {
            let Some(target_id) = resolve_target(
                doc,
                table,
                fk.target_schema.as_deref(),
                &fk.target_table,
                &included,
            ) else {
                continue;
            };
            let Some(target) = doc.table(target_id) else { continue };

            let key = lowered(&fk.target_columns);
            if key.is_empty()
                || key == lowered(&target.primary_key_columns())
                || target
                    .unique_column_sets()
                    .iter()
                    .any(|set| lowered(set) == key)
            {
                continue;
            }

            let sets = extra.entry(target_id).or_default();
            if !sets.iter().any(|set| lowered(set) == key) {
                debug!(
                    table = %target.name,
                    columns = ?fk.target_columns,
                    "adding unique clause for referenced columns"
                );
                sets.push(fk.target_columns.clone());
            }
        }
    }

    extra
}

/// Build the statement for one table.
///
/// `included` is the set of tables created by the same script; foreign keys
/// to anything else are left out. `extra_unique` holds additional unique
/// sets from [`referenced_unique_sets`].
pub fn table_ddl(
    doc: &SchemaDocument,
    id: TableId,
    included: &AHashSet<TableId>,
    extra_unique: &[Vec<String>],
    options: &DdlOptions,
) -> Result<String> {
    let table = doc
        .table(id)
        .ok_or_else(|| NormalizeError::malformed("table-def", id.to_string()))?;
    let fragments = column_fragments(table, options.dialect)?;

    let primary_key = table.primary_key_columns();
    let mut unique_sets = table.unique_column_sets();
    for set in extra_unique {
        if !unique_sets.iter().any(|s| lowered(s) == lowered(set)) {
            unique_sets.push(set.clone());
        }
    }

    let not_null: AHashSet<String> = primary_key
        .iter()
        .chain(unique_sets.iter().flatten())
        .map(|c| c.to_lowercase())
        .chain(
            table
                .columns
                .iter()
                .filter(|c| c.is_primary_key)
                .map(|c| c.name.to_lowercase()),
        )
        .collect();

    let mut lines: Vec<String> = fragments
        .iter()
        .map(|f| {
            if not_null.contains(&f.name.to_lowercase()) {
                format!("  {} {} NOT NULL", f.name, f.sql_type)
            } else {
                format!("  {} {}", f.name, f.sql_type)
            }
        })
        .collect();

    if options.include_constraints {
        if !primary_key.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", primary_key.join(", ")));
        }
        for set in &unique_sets {
            lines.push(format!("  UNIQUE ({})", set.join(", ")));
        }
        for fk in table.foreign_keys.iter().filter(|fk| !fk.is_disabled()) {
            let Some(target_id) = resolve_target(
                doc,
                table,
                fk.target_schema.as_deref(),
                &fk.target_table,
                included,
            ) else {
                continue;
            };
            let Some(target) = doc.table(target_id) else { continue };
            lines.push(format!(
                "  CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                fk.name,
                fk.source_columns.join(", "),
                target.name,
                fk.target_columns.join(", ")
            ));
        }
    }

    let mut out = String::new();
    if options.drop_existing {
        out.push_str(&format!("DROP TABLE IF EXISTS {};\n", table.name));
    }
    out.push_str(&format!("CREATE TABLE {} (\n", table.name));
    out.push_str(&lines.join(",\n"));
    out.push_str("\n);\n");
    Ok(out)
}

/// Generate the DDL script for one ordered schema.
///
/// A table whose columns cannot all be mapped is recorded in
/// [`SchemaDdl::failed`] and left out, together with foreign keys pointing
/// at it; its siblings are still generated.
pub fn schema_ddl(doc: &SchemaDocument, order: &TableOrder, options: &DdlOptions) -> SchemaDdl {
    let mut result = SchemaDdl {
        schema: order.schema.clone(),
        ..Default::default()
    };

    let mut tables = Vec::with_capacity(order.order.len());
    for id in &order.order {
        let Some(table) = doc.table(*id) else { continue };
        match column_fragments(table, options.dialect) {
            Ok(_) => tables.push(*id),
            Err(e) => result.failed.push((*id, e)),
        }
    }

    let included: AHashSet<TableId> = tables.iter().copied().collect();
    let extra = referenced_unique_sets(doc, &tables);

    let mut statements = Vec::with_capacity(tables.len());
    for id in &tables {
        let extra_unique = extra.get(id).map(Vec::as_slice).unwrap_or(&[]);
        match table_ddl(doc, *id, &included, extra_unique, options) {
            Ok(stmt) => {
                statements.push(stmt);
                result.tables.push(*id);
            }
            Err(e) => result.failed.push((*id, e)),
        }
    }

    result.script = statements.join("\n");
    result
}

/// SQL*Loader control file for one table's TSV data file.
///
/// The data file is tab separated with a header row, named after the table.
pub fn control_file(table: &TableDef) -> Result<String> {
    let fields = column_fragments(table, Dialect::OracleCtl)?;
    let lines: Vec<String> = fields
        .iter()
        .map(|f| format!("  {} {}", f.name, f.sql_type))
        .collect();

    Ok(format!(
        "OPTIONS (SKIP=1)\n\
         LOAD DATA\n\
         CHARACTERSET UTF8\n\
         INFILE '{name}.tsv'\n\
         APPEND INTO TABLE {name}\n\
         FIELDS TERMINATED BY X'09'\n\
         TRAILING NULLCOLS\n\
         (\n{fields}\n)\n",
        name = table.name,
        fields = lines.join(",\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{order_tables, ColumnDef, ForeignKeyDef, IndexDef, DEFAULT_SCHEMA};
    use crate::typemap::sql_types::{BLOB, INTEGER, OTHER, VARCHAR};

    fn pk_column(name: &str) -> ColumnDef {
        let mut col = ColumnDef::new(name, INTEGER, 10);
        col.is_primary_key = true;
        col
    }

    fn fk(name: &str, source: &str, target: &str, target_col: &str) -> ForeignKeyDef {
        ForeignKeyDef {
            name: name.into(),
            target_table: target.into(),
            source_columns: vec![source.into()],
            target_columns: vec![target_col.into()],
            ..Default::default()
        }
    }

    fn sample_doc() -> SchemaDocument {
        let mut doc = SchemaDocument::new();

        let mut unit = TableDef::new("org_unit", DEFAULT_SCHEMA);
        unit.columns.push(pk_column("id"));
        unit.columns.push(ColumnDef::new("parent_id", INTEGER, 10));
        unit.columns.push(ColumnDef::new("code", VARCHAR, 20));
        unit.foreign_keys.push(fk("fk_unit_parent", "parent_id", "org_unit", "id"));

        let mut person = TableDef::new("person", DEFAULT_SCHEMA);
        person.columns.push(pk_column("id"));
        person.columns.push(ColumnDef::new("unit_id", INTEGER, 10));
        person.columns.push(ColumnDef::new("name", VARCHAR, 5000));
        person.foreign_keys.push(fk("fk_person_unit", "unit_id", "org_unit", "id"));

        doc.add_table(person);
        doc.add_table(unit);
        doc
    }

    #[test]
    fn test_schema_ddl_in_dependency_order() {
        let doc = sample_doc();
        let order = order_tables(&doc, DEFAULT_SCHEMA, &AHashSet::new()).unwrap();
        let ddl = schema_ddl(&doc, &order, &DdlOptions::default());

        assert!(ddl.failed.is_empty());
        let unit_pos = ddl.script.find("CREATE TABLE org_unit").unwrap();
        let person_pos = ddl.script.find("CREATE TABLE person").unwrap();
        assert!(unit_pos < person_pos);
        assert!(ddl.script.contains(
            "CONSTRAINT fk_person_unit FOREIGN KEY (unit_id) REFERENCES org_unit (id)"
        ));
        assert!(ddl.script.contains(
            "CONSTRAINT fk_unit_parent FOREIGN KEY (parent_id) REFERENCES org_unit (id)"
        ));
        assert!(ddl.script.contains("  id integer NOT NULL"));
        assert!(ddl.script.contains("  name clob"));
        assert!(ddl.script.contains("  PRIMARY KEY (id)"));
    }

    #[test]
    fn test_without_constraints_and_with_drop() {
        let doc = sample_doc();
        let order = order_tables(&doc, DEFAULT_SCHEMA, &AHashSet::new()).unwrap();
        let options = DdlOptions {
            include_constraints: false,
            drop_existing: true,
            dialect: Dialect::Sqlite,
        };
        let ddl = schema_ddl(&doc, &order, &options);

        assert!(ddl.script.starts_with("DROP TABLE IF EXISTS org_unit;\nCREATE TABLE org_unit ("));
        assert!(!ddl.script.contains("FOREIGN KEY"));
        assert!(!ddl.script.contains("PRIMARY KEY"));
        assert!(ddl.script.contains("  id integer NOT NULL"));
        assert!(ddl.script.contains("  name text"));
    }

    #[test]
    fn test_disabled_fk_not_emitted() {
        let mut doc = sample_doc();
        doc.tables[0].foreign_keys[0].disable();
        let order = order_tables(&doc, DEFAULT_SCHEMA, &AHashSet::new()).unwrap();
        let ddl = schema_ddl(&doc, &order, &DdlOptions::default());
        assert!(!ddl.script.contains("fk_person_unit"));
    }

    #[test]
    fn test_unique_index_and_referenced_columns() {
        let mut doc = sample_doc();
        doc.tables[1].indexes.push(IndexDef {
            name: "pk_org_unit".into(),
            is_unique: true,
            is_primary_key: true,
            columns: vec!["id".into()],
        });
        doc.tables[0].columns.push(ColumnDef::new("unit_code", VARCHAR, 20));
        doc.tables[0]
            .foreign_keys
            .push(fk("fk_person_code", "unit_code", "org_unit", "code"));

        let order = order_tables(&doc, DEFAULT_SCHEMA, &AHashSet::new()).unwrap();
        let ddl = schema_ddl(&doc, &order, &DdlOptions::default());
        assert!(ddl.script.contains("  UNIQUE (code)"));
        assert!(ddl.script.contains("  code varchar(20) NOT NULL"));
        assert_eq!(ddl.script.matches("UNIQUE (code)").count(), 1);
    }

    #[test]
    fn test_unsupported_type_fails_only_that_table() {
        let mut doc = sample_doc();
        doc.tables[1].original_name = Some("ORG_UNIT".into());
        doc.tables[1].columns[2].original_name = Some("GEOM".into());
        doc.tables[1].columns[2].type_code = OTHER;

        let order = order_tables(&doc, DEFAULT_SCHEMA, &AHashSet::new()).unwrap();
        let ddl = schema_ddl(&doc, &order, &DdlOptions::default());

        assert_eq!(ddl.failed.len(), 1);
        assert!(ddl.failed[0].1.to_string().contains("ORG_UNIT.GEOM"));
        assert!(ddl.script.contains("CREATE TABLE person"));
        assert!(!ddl.script.contains("REFERENCES org_unit"));
    }

    #[test]
    fn test_control_file() {
        let doc = sample_doc();
        let ctl = control_file(&doc.tables[0]).unwrap();
        assert!(ctl.contains("INFILE 'person.tsv'"));
        assert!(ctl.contains("APPEND INTO TABLE person"));
        assert!(ctl.contains("  id integer external,"));
        assert!(ctl.contains("  name char(1000000)\n)"));

        let mut blob_table = TableDef::new("doc", DEFAULT_SCHEMA);
        blob_table.columns.push(ColumnDef::new("body", BLOB, 0));
        assert!(control_file(&blob_table).is_err());
    }
}

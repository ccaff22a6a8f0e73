//! Reading and writing the `metadata.xml` schema report.
//!
//! The XML is deserialized into loose mirror structs (every element
//! optional), validated into the [`SchemaDocument`] model, and written back
//! by serializing a fresh mirror built from the model.

use super::{
    ColumnDef, ColumnMeta, ColumnReference, ForeignKeyDef, IndexDef, SchemaDocument, TableDef,
    DEFAULT_SCHEMA,
};
use crate::error::{NormalizeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "schema-report")]
struct SchemaReportXml {
    #[serde(rename = "table-def", default)]
    tables: Vec<TableDefXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableDefXml {
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name_attr: Option<String>,
    #[serde(rename = "table-catalog", default, skip_serializing_if = "Option::is_none")]
    catalog: Option<String>,
    #[serde(rename = "table-schema", default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(rename = "table-name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "original-table-name", default, skip_serializing_if = "Option::is_none")]
    original_name: Option<String>,
    #[serde(rename = "disposed", default, skip_serializing_if = "Option::is_none")]
    disposed: Option<String>,
    #[serde(rename = "dep-position", default, skip_serializing_if = "Option::is_none")]
    dep_position: Option<String>,
    #[serde(rename = "table-comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(rename = "primary-key-name", default, skip_serializing_if = "Option::is_none")]
    primary_key_name: Option<String>,
    #[serde(rename = "column-def", default)]
    columns: Vec<ColumnDefXml>,
    #[serde(rename = "index-def", default)]
    indexes: Vec<IndexDefXml>,
    #[serde(rename = "foreign-keys", default, skip_serializing_if = "Option::is_none")]
    foreign_keys: Option<ForeignKeysXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ColumnDefXml {
    #[serde(rename = "column-name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "original-column-name", default, skip_serializing_if = "Option::is_none")]
    original_name: Option<String>,
    #[serde(rename = "dbms-position", default, skip_serializing_if = "Option::is_none")]
    position: Option<String>,
    #[serde(rename = "java-sql-type", default, skip_serializing_if = "Option::is_none")]
    java_sql_type: Option<String>,
    #[serde(rename = "dbms-data-type", default, skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
    #[serde(rename = "dbms-data-size", default, skip_serializing_if = "Option::is_none")]
    data_size: Option<String>,
    #[serde(rename = "dbms-data-digits", default, skip_serializing_if = "Option::is_none")]
    digits: Option<String>,
    #[serde(rename = "primary-key", default, skip_serializing_if = "Option::is_none")]
    primary_key: Option<String>,
    #[serde(rename = "nullable", default, skip_serializing_if = "Option::is_none")]
    nullable: Option<String>,
    #[serde(rename = "default-value", default, skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
    #[serde(rename = "comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(rename = "references", default, skip_serializing_if = "Option::is_none")]
    references: Option<ColumnRefXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ColumnRefXml {
    #[serde(rename = "table-name", default, skip_serializing_if = "Option::is_none")]
    table_name: Option<String>,
    #[serde(rename = "column-name", default, skip_serializing_if = "Option::is_none")]
    column_name: Option<String>,
    #[serde(rename = "constraint-name", default, skip_serializing_if = "Option::is_none")]
    constraint_name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDefXml {
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "unique", default, skip_serializing_if = "Option::is_none")]
    unique: Option<String>,
    #[serde(rename = "primary-key", default, skip_serializing_if = "Option::is_none")]
    primary_key: Option<String>,
    #[serde(rename = "column-list", default)]
    column_list: IndexColumnsXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexColumnsXml {
    #[serde(rename = "column", default)]
    columns: Vec<IndexColumnXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexColumnXml {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ForeignKeysXml {
    #[serde(rename = "foreign-key", default)]
    keys: Vec<ForeignKeyXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ForeignKeyXml {
    #[serde(rename = "constraint-name", default, skip_serializing_if = "Option::is_none")]
    constraint_name: Option<String>,
    #[serde(
        rename = "original-constraint-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    original_name: Option<String>,
    #[serde(rename = "references", default, skip_serializing_if = "Option::is_none")]
    references: Option<FkTargetXml>,
    #[serde(rename = "source-columns", default)]
    source_columns: ColumnNamesXml,
    #[serde(rename = "referenced-columns", default)]
    referenced_columns: ColumnNamesXml,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FkTargetXml {
    #[serde(rename = "table-name", default, skip_serializing_if = "Option::is_none")]
    table_name: Option<String>,
    #[serde(rename = "table-schema", default, skip_serializing_if = "Option::is_none")]
    table_schema: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ColumnNamesXml {
    #[serde(rename = "column", default)]
    columns: Vec<String>,
}

/// Trimmed, non-empty text of an optional element
fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, element: &str, context: &str) -> Result<String> {
    text(value).ok_or_else(|| NormalizeError::malformed(element, context))
}

fn parse_flag(value: Option<String>, element: &str, context: &str) -> Result<bool> {
    match text(value) {
        None => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(_) => Err(NormalizeError::malformed(element, context)),
    }
}

fn parse_number<T: std::str::FromStr>(
    value: Option<String>,
    element: &str,
    context: &str,
) -> Result<Option<T>> {
    match text(value) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| NormalizeError::malformed(element, context)),
    }
}

fn flag(value: bool) -> Option<String> {
    Some(value.to_string())
}

impl TableDefXml {
    fn into_model(self, ordinal: usize) -> Result<TableDef> {
        let mut context = format!("table-def #{}", ordinal + 1);
        let name = required(self.name, "table-name", &context)?;
        context = format!("table-def #{} ({})", ordinal + 1, name);

        let columns = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.into_model(&context, i))
            .collect::<Result<Vec<_>>>()?;
        let indexes = self
            .indexes
            .into_iter()
            .map(|i| i.into_model(&context))
            .collect::<Result<Vec<_>>>()?;
        let foreign_keys = self
            .foreign_keys
            .map(|fks| fks.keys)
            .unwrap_or_default()
            .into_iter()
            .map(|fk| fk.into_model(&context))
            .collect::<Result<Vec<_>>>()?;

        Ok(TableDef {
            schema: text(self.schema).unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            original_name: text(self.original_name),
            disposed: parse_flag(self.disposed, "disposed", &context)?,
            primary_key_name: text(self.primary_key_name),
            dep_position: parse_number(self.dep_position, "dep-position", &context)?,
            catalog: text(self.catalog),
            comment: text(self.comment),
            name,
            columns,
            indexes,
            foreign_keys,
        })
    }

    fn from_model(table: &TableDef) -> Self {
        let foreign_keys = if table.foreign_keys.is_empty() {
            None
        } else {
            Some(ForeignKeysXml {
                keys: table.foreign_keys.iter().map(ForeignKeyXml::from_model).collect(),
            })
        };

        Self {
            name_attr: Some(table.name.clone()),
            catalog: table.catalog.clone(),
            schema: Some(table.schema.clone()),
            name: Some(table.name.clone()),
            original_name: table.original_name.clone(),
            disposed: flag(table.disposed),
            dep_position: table.dep_position.map(|p| p.to_string()),
            comment: table.comment.clone(),
            primary_key_name: table.primary_key_name.clone(),
            columns: table.columns.iter().map(ColumnDefXml::from_model).collect(),
            indexes: table.indexes.iter().map(IndexDefXml::from_model).collect(),
            foreign_keys,
        }
    }
}

impl ColumnDefXml {
    fn into_model(self, table_context: &str, ordinal: usize) -> Result<ColumnDef> {
        let context = format!("{table_context}, column-def #{}", ordinal + 1);
        let name = required(self.name, "column-name", &context)?;
        let context = format!("{table_context}, column {name}");
        let type_code = parse_number(self.java_sql_type, "java-sql-type", &context)?
            .ok_or_else(|| NormalizeError::malformed("java-sql-type", &context))?;

        let references = match self.references {
            Some(r) => Some(ColumnReference {
                table_name: required(r.table_name, "references/table-name", &context)?,
                column_name: required(r.column_name, "references/column-name", &context)?,
                constraint_name: text(r.constraint_name),
            }),
            None => None,
        };

        Ok(ColumnDef {
            original_name: text(self.original_name),
            type_code,
            size: parse_number(self.data_size, "dbms-data-size", &context)?.unwrap_or(0),
            is_primary_key: parse_flag(self.primary_key, "primary-key", &context)?,
            references,
            meta: ColumnMeta {
                position: text(self.position),
                data_type: text(self.data_type),
                digits: text(self.digits),
                nullable: text(self.nullable),
                default_value: text(self.default_value),
                comment: text(self.comment),
            },
            name,
        })
    }

    fn from_model(column: &ColumnDef) -> Self {
        Self {
            name: Some(column.name.clone()),
            original_name: column.original_name.clone(),
            position: column.meta.position.clone(),
            java_sql_type: Some(column.type_code.to_string()),
            data_type: column.meta.data_type.clone(),
            data_size: Some(column.size.to_string()),
            digits: column.meta.digits.clone(),
            primary_key: flag(column.is_primary_key),
            nullable: column.meta.nullable.clone(),
            default_value: column.meta.default_value.clone(),
            comment: column.meta.comment.clone(),
            references: column.references.as_ref().map(|r| ColumnRefXml {
                table_name: Some(r.table_name.clone()),
                column_name: Some(r.column_name.clone()),
                constraint_name: r.constraint_name.clone(),
            }),
        }
    }
}

impl IndexDefXml {
    fn into_model(self, context: &str) -> Result<IndexDef> {
        Ok(IndexDef {
            name: text(self.name).unwrap_or_default(),
            is_unique: parse_flag(self.unique, "index-def/unique", context)?,
            is_primary_key: parse_flag(self.primary_key, "index-def/primary-key", context)?,
            columns: self
                .column_list
                .columns
                .into_iter()
                .filter_map(|c| text(Some(c.name)))
                .collect(),
        })
    }

    fn from_model(index: &IndexDef) -> Self {
        Self {
            name: Some(index.name.clone()).filter(|n| !n.is_empty()),
            unique: flag(index.is_unique),
            primary_key: flag(index.is_primary_key),
            column_list: IndexColumnsXml {
                columns: index
                    .columns
                    .iter()
                    .map(|c| IndexColumnXml { name: c.clone() })
                    .collect(),
            },
        }
    }
}

impl ForeignKeyXml {
    fn into_model(self, table_context: &str) -> Result<ForeignKeyDef> {
        let name = required(self.constraint_name, "foreign-key/constraint-name", table_context)?;
        let context = format!("{table_context}, foreign key {name}");
        let target = self
            .references
            .ok_or_else(|| NormalizeError::malformed("foreign-key/references", &context))?;

        let source_columns: Vec<String> = self
            .source_columns
            .columns
            .into_iter()
            .filter_map(|c| text(Some(c)))
            .collect();
        let target_columns: Vec<String> = self
            .referenced_columns
            .columns
            .into_iter()
            .filter_map(|c| text(Some(c)))
            .collect();
        if source_columns.is_empty() || source_columns.len() != target_columns.len() {
            return Err(NormalizeError::malformed(
                "source-columns/referenced-columns",
                &context,
            ));
        }

        Ok(ForeignKeyDef {
            original_name: text(self.original_name),
            target_table: required(target.table_name, "references/table-name", &context)?,
            target_schema: text(target.table_schema),
            name,
            source_columns,
            target_columns,
        })
    }

    fn from_model(fk: &ForeignKeyDef) -> Self {
        Self {
            constraint_name: Some(fk.name.clone()),
            original_name: fk.original_name.clone(),
            references: Some(FkTargetXml {
                table_name: Some(fk.target_table.clone()),
                table_schema: fk.target_schema.clone(),
            }),
            source_columns: ColumnNamesXml {
                columns: fk.source_columns.clone(),
            },
            referenced_columns: ColumnNamesXml {
                columns: fk.target_columns.clone(),
            },
        }
    }
}

/// Parse schema report XML into the document model.
///
/// `path` is only used in error messages.
pub fn parse_document(content: &str, path: &Path) -> Result<SchemaDocument> {
    let raw: SchemaReportXml =
        quick_xml::de::from_str(content).map_err(|e| NormalizeError::xml(path, e))?;

    let tables = raw
        .tables
        .into_iter()
        .enumerate()
        .map(|(i, t)| t.into_model(i))
        .collect::<Result<Vec<_>>>()?;

    Ok(SchemaDocument { tables })
}

/// Read and parse a schema report file
pub fn load_document(path: &Path) -> Result<SchemaDocument> {
    let content = fs::read_to_string(path)?;
    parse_document(&content, path)
}

/// Serialize the document model as indented XML with a UTF-8 declaration
pub fn render_document(doc: &SchemaDocument) -> Result<String> {
    let raw = SchemaReportXml {
        tables: doc.tables.iter().map(TableDefXml::from_model).collect(),
    };

    let mut body = String::new();
    let mut ser = quick_xml::se::Serializer::new(&mut body);
    ser.indent(' ', 2);
    raw.serialize(ser)
        .map_err(|e| NormalizeError::xml("<document>", e))?;

    Ok(format!("{XML_DECLARATION}\n{body}\n"))
}

/// Write the document back to `path` (UTF-8, indented)
pub fn save_document(doc: &SchemaDocument, path: &Path) -> Result<()> {
    let content = render_document(doc)?;
    fs::write(path, content)?;
    Ok(())
}

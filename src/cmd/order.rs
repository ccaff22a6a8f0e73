//! Order command - print the FK-safe table order of every schema.

use anyhow::{bail, Result};
use schema_normalizer::rewriter::{NormalizeConfig, NormalizeYamlConfig, Rewriter};
use schema_normalizer::schema::load_document;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct SchemaOrder {
    schema: String,
    tables: Vec<String>,
    disabled: Vec<String>,
}

/// Run the order command
pub fn run(
    metadata: PathBuf,
    table_list: Option<PathBuf>,
    config_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if !metadata.exists() {
        bail!("metadata file does not exist: {}", metadata.display());
    }
    if let Some(ref list) = table_list {
        if !list.exists() {
            bail!("table list does not exist: {}", list.display());
        }
    }

    let mut config = NormalizeConfig {
        metadata,
        table_list,
        dry_run: true,
        ..Default::default()
    };
    if let Some(ref path) = config_path {
        let file = NormalizeYamlConfig::load(path)?;
        config.apply_file(&file, path.parent().unwrap_or_else(|| Path::new(".")))?;
    }

    let mut rewriter = Rewriter::new(&config);
    let mut doc = load_document(&config.metadata)?;

    // Order by the names a normalize run would produce
    if !rewriter.already_normalized() {
        rewriter.rename(&mut doc, &config.data_dir())?;
    }
    let excluded = rewriter.excluded_tables(&doc)?;
    let orders = rewriter.order(&mut doc, &excluded)?;

    for issue in rewriter.issues() {
        eprintln!("{}", issue);
    }

    let result: Vec<SchemaOrder> = orders
        .iter()
        .map(|order| SchemaOrder {
            schema: order.schema.clone(),
            tables: order.names(&doc),
            disabled: order
                .disabled
                .iter()
                .filter_map(|d| {
                    doc.table(d.table)
                        .and_then(|t| t.foreign_keys.get(d.fk_index))
                })
                .map(|fk| fk.name.clone())
                .collect(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for schema in &result {
        println!("# {}", schema.schema);
        for table in &schema.tables {
            println!("{}", table);
        }
        if !schema.disabled.is_empty() {
            eprintln!(
                "Schema {}: {} constraints disabled: {}",
                schema.schema,
                schema.disabled.len(),
                schema.disabled.join(", ")
            );
        }
    }

    Ok(())
}

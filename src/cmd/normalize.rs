//! Normalize command - rewrite a schema document and derive order, DDL and data renames.

use anyhow::{bail, Result};
use schema_normalizer::rewriter::{normalize, NormalizeConfig, NormalizeReport, NormalizeYamlConfig};
use schema_normalizer::typemap::Dialect;
use std::path::{Path, PathBuf};

/// Normalize command options
pub struct NormalizeArgs {
    pub metadata: PathBuf,
    pub constraints: bool,
    pub drop: bool,
    pub table_list: Option<PathBuf>,
    pub dialect: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub ctl: bool,
    pub dry_run: bool,
    pub json: bool,
    pub progress: bool,
}

/// Build the run configuration from the YAML file (if any) and the flags
pub fn build_config(args: &NormalizeArgs) -> Result<NormalizeConfig> {
    let mut config = NormalizeConfig {
        metadata: args.metadata.clone(),
        ..Default::default()
    };

    if let Some(ref path) = args.config {
        if !path.exists() {
            bail!("config file does not exist: {}", path.display());
        }
        let file = NormalizeYamlConfig::load(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.apply_file(&file, base)?;
    }

    if let Some(ref name) = args.dialect {
        let dialect: Dialect = name.parse().map_err(anyhow::Error::msg)?;
        if !dialect.supports_ddl() {
            bail!("dialect {dialect} cannot be used for DDL output; use --ctl for control files");
        }
        config.dialect = dialect;
    }
    if let Some(ref list) = args.table_list {
        if !list.exists() {
            bail!("table list does not exist: {}", list.display());
        }
        config.table_list = Some(list.clone());
    }
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir.clone();
    }
    config.include_constraints = args.constraints;
    config.drop_existing = args.drop;
    config.control_files |= args.ctl;
    config.dry_run = args.dry_run;
    config.progress = args.progress;

    Ok(config)
}

/// Run the normalize command
pub fn run(args: NormalizeArgs) -> Result<()> {
    if !args.metadata.exists() {
        bail!("metadata file does not exist: {}", args.metadata.display());
    }

    let config = build_config(&args)?;
    if !args.json {
        eprintln!("Normalizing: {}", config.metadata.display());
    }

    let report = normalize(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.has_errors() {
        bail!(
            "{} error(s) recorded; the tables and schemas they name were skipped",
            report.error_count
        );
    }

    Ok(())
}

fn print_report(report: &NormalizeReport) {
    if report.already_normalized {
        eprintln!("Document already normalized; identifiers left as they are.");
    } else {
        eprintln!(
            "Renamed {} tables, {} columns, {} constraints",
            report.renamed.tables, report.renamed.columns, report.renamed.constraints
        );
    }

    for schema in &report.schemas {
        match schema.error {
            Some(ref err) => eprintln!("Schema {}: skipped ({})", schema.schema, err),
            None => eprintln!(
                "Schema {}: {} tables ordered, {} constraints disabled",
                schema.schema,
                schema.tables.len(),
                schema.disabled_constraints
            ),
        }
        if report.dry_run {
            for (i, table) in schema.tables.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, table);
            }
        }
        for table in &schema.reordered {
            eprintln!("  rows reordered: {}", table);
        }
    }

    if !report.issues.is_empty() {
        eprintln!("\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            eprintln!("  {}", issue);
        }
    }

    if report.dry_run {
        eprintln!("\nDry run: no files written.");
    } else {
        if report.data_files_moved > 0 {
            eprintln!("Moved {} data files", report.data_files_moved);
        }
        eprintln!("Wrote {} files", report.files_written.len());
    }
}

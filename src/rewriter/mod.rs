//! Schema rewriter: the normalization pipeline for one schema document.
//!
//! A run walks through these states:
//!
//! ```text
//! Unprocessed -> PerTableRenamed -> Ordered -> DdlGenerated -> Written -> Done
//! ```
//!
//! Every in-memory stage completes before anything touches the disk, so a
//! malformed document or a fatal error never leaves partial output behind.
//! A `normalize_done` marker next to the document makes re-runs skip the
//! renaming stage and only re-derive order, DDL and control files.

mod config;
mod issues;

pub use config::{load_table_list, parse_table_list, NormalizeConfig, NormalizeYamlConfig};
pub use issues::{IssueCollector, Severity, TableIssue};

use crate::error::{NormalizeError, Result};
use crate::identifier::{NameCategory, NormalizationContext};
use crate::schema::{
    control_file, load_document, order_tables, reorder_tsv_file, save_document, schema_ddl,
    ColumnReference, DdlOptions, ForeignKeyDef, SchemaDocument, TableDef, TableId, TableOrder,
    DISABLED_PREFIX,
};
use ahash::{AHashMap, AHashSet};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker written next to the document once its data files are renamed
pub const TSV_RENAMED_MARKER: &str = "tsv_renamed_done";

/// Marker written next to the document once a run has completed
pub const NORMALIZE_DONE_MARKER: &str = "normalize_done";

/// Suffix of the per-table marker written after a data file is reordered
pub const REORDERED_MARKER_SUFFIX: &str = "_reordered_done";

/// Stage of a normalization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Unprocessed,
    PerTableRenamed,
    Ordered,
    DdlGenerated,
    Written,
    Done,
}

/// A planned data file move
#[derive(Debug, Clone, Serialize)]
pub struct TsvRename {
    /// Original table name
    pub table: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// A planned self-referencing row reorder
#[derive(Debug, Clone, Serialize)]
pub struct ReorderJob {
    pub table: String,
    pub path: PathBuf,
    /// Header names the referenced (child key) column may carry
    pub child_columns: Vec<String>,
    /// Header names the referencing (parent pointer) column may carry
    pub parent_columns: Vec<String>,
    pub marker: PathBuf,
}

/// Everything generated for one schema
#[derive(Debug, Clone, Default)]
pub struct SchemaOutput {
    pub schema: String,
    /// Normalized table names in dependency order
    pub tables: Vec<String>,
    pub ddl: String,
    pub ddl_tables: usize,
    pub disabled: usize,
    /// `(table name, control file text)`
    pub control_files: Vec<(String, String)>,
    pub reorders: Vec<ReorderJob>,
}

/// Rename counts
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RenameStats {
    pub tables: usize,
    pub columns: usize,
    pub constraints: usize,
}

/// Per-schema summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaReport {
    pub schema: String,
    pub tables: Vec<String>,
    pub disabled_constraints: usize,
    pub ddl_tables: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reordered: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a normalization run
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeReport {
    pub metadata: PathBuf,
    pub state: RunState,
    pub already_normalized: bool,
    pub dry_run: bool,
    pub renamed: RenameStats,
    pub data_files_moved: usize,
    pub schemas: Vec<SchemaReport>,
    /// Issues of severity error; the tables and schemas they name were skipped
    pub error_count: usize,
    pub issues: Vec<TableIssue>,
    pub files_written: Vec<PathBuf>,
}

impl NormalizeReport {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Drives one document through the normalization stages
pub struct Rewriter<'a> {
    config: &'a NormalizeConfig,
    ctx: NormalizationContext,
    issues: IssueCollector,
    state: RunState,
    stats: RenameStats,
    failed_schemas: Vec<(String, String)>,
}

impl<'a> Rewriter<'a> {
    pub fn new(config: &'a NormalizeConfig) -> Self {
        Self {
            config,
            ctx: NormalizationContext::new(config.illegal_terms.clone()),
            issues: IssueCollector::new(),
            state: RunState::Unprocessed,
            stats: RenameStats::default(),
            failed_schemas: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn issues(&self) -> &[TableIssue] {
        self.issues.issues()
    }

    pub fn rename_stats(&self) -> RenameStats {
        self.stats
    }

    fn advance(&mut self, state: RunState) {
        debug!(from = ?self.state, to = ?state, "stage complete");
        self.state = state;
    }

    /// Whether the document was already normalized by an earlier run
    pub fn already_normalized(&self) -> bool {
        self.config
            .output_dir()
            .join(NORMALIZE_DONE_MARKER)
            .exists()
    }

    /// Normalize every table, column and constraint name in the document.
    ///
    /// Original names are recorded once and kept on later runs. Returns the
    /// data file moves implied by renamed tables.
    pub fn rename(&mut self, doc: &mut SchemaDocument, data_dir: &Path) -> Result<Vec<TsvRename>> {
        let mut table_names: AHashMap<String, AHashSet<String>> = AHashMap::new();
        let mut constraint_names: AHashMap<String, AHashSet<String>> = AHashMap::new();
        let mut moves = Vec::new();

        for table in doc.tables.iter_mut() {
            let schema_key = table.schema.to_lowercase();
            let schema_scope = format!("schema {}", table.schema);
            let original = table.original().to_string();

            let taken = table_names.entry(schema_key.clone()).or_default();
            let name = self
                .ctx
                .normalize_unique(&original, NameCategory::Table, taken, &schema_scope)?;
            if name != table.name {
                self.stats.tables += 1;
                moves.push(TsvRename {
                    table: original.clone(),
                    from: data_dir.join(format!("{}.tsv", table.name)),
                    to: data_dir.join(format!("{name}.tsv")),
                });
            }
            table.original_name.get_or_insert(original.clone());
            table.name = name;

            let mut column_names = AHashSet::new();
            let table_scope = format!("table {original}");
            for column in table.columns.iter_mut() {
                let col_original = column.original().to_string();
                let name = self.ctx.normalize_unique(
                    &col_original,
                    NameCategory::Column,
                    &mut column_names,
                    &table_scope,
                )?;
                if name != column.name {
                    self.stats.columns += 1;
                }
                column.original_name.get_or_insert(col_original);
                column.name = name;
            }

            let taken = constraint_names.entry(schema_key).or_default();
            for fk in table.foreign_keys.iter_mut() {
                let disabled = fk.is_disabled();
                let base = match &fk.original_name {
                    Some(name) => name.clone(),
                    None => fk
                        .name
                        .strip_prefix(DISABLED_PREFIX)
                        .unwrap_or(&fk.name)
                        .to_string(),
                };
                let name = self.ctx.normalize_unique(
                    &base,
                    NameCategory::Constraint,
                    taken,
                    &schema_scope,
                )?;
                if name != base {
                    self.stats.constraints += 1;
                }
                fk.original_name.get_or_insert(base);
                fk.name = name;
                if disabled {
                    fk.disable();
                }
            }
        }

        sync_references(doc);
        info!(
            tables = self.stats.tables,
            columns = self.stats.columns,
            constraints = self.stats.constraints,
            "identifiers normalized"
        );
        self.advance(RunState::PerTableRenamed);
        Ok(moves)
    }

    /// Tables left out by the configured table list
    pub fn excluded_tables(&self, doc: &SchemaDocument) -> Result<AHashSet<TableId>> {
        let Some(path) = &self.config.table_list else {
            return Ok(AHashSet::new());
        };
        let listed = load_table_list(path)?;
        Ok(excluded_by_list(doc, &listed))
    }

    /// Order every schema, disable the constraints the grapher picked and
    /// write `dep-position` onto each ordered table.
    ///
    /// A schema whose ordering fails on a missing table is recorded as an
    /// issue and skipped.
    pub fn order(
        &mut self,
        doc: &mut SchemaDocument,
        excluded: &AHashSet<TableId>,
    ) -> Result<Vec<TableOrder>> {
        let mut orders = Vec::new();

        for schema in doc.schemas() {
            let order = match order_tables(doc, &schema, excluded) {
                Ok(order) => order,
                Err(e) if !e.is_fatal() => {
                    warn!(schema = %schema, error = %e, "schema not ordered");
                    let table = match &e {
                        NormalizeError::MissingTable { table, .. } => Some(table.clone()),
                        _ => None,
                    };
                    self.issues
                        .add(TableIssue::from_error(&schema, table.as_deref(), &e));
                    self.failed_schemas.push((schema, e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            for d in &order.disabled {
                if let Some(table) = doc.table(d.table) {
                    if let Some(fk) = table.foreign_keys.get(d.fk_index) {
                        self.issues.add(TableIssue::disabled(
                            &schema,
                            table.original(),
                            fk.original(),
                            d.reason,
                        ));
                    }
                }
            }

            order.apply_to(doc);
            info!(
                schema = %schema,
                tables = order.order.len(),
                disabled = order.disabled.len(),
                "schema ordered"
            );
            orders.push(order);
        }

        sync_references(doc);
        self.advance(RunState::Ordered);
        Ok(orders)
    }

    /// Build DDL, control files and row reorder plans for every ordered schema
    pub fn generate(
        &mut self,
        doc: &SchemaDocument,
        orders: &[TableOrder],
        data_dir: &Path,
    ) -> Vec<SchemaOutput> {
        let options = DdlOptions {
            include_constraints: self.config.include_constraints,
            drop_existing: self.config.drop_existing,
            dialect: self.config.dialect,
        };

        let mut outputs = Vec::with_capacity(orders.len());
        for order in orders {
            let ddl = schema_ddl(doc, order, &options);
            for (id, err) in &ddl.failed {
                let table = doc.table(*id).map(TableDef::original);
                warn!(schema = %order.schema, error = %err, "table left out of DDL");
                self.issues
                    .add(TableIssue::from_error(&order.schema, table, err));
            }

            let mut control_files = Vec::new();
            if self.config.control_files {
                for table in order.order.iter().filter_map(|id| doc.table(*id)) {
                    match control_file(table) {
                        Ok(text) => control_files.push((table.name.clone(), text)),
                        Err(e) => self.issues.add(TableIssue::from_error(
                            &order.schema,
                            Some(table.original()),
                            &e,
                        )),
                    }
                }
            }

            outputs.push(SchemaOutput {
                schema: order.schema.clone(),
                tables: order.names(doc),
                ddl: ddl.script,
                ddl_tables: ddl.tables.len(),
                disabled: order.disabled.len(),
                control_files,
                reorders: plan_reorders(doc, order, data_dir),
            });
        }

        self.advance(RunState::DdlGenerated);
        outputs
    }

    /// Run the whole pipeline
    pub fn run(mut self) -> Result<NormalizeReport> {
        let config = self.config;
        let out_dir = config.output_dir();
        let data_dir = config.data_dir();
        let already = self.already_normalized();
        let progress = progress_bar(config.progress);
        let step = |msg: &'static str| {
            if let Some(ref pb) = progress {
                pb.set_message(msg);
                pb.inc(1);
            }
        };

        step("Reading schema document...");
        let mut doc = load_document(&config.metadata)?;

        step("Normalizing identifiers...");
        let moves = if already {
            info!(
                path = %config.metadata.display(),
                "document already normalized, skipping renames"
            );
            self.advance(RunState::PerTableRenamed);
            Vec::new()
        } else {
            self.rename(&mut doc, &data_dir)?
        };

        step("Ordering tables...");
        let excluded = self.excluded_tables(&doc)?;
        let orders = self.order(&mut doc, &excluded)?;

        step("Generating DDL...");
        let outputs = self.generate(&doc, &orders, &data_dir);

        let mut files_written = Vec::new();
        let mut moved = 0;
        let mut reordered: AHashMap<String, Vec<String>> = AHashMap::new();

        if !config.dry_run {
            step("Writing output...");

            let rename_marker = out_dir.join(TSV_RENAMED_MARKER);
            if !already && !rename_marker.exists() {
                for mv in &moves {
                    if move_data_file(mv)? {
                        moved += 1;
                    }
                }
                write_marker(&rename_marker, &mut files_written)?;
            }

            for output in &outputs {
                for job in &output.reorders {
                    match reorder_data(job) {
                        Ok(Some(rows)) => {
                            info!(table = %job.table, rows, "rows reordered");
                            files_written.push(job.path.clone());
                            files_written.push(job.marker.clone());
                            reordered
                                .entry(output.schema.clone())
                                .or_default()
                                .push(job.table.clone());
                        }
                        Ok(None) => {}
                        Err(e @ NormalizeError::Io(_)) => return Err(e),
                        Err(e) => {
                            warn!(table = %job.table, error = %e, "rows not reordered");
                            self.issues.add(TableIssue::from_error(
                                &output.schema,
                                Some(&job.table),
                                &e,
                            ));
                        }
                    }
                }

                write_schema_output(&out_dir, output, &mut files_written)?;
            }

            save_document(&doc, &config.metadata)?;
            files_written.push(config.metadata.clone());
            self.advance(RunState::Written);

            write_marker(&out_dir.join(NORMALIZE_DONE_MARKER), &mut files_written)?;
            self.advance(RunState::Done);
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut schemas: Vec<SchemaReport> = outputs
            .iter()
            .map(|o| SchemaReport {
                schema: o.schema.clone(),
                tables: o.tables.clone(),
                disabled_constraints: o.disabled,
                ddl_tables: o.ddl_tables,
                reordered: reordered.remove(&o.schema).unwrap_or_default(),
                error: None,
            })
            .collect();
        schemas.extend(self.failed_schemas.iter().map(|(schema, err)| SchemaReport {
            schema: schema.clone(),
            error: Some(err.clone()),
            ..Default::default()
        }));

        Ok(NormalizeReport {
            metadata: config.metadata.clone(),
            state: self.state,
            already_normalized: already,
            dry_run: config.dry_run,
            renamed: self.stats,
            data_files_moved: moved,
            schemas,
            error_count: self.issues.error_count(),
            issues: self.issues.into_issues(),
            files_written,
        })
    }
}

/// Run the full normalization pipeline for one document
pub fn normalize(config: &NormalizeConfig) -> Result<NormalizeReport> {
    Rewriter::new(config).run()
}

/// Tables matching no entry of a table list (by current or original name)
pub fn excluded_by_list(doc: &SchemaDocument, listed: &AHashSet<String>) -> AHashSet<TableId> {
    doc.tables
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            !listed.contains(&t.name.to_lowercase())
                && !listed.contains(&t.original().to_lowercase())
        })
        .map(|(i, _)| TableId(i as u32))
        .collect()
}

fn progress_bar(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new(5);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("█▓▒░  "));
    }
    Some(pb)
}

/// Whether a foreign key is the one a column reference names
fn names_constraint(fk: &ForeignKeyDef, name: &str) -> bool {
    let bare = name.strip_prefix(DISABLED_PREFIX).unwrap_or(name);
    let fk_bare = fk.name.strip_prefix(DISABLED_PREFIX).unwrap_or(&fk.name);
    fk.original().eq_ignore_ascii_case(bare) || fk_bare.eq_ignore_ascii_case(bare)
}

fn column_name(table: &TableDef, name: &str) -> String {
    table
        .get_column(name)
        .map_or_else(|| name.to_string(), |c| c.name.clone())
}

/// Bring every name that points at another definition in line with that
/// definition's current name: foreign key targets and columns, index
/// columns and column-level references.
fn sync_references(doc: &mut SchemaDocument) {
    for i in 0..doc.tables.len() {
        let (fk_updates, index_updates, ref_updates) = {
            let table = &doc.tables[i];

            let fk_updates: Vec<(Vec<String>, Option<(String, Vec<String>)>)> = table
                .foreign_keys
                .iter()
                .map(|fk| {
                    let source: Vec<String> = fk
                        .source_columns
                        .iter()
                        .map(|c| column_name(table, c))
                        .collect();
                    let schema = fk.target_schema.as_deref().unwrap_or(&table.schema);
                    let target = doc
                        .find_table(schema, &fk.target_table)
                        .and_then(|id| doc.table(id))
                        .map(|target| {
                            let columns: Vec<String> = fk
                                .target_columns
                                .iter()
                                .map(|c| column_name(target, c))
                                .collect();
                            (target.name.clone(), columns)
                        });
                    (source, target)
                })
                .collect();

            let index_updates: Vec<Vec<String>> = table
                .indexes
                .iter()
                .map(|idx| idx.columns.iter().map(|c| column_name(table, c)).collect())
                .collect();

            let ref_updates: Vec<Option<ColumnReference>> = table
                .columns
                .iter()
                .map(|col| {
                    let r = col.references.as_ref()?;
                    let target = doc
                        .find_table(&table.schema, &r.table_name)
                        .and_then(|id| doc.table(id));
                    Some(ColumnReference {
                        table_name: target.map_or_else(|| r.table_name.clone(), |t| t.name.clone()),
                        column_name: target.map_or_else(
                            || r.column_name.clone(),
                            |t| column_name(t, &r.column_name),
                        ),
                        constraint_name: r.constraint_name.as_ref().map(|c| {
                            table
                                .foreign_keys
                                .iter()
                                .find(|fk| names_constraint(fk, c))
                                .map_or_else(|| c.clone(), |fk| fk.name.clone())
                        }),
                    })
                })
                .collect();

            (fk_updates, index_updates, ref_updates)
        };

        let table = &mut doc.tables[i];
        for (fk, (source, target)) in table.foreign_keys.iter_mut().zip(fk_updates) {
            fk.source_columns = source;
            if let Some((name, columns)) = target {
                fk.target_table = name;
                fk.target_columns = columns;
            }
        }
        for (idx, columns) in table.indexes.iter_mut().zip(index_updates) {
            idx.columns = columns;
        }
        for (col, reference) in table.columns.iter_mut().zip(ref_updates) {
            col.references = reference;
        }
    }
}

/// Reorder jobs for the ordered tables with one single-column self reference
fn plan_reorders(doc: &SchemaDocument, order: &TableOrder, data_dir: &Path) -> Vec<ReorderJob> {
    let mut jobs = Vec::new();

    for table in order.self_referencing.iter().filter_map(|id| doc.table(*id)) {
        let refs = table.self_references();
        let [fk] = refs.as_slice() else { continue };
        if fk.source_columns.len() != 1 || fk.target_columns.len() != 1 {
            debug!(table = %table.name, "multi-column self reference, rows left as they are");
            continue;
        }

        let candidates = |name: &str| -> Vec<String> {
            let mut names = vec![name.to_string()];
            if let Some(col) = table.get_column(name) {
                if !col.original().eq_ignore_ascii_case(name) {
                    names.push(col.original().to_string());
                }
            }
            names
        };

        jobs.push(ReorderJob {
            table: table.name.clone(),
            path: data_dir.join(format!("{}.tsv", table.name)),
            child_columns: candidates(&fk.target_columns[0]),
            parent_columns: candidates(&fk.source_columns[0]),
            marker: data_dir.join(format!("{}{REORDERED_MARKER_SUFFIX}", table.name)),
        });
    }

    jobs
}

/// Move a data file to its normalized name; tolerates an earlier move
fn move_data_file(mv: &TsvRename) -> Result<bool> {
    if mv.from == mv.to {
        return Ok(false);
    }
    if mv.from.exists() {
        debug!(from = %mv.from.display(), to = %mv.to.display(), "moving data file");
        fs::rename(&mv.from, &mv.to)?;
        return Ok(true);
    }
    if mv.to.exists() {
        debug!(table = %mv.table, "data file already moved");
    } else {
        debug!(table = %mv.table, "no data file");
    }
    Ok(false)
}

/// Rewrite a self-referencing table's data file unless already done.
///
/// Returns the number of rows written, or `None` when skipped.
fn reorder_data(job: &ReorderJob) -> Result<Option<usize>> {
    if job.marker.exists() {
        debug!(table = %job.table, "rows already reordered");
        return Ok(None);
    }
    if !job.path.exists() {
        debug!(table = %job.table, "no data file to reorder");
        return Ok(None);
    }

    let child: Vec<&str> = job.child_columns.iter().map(String::as_str).collect();
    let parent: Vec<&str> = job.parent_columns.iter().map(String::as_str).collect();
    let rows = reorder_tsv_file(&job.path, &child, &parent)?;
    fs::write(&job.marker, "")?;
    Ok(Some(rows))
}

fn write_marker(path: &Path, written: &mut Vec<PathBuf>) -> Result<()> {
    fs::write(path, "")?;
    written.push(path.to_path_buf());
    Ok(())
}

/// Write `<schema>_tables.txt`, `<schema>_ddl.sql` and control files
fn write_schema_output(
    out_dir: &Path,
    output: &SchemaOutput,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut order_text = output.tables.join("\n");
    if !order_text.is_empty() {
        order_text.push('\n');
    }
    let order_path = out_dir.join(format!("{}_tables.txt", output.schema));
    fs::write(&order_path, order_text)?;
    written.push(order_path);

    let ddl_path = out_dir.join(format!("{}_ddl.sql", output.schema));
    fs::write(&ddl_path, &output.ddl)?;
    written.push(ddl_path);

    if !output.control_files.is_empty() {
        let ctl_dir = out_dir.join(format!("{}_ctl", output.schema));
        fs::create_dir_all(&ctl_dir)?;
        for (table, text) in &output.control_files {
            let path = ctl_dir.join(format!("{table}.ctl"));
            fs::write(&path, text)?;
            written.push(path);
        }
    }

    Ok(())
}

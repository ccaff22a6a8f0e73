//! Reorder command - sort a self-referencing table's TSV rows into load order.

use anyhow::{bail, Result};
use schema_normalizer::schema::reorder_tsv_file;
use std::path::PathBuf;

/// Run the reorder command
pub fn run(file: PathBuf, child: String, parent: String) -> Result<()> {
    if !file.exists() {
        bail!("input file does not exist: {}", file.display());
    }

    let rows = reorder_tsv_file(&file, &[child.as_str()], &[parent.as_str()])?;
    eprintln!("Reordered {} rows in {}", rows, file.display());
    Ok(())
}

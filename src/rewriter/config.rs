//! Run configuration for the normalize command.
//!
//! Options come from CLI flags with an optional YAML file underneath:
//!
//! ```yaml
//! dialect: oracle
//! data_dir: ../content/data
//! control_files: true
//! extra_illegal_terms: [level, size]
//! ```

use crate::error::{NormalizeError, Result};
use crate::identifier::default_illegal_terms;
use crate::typemap::Dialect;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for one normalization run
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    /// Schema report to normalize (`metadata.xml`)
    pub metadata: PathBuf,
    /// Emit PRIMARY KEY / UNIQUE / FOREIGN KEY clauses
    pub include_constraints: bool,
    /// Prefix statements with `DROP TABLE IF EXISTS`
    pub drop_existing: bool,
    /// Restrict the run to the tables listed in this file
    pub table_list: Option<PathBuf>,
    /// DDL dialect
    pub dialect: Dialect,
    /// Directory holding `<table>.tsv` data files; derived from the
    /// metadata path when unset
    pub data_dir: Option<PathBuf>,
    /// Reserved words that get a trailing underscore
    pub illegal_terms: AHashSet<String>,
    /// Write SQL*Loader control files
    pub control_files: bool,
    /// Run every stage in memory and write nothing
    pub dry_run: bool,
    /// Show a progress bar
    pub progress: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            metadata: PathBuf::new(),
            include_constraints: true,
            drop_existing: false,
            table_list: None,
            dialect: Dialect::Iso,
            data_dir: None,
            illegal_terms: default_illegal_terms(),
            control_files: false,
            dry_run: false,
            progress: false,
        }
    }
}

impl NormalizeConfig {
    /// Directory the output files and sentinels are written to
    pub fn output_dir(&self) -> PathBuf {
        match self.metadata.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Data directory, defaulting to `<metadata dir>/../content/data`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.output_dir().join("..").join("content").join("data"))
    }

    /// Layer a YAML file's settings under the current values.
    ///
    /// Only settings present in the file are applied; the caller applies
    /// CLI flags afterwards so they win.
    pub fn apply_file(&mut self, file: &NormalizeYamlConfig, base_dir: &Path) -> Result<()> {
        if let Some(terms) = &file.illegal_terms {
            self.illegal_terms = terms.iter().map(|t| t.to_lowercase()).collect();
        }
        self.illegal_terms
            .extend(file.extra_illegal_terms.iter().map(|t| t.to_lowercase()));

        if let Some(dialect) = &file.dialect {
            self.dialect = dialect.parse().map_err(NormalizeError::Config)?;
            if !self.dialect.supports_ddl() {
                return Err(NormalizeError::Config(format!(
                    "dialect {} cannot be used for DDL output",
                    self.dialect
                )));
            }
        }
        if let Some(dir) = &file.data_dir {
            self.data_dir = Some(if dir.is_absolute() {
                dir.clone()
            } else {
                base_dir.join(dir)
            });
        }
        if let Some(ctl) = file.control_files {
            self.control_files = ctl;
        }
        Ok(())
    }
}

/// Optional YAML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeYamlConfig {
    /// Replaces the built-in reserved-word list
    pub illegal_terms: Option<Vec<String>>,
    /// Appended to the reserved-word list
    pub extra_illegal_terms: Vec<String>,
    pub dialect: Option<String>,
    /// Relative paths resolve against the config file's directory
    pub data_dir: Option<PathBuf>,
    pub control_files: Option<bool>,
}

impl NormalizeYamlConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| NormalizeError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Parse a table list: one name per line, `#` comments and blank lines
/// ignored. Names are lowercased for case-insensitive matching.
pub fn parse_table_list(content: &str) -> AHashSet<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_lowercase())
        .collect()
}

/// Read a table list file
pub fn load_table_list(path: &Path) -> Result<AHashSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_table_list(&content))
}

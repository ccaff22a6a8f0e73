mod normalize;
mod order;
mod reorder;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "schema-normalizer")]
#[command(version)]
#[command(
    about = "Normalize relational schema exports: identifiers, FK-safe table order and DDL",
    long_about = None
)]
pub struct Cli {
    /// Log level: error, warn, info or debug (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a schema document and write table order, DDL and data renames
    Normalize {
        /// Path to the schema document (metadata.xml)
        #[arg(short = 'p', long = "path")]
        metadata: PathBuf,

        /// Include PRIMARY KEY / UNIQUE / FOREIGN KEY clauses in DDL
        #[arg(
            short = 'c',
            long = "constraints",
            default_value_t = true,
            action = clap::ArgAction::Set
        )]
        constraints: bool,

        /// Emit DROP TABLE IF EXISTS before each CREATE TABLE
        #[arg(short = 'd', long = "drop", default_value_t = false, action = clap::ArgAction::Set)]
        drop: bool,

        /// Only process the tables listed in this file (one per line)
        #[arg(short = 'l', long = "tables")]
        table_list: Option<PathBuf>,

        /// DDL dialect: iso, oracle or sqlite
        #[arg(long)]
        dialect: Option<String>,

        /// Directory holding the <table>.tsv data files (default: <metadata dir>/../content/data)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write SQL*Loader control files to <schema>_ctl/
        #[arg(long)]
        ctl: bool,

        /// Run every stage in memory and print the plan without writing
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Show progress during processing
        #[arg(long)]
        progress: bool,
    },

    /// Print the dependency order of every schema without writing anything
    Order {
        /// Path to the schema document (metadata.xml)
        #[arg(short = 'p', long = "path")]
        metadata: PathBuf,

        /// Only order the tables listed in this file (one per line)
        #[arg(short = 'l', long = "tables")]
        table_list: Option<PathBuf>,

        /// YAML configuration file (for illegal terms)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reorder a TSV data file so parent rows come before their children
    Reorder {
        /// TSV file with a header row (rewritten in place)
        file: PathBuf,

        /// Column holding each row's key
        #[arg(long)]
        child: String,

        /// Column pointing at the parent row's key
        #[arg(long)]
        parent: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Normalize {
            metadata,
            constraints,
            drop,
            table_list,
            dialect,
            data_dir,
            config,
            ctl,
            dry_run,
            json,
            progress,
        } => normalize::run(normalize::NormalizeArgs {
            metadata,
            constraints,
            drop,
            table_list,
            dialect,
            data_dir,
            config,
            ctl,
            dry_run,
            json,
            progress,
        }),
        Commands::Order {
            metadata,
            table_list,
            config,
            json,
        } => order::run(metadata, table_list, config, json),
        Commands::Reorder {
            file,
            child,
            parent,
        } => reorder::run(file, child, parent),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "schema-normalizer",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}

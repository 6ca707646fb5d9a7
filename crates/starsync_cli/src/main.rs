//! Starsync CLI
//!
//! Loads an operational Sakila database into a star schema.
//!
//! # Commands
//!
//! - `init` - Create the star schema, sync state and indexes
//! - `full-load` - Load every source row
//! - `incremental` - Load rows changed since the last run
//! - `validate` - Compare source and target counts and totals

mod commands;

use clap::{Args, Parser, Subcommand};
use starsync_engine::LoadMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Star-schema loader for Sakila databases.
#[derive(Parser)]
#[command(name = "starsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the source (operational) SQLite database
    #[arg(global = true, short, long)]
    source: Option<PathBuf>,

    /// Path to the target (analytics) SQLite database
    #[arg(global = true, short, long)]
    target: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoadArgs {
    /// Do not reconcile after loading
    #[arg(long)]
    skip_validation: bool,

    /// Fail if reconciliation finds a mismatch
    #[arg(long)]
    fail_on_mismatch: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the star schema, sync state and indexes
    Init {
        /// Skip the recommended indexes
        #[arg(long)]
        no_indexes: bool,
    },

    /// Load every source row
    FullLoad(LoadArgs),

    /// Load rows changed since the last run
    Incremental(LoadArgs),

    /// Compare source and target counts and totals
    Validate {
        /// JSON file of reconciliation specs (defaults to the built-in checks)
        #[arg(long)]
        specs: Option<PathBuf>,

        /// Fail if any check does not pass
        #[arg(long)]
        fail_on_mismatch: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init { no_indexes } => {
            let target = cli.target.ok_or("Target database path required for init")?;
            commands::init::run(&target, !no_indexes)?;
        }
        Commands::FullLoad(args) => {
            let source = cli.source.ok_or("Source database path required for full-load")?;
            let target = cli.target.ok_or("Target database path required for full-load")?;
            commands::load::run(&source, &target, LoadMode::Full, &args.options())?;
        }
        Commands::Incremental(args) => {
            let source = cli.source.ok_or("Source database path required for incremental")?;
            let target = cli.target.ok_or("Target database path required for incremental")?;
            commands::load::run(&source, &target, LoadMode::Incremental, &args.options())?;
        }
        Commands::Validate {
            specs,
            fail_on_mismatch,
            format,
        } => {
            let source = cli.source.ok_or("Source database path required for validate")?;
            let target = cli.target.ok_or("Target database path required for validate")?;
            commands::validate::run(&source, &target, specs.as_deref(), fail_on_mismatch, &format)?;
        }
    }
    Ok(())
}

impl LoadArgs {
    fn options(&self) -> commands::load::LoadOptions {
        commands::load::LoadOptions {
            validate: !self.skip_validation,
            fail_on_mismatch: self.fail_on_mismatch,
            format: self.format.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_paths_after_subcommand() {
        let cli = Cli::try_parse_from([
            "starsync",
            "full-load",
            "--source",
            "sakila.db",
            "--target",
            "warehouse.db",
            "--skip-validation",
        ])
        .unwrap();
        assert_eq!(cli.source, Some(PathBuf::from("sakila.db")));
        match cli.command {
            Commands::FullLoad(args) => {
                let options = args.options();
                assert!(!options.validate);
                assert!(!options.fail_on_mismatch);
            }
            _ => panic!("expected full-load"),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["starsync", "reload"]).is_err());
    }
}

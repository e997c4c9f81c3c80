//! Command-line interface

pub mod commands;

use clap::Parser;

use commands::sync::SyncArgs;

/// Reconcile inventory between the Inventory Service and the Lab Registry
#[derive(Debug, Parser)]
#[command(name = "inventory-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["inventory-sync"]).unwrap();
        assert!(!cli.verbose);
        assert!(!cli.sync.dry_run);
        assert!(cli.sync.direction.is_none());
        assert!(cli.sync.output.is_none());
    }
}

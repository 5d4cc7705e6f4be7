use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisor")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision hosts by applying idempotent roles", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Inventory file (overrides PROVISOR_CONFIG)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply the configured roles to hosts
    Run(RunArgs),

    /// Show hosts and their roles
    Show(ShowArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Only these hosts (repeatable); every host when omitted
    #[arg(long = "host", value_name = "NAME")]
    pub hosts: Vec<String>,

    /// Print the run summaries as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Only this host
    pub host: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_with_hosts() {
        let cli = Cli::parse_from(["provisor", "-vv", "run", "--host", "web", "--host", "db"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => assert_eq!(args.hosts, vec!["web", "db"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["provisor", "show", "--config", "/etc/site.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/site.toml")));
    }
}

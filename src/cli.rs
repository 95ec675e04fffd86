use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::ConflictPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provision")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this host to a declared recipe", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Node config file (default: ~/.config/provision/config.toml)
    #[arg(long, global = true, env = "PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the host to a recipe
    Apply(ApplyArgs),

    /// Validate a recipe without touching the host
    Check(CheckArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Recipe file (.toml or .json); falls back to the node config's recipe
    pub recipe: Option<PathBuf>,

    /// Show what would change without changing anything
    #[arg(short = 'n', long, alias = "dry-run")]
    pub why_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Base directory for relative paths
    #[arg(long)]
    pub docroot: Option<PathBuf>,

    /// What to do when a pool or site exists with different settings
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictArg>,

    /// Run against a fresh in-memory host instead of this machine
    #[arg(long)]
    pub simulate: bool,

    /// Output format for the run report
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Recipe file (.toml or .json); falls back to the node config's recipe
    pub recipe: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ConflictArg {
    /// Abort the run
    Fail,
    /// Rewrite the declared settings on the existing object
    Update,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Fail => Self::Fail,
            ConflictArg::Update => Self::UpdateInPlace,
        }
    }
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
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "provision",
            "-vv",
            "apply",
            "site.toml",
            "--why-run",
            "--on-conflict",
            "update",
            "--format",
            "json",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.recipe, Some(PathBuf::from("site.toml")));
        assert!(args.why_run);
        assert!(!args.yes);
        assert!(args.format == OutputFormat::Json);
        assert_eq!(
            args.on_conflict.map(ConflictPolicy::from),
            Some(ConflictPolicy::UpdateInPlace)
        );
    }
}

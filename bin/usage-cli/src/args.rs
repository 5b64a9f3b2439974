use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hive-usage-cli", version)]
#[command(arg_required_else_help = true)]
/// Collects and reports the schema usage of GraphQL operation documents
pub struct Cli {
    /// Path to the configuration file. Defaults to the first `usage.config.*` file found
    /// in the working directory.
    #[arg(long, short, global = true, env = "HIVE_USAGE_CONFIG_FILE_PATH")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Writes the schema usage of every distinct operation as a JSON artifact
    Collect(CollectArgs),
    /// Records every document as one successful execution and sends the report
    Report(ReportArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CollectArgs {
    /// Path to the schema SDL
    pub schema: PathBuf,
    /// Operation documents (`.graphql`, `.gql`) or directories containing them
    #[arg(required = true)]
    pub documents: Vec<PathBuf>,
    /// Writes the artifact to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// JSON object with the variable values of the operations
    #[arg(long)]
    pub variables: Option<PathBuf>,
    /// Narrows input object usage to the fields present in the variable values
    #[arg(long)]
    pub process_variables: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ReportArgs {
    /// Path to the schema SDL
    pub schema: PathBuf,
    /// Operation documents (`.graphql`, `.gql`) or directories containing them
    #[arg(required = true)]
    pub documents: Vec<PathBuf>,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gomodup",
    about = "Go modules artifact updater - regenerates go.sum, vendor/ and import paths after a go.mod update",
    version,
    author
)]
pub struct Cli {
    /// Path to the repository root (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    pub path: String,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to <path>/gomodup.toml when present)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regenerate artifacts for a go.mod that has already been edited
    Update {
        /// Repository-relative path of the go.mod
        #[arg(short, long, default_value = "go.mod")]
        manifest: String,

        /// Updated dependency (MODULE or MODULE@VERSION), repeatable
        #[arg(short, long = "dep", value_name = "MODULE@VERSION")]
        deps: Vec<String>,

        /// Kind of update that produced the manifest
        #[arg(long, value_name = "KIND", value_parser = ["major", "minor", "patch"])]
        update_type: Option<String>,

        /// Target major version for import path rewrites
        #[arg(long, value_name = "N")]
        new_major: Option<u64>,

        /// Post-update option (gomodTidy, gomodTidy1.17, gomodVendor, gomodUpdateImportPaths, gomodMassage), repeatable
        #[arg(short, long = "option", value_name = "OPTION")]
        options: Vec<String>,

        /// Where Go comes from: unset for host, "global" or "docker"
        #[arg(long, value_name = "SOURCE")]
        binary_source: Option<String>,

        /// Print the artifact list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the files git currently reports as changed
    Status,
}

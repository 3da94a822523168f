//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::value::ValueStoreKind;

#[derive(Parser)]
#[command(name = "fsadict")]
#[command(about = "Compile, inspect and merge finite-state dictionaries")]
#[command(version)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Compiler parameters shared by `compile` and `merge`.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Compiler parameters as `name=value`, e.g. `memory_limit_mb=512`
    #[arg(value_name = "PARAM=VALUE")]
    pub params: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the statistics of a dictionary as JSON
    Stats {
        /// Dictionary file
        file: PathBuf,
    },

    /// Write every entry as a `key<TAB>value` line
    Dump {
        /// Dictionary file
        file: PathBuf,

        /// Output text file
        output: PathBuf,

        /// Write keys as JSON strings
        #[arg(long)]
        json_escape: bool,
    },

    /// Compile a tab-separated `key<TAB>value` file
    Compile {
        /// Input text file
        input: PathBuf,

        /// Output dictionary file
        output: PathBuf,

        /// Value store: key_only, int, int_with_weights, string, json or float_vector
        kind: ValueStoreKind,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Merge dictionaries; later inputs override earlier ones
    Merge {
        /// Input dictionaries, oldest first
        #[arg(short, long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output dictionary file
        #[arg(short, long)]
        output: PathBuf,

        /// Value store of the inputs
        kind: ValueStoreKind,

        #[command(flatten)]
        params: ParamArgs,
    },
}

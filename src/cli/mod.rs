//! CLI command handling module
//!
//! Handles all CLI subcommands and logging setup. Argument parsing lives in
//! `main.rs`.

mod commands;
mod logging;

pub use commands::{
    ConfigSubcommand, Mutation, describe_update, handle_config_command, run_clusters, run_list,
    run_mutation, run_watch,
};
pub use logging::init_logging;

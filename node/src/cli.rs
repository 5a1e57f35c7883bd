//! # CLI Interface
//!
//! Defines the command-line argument structure for `cascade-node` using
//! `clap` derive. Two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// Cascade vault tree node.
///
/// Hosts a vault tree engine behind an HTTP API: vault creation, the four
/// money-moving operations, the read-only query surface, and Prometheus
/// metrics. Assets settle against the built-in in-memory bank, which makes
/// this a reference/development node — production embedders wire the engine
/// to a real settlement rail instead.
#[derive(Parser, Debug)]
#[command(
    name = "cascade-node",
    about = "Cascade vault tree node",
    version,
    propagate_version = true
)]
pub struct CascadeNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the HTTP operations/query API.
    #[arg(long, env = "CASCADE_RPC_PORT", default_value_t = cascade_engine::config::DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CASCADE_METRICS_PORT", default_value_t = cascade_engine::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Ceiling on vault tree depth. Creation of deeper chains is refused.
    #[arg(long, env = "CASCADE_MAX_TREE_DEPTH", default_value_t = cascade_engine::config::DEFAULT_MAX_TREE_DEPTH)]
    pub max_tree_depth: u32,

    /// Log output format.
    #[arg(long, env = "CASCADE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

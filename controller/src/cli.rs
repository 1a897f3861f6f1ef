//! Command-line interface definitions for the line controller.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `potline` binary.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands for the line controller.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the control service (JSON API and websocket stream) for the potting line.
    ControlService(ServiceArgs),
}

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments for the control service command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, env = "POTLINE_CONFIG", default_value = "potline.toml")]
    pub config: String,
    /// Optional override for the listen port (overrides port in config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_enum, env = "POTLINE_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

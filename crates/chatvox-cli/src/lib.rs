//! Command-line front end for the chatvox speech orchestrator.
//!
//! `main.rs` parses arguments and dispatches; everything it needs lives here
//! so handlers and helpers can be tested without spawning the binary.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used only by main.rs
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliContext, bootstrap, resolve_data_dir};
pub use commands::{Commands, SinkArg, UserCommand};
pub use config::CliConfig;
pub use parser::Cli;

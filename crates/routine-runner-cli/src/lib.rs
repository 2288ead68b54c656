//! routinectl library
//!
//! Command-line front end for `routine-runner`: loads YAML run plans, drives
//! them against the scripted routine service and reports per-unit verdicts.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, FormatArg, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressObserver, ProgressReporter};
pub use runner::{DiagnosticRunner, RunReport, UnitReport};

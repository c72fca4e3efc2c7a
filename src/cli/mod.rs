//! CLI support for pipeline-lang
//!
//! Provides programmatic access to the `pipeline` commands so hosts can
//! embed them.

mod check;
mod run;
mod schedule;

pub use check::{PipelineSummary, StageSummary, Summary, execute_check};
pub use run::{RunOptions, execute_run, parse_param};
pub use schedule::{ScheduleOptions, execute_schedule};

use std::io;

use crate::{config::ConfigError, error::ErrorList, scheduler::SchedulerError};

/// Errors that can occur during CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Script(#[from] ErrorList),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid parameter {0:?}, expected name=value")]
    InvalidParam(String),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("No input provided. Pass a script file or pipe one to stdin.")]
    NoInput,
}

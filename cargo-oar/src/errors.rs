// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use oar_metadata::{QueryError, RecordError};
use oar_reporter::errors::{ConfigError, ReportFailure};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes used by `oar`.
pub struct OarExitCode;

impl OarExitCode {
    /// The command succeeded.
    pub const OK: i32 = 0;

    /// The oar service could not be reached or rejected the request.
    pub const REMOTE_FAILURE: i32 = 1;

    /// The configuration or the command-line arguments were invalid.
    ///
    /// clap also uses this code for usage errors.
    pub const SETUP_ERROR: i32 = 2;

    /// Writing the command's output failed.
    pub const WRITE_OUTPUT_FAILED: i32 = 3;
}

// The #[error()] strings are short; display_to_stderr prints the full, colorized message.

/// An error that `oar` reports and exits on.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config error")]
    Config {
        #[from]
        err: ConfigError,
    },
    #[error("remote failure")]
    Remote {
        operation: &'static str,
        #[source]
        err: ReportFailure,
    },
    #[error("invalid query token")]
    QueryToken {
        #[source]
        err: QueryError,
    },
    #[error("nothing to update")]
    NothingToUpdate,
    #[error("invalid record")]
    InvalidRecord {
        #[from]
        err: RecordError,
    },
    #[error("empty selection")]
    EmptySelection { command: &'static str },
    #[error("failed to serialize output")]
    SerializeOutput {
        #[source]
        err: serde_json::Error,
    },
    #[error("failed to write output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(ReportFailure) -> Self {
        move |err| Self::Remote { operation, err }
    }

    /// Returns the exit code the process should exit with.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Remote { .. } => OarExitCode::REMOTE_FAILURE,
            Self::Config { .. }
            | Self::QueryToken { .. }
            | Self::NothingToUpdate
            | Self::InvalidRecord { .. }
            | Self::EmptySelection { .. } => OarExitCode::SETUP_ERROR,
            Self::SerializeOutput { .. } | Self::WriteOutput { .. } => {
                OarExitCode::WRITE_OUTPUT_FAILED
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::Config { err } => {
                error!("failed to load oar configuration");
                Some(err as &dyn Error)
            }
            Self::Remote { operation, err } => {
                error!(
                    "{} failed: {err}",
                    operation.style(styles.bold)
                );
                err.source()
            }
            Self::QueryToken { err } => {
                error!("invalid query token");
                Some(err as &dyn Error)
            }
            Self::NothingToUpdate => {
                error!(
                    "nothing to update: pass at least one of --summary, --outcome, --analysis, \
                     --resolution or --field"
                );
                None
            }
            Self::InvalidRecord { err } => {
                error!("invalid record: {err}");
                None
            }
            Self::EmptySelection { command } => {
                error!(
                    "`{}` needs at least one of --id or a filter (use --all to select every \
                     record)",
                    command.style(styles.bold)
                );
                None
            }
            Self::SerializeOutput { err } => {
                error!("failed to serialize output");
                Some(err as &dyn Error)
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

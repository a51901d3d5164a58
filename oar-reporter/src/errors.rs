// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by oar-reporter.

use camino::Utf8PathBuf;
use oar_metadata::{QueryError, RecordError};
use std::fmt;
use thiserror::Error;

/// An error that occurs while loading configuration.
///
/// This is the only error that is allowed to stop a test run, since it happens before any test
/// executes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file {path} not found")]
    NotFound {
        /// The path that was requested.
        path: Utf8PathBuf,
    },

    /// The config file has an extension other than `.toml` or `.json`.
    #[error("config file {path} has an unsupported format (must be a .toml or .json file)")]
    UnsupportedFormat {
        /// The offending path.
        path: Utf8PathBuf,
    },

    /// The config sources could not be read or merged.
    #[error("failed to read configuration")]
    Build {
        /// The underlying error.
        #[source]
        error: config::ConfigError,
    },

    /// A configuration value was invalid.
    #[error("invalid configuration value for `{key}`")]
    Deserialize {
        /// The key whose value was invalid.
        key: String,

        /// The underlying error.
        #[source]
        error: config::ConfigError,
    },
}

/// An error that occurs while writing a run report to disk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportWriteError {
    /// The output directory could not be created.
    #[error("failed to create directory {path}")]
    CreateDir {
        /// The directory that failed to be created.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("failed to serialize report")]
    Serialize {
        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },

    /// The report file could not be written.
    #[error("failed to write report to {path}")]
    Write {
        /// The path that failed to be written.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while reading a run report from disk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportReadError {
    /// The report file could not be read.
    #[error("failed to read report at {path}")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The report file is not a valid report.
    #[error("failed to deserialize report at {path}")]
    Deserialize {
        /// The path that failed to be deserialized.
        path: Utf8PathBuf,

        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },
}

/// A failed exchange with the oar service.
///
/// Client operations never panic or otherwise escape the caller's control flow: every failure is
/// logged through the client's sink and returned as one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportFailure {
    /// The service could not be reached, even after retrying.
    #[error("failed to reach oar service: {method} {url} (after {attempts} attempt(s))")]
    Transport {
        /// The request method.
        method: &'static str,

        /// The request URL.
        url: String,

        /// The number of attempts made.
        attempts: u32,

        /// The last error.
        #[source]
        error: ureq::Error,
    },

    /// The service answered with a non-success status.
    #[error(
        "oar service rejected {method} {url} with status {status}{}",
        RejectedSuffix(.message, .retries_exhausted),
    )]
    Rejected {
        /// The request method.
        method: &'static str,

        /// The request URL.
        url: String,

        /// The HTTP status code.
        status: u16,

        /// The error message from the response body, if there was one.
        message: Option<String>,

        /// True if the status was retryable and the retry budget ran out.
        retries_exhausted: bool,
    },

    /// The service answered with a success status, but the body could not be decoded.
    #[error("failed to decode response to {method} {url}")]
    Decode {
        /// The request method.
        method: &'static str,

        /// The request URL.
        url: String,

        /// The underlying error.
        #[source]
        error: ureq::Error,
    },

    /// The record failed local validation and nothing was sent.
    #[error("record failed validation and was not sent")]
    Validation(#[source] RecordError),

    /// The query could not be encoded and nothing was sent.
    #[error("query could not be encoded and was not sent")]
    Query(#[source] QueryError),
}

impl ReportFailure {
    /// Returns the HTTP status code, if the service answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Decode { .. } | Self::Validation(_) | Self::Query(_) => {
                None
            }
        }
    }
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E>(E);

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new chain display for `error`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

struct RejectedSuffix<'a>(&'a Option<String>, &'a bool);

impl fmt::Display for RejectedSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = self.0 {
            write!(f, ": {message}")?;
        }
        if *self.1 {
            f.write_str(" (retries exhausted)")?;
        }
        Ok(())
    }
}

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Runtime support for reporting test results to oar.
//!
//! This crate classifies finished tests, aggregates the results of a run, and sends them to the
//! oar service. Reporting is strictly best-effort: apart from configuration errors, which are
//! raised before any test runs, nothing in this crate fails a test run. Failed exchanges with the
//! service are logged and returned as [`ReportFailure`](errors::ReportFailure) values.
//!
//! Most users want a [`ReportSession`](session::ReportSession), which wires the other pieces
//! together according to an [`OarConfig`](config::OarConfig).
//!
//! For the data model (records, statuses, queries), see the [`oar_metadata`] crate.

pub mod classify;
pub mod client;
pub mod config;
pub mod errors;
pub mod log_sink;
pub mod report;
pub mod retry;
pub mod session;

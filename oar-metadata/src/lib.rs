// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model for oar test results.
//!
//! This crate defines what travels over the wire between a test run and the oar service:
//! [`Record`]s and their status fields, record variants, and [`Query`] filters along with the
//! opaque [`QueryToken`]s they are encoded as. It performs no I/O.
//!
//! For the runtime side (classification, reporting and the HTTP client), see `oar-reporter`.

pub mod errors;
mod query;
mod record;
mod status;

pub use errors::{QueryError, RecordError};
pub use query::{Query, QueryResult, QueryToken};
pub use record::{
    BaseRecord, FieldKind, FieldSpec, RESERVED_FIELDS, Record, RecordVariant, TYPE_FIELD,
    VariantSpec,
};
pub use status::{Analysis, Outcome, Resolution, UnknownStatusError};

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while building records and handling query tokens.

use crate::{
    record::FieldKind,
    status::{Analysis, Outcome, UnknownStatusError},
};
use thiserror::Error;

/// An error that occurs when a record is malformed.
///
/// Records that fail validation are dropped locally and never sent over the wire.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum RecordError {
    /// An extension field used the name of one of the fixed fields.
    #[error("`{field}` is a reserved field and cannot be set as an extension field")]
    ReservedField {
        /// The offending key.
        field: String,
    },

    /// A field held a value of the wrong JSON kind.
    #[error("field `{field}` must be of kind {expected}, found {actual}")]
    FieldType {
        /// The field name.
        field: String,

        /// The kind the field must have.
        expected: FieldKind,

        /// The kind that was found.
        actual: FieldKind,
    },

    /// A status field held an unknown value.
    #[error(transparent)]
    InvalidStatus(#[from] UnknownStatusError),

    /// A status field required for reporting was unset.
    #[error("`{field}` must be set before a record can be reported")]
    MissingStatus {
        /// The unset field.
        field: &'static str,
    },

    /// The summary was unset or blank.
    #[error("summary cannot be blank")]
    BlankSummary,

    /// The analysis contradicts the outcome.
    #[error("analysis {analysis} is not a valid classification of outcome {outcome}")]
    InconsistentVerdict {
        /// The record's outcome.
        outcome: Outcome,

        /// The record's analysis.
        analysis: Analysis,
    },

    /// A field required by a record variant was missing.
    #[error("record variant `{variant}` requires field `{field}`")]
    MissingField {
        /// The variant name.
        variant: &'static str,

        /// The missing field.
        field: &'static str,
    },

    /// A record variant is not a compatible extension of the base record.
    #[error("record variant `{variant}` is incompatible with the base record: field `{field}` {reason}")]
    IncompatibleVariant {
        /// The variant name.
        variant: &'static str,

        /// The field at fault.
        field: &'static str,

        /// Why the field is not allowed.
        reason: &'static str,
    },
}

/// An error that occurs while encoding or decoding a query token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The token was not valid base64.
    #[error("query token is not valid base64")]
    Base64(#[source] base64::DecodeError),

    /// The decoded token was not a valid query.
    #[error("query token does not contain a valid query")]
    Json(#[source] serde_json::Error),

    /// The query could not be serialized.
    #[error("failed to serialize query")]
    Serialize(#[source] serde_json::Error),
}

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test result records.

use crate::{
    errors::RecordError,
    status::{Analysis, Outcome, Resolution},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};

/// Wire names of the fields every record carries. Extension fields may not use these names.
pub const RESERVED_FIELDS: &[&str] = &["id", "summary", "outcome", "analysis", "resolution"];

/// Extension field that names the record variant.
pub const TYPE_FIELD: &str = "type";

/// One reported test result.
///
/// The fixed fields are typed; everything else a test author attaches lives in an open map of
/// extension fields that is merged into the top level of the wire representation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    /// Server-assigned identifier. 0 until the record has been persisted.
    pub id: u64,

    /// Short description of what the test checks.
    pub summary: Option<String>,

    /// Pass/fail verdict.
    pub outcome: Option<Outcome>,

    /// Triage classification.
    pub analysis: Option<Analysis>,

    /// Remediation status.
    pub resolution: Option<Resolution>,

    extra: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record out of a loosely-typed map.
    ///
    /// Reserved keys are type-checked, with `null` meaning unset. All other keys are kept as
    /// extension fields.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, RecordError> {
        let id = match map.remove("id") {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_u64().ok_or_else(|| RecordError::FieldType {
                field: "id".to_owned(),
                expected: FieldKind::Number,
                actual: FieldKind::of(&value),
            })?,
        };
        let summary = take_string(&mut map, "summary")?;
        let outcome = take_string(&mut map, "outcome")?
            .map(|s| s.parse())
            .transpose()?;
        let analysis = take_string(&mut map, "analysis")?
            .map(|s| s.parse())
            .transpose()?;
        let resolution = take_string(&mut map, "resolution")?
            .map(|s| s.parse())
            .transpose()?;

        Ok(Self {
            id,
            summary,
            outcome,
            analysis,
            resolution,
            extra: map.into_iter().collect(),
        })
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: u64) -> &mut Self {
        self.id = id;
        self
    }

    /// Sets the summary.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> &mut Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the outcome.
    pub fn set_outcome(&mut self, outcome: Outcome) -> &mut Self {
        self.outcome = Some(outcome);
        self
    }

    /// Sets the analysis.
    pub fn set_analysis(&mut self, analysis: Analysis) -> &mut Self {
        self.analysis = Some(analysis);
        self
    }

    /// Sets the resolution.
    pub fn set_resolution(&mut self, resolution: Resolution) -> &mut Self {
        self.resolution = Some(resolution);
        self
    }

    /// Inserts an extension field, returning the previous value if there was one.
    ///
    /// Fails if `key` is one of the [`RESERVED_FIELDS`].
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, RecordError> {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return Err(RecordError::ReservedField { field: key });
        }
        Ok(self.extra.insert(key, value.into()))
    }

    /// Returns an extension field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Removes an extension field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.extra.remove(key)
    }

    /// Iterates over extension fields in key order.
    pub fn extra_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.extra.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the record in its wire format.
    ///
    /// `id` is always present, unset optional fields are omitted, and status fields are plain
    /// strings.
    pub fn as_request_body(&self) -> Map<String, Value> {
        let mut body: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        body.insert("id".to_owned(), Value::from(self.id));
        if let Some(summary) = &self.summary {
            body.insert("summary".to_owned(), Value::String(summary.clone()));
        }
        if let Some(outcome) = self.outcome {
            body.insert("outcome".to_owned(), outcome.as_str().into());
        }
        if let Some(analysis) = self.analysis {
            body.insert("analysis".to_owned(), analysis.as_str().into());
        }
        if let Some(resolution) = self.resolution {
            body.insert("resolution".to_owned(), resolution.as_str().into());
        }
        body
    }

    /// Checks that the record carries a verdict the service will accept: a non-blank summary, an
    /// outcome, and an analysis that is consistent with that outcome.
    pub fn check_verdict(&self) -> Result<(), RecordError> {
        if self.summary.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(RecordError::BlankSummary);
        }
        let outcome = self.outcome.ok_or(RecordError::MissingStatus { field: "outcome" })?;
        if let Some(analysis) = self.analysis {
            if !analysis.is_consistent_with(outcome) {
                return Err(RecordError::InconsistentVerdict { outcome, analysis });
            }
        }
        Ok(())
    }

    /// Checks that this record has the shape required by the variant `V`.
    pub fn validate_as<V: RecordVariant>(&self) -> Result<(), RecordError> {
        V::SPEC.validate(self)
    }
}

fn take_string(map: &mut Map<String, Value>, field: &str) -> Result<Option<String>, RecordError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(RecordError::FieldType {
            field: field.to_owned(),
            expected: FieldKind::String,
            actual: FieldKind::of(&other),
        }),
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_request_body().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::deserialize(deserializer)?;
        Record::from_map(map).map_err(D::Error::custom)
    }
}

/// The JSON kind of a field value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Any value, including `null`.
    Any,
    /// `null`.
    Null,
    /// `true` or `false`.
    Bool,
    /// A number.
    Number,
    /// A string.
    String,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl FieldKind {
    /// Returns the kind of `value`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Returns true if `value` is of this kind.
    pub fn matches(self, value: &Value) -> bool {
        self == Self::Any || self == Self::of(value)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(s)
    }
}

/// An extension field that a record variant requires.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    /// The field's wire name.
    pub name: &'static str,

    /// The JSON kind the value must have.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Creates a new field spec.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// The shape of a record variant: the base record plus a set of required extension fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VariantSpec {
    /// Name written to the `type` field of finalized records. `None` for the base record.
    pub name: Option<&'static str>,

    /// Extension fields every record of this variant must carry.
    pub required: &'static [FieldSpec],
}

impl VariantSpec {
    /// The base record: no name, no required fields.
    pub const BASE: Self = Self {
        name: None,
        required: &[],
    };

    /// Creates a named variant.
    pub const fn new(name: &'static str, required: &'static [FieldSpec]) -> Self {
        Self {
            name: Some(name),
            required,
        }
    }

    /// Checks that this variant only adds to the base record.
    ///
    /// A variant may not redefine a reserved field, declare a field twice, or declare `type` as
    /// anything other than a string.
    pub fn check_compatible(&self) -> Result<(), RecordError> {
        let variant = self.name.unwrap_or("base");
        for (index, field) in self.required.iter().enumerate() {
            if RESERVED_FIELDS.contains(&field.name) {
                return Err(RecordError::IncompatibleVariant {
                    variant,
                    field: field.name,
                    reason: "redefines a reserved field",
                });
            }
            if field.name == TYPE_FIELD && !matches!(field.kind, FieldKind::String | FieldKind::Any)
            {
                return Err(RecordError::IncompatibleVariant {
                    variant,
                    field: field.name,
                    reason: "`type` holds the variant name and must be a string",
                });
            }
            if self.required[..index].iter().any(|f| f.name == field.name) {
                return Err(RecordError::IncompatibleVariant {
                    variant,
                    field: field.name,
                    reason: "declared more than once",
                });
            }
        }
        Ok(())
    }

    /// Checks that `record` has the shape of this variant.
    pub fn validate(&self, record: &Record) -> Result<(), RecordError> {
        self.check_compatible()?;
        let variant = self.name.unwrap_or("base");
        for field in self.required {
            let value = record.get(field.name).ok_or(RecordError::MissingField {
                variant,
                field: field.name,
            })?;
            if !field.kind.matches(value) {
                return Err(RecordError::FieldType {
                    field: field.name.to_owned(),
                    expected: field.kind,
                    actual: FieldKind::of(value),
                });
            }
        }
        Ok(())
    }
}

/// A record variant, declared at the type level.
///
/// Callers that report a specialized kind of result pick the variant as a type parameter; the
/// runtime validates records against [`Self::SPEC`] before they are reported.
///
/// ```
/// use oar_metadata::{FieldKind, FieldSpec, RecordVariant, VariantSpec};
///
/// struct LoadTest;
///
/// impl RecordVariant for LoadTest {
///     const SPEC: VariantSpec = VariantSpec::new(
///         "load",
///         &[FieldSpec::new("maxRPS", FieldKind::Number)],
///     );
/// }
/// ```
pub trait RecordVariant {
    /// The shape of this variant.
    const SPEC: VariantSpec;
}

/// The plain record, with no additional fields.
#[derive(Copy, Clone, Debug, Default)]
pub struct BaseRecord;

impl RecordVariant for BaseRecord {
    const SPEC: VariantSpec = VariantSpec::BASE;
}

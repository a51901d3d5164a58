// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filters over stored records, and the opaque tokens they travel as.
//!
//! A [`Query`] is serialized to canonical JSON (wire field names, fixed field order, absent
//! fields omitted, timestamps as `YYYY-MM-DDTHH:MM:SSZ`) and then base64-encoded to produce a
//! [`QueryToken`]. Every filterable remote operation takes the token as its `query` parameter.

use crate::{
    errors::QueryError,
    record::Record,
    status::{Analysis, Outcome, Resolution},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

/// A filter over stored records.
///
/// Every field is optional and an empty query matches every record. Multiple values within one
/// field are alternatives; multiple fields must all match.
///
/// Equality ignores the four timestamp bounds.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Record ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u64>>,

    /// Summary patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<String>>,

    /// Outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<Outcome>>,

    /// Analyses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyses: Option<Vec<Analysis>>,

    /// Resolutions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions: Option<Vec<Resolution>>,

    /// Only records created before this time.
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,

    /// Only records created after this time.
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    /// Only records modified before this time.
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub modified_before: Option<DateTime<Utc>>,

    /// Only records modified after this time.
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub modified_after: Option<DateTime<Utc>>,

    /// Document fragments; a record matches if it contains any of them.
    ///
    /// Keys are serialized in sorted order at every level, whatever order they were inserted in.
    #[serde(
        default,
        serialize_with = "sorted_docs::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub docs: Option<Vec<Map<String, Value>>>,
}

impl Query {
    /// Creates a query that matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to the given ids.
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    /// Restricts the query to summaries matching any of the given patterns.
    pub fn with_summaries(mut self, summaries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.summaries = Some(summaries.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the query to the given outcomes.
    pub fn with_outcomes(mut self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.outcomes = Some(outcomes.into_iter().collect());
        self
    }

    /// Restricts the query to the given analyses.
    pub fn with_analyses(mut self, analyses: impl IntoIterator<Item = Analysis>) -> Self {
        self.analyses = Some(analyses.into_iter().collect());
        self
    }

    /// Restricts the query to the given resolutions.
    pub fn with_resolutions(mut self, resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        self.resolutions = Some(resolutions.into_iter().collect());
        self
    }

    /// Adds a document fragment.
    pub fn with_doc(mut self, doc: Map<String, Value>) -> Self {
        self.docs.get_or_insert_with(Vec::new).push(doc);
        self
    }

    /// Returns true if no field is set, i.e. the query matches every record.
    pub fn is_empty(&self) -> bool {
        let Self {
            ids,
            summaries,
            outcomes,
            analyses,
            resolutions,
            created_before,
            created_after,
            modified_before,
            modified_after,
            docs,
        } = self;
        ids.is_none()
            && summaries.is_none()
            && outcomes.is_none()
            && analyses.is_none()
            && resolutions.is_none()
            && created_before.is_none()
            && created_after.is_none()
            && modified_before.is_none()
            && modified_after.is_none()
            && docs.is_none()
    }

    /// Encodes this query as a token.
    ///
    /// Encoding is deterministic: the same query always produces the same token.
    pub fn to_token(&self) -> Result<QueryToken, QueryError> {
        let json = serde_json::to_vec(self).map_err(QueryError::Serialize)?;
        Ok(QueryToken(STANDARD.encode(json)))
    }

    /// Decodes a query from a token string.
    pub fn from_token(token: &str) -> Result<Self, QueryError> {
        let json = STANDARD
            .decode(token.trim())
            .map_err(QueryError::Base64)?;
        serde_json::from_slice(&json).map_err(QueryError::Json)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps come from real clocks and aren't reproducible, so they're left out.
        self.ids == other.ids
            && self.summaries == other.summaries
            && self.outcomes == other.outcomes
            && self.analyses == other.analyses
            && self.resolutions == other.resolutions
            && self.docs == other.docs
    }
}

/// The wire form of a [`Query`]: base64 over its canonical JSON.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryToken(String);

impl QueryToken {
    /// Returns the token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the query this token stands for.
    pub fn decode(&self) -> Result<Query, QueryError> {
        Query::from_token(&self.0)
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueryToken {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Query::from_token(s)?;
        Ok(Self(s.trim().to_owned()))
    }
}

impl TryFrom<String> for QueryToken {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<QueryToken> for String {
    fn from(token: QueryToken) -> Self {
        token.0
    }
}

/// One page of records matching a query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Total number of matching records, across all pages.
    pub count: u64,

    /// The records on this page.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tests: Vec<Record>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Record>>::deserialize(deserializer)?.unwrap_or_default())
}

mod sorted_docs {
    use serde::Serializer;
    use serde_json::{Map, Value};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S>(
        docs: &Option<Vec<Map<String, Value>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match docs {
            Some(docs) => serializer.collect_seq(docs.iter().map(sorted_map)),
            None => serializer.serialize_none(),
        }
    }

    // `Map` keeps insertion order when serde_json's `preserve_order` feature is unified in.
    fn sorted_map(map: &Map<String, Value>) -> Map<String, Value> {
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        entries
            .into_iter()
            .map(|(key, value)| (key.clone(), sorted_value(value)))
            .collect()
    }

    fn sorted_value(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(sorted_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(sorted_value).collect()),
            other => other.clone(),
        }
    }
}

mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.collect_str(&time.format(FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| parse(&s).map_err(D::Error::custom))
            .transpose()
    }

    // Tokens produced by the service carry full RFC 3339 timestamps.
    pub(super) fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(s).map(|time| time.with_timezone(&Utc)))
    }
}

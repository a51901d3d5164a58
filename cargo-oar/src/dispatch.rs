// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use oar_metadata::{Analysis, Outcome, Query, QueryToken, Record, Resolution};
use oar_reporter::{
    client::{Client, ClientBuilder, DEFAULT_LIST_LIMIT, DeleteOutcome, MAX_LIST_LIMIT},
    config::{ConfigLocation, OarConfig},
    log_sink::LogSink,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use tracing::debug;

/// Query, edit and delete test results stored in oar.
#[derive(Debug, Parser)]
#[command(version, name = "oar", styles = crate::output::clap_styles::style())]
pub struct OarApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl OarApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, writing command output to `out`.
    pub fn exec(self, output: OutputContext, out: &mut dyn Write) -> Result<()> {
        let Self {
            config_opts,
            command,
            ..
        } = self;
        let mut ctx = ExecContext {
            config_opts,
            output,
            out,
        };
        command.exec(&mut ctx)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: oar-config.toml in the current directory]
    ///
    /// Pass `none` to ignore config files and use defaults and OAR_* environment variables only.
    #[arg(long, global = true, value_name = "PATH", env = "OAR_CONFIG_PATH")]
    config: Option<Utf8PathBuf>,

    /// Base URL of the oar service, overriding the configured host
    #[arg(long, global = true, value_name = "URL", env = "OAR_HOST")]
    host: Option<String>,
}

impl ConfigOpts {
    fn make_config(&self) -> Result<OarConfig> {
        let location = ConfigLocation::from_cli_or_env(self.config.as_deref().map(|p| p.as_str()));
        let mut config = OarConfig::load(location)?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        Ok(config)
    }
}

struct ExecContext<'a> {
    config_opts: ConfigOpts,
    output: OutputContext,
    out: &'a mut dyn Write,
}

impl ExecContext<'_> {
    fn client(&self) -> Result<Client> {
        let config = self.config_opts.make_config()?;
        // Failures are reported once, on exit. In verbose mode, show retries and failures as they
        // happen too.
        let sink = if self.output.verbose {
            LogSink::current()
        } else {
            LogSink::none()
        };
        debug!("using oar service at {}", config.base_url());
        Ok(ClientBuilder::from_config(&config).log_sink(sink).build())
    }

    fn write_line(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "{line}").map_err(|err| ExpectedError::WriteOutput { err })
    }

    fn write_json(&mut self, value: &impl Serialize) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| ExpectedError::SerializeOutput { err })?;
        self.write_line(json)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode or decode query tokens
    #[command(subcommand)]
    Query(QueryCommand),

    /// List stored results matching a filter
    List {
        #[command(flatten)]
        filter: FilterOpts,

        /// Number of matching results to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Maximum number of results to return
        #[arg(
            long,
            default_value_t = DEFAULT_LIST_LIMIT,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_LIST_LIMIT)),
        )]
        limit: u32,
    },

    /// Delete stored results
    ///
    /// With only --id, the given ids are deleted. Otherwise every result matching the filter is
    /// deleted.
    Delete {
        #[command(flatten)]
        filter: FilterOpts,

        /// Delete every stored result
        #[arg(long, conflicts_with = "filter")]
        all: bool,
    },

    /// Update fields of stored results
    ///
    /// With a single --id, that result is updated. Otherwise every result selected by the ids or
    /// the token is updated.
    Enrich {
        /// Ids of the results to update
        #[arg(long = "id", value_name = "ID", required_unless_present = "token")]
        ids: Vec<u64>,

        /// Update the results matching this query token
        #[arg(long, value_name = "TOKEN", conflicts_with = "ids")]
        token: Option<QueryToken>,

        #[command(flatten)]
        update: UpdateOpts,
    },
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    /// Print the token for a filter
    Encode {
        #[command(flatten)]
        filter: FilterOpts,

        /// Ask the oar service to encode the filter instead of encoding it locally
        #[arg(long)]
        remote: bool,
    },

    /// Print the filter a token encodes, as JSON
    Decode {
        /// The token to decode
        #[arg(value_name = "TOKEN")]
        token: QueryToken,
    },
}

impl Command {
    fn exec(self, ctx: &mut ExecContext<'_>) -> Result<()> {
        match self {
            Self::Query(QueryCommand::Encode { filter, remote }) => {
                let query = filter.to_query()?;
                let token = if remote {
                    ctx.client()?
                        .encode_query(&query)
                        .map_err(ExpectedError::remote("encode query"))?
                } else {
                    query
                        .to_token()
                        .map_err(|err| ExpectedError::QueryToken { err })?
                };
                ctx.write_line(token)
            }
            Self::Query(QueryCommand::Decode { token }) => {
                let query = token
                    .decode()
                    .map_err(|err| ExpectedError::QueryToken { err })?;
                ctx.write_json(&query)
            }
            Self::List {
                filter,
                offset,
                limit,
            } => {
                let query = filter.to_query()?;
                let result = ctx
                    .client()?
                    .list(&query, offset, Some(limit))
                    .map_err(ExpectedError::remote("list"))?;
                ctx.write_json(&result)
            }
            Self::Delete { filter, all } => {
                let query = filter.to_query()?;
                if query.is_empty() && !all {
                    return Err(ExpectedError::EmptySelection { command: "delete" });
                }
                let client = ctx.client()?;
                let outcome = match filter.ids_only() {
                    Some(ids) => client.delete_by_ids(ids),
                    None => client.delete_by_query(&query),
                }
                .map_err(ExpectedError::remote("delete"))?;
                ctx.write_line(match outcome {
                    DeleteOutcome::Applied => "deleted matching results",
                    DeleteOutcome::NothingMatched => "no results matched",
                })
            }
            Self::Enrich { ids, token, update } => {
                let mut record = update.to_record()?;
                let client = ctx.client()?;
                match (ids.as_slice(), token) {
                    ([id], None) => {
                        record.set_id(*id);
                        client.enrich(&record)
                    }
                    (_, Some(token)) => {
                        let query = token
                            .decode()
                            .map_err(|err| ExpectedError::QueryToken { err })?;
                        client.enrich_by_query(&record, &query)
                    }
                    (ids, None) => {
                        client.enrich_by_query(&record, &Query::new().with_ids(ids.iter().copied()))
                    }
                }
                .map_err(ExpectedError::remote("enrich"))?;
                ctx.write_line("updated")
            }
        }
    }
}

#[derive(Debug, Default, Args)]
#[group(id = "filter", multiple = true)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Match these ids
    #[arg(long = "id", value_name = "ID")]
    ids: Vec<u64>,

    /// Match these summaries
    #[arg(long = "summary", value_name = "SUMMARY")]
    summaries: Vec<String>,

    /// Match these outcomes
    #[arg(long = "outcome", value_name = "OUTCOME")]
    outcomes: Vec<Outcome>,

    /// Match these analyses
    #[arg(long = "analysis", value_name = "ANALYSIS")]
    analyses: Vec<Analysis>,

    /// Match these resolutions
    #[arg(long = "resolution", value_name = "RESOLUTION")]
    resolutions: Vec<Resolution>,

    /// Match results created before this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    created_before: Option<DateTime<Utc>>,

    /// Match results created after this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    created_after: Option<DateTime<Utc>>,

    /// Match results modified before this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    modified_before: Option<DateTime<Utc>>,

    /// Match results modified after this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    modified_after: Option<DateTime<Utc>>,

    /// Match results containing this JSON object
    #[arg(long = "doc", value_name = "JSON", value_parser = parse_doc)]
    docs: Vec<Map<String, Value>>,

    /// Use the filter encoded in this token
    #[arg(
        long,
        value_name = "TOKEN",
        conflicts_with_all = [
            "ids", "summaries", "outcomes", "analyses", "resolutions", "created_before",
            "created_after", "modified_before", "modified_after", "docs",
        ],
    )]
    token: Option<QueryToken>,
}

impl FilterOpts {
    fn to_query(&self) -> Result<Query> {
        if let Some(token) = &self.token {
            return token
                .decode()
                .map_err(|err| ExpectedError::QueryToken { err });
        }

        fn non_empty<T: Clone>(values: &[T]) -> Option<Vec<T>> {
            (!values.is_empty()).then(|| values.to_vec())
        }

        Ok(Query {
            ids: non_empty(&self.ids),
            summaries: non_empty(&self.summaries),
            outcomes: non_empty(&self.outcomes),
            analyses: non_empty(&self.analyses),
            resolutions: non_empty(&self.resolutions),
            created_before: self.created_before,
            created_after: self.created_after,
            modified_before: self.modified_before,
            modified_after: self.modified_after,
            docs: non_empty(&self.docs),
        })
    }

    /// Returns the ids if they are the only thing this filter selects on.
    fn ids_only(&self) -> Option<&[u64]> {
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
            token,
        } = self;
        let only_ids = !ids.is_empty()
            && summaries.is_empty()
            && outcomes.is_empty()
            && analyses.is_empty()
            && resolutions.is_empty()
            && created_before.is_none()
            && created_after.is_none()
            && modified_before.is_none()
            && modified_after.is_none()
            && docs.is_empty()
            && token.is_none();
        only_ids.then_some(ids.as_slice())
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Update options")]
struct UpdateOpts {
    /// Set the summary
    #[arg(long, value_name = "SUMMARY")]
    summary: Option<String>,

    /// Set the outcome
    #[arg(long, value_name = "OUTCOME")]
    outcome: Option<Outcome>,

    /// Set the analysis
    #[arg(long, value_name = "ANALYSIS")]
    analysis: Option<Analysis>,

    /// Set the resolution
    #[arg(long, value_name = "RESOLUTION")]
    resolution: Option<Resolution>,

    /// Set an additional field, as KEY=JSON (a value that is not valid JSON is used as a string)
    #[arg(long = "field", value_name = "KEY=JSON", value_parser = parse_field)]
    fields: Vec<(String, Value)>,
}

impl UpdateOpts {
    fn to_record(&self) -> Result<Record> {
        let mut record = Record::new();
        if let Some(summary) = &self.summary {
            record.set_summary(summary.clone());
        }
        if let Some(outcome) = self.outcome {
            record.set_outcome(outcome);
        }
        if let Some(analysis) = self.analysis {
            record.set_analysis(analysis);
        }
        if let Some(resolution) = self.resolution {
            record.set_resolution(resolution);
        }
        for (key, value) in &self.fields {
            record.insert(key.clone(), value.clone())?;
        }
        // `id` is always present.
        if record.as_request_body().len() == 1 {
            return Err(ExpectedError::NothingToUpdate);
        }
        debug!("update body: {:?}", record.as_request_body());
        Ok(record)
    }
}

fn parse_doc(input: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_owned()),
        Err(error) => Err(error.to_string()),
    }
}

fn parse_field(input: &str) -> Result<(String, Value), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| "expected KEY=JSON".to_owned())?;
    if key.is_empty() {
        return Err("key must not be empty".to_owned());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

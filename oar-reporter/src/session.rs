// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run wiring of classification, reporting and aggregation.
//!
//! A [`ReportSession`] is created once per run from an [`OarConfig`]. Each test gets a
//! [`TestCase`] from [`ReportSession::start_test`], fills in its record and phase results, and
//! hands it back to [`ReportSession::finish_test`]. At the end of the run,
//! [`ReportSession::finish`] logs the summary and writes the report file.

use crate::{
    classify::{self, Phase, PhaseResult, PhaseResults},
    client::{Client, ClientBuilder},
    config::OarConfig,
    errors::DisplayErrorChain,
    log_sink::LogSink,
    report::RunReport,
};
use camino::Utf8PathBuf;
use oar_metadata::{Record, RecordError, RecordVariant};
use std::marker::PhantomData;
use tracing::{debug, error, warn};

/// The reporting state of one run.
#[derive(Debug)]
pub struct ReportSession {
    config: OarConfig,
    client: Option<Client>,
    report: Option<RunReport>,
    sink: LogSink,
}

impl ReportSession {
    /// Creates a session for a run.
    ///
    /// A client is only created if `send_results` is set, and records are only kept if
    /// `store_results` or `output_file` is set.
    pub fn new(config: OarConfig, sink: LogSink) -> Self {
        let client = config.send_results.then(|| {
            ClientBuilder::from_config(&config)
                .log_sink(sink.clone())
                .build()
        });
        let report = (config.store_results || config.output_file)
            .then(|| RunReport::new(sink.clone()));
        Self {
            config,
            client,
            report,
            sink,
        }
    }

    /// Returns the configuration of this session.
    pub fn config(&self) -> &OarConfig {
        &self.config
    }

    /// Returns the client, if results are sent to the service.
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    /// Returns the report, if results are kept.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Starts a test named `name`, whose record must satisfy the variant `V`.
    pub fn start_test<V: RecordVariant>(&self, name: impl Into<String>) -> TestCase<V> {
        TestCase {
            name: name.into(),
            record: Record::new(),
            phases: PhaseResults::default(),
            _variant: PhantomData,
        }
    }

    /// Finishes a test.
    ///
    /// The record is finalized from the test's phase results and validated. If it is valid, it is
    /// sent to the service (if enabled) and added to the report (if enabled). A failure to send is
    /// logged and does not affect the result; the record then keeps an id of 0.
    ///
    /// If the record is invalid, the error is logged and returned, and the record is dropped.
    pub fn finish_test<V: RecordVariant>(
        &mut self,
        case: TestCase<V>,
    ) -> Result<Record, RecordError> {
        let TestCase {
            name,
            mut record,
            phases,
            ..
        } = case;

        classify::finalize(&mut record, &name, &phases, &V::SPEC);
        let validated = record
            .validate_as::<V>()
            .and_then(|()| record.check_verdict());
        if let Err(error) = validated {
            self.sink.in_scope(|| {
                error!(
                    "oar: record for {name} is invalid and was dropped: {}",
                    DisplayErrorChain::new(&error)
                )
            });
            return Err(error);
        }

        if let Some(client) = &self.client {
            // The client logs its own failures.
            if let Ok(id) = client.add(&record) {
                record.set_id(id);
                self.sink
                    .in_scope(|| debug!("oar: reported {name} with id {id}"));
            }
        }

        if let Some(report) = &mut self.report {
            report.add(record.clone());
        }
        Ok(record)
    }

    /// Finishes the run.
    ///
    /// Logs the summary if results are kept, and writes the report file if `output_file` is set.
    /// Returns the path of the report file if one was written.
    pub fn finish(&mut self) -> Option<Utf8PathBuf> {
        let report = self.report.as_mut()?;
        report.finalize();
        if self.config.store_results {
            report.log_summary();
        }

        if !self.config.output_file {
            return None;
        }
        match report.write_json(&self.config.output_dir) {
            Ok(path) => Some(path),
            Err(error) => {
                self.sink.in_scope(|| {
                    warn!(
                        "oar: failed to write results file: {}",
                        DisplayErrorChain::new(&error)
                    )
                });
                None
            }
        }
    }
}

/// A test in progress.
///
/// `V` is the record variant the finished record is validated against.
#[derive(Debug)]
pub struct TestCase<V> {
    name: String,
    record: Record,
    phases: PhaseResults,
    _variant: PhantomData<fn() -> V>,
}

impl<V: RecordVariant> TestCase<V> {
    /// Returns the name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Returns the record for the test to fill in.
    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Records the result of a phase.
    pub fn record_phase(&mut self, phase: Phase, result: PhaseResult) {
        self.phases.record(phase, result);
    }

    /// Returns the phase results recorded so far.
    pub fn phases(&self) -> &PhaseResults {
        &self.phases
    }
}

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collecting the records of a run, summarizing them, and writing them to disk.

use crate::{
    errors::{ReportReadError, ReportWriteError},
    log_sink::LogSink,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use oar_metadata::{Analysis, Outcome, Record, Resolution};
use serde::{Deserialize, Serialize};
use std::{fs, io::Write};
use tracing::{debug, info};

/// The records reported during one run, in the order they were added.
#[derive(Clone, Debug)]
pub struct RunReport {
    start_time: DateTime<Utc>,
    completed_time: Option<DateTime<Utc>>,
    tests: Vec<Record>,
    sink: LogSink,
}

impl RunReport {
    /// Creates an empty report, with the start time set to now.
    pub fn new(sink: LogSink) -> Self {
        Self {
            start_time: Utc::now(),
            completed_time: None,
            tests: Vec::new(),
            sink,
        }
    }

    /// Returns the time the report was created.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns the time the report was finalized, if it has been.
    pub fn completed_time(&self) -> Option<DateTime<Utc>> {
        self.completed_time
    }

    /// Appends a record.
    ///
    /// Records are never merged, even if they share an id. A record without an outcome is listed
    /// by [`Self::all_ids`] but by neither [`Self::passed_ids`] nor [`Self::failed_ids`].
    pub fn add(&mut self, record: Record) {
        self.tests.push(record);
    }

    /// Returns all records, in the order they were added.
    pub fn tests(&self) -> &[Record] {
        &self.tests
    }

    /// Marks the run as completed.
    ///
    /// Only the first call has an effect.
    pub fn finalize(&mut self) {
        self.completed_time.get_or_insert_with(Utc::now);
    }

    /// Returns the ids of all records.
    pub fn all_ids(&self) -> Vec<u64> {
        self.ids_where(|_| true)
    }

    /// Returns the ids of records that passed.
    pub fn passed_ids(&self) -> Vec<u64> {
        self.ids_where(|record| record.outcome == Some(Outcome::Passed))
    }

    /// Returns the ids of records that failed.
    pub fn failed_ids(&self) -> Vec<u64> {
        self.ids_where(|record| record.outcome == Some(Outcome::Failed))
    }

    /// Returns the ids of records that have not been analyzed.
    pub fn need_analysis_ids(&self) -> Vec<u64> {
        self.ids_where(|record| record.analysis == Some(Analysis::NotAnalyzed))
    }

    /// Returns the ids of records that are unresolved.
    pub fn need_resolution_ids(&self) -> Vec<u64> {
        self.ids_where(|record| record.resolution == Some(Resolution::Unresolved))
    }

    fn ids_where(&self, pred: impl Fn(&Record) -> bool) -> Vec<u64> {
        self.tests
            .iter()
            .filter(|record| pred(record))
            .map(|record| record.id)
            .collect()
    }

    /// Returns the end-of-run summary.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            start_time: self.start_time,
            completed_time: self.completed_time,
            passed_ids: self.passed_ids(),
            failed_ids: self.failed_ids(),
            need_analysis_ids: self.need_analysis_ids(),
            need_resolution_ids: self.need_resolution_ids(),
        }
    }

    /// Logs the end-of-run summary at info level.
    pub fn log_summary(&self) {
        let summary = self.summary();
        self.sink.in_scope(|| {
            info!("============ OAR SUMMARY ============");
            info!("started: {}", summary.start_time);
            match summary.completed_time {
                Some(completed_time) => info!("completed: {completed_time}"),
                None => info!("completed: (still running)"),
            }
            info!("passed ids: {:?}", summary.passed_ids);
            info!("failed ids: {:?}", summary.failed_ids);
            info!("ids that need analysis: {:?}", summary.need_analysis_ids);
            info!("ids that need resolution: {:?}", summary.need_resolution_ids);
            info!("=====================================");
        });
    }

    /// Returns the full state of the report, as written to disk.
    pub fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot {
            start_time: self.start_time,
            completed_time: self.completed_time,
            summary: self.summary(),
            tests: self.tests.clone(),
        }
    }

    /// Returns the name of the file this report is written to.
    pub fn file_name(&self) -> String {
        format!(
            "oar-results-{}.json",
            self.completed_time
                .unwrap_or(self.start_time)
                .format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Writes the report as JSON to a timestamped file in `output_dir`, creating the directory if
    /// necessary. Returns the path of the file.
    ///
    /// The file is written atomically: readers see either the complete report or no file.
    pub fn write_json(&self, output_dir: &Utf8Path) -> Result<Utf8PathBuf, ReportWriteError> {
        fs::create_dir_all(output_dir).map_err(|error| ReportWriteError::CreateDir {
            path: output_dir.to_owned(),
            error,
        })?;

        let contents = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|error| ReportWriteError::Serialize { error })?;

        let path = output_dir.join(self.file_name());
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&contents))
            .map_err(|error| ReportWriteError::Write {
                path: path.clone(),
                error: match error {
                    atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => {
                        error
                    }
                },
            })?;

        self.sink
            .in_scope(|| debug!("wrote report with {} records to {path}", self.tests.len()));
        Ok(path)
    }
}

/// The end-of-run summary of a [`RunReport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// When the run started.
    pub start_time: DateTime<Utc>,

    /// When the run completed.
    pub completed_time: Option<DateTime<Utc>>,

    /// Ids of records that passed.
    pub passed_ids: Vec<u64>,

    /// Ids of records that failed.
    pub failed_ids: Vec<u64>,

    /// Ids of records that need analysis.
    pub need_analysis_ids: Vec<u64>,

    /// Ids of records that need resolution.
    pub need_resolution_ids: Vec<u64>,
}

/// A report as written to disk by [`RunReport::write_json`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    /// When the run started.
    pub start_time: DateTime<Utc>,

    /// When the run completed.
    pub completed_time: Option<DateTime<Utc>>,

    /// The end-of-run summary.
    pub summary: ReportSummary,

    /// Every record of the run, in the order they were added.
    pub tests: Vec<Record>,
}

impl ReportSnapshot {
    /// Reads a report from disk.
    pub fn load(path: &Utf8Path) -> Result<Self, ReportReadError> {
        let contents = fs::read_to_string(path).map_err(|error| ReportReadError::Read {
            path: path.to_owned(),
            error,
        })?;
        serde_json::from_str(&contents).map_err(|error| ReportReadError::Deserialize {
            path: path.to_owned(),
            error,
        })
    }
}

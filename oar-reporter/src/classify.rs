// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deriving a record's status fields from per-phase results.
//!
//! A test executes in up to three phases: setup, call and teardown. [`Verdict::from_phases`]
//! maps the phase results to an outcome, analysis and resolution. The rules are evaluated in
//! order and the first one that applies wins:
//!
//! | condition                    | outcome | analysis      | resolution |
//! |------------------------------|---------|---------------|------------|
//! | setup failed                 | Failed  | FalsePositive | Unresolved |
//! | call absent or failed        | Failed  | NotAnalyzed   | Unresolved |
//! | teardown present and failed  | Failed  | FalsePositive | Unresolved |
//! | otherwise                    | Passed  | TrueNegative  | NotNeeded  |
//!
//! [`finalize`] applies a verdict to a record but only fills in fields that are still unset, so a
//! test can declare its own verdict and have it survive.

use oar_metadata::{Analysis, Outcome, Record, Resolution, TYPE_FIELD, VariantSpec};
use std::fmt;

/// The result of a single phase.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum PhaseResult {
    /// The phase completed without failing.
    #[default]
    Passed,

    /// The phase failed.
    Failed,
}

impl PhaseResult {
    /// Creates a phase result from a "did this phase fail" flag.
    pub fn from_failed(failed: bool) -> Self {
        if failed { Self::Failed } else { Self::Passed }
    }

    /// Returns true if the phase failed.
    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }
}

/// A phase of test execution.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Fixtures and other preparation run before the test body.
    Setup,

    /// The test body.
    Call,

    /// Cleanup run after the test body.
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Call => f.write_str("call"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// The recorded results of all phases of one test.
///
/// `call` is absent if setup failed before the test body ran. `teardown` is absent if it never
/// ran. A setup phase that was never recorded counts as passed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhaseResults {
    /// The setup phase.
    pub setup: PhaseResult,

    /// The call phase, if it ran.
    pub call: Option<PhaseResult>,

    /// The teardown phase, if it ran.
    pub teardown: Option<PhaseResult>,
}

impl PhaseResults {
    /// Builds phase results from a sequence of `(phase, result)` pairs.
    ///
    /// If a phase appears more than once, the last result wins.
    pub fn from_phases(phases: impl IntoIterator<Item = (Phase, PhaseResult)>) -> Self {
        let mut results = Self::default();
        for (phase, result) in phases {
            results.record(phase, result);
        }
        results
    }

    /// Records the result of a phase.
    pub fn record(&mut self, phase: Phase, result: PhaseResult) {
        match phase {
            Phase::Setup => self.setup = result,
            Phase::Call => self.call = Some(result),
            Phase::Teardown => self.teardown = Some(result),
        }
    }
}

/// The status fields derived from a test's phase results.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    /// The outcome.
    pub outcome: Outcome,

    /// The analysis.
    pub analysis: Analysis,

    /// The resolution.
    pub resolution: Resolution,
}

impl Verdict {
    const SETUP_FAILED: Self = Self::new(
        Outcome::Failed,
        Analysis::FalsePositive,
        Resolution::Unresolved,
    );
    const CALL_FAILED: Self = Self::new(
        Outcome::Failed,
        Analysis::NotAnalyzed,
        Resolution::Unresolved,
    );
    const TEARDOWN_FAILED: Self = Self::new(
        Outcome::Failed,
        Analysis::FalsePositive,
        Resolution::Unresolved,
    );
    const PASSED: Self = Self::new(
        Outcome::Passed,
        Analysis::TrueNegative,
        Resolution::NotNeeded,
    );

    const fn new(outcome: Outcome, analysis: Analysis, resolution: Resolution) -> Self {
        Self {
            outcome,
            analysis,
            resolution,
        }
    }

    /// Classifies a test by its phase results.
    pub fn from_phases(phases: &PhaseResults) -> Self {
        if phases.setup.is_failed() {
            Self::SETUP_FAILED
        } else if phases.call.is_none_or(PhaseResult::is_failed) {
            Self::CALL_FAILED
        } else if phases.teardown.is_some_and(PhaseResult::is_failed) {
            Self::TEARDOWN_FAILED
        } else {
            Self::PASSED
        }
    }

    /// Fills in the status fields of `record` that are still unset.
    pub fn apply_to(&self, record: &mut Record) {
        record.outcome.get_or_insert(self.outcome);
        record.analysis.get_or_insert(self.analysis);
        record.resolution.get_or_insert(self.resolution);
    }
}

/// Finalizes a record at the end of a test.
///
/// The summary defaults to `test_name`. The status fields are classified from `phases`, leaving
/// any field the test already set untouched. Finally, if `variant` is named and the record has no
/// `type` field, `type` is set to the variant's name.
pub fn finalize(record: &mut Record, test_name: &str, phases: &PhaseResults, variant: &VariantSpec) {
    if record.summary.is_none() {
        record.set_summary(test_name);
    }

    Verdict::from_phases(phases).apply_to(record);

    if let Some(name) = variant.name
        && record.get(TYPE_FIELD).is_none()
    {
        // `type` is not a reserved field, so inserting it cannot fail.
        let _ = record.insert(TYPE_FIELD, name);
    }
}

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The three status fields of a test result: outcome, analysis and resolution.
//!
//! Each status is a closed set of variants. On the wire and in [`Display`](fmt::Display) output a
//! status is always its plain variant name, e.g. `"TruePositive"`.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[cfg_attr(any(test, feature = "proptest1"), derive(test_strategy::Arbitrary))]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            const VARIANTS: &'static [&'static str] = &[$(stringify!($variant)),+];

            /// Returns the wire name of this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }

            /// Returns the names of all known values, in declaration order.
            pub fn variants() -> &'static [&'static str] {
                Self::VARIANTS
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    _ => Err(UnknownStatusError::new($kind, s, Self::VARIANTS)),
                }
            }
        }
    };
}

status_enum! {
    /// The binary pass/fail verdict of a test execution.
    Outcome, "outcome" {
        /// The test passed.
        Passed,
        /// The test failed.
        Failed,
    }
}

status_enum! {
    /// Triage classification of a result.
    ///
    /// A positive is a failed test, a negative a passed one; true and false refer to whether the
    /// verdict reflects the behavior of the system under test.
    Analysis, "analysis" {
        /// Nobody has looked at this result yet.
        NotAnalyzed,
        /// The test failed because of a real defect.
        TruePositive,
        /// The test failed, but the system under test is fine.
        FalsePositive,
        /// The test passed and the system under test is fine.
        TrueNegative,
        /// The test passed even though the system under test is broken.
        FalseNegative,
    }
}

status_enum! {
    /// Remediation status of an analyzed result.
    Resolution, "resolution" {
        /// Not resolved yet.
        Unresolved,
        /// Nothing to resolve.
        NotNeeded,
        /// A ticket has been filed.
        TicketCreated,
        /// Fixed with a quick fix.
        QuickFix,
        /// The failure is a known issue.
        KnownIssue,
        /// The test itself has been fixed.
        TestFixed,
        /// The test has been disabled.
        TestDisabled,
    }
}

impl Analysis {
    /// Returns true if this analysis is a valid classification of `outcome`.
    ///
    /// Positives only describe failures and negatives only describe passes. `NotAnalyzed` is
    /// compatible with both.
    pub fn is_consistent_with(self, outcome: Outcome) -> bool {
        match (self, outcome) {
            (Analysis::NotAnalyzed, _) => true,
            (Analysis::TruePositive | Analysis::FalsePositive, Outcome::Failed) => true,
            (Analysis::TrueNegative | Analysis::FalseNegative, Outcome::Passed) => true,
            _ => false,
        }
    }
}

/// Error returned while parsing a status value from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "unrecognized value for {kind}: {input}\n(known values: {})",
    .known.join(", "),
)]
pub struct UnknownStatusError {
    kind: &'static str,
    input: String,
    known: &'static [&'static str],
}

impl UnknownStatusError {
    fn new(kind: &'static str, input: impl Into<String>, known: &'static [&'static str]) -> Self {
        Self {
            kind,
            input: input.into(),
            known,
        }
    }

    /// Returns the status field this error is about, e.g. `"outcome"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns the string that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

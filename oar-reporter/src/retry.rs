// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policies for requests to the oar service.

use rand::{Rng, distr::OpenClosed01};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, time::Duration};

/// How many times a failed request is retried, and how long to wait in between.
#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backoff", rename_all = "kebab-case", deny_unknown_fields)]
pub enum RetryPolicy {
    /// Fixed backoff.
    #[serde(rename_all = "kebab-case")]
    Fixed {
        /// Maximum retry count.
        count: u32,

        /// Delay between retries.
        #[serde(default, with = "humantime_serde")]
        delay: Duration,

        /// If set to true, randomness will be added to the delay on each retry attempt.
        #[serde(default)]
        jitter: bool,
    },

    /// Exponential backoff.
    #[serde(rename_all = "kebab-case")]
    Exponential {
        /// Maximum retry count.
        count: u32,

        /// Delay before the first retry. Doubles on every retry after that.
        #[serde(with = "humantime_serde")]
        delay: Duration,

        /// If set to true, randomness will be added to the delay on each retry attempt.
        #[serde(default)]
        jitter: bool,

        /// If set, limits the delay between retries.
        #[serde(default, with = "humantime_serde")]
        max_delay: Option<Duration>,
    },
}

impl Default for RetryPolicy {
    /// Four retries with exponential backoff starting at 200ms.
    fn default() -> Self {
        Self::Exponential {
            count: 4,
            delay: Duration::from_millis(200),
            jitter: false,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with no delay between retries.
    pub fn new_without_delay(count: u32) -> Self {
        Self::Fixed {
            count,
            delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Returns the number of retries.
    pub fn count(&self) -> u32 {
        match self {
            Self::Fixed { count, .. } | Self::Exponential { count, .. } => *count,
        }
    }

    /// Returns the delays to wait before each retry.
    pub fn backoff(&self) -> BackoffIter {
        BackoffIter::new(*self)
    }

    fn validate(&self) -> Result<(), &'static str> {
        match self {
            Self::Fixed { delay, jitter, .. } => {
                if delay.is_zero() && *jitter {
                    return Err("`jitter` cannot be true if `delay` isn't specified or is zero");
                }
            }
            Self::Exponential {
                count,
                delay,
                max_delay,
                ..
            } => {
                if *count == 0 {
                    return Err("`count` cannot be zero with exponential backoff");
                }
                if delay.is_zero() {
                    return Err("`delay` cannot be zero with exponential backoff");
                }
                if max_delay.is_some_and(|max_delay| max_delay.is_zero()) {
                    return Err("`max-delay` cannot be zero with exponential backoff");
                }
                if max_delay.is_some_and(|max_delay| max_delay < *delay) {
                    return Err("`max-delay` cannot be less than delay with exponential backoff");
                }
            }
        }
        Ok(())
    }
}

/// Deserializes a retry policy from either a retry count or a table.
pub(crate) fn deserialize_retry_policy<'de, D>(deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl<'de2> serde::de::Visitor<'de2> for V {
        type Value = RetryPolicy;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "a table ({{ count = 4, backoff = \"exponential\", delay = \"200ms\", max-delay = \"2s\", jitter = true }}) or a number (4)"
            )
        }

        // TOML and environment values are i64; JSON may produce u64.
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match v.cmp(&0) {
                Ordering::Greater | Ordering::Equal => {
                    let v = u32::try_from(v).map_err(|_| {
                        serde::de::Error::invalid_value(
                            serde::de::Unexpected::Signed(v),
                            &"a positive u32",
                        )
                    })?;
                    Ok(RetryPolicy::new_without_delay(v))
                }
                Ordering::Less => Err(serde::de::Error::invalid_value(
                    serde::de::Unexpected::Signed(v),
                    &self,
                )),
            }
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let v = u32::try_from(v).map_err(|_| {
                serde::de::Error::invalid_value(
                    serde::de::Unexpected::Unsigned(v),
                    &"a positive u32",
                )
            })?;
            Ok(RetryPolicy::new_without_delay(v))
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de2>,
        {
            RetryPolicy::deserialize(serde::de::value::MapAccessDeserializer::new(map))
        }
    }

    let retry_policy = deserializer.deserialize_any(V)?;
    retry_policy
        .validate()
        .map_err(serde::de::Error::custom)?;
    Ok(retry_policy)
}

/// Iterator over the delays of a [`RetryPolicy`], one per remaining retry.
#[derive(Debug)]
pub struct BackoffIter {
    policy: RetryPolicy,
    current_factor: f64,
    remaining_attempts: u32,
}

impl BackoffIter {
    const BACKOFF_EXPONENT: f64 = 2.;

    fn new(policy: RetryPolicy) -> Self {
        let remaining_attempts = policy.count();
        Self {
            policy,
            current_factor: 1.,
            remaining_attempts,
        }
    }

    fn next_delay_and_jitter(&mut self) -> (Duration, bool) {
        match self.policy {
            RetryPolicy::Fixed { delay, jitter, .. } => (delay, jitter),
            RetryPolicy::Exponential {
                delay,
                jitter,
                max_delay,
                ..
            } => {
                let factor = self.current_factor;
                let exp_delay = delay.mul_f64(factor);

                // Stop multiplying the exponential factor if delay is greater than max_delay.
                if let Some(max_delay) = max_delay
                    && exp_delay > max_delay
                {
                    return (max_delay, jitter);
                }

                self.current_factor *= Self::BACKOFF_EXPONENT;
                (exp_delay, jitter)
            }
        }
    }

    fn apply_jitter(duration: Duration) -> Duration {
        let jitter: f64 = rand::rng().sample(OpenClosed01);
        // Apply jitter in the range (0.5, 1].
        duration.mul_f64(0.5 + jitter / 2.)
    }
}

impl Iterator for BackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_attempts > 0 {
            let (mut delay, jitter) = self.next_delay_and_jitter();
            if jitter {
                delay = Self::apply_jitter(delay);
            }
            self.remaining_attempts -= 1;
            Some(delay)
        } else {
            None
        }
    }
}

// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `oar` command-line tool.
//!
//! `oar` encodes and decodes query tokens, and lists, deletes and updates the test results stored
//! in an oar service. Configuration is read the same way the reporting runtime reads it: from
//! `oar-config.toml` (or the file named by `--config` or `OAR_CONFIG_PATH`) and `OAR_*`
//! environment variables.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};

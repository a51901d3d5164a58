// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit destinations for log output.
//!
//! Every component that logs ([`Client`](crate::client::Client),
//! [`RunReport`](crate::report::RunReport), [`ReportSession`](crate::session::ReportSession))
//! is handed a [`LogSink`] at construction and emits all of its events through it. Nothing in this
//! crate logs through the process-wide default subscriber implicitly.

use tracing::{Dispatch, dispatcher, subscriber::NoSubscriber};

/// A handle to the subscriber that receives a component's log events.
#[derive(Clone, Debug)]
pub struct LogSink {
    dispatch: Dispatch,
}

impl LogSink {
    /// Creates a sink that sends events to `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Captures the current thread's default subscriber.
    ///
    /// The subscriber is captured once, here. Changing the default afterwards does not affect
    /// this sink.
    pub fn current() -> Self {
        Self {
            dispatch: dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Creates a sink that discards everything.
    pub fn none() -> Self {
        Self {
            dispatch: Dispatch::new(NoSubscriber::default()),
        }
    }

    /// Runs `f` with this sink as the default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::current()
    }
}

impl From<Dispatch> for LogSink {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

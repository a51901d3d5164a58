// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use oar_reporter::log_sink::LogSink;
use std::{
    io,
    sync::{Arc, Mutex},
};
use tracing::Dispatch;

/// Collects formatted log lines in memory.
#[derive(Clone, Debug, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn sink(&self) -> LogSink {
        let buf = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .without_time()
            .with_writer(move || buf.clone())
            .finish();
        LogSink::new(Dispatch::new(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

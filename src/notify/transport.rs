// src/notify/transport.rs

//! Line-delimited JSON transport for build events.

use std::io::Write;

use parking_lot::Mutex;

use crate::errors::ListenerError;
use crate::notify::{BuildEvent, Listener};

/// Writes each delivered event as one JSON object per line.
///
/// Subscribe it to [`crate::notify::Scope::All`] to forward everything. A
/// failed write removes it from the dispatcher like any other listener.
pub struct JsonLinesTransport<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Listener for JsonLinesTransport<W> {
    fn on_event(&self, event: &BuildEvent) -> Result<(), ListenerError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines-transport"
    }
}

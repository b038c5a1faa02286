use std::sync::{Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::models::{LogEvent, Severity};

fn trace(event: &LogEvent) {
    match event.severity {
        Severity::Info | Severity::Success => info!(severity = %event.severity, "{}", event.message),
        Severity::Warning => warn!("{}", event.message),
        Severity::Error => error!("{}", event.message),
    }
}

/// Events buffered while one item is processed, flushed to the sink as a block.
#[derive(Debug, Default)]
pub struct ItemLog {
    events: Vec<LogEvent>,
}

impl ItemLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent::new(severity, message);
        trace(&event);
        self.events.push(event);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Severity::Success, message);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Append-only event stream shared by the whole batch.
#[derive(Debug, Default)]
pub struct LogSink {
    events: Mutex<Vec<LogEvent>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent::new(severity, message);
        trace(&event);
        self.lock().push(event);
    }

    /// Moves an item's events in under one lock so they stay contiguous.
    pub fn flush(&self, item: ItemLog) {
        self.lock().extend(item.events);
    }

    /// Takes every event appended so far, oldest first.
    pub fn drain(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

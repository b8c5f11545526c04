//! Parse/write tracing boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect codec
//! semantics. The engine emits one event per phase transition of the field
//! state machine; the default sink drops everything.

use crate::cursor::Endian;

///
/// TraceDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceDirection {
    Read,
    Write,
}

///
/// TraceEvent
///

#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent<'a> {
    ShapeEnter {
        direction: TraceDirection,
        shape: &'a str,
        offset: usize,
    },
    ShapeExit {
        direction: TraceDirection,
        shape: &'a str,
        offset: usize,
    },
    FieldStart {
        shape: &'a str,
        field: &'a str,
        offset: usize,
    },
    FieldCommit {
        shape: &'a str,
        field: &'a str,
        offset: usize,
    },
    FieldSkipped {
        shape: &'a str,
        field: &'a str,
    },
    ConditionPicked {
        field: &'a str,
        arm: &'a str,
    },
    ValidationFailed {
        field: &'a str,
        validator: &'a str,
        offset: usize,
    },
    EndianChanged {
        endian: Endian,
    },
}

///
/// TraceSink
///

pub trait TraceSink: Send + Sync {
    fn on_event(&self, event: &TraceEvent<'_>);
}

///
/// NoopSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn on_event(&self, _: &TraceEvent<'_>) {}
}

///
/// RecordingSink
/// Collects one rendered line per event; used by tests to assert phase order.
///

#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: std::sync::Mutex<Vec<String>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .expect("recording sink lock poisoned")
            .clone()
    }
}

impl TraceSink for RecordingSink {
    fn on_event(&self, event: &TraceEvent<'_>) {
        let line = match event {
            TraceEvent::ShapeEnter { shape, offset, .. } => format!("enter {shape} @{offset}"),
            TraceEvent::ShapeExit { shape, offset, .. } => format!("exit {shape} @{offset}"),
            TraceEvent::FieldStart { field, offset, .. } => format!("field {field} @{offset}"),
            TraceEvent::FieldCommit { field, offset, .. } => format!("commit {field} @{offset}"),
            TraceEvent::FieldSkipped { field, .. } => format!("skip {field}"),
            TraceEvent::ConditionPicked { field, arm } => format!("pick {field} -> {arm}"),
            TraceEvent::ValidationFailed {
                field, validator, ..
            } => format!("invalid {field} ({validator})"),
            TraceEvent::EndianChanged { endian } => format!("endian {endian}"),
        };

        self.lines
            .lock()
            .expect("recording sink lock poisoned")
            .push(line);
    }
}

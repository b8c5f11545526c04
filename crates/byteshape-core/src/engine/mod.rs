//! Read loop and write loop. Both walk a shape's declared field order and
//! run the same per-field phase pipeline:
//!
//! pre → condition → context-get → controller → transform → validate →
//! context-set → post
//!
//! The write loop mirrors the read loop with inverted transformer scope.
//! Bit-field classes bypass the pipeline and go through the bit-field
//! engine as a single carrier.

mod bitfield;
mod condition;
mod controller;
mod error;
mod hook;
mod read;
mod transform;
mod validate;
mod write;

pub use error::{ReadError, WriteError};

use crate::{
    context::Context,
    cursor::Cursor,
    schema::{RecordId, Shape},
    trace::{TraceEvent, TraceSink},
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc};

///
/// Direction
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Direction {
    Read,
    Write,
}

///
/// Env
/// Per-parse state threaded through the whole call tree: the shared
/// context, the optional trace sink, and the overlay of already-fired
/// `once` hooks. The shape itself is never mutated, so concurrent parses
/// of one shape stay independent.
///

pub(crate) struct Env<'a> {
    pub ctx: &'a mut Context,
    pub sink: Option<&'a dyn TraceSink>,
    fired: BTreeSet<(usize, u32)>,
}

impl<'a> Env<'a> {
    fn new(ctx: &'a mut Context, sink: Option<&'a dyn TraceSink>) -> Self {
        Self {
            ctx,
            sink,
            fired: BTreeSet::new(),
        }
    }

    pub fn trace(&self, event: &TraceEvent<'_>) {
        if let Some(sink) = self.sink {
            sink.on_event(event);
        }
    }

    /// `once` bookkeeping: returns whether the record should run, marking
    /// it fired when it is flagged.
    pub fn should_fire(&mut self, shape: &Arc<Shape>, id: RecordId, once: bool) -> bool {
        if !once {
            return true;
        }
        self.fired.insert((Arc::as_ptr(shape) as usize, id.0))
    }
}

/// Parse one instance of `shape` from the cursor.
pub fn read(cursor: &mut Cursor, shape: &Arc<Shape>) -> Result<Value, ReadError> {
    let mut ctx = Context::new();
    read_with(cursor, shape, &mut ctx, None)
}

/// Parse with a caller-owned context and an optional trace sink.
pub fn read_with(
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    ctx: &mut Context,
    sink: Option<&dyn TraceSink>,
) -> Result<Value, ReadError> {
    let mut env = Env::new(ctx, sink);

    read::read_shape(&mut env, cursor, shape, &[], None)
}

/// Serialise an instance of `shape` at the cursor's current position.
pub fn write(cursor: &mut Cursor, shape: &Arc<Shape>, value: &Value) -> Result<(), WriteError> {
    let mut ctx = Context::new();
    write_with(cursor, shape, value, &mut ctx, None)
}

/// Serialise with a caller-owned context and an optional trace sink.
pub fn write_with(
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    value: &Value,
    ctx: &mut Context,
    sink: Option<&dyn TraceSink>,
) -> Result<(), WriteError> {
    let mut env = Env::new(ctx, sink);

    write::write_shape(&mut env, cursor, shape, value, None)
}

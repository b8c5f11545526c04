//! Core runtime for Byteshape: the cursor, the shape metadata store and
//! builder, the expression resolver, and the engines that interpret a
//! shape to read and write binary data.
//!
//! A *shape* describes the wire layout of one type as an ordered field
//! list plus annotation records (conditions, controllers, transformers,
//! validators, hooks, context wiring, bit-fields). The read loop walks the
//! field list and runs the per-field phase pipeline; the write loop
//! mirrors it. See the `engine` module for the pipeline itself.

pub mod context;
pub mod cursor;
pub mod engine;
pub mod expr;
pub mod schema;
pub mod trace;
pub mod value;

///
/// Prelude
///
/// The working vocabulary for describing shapes and driving parses; engine
/// internals stay behind their modules.
///

pub mod prelude {
    pub use crate::{
        context::Context,
        cursor::{Cursor, Endian},
        engine::{ReadError, WriteError, read, read_with, write, write_with},
        schema::{
            Arm, Check, Hook, IterProbe, SchemaError, Shape, Transform, ascii, chr, f32, f64,
            flatten, i8, i16, i32, i64, nested, nested_by, nested_with, null_terminated,
            null_terminated_string, u8, u16, u32, u64, unknown, utf8, utf16, utf32,
        },
        trace::{TraceEvent, TraceSink},
        value::{StructValue, Value},
    };
}

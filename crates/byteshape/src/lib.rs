//! # byteshape
//!
//! `byteshape` is the public facade crate for the Byteshape engine: a
//! declarative binary-format codec. You describe the layout of a file or
//! wire message as a *shape* — an ordered field list with composable
//! annotations for iteration, conditional typing, value transforms,
//! validation, and cursor control — and the engine derives both directions
//! of the codec from that single description.
//!
//! ```ignore
//! use byteshape::prelude::*;
//!
//! let coord = Shape::describe("Coord")
//!     .field("x", u8())
//!     .field("y", u8())
//!     .finish()?;
//!
//! let header = Shape::describe("Header")
//!     .field("count", u8())
//!     .field("points", nested(&coord).count("count"))
//!     .finish()?;
//!
//! let mut cursor = Cursor::new(vec![0x02, 0x01, 0x02, 0x03, 0x04]);
//! let parsed = read(&mut cursor, &header)?;
//!
//! let mut writer = Cursor::writer(Endian::Big);
//! write(&mut writer, &header, &parsed)?;
//! assert_eq!(writer.bytes(), &[0x02, 0x01, 0x02, 0x03, 0x04]);
//! ```
//!
//! ## Crate layout
//!
//! - `cursor` — seekable byte buffer with endianness state.
//! - `schema` — shape descriptions: records, builder, declaration errors.
//! - `expr` — the path/arithmetic mini-language used by annotations.
//! - `engine` — the read and write loops and their phase pipeline.
//! - `context` — the shared scratchpad threaded through a parse.
//! - `trace` — optional, injected parse tracing.
//! - `value` — the dynamic instance graph parses produce.
//!
//! Engine internals live in `byteshape-core`; this crate re-exports the
//! supported surface.

pub use byteshape_core::{context, cursor, engine, expr, schema, trace, value};

pub use byteshape_core::prelude;

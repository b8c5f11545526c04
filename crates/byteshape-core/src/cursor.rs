//! Seekable in-memory byte buffer with endianness state.
//!
//! The cursor owns its buffer. Reads fail with a typed end-of-input error;
//! writes grow the buffer, zero-filling any gap left behind by a seek.
//! Endianness applies to multi-byte integers and floats only.

use crate::value::{PrimitiveTag, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Endian
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Big => f.write_str("big"),
            Self::Little => f.write_str("little"),
        }
    }
}

///
/// CursorError
///

#[derive(Debug, ThisError, PartialEq)]
pub enum CursorError {
    #[error("end of input at offset {offset}: requested {requested} bytes, {available} available")]
    EndOfInput {
        offset: usize,
        requested: usize,
        available: usize,
    },

    #[error("cursor move to {target} is out of bounds (length {len})")]
    OutOfBounds { target: i128, len: usize },

    #[error("cannot write a {found} value as {tag}")]
    TypeMismatch { tag: PrimitiveTag, found: &'static str },

    #[error("char {ch:?} does not fit in a single byte")]
    WideChar { ch: char },
}

///
/// Cursor
/// 0-based position over an owned byte buffer, plus the current endianness.
///

#[derive(Clone)]
pub struct Cursor {
    buf: Vec<u8>,
    pos: usize,
    endian: Endian,
}

impl Cursor {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_endian(bytes, Endian::Big)
    }

    #[must_use]
    pub fn with_endian(bytes: impl Into<Vec<u8>>, endian: Endian) -> Self {
        Self {
            buf: bytes.into(),
            pos: 0,
            endian,
        }
    }

    /// Empty cursor intended for the write loop.
    #[must_use]
    pub const fn writer(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            endian,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[must_use]
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    pub const fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Absolute seek. Positions past the end are allowed on a writer; the gap
    /// is zero-filled by the next write.
    pub const fn move_to(&mut self, target: usize) {
        self.pos = target;
    }

    /// Relative seek; negative deltas rewind.
    pub fn forward(&mut self, delta: i64) -> Result<(), CursorError> {
        let target = i128::from(self.pos as u64) + i128::from(delta);
        if target < 0 {
            return Err(CursorError::OutOfBounds {
                target,
                len: self.buf.len(),
            });
        }
        self.pos = target as usize;

        Ok(())
    }

    /// Advance to the next multiple of `alignment` relative to `base`.
    /// A zero alignment is a no-op.
    pub const fn align_to(&mut self, alignment: usize, base: usize) {
        if alignment == 0 {
            return;
        }
        let consumed = self.pos.saturating_sub(base);
        let pad = (alignment - consumed % alignment) % alignment;
        self.pos += pad;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CursorError> {
        if self.remaining() < n {
            return Err(CursorError::EndOfInput {
                offset: self.pos,
                requested: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;

        Ok(slice)
    }

    /// Read one primitive, advancing by its width.
    pub fn read(&mut self, tag: PrimitiveTag) -> Result<Value, CursorError> {
        let endian = self.endian;
        let bytes = self.take(tag.width())?;

        let value = match tag {
            PrimitiveTag::U8 => Value::U8(bytes[0]),
            PrimitiveTag::I8 => Value::I8(bytes[0] as i8),
            PrimitiveTag::Char => Value::Char(bytes[0] as char),
            PrimitiveTag::U16 => Value::U16(match endian {
                Endian::Big => BigEndian::read_u16(bytes),
                Endian::Little => LittleEndian::read_u16(bytes),
            }),
            PrimitiveTag::U32 => Value::U32(match endian {
                Endian::Big => BigEndian::read_u32(bytes),
                Endian::Little => LittleEndian::read_u32(bytes),
            }),
            PrimitiveTag::U64 => Value::U64(match endian {
                Endian::Big => BigEndian::read_u64(bytes),
                Endian::Little => LittleEndian::read_u64(bytes),
            }),
            PrimitiveTag::I16 => Value::I16(match endian {
                Endian::Big => BigEndian::read_i16(bytes),
                Endian::Little => LittleEndian::read_i16(bytes),
            }),
            PrimitiveTag::I32 => Value::I32(match endian {
                Endian::Big => BigEndian::read_i32(bytes),
                Endian::Little => LittleEndian::read_i32(bytes),
            }),
            PrimitiveTag::I64 => Value::I64(match endian {
                Endian::Big => BigEndian::read_i64(bytes),
                Endian::Little => LittleEndian::read_i64(bytes),
            }),
            PrimitiveTag::F32 => Value::F32(match endian {
                Endian::Big => BigEndian::read_f32(bytes),
                Endian::Little => LittleEndian::read_f32(bytes),
            }),
            PrimitiveTag::F64 => Value::F64(match endian {
                Endian::Big => BigEndian::read_f64(bytes),
                Endian::Little => LittleEndian::read_f64(bytes),
            }),
        };

        Ok(value)
    }

    /// Read one primitive without advancing.
    pub fn peek(&mut self, tag: PrimitiveTag) -> Result<Value, CursorError> {
        let saved = self.pos;
        let value = self.read(tag);
        self.pos = saved;

        value
    }

    /// Splice raw bytes in at the current position, growing the buffer and
    /// zero-filling any seek gap.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.pos > self.buf.len() {
            self.buf.resize(self.pos, 0);
        }
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    /// Emit `n` zero bytes; used for declared padding so it lands in the
    /// output instead of being an unmaterialized seek.
    pub fn pad_zero(&mut self, n: usize) {
        for _ in 0..n {
            self.write_bytes(&[0]);
        }
    }

    /// Write one primitive, coercing numeric values to the tag's width.
    pub fn write(&mut self, tag: PrimitiveTag, value: &Value) -> Result<(), CursorError> {
        let endian = self.endian;
        let mut scratch = [0u8; 8];

        let width = tag.width();
        match tag {
            PrimitiveTag::U8 => scratch[0] = self.narrow_u64(tag, value)? as u8,
            PrimitiveTag::I8 => scratch[0] = self.narrow_i64(tag, value)? as u8,
            PrimitiveTag::Char => {
                scratch[0] = match value {
                    Value::Char(ch) => {
                        let code = u32::from(*ch);
                        u8::try_from(code).map_err(|_| CursorError::WideChar { ch: *ch })?
                    }
                    other => self.narrow_u64(tag, other)? as u8,
                };
            }
            PrimitiveTag::U16 => {
                let v = self.narrow_u64(tag, value)? as u16;
                match endian {
                    Endian::Big => BigEndian::write_u16(&mut scratch, v),
                    Endian::Little => LittleEndian::write_u16(&mut scratch, v),
                }
            }
            PrimitiveTag::U32 => {
                let v = self.narrow_u64(tag, value)? as u32;
                match endian {
                    Endian::Big => BigEndian::write_u32(&mut scratch, v),
                    Endian::Little => LittleEndian::write_u32(&mut scratch, v),
                }
            }
            PrimitiveTag::U64 => {
                let v = self.narrow_u64(tag, value)?;
                match endian {
                    Endian::Big => BigEndian::write_u64(&mut scratch, v),
                    Endian::Little => LittleEndian::write_u64(&mut scratch, v),
                }
            }
            PrimitiveTag::I16 => {
                let v = self.narrow_i64(tag, value)? as i16;
                match endian {
                    Endian::Big => BigEndian::write_i16(&mut scratch, v),
                    Endian::Little => LittleEndian::write_i16(&mut scratch, v),
                }
            }
            PrimitiveTag::I32 => {
                let v = self.narrow_i64(tag, value)? as i32;
                match endian {
                    Endian::Big => BigEndian::write_i32(&mut scratch, v),
                    Endian::Little => LittleEndian::write_i32(&mut scratch, v),
                }
            }
            PrimitiveTag::I64 => {
                let v = self.narrow_i64(tag, value)?;
                match endian {
                    Endian::Big => BigEndian::write_i64(&mut scratch, v),
                    Endian::Little => LittleEndian::write_i64(&mut scratch, v),
                }
            }
            PrimitiveTag::F32 => {
                let v = value.as_f64().ok_or(CursorError::TypeMismatch {
                    tag,
                    found: value.kind(),
                })? as f32;
                match endian {
                    Endian::Big => BigEndian::write_f32(&mut scratch, v),
                    Endian::Little => LittleEndian::write_f32(&mut scratch, v),
                }
            }
            PrimitiveTag::F64 => {
                let v = value.as_f64().ok_or(CursorError::TypeMismatch {
                    tag,
                    found: value.kind(),
                })?;
                match endian {
                    Endian::Big => BigEndian::write_f64(&mut scratch, v),
                    Endian::Little => LittleEndian::write_f64(&mut scratch, v),
                }
            }
        }

        self.write_bytes(&scratch[..width]);

        Ok(())
    }

    fn narrow_u64(&self, tag: PrimitiveTag, value: &Value) -> Result<u64, CursorError> {
        value.as_u64().ok_or(CursorError::TypeMismatch {
            tag,
            found: value.kind(),
        })
    }

    fn narrow_i64(&self, tag: PrimitiveTag, value: &Value) -> Result<i64, CursorError> {
        value.as_i64().ok_or(CursorError::TypeMismatch {
            tag,
            found: value.kind(),
        })
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        write!(
            f,
            "Cursor {{ pos: {}, len: {}, endian: {}, bytes:",
            self.pos,
            self.buf.len(),
            self.endian
        )?;
        for byte in self.buf.iter().take(PREVIEW) {
            write!(f, " {byte:02x}")?;
        }
        if self.buf.len() > PREVIEW {
            write!(f, " …")?;
        }
        f.write_str(" }")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{Cursor, CursorError, Endian};
    use crate::value::{PrimitiveTag, Value};

    #[test]
    fn reads_advance_by_primitive_width() {
        let mut cursor = Cursor::new(vec![0x01, 0x02, 0x03, 0x04]);

        assert_eq!(
            cursor.read(PrimitiveTag::U16).expect("u16 should read"),
            Value::U16(0x0102)
        );
        assert_eq!(cursor.offset(), 2);
        assert_eq!(
            cursor.read(PrimitiveTag::U16).expect("u16 should read"),
            Value::U16(0x0304)
        );
    }

    #[test]
    fn endianness_only_affects_multibyte_reads() {
        let bytes = vec![0x12, 0x34];

        let mut be = Cursor::with_endian(bytes.clone(), Endian::Big);
        let mut le = Cursor::with_endian(bytes, Endian::Little);

        assert_eq!(
            be.read(PrimitiveTag::U16).expect("be u16"),
            Value::U16(0x1234)
        );
        assert_eq!(
            le.read(PrimitiveTag::U16).expect("le u16"),
            Value::U16(0x3412)
        );

        be.move_to(0);
        le.move_to(0);
        assert_eq!(be.read(PrimitiveTag::U8).expect("be u8"), Value::U8(0x12));
        assert_eq!(le.read(PrimitiveTag::U8).expect("le u8"), Value::U8(0x12));
    }

    #[test]
    fn short_read_reports_offset_and_width() {
        let mut cursor = Cursor::new(vec![0x01]);

        let err = cursor
            .read(PrimitiveTag::U32)
            .expect_err("short buffer should fail");
        assert_eq!(
            err,
            CursorError::EndOfInput {
                offset: 0,
                requested: 4,
                available: 1,
            }
        );
        // a failed read must not move the cursor
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut cursor = Cursor::new(vec![0xAB, 0xCD]);

        assert_eq!(
            cursor.peek(PrimitiveTag::U8).expect("peek"),
            Value::U8(0xAB)
        );
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn char_is_a_single_unsigned_byte() {
        let mut cursor = Cursor::new(b"Hi".to_vec());

        assert_eq!(
            cursor.read(PrimitiveTag::Char).expect("char"),
            Value::Char('H')
        );

        let mut writer = Cursor::writer(Endian::Big);
        writer
            .write(PrimitiveTag::Char, &Value::Char('i'))
            .expect("char should write");
        assert_eq!(writer.bytes(), b"i");

        let err = writer
            .write(PrimitiveTag::Char, &Value::Char('λ'))
            .expect_err("wide char cannot be a byte");
        assert_eq!(err, CursorError::WideChar { ch: 'λ' });
    }

    #[test]
    fn writes_grow_the_buffer_and_fill_seek_gaps() {
        let mut writer = Cursor::writer(Endian::Little);
        writer
            .write(PrimitiveTag::U16, &Value::U16(0x0102))
            .expect("u16");
        writer.move_to(4);
        writer.write(PrimitiveTag::U8, &Value::U8(0xFF)).expect("u8");

        assert_eq!(writer.bytes(), &[0x02, 0x01, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn forward_allows_negative_deltas_but_not_before_origin() {
        let mut cursor = Cursor::new(vec![0; 8]);
        cursor.move_to(4);
        cursor.forward(-2).expect("rewind");
        assert_eq!(cursor.offset(), 2);

        let err = cursor.forward(-3).expect_err("cannot rewind past origin");
        assert!(matches!(err, CursorError::OutOfBounds { target: -1, .. }));
    }

    #[test]
    fn align_to_is_relative_to_the_given_base() {
        let mut cursor = Cursor::new(vec![0; 16]);
        cursor.move_to(5);
        cursor.align_to(4, 3);
        // consumed 2 bytes since base 3, next multiple of 4 is 7
        assert_eq!(cursor.offset(), 7);

        cursor.align_to(4, 3);
        assert_eq!(cursor.offset(), 7, "aligned cursor must not move again");
    }

    #[test]
    fn round_trips_every_primitive() {
        let values = [
            (PrimitiveTag::U8, Value::U8(0x7F)),
            (PrimitiveTag::U16, Value::U16(0xBEEF)),
            (PrimitiveTag::U32, Value::U32(0xDEAD_BEEF)),
            (PrimitiveTag::U64, Value::U64(0x0123_4567_89AB_CDEF)),
            (PrimitiveTag::I8, Value::I8(-5)),
            (PrimitiveTag::I16, Value::I16(-300)),
            (PrimitiveTag::I32, Value::I32(-70_000)),
            (PrimitiveTag::I64, Value::I64(-5_000_000_000)),
            (PrimitiveTag::F32, Value::F32(1.5)),
            (PrimitiveTag::F64, Value::F64(-2.25)),
            (PrimitiveTag::Char, Value::Char('z')),
        ];

        for endian in [Endian::Big, Endian::Little] {
            for (tag, value) in &values {
                let mut writer = Cursor::writer(endian);
                writer.write(*tag, value).expect("write should succeed");

                let mut reader = Cursor::with_endian(writer.into_bytes(), endian);
                assert_eq!(&reader.read(*tag).expect("read should succeed"), value);
            }
        }
    }
}

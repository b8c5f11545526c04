//! Bit-field packing. A bit-field class reads one integer carrier and
//! slices it into members, most significant bits first; writing ORs the
//! members back into a zeroed carrier. All shifting runs in `u64` so
//! 32-bit carriers never touch host shift semantics.

use crate::{
    cursor::Cursor,
    engine::{ReadError, WriteError},
    schema::Shape,
    value::{PrimitiveTag, Value},
};

fn carrier_of(shape: &Shape) -> Result<(PrimitiveTag, u32), String> {
    match shape.carrier() {
        Some(tag) => Ok((tag, (tag.width() * 8) as u32)),
        None => Err(format!("shape {} is not a bit-field class", shape.name())),
    }
}

fn member_value(bits: u32, raw: u64) -> Value {
    match bits {
        1..=8 => Value::U8(raw as u8),
        9..=16 => Value::U16(raw as u16),
        _ => Value::U32(raw as u32),
    }
}

pub(crate) fn read_into(
    cursor: &mut Cursor,
    shape: &Shape,
    instance: &mut Value,
) -> Result<(), ReadError> {
    let (tag, carrier_bits) =
        carrier_of(shape).map_err(|detail| ReadError::Internal { detail })?;

    let raw = cursor
        .read(tag)
        .map_err(|err| ReadError::from_cursor(shape.name(), err))?;
    let raw = raw.as_u64().unwrap_or_default();

    let Some(fields) = instance.as_struct_mut() else {
        return Err(ReadError::Internal {
            detail: "bit-field read target is not a struct".to_string(),
        });
    };

    let mut consumed = 0u32;
    for rec in shape.bitfields() {
        let shift = carrier_bits - consumed - rec.bits;
        let mask = (1u64 << rec.bits) - 1;
        fields.set(rec.name.clone(), member_value(rec.bits, (raw >> shift) & mask));
        consumed += rec.bits;
    }

    Ok(())
}

pub(crate) fn write_from(
    cursor: &mut Cursor,
    shape: &Shape,
    instance: &Value,
) -> Result<(), WriteError> {
    let (tag, carrier_bits) =
        carrier_of(shape).map_err(|detail| WriteError::Internal { detail })?;

    let mut raw = 0u64;
    let mut consumed = 0u32;
    for rec in shape.bitfields() {
        let member = instance
            .field(&rec.name)
            .ok_or_else(|| WriteError::MissingField {
                shape: shape.name().to_string(),
                property: rec.name.clone(),
            })?;
        let value = member.as_u64().ok_or_else(|| WriteError::TypeMismatch {
            property: rec.name.clone(),
            expected: format!("{}-bit unsigned", rec.bits),
            found: member.kind(),
        })?;

        let mask = (1u64 << rec.bits) - 1;
        if value > mask {
            return Err(WriteError::TypeMismatch {
                property: rec.name.clone(),
                expected: format!("{}-bit unsigned", rec.bits),
                found: member.kind(),
            });
        }

        let shift = carrier_bits - consumed - rec.bits;
        raw |= (value & mask) << shift;
        consumed += rec.bits;
    }

    let carrier = match tag {
        PrimitiveTag::U8 => Value::U8(raw as u8),
        PrimitiveTag::U16 => Value::U16(raw as u16),
        _ => Value::U32(raw as u32),
    };
    cursor
        .write(tag, &carrier)
        .map_err(|err| WriteError::from_cursor(shape.name(), err))
}

///
/// TESTS
///

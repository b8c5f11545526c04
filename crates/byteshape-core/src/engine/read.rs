//! The read loop.

use crate::{
    cursor::Cursor,
    engine::{Direction, Env, ReadError, bitfield, condition, controller, hook, transform, validate},
    schema::{ContextOp, FieldDef, Shape},
    trace::{TraceDirection, TraceEvent},
    value::{StructValue, Value},
};
use std::sync::Arc;

pub(crate) fn read_shape(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    args: &[Value],
    parent: Option<&Value>,
) -> Result<Value, ReadError> {
    env.trace(&TraceEvent::ShapeEnter {
        direction: TraceDirection::Read,
        shape: shape.name(),
        offset: cursor.offset(),
    });

    // class-level endianness is permanent for the scope, not restored
    if let Some(endian) = shape.endian() {
        cursor.set_endian(endian);
        env.trace(&TraceEvent::EndianChanged { endian });
    }

    let mut instance = Value::Struct(StructValue::new(shape.name()));
    if let Some(fields) = instance.as_struct_mut() {
        for (param, value) in shape.params().iter().zip(args.iter()) {
            fields.set(param.clone(), value.clone());
        }
    }

    let mut pending = Vec::new();
    hook::run(
        env,
        cursor,
        shape,
        shape.class_pre(),
        &mut instance,
        parent,
        Direction::Read,
        &mut pending,
        "",
    )
    .map_err(|err| ReadError::from_phase(shape.name(), cursor.offset(), err))?;

    if shape.is_bitfield() {
        bitfield::read_into(cursor, shape, &mut instance)?;
    } else {
        for field in shape.fields() {
            if let Err(err) = read_field(env, cursor, shape, field, &mut instance) {
                return Err(absorb_partial(err, instance, field));
            }
        }
    }

    hook::run(
        env,
        cursor,
        shape,
        shape.class_post(),
        &mut instance,
        parent,
        Direction::Read,
        &mut pending,
        "",
    )
    .map_err(|err| ReadError::from_phase(shape.name(), cursor.offset(), err))?;
    hook::settle(env, cursor, pending, &instance, Direction::Read)
        .map_err(|err| ReadError::from_phase(shape.name(), cursor.offset(), err))?;

    env.trace(&TraceEvent::ShapeExit {
        direction: TraceDirection::Read,
        shape: shape.name(),
        offset: cursor.offset(),
    });

    Ok(instance)
}

/// A field that died at end-of-input leaves its partial value on the
/// partially-built instance, which becomes the partial the outer scope
/// sees.
fn absorb_partial(err: ReadError, mut instance: Value, field: &FieldDef) -> ReadError {
    match err {
        ReadError::EndOfInput {
            offset,
            requested,
            partial,
        } => {
            if let (Some(partial), Some(fields)) = (partial, instance.as_struct_mut()) {
                fields.set(field.name.clone(), *partial);
            }
            ReadError::EndOfInput {
                offset,
                requested,
                partial: Some(Box::new(instance)),
            }
        }
        other => other,
    }
}

fn read_field(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    instance: &mut Value,
) -> Result<(), ReadError> {
    env.trace(&TraceEvent::FieldStart {
        shape: shape.name(),
        field: &field.name,
        offset: cursor.offset(),
    });

    let mut pending = Vec::new();
    hook::run(
        env,
        cursor,
        shape,
        &field.pre,
        instance,
        None,
        Direction::Read,
        &mut pending,
        &field.name,
    )
    .map_err(|err| ReadError::from_phase(&field.name, cursor.offset(), err))?;

    // context-get delivers straight onto the property
    for rec in &field.context {
        if let ContextOp::Get { key, default } = &rec.op {
            let value = match env.ctx.get(key) {
                Some(value) => value.clone(),
                None => default.clone().ok_or_else(|| ReadError::ContextMissing {
                    property: field.name.clone(),
                    key: key.clone(),
                })?,
            };
            if let Some(fields) = instance.as_struct_mut() {
                fields.set(field.name.clone(), value);
            }
        }
    }

    match condition::resolve(env, field, &*instance) {
        condition::Outcome::NoMatch => {
            return Err(ReadError::NoConditionMatched {
                property: field.name.clone(),
                offset: cursor.offset(),
            });
        }

        condition::Outcome::Absent => {
            env.trace(&TraceEvent::FieldSkipped {
                shape: shape.name(),
                field: &field.name,
            });
        }

        condition::Outcome::Base(base) => {
            let raw = controller::read_value(env, cursor, shape, field, &base, &*instance)?;
            let value = transform::apply_read(field, raw, &*instance).map_err(|source| {
                ReadError::Transform {
                    property: field.name.clone(),
                    offset: cursor.offset(),
                    source,
                }
            })?;
            validate::run(env, field, &value, &*instance, cursor.offset()).map_err(|failure| {
                ReadError::ValidationFailed {
                    validator: failure.validator,
                    property: field.name.clone(),
                    value: Box::new(failure.value),
                    message: failure.message,
                    offset: cursor.offset(),
                }
            })?;
            if let Some(fields) = instance.as_struct_mut() {
                fields.set(field.name.clone(), value);
            }
        }
    }

    for rec in &field.context {
        match &rec.op {
            ContextOp::Set { key } => {
                if let Some(value) = instance.field(&field.name) {
                    let value = value.clone();
                    env.ctx.set(key, value);
                }
            }
            ContextOp::Append { key } => {
                if let Some(value) = instance.field(&field.name) {
                    let value = value.clone();
                    env.ctx.append(key, value);
                }
            }
            ContextOp::Get { .. } => {}
        }
    }

    hook::run(
        env,
        cursor,
        shape,
        &field.post,
        instance,
        None,
        Direction::Read,
        &mut pending,
        &field.name,
    )
    .map_err(|err| ReadError::from_phase(&field.name, cursor.offset(), err))?;
    hook::settle(env, cursor, pending, &*instance, Direction::Read)
        .map_err(|err| ReadError::from_phase(&field.name, cursor.offset(), err))?;

    env.trace(&TraceEvent::FieldCommit {
        shape: shape.name(),
        field: &field.name,
        offset: cursor.offset(),
    });

    Ok(())
}

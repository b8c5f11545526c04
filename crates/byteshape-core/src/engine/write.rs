//! The write loop. Mirrors the read loop with inverted transformer scope:
//! validators see the stored (domain) value, inverse transformers turn it
//! back into its wire form, and the controllers iterate the stored
//! sequence.

use crate::{
    cursor::Cursor,
    engine::{Direction, Env, WriteError, bitfield, condition, controller, hook, transform, validate},
    schema::{ContextOp, FieldDef, Shape},
    trace::{TraceDirection, TraceEvent},
    value::Value,
};
use std::sync::Arc;

pub(crate) fn write_shape(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    value: &Value,
    parent: Option<&Value>,
) -> Result<(), WriteError> {
    env.trace(&TraceEvent::ShapeEnter {
        direction: TraceDirection::Write,
        shape: shape.name(),
        offset: cursor.offset(),
    });

    if let Some(endian) = shape.endian() {
        cursor.set_endian(endian);
        env.trace(&TraceEvent::EndianChanged { endian });
    }

    if value.as_struct().is_none() {
        return Err(WriteError::TypeMismatch {
            property: shape.name().to_string(),
            expected: "struct".to_string(),
            found: value.kind(),
        });
    }

    // hooks take the instance mutably; the caller's value stays untouched
    let mut work = value.clone();

    let mut pending = Vec::new();
    hook::run(
        env,
        cursor,
        shape,
        shape.class_pre(),
        &mut work,
        parent,
        Direction::Write,
        &mut pending,
        "",
    )
    .map_err(|err| WriteError::from_phase(shape.name(), cursor.offset(), err))?;

    if shape.is_bitfield() {
        bitfield::write_from(cursor, shape, &work)?;
    } else {
        for field in shape.fields() {
            write_field(env, cursor, shape, field, &mut work)?;
        }
    }

    hook::run(
        env,
        cursor,
        shape,
        shape.class_post(),
        &mut work,
        parent,
        Direction::Write,
        &mut pending,
        "",
    )
    .map_err(|err| WriteError::from_phase(shape.name(), cursor.offset(), err))?;
    hook::settle(env, cursor, pending, &work, Direction::Write)
        .map_err(|err| WriteError::from_phase(shape.name(), cursor.offset(), err))?;

    env.trace(&TraceEvent::ShapeExit {
        direction: TraceDirection::Write,
        shape: shape.name(),
        offset: cursor.offset(),
    });

    Ok(())
}

fn write_field(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    instance: &mut Value,
) -> Result<(), WriteError> {
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
        Direction::Write,
        &mut pending,
        &field.name,
    )
    .map_err(|err| WriteError::from_phase(&field.name, cursor.offset(), err))?;

    // context-get only fills properties the caller left out (a writer's
    // instance usually already carries its values)
    for rec in &field.context {
        if let ContextOp::Get { key, default } = &rec.op
            && instance.field(&field.name).is_none()
        {
            let value = match env.ctx.get(key) {
                Some(value) => value.clone(),
                None => default.clone().ok_or_else(|| WriteError::ContextMissing {
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
            return Err(WriteError::NoConditionMatched {
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
            let stored = instance
                .field(&field.name)
                .cloned()
                .ok_or_else(|| WriteError::MissingField {
                    shape: shape.name().to_string(),
                    property: field.name.clone(),
                })?;

            validate::run(env, field, &stored, &*instance, cursor.offset()).map_err(
                |failure| WriteError::ValidationFailed {
                    validator: failure.validator,
                    property: field.name.clone(),
                    value: Box::new(failure.value),
                    message: failure.message,
                    offset: cursor.offset(),
                },
            )?;

            let wire = transform::apply_write(field, stored, &*instance).map_err(|source| {
                WriteError::Transform {
                    property: field.name.clone(),
                    offset: cursor.offset(),
                    source,
                }
            })?;

            controller::write_value(env, cursor, shape, field, &base, &*instance, &wire)?;
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
        Direction::Write,
        &mut pending,
        &field.name,
    )
    .map_err(|err| WriteError::from_phase(&field.name, cursor.offset(), err))?;
    hook::settle(env, cursor, pending, &*instance, Direction::Write)
        .map_err(|err| WriteError::from_phase(&field.name, cursor.offset(), err))?;

    env.trace(&TraceEvent::FieldCommit {
        shape: shape.name(),
        field: &field.name,
        offset: cursor.offset(),
    });

    Ok(())
}

//! Pre/post hook execution. Paired hooks (peek, ensure-size, padding,
//! endian) save their state into a per-scope pending list instead of
//! registering runtime post records, so the shared shape is never mutated;
//! pending actions settle after the declared post hooks, in reverse
//! attachment order.

use crate::{
    cursor::Cursor,
    engine::{Direction, Env, error::PhaseError},
    schema::{HookKind, HookRec, NumSource, Shape},
    trace::TraceEvent,
    value::Value,
};
use std::sync::Arc;

///
/// Pending
/// The deferred half of a paired pre hook.
///

pub(crate) enum Pending {
    RestoreOffset(usize),
    Ensure { start: usize, arg: NumSource },
    Pad { start: usize, arg: NumSource },
    RestoreEndian(crate::cursor::Endian),
}

fn applies(rec: &HookRec, direction: Direction) -> bool {
    match direction {
        Direction::Read => rec.scope.on_read(),
        Direction::Write => rec.scope.on_write(),
    }
}

/// Run one hook list. `property` is empty for class scope; `parent` is only
/// present while entering a nested instance.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    hooks: &[HookRec],
    instance: &mut Value,
    parent: Option<&Value>,
    direction: Direction,
    pending: &mut Vec<Pending>,
    property: &str,
) -> Result<(), PhaseError> {
    for rec in hooks {
        if !applies(rec, direction) || !env.should_fire(shape, rec.id, rec.once) {
            continue;
        }

        match &rec.kind {
            HookKind::User(f) => f(instance, cursor)?,

            HookKind::Offset(src) => {
                let target = src.eval(&*instance)?;
                let target = usize::try_from(target).map_err(|_| {
                    PhaseError::Cursor(crate::cursor::CursorError::OutOfBounds {
                        target: i128::from(target),
                        len: cursor.len(),
                    })
                })?;
                cursor.move_to(target);
            }

            HookKind::Peek(src) => {
                pending.push(Pending::RestoreOffset(cursor.offset()));
                if let Some(src) = src {
                    let target = src.eval(&*instance)?;
                    let target = usize::try_from(target).map_err(|_| {
                        PhaseError::Cursor(crate::cursor::CursorError::OutOfBounds {
                            target: i128::from(target),
                            len: cursor.len(),
                        })
                    })?;
                    cursor.move_to(target);
                }
            }

            HookKind::EnsureSize(src) => pending.push(Pending::Ensure {
                start: cursor.offset(),
                arg: src.clone(),
            }),

            HookKind::Padding(src) => pending.push(Pending::Pad {
                start: cursor.offset(),
                arg: src.clone(),
            }),

            HookKind::Endian(src) => {
                pending.push(Pending::RestoreEndian(cursor.endian()));
                let endian = src.eval(&*instance);
                cursor.set_endian(endian);
                env.trace(&TraceEvent::EndianChanged { endian });
            }

            HookKind::ValueSet(f) => {
                // field-scoped; meaningless without a property to assign
                if !property.is_empty() {
                    let value = f(&*instance);
                    if let Some(fields) = instance.as_struct_mut() {
                        fields.set(property, value);
                    }
                }
            }

            HookKind::ShareWithRelation => {
                if let Some(Value::Struct(parent_fields)) = parent {
                    let missing: Vec<(String, Value)> = parent_fields
                        .iter()
                        .filter(|(name, _)| {
                            instance
                                .as_struct()
                                .is_none_or(|fields| !fields.contains(name))
                        })
                        .map(|(name, value)| (name.to_string(), value.clone()))
                        .collect();
                    if let Some(fields) = instance.as_struct_mut() {
                        for (name, value) in missing {
                            fields.set(name, value);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Settle paired actions, innermost first.
pub(crate) fn settle(
    env: &Env<'_>,
    cursor: &mut Cursor,
    pending: Vec<Pending>,
    instance: &Value,
    direction: Direction,
) -> Result<(), PhaseError> {
    for action in pending.into_iter().rev() {
        match action {
            Pending::RestoreOffset(offset) => cursor.move_to(offset),

            Pending::Ensure { start, arg } => {
                let want = arg.eval(instance)?;
                let want = usize::try_from(want).unwrap_or(0);
                let target = start + want;
                if cursor.offset() != target {
                    match direction {
                        Direction::Write if cursor.offset() < target => {
                            cursor.pad_zero(target - cursor.offset());
                        }
                        _ => cursor.move_to(target),
                    }
                }
            }

            Pending::Pad { start, arg } => {
                let unit = arg.eval(instance)?;
                let unit = usize::try_from(unit).unwrap_or(0);
                if unit == 0 {
                    continue;
                }
                let consumed = cursor.offset().saturating_sub(start);
                let pad = (unit - consumed % unit) % unit;
                match direction {
                    Direction::Read => cursor.forward(pad as i64)?,
                    Direction::Write => cursor.pad_zero(pad),
                }
            }

            Pending::RestoreEndian(endian) => {
                cursor.set_endian(endian);
                env.trace(&TraceEvent::EndianChanged { endian });
            }
        }
    }

    Ok(())
}

//! Iteration controllers. A controller turns the single read of a
//! property's base descriptor into a sequence; chained controllers compose
//! with the last-attached one outermost, so each controller's "read once"
//! is the next inner controller's whole run.
//!
//! End-of-input policy: `until_eof` absorbs the typed EOF error and keeps
//! its partial value; every other controller re-raises it after attaching
//! what it had built so far.

use crate::{
    cursor::Cursor,
    engine::{Env, ReadError, WriteError, read, transform, write},
    schema::{
        BaseKind, ControllerKind, ControllerRec, FieldDef, IterProbe, SeqTarget, Shape,
        TransformError,
    },
    value::Value,
};
use std::sync::Arc;

pub(crate) fn read_value(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    base: &BaseKind,
    instance: &Value,
) -> Result<Value, ReadError> {
    read_chain(env, cursor, shape, field, &field.controllers, base, instance, None)
}

#[allow(clippy::too_many_arguments)]
fn read_chain(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    chain: &[ControllerRec],
    base: &BaseKind,
    instance: &Value,
    arg: Option<&Value>,
) -> Result<Value, ReadError> {
    match chain.split_last() {
        None => read_base(env, cursor, field, base, instance, arg),
        Some((outer, rest)) => {
            read_controller(env, cursor, shape, field, outer, rest, base, instance, arg)
        }
    }
}

fn read_base(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    field: &FieldDef,
    base: &BaseKind,
    instance: &Value,
    arg: Option<&Value>,
) -> Result<Value, ReadError> {
    match base {
        BaseKind::Primitive(tag) => {
            let raw = cursor
                .read(*tag)
                .map_err(|err| ReadError::from_cursor(&field.name, err))?;
            transform::apply_primitive_read(field, raw, instance).map_err(|source| {
                ReadError::Transform {
                    property: field.name.clone(),
                    offset: cursor.offset(),
                    source,
                }
            })
        }

        BaseKind::Nested { shape: inner, args } => {
            // a map-to entry takes the place of the declared resolver
            let resolved = match (arg, args) {
                (Some(entry), _) => vec![entry.clone()],
                (None, Some(src)) => src.resolve(instance).map_err(|source| ReadError::Expr {
                    property: field.name.clone(),
                    source,
                })?,
                (None, None) => Vec::new(),
            };
            read::read_shape(env, cursor, inner, &resolved, Some(instance))
        }

        BaseKind::Unknown => Err(ReadError::Internal {
            detail: format!("descriptor for property {} was never resolved", field.name),
        }),
    }
}

/// Fold the partial produced by an inner failure into the items built so
/// far, and re-raise.
fn raise_with_partial(err: ReadError, mut items: Vec<Value>) -> ReadError {
    match err {
        ReadError::EndOfInput {
            offset,
            requested,
            partial,
        } => {
            if let Some(partial) = partial {
                items.push(*partial);
            }
            ReadError::EndOfInput {
                offset,
                requested,
                partial: Some(Box::new(Value::List(items))),
            }
        }
        other => other,
    }
}

fn eval_extent(
    field: &FieldDef,
    src: &crate::schema::NumSource,
    instance: &Value,
) -> Result<usize, ReadError> {
    let n = src.eval(instance).map_err(|source| ReadError::Expr {
        property: field.name.clone(),
        source,
    })?;

    Ok(usize::try_from(n).unwrap_or(0))
}

#[allow(clippy::too_many_arguments)]
fn read_controller(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    rec: &ControllerRec,
    rest: &[ControllerRec],
    base: &BaseKind,
    instance: &Value,
    arg: Option<&Value>,
) -> Result<Value, ReadError> {
    let start = cursor.offset();
    let mut items: Vec<Value> = Vec::new();
    let mut last_start: Option<usize> = None;

    match &rec.kind {
        ControllerKind::Count(src) => {
            let n = eval_extent(field, src, instance)?;
            for _ in 0..n {
                last_start = Some(cursor.offset());
                match read_chain(env, cursor, shape, field, rest, base, instance, arg) {
                    Ok(item) => items.push(item),
                    Err(err) => return Err(raise_with_partial(err, items)),
                }
            }
        }

        ControllerKind::While(pred) => {
            // the predicate is deliberately not consulted before the first
            // read
            loop {
                let item_start = cursor.offset();
                let item = match read_chain(env, cursor, shape, field, rest, base, instance, arg)
                {
                    Ok(item) => item,
                    Err(err) => return Err(raise_with_partial(err, items)),
                };
                items.push(item);
                last_start = Some(item_start);

                let last = &items[items.len() - 1];
                let probe = IterProbe {
                    value: last,
                    count: items.len(),
                    instance,
                    offset: cursor.offset(),
                    start_offset: start,
                };
                if !pred(&probe) {
                    break;
                }
            }
        }

        ControllerKind::UntilValue(sentinel) => loop {
            let item_start = cursor.offset();
            let item = match read_chain(env, cursor, shape, field, rest, base, instance, arg) {
                Ok(item) => item,
                Err(err) => return Err(raise_with_partial(err, items)),
            };
            let done = item == *sentinel;
            items.push(item);
            last_start = Some(item_start);
            if done {
                break;
            }
        },

        ControllerKind::UntilEof => loop {
            let item_start = cursor.offset();
            match read_chain(env, cursor, shape, field, rest, base, instance, arg) {
                Ok(item) => {
                    items.push(item);
                    last_start = Some(item_start);
                    // a zero-width item can never reach end of input
                    if cursor.offset() == item_start {
                        break;
                    }
                }
                Err(ReadError::EndOfInput { partial, .. }) => {
                    if let Some(partial) = partial {
                        items.push(*partial);
                    }
                    break;
                }
                Err(err) => return Err(err),
            }
        },

        ControllerKind::Size(src) => {
            let want = eval_extent(field, src, instance)?;
            while cursor.offset().saturating_sub(start) < want {
                last_start = Some(cursor.offset());
                match read_chain(env, cursor, shape, field, rest, base, instance, arg) {
                    Ok(item) => items.push(item),
                    Err(err) => return Err(raise_with_partial(err, items)),
                }
            }
        }

        ControllerKind::MapTo(entries) => {
            for entry in entries(instance) {
                last_start = Some(cursor.offset());
                match read_chain(env, cursor, shape, field, rest, base, instance, Some(&entry)) {
                    Ok(item) => items.push(item),
                    Err(err) => return Err(raise_with_partial(err, items)),
                }
            }
        }

        ControllerKind::Matrix { width, height } => {
            let w = eval_extent(field, width, instance)?;
            let h = eval_extent(field, height, instance)?;
            let mut rows: Vec<Value> = Vec::with_capacity(h);
            for _ in 0..h {
                let row_start = cursor.offset();
                let mut row: Vec<Value> = Vec::with_capacity(w);
                for _ in 0..w {
                    match read_chain(env, cursor, shape, field, rest, base, instance, arg) {
                        Ok(item) => row.push(item),
                        Err(err) => {
                            rows.push(Value::List(row));
                            return Err(raise_with_partial(err, rows));
                        }
                    }
                }
                if let Some(alignment) = rec.opts.alignment {
                    cursor.align_to(alignment, row_start);
                }
                rows.push(Value::List(row));
            }
            // row alignment already applied; matrix ignores the generic
            // post-controller alignment and text target
            return Ok(Value::List(rows));
        }
    }

    if rec.opts.peek
        && let Some(position) = last_start
        && !items.is_empty()
    {
        items.pop();
        cursor.move_to(position);
    }

    if let Some(alignment) = rec.opts.alignment {
        cursor.align_to(alignment, start);
    }

    seal(field, rec, items, cursor.offset())
}

fn seal(
    field: &FieldDef,
    rec: &ControllerRec,
    items: Vec<Value>,
    offset: usize,
) -> Result<Value, ReadError> {
    match rec.opts.target {
        SeqTarget::List => Ok(Value::List(items)),
        SeqTarget::Text => {
            let mut text = String::new();
            for item in items {
                match item {
                    Value::Char(ch) => text.push(ch),
                    Value::Text(chunk) => text.push_str(&chunk),
                    Value::U8(byte) => text.push(byte as char),
                    other => {
                        return Err(ReadError::Transform {
                            property: field.name.clone(),
                            offset,
                            source: TransformError::new(format!(
                                "cannot join a {} item into text",
                                other.kind()
                            )),
                        });
                    }
                }
            }
            Ok(Value::Text(text))
        }
    }
}

// ----------------------------------------------------------------------
// write path
// ----------------------------------------------------------------------

pub(crate) fn write_value(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    base: &BaseKind,
    instance: &Value,
    value: &Value,
) -> Result<(), WriteError> {
    write_chain(env, cursor, shape, field, &field.controllers, base, instance, value)
}

#[allow(clippy::too_many_arguments)]
fn write_chain(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    chain: &[ControllerRec],
    base: &BaseKind,
    instance: &Value,
    value: &Value,
) -> Result<(), WriteError> {
    match chain.split_last() {
        None => write_base(env, cursor, field, base, instance, value),
        Some((outer, rest)) => {
            write_controller(env, cursor, shape, field, outer, rest, base, instance, value)
        }
    }
}

fn write_base(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    field: &FieldDef,
    base: &BaseKind,
    instance: &Value,
    value: &Value,
) -> Result<(), WriteError> {
    match base {
        BaseKind::Primitive(tag) => {
            let wire = transform::apply_primitive_write(field, value.clone(), instance).map_err(
                |source| WriteError::Transform {
                    property: field.name.clone(),
                    offset: cursor.offset(),
                    source,
                },
            )?;
            cursor
                .write(*tag, &wire)
                .map_err(|err| WriteError::from_cursor(&field.name, err))
        }

        BaseKind::Nested { shape: inner, .. } => {
            write::write_shape(env, cursor, inner, value, Some(instance))
        }

        BaseKind::Unknown => Err(WriteError::Internal {
            detail: format!("descriptor for property {} was never resolved", field.name),
        }),
    }
}

/// The stored sequence a controller iterates on write. A text-targeted
/// controller splits its text back into characters.
fn sequence_items(
    rec: &ControllerRec,
    field: &FieldDef,
    value: &Value,
) -> Result<Vec<Value>, WriteError> {
    match (rec.opts.target, value) {
        (SeqTarget::List, Value::List(items)) | (SeqTarget::Text, Value::List(items)) => {
            Ok(items.clone())
        }
        (SeqTarget::Text, Value::Text(text)) => Ok(text.chars().map(Value::Char).collect()),
        (_, other) => Err(WriteError::TypeMismatch {
            property: field.name.clone(),
            expected: "sequence".to_string(),
            found: other.kind(),
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn write_controller(
    env: &mut Env<'_>,
    cursor: &mut Cursor,
    shape: &Arc<Shape>,
    field: &FieldDef,
    rec: &ControllerRec,
    rest: &[ControllerRec],
    base: &BaseKind,
    instance: &Value,
    value: &Value,
) -> Result<(), WriteError> {
    let start = cursor.offset();

    if let ControllerKind::Matrix { .. } = rec.kind {
        let Value::List(rows) = value else {
            return Err(WriteError::TypeMismatch {
                property: field.name.clone(),
                expected: "matrix rows".to_string(),
                found: value.kind(),
            });
        };
        for row in rows {
            let row_start = cursor.offset();
            let Value::List(row_items) = row else {
                return Err(WriteError::TypeMismatch {
                    property: field.name.clone(),
                    expected: "matrix row".to_string(),
                    found: row.kind(),
                });
            };
            for item in row_items {
                write_chain(env, cursor, shape, field, rest, base, instance, item)?;
            }
            if let Some(alignment) = rec.opts.alignment {
                pad_to_alignment(cursor, alignment, row_start);
            }
        }
        return Ok(());
    }

    let items = sequence_items(rec, field, value)?;
    for item in &items {
        write_chain(env, cursor, shape, field, rest, base, instance, item)?;
    }

    if let Some(alignment) = rec.opts.alignment {
        pad_to_alignment(cursor, alignment, start);
    }

    Ok(())
}

fn pad_to_alignment(cursor: &mut Cursor, alignment: usize, base: usize) {
    if alignment == 0 {
        return;
    }
    let consumed = cursor.offset().saturating_sub(base);
    let pad = (alignment - consumed % alignment) % alignment;
    cursor.pad_zero(pad);
}

//! Transformer application. Aggregate transformers run after the
//! controller on read and before it on write; primitive-level transformers
//! wrap every single primitive crossing the cursor. Registration order on
//! read, reverse order on write.

use crate::{
    schema::{FieldDef, TransformError, TransformLevel, TransformerRec},
    value::Value,
};

pub(crate) fn apply_read(
    field: &FieldDef,
    value: Value,
    instance: &Value,
) -> Result<Value, TransformError> {
    let mut value = value;
    for rec in &field.transformers {
        if rec.level == TransformLevel::Aggregate && rec.scope.on_read() {
            value = apply_one(rec, value, instance)?;
        }
    }

    Ok(value)
}

pub(crate) fn apply_write(
    field: &FieldDef,
    value: Value,
    instance: &Value,
) -> Result<Value, TransformError> {
    let mut value = value;
    for rec in field.transformers.iter().rev() {
        if rec.level == TransformLevel::Aggregate && rec.scope.on_write() {
            value = apply_one(rec, value, instance)?;
        }
    }

    Ok(value)
}

pub(crate) fn apply_primitive_read(
    field: &FieldDef,
    value: Value,
    instance: &Value,
) -> Result<Value, TransformError> {
    let mut value = value;
    for rec in &field.transformers {
        if rec.level == TransformLevel::Primitive && rec.scope.on_read() {
            value = (rec.apply)(value, instance)?;
        }
    }

    Ok(value)
}

pub(crate) fn apply_primitive_write(
    field: &FieldDef,
    value: Value,
    instance: &Value,
) -> Result<Value, TransformError> {
    let mut value = value;
    for rec in field.transformers.iter().rev() {
        if rec.level == TransformLevel::Primitive && rec.scope.on_write() {
            value = (rec.apply)(value, instance)?;
        }
    }

    Ok(value)
}

fn apply_one(
    rec: &TransformerRec,
    value: Value,
    instance: &Value,
) -> Result<Value, TransformError> {
    if !rec.each {
        return (rec.apply)(value, instance);
    }

    match value {
        Value::List(items) => Ok(Value::List(map_items(rec, items, instance)?)),
        other => (rec.apply)(other, instance),
    }
}

fn map_items(
    rec: &TransformerRec,
    items: Vec<Value>,
    instance: &Value,
) -> Result<Vec<Value>, TransformError> {
    items
        .into_iter()
        .map(|item| match item {
            Value::List(inner) if rec.deep => {
                Ok(Value::List(map_items(rec, inner, instance)?))
            }
            other => (rec.apply)(other, instance),
        })
        .collect()
}

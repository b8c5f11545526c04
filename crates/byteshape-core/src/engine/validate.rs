//! Validator application. Failures carry the validator's name, the
//! property, the offending value, and the cursor offset; `optional`
//! validators only surface through the trace sink.

use crate::{
    engine::Env,
    schema::{FieldDef, ValidatorRec},
    trace::TraceEvent,
    value::Value,
};

///
/// Failure
/// One raised validation failure, annotated at the loop boundary.
///

pub(crate) struct Failure {
    pub validator: String,
    pub value: Value,
    pub message: String,
}

pub(crate) fn run(
    env: &Env<'_>,
    field: &FieldDef,
    value: &Value,
    instance: &Value,
    offset: usize,
) -> Result<(), Failure> {
    for rec in &field.validators {
        let verdict = if rec.each {
            match value {
                Value::List(items) => items.iter().all(|item| (rec.test)(item, instance)),
                other => (rec.test)(other, instance),
            }
        } else {
            (rec.test)(value, instance)
        };

        if verdict {
            continue;
        }

        env.trace(&TraceEvent::ValidationFailed {
            field: &field.name,
            validator: &rec.label,
            offset,
        });

        if rec.optional {
            continue;
        }

        return Err(Failure {
            validator: rec.label.clone(),
            value: value.clone(),
            message: render_message(rec, value),
        });
    }

    Ok(())
}

fn render_message(rec: &ValidatorRec, value: &Value) -> String {
    match &rec.message {
        Some(message) => format!("{message}, found {value}"),
        None => format!("value {value} rejected"),
    }
}

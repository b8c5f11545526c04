//! Descriptor selection at parse time. A dynamic `select` overrides every
//! other condition on the property; otherwise arms are tried in declaration
//! order and the first match wins.

use crate::{
    engine::Env,
    schema::{BaseKind, FieldDef},
    trace::TraceEvent,
    value::Value,
};

///
/// Outcome
///

pub(crate) enum Outcome {
    /// A concrete descriptor to read or write with.
    Base(BaseKind),
    /// The property is deliberately absent; leave it unset.
    Absent,
    /// Conditions exist but none matched.
    NoMatch,
}

pub(crate) fn resolve(env: &Env<'_>, field: &FieldDef, instance: &Value) -> Outcome {
    if let Some(select) = &field.select {
        return match select(instance) {
            Some(shape) => {
                env.trace(&TraceEvent::ConditionPicked {
                    field: &field.name,
                    arm: shape.name(),
                });
                Outcome::Base(BaseKind::Nested { shape, args: None })
            }
            None => Outcome::Absent,
        };
    }

    if field.conditions.is_empty() {
        return if field.base.is_unknown() {
            Outcome::Absent
        } else {
            Outcome::Base(field.base.clone())
        };
    }

    for rec in &field.conditions {
        if rec.matches(instance) {
            env.trace(&TraceEvent::ConditionPicked {
                field: &field.name,
                arm: &rec.label,
            });
            return match &rec.arm {
                Some(base) => Outcome::Base(base.clone()),
                None => Outcome::Absent,
            };
        }
    }

    Outcome::NoMatch
}

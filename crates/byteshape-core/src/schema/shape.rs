//! The type descriptor. A shape is built once, validated at description
//! time, and immutable afterwards; parses share it behind an `Arc`.

use crate::{
    cursor::Endian,
    expr::ExprError,
    schema::record::{
        BaseKind, BitfieldRec, ConditionRec, ContextRec, ControllerRec, HookRec, SelectFn,
        TransformerRec, ValidatorRec,
    },
    value::PrimitiveTag,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error as ThisError;

///
/// SchemaError
/// Raised while a description is being built, never during a parse.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("shape {shape}: a relation is already defined for property {property}")]
    RelationAlreadyDefined { shape: String, property: String },

    #[error("shape {shape}: property {property} has no relation for its controller to iterate")]
    RelationNotDefined { shape: String, property: String },

    #[error("shape {shape}: invalid bit-field class: {reason}")]
    WrongBitfieldClassImplementation { shape: String, reason: String },

    #[error("shape {shape}: property {property} refers to the shape being described")]
    SelfReferringField { shape: String, property: String },

    #[error("shape {shape}: property {property} can never resolve to a type")]
    UnknownPropertyType { shape: String, property: String },

    #[error("shape {shape}: property {property}: {detail}")]
    InvalidAnnotation {
        shape: String,
        property: String,
        detail: String,
    },

    #[error("shape {shape}: {source}")]
    Expr {
        shape: String,
        #[source]
        source: ExprError,
    },
}

///
/// FieldDef
/// One property of a shape: its base descriptor plus the per-kind
/// annotation record lists, each kept in attachment order.
///

#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub base: BaseKind,
    pub select: Option<SelectFn>,
    pub conditions: Vec<ConditionRec>,
    pub controllers: Vec<ControllerRec>,
    pub transformers: Vec<TransformerRec>,
    pub validators: Vec<ValidatorRec>,
    pub pre: Vec<HookRec>,
    pub post: Vec<HookRec>,
    pub context: Vec<ContextRec>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, base: BaseKind) -> Self {
        Self {
            name: name.into(),
            base,
            select: None,
            conditions: Vec::new(),
            controllers: Vec::new(),
            transformers: Vec::new(),
            validators: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            context: Vec::new(),
        }
    }

    /// Whether anything at read time could give this property a value.
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        use crate::schema::record::{ContextOp, HookKind};

        !self.base.is_unknown()
            || self.select.is_some()
            || !self.conditions.is_empty()
            || self
                .context
                .iter()
                .any(|rec| matches!(rec.op, ContextOp::Get { .. }))
            || self
                .post
                .iter()
                .any(|hook| matches!(hook.kind, HookKind::ValueSet(_)))
    }
}

///
/// Shape
///

#[derive(Clone)]
pub struct Shape {
    name: String,
    params: Vec<String>,
    fields: Vec<FieldDef>,
    bitfields: Vec<BitfieldRec>,
    carrier: Option<PrimitiveTag>,
    class_pre: Vec<HookRec>,
    class_post: Vec<HookRec>,
    endian: Option<Endian>,
}

impl Shape {
    pub(crate) fn new(
        name: String,
        params: Vec<String>,
        fields: Vec<FieldDef>,
        bitfields: Vec<BitfieldRec>,
        carrier: Option<PrimitiveTag>,
        class_pre: Vec<HookRec>,
        class_post: Vec<HookRec>,
        endian: Option<Endian>,
    ) -> Self {
        Self {
            name,
            params,
            fields,
            bitfields,
            carrier,
            class_pre,
            class_post,
            endian,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Field names in declaration order — the on-wire order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    #[must_use]
    pub fn bitfields(&self) -> &[BitfieldRec] {
        &self.bitfields
    }

    /// A shape is a bit-field class exactly when it has bit-field records.
    #[must_use]
    pub fn is_bitfield(&self) -> bool {
        !self.bitfields.is_empty()
    }

    /// The integer carrier of a bit-field class.
    #[must_use]
    pub const fn carrier(&self) -> Option<PrimitiveTag> {
        self.carrier
    }

    #[must_use]
    pub fn class_pre(&self) -> &[HookRec] {
        &self.class_pre
    }

    #[must_use]
    pub fn class_post(&self) -> &[HookRec] {
        &self.class_post
    }

    /// Class-scoped endianness, set permanently for the shape's extent.
    #[must_use]
    pub const fn endian(&self) -> Option<Endian> {
        self.endian
    }

    /// Serializable diagnostic summary: name, params, and the field list in
    /// declaration order with base-descriptor labels.
    #[must_use]
    pub fn info(&self) -> ShapeInfo {
        ShapeInfo {
            name: self.name.clone(),
            params: self.params.clone(),
            endian: self.endian,
            fields: self
                .fields
                .iter()
                .map(|field| FieldInfo {
                    name: field.name.clone(),
                    base: field.base.label(),
                    controllers: field
                        .controllers
                        .iter()
                        .map(|rec| rec.kind.name().to_string())
                        .collect(),
                })
                .collect(),
            bitfields: self
                .bitfields
                .iter()
                .map(|rec| (rec.name.clone(), rec.bits))
                .collect(),
        }
    }

    /// Smallest supported carrier for a bit-field class of `total` bits.
    pub(crate) fn carrier_for(shape: &str, total: u32) -> Result<PrimitiveTag, SchemaError> {
        match total {
            0 => Err(SchemaError::WrongBitfieldClassImplementation {
                shape: shape.to_string(),
                reason: "total bit width is zero".to_string(),
            }),
            1..=8 => Ok(PrimitiveTag::U8),
            9..=16 => Ok(PrimitiveTag::U16),
            17..=32 => Ok(PrimitiveTag::U32),
            _ => Err(SchemaError::WrongBitfieldClassImplementation {
                shape: shape.to_string(),
                reason: format!("total bit width {total} exceeds the largest carrier (32)"),
            }),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({self})")
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        if self.is_bitfield() {
            f.write_str(" {")?;
            for (i, rec) in self.bitfields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}:{}", rec.name, rec.bits)?;
            }
            return f.write_str(" bits}");
        }

        f.write_str(" {")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.base.label())?;
        }
        f.write_str("}")
    }
}

///
/// ShapeInfo
///

#[derive(Clone, Debug, Serialize)]
pub struct ShapeInfo {
    pub name: String,
    pub params: Vec<String>,
    pub endian: Option<Endian>,
    pub fields: Vec<FieldInfo>,
    pub bitfields: Vec<(String, u32)>,
}

///
/// FieldInfo
///

#[derive(Clone, Debug, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub base: String,
    pub controllers: Vec<String>,
}

//! Runtime error taxonomy. Declaration problems surface as `SchemaError`
//! before any parse starts; everything here happens while a cursor is live
//! and carries the failing property and offset where applicable.

use crate::{
    cursor::CursorError,
    expr::ExprError,
    schema::{HookError, TransformError},
    value::Value,
};
use thiserror::Error as ThisError;

///
/// ReadError
///

#[derive(Debug, ThisError, PartialEq)]
pub enum ReadError {
    /// The input ran out mid-read. `partial` carries whatever the failing
    /// scope had produced so an absorbing controller can recover it.
    #[error("end of input at offset {offset} (requested {requested} bytes)")]
    EndOfInput {
        offset: usize,
        requested: usize,
        partial: Option<Box<Value>>,
    },

    #[error("property {property}: no condition matched at offset {offset}")]
    NoConditionMatched { property: String, offset: usize },

    #[error("property {property}: validator {validator} failed at offset {offset}: {message}")]
    ValidationFailed {
        validator: String,
        property: String,
        value: Box<Value>,
        message: String,
        offset: usize,
    },

    #[error("property {property}: {source}")]
    Expr {
        property: String,
        #[source]
        source: ExprError,
    },

    #[error("property {property} at offset {offset}: {source}")]
    Transform {
        property: String,
        offset: usize,
        #[source]
        source: TransformError,
    },

    #[error("property {property} at offset {offset}: hook failed: {source}")]
    Hook {
        property: String,
        offset: usize,
        #[source]
        source: HookError,
    },

    #[error("property {property}: context key {key:?} is missing and has no default")]
    ContextMissing { property: String, key: String },

    #[error("property {property}: {source}")]
    Cursor {
        property: String,
        #[source]
        source: CursorError,
    },

    #[error("internal engine invariant violated: {detail}")]
    Internal { detail: String },
}

impl ReadError {
    /// Lift a raw cursor failure, preserving the typed end-of-input form.
    pub(crate) fn from_cursor(property: &str, err: CursorError) -> Self {
        match err {
            CursorError::EndOfInput {
                offset, requested, ..
            } => Self::EndOfInput {
                offset,
                requested,
                partial: None,
            },
            other => Self::Cursor {
                property: property.to_string(),
                source: other,
            },
        }
    }

    pub(crate) fn from_phase(property: &str, offset: usize, err: PhaseError) -> Self {
        match err {
            PhaseError::Hook(source) => Self::Hook {
                property: property.to_string(),
                offset,
                source,
            },
            PhaseError::Expr(source) => Self::Expr {
                property: property.to_string(),
                source,
            },
            PhaseError::Cursor(source) => Self::from_cursor(property, source),
        }
    }
}

///
/// WriteError
///

#[derive(Debug, ThisError, PartialEq)]
pub enum WriteError {
    #[error("property {property}: cannot write a {found} value where {expected} is declared")]
    TypeMismatch {
        property: String,
        expected: String,
        found: &'static str,
    },

    #[error("shape {shape}: instance has no value for property {property}")]
    MissingField { shape: String, property: String },

    #[error("property {property}: no condition matched at offset {offset}")]
    NoConditionMatched { property: String, offset: usize },

    #[error("property {property}: validator {validator} failed at offset {offset}: {message}")]
    ValidationFailed {
        validator: String,
        property: String,
        value: Box<Value>,
        message: String,
        offset: usize,
    },

    #[error("property {property}: {source}")]
    Expr {
        property: String,
        #[source]
        source: ExprError,
    },

    #[error("property {property} at offset {offset}: {source}")]
    Transform {
        property: String,
        offset: usize,
        #[source]
        source: TransformError,
    },

    #[error("property {property} at offset {offset}: hook failed: {source}")]
    Hook {
        property: String,
        offset: usize,
        #[source]
        source: HookError,
    },

    #[error("property {property}: context key {key:?} is missing and has no default")]
    ContextMissing { property: String, key: String },

    #[error("property {property}: {source}")]
    Cursor {
        property: String,
        #[source]
        source: CursorError,
    },

    #[error("internal engine invariant violated: {detail}")]
    Internal { detail: String },
}

impl WriteError {
    pub(crate) fn from_cursor(property: &str, err: CursorError) -> Self {
        match err {
            CursorError::TypeMismatch { tag, found } => Self::TypeMismatch {
                property: property.to_string(),
                expected: tag.name().to_string(),
                found,
            },
            other => Self::Cursor {
                property: property.to_string(),
                source: other,
            },
        }
    }

    pub(crate) fn from_phase(property: &str, offset: usize, err: PhaseError) -> Self {
        match err {
            PhaseError::Hook(source) => Self::Hook {
                property: property.to_string(),
                offset,
                source,
            },
            PhaseError::Expr(source) => Self::Expr {
                property: property.to_string(),
                source,
            },
            PhaseError::Cursor(source) => Self::from_cursor(property, source),
        }
    }
}

///
/// PhaseError
/// Shared failure carrier for the hook/context phases, annotated with
/// property and offset at the loop boundary.
///

#[derive(Debug)]
pub(crate) enum PhaseError {
    Hook(HookError),
    Expr(ExprError),
    Cursor(CursorError),
}

impl From<HookError> for PhaseError {
    fn from(err: HookError) -> Self {
        Self::Hook(err)
    }
}

impl From<ExprError> for PhaseError {
    fn from(err: ExprError) -> Self {
        Self::Expr(err)
    }
}

impl From<CursorError> for PhaseError {
    fn from(err: CursorError) -> Self {
        Self::Cursor(err)
    }
}

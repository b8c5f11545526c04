//! Annotation records. Every decoration on a property becomes one record in
//! a per-kind list on the field descriptor; the engines interpret the lists
//! at read/write time. Records carry a stable id so `once` hooks can be
//! pruned per parse without touching the shared shape.

use crate::{
    cursor::{Cursor, Endian},
    expr::{ArgList, ExprError, NumExpr, PathExpr},
    schema::shape::Shape,
    value::{PrimitiveTag, Value},
};
use std::{fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// RecordId
/// Unique within one shape; assigned in attachment order when the shape is
/// finished.
///

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct RecordId(pub(crate) u32);

///
/// TransformError
///

#[derive(Debug, ThisError, PartialEq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

///
/// HookError
///

#[derive(Debug, ThisError, PartialEq)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

///
/// IterProbe
/// Everything a `While` predicate may look at after an item has been read.
///

pub struct IterProbe<'a> {
    pub value: &'a Value,
    pub count: usize,
    pub instance: &'a Value,
    pub offset: usize,
    pub start_offset: usize,
}

// Closure seams. Shapes are shared and immutable, so every payload is an
// `Arc` and must be callable from any thread that owns a parse.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type SelectFn = Arc<dyn Fn(&Value) -> Option<Arc<Shape>> + Send + Sync>;
pub type KeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type ArgsFn = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;
pub type MapToFn = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;
pub type WhileFn = Arc<dyn Fn(&IterProbe<'_>) -> bool + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(Value, &Value) -> Result<Value, TransformError> + Send + Sync>;
pub type CheckFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
pub type HookFn = Arc<dyn Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync>;
pub type ValueSetFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type NumFn = Arc<dyn Fn(&Value) -> i64 + Send + Sync>;
pub type EndianFn = Arc<dyn Fn(&Value) -> Endian + Send + Sync>;

///
/// NumSource
/// A numeric annotation argument: literal/path/arithmetic expression, or a
/// caller closure.
///

#[derive(Clone)]
pub enum NumSource {
    Expr(NumExpr),
    Fn(NumFn),
}

impl NumSource {
    pub fn eval(&self, instance: &Value) -> Result<i64, ExprError> {
        match self {
            Self::Expr(expr) => expr.eval(instance),
            Self::Fn(f) => Ok(f(instance)),
        }
    }
}

impl fmt::Debug for NumSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(expr) => write!(f, "NumSource({expr})"),
            Self::Fn(_) => f.write_str("NumSource(fn)"),
        }
    }
}

///
/// EndianSource
///

#[derive(Clone)]
pub enum EndianSource {
    Fixed(Endian),
    Fn(EndianFn),
}

impl EndianSource {
    #[must_use]
    pub fn eval(&self, instance: &Value) -> Endian {
        match self {
            Self::Fixed(endian) => *endian,
            Self::Fn(f) => f(instance),
        }
    }
}

///
/// ArgSource
/// Constructor arguments for a nested shape: a comma-separated path list or
/// a closure over the parent instance.
///

#[derive(Clone)]
pub enum ArgSource {
    Paths(ArgList),
    Fn(ArgsFn),
}

impl ArgSource {
    pub fn resolve(&self, parent: &Value) -> Result<Vec<Value>, ExprError> {
        match self {
            Self::Paths(list) => list.resolve(parent),
            Self::Fn(f) => Ok(f(parent)),
        }
    }
}

///
/// BaseKind
/// The base descriptor of a property: primitive-typed, nested-typed, or
/// deferred until a condition resolves it.
///

#[derive(Clone)]
pub enum BaseKind {
    Primitive(PrimitiveTag),
    Nested {
        shape: Arc<Shape>,
        args: Option<ArgSource>,
    },
    Unknown,
}

impl BaseKind {
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Primitive(tag) => tag.name().to_string(),
            Self::Nested { shape, .. } => shape.name().to_string(),
            Self::Unknown => "unknown".to_string(),
        }
    }
}

impl fmt::Debug for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseKind({})", self.label())
    }
}

///
/// Scope
/// Which loop an annotation participates in.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Scope {
    OnRead,
    OnWrite,
    #[default]
    OnBoth,
}

impl Scope {
    #[must_use]
    pub const fn on_read(self) -> bool {
        matches!(self, Self::OnRead | Self::OnBoth)
    }

    #[must_use]
    pub const fn on_write(self) -> bool {
        matches!(self, Self::OnWrite | Self::OnBoth)
    }
}

///
/// ConditionRec
/// One arm of a conditional property. `pred: None` is the `else` arm and
/// always matches. Arms are tried in declaration order, topmost first.
///

#[derive(Clone)]
pub struct ConditionRec {
    pub id: RecordId,
    pub label: String,
    pub pred: Option<PredicateFn>,
    pub arm: Option<BaseKind>,
}

impl ConditionRec {
    #[must_use]
    pub fn matches(&self, instance: &Value) -> bool {
        self.pred.as_ref().is_none_or(|pred| pred(instance))
    }
}

///
/// ChoiceKey
/// Selector of a `Choice`: a path into the instance or a caller closure.
/// Keys compare by lexical form.
///

#[derive(Clone)]
pub enum ChoiceKey {
    Path(PathExpr),
    Fn(KeyFn),
}

impl ChoiceKey {
    pub fn select(&self, instance: &Value) -> Result<Value, ExprError> {
        match self {
            Self::Path(path) => path.resolve(instance).cloned(),
            Self::Fn(f) => Ok(f(instance)),
        }
    }
}

///
/// SeqTarget
/// What a controller turns its item sequence into.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SeqTarget {
    #[default]
    List,
    Text,
}

///
/// ControllerOpts
///

#[derive(Clone, Debug)]
pub struct ControllerOpts {
    pub primitive_check: bool,
    pub target: SeqTarget,
    pub alignment: Option<usize>,
    pub peek: bool,
}

impl Default for ControllerOpts {
    fn default() -> Self {
        Self {
            primitive_check: true,
            target: SeqTarget::List,
            alignment: None,
            peek: false,
        }
    }
}

///
/// ControllerKind
///

#[derive(Clone)]
pub enum ControllerKind {
    Count(NumSource),
    While(WhileFn),
    UntilValue(Value),
    UntilEof,
    Size(NumSource),
    MapTo(MapToFn),
    Matrix { width: NumSource, height: NumSource },
}

impl ControllerKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count(_) => "count",
            Self::While(_) => "while",
            Self::UntilValue(_) => "until",
            Self::UntilEof => "until-eof",
            Self::Size(_) => "size",
            Self::MapTo(_) => "map-to",
            Self::Matrix { .. } => "matrix",
        }
    }
}

///
/// ControllerRec
///

#[derive(Clone)]
pub struct ControllerRec {
    pub id: RecordId,
    pub kind: ControllerKind,
    pub opts: ControllerOpts,
}

///
/// TransformLevel
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransformLevel {
    /// Applied once to the aggregated value of the property.
    #[default]
    Aggregate,
    /// Applied to every primitive as it is read or written.
    Primitive,
}

///
/// TransformerRec
///

#[derive(Clone)]
pub struct TransformerRec {
    pub id: RecordId,
    pub label: String,
    pub scope: Scope,
    pub level: TransformLevel,
    pub each: bool,
    pub deep: bool,
    pub apply: TransformFn,
}

///
/// ValidatorRec
///

#[derive(Clone)]
pub struct ValidatorRec {
    pub id: RecordId,
    pub label: String,
    pub each: bool,
    pub optional: bool,
    pub primitive_check: bool,
    pub message: Option<String>,
    pub test: CheckFn,
}

///
/// HookKind
///

#[derive(Clone)]
pub enum HookKind {
    /// Caller side effect on instance and cursor.
    User(HookFn),
    /// `cursor.move(n)` before the scope's work.
    Offset(NumSource),
    /// Save the offset, optionally jump; the matching post restores it.
    Peek(Option<NumSource>),
    /// Pin the scope's footprint to exactly `n` bytes.
    EnsureSize(NumSource),
    /// Round the scope's footprint up to a multiple of `n`.
    Padding(NumSource),
    /// Swap endianness for the scope; the matching post restores it.
    Endian(EndianSource),
    /// After read, derive the property from the instance. Consumes no bytes.
    ValueSet(ValueSetFn),
    /// Copy the parent instance's fields into a nested instance before its
    /// fields are read.
    ShareWithRelation,
}

impl HookKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Offset(_) => "offset",
            Self::Peek(_) => "peek",
            Self::EnsureSize(_) => "ensure-size",
            Self::Padding(_) => "padding",
            Self::Endian(_) => "endian",
            Self::ValueSet(_) => "value-set",
            Self::ShareWithRelation => "share-with-relation",
        }
    }
}

///
/// HookRec
///

#[derive(Clone)]
pub struct HookRec {
    pub id: RecordId,
    pub label: String,
    pub scope: Scope,
    pub once: bool,
    pub primitive_check: bool,
    pub kind: HookKind,
}

///
/// ContextOp
///

#[derive(Clone)]
pub enum ContextOp {
    Get {
        key: String,
        default: Option<Value>,
    },
    Set {
        key: String,
    },
    Append {
        key: String,
    },
}

///
/// ContextRec
///

#[derive(Clone)]
pub struct ContextRec {
    pub id: RecordId,
    pub op: ContextOp,
}

///
/// BitfieldRec
/// One member of a bit-field class: a name and a width in bits. Members
/// concatenate top-to-bottom from the carrier's most significant bit.
///

#[derive(Clone, Debug)]
pub struct BitfieldRec {
    pub id: RecordId,
    pub name: String,
    pub bits: u32,
}

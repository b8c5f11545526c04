//! Shape descriptions: the metadata store, the annotation records, and the
//! builder surface that assembles them. Everything in this module runs at
//! description time and is immutable once a shape is finished.

pub mod builder;
pub mod record;
pub mod shape;

pub(crate) mod text;


// the builder vocabulary is the crate's public annotation surface
pub use builder::{
    Arm, Check, FieldBuilder, Hook, HookPhase, IntoNumSource, ShapeBuilder, Transform, ascii,
    chr, f32, f64, flatten, i8, i16, i32, i64, nested, nested_by, nested_with, null_terminated,
    null_terminated_string, u8, u16, u32, u64, unknown, utf8, utf16, utf32,
};
pub use record::{
    ArgSource, BaseKind, BitfieldRec, ChoiceKey, ConditionRec, ContextOp, ContextRec,
    ControllerKind, ControllerOpts, ControllerRec, EndianSource, HookError, HookKind, HookRec,
    IterProbe, NumSource, RecordId, Scope, SeqTarget, TransformError, TransformLevel,
    TransformerRec, ValidatorRec,
};
pub use shape::{FieldDef, FieldInfo, SchemaError, Shape, ShapeInfo};

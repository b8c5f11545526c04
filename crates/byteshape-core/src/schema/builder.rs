//! The annotation surface: a fluent builder that assembles shapes out of
//! base descriptors and annotation records. Everything here runs at
//! description time; parse-time work lives in the engine modules.

use crate::{
    cursor::{Cursor, Endian},
    expr::{ArgList, ExprError, NumExpr, PathExpr},
    schema::{
        record::{
            ArgSource, BaseKind, BitfieldRec, ChoiceKey, ConditionRec, ContextOp, ContextRec,
            ControllerKind, ControllerOpts, ControllerRec, HookError, HookKind, HookRec,
            IterProbe, NumSource, RecordId, Scope, SeqTarget, TransformError, TransformLevel,
            TransformerRec, ValidatorRec,
        },
        shape::{FieldDef, SchemaError, Shape},
        text,
    },
    value::{PrimitiveTag, Value},
};
use std::sync::Arc;

///
/// IntoNumSource
/// Numeric annotation arguments: integer literals, expression strings.
///

pub trait IntoNumSource {
    fn into_source(self) -> Result<NumSource, ExprError>;
}

impl IntoNumSource for i64 {
    fn into_source(self) -> Result<NumSource, ExprError> {
        Ok(NumSource::Expr(NumExpr::literal(self)))
    }
}

impl IntoNumSource for i32 {
    fn into_source(self) -> Result<NumSource, ExprError> {
        i64::from(self).into_source()
    }
}

impl IntoNumSource for usize {
    fn into_source(self) -> Result<NumSource, ExprError> {
        (self as i64).into_source()
    }
}

impl IntoNumSource for &str {
    fn into_source(self) -> Result<NumSource, ExprError> {
        NumExpr::parse(self).map(NumSource::Expr)
    }
}

impl IntoNumSource for String {
    fn into_source(self) -> Result<NumSource, ExprError> {
        self.as_str().into_source()
    }
}

impl IntoNumSource for NumSource {
    fn into_source(self) -> Result<NumSource, ExprError> {
        Ok(self)
    }
}

///
/// Arm
/// The descriptor a condition resolves to: a base kind, or declared-absent
/// (the property is left unset when the arm matches).
///

#[derive(Clone)]
pub struct Arm {
    base: Result<Option<BaseKind>, ExprError>,
}

impl Arm {
    /// The matching property is intentionally absent from the stream.
    #[must_use]
    pub const fn absent() -> Self {
        Self { base: Ok(None) }
    }

    #[must_use]
    pub fn nested(shape: &Arc<Shape>) -> Self {
        Self {
            base: Ok(Some(BaseKind::Nested {
                shape: Arc::clone(shape),
                args: None,
            })),
        }
    }

    /// Nested arm with a comma-separated constructor-argument path list.
    #[must_use]
    pub fn nested_with(shape: &Arc<Shape>, args: &str) -> Self {
        Self {
            base: ArgList::parse(args).map(|list| {
                Some(BaseKind::Nested {
                    shape: Arc::clone(shape),
                    args: Some(ArgSource::Paths(list)),
                })
            }),
        }
    }
}

impl From<FieldBuilder> for Arm {
    fn from(builder: FieldBuilder) -> Self {
        Self {
            base: Ok(Some(builder.base)),
        }
    }
}

impl From<&Arc<Shape>> for Arm {
    fn from(shape: &Arc<Shape>) -> Self {
        Self::nested(shape)
    }
}

impl From<PrimitiveTag> for Arm {
    fn from(tag: PrimitiveTag) -> Self {
        Self {
            base: Ok(Some(BaseKind::Primitive(tag))),
        }
    }
}

///
/// Transform
/// Configuration for one transformer record.
///

pub struct Transform {
    label: String,
    scope: Scope,
    level: TransformLevel,
    each: bool,
    deep: bool,
    apply: crate::schema::record::TransformFn,
}

impl Transform {
    fn new(
        scope: Scope,
        f: impl Fn(Value, &Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: "transform".to_string(),
            scope,
            level: TransformLevel::Aggregate,
            each: false,
            deep: false,
            apply: Arc::new(f),
        }
    }

    #[must_use]
    pub fn read(
        f: impl Fn(Value, &Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(Scope::OnRead, f)
    }

    #[must_use]
    pub fn write(
        f: impl Fn(Value, &Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(Scope::OnWrite, f)
    }

    #[must_use]
    pub fn both(
        f: impl Fn(Value, &Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(Scope::OnBoth, f)
    }

    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Map over list items instead of replacing the list wholesale.
    #[must_use]
    pub const fn each(mut self) -> Self {
        self.each = true;
        self
    }

    /// With `each`, recurse into nested lists.
    #[must_use]
    pub const fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Run on every primitive as it crosses the cursor, not on the
    /// aggregated value.
    #[must_use]
    pub const fn primitive_level(mut self) -> Self {
        self.level = TransformLevel::Primitive;
        self
    }
}

///
/// Check
/// Configuration for one validator record.
///

pub struct Check {
    label: String,
    each: bool,
    optional: bool,
    primitive_check: bool,
    message: Option<String>,
    test: crate::schema::record::CheckFn,
}

impl Check {
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        test: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            each: false,
            optional: false,
            primitive_check: false,
            message: None,
            test: Arc::new(test),
        }
    }

    #[must_use]
    pub const fn each(mut self) -> Self {
        self.each = true;
        self
    }

    /// Record the failure in traces but never raise it.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub const fn primitive_check(mut self) -> Self {
        self.primitive_check = true;
        self
    }
}

///
/// HookPhase
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookPhase {
    Pre,
    Post,
}

///
/// Hook
/// Configuration for one pre/post record.
///

pub struct Hook {
    phase: HookPhase,
    label: Option<String>,
    scope: Scope,
    once: bool,
    primitive_check: bool,
    kind: HookKind,
}

impl Hook {
    const fn new(phase: HookPhase, kind: HookKind) -> Self {
        Self {
            phase,
            label: None,
            scope: Scope::OnBoth,
            once: false,
            primitive_check: false,
            kind,
        }
    }

    #[must_use]
    pub fn pre(
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(HookPhase::Pre, HookKind::User(Arc::new(f)))
    }

    #[must_use]
    pub fn post(
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(HookPhase::Post, HookKind::User(Arc::new(f)))
    }

    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Fire at most once per parse, then prune itself.
    #[must_use]
    pub const fn once(mut self) -> Self {
        self.once = true;
        self
    }

    #[must_use]
    pub const fn reading(mut self) -> Self {
        self.scope = Scope::OnRead;
        self
    }

    #[must_use]
    pub const fn writing(mut self) -> Self {
        self.scope = Scope::OnWrite;
        self
    }

    /// Require the property to have a base descriptor at describe time.
    #[must_use]
    pub const fn primitive_check(mut self) -> Self {
        self.primitive_check = true;
        self
    }

    fn into_rec(self) -> (HookPhase, HookRec) {
        let label = self
            .label
            .unwrap_or_else(|| self.kind.name().to_string());
        (
            self.phase,
            HookRec {
                id: RecordId::default(),
                label,
                scope: self.scope,
                once: self.once,
                primitive_check: self.primitive_check,
                kind: self.kind,
            },
        )
    }
}

///
/// FieldBuilder
/// One property under construction. Base-descriptor constructors are the
/// free functions below (`u8()`, `nested(..)`, `ascii()`, …); everything
/// else chains.
///

pub struct FieldBuilder {
    base: BaseKind,
    text_field: bool,
    select: Option<crate::schema::record::SelectFn>,
    conditions: Vec<ConditionRec>,
    controllers: Vec<ControllerRec>,
    transformers: Vec<TransformerRec>,
    validators: Vec<ValidatorRec>,
    pre: Vec<HookRec>,
    post: Vec<HookRec>,
    context: Vec<ContextRec>,
    expr_error: Option<ExprError>,
    misuse: Option<String>,
}

impl FieldBuilder {
    fn with_base(base: BaseKind) -> Self {
        Self {
            base,
            text_field: false,
            select: None,
            conditions: Vec::new(),
            controllers: Vec::new(),
            transformers: Vec::new(),
            validators: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            context: Vec::new(),
            expr_error: None,
            misuse: None,
        }
    }

    fn fail_expr(mut self, err: ExprError) -> Self {
        if self.expr_error.is_none() {
            self.expr_error = Some(err);
        }
        self
    }

    fn fail_misuse(mut self, detail: impl Into<String>) -> Self {
        if self.misuse.is_none() {
            self.misuse = Some(detail.into());
        }
        self
    }

    // ------------------------------------------------------------------
    // iteration controllers
    // ------------------------------------------------------------------

    fn push_controller(mut self, kind: ControllerKind) -> Self {
        let opts = ControllerOpts {
            target: if self.text_field {
                SeqTarget::Text
            } else {
                SeqTarget::List
            },
            ..ControllerOpts::default()
        };
        self.controllers.push(ControllerRec {
            id: RecordId::default(),
            kind,
            opts,
        });
        self
    }

    /// Read exactly `n` items; `n ≤ 0` produces an empty sequence.
    #[must_use]
    pub fn count(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.push_controller(ControllerKind::Count(source)),
            Err(err) => self.fail_expr(err),
        }
    }

    #[must_use]
    pub fn count_with(self, f: impl Fn(&Value) -> i64 + Send + Sync + 'static) -> Self {
        self.push_controller(ControllerKind::Count(NumSource::Fn(Arc::new(f))))
    }

    /// Read, append, then test; stop when the predicate goes false. The
    /// predicate is never consulted before the first read.
    #[must_use]
    pub fn read_while(self, f: impl Fn(&IterProbe<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.push_controller(ControllerKind::While(Arc::new(f)))
    }

    /// Read until the sentinel value appears; the sentinel is kept in the
    /// result unless `.peeked()` is set on this controller.
    #[must_use]
    pub fn until(self, sentinel: impl Into<Value>) -> Self {
        self.push_controller(ControllerKind::UntilValue(sentinel.into()))
    }

    /// Read until the input runs out; end-of-input is absorbed, not raised.
    #[must_use]
    pub fn until_eof(self) -> Self {
        self.push_controller(ControllerKind::UntilEof)
    }

    /// Read items until at least `n` bytes have been consumed.
    #[must_use]
    pub fn size(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.push_controller(ControllerKind::Size(source)),
            Err(err) => self.fail_expr(err),
        }
    }

    /// Read one item per entry of the provided list, forwarding the entry
    /// to the nested shape as its first constructor argument.
    #[must_use]
    pub fn map_to(self, f: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static) -> Self {
        self.push_controller(ControllerKind::MapTo(Arc::new(f)))
    }

    /// `h` rows of `w` items. Row padding comes from `.aligned(n)`.
    #[must_use]
    pub fn matrix(self, w: impl IntoNumSource, h: impl IntoNumSource) -> Self {
        let width = match w.into_source() {
            Ok(source) => source,
            Err(err) => return self.fail_expr(err),
        };
        let height = match h.into_source() {
            Ok(source) => source,
            Err(err) => return self.fail_expr(err),
        };
        self.push_controller(ControllerKind::Matrix { width, height })
    }

    fn last_controller(&mut self) -> Option<&mut ControllerRec> {
        self.controllers.last_mut()
    }

    /// Align the cursor after the last-attached controller finishes,
    /// relative to that controller's start offset. On a matrix this is the
    /// per-row alignment.
    #[must_use]
    pub fn aligned(mut self, n: usize) -> Self {
        match self.last_controller() {
            Some(rec) => {
                rec.opts.alignment = Some(n);
                self
            }
            None => self.fail_misuse("aligned() requires a controller"),
        }
    }

    /// On stopping, drop the stopping value and rewind the cursor to just
    /// before it.
    #[must_use]
    pub fn peeked(mut self) -> Self {
        match self.last_controller() {
            Some(rec) => {
                rec.opts.peek = true;
                self
            }
            None => self.fail_misuse("peeked() requires a controller"),
        }
    }

    /// Join the produced characters into text.
    #[must_use]
    pub fn as_text(mut self) -> Self {
        match self.last_controller() {
            Some(rec) => {
                rec.opts.target = SeqTarget::Text;
                self
            }
            None => self.fail_misuse("as_text() requires a controller"),
        }
    }

    /// Skip the describe-time base-descriptor check on the last controller.
    #[must_use]
    pub fn unchecked(mut self) -> Self {
        match self.last_controller() {
            Some(rec) => {
                rec.opts.primitive_check = false;
                self
            }
            None => self.fail_misuse("unchecked() requires a controller"),
        }
    }

    // ------------------------------------------------------------------
    // conditions
    // ------------------------------------------------------------------

    /// Use the arm when the predicate holds. Arms are tried topmost first.
    #[must_use]
    pub fn if_then(
        mut self,
        pred: impl Fn(&Value) -> bool + Send + Sync + 'static,
        arm: impl Into<Arm>,
    ) -> Self {
        let arm = arm.into();
        match arm.base {
            Ok(base) => {
                self.conditions.push(ConditionRec {
                    id: RecordId::default(),
                    label: "if-then".to_string(),
                    pred: Some(Arc::new(pred)),
                    arm: base,
                });
                self
            }
            Err(err) => self.fail_expr(err),
        }
    }

    /// Fallback arm; always matches.
    #[must_use]
    pub fn or_else(mut self, arm: impl Into<Arm>) -> Self {
        let arm = arm.into();
        match arm.base {
            Ok(base) => {
                self.conditions.push(ConditionRec {
                    id: RecordId::default(),
                    label: "else".to_string(),
                    pred: None,
                    arm: base,
                });
                self
            }
            Err(err) => self.fail_expr(err),
        }
    }

    /// Table dispatch on a selector path: expands into one equality arm per
    /// entry, in entry order. Keys compare by lexical form.
    #[must_use]
    pub fn choice<K, A>(self, selector: &str, arms: impl IntoIterator<Item = (K, A)>) -> Self
    where
        K: Into<Value>,
        A: Into<Arm>,
    {
        match PathExpr::parse(selector) {
            Ok(path) => self.choice_key(ChoiceKey::Path(path), arms, None),
            Err(err) => self.fail_expr(err),
        }
    }

    /// As `choice`, with a default constructor-argument list applied to
    /// nested arms that declare none of their own.
    #[must_use]
    pub fn choice_with_args<K, A>(
        self,
        selector: &str,
        arms: impl IntoIterator<Item = (K, A)>,
        default_args: &str,
    ) -> Self
    where
        K: Into<Value>,
        A: Into<Arm>,
    {
        let args = match ArgList::parse(default_args) {
            Ok(list) => list,
            Err(err) => return self.fail_expr(err),
        };
        match PathExpr::parse(selector) {
            Ok(path) => self.choice_key(ChoiceKey::Path(path), arms, Some(args)),
            Err(err) => self.fail_expr(err),
        }
    }

    /// Table dispatch on a computed key.
    #[must_use]
    pub fn choice_by<K, A>(
        self,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
        arms: impl IntoIterator<Item = (K, A)>,
    ) -> Self
    where
        K: Into<Value>,
        A: Into<Arm>,
    {
        self.choice_key(ChoiceKey::Fn(Arc::new(f)), arms, None)
    }

    fn choice_key<K, A>(
        mut self,
        key: ChoiceKey,
        arms: impl IntoIterator<Item = (K, A)>,
        default_args: Option<ArgList>,
    ) -> Self
    where
        K: Into<Value>,
        A: Into<Arm>,
    {
        for (entry, arm) in arms {
            let entry: Value = entry.into();
            let arm: Arm = arm.into();
            let mut base = match arm.base {
                Ok(base) => base,
                Err(err) => return self.fail_expr(err),
            };

            // nested arms inherit the choice's default constructor args
            if let (Some(defaults), Some(BaseKind::Nested { args, .. })) =
                (default_args.as_ref(), base.as_mut())
                && args.is_none()
            {
                *args = Some(ArgSource::Paths(defaults.clone()));
            }

            let expected = entry.lexical();
            let selector = key.clone();
            let pred = move |instance: &Value| {
                selector
                    .select(instance)
                    .is_ok_and(|actual| actual.lexical() == expected)
            };

            self.conditions.push(ConditionRec {
                id: RecordId::default(),
                label: format!("choice:{}", entry.lexical()),
                pred: Some(Arc::new(pred)),
                arm: base,
            });
        }
        self
    }

    /// Resolve the descriptor dynamically. Overrides every other condition
    /// on the property; the closure may consult the partial instance.
    #[must_use]
    pub fn select(
        mut self,
        f: impl Fn(&Value) -> Option<Arc<Shape>> + Send + Sync + 'static,
    ) -> Self {
        self.select = Some(Arc::new(f));
        self
    }

    // ------------------------------------------------------------------
    // transformers
    // ------------------------------------------------------------------

    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transformers.push(TransformerRec {
            id: RecordId::default(),
            label: transform.label,
            scope: transform.scope,
            level: transform.level,
            each: transform.each,
            deep: transform.deep,
            apply: transform.apply,
        });
        self
    }

    /// Multiply by `k` on read, divide on write. Integral results stay
    /// integral so they can feed an integer primitive on write-back.
    #[must_use]
    pub fn scaled(self, k: f64) -> Self {
        self.transform(
            Transform::read(move |value, _| numeric_map(&value, |v| v * k))
                .labelled("scale")
                .each()
                .deep(),
        )
        .transform(
            Transform::write(move |value, _| numeric_map(&value, |v| v / k))
                .labelled("scale")
                .each()
                .deep(),
        )
    }

    /// Add `k` on read, subtract on write.
    #[must_use]
    pub fn shifted(self, k: f64) -> Self {
        self.transform(
            Transform::read(move |value, _| numeric_map(&value, |v| v + k))
                .labelled("offset")
                .each()
                .deep(),
        )
        .transform(
            Transform::write(move |value, _| numeric_map(&value, |v| v - k))
                .labelled("offset")
                .each()
                .deep(),
        )
    }

    // ------------------------------------------------------------------
    // validators
    // ------------------------------------------------------------------

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.validators.push(ValidatorRec {
            id: RecordId::default(),
            label: check.label,
            each: check.each,
            optional: check.optional,
            primitive_check: check.primitive_check,
            message: check.message,
            test: check.test,
        });
        self
    }

    #[must_use]
    pub fn validate(
        self,
        label: impl Into<String>,
        f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check(Check::new(label, f))
    }

    /// Value equality against a constant. A list constant against a list
    /// value compares pairwise; against a scalar it is a membership test.
    #[must_use]
    pub fn matches(self, expected: impl Into<Value>) -> Self {
        let expected: Value = expected.into();
        let message = format!("expected {expected}");
        self.check(
            Check::new("match", move |value, _| match (&expected, value) {
                (Value::List(want), Value::List(have)) => want == have,
                (Value::List(want), scalar) => want.contains(scalar),
                (want, have) => want == have,
            })
            .message(message),
        )
    }

    /// Membership in a closed set of constants.
    #[must_use]
    pub fn one_of(self, allowed: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let allowed: Vec<Value> = allowed.into_iter().map(Into::into).collect();
        let message = format!(
            "expected one of [{}]",
            allowed
                .iter()
                .map(Value::lexical)
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.check(Check::new("enum", move |value, _| allowed.contains(value)).message(message))
    }

    // ------------------------------------------------------------------
    // pre/post hooks
    // ------------------------------------------------------------------

    #[must_use]
    pub fn hook(mut self, hook: Hook) -> Self {
        let (phase, rec) = hook.into_rec();
        match phase {
            HookPhase::Pre => self.pre.push(rec),
            HookPhase::Post => self.post.push(rec),
        }
        self
    }

    #[must_use]
    pub fn pre(
        self,
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.hook(Hook::pre(f))
    }

    #[must_use]
    pub fn post(
        self,
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.hook(Hook::post(f))
    }

    /// Move the cursor to an absolute offset before this field.
    #[must_use]
    pub fn at(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.hook(Hook::new(HookPhase::Pre, HookKind::Offset(source))),
            Err(err) => self.fail_expr(err),
        }
    }

    #[must_use]
    pub fn at_with(self, f: impl Fn(&Value) -> i64 + Send + Sync + 'static) -> Self {
        self.hook(Hook::new(
            HookPhase::Pre,
            HookKind::Offset(NumSource::Fn(Arc::new(f))),
        ))
    }

    /// Jump to an offset for this field only; the cursor is restored after.
    #[must_use]
    pub fn peek_at(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.hook(Hook::new(HookPhase::Pre, HookKind::Peek(Some(source)))),
            Err(err) => self.fail_expr(err),
        }
    }

    #[must_use]
    pub fn peek_with(self, f: impl Fn(&Value) -> i64 + Send + Sync + 'static) -> Self {
        self.hook(Hook::new(
            HookPhase::Pre,
            HookKind::Peek(Some(NumSource::Fn(Arc::new(f)))),
        ))
    }

    /// Read this field without consuming: the cursor returns to the
    /// pre-field offset afterwards.
    #[must_use]
    pub fn peek_here(self) -> Self {
        self.hook(Hook::new(HookPhase::Pre, HookKind::Peek(None)))
    }

    /// Pin the field's footprint to exactly `n` bytes.
    #[must_use]
    pub fn ensure_size(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.hook(Hook::new(HookPhase::Pre, HookKind::EnsureSize(source))),
            Err(err) => self.fail_expr(err),
        }
    }

    /// Round the field's footprint up to a multiple of `n` bytes.
    #[must_use]
    pub fn padding(self, n: impl IntoNumSource) -> Self {
        match n.into_source() {
            Ok(source) => self.hook(Hook::new(HookPhase::Pre, HookKind::Padding(source))),
            Err(err) => self.fail_expr(err),
        }
    }

    /// Switch endianness for this field; restored afterwards.
    #[must_use]
    pub fn endian(self, endian: Endian) -> Self {
        self.hook(Hook::new(
            HookPhase::Pre,
            HookKind::Endian(crate::schema::record::EndianSource::Fixed(endian)),
        ))
    }

    #[must_use]
    pub fn endian_with(self, f: impl Fn(&Value) -> Endian + Send + Sync + 'static) -> Self {
        self.hook(Hook::new(
            HookPhase::Pre,
            HookKind::Endian(crate::schema::record::EndianSource::Fn(Arc::new(f))),
        ))
    }

    /// After read, derive this property from the instance without consuming
    /// bytes.
    #[must_use]
    pub fn value_set(self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.hook(
            Hook::new(HookPhase::Post, HookKind::ValueSet(Arc::new(f))).reading(),
        )
    }

    // ------------------------------------------------------------------
    // context
    // ------------------------------------------------------------------

    /// Deliver the context value at `key` to this property before it is
    /// read or written. Missing key without a default is a runtime error.
    #[must_use]
    pub fn ctx_get(mut self, key: impl Into<String>) -> Self {
        self.context.push(ContextRec {
            id: RecordId::default(),
            op: ContextOp::Get {
                key: key.into(),
                default: None,
            },
        });
        self
    }

    #[must_use]
    pub fn ctx_get_or(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.context.push(ContextRec {
            id: RecordId::default(),
            op: ContextOp::Get {
                key: key.into(),
                default: Some(default.into()),
            },
        });
        self
    }

    /// After this property has a value, store it in the context at `key`.
    #[must_use]
    pub fn ctx_set(mut self, key: impl Into<String>) -> Self {
        self.context.push(ContextRec {
            id: RecordId::default(),
            op: ContextOp::Set { key: key.into() },
        });
        self
    }

    /// As `ctx_set`, but the slot accumulates a list.
    #[must_use]
    pub fn ctx_append(mut self, key: impl Into<String>) -> Self {
        self.context.push(ContextRec {
            id: RecordId::default(),
            op: ContextOp::Append { key: key.into() },
        });
        self
    }
}

/// Integral results stay integral; everything else becomes f64.
fn numeric_map(value: &Value, f: impl Fn(f64) -> f64) -> Result<Value, TransformError> {
    let input = value.as_f64().ok_or_else(|| {
        TransformError::new(format!("expected a number, found {}", value.kind()))
    })?;
    let output = f(input);

    if output.fract() == 0.0 && output.abs() < (1i64 << 53) as f64 {
        Ok(Value::I64(output as i64))
    } else {
        Ok(Value::F64(output))
    }
}

// ----------------------------------------------------------------------
// base-descriptor constructors
// ----------------------------------------------------------------------

#[must_use]
pub fn u8() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::U8))
}

#[must_use]
pub fn u16() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::U16))
}

#[must_use]
pub fn u32() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::U32))
}

#[must_use]
pub fn u64() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::U64))
}

#[must_use]
pub fn i8() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::I8))
}

#[must_use]
pub fn i16() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::I16))
}

#[must_use]
pub fn i32() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::I32))
}

#[must_use]
pub fn i64() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::I64))
}

#[must_use]
pub fn f32() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::F32))
}

#[must_use]
pub fn f64() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::F64))
}

/// A single unsigned byte read as an ASCII character.
#[must_use]
pub fn chr() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Primitive(PrimitiveTag::Char))
}

/// Characters whose controllers join into text (`ascii().count(4)` reads a
/// fixed 4-byte tag as a string).
#[must_use]
pub fn ascii() -> FieldBuilder {
    let mut builder = chr();
    builder.text_field = true;
    builder
}

/// Bytes decoded as UTF-8 text after the controller aggregates them.
#[must_use]
pub fn utf8() -> FieldBuilder {
    u8().transform(
        Transform::read(|value, _| text::utf8_decode(&value)).labelled("utf8"),
    )
    .transform(
        Transform::write(|value, _| text::utf8_encode(&value)).labelled("utf8"),
    )
}

/// Bytes decoded as UTF-16 text in the declared byte order.
#[must_use]
pub fn utf16(endian: Endian) -> FieldBuilder {
    u8().transform(
        Transform::read(move |value, _| text::utf16_decode(&value, endian)).labelled("utf16"),
    )
    .transform(
        Transform::write(move |value, _| text::utf16_encode(&value, endian)).labelled("utf16"),
    )
}

/// Bytes decoded as UTF-32 text in the declared byte order.
#[must_use]
pub fn utf32(endian: Endian) -> FieldBuilder {
    u8().transform(
        Transform::read(move |value, _| text::utf32_decode(&value, endian)).labelled("utf32"),
    )
    .transform(
        Transform::write(move |value, _| text::utf32_encode(&value, endian)).labelled("utf32"),
    )
}

/// Bytes up to and including a zero terminator; the terminator is stripped
/// from the value and appended back on write.
#[must_use]
pub fn null_terminated() -> FieldBuilder {
    u8().until(Value::U8(0))
        .transform(
            Transform::read(|value, _| match value {
                Value::List(mut items) => {
                    if items.last() == Some(&Value::U8(0)) {
                        items.pop();
                    }
                    Ok(Value::List(items))
                }
                other => Ok(other),
            })
            .labelled("strip-terminator"),
        )
        .transform(
            Transform::write(|value, _| match value {
                Value::List(mut items) => {
                    items.push(Value::U8(0));
                    Ok(Value::List(items))
                }
                other => Ok(other),
            })
            .labelled("append-terminator"),
        )
}

/// ASCII text up to and including a NUL terminator.
#[must_use]
pub fn null_terminated_string() -> FieldBuilder {
    let mut builder = chr();
    builder.text_field = true;
    builder
        .until(Value::Char('\0'))
        .transform(
            Transform::read(|value, _| match value {
                Value::Text(mut text) => {
                    if text.ends_with('\0') {
                        text.pop();
                    }
                    Ok(Value::Text(text))
                }
                other => Ok(other),
            })
            .labelled("strip-terminator"),
        )
        .transform(
            Transform::write(|value, _| match value {
                Value::Text(mut text) => {
                    text.push('\0');
                    Ok(Value::Text(text))
                }
                other => Ok(other),
            })
            .labelled("append-terminator"),
        )
}

/// A nested shape.
#[must_use]
pub fn nested(shape: &Arc<Shape>) -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Nested {
        shape: Arc::clone(shape),
        args: None,
    })
}

/// A nested shape constructed with a comma-separated argument path list,
/// resolved against the parent instance.
#[must_use]
pub fn nested_with(shape: &Arc<Shape>, args: &str) -> FieldBuilder {
    match ArgList::parse(args) {
        Ok(list) => FieldBuilder::with_base(BaseKind::Nested {
            shape: Arc::clone(shape),
            args: Some(ArgSource::Paths(list)),
        }),
        Err(err) => FieldBuilder::with_base(BaseKind::Nested {
            shape: Arc::clone(shape),
            args: None,
        })
        .fail_expr(err),
    }
}

/// A nested shape whose constructor arguments come from a closure over the
/// parent instance.
#[must_use]
pub fn nested_by(
    shape: &Arc<Shape>,
    f: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
) -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Nested {
        shape: Arc::clone(shape),
        args: Some(ArgSource::Fn(Arc::new(f))),
    })
}

/// No static descriptor; a condition or select must resolve it at parse
/// time.
#[must_use]
pub fn unknown() -> FieldBuilder {
    FieldBuilder::with_base(BaseKind::Unknown)
}

/// Read as `shape`, then keep only `property`; the write path wraps the
/// value back into a one-field instance.
#[must_use]
pub fn flatten(shape: &Arc<Shape>, property: &str) -> FieldBuilder {
    let shape_name = shape.name().to_string();
    let pick = property.to_string();
    let wrap = property.to_string();

    nested(shape)
        .transform(
            Transform::read(move |value, _| {
                value.field(&pick).cloned().ok_or_else(|| {
                    TransformError::new(format!("flattened property {pick:?} missing"))
                })
            })
            .labelled("flatten"),
        )
        .transform(
            Transform::write(move |value, _| {
                let mut wrapper = crate::value::StructValue::new(shape_name.clone());
                wrapper.set(wrap.clone(), value);
                Ok(Value::Struct(wrapper))
            })
            .labelled("flatten"),
        )
}

///
/// ShapeBuilder
///

pub struct ShapeBuilder {
    name: String,
    params: Vec<String>,
    endian: Option<Endian>,
    fields: Vec<(String, FieldBuilder)>,
    bits: Vec<(String, u32)>,
    class_pre: Vec<HookRec>,
    class_post: Vec<HookRec>,
}

impl Shape {
    /// Start describing a shape.
    #[must_use]
    pub fn describe(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            params: Vec::new(),
            endian: None,
            fields: Vec::new(),
            bits: Vec::new(),
            class_pre: Vec::new(),
            class_post: Vec::new(),
        }
    }
}

impl ShapeBuilder {
    /// Declare a constructor parameter; nested-descriptor arguments bind to
    /// parameters by position before the instance's fields are read.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    /// Fix the endianness for this shape's whole extent (not restored).
    #[must_use]
    pub const fn little_endian(mut self) -> Self {
        self.endian = Some(Endian::Little);
        self
    }

    #[must_use]
    pub const fn big_endian(mut self) -> Self {
        self.endian = Some(Endian::Big);
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, builder: FieldBuilder) -> Self {
        self.fields.push((name.into(), builder));
        self
    }

    /// Declare a bit-field member. Members concatenate top-to-bottom from
    /// the carrier's most significant bit; a shape has either bit-field
    /// members or regular fields, never both.
    #[must_use]
    pub fn bits(mut self, name: impl Into<String>, width: u32) -> Self {
        self.bits.push((name.into(), width));
        self
    }

    #[must_use]
    pub fn class_hook(mut self, hook: Hook) -> Self {
        let (phase, rec) = hook.into_rec();
        match phase {
            HookPhase::Pre => self.class_pre.push(rec),
            HookPhase::Post => self.class_post.push(rec),
        }
        self
    }

    #[must_use]
    pub fn pre(
        self,
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.class_hook(Hook::pre(f))
    }

    #[must_use]
    pub fn post(
        self,
        f: impl Fn(&mut Value, &mut Cursor) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.class_hook(Hook::post(f))
    }

    /// Inject the parent instance's fields into this shape's instance
    /// before its own fields are read.
    #[must_use]
    pub fn share_with_relation(self) -> Self {
        self.class_hook(Hook::new(HookPhase::Pre, HookKind::ShareWithRelation))
    }

    /// Validate the description and freeze it.
    pub fn finish(self) -> Result<Arc<Shape>, SchemaError> {
        let shape_name = self.name.clone();

        if !self.fields.is_empty() && !self.bits.is_empty() {
            return Err(SchemaError::WrongBitfieldClassImplementation {
                shape: shape_name.clone(),
                reason: "a shape cannot mix bit-field members and regular fields".to_string(),
            });
        }

        // duplicate property declarations
        for (index, (name, _)) in self.fields.iter().enumerate() {
            if self.fields[..index].iter().any(|(prior, _)| prior == name) {
                return Err(SchemaError::RelationAlreadyDefined {
                    shape: shape_name.clone(),
                    property: name.clone(),
                });
            }
        }

        let mut next_id = 0u32;
        let mut assign = move || {
            let id = RecordId(next_id);
            next_id += 1;
            id
        };

        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, mut builder) in self.fields {
            if let Some(err) = builder.expr_error.take() {
                return Err(SchemaError::Expr {
                    shape: shape_name.clone(),
                    source: err,
                });
            }
            if let Some(detail) = builder.misuse.take() {
                return Err(SchemaError::InvalidAnnotation {
                    shape: shape_name.clone(),
                    property: name,
                    detail,
                });
            }

            // a nested reference to the shape under construction can never
            // be satisfied; recursion goes through `select`
            let refers_to_self = |base: &BaseKind| {
                matches!(base, BaseKind::Nested { shape, .. } if shape.name() == shape_name)
            };
            if refers_to_self(&builder.base)
                || builder
                    .conditions
                    .iter()
                    .filter_map(|rec| rec.arm.as_ref())
                    .any(refers_to_self)
            {
                return Err(SchemaError::SelfReferringField {
                    shape: shape_name.clone(),
                    property: name,
                });
            }

            if !builder.is_resolvable_source() {
                return Err(SchemaError::UnknownPropertyType {
                    shape: shape_name.clone(),
                    property: name,
                });
            }

            let deferred = builder.base.is_unknown()
                && builder.conditions.is_empty()
                && builder.select.is_none();
            let needs_base = builder
                .controllers
                .iter()
                .map(|rec| rec.opts.primitive_check)
                .chain(builder.validators.iter().map(|rec| rec.primitive_check))
                .chain(
                    builder
                        .pre
                        .iter()
                        .chain(builder.post.iter())
                        .map(|rec| rec.primitive_check),
                )
                .any(|checked| checked);
            if deferred && needs_base {
                return Err(SchemaError::RelationNotDefined {
                    shape: shape_name.clone(),
                    property: name,
                });
            }

            let mut field = FieldDef::new(name, builder.base);
            field.select = builder.select;
            field.conditions = builder.conditions;
            field.controllers = builder.controllers;
            field.transformers = builder.transformers;
            field.validators = builder.validators;
            field.pre = builder.pre;
            field.post = builder.post;
            field.context = builder.context;

            for rec in &mut field.conditions {
                rec.id = assign();
            }
            for rec in &mut field.controllers {
                rec.id = assign();
            }
            for rec in &mut field.transformers {
                rec.id = assign();
            }
            for rec in &mut field.validators {
                rec.id = assign();
            }
            for rec in &mut field.pre {
                rec.id = assign();
            }
            for rec in &mut field.post {
                rec.id = assign();
            }
            for rec in &mut field.context {
                rec.id = assign();
            }

            fields.push(field);
        }

        let mut class_pre = self.class_pre;
        let mut class_post = self.class_post;
        for rec in class_pre.iter_mut().chain(class_post.iter_mut()) {
            rec.id = assign();
        }

        let mut bitfields = Vec::with_capacity(self.bits.len());
        let mut total_bits = 0u32;
        for (name, width) in self.bits {
            if width == 0 || width > 32 {
                return Err(SchemaError::WrongBitfieldClassImplementation {
                    shape: shape_name.clone(),
                    reason: format!("member {name} has unsupported width {width}"),
                });
            }
            total_bits += width;
            bitfields.push(BitfieldRec {
                id: assign(),
                name,
                bits: width,
            });
        }
        let carrier = if bitfields.is_empty() {
            None
        } else {
            Some(Shape::carrier_for(&shape_name, total_bits)?)
        };

        Ok(Arc::new(Shape::new(
            shape_name,
            self.params,
            fields,
            bitfields,
            carrier,
            class_pre,
            class_post,
            self.endian,
        )))
    }
}

impl FieldBuilder {
    /// Whether anything could ever give the property a value; mirrors
    /// `FieldDef::is_resolvable` for the builder representation.
    fn is_resolvable_source(&self) -> bool {
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

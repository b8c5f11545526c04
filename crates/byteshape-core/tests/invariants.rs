//! Cross-engine invariants: cursor discipline of the paired hooks,
//! controller composition, EOF absorption, endianness scoping, and the
//! traced phase order.

use byteshape_core::prelude::*;
use byteshape_core::{schema, trace::RecordingSink};

#[test]
fn peek_leaves_the_cursor_at_its_pre_field_offset() {
    let shape = Shape::describe("Probe")
        .field("ahead", schema::u32().peek_here())
        .field("first", schema::u8())
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0xDE, 0xAD, 0xBE, 0xEF]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");

    // the u32 was read, yet `first` still starts at offset 0
    assert_eq!(parsed.field("ahead"), Some(&Value::U32(0xDEAD_BEEF)));
    assert_eq!(parsed.field("first"), Some(&Value::U8(0xDE)));
    assert_eq!(cursor.offset(), 1);
}

#[test]
fn peek_at_jumps_and_restores() {
    let shape = Shape::describe("Probe")
        .field("tail", schema::u8().peek_at(3))
        .field("head", schema::u8())
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x01, 0x02, 0x03, 0x04]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");

    assert_eq!(parsed.field("tail"), Some(&Value::U8(0x04)));
    assert_eq!(parsed.field("head"), Some(&Value::U8(0x01)));
}

#[test]
fn ensure_size_pins_the_footprint_both_ways() {
    // inner read consumes 1 byte, footprint is pinned to 4
    let shape = Shape::describe("Padded")
        .field("tag", schema::u8().ensure_size(4))
        .field("after", schema::u8())
        .finish()
        .expect("shape should build");

    let bytes = [0x0A, 0x00, 0x00, 0x00, 0x0B];
    let mut cursor = Cursor::new(bytes.to_vec());
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(parsed.field("after"), Some(&Value::U8(0x0B)));
    assert_eq!(cursor.offset(), 5);

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, &shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), &bytes, "write must zero-fill the pinned gap");
}

#[test]
fn padding_rounds_the_footprint_up() {
    let shape = Shape::describe("Aligned")
        .field("name", schema::u8().count(3).padding(4))
        .field("after", schema::u8())
        .finish()
        .expect("shape should build");

    let bytes = [0x61, 0x62, 0x63, 0x00, 0x7F];
    let mut cursor = Cursor::new(bytes.to_vec());
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    // consumed 3, padded to 4
    assert_eq!(parsed.field("after"), Some(&Value::U8(0x7F)));

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, &shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), &bytes);
}

#[test]
fn padding_of_an_exact_multiple_adds_nothing() {
    let shape = Shape::describe("Aligned")
        .field("name", schema::u8().count(4).padding(4))
        .field("after", schema::u8())
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![1, 2, 3, 4, 5]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(parsed.field("after"), Some(&Value::U8(5)));
}

#[test]
fn dynamic_endian_is_restored_after_the_field() {
    let shape = Shape::describe("Mixed")
        .field("le", schema::u16().endian(Endian::Little))
        .field("be", schema::u16())
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x34, 0x12, 0x12, 0x34]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");

    assert_eq!(parsed.field("le"), Some(&Value::U16(0x1234)));
    assert_eq!(parsed.field("be"), Some(&Value::U16(0x1234)));
    assert_eq!(cursor.endian(), Endian::Big, "field scope must restore");
}

#[test]
fn class_endianness_is_permanent_for_the_scope() {
    let shape = Shape::describe("Little")
        .little_endian()
        .field("a", schema::u16())
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x34, 0x12]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");

    assert_eq!(parsed.field("a"), Some(&Value::U16(0x1234)));
    assert_eq!(
        cursor.endian(),
        Endian::Little,
        "class endianness is not restored"
    );
}

#[test]
fn chained_counts_build_a_rectangle() {
    // first-attached count is innermost: 2 rows of 3
    let chained = Shape::describe("Chained")
        .field("grid", schema::u8().count(3).count(2))
        .finish()
        .expect("chained should build");

    let matrix = Shape::describe("Matrixed")
        .field("grid", schema::u8().matrix(3, 2))
        .finish()
        .expect("matrixed should build");

    let bytes = [1, 2, 3, 4, 5, 6];

    let mut cursor = Cursor::new(bytes.to_vec());
    let from_chain = read(&mut cursor, &chained).expect("chained read");

    let mut cursor = Cursor::new(bytes.to_vec());
    let from_matrix = read(&mut cursor, &matrix).expect("matrix read");

    let expected = Value::List(vec![
        Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(3)]),
        Value::List(vec![Value::U8(4), Value::U8(5), Value::U8(6)]),
    ]);
    assert_eq!(from_chain.field("grid"), Some(&expected));
    assert_eq!(
        from_chain.field("grid"),
        from_matrix.field("grid"),
        "count∘count and matrix must be observationally equal"
    );
}

#[test]
fn matrix_rows_align_independently() {
    let shape = Shape::describe("Bitmap")
        .field("rows", schema::u8().matrix(3, 2).aligned(4))
        .finish()
        .expect("shape should build");

    // each 3-byte row padded to 4
    let bytes = [1, 2, 3, 0, 4, 5, 6, 0];
    let mut cursor = Cursor::new(bytes.to_vec());
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(cursor.offset(), 8);

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, &shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), &bytes);
}

#[test]
fn until_keeps_its_sentinel_unless_peeked() {
    let keeping = Shape::describe("Keep")
        .field("data", schema::u8().until(Value::U8(0xFF)))
        .finish()
        .expect("keep should build");

    let mut cursor = Cursor::new(vec![1, 2, 0xFF, 9]);
    let parsed = read(&mut cursor, &keeping).expect("read should succeed");
    assert_eq!(
        parsed.field("data"),
        Some(&Value::List(vec![
            Value::U8(1),
            Value::U8(2),
            Value::U8(0xFF)
        ]))
    );
    assert_eq!(cursor.offset(), 3);

    let peeking = Shape::describe("Peek")
        .field("data", schema::u8().until(Value::U8(0xFF)).peeked())
        .field("sentinel", schema::u8())
        .finish()
        .expect("peek should build");

    let mut cursor = Cursor::new(vec![1, 2, 0xFF, 9]);
    let parsed = read(&mut cursor, &peeking).expect("read should succeed");
    assert_eq!(
        parsed.field("data"),
        Some(&Value::List(vec![Value::U8(1), Value::U8(2)]))
    );
    assert_eq!(parsed.field("sentinel"), Some(&Value::U8(0xFF)));
}

#[test]
fn while_predicate_runs_after_the_first_read() {
    let shape = Shape::describe("Never")
        .field("data", schema::u8().read_while(|_| false))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![42, 43]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(
        parsed.field("data"),
        Some(&Value::List(vec![Value::U8(42)])),
        "exactly one item: the predicate never runs before the first read"
    );
}

#[test]
fn while_observes_count_and_offsets() {
    let shape = Shape::describe("Three")
        .field("data", schema::u8().read_while(|probe| probe.count < 3))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![1, 2, 3, 4]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(
        parsed.field("data"),
        Some(&Value::List(vec![
            Value::U8(1),
            Value::U8(2),
            Value::U8(3)
        ]))
    );
    assert_eq!(cursor.offset(), 3);
}

#[test]
fn until_eof_absorbs_end_of_input() {
    let shape = Shape::describe("Rest")
        .field("head", schema::u8())
        .field("tail", schema::u16().until_eof())
        .finish()
        .expect("shape should build");

    // 5 bytes: one u8, two u16, then a dangling byte the u16 read dies on
    let mut cursor = Cursor::new(vec![9, 0, 1, 0, 2, 3]);
    let parsed = read(&mut cursor, &shape).expect("eof must be absorbed");
    assert_eq!(
        parsed.field("tail"),
        Some(&Value::List(vec![Value::U16(1), Value::U16(2)]))
    );
}

#[test]
fn eof_outside_an_absorbing_controller_propagates() {
    let shape = Shape::describe("Strict")
        .field("data", schema::u16().count(3))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0, 1, 0, 2]);
    let err = read(&mut cursor, &shape).expect_err("input is two items short");
    match err {
        ReadError::EndOfInput { partial, .. } => {
            let partial = partial.expect("partial instance is attached");
            assert_eq!(
                partial.field("data"),
                Some(&Value::List(vec![Value::U16(1), Value::U16(2)]))
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn value_set_derives_without_consuming() {
    let shape = Shape::describe("Derived")
        .field("a", schema::u8())
        .field("b", schema::u8())
        .field(
            "sum",
            unknown().value_set(|instance| {
                let a = instance.field("a").and_then(Value::as_i64).unwrap_or_default();
                let b = instance.field("b").and_then(Value::as_i64).unwrap_or_default();
                Value::I64(a + b)
            }),
        )
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![2, 3]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(parsed.field("sum"), Some(&Value::I64(5)));
    assert_eq!(cursor.offset(), 2);
}

#[test]
fn once_hooks_fire_once_per_parse() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static FIRED: AtomicUsize = AtomicUsize::new(0);

    let item = Shape::describe("Item")
        .class_hook(
            Hook::pre(|_, _| {
                FIRED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .once(),
        )
        .field("v", schema::u8())
        .finish()
        .expect("item should build");

    let shape = Shape::describe("List")
        .field("items", nested(&item).count(3))
        .finish()
        .expect("list should build");

    let mut cursor = Cursor::new(vec![1, 2, 3]);
    read(&mut cursor, &shape).expect("first parse");
    assert_eq!(FIRED.load(Ordering::SeqCst), 1, "three nested reads, one firing");

    // the shape is untouched: a fresh parse fires again
    let mut cursor = Cursor::new(vec![1, 2, 3]);
    read(&mut cursor, &shape).expect("second parse");
    assert_eq!(FIRED.load(Ordering::SeqCst), 2);
}

#[test]
fn offset_hook_moves_before_the_field() {
    let shape = Shape::describe("Sparse")
        .field("late", schema::u8().at(3))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0, 0, 0, 0x2A]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(parsed.field("late"), Some(&Value::U8(0x2A)));
}

#[test]
fn trace_events_follow_the_phase_order() {
    let shape = Shape::describe("Pair")
        .field("x", schema::u8())
        .field("y", schema::u8())
        .finish()
        .expect("shape should build");

    let sink = RecordingSink::new();
    let mut ctx = Context::new();
    let mut cursor = Cursor::new(vec![1, 2]);
    read_with(&mut cursor, &shape, &mut ctx, Some(&sink)).expect("read should succeed");

    assert_eq!(
        sink.lines(),
        vec![
            "enter Pair @0",
            "field x @0",
            "commit x @1",
            "field y @1",
            "commit y @2",
            "exit Pair @2",
        ]
    );
}

#[test]
fn size_controller_counts_bytes_not_items() {
    let shape = Shape::describe("Block")
        .field("data", schema::u16().size(6))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0, 1, 0, 2, 0, 3, 9]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(
        parsed.field("data"),
        Some(&Value::List(vec![
            Value::U16(1),
            Value::U16(2),
            Value::U16(3)
        ]))
    );
    assert_eq!(cursor.offset(), 6);
}

#[test]
fn context_get_missing_key_raises_and_default_saves() {
    let strict = Shape::describe("Strict")
        .field("n", unknown().ctx_get("missing"))
        .finish()
        .expect("strict should build");

    let mut cursor = Cursor::new(Vec::new());
    let err = read(&mut cursor, &strict).expect_err("key is missing");
    assert!(matches!(err, ReadError::ContextMissing { key, .. } if key == "missing"));

    let defaulted = Shape::describe("Defaulted")
        .field("n", unknown().ctx_get_or("missing", Value::U8(7)))
        .finish()
        .expect("defaulted should build");

    let mut cursor = Cursor::new(Vec::new());
    let parsed = read(&mut cursor, &defaulted).expect("default applies");
    assert_eq!(parsed.field("n"), Some(&Value::U8(7)));
}

#[test]
fn ctx_append_accumulates_across_fields() {
    let shape = Shape::describe("Samples")
        .field("a", schema::u8().ctx_append("seen"))
        .field("b", schema::u8().ctx_append("seen"))
        .finish()
        .expect("shape should build");

    let mut ctx = Context::new();
    let mut cursor = Cursor::new(vec![1, 2]);
    read_with(&mut cursor, &shape, &mut ctx, None).expect("read should succeed");

    assert_eq!(
        ctx.get("seen"),
        Some(&Value::List(vec![Value::U8(1), Value::U8(2)]))
    );
}

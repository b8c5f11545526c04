//! End-to-end scenarios: each describes a small format, parses a literal
//! byte sequence, checks the object graph, and writes it back.

use byteshape_core::prelude::*;
use byteshape_core::schema;

fn round_trip(shape: &std::sync::Arc<Shape>, bytes: &[u8]) -> Value {
    let mut cursor = Cursor::new(bytes.to_vec());
    let parsed = read(&mut cursor, shape).expect("read should succeed");
    assert_eq!(cursor.offset(), bytes.len(), "input must be fully consumed");

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), bytes, "write-back must equal the input");

    parsed
}

#[test]
fn two_u8_fields() {
    let shape = Shape::describe("Pair")
        .field("x", schema::u8())
        .field("y", schema::u8())
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x09, 0x20]);
    assert_eq!(parsed.field("x"), Some(&Value::U8(9)));
    assert_eq!(parsed.field("y"), Some(&Value::U8(32)));
}

#[test]
fn nested_coords() {
    let coord = Shape::describe("Coord")
        .field("x", schema::u8())
        .field("y", schema::u8())
        .finish()
        .expect("coord should build");

    let shape = Shape::describe("Segment")
        .field("fst", nested(&coord))
        .field("snd", nested(&coord))
        .finish()
        .expect("segment should build");

    let parsed = round_trip(&shape, &[0x01, 0x02, 0x03, 0x04]);

    let fst = parsed.field("fst").expect("fst present");
    let snd = parsed.field("snd").expect("snd present");
    assert_eq!(fst.field("x"), Some(&Value::U8(1)));
    assert_eq!(fst.field("y"), Some(&Value::U8(2)));
    assert_eq!(snd.field("x"), Some(&Value::U8(3)));
    assert_eq!(snd.field("y"), Some(&Value::U8(4)));
}

#[test]
fn count_by_reference() {
    let shape = Shape::describe("Buf")
        .field("size", schema::u8())
        .field("buf", schema::u8().count("size"))
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x02, 0x01, 0x02]);
    assert_eq!(parsed.field("size"), Some(&Value::U8(2)));
    assert_eq!(
        parsed.field("buf"),
        Some(&Value::List(vec![Value::U8(1), Value::U8(2)]))
    );
}

#[test]
fn count_of_zero_produces_an_empty_sequence() {
    let shape = Shape::describe("Buf")
        .field("size", schema::u8())
        .field("buf", schema::u8().count("size"))
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x00]);
    assert_eq!(parsed.field("buf"), Some(&Value::List(Vec::new())));
}

#[test]
fn bitfield_class() {
    let shape = Shape::describe("Flags")
        .bits("field1", 1)
        .bits("field2", 3)
        .bits("field3", 4)
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x11]);
    assert_eq!(parsed.field("field1"), Some(&Value::U8(0)));
    assert_eq!(parsed.field("field2"), Some(&Value::U8(1)));
    assert_eq!(parsed.field("field3"), Some(&Value::U8(1)));
}

#[test]
fn choice_picks_by_lexical_key() {
    let shape = Shape::describe("Packet")
        .field("type", schema::u8())
        .field(
            "payload",
            unknown().choice(
                "type",
                [
                    (1i64, Arm::from(schema::u8())),
                    (2, Arm::from(schema::u16())),
                    (3, Arm::absent()),
                ],
            ),
        )
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x02, 0x00, 0x03]);
    assert_eq!(parsed.field("type"), Some(&Value::U8(2)));
    assert_eq!(parsed.field("payload"), Some(&Value::U16(3)));

    // the absent arm leaves the property unset and consumes nothing
    let parsed = round_trip(&shape, &[0x03]);
    assert_eq!(parsed.field("type"), Some(&Value::U8(3)));
    assert_eq!(parsed.field("payload"), None);
}

#[test]
fn unmatched_choice_raises() {
    let shape = Shape::describe("Packet")
        .field("type", schema::u8())
        .field(
            "payload",
            unknown().choice("type", [(1i64, Arm::from(schema::u8()))]),
        )
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x09, 0xAA]);
    let err = read(&mut cursor, &shape).expect_err("no arm matches type 9");
    assert!(matches!(
        err,
        ReadError::NoConditionMatched { property, .. } if property == "payload"
    ));
}

#[test]
fn utf8_until_eof() {
    let text = "This is a sample paragraph.";

    let shape = Shape::describe("Doc")
        .field("body", utf8().until_eof())
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, text.as_bytes());
    assert_eq!(parsed.field("body"), Some(&Value::Text(text.to_string())));
}

#[test]
fn ascii_tag_reads_as_text() {
    let shape = Shape::describe("Riff")
        .field("tag", ascii().count(4))
        .field("len", schema::u32())
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, b"WAVE\x00\x00\x00\x10");
    assert_eq!(parsed.field("tag"), Some(&Value::Text("WAVE".to_string())));
    assert_eq!(parsed.field("len"), Some(&Value::U32(16)));
}

#[test]
fn null_terminated_string_round_trips_its_terminator() {
    let shape = Shape::describe("Entry")
        .field("name", null_terminated_string())
        .field("age", schema::u8())
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, b"ada\x00\x24");
    assert_eq!(parsed.field("name"), Some(&Value::Text("ada".to_string())));
    assert_eq!(parsed.field("age"), Some(&Value::U8(0x24)));
}

#[test]
fn if_then_else_selects_topmost_match() {
    let wide = Shape::describe("Message")
        .field("version", schema::u8())
        .field(
            "id",
            unknown()
                .if_then(|v| v.field("version") == Some(&Value::U8(2)), schema::u32())
                .if_then(|v| v.field("version") == Some(&Value::U8(1)), schema::u16())
                .or_else(schema::u8()),
        )
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&wide, &[0x02, 0x00, 0x00, 0x00, 0x07]);
    assert_eq!(parsed.field("id"), Some(&Value::U32(7)));

    let parsed = round_trip(&wide, &[0x01, 0x00, 0x07]);
    assert_eq!(parsed.field("id"), Some(&Value::U16(7)));

    let parsed = round_trip(&wide, &[0x00, 0x07]);
    assert_eq!(parsed.field("id"), Some(&Value::U8(7)));
}

#[test]
fn select_resolves_recursion_lazily() {
    use std::sync::{Arc, OnceLock};

    // a cons list: 1 byte value, 1 byte has-next flag, then the next node
    static NODE: OnceLock<Arc<Shape>> = OnceLock::new();

    let node = Shape::describe("Node")
        .field("value", schema::u8())
        .field("has_next", schema::u8())
        .field(
            "next",
            unknown().select(|instance| {
                if instance.field("has_next") == Some(&Value::U8(1)) {
                    NODE.get().cloned()
                } else {
                    None
                }
            }),
        )
        .finish()
        .expect("node should build");
    NODE.set(Arc::clone(&node)).expect("node registered once");

    let parsed = round_trip(&node, &[0x0A, 0x01, 0x0B, 0x01, 0x0C, 0x00]);
    let second = parsed.field("next").expect("second node");
    let third = second.field("next").expect("third node");
    assert_eq!(third.field("value"), Some(&Value::U8(0x0C)));
    assert_eq!(third.field("next"), None);
}

#[test]
fn nested_args_bind_to_declared_params() {
    let row = Shape::describe("Row")
        .param("width")
        .field("cells", schema::u8().count("width"))
        .finish()
        .expect("row should build");

    let shape = Shape::describe("Grid")
        .field("width", schema::u8())
        .field("row", nested_with(&row, "width"))
        .finish()
        .expect("grid should build");

    let parsed = round_trip(&shape, &[0x03, 0x07, 0x08, 0x09]);
    let row_value = parsed.field("row").expect("row present");
    assert_eq!(
        row_value.field("cells"),
        Some(&Value::List(vec![
            Value::U8(7),
            Value::U8(8),
            Value::U8(9)
        ]))
    );
}

#[test]
fn context_carries_values_across_unrelated_scopes() {
    let body = Shape::describe("Body")
        .field("size", unknown().ctx_get("header.size"))
        .field("data", schema::u8().count("size").unchecked())
        .finish()
        .expect("body should build");

    let shape = Shape::describe("File")
        .field("size", schema::u8().ctx_set("header.size"))
        .field("body", nested(&body))
        .finish()
        .expect("file should build");

    let parsed = round_trip(&shape, &[0x02, 0xAA, 0xBB]);
    let data = parsed
        .field("body")
        .and_then(|body| body.field("data"))
        .expect("data present");
    assert_eq!(data, &Value::List(vec![Value::U8(0xAA), Value::U8(0xBB)]));
}

#[test]
fn share_with_relation_injects_parent_fields() {
    let inner = Shape::describe("Inner")
        .share_with_relation()
        .field("data", schema::u8().count("width"))
        .finish()
        .expect("inner should build");

    let shape = Shape::describe("Outer")
        .field("width", schema::u8())
        .field("inner", nested(&inner))
        .finish()
        .expect("outer should build");

    let mut cursor = Cursor::new(vec![0x02, 0x05, 0x06]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    let data = parsed
        .field("inner")
        .and_then(|inner| inner.field("data"))
        .expect("data present");
    assert_eq!(data, &Value::List(vec![Value::U8(5), Value::U8(6)]));
}

#[test]
fn map_to_drives_table_decoding() {
    // widths of each column come from the instance itself
    let shape = Shape::describe("Table")
        .field("first", schema::u8())
        .field(
            "entries",
            schema::u8().map_to(|instance| {
                let n = instance
                    .field("first")
                    .and_then(Value::as_i64)
                    .unwrap_or_default();
                (0..n).map(Value::I64).collect()
            }),
        )
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x03, 0x0A, 0x0B, 0x0C]);
    assert_eq!(
        parsed.field("entries"),
        Some(&Value::List(vec![
            Value::U8(0x0A),
            Value::U8(0x0B),
            Value::U8(0x0C)
        ]))
    );
}

#[test]
fn scaled_values_round_trip() {
    let shape = Shape::describe("Reading")
        .field("centivolts", schema::u8().scaled(0.5))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x08]);
    let parsed = read(&mut cursor, &shape).expect("read should succeed");
    assert_eq!(parsed.field("centivolts"), Some(&Value::I64(4)));

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, &shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), &[0x08]);
}

#[test]
fn validation_failure_reports_property_and_offset() {
    let shape = Shape::describe("Bmp")
        .field("magic", schema::u16().matches(Value::U16(0x424D)))
        .finish()
        .expect("shape should build");

    let mut cursor = Cursor::new(vec![0x00, 0x00]);
    let err = read(&mut cursor, &shape).expect_err("magic must not match");
    match err {
        ReadError::ValidationFailed {
            validator,
            property,
            offset,
            ..
        } => {
            assert_eq!(validator, "match");
            assert_eq!(property, "magic");
            assert_eq!(offset, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn optional_validators_never_raise() {
    let shape = Shape::describe("Loose")
        .field(
            "tag",
            schema::u8().check(
                Check::new("never", |_, _| false)
                    .optional()
                    .message("always fails"),
            ),
        )
        .finish()
        .expect("shape should build");

    let parsed = round_trip(&shape, &[0x7F]);
    assert_eq!(parsed.field("tag"), Some(&Value::U8(0x7F)));
}

//! Round-trip properties: for any byte sequence a format fully covers,
//! `write(read(bytes)) == bytes`.

use byteshape_core::prelude::*;
use byteshape_core::schema;
use proptest::prelude::*;
use std::sync::Arc;

fn length_prefixed() -> Arc<Shape> {
    Shape::describe("Buf")
        .field("size", schema::u8())
        .field("data", schema::u8().count("size"))
        .finish()
        .expect("shape should build")
}

fn assert_round_trip(shape: &Arc<Shape>, bytes: &[u8]) {
    let mut cursor = Cursor::new(bytes.to_vec());
    let parsed = read(&mut cursor, shape).expect("read should succeed");

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, shape, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), bytes);
}

proptest! {
    #[test]
    fn length_prefixed_buffers_round_trip(data in prop::collection::vec(any::<u8>(), 0..=200)) {
        let shape = length_prefixed();
        let mut bytes = vec![data.len() as u8];
        bytes.extend(&data);

        assert_round_trip(&shape, &bytes);
    }

    #[test]
    fn full_width_bitfields_are_inverses(byte in any::<u8>()) {
        let shape = Shape::describe("Flags")
            .bits("a", 1)
            .bits("b", 3)
            .bits("c", 4)
            .finish()
            .expect("shape should build");

        assert_round_trip(&shape, &[byte]);
    }

    #[test]
    fn sixteen_bit_bitfields_are_inverses(raw in any::<u16>()) {
        let shape = Shape::describe("Packed")
            .bits("kind", 4)
            .bits("index", 8)
            .bits("flags", 4)
            .finish()
            .expect("shape should build");

        assert_round_trip(&shape, &raw.to_be_bytes());
    }

    #[test]
    fn multibyte_primitives_round_trip_under_both_endians(
        a in any::<u32>(),
        b in any::<i16>(),
        c in any::<f64>(),
        little in any::<bool>(),
    ) {
        let shape = Shape::describe("Record")
            .field("a", schema::u32())
            .field("b", schema::i16())
            .field("c", schema::f64())
            .finish()
            .expect("shape should build");

        let endian = if little { Endian::Little } else { Endian::Big };
        let mut writer = Cursor::with_endian(Vec::new(), endian);
        let mut instance = StructValue::new("Record");
        instance.set("a", Value::U32(a));
        instance.set("b", Value::I16(b));
        instance.set("c", Value::F64(c));
        write(&mut writer, &shape, &Value::Struct(instance.clone()))
            .expect("write should succeed");

        let mut reader = Cursor::with_endian(writer.into_bytes(), endian);
        let parsed = read(&mut reader, &shape).expect("read should succeed");
        // NaN never equals itself; compare through the wire bits instead
        if c.is_nan() {
            assert!(matches!(parsed.field("c"), Some(Value::F64(v)) if v.is_nan()));
        } else {
            assert_eq!(parsed, Value::Struct(instance));
        }
    }

    #[test]
    fn null_terminated_strings_round_trip(text in "[a-zA-Z0-9 .!?]{0,48}") {
        let shape = Shape::describe("Entry")
            .field("name", null_terminated_string())
            .finish()
            .expect("shape should build");

        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);

        assert_round_trip(&shape, &bytes);
    }

    #[test]
    fn utf8_until_eof_round_trips(text in "\\PC{0,64}") {
        let shape = Shape::describe("Doc")
            .field("body", utf8().until_eof())
            .finish()
            .expect("shape should build");

        assert_round_trip(&shape, text.as_bytes());
    }
}

#[test]
fn a_composite_image_format_round_trips() {
    // a bitmap-flavoured format exercising most engines at once:
    // magic validation, little-endian scope, dimensions, a palette sized by
    // a prior field, and row-padded pixel data addressed via an offset.
    let rgb = Shape::describe("Rgb")
        .field("r", schema::u8())
        .field("g", schema::u8())
        .field("b", schema::u8())
        .finish()
        .expect("rgb should build");

    let image = Shape::describe("Image")
        .little_endian()
        .field("magic", ascii().count(2).matches(Value::Text("BS".to_string())))
        .field("width", schema::u16())
        .field("height", schema::u16())
        .field("palette_len", schema::u8())
        .field("palette", nested(&rgb).count("palette_len"))
        .field("pixels", schema::u8().matrix("width", "height").aligned(4))
        .finish()
        .expect("image should build");

    #[rustfmt::skip]
    let bytes = vec![
        b'B', b'S',
        0x03, 0x00,             // width = 3
        0x02, 0x00,             // height = 2
        0x02,                   // two palette entries
        0x10, 0x20, 0x30,
        0x40, 0x50, 0x60,
        0x01, 0x00, 0x01, 0x00, // row 0 + pad
        0x00, 0x01, 0x00, 0x00, // row 1 + pad
    ];

    let mut cursor = Cursor::new(bytes.clone());
    let parsed = read(&mut cursor, &image).expect("read should succeed");
    assert_eq!(cursor.offset(), bytes.len());

    assert_eq!(parsed.field("width"), Some(&Value::U16(3)));
    let palette = parsed.field("palette").and_then(Value::as_list).expect("palette");
    assert_eq!(palette.len(), 2);
    assert_eq!(palette[1].field("g"), Some(&Value::U8(0x50)));

    let pixels = parsed.field("pixels").and_then(Value::as_list).expect("pixels");
    assert_eq!(
        pixels[0],
        Value::List(vec![Value::U8(1), Value::U8(0), Value::U8(1)])
    );

    let mut writer = Cursor::writer(Endian::Big);
    write(&mut writer, &image, &parsed).expect("write should succeed");
    assert_eq!(writer.bytes(), &bytes);
}

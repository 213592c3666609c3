use quickcheck::{quickcheck, TestResult};

use capnp_layout::message::{self, ReaderOptions};
use capnp_layout::serialize;
use capnp_layout::{ElementSize, StructSize};

fn reparse<F>(message: &message::Builder, check: F)
where
    F: FnOnce(capnp_layout::StructReader<'_>),
{
    let bytes = message.to_bytes();
    let reader = serialize::read_message_from_bytes(&bytes, ReaderOptions::new());
    check(reader.get_root().unwrap());
}

#[test]
fn integers_round_trip() {
    fn prop(a: i8, b: i16, c: i32, d: i64, e: u8, f: u16, g: u32, h: u64) -> bool {
        let message = message::Builder::new_default();
        let mut root = message.init_root(StructSize::new(4, 0)).unwrap();
        root.set_i8(0, a).unwrap();
        root.set_u8(1, e).unwrap();
        root.set_i16(2, b).unwrap();
        root.set_u16(4, f).unwrap();
        root.set_i32(8, c).unwrap();
        root.set_u32(12, g).unwrap();
        root.set_i64(16, d).unwrap();
        root.set_u64(24, h).unwrap();

        let mut ok = false;
        reparse(&message, |root| {
            ok = root.get_i8(0).unwrap() == a
                && root.get_u8(1).unwrap() == e
                && root.get_i16(2).unwrap() == b
                && root.get_u16(4).unwrap() == f
                && root.get_i32(8).unwrap() == c
                && root.get_u32(12).unwrap() == g
                && root.get_i64(16).unwrap() == d
                && root.get_u64(24).unwrap() == h;
        });
        ok
    }
    quickcheck(prop as fn(i8, i16, i32, i64, u8, u16, u32, u64) -> bool);
}

#[test]
fn floats_round_trip_bit_exact() {
    fn prop(a: u32, b: u64) -> bool {
        let (a, b) = (f32::from_bits(a), f64::from_bits(b));
        let message = message::Builder::new_default();
        let mut root = message.init_root(StructSize::new(2, 0)).unwrap();
        root.set_f32(0, a).unwrap();
        root.set_f64(8, b).unwrap();

        let mut ok = false;
        reparse(&message, |root| {
            ok = root.get_f32(0).unwrap().to_bits() == a.to_bits()
                && root.get_f64(8).unwrap().to_bits() == b.to_bits();
        });
        ok
    }
    quickcheck(prop as fn(u32, u64) -> bool);

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, f64::MIN, f64::MAX] {
        assert!(prop(0, value.to_bits()));
    }
    assert!(prop(f32::NAN.to_bits(), 0));
    assert!(prop((-0.0f32).to_bits(), 0));
}

#[test]
fn integer_extremes_round_trip() {
    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(4, 0)).unwrap();
    root.set_i64(0, i64::MIN).unwrap();
    root.set_i64(8, i64::MAX).unwrap();
    root.set_u64(16, u64::MAX).unwrap();
    root.set_i32(24, i32::MIN).unwrap();

    reparse(&message, |root| {
        assert_eq!(root.get_i64(0).unwrap(), i64::MIN);
        assert_eq!(root.get_i64(8).unwrap(), i64::MAX);
        assert_eq!(root.get_u64(16).unwrap(), u64::MAX);
        assert_eq!(root.get_i32(24).unwrap(), i32::MIN);
    });
}

#[test]
fn text_round_trip() {
    fn prop(s: String) -> TestResult {
        if s.contains('\0') {
            return TestResult::discard();
        }
        let message = message::Builder::new_default();
        let mut root = message.init_root(StructSize::new(0, 1)).unwrap();
        root.set_text(0, &s).unwrap();
        if root.get_text(0).unwrap() != s {
            return TestResult::failed();
        }

        let mut ok = false;
        reparse(&message, |root| ok = root.get_text(0).unwrap() == s);
        TestResult::from_bool(ok)
    }
    quickcheck(prop as fn(String) -> TestResult);

    for s in ["", "a", "1234567", "12345678", "Grüße, 世界 🦀"] {
        assert!(!prop(s.to_string()).is_failure());
    }
}

#[test]
fn data_round_trip() {
    fn prop(bytes: Vec<u8>) -> bool {
        let message = message::Builder::new_default();
        let mut root = message.init_root(StructSize::new(0, 1)).unwrap();
        root.set_data(0, &bytes).unwrap();
        if root.get_data(0).unwrap() != bytes {
            return false;
        }

        let mut ok = false;
        reparse(&message, |root| ok = root.get_data(0).unwrap() == &bytes[..]);
        ok
    }
    quickcheck(prop as fn(Vec<u8>) -> bool);

    assert!(prop(vec![]));
    assert!(prop(vec![0; 17]));
    assert!(prop(vec![0xff; 64]));
}

#[test]
fn to_bytes_is_idempotent() {
    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(1, 2)).unwrap();
    root.set_u32(0, 7).unwrap();
    root.set_text(0, "seven").unwrap();
    root.init_list(1, ElementSize::TwoBytes, 3).unwrap();

    let first = message.to_bytes();
    let second = message.to_bytes();
    assert_eq!(first, second);
    assert_eq!(
        first.len(),
        serialize::compute_serialized_size_in_words(&message) * 8
    );

    let mut written = Vec::new();
    serialize::write_message(&mut written, &message).unwrap();
    assert_eq!(written, first);
}

#[test]
fn bools_do_not_interfere() {
    const BITS: [usize; 10] = [0, 1, 7, 8, 15, 16, 31, 63, 127, 255];

    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(4, 0)).unwrap();
    for bit in BITS {
        root.set_bool(bit, true).unwrap();
    }
    // Clearing a neighbour leaves the bit alone.
    root.set_bool(2, false).unwrap();
    root.set_bool(254, false).unwrap();

    reparse(&message, |root| {
        for bit in 0..256 {
            assert_eq!(root.get_bool(bit).unwrap(), BITS.contains(&bit), "bit {bit}");
        }
        assert!(root.get_bool(256).is_err());
    });
}

#[test]
fn struct_list_elements_do_not_alias() {
    let message = message::Builder::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let list = root.init_struct_list(0, 4, StructSize::new(2, 1)).unwrap();
    for i in 0..4 {
        let mut element = list.get_struct_element(i).unwrap();
        element.set_u64(0, u64::from(i) * 1000).unwrap();
        element.set_u32(8, i).unwrap();
        element.set_text(0, &format!("element {i}")).unwrap();
    }
    // Mutate one element after the others are written.
    list.get_struct_element(2).unwrap().set_u64(0, 1).unwrap();

    reparse(&message, |root| {
        let list = root
            .get_list(0, ElementSize::InlineComposite)
            .unwrap()
            .unwrap();
        assert_eq!(list.len(), 4);
        for i in 0..4 {
            let element = list.get_struct_element(i).unwrap();
            let expected = if i == 2 { 1 } else { u64::from(i) * 1000 };
            assert_eq!(element.get_u64(0).unwrap(), expected);
            assert_eq!(element.get_u32(8).unwrap(), i);
            assert_eq!(element.get_text(0).unwrap(), format!("element {i}"));
        }
    });
}

#[test]
fn null_pointers_read_as_absent() {
    let message = message::Builder::new_default();
    message.init_root(StructSize::new(0, 3)).unwrap();

    reparse(&message, |root| {
        assert!(root.get_struct(0).unwrap().is_none());
        assert_eq!(root.get_text(1).unwrap(), "");
        assert!(root.get_list(2, ElementSize::Byte).unwrap().is_none());
        assert!(root.get_data(2).unwrap().is_empty());
        assert!(root.get_pointer_field(0).unwrap().is_null().unwrap());
        assert!(root.get_pointer_field(3).is_err());
    });
}

#[test]
fn wrong_pointer_kind_reads_as_null() {
    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(0, 2)).unwrap();
    root.set_text(0, "not a struct").unwrap();
    root.init_struct(1, StructSize::new(1, 0)).unwrap();

    reparse(&message, |root| {
        assert!(root.get_struct(0).unwrap().is_none());
        assert_eq!(root.get_text(1).unwrap(), "");
        assert!(root.get_list(1, ElementSize::Byte).unwrap().is_none());
    });

    let bytes = message.to_bytes();
    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let reader = serialize::read_message_from_bytes(&bytes, options);
    let root = reader.get_root().unwrap();
    assert!(root.get_struct(0).is_err());
    assert!(root.get_text(1).is_err());
}

#[test]
fn invalid_utf8_text_reads_as_empty() {
    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(0, 1)).unwrap();
    root.set_data(0, &[0xff, 0xfe, 0]).unwrap();

    reparse(&message, |root| {
        assert_eq!(root.get_text(0).unwrap(), "");
        assert_eq!(root.get_data(0).unwrap(), &[0xff, 0xfe, 0]);
    });

    let bytes = message.to_bytes();
    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let reader = serialize::read_message_from_bytes(&bytes, options);
    let root = reader.get_root().unwrap();
    assert_eq!(
        root.get_text(0).unwrap_err().kind,
        capnp_layout::ErrorKind::TextContainsNonUtf8Data
    );
}

#[test]
fn builder_and_reader_agree() {
    let message = message::Builder::new_default();
    let mut root = message.init_root(StructSize::new(1, 2)).unwrap();
    root.set_u16(6, 0xbeef).unwrap();
    let mut child = root.init_struct(0, StructSize::new(1, 0)).unwrap();
    child.set_f32(4, 1.5).unwrap();
    let mut list = root.init_list(1, ElementSize::EightBytes, 2).unwrap();
    list.set(0, -1i64).unwrap();
    list.set(1, 1i64).unwrap();

    let live = message.get_root().unwrap();
    let live_child = live.get_struct(0, StructSize::new(0, 0)).unwrap();
    let live_list = live.get_list(1, ElementSize::EightBytes).unwrap().unwrap();
    assert_eq!(live.get_u16(6).unwrap(), 0xbeef);
    assert_eq!(live_child.get_f32(4).unwrap(), 1.5);
    assert_eq!(live_list.get::<i64>(0).unwrap(), -1);

    reparse(&message, |root| {
        assert_eq!(root.get_u16(6).unwrap(), live.get_u16(6).unwrap());
        let child = root.get_struct(0).unwrap().unwrap();
        assert_eq!(child.get_f32(4).unwrap(), live_child.get_f32(4).unwrap());
        let list = root.get_list(1, ElementSize::EightBytes).unwrap().unwrap();
        for i in 0..2 {
            assert_eq!(
                list.get::<i64>(i).unwrap(),
                live_list.get::<i64>(i).unwrap()
            );
        }
    });

    let reader = message.into_reader();
    assert_eq!(reader.get_root().unwrap().get_u16(6).unwrap(), 0xbeef);
}

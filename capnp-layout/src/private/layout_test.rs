// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.


use crate::message::{self, BuilderOptions, ReaderOptions, SegmentArray};
use crate::pointer::ElementSize;
use crate::private::arena::{BuilderArena, BuilderArenaImpl, ReaderArena, ReaderArenaImpl};
use crate::private::layout::{PointerBuilder, PointerReader, PrimitiveElement, StructSize};
use crate::traits::FromPointerReader;
use crate::ErrorKind;

fn to_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn simple_raw_data_struct() {
    let segment = to_bytes(&[0x0000_0001_0000_0000, 0xefcd_ab89_6745_2301]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let reader = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit())
        .unwrap()
        .get_struct()
        .unwrap()
        .unwrap();

    assert_eq!(0xefcdab8967452301u64, reader.get_data_field::<u64>(0).unwrap());
    assert!(reader.get_data_field::<u64>(8).is_err()); // past end of struct

    assert_eq!(0x67452301u32, reader.get_data_field::<u32>(0).unwrap());
    assert_eq!(0xefcdab89u32, reader.get_data_field::<u32>(4).unwrap());
    assert!(reader.get_data_field::<u32>(8).is_err());

    assert_eq!(0x2301u16, reader.get_data_field::<u16>(0).unwrap());
    assert_eq!(0x6745u16, reader.get_data_field::<u16>(2).unwrap());
    assert_eq!(0xab89u16, reader.get_data_field::<u16>(4).unwrap());
    assert_eq!(0xefcdu16, reader.get_data_field::<u16>(6).unwrap());
    assert_eq!(
        reader.get_data_field::<u16>(7).unwrap_err().kind,
        ErrorKind::DataFieldOutOfBounds {
            offset: 56,
            width: 16,
            size: 64
        }
    );

    // Bits.
    assert!(reader.get_bool(0).unwrap());
    for bit in 1..8 {
        assert!(!reader.get_bool(bit).unwrap());
    }

    assert!(reader.get_bool(8).unwrap());
    assert!(reader.get_bool(9).unwrap());
    assert!(!reader.get_bool(10).unwrap());
    assert!(!reader.get_bool(11).unwrap());
    assert!(!reader.get_bool(12).unwrap());
    assert!(reader.get_bool(13).unwrap());
    assert!(!reader.get_bool(14).unwrap());
    assert!(!reader.get_bool(15).unwrap());

    assert!(reader.get_bool(63).unwrap());
    assert!(reader.get_bool(64).is_err());
}

#[test]
fn bool_list() {
    // [true, false, true, false,
    //  true, true, true, false,
    //  false, true]

    let segment = to_bytes(&[0x0000_0051_0000_0001, 0x0000_0000_0000_0275]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer_reader = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();

    let reader = pointer_reader
        .get_list(Some(ElementSize::Bit))
        .unwrap()
        .unwrap();

    let expected = [
        true, false, true, false, true, true, true, false, false, true,
    ];
    assert_eq!(reader.len(), 10);
    for (i, &value) in expected.iter().enumerate() {
        assert_eq!(bool::get(&reader, i as u32).unwrap(), value);
    }

    let reader = crate::primitive_list::Reader::<bool>::get_from_pointer(&pointer_reader).unwrap();
    assert_eq!(reader.len(), 10);
    assert_eq!(
        reader.iter().collect::<crate::Result<Vec<bool>>>().unwrap(),
        expected
    );
    assert!(reader.get(10).is_err());

    // Bit lists are never read as wider lists.
    assert_eq!(
        pointer_reader
            .get_list(Some(ElementSize::Byte))
            .unwrap()
            .map(|l| l.len()),
        None
    );
}

#[test]
fn struct_list_has_tag_word() {
    let message = message::Builder::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let list = root.init_struct_list(0, 2, StructSize::new(1, 0)).unwrap();
    list.get_struct_element(0).unwrap().set_u64(0, 0x11).unwrap();
    list.get_struct_element(1).unwrap().set_u64(0, 0x22).unwrap();

    let segments = message.get_segments_for_output();
    let words: Vec<u64> = segments
        .iter()
        .next()
        .unwrap()
        .chunks(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(
        words,
        vec![
            0x0001_0000_0000_0000, // root: struct, 0 data words, 1 pointer
            0x0000_0017_0000_0001, // list: composite, 2 words
            0x0000_0001_0000_0008, // tag: 2 elements, 1 data word each
            0x11,
            0x22,
        ]
    );
}

#[test]
fn struct_list_read_as_primitive_list() {
    let message = message::Builder::new_default();
    let root = message.init_root(StructSize::new(0, 2)).unwrap();
    let list = root.init_struct_list(0, 3, StructSize::new(1, 1)).unwrap();
    for i in 0..3 {
        let mut element = list.get_struct_element(i).unwrap();
        element.set_u32(0, 100 + i).unwrap();
        element.set_text(0, &format!("e{i}")).unwrap();
    }
    let empty = root.init_struct_list(1, 2, StructSize::new(0, 1)).unwrap();
    assert_eq!(empty.len(), 2);

    let reader = message.into_reader();
    let root = reader.get_root().unwrap();
    let pointer = root.get_pointer_field(0).unwrap();

    let as_u32 = pointer.get_list(Some(ElementSize::FourBytes)).unwrap().unwrap();
    assert_eq!(as_u32.len(), 3);
    assert_eq!(as_u32.get::<u32>(2).unwrap(), 102);

    let as_text = crate::text_list::Reader::get_from_pointer(&pointer).unwrap();
    assert_eq!(as_text.get(1).unwrap(), "e1");

    // Structs without data cannot stand in for a list of integers.
    let no_data = root.get_pointer_field(1).unwrap();
    assert_eq!(
        no_data
            .get_list(Some(ElementSize::FourBytes))
            .unwrap()
            .map(|l| l.len()),
        None
    );
    let mut strict = ReaderOptions::new();
    strict.strict_pointers(true);
    let segments = reader.into_segments();
    let strict_reader = message::Reader::new(segments, strict);
    assert_eq!(
        strict_reader
            .get_root()
            .unwrap()
            .get_list(1, ElementSize::FourBytes)
            .err()
            .map(|e| e.kind),
        Some(ErrorKind::IncompatibleListElementSize)
    );
}

#[test]
fn single_far_pointer() {
    let segment0 = to_bytes(&[0x0000_0001_0000_0002]);
    let segment1 = to_bytes(&[0x0000_0001_0000_0000, 42]);
    let segments: &[&[u8]] = &[&segment0, &segment1];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let root = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit())
        .unwrap()
        .get_struct()
        .unwrap()
        .unwrap();
    assert_eq!(root.get_u64(0).unwrap(), 42);
}

#[test]
fn double_far_pointer() {
    let segment0 = to_bytes(&[0x0000_0001_0000_0006]);
    let segment1 = to_bytes(&[0x0000_0002_0000_0002, 0x0000_0001_0000_0000]);
    let segment2 = to_bytes(&[42]);
    let segments: &[&[u8]] = &[&segment0, &segment1, &segment2];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let root = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit())
        .unwrap()
        .get_struct()
        .unwrap()
        .unwrap();
    assert_eq!(root.get_data_section_size(), 64);
    assert_eq!(root.get_u64(0).unwrap(), 42);
}

#[test]
fn far_pointer_to_missing_segment() {
    let segment0 = to_bytes(&[0x0000_0005_0000_0002]);
    let segments: &[&[u8]] = &[&segment0];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert!(pointer.get_struct().unwrap().is_none());

    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), options);
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_struct().err().map(|e| e.kind),
        Some(ErrorKind::InvalidSegmentId(5))
    );
}

#[test]
fn builder_rejects_double_far_pointer() {
    let arena = BuilderArenaImpl::new(BuilderOptions::new());
    assert_eq!(arena.allocate(0, 2), Some(0));
    // Double-far pointer with its landing pad at word 1 of segment 0.
    arena.set_word(0, 0, 0x0000_0000_0000_000e).unwrap();
    let pointer = PointerBuilder::get_root(&arena, 0, 0);
    assert_eq!(
        pointer.get_struct(StructSize::new(1, 0)).err().map(|e| e.kind),
        Some(ErrorKind::Failed)
    );
}

#[test]
fn init_list_rejects_unsupported_shapes() {
    let message = message::Builder::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    assert_eq!(
        root.init_list(0, ElementSize::InlineComposite, 1).err().map(|e| e.kind),
        Some(ErrorKind::IncompatibleListElementSize)
    );
    assert_eq!(
        root.init_list(0, ElementSize::Void, 1 << 29).err().map(|e| e.kind),
        Some(ErrorKind::Failed)
    );
    assert!(root.get_pointer_field(0).unwrap().is_null().unwrap());
}

#[test]
fn zero_sized_struct_is_not_null() {
    let message = message::Builder::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    root.init_struct(0, StructSize::new(0, 0)).unwrap();
    assert!(!root.get_pointer_field(0).unwrap().is_null().unwrap());

    let segments = message.get_segments_for_output();
    let segment = segments.iter().next().unwrap();
    assert_eq!(segment.len(), 16);
    assert_eq!(&segment[8..], &0x0000_0000_ffff_fffcu64.to_le_bytes());
}

#[test]
fn out_of_bounds_pointers_are_errors() {
    // Struct claims one data word past the end of the segment.
    let segment = to_bytes(&[0x0000_0001_0000_0000]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_struct().err().map(|e| e.kind),
        Some(ErrorKind::MessageContainsOutOfBoundsPointer)
    );

    // Offset -2 lands before the start of the segment.
    let segment = to_bytes(&[0x0000_0001_ffff_fff8, 0]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_struct().err().map(|e| e.kind),
        Some(ErrorKind::MessageContainsOutOfBoundsPointer)
    );

    // Text runs past the end of the segment.
    let segment = to_bytes(&[0x0000_0102_0000_0001, 0]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_text().err().map(|e| e.kind),
        Some(ErrorKind::MessageContainsOutOfBoundsPointer)
    );
}

#[test]
fn capability_pointer_reads_as_null() {
    let segment = to_bytes(&[0x0000_0000_0000_0003]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert!(!pointer.is_null().unwrap());
    assert!(pointer.get_struct().unwrap().is_none());
    assert_eq!(pointer.get_text().unwrap(), "");

    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), options);
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_struct().err().map(|e| e.kind),
        Some(ErrorKind::UnsupportedCapabilityPointer)
    );
}

#[test]
fn text_without_terminator() {
    // "hi" stored as a two-byte list with no NUL.
    let segment = to_bytes(&[0x0000_0012_0000_0001, 0x0000_0000_0000_6968]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(pointer.get_text().unwrap(), "h");
    assert_eq!(pointer.get_data().unwrap(), b"hi");

    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), options);
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_text().err().map(|e| e.kind),
        Some(ErrorKind::TextIsNotNulTerminated)
    );
}

#[test]
fn non_utf8_text() {
    // Bytes ff fe followed by the terminator.
    let segment = to_bytes(&[0x0000_001a_0000_0001, 0x0000_0000_0000_feff]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(pointer.get_text().unwrap(), "");
    assert_eq!(pointer.get_data().unwrap(), b"\xff\xfe\0");

    let mut options = ReaderOptions::new();
    options.strict_pointers(true);
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), options);
    let pointer = PointerReader::get_root(&arena, 0, 0, arena.nesting_limit()).unwrap();
    assert_eq!(
        pointer.get_text().err().map(|e| e.kind),
        Some(ErrorKind::TextContainsNonUtf8Data)
    );
}

#[test]
fn self_referencing_struct_hits_nesting_limit() {
    // Zero data words, one pointer, offset -1: the struct's only pointer is the root itself.
    let segment = to_bytes(&[0x0001_0000_ffff_fffc]);
    let segments: &[&[u8]] = &[&segment];
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), ReaderOptions::new());
    let mut reader = PointerReader::get_root(&arena, 0, 0, 8)
        .unwrap()
        .get_struct()
        .unwrap()
        .unwrap();

    let mut depth = 0;
    let error = loop {
        match reader.get_struct(0) {
            Ok(Some(next)) => {
                reader = next;
                depth += 1;
            }
            Ok(None) => panic!("pointer unexpectedly null"),
            Err(e) => break e,
        }
    };
    assert_eq!(depth, 7);
    assert_eq!(error.kind, ErrorKind::NestingLimitExceeded);
}

#[test]
fn traversal_limit_is_enforced() {
    let segment = to_bytes(&[0x0001_0000_ffff_fffc]);
    let segments: &[&[u8]] = &[&segment];
    let mut options = ReaderOptions::new();
    options.traversal_limit_in_words(4);
    let arena = ReaderArenaImpl::new(SegmentArray::new(segments), options);
    let mut reader = PointerReader::get_root(&arena, 0, 0, 1000)
        .unwrap()
        .get_struct()
        .unwrap()
        .unwrap();
    let error = loop {
        match reader.get_struct(0) {
            Ok(Some(next)) => reader = next,
            Ok(None) => panic!("pointer unexpectedly null"),
            Err(e) => break e,
        }
    };
    assert_eq!(error.kind, ErrorKind::ReadLimitExceeded);
}

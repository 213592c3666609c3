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


//! Encoding and decoding of 64-bit wire pointers.
//!
//! Every pointer carries a 2-bit kind tag in its lowest bits:
//!
//! ```text
//! STRUCT  offset:30 (signed) | data words:16  | pointer words:16
//! LIST    offset:30 (signed) | element size:3 | element count:29
//! FAR     double:1 | landing pad position:29  | segment id:32
//! OTHER   reserved for capabilities
//! ```
//!
//! A struct or list offset counts words from the word immediately after the pointer itself.

use crate::private::units::{ElementCount32, WordCount16, WordCount32};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    /// Decodes the three-bit element size field. Higher bits are ignored.
    pub fn from_bits(val: u8) -> Self {
        match val & 7 {
            0 => Self::Void,
            1 => Self::Bit,
            2 => Self::Byte,
            3 => Self::TwoBytes,
            4 => Self::FourBytes,
            5 => Self::EightBytes,
            6 => Self::Pointer,
            _ => Self::InlineComposite,
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

impl WirePointerKind {
    fn from_bits(val: u32) -> Self {
        match val & 3 {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            _ => Self::Other,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::List => "list",
            Self::Far => "far",
            Self::Other => "capability",
        }
    }
}

/// A pointer word split into its two little-endian halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WirePointer {
    offset_and_kind: u32,
    upper32bits: u32,
}

impl WirePointer {
    #[inline]
    pub fn from_word(word: u64) -> Self {
        Self {
            offset_and_kind: word as u32,
            upper32bits: (word >> 32) as u32,
        }
    }

    #[inline]
    pub fn to_word(self) -> u64 {
        u64::from(self.offset_and_kind) | (u64::from(self.upper32bits) << 32)
    }

    #[inline]
    pub fn kind(&self) -> WirePointerKind {
        WirePointerKind::from_bits(self.offset_and_kind)
    }

    #[inline]
    pub fn is_positional(&self) -> bool {
        (self.offset_and_kind & 2) == 0 // match Struct and List but not Far and Other.
    }

    #[inline]
    pub fn is_capability(&self) -> bool {
        self.offset_and_kind == WirePointerKind::Other as u32
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.offset_and_kind == 0 && self.upper32bits == 0
    }

    /// The signed word offset of a struct or list pointer.
    #[inline]
    pub fn offset(&self) -> i32 {
        (self.offset_and_kind as i32) >> 2
    }

    /// Resolves the offset of a pointer stored at word `this_index`. Returns `None` if the
    /// target would lie before the start of the segment.
    #[inline]
    pub fn target(&self, this_index: WordCount32) -> Option<WordCount32> {
        let target = i64::from(this_index) + 1 + i64::from(self.offset());
        WordCount32::try_from(target).ok()
    }

    /// Points this pointer, stored at word `this_index`, at word `target_index` of the same
    /// segment.
    #[inline]
    pub fn set_kind_and_target(
        &mut self,
        kind: WirePointerKind,
        this_index: WordCount32,
        target_index: WordCount32,
    ) {
        let offset = i64::from(target_index) - i64::from(this_index) - 1;
        self.offset_and_kind = ((offset as i32) << 2) as u32 | (kind as u32);
    }

    #[inline]
    pub fn set_kind_with_zero_offset(&mut self, kind: WirePointerKind) {
        self.offset_and_kind = kind as u32
    }

    #[inline]
    pub fn set_kind_and_target_for_empty_struct(&mut self) {
        //# This pointer points at an empty struct. An offset of 0 would make the whole
        //# word zero, i.e. null, so the struct is placed at offset -1 instead.
        self.offset_and_kind = 0xfffffffc;
    }

    #[inline]
    pub fn inline_composite_list_element_count(&self) -> ElementCount32 {
        self.offset_and_kind >> 2
    }

    #[inline]
    pub fn set_kind_and_inline_composite_list_element_count(
        &mut self,
        kind: WirePointerKind,
        element_count: ElementCount32,
    ) {
        self.offset_and_kind = (element_count << 2) | (kind as u32)
    }

    #[inline]
    pub fn far_position_in_segment(&self) -> WordCount32 {
        self.offset_and_kind >> 3
    }

    #[inline]
    pub fn is_double_far(&self) -> bool {
        ((self.offset_and_kind >> 2) & 1) != 0
    }

    #[inline]
    pub fn set_far(&mut self, is_double_far: bool, pos: WordCount32) {
        self.offset_and_kind =
            (pos << 3) | ((is_double_far as u32) << 2) | WirePointerKind::Far as u32;
    }

    #[inline]
    pub fn far_segment_id(&self) -> u32 {
        self.upper32bits
    }

    #[inline]
    pub fn set_far_segment_id(&mut self, si: u32) {
        self.upper32bits = si
    }

    #[inline]
    pub fn struct_data_size(&self) -> WordCount16 {
        (self.upper32bits & 0xffff) as WordCount16
    }

    #[inline]
    pub fn struct_ptr_count(&self) -> WordCount16 {
        (self.upper32bits >> 16) as WordCount16
    }

    #[inline]
    pub fn struct_word_size(&self) -> WordCount32 {
        WordCount32::from(self.struct_data_size()) + WordCount32::from(self.struct_ptr_count())
    }

    #[inline]
    pub fn set_struct_size_from_pieces(&mut self, ds: WordCount16, rc: WordCount16) {
        self.upper32bits = u32::from(ds) | (u32::from(rc) << 16)
    }

    #[inline]
    pub fn list_element_size(&self) -> ElementSize {
        ElementSize::from_bits(self.upper32bits as u8)
    }

    #[inline]
    pub fn list_element_count(&self) -> ElementCount32 {
        self.upper32bits >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(&self) -> WordCount32 {
        self.list_element_count()
    }

    #[inline]
    pub fn set_list_size_and_count(&mut self, es: ElementSize, ec: ElementCount32) {
        assert!(ec < (1 << 29), "Lists are limited to 2**29 elements");
        self.upper32bits = (ec << 3) | (es as u32);
    }

    #[inline]
    pub fn set_list_inline_composite(&mut self, wc: WordCount32) {
        assert!(
            wc < (1 << 29),
            "Inline composite lists are limited to 2**29 words"
        );
        self.upper32bits = (wc << 3) | (ElementSize::InlineComposite as u32);
    }

    /// Splits the pointer into its kind-specific fields.
    pub fn decode(self) -> Pointer {
        match self.kind() {
            WirePointerKind::Struct => Pointer::Struct {
                offset: self.offset(),
                data_words: self.struct_data_size(),
                pointer_count: self.struct_ptr_count(),
            },
            WirePointerKind::List => Pointer::List {
                offset: self.offset(),
                element_size: self.list_element_size(),
                element_count: self.list_element_count(),
            },
            WirePointerKind::Far => Pointer::Far {
                double_far: self.is_double_far(),
                landing_pad: self.far_position_in_segment(),
                segment_id: self.far_segment_id(),
            },
            WirePointerKind::Other => Pointer::Other(self.to_word()),
        }
    }
}

/// A decoded pointer word.
///
/// The all-zero word decodes as an empty struct at offset 0; callers that care about null
/// check [`WirePointer::is_null`] first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pointer {
    Struct {
        offset: i32,
        data_words: WordCount16,
        pointer_count: WordCount16,
    },
    /// For `InlineComposite` lists, `element_count` is the word count of the list body,
    /// not counting its tag word.
    List {
        offset: i32,
        element_size: ElementSize,
        element_count: ElementCount32,
    },
    Far {
        double_far: bool,
        landing_pad: WordCount32,
        segment_id: u32,
    },
    /// The reserved kind, carried as the raw word.
    Other(u64),
}

impl Pointer {
    pub fn decode(word: u64) -> Self {
        WirePointer::from_word(word).decode()
    }

    pub fn encode(&self) -> u64 {
        match *self {
            Self::Struct {
                offset,
                data_words,
                pointer_count,
            } => encode_struct_pointer(offset, data_words, pointer_count),
            Self::List {
                offset,
                element_size,
                element_count,
            } => encode_list_pointer(offset, element_size, element_count),
            Self::Far {
                double_far,
                landing_pad,
                segment_id,
            } => encode_far_pointer(segment_id, landing_pad, double_far),
            Self::Other(word) => word,
        }
    }
}

#[inline]
fn offset_bits(offset: i32) -> u32 {
    ((offset as u32) & 0x3fff_ffff) << 2
}

/// Encodes a struct pointer. Offsets beyond 30 signed bits are truncated.
pub fn encode_struct_pointer(
    offset: i32,
    data_words: WordCount16,
    pointer_count: WordCount16,
) -> u64 {
    let mut pointer = WirePointer {
        offset_and_kind: offset_bits(offset) | WirePointerKind::Struct as u32,
        upper32bits: 0,
    };
    pointer.set_struct_size_from_pieces(data_words, pointer_count);
    pointer.to_word()
}

/// Encodes a list pointer. Counts beyond 29 bits are truncated.
pub fn encode_list_pointer(
    offset: i32,
    element_size: ElementSize,
    element_count: ElementCount32,
) -> u64 {
    WirePointer {
        offset_and_kind: offset_bits(offset) | WirePointerKind::List as u32,
        upper32bits: ((element_count & 0x1fff_ffff) << 3) | element_size as u32,
    }
    .to_word()
}

/// Encodes a far pointer to word `landing_pad` of segment `segment_id`.
pub fn encode_far_pointer(segment_id: u32, landing_pad: WordCount32, double_far: bool) -> u64 {
    let mut pointer = WirePointer::default();
    pointer.set_far(double_far, landing_pad & 0x1fff_ffff);
    pointer.set_far_segment_id(segment_id);
    pointer.to_word()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_pointer_layout() {
        // offset 0, 1 data word, 0 pointers: the classic root pointer.
        assert_eq!(encode_struct_pointer(0, 1, 0), 0x0000_0001_0000_0000);
        assert_eq!(encode_struct_pointer(2, 3, 4), 0x0004_0003_0000_0008);
        assert_eq!(
            Pointer::decode(0x0004_0003_0000_0008),
            Pointer::Struct {
                offset: 2,
                data_words: 3,
                pointer_count: 4
            }
        );
    }

    #[test]
    fn negative_offsets_sign_extend() {
        let word = encode_struct_pointer(-1, 0, 0);
        assert_eq!(word as u32, 0xffff_fffc);
        assert_eq!(WirePointer::from_word(word).offset(), -1);

        let min = -(1 << 29);
        let word = encode_list_pointer(min, ElementSize::Byte, 3);
        assert_eq!(WirePointer::from_word(word).offset(), min);
        assert_eq!(WirePointer::from_word(word).target(1 << 29), Some(1));
        assert_eq!(WirePointer::from_word(word).target(0), None);
    }

    #[test]
    fn list_pointer_layout() {
        let word = encode_list_pointer(1, ElementSize::FourBytes, 10_000);
        assert_eq!(word & 3, 1);
        assert_eq!(
            Pointer::decode(word),
            Pointer::List {
                offset: 1,
                element_size: ElementSize::FourBytes,
                element_count: 10_000
            }
        );
        let max = encode_list_pointer(0, ElementSize::Bit, (1 << 29) - 1);
        assert_eq!(WirePointer::from_word(max).list_element_count(), (1 << 29) - 1);
    }

    #[test]
    fn far_pointer_layout() {
        let word = encode_far_pointer(7, 12, true);
        assert_eq!(word, (7u64 << 32) | (12 << 3) | 4 | 2);
        assert_eq!(
            Pointer::decode(word),
            Pointer::Far {
                double_far: true,
                landing_pad: 12,
                segment_id: 7
            }
        );
    }

    #[test]
    fn other_kind_is_opaque() {
        let word = 0xdead_beef_0000_0003;
        assert_eq!(Pointer::decode(word), Pointer::Other(word));
        assert!(WirePointer::from_word(3).is_capability());
    }

    #[test]
    fn set_kind_and_target_is_relative_to_next_word() {
        let mut pointer = WirePointer::default();
        pointer.set_kind_and_target(WirePointerKind::Struct, 5, 6);
        assert_eq!(pointer.offset(), 0);
        pointer.set_kind_and_target(WirePointerKind::List, 5, 2);
        assert_eq!(pointer.offset(), -4);
        assert_eq!(pointer.target(5), Some(2));
        assert_eq!(pointer.kind(), WirePointerKind::List);
    }

    #[test]
    fn encode_decode_agree() {
        fn check(word: u64) -> bool {
            Pointer::decode(word).encode() == word
        }
        quickcheck::quickcheck(check as fn(u64) -> bool);
    }
}

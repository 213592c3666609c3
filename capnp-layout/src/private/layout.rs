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


//! Views over structs, lists and pointers inside message segments.
//!
//! Every view stores a segment id plus word or byte offsets and goes through its arena for
//! each access, so views stay valid while the segments underneath grow.

use crate::data;
use crate::pointer::ElementSize::{self, *};
use crate::pointer::{WirePointer, WirePointerKind};
use crate::private::arena::{read_word, BuilderArena, NullArena, ReaderArena, SegmentId};
use crate::private::primitive::{self, Primitive};
use crate::private::units::*;
use crate::text;
use crate::{Error, ErrorKind, Result};

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        Void => 0,
        Bit => 1,
        Byte => 8,
        TwoBytes => 16,
        FourBytes => 32,
        EightBytes => 64,
        Pointer => 0,
        InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> WirePointerCount32 {
    match size {
        Pointer => 1,
        _ => 0,
    }
}

/// The shape of a struct: data section words and pointer section words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructSize {
    pub data: WordCount16,
    pub pointers: WirePointerCount16,
}

impl StructSize {
    pub const fn new(data: WordCount16, pointers: WirePointerCount16) -> Self {
        Self { data, pointers }
    }

    pub fn total(&self) -> WordCount32 {
        self.data as WordCount32 + self.pointers as WordCount32 * WORDS_PER_POINTER as WordCount32
    }
}

mod wire_helpers {
    use super::*;

    #[inline]
    pub fn round_bytes_up_to_words(bytes: ByteCount32) -> WordCount32 {
        //# This code assumes 64-bit words.
        ((u64::from(bytes) + 7) / BYTES_PER_WORD as u64) as WordCount32
    }

    //# The maximum object size is 4GB - 1 byte. If measured in bits,
    //# this would overflow a 32-bit counter, so we need to accept
    //# BitCount64. However, 32 bits is enough for the returned
    //# ByteCounts and WordCounts.
    #[inline]
    pub fn round_bits_up_to_words(bits: BitCount64) -> u64 {
        //# This code assumes 64-bit words.
        (bits + 63) / (BITS_PER_WORD as u64)
    }

    fn out_of_bounds() -> Error {
        Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer)
    }

    fn unexpected(expected: WirePointerKind, found: WirePointerKind) -> Error {
        Error::from_kind(ErrorKind::UnexpectedPointerKind {
            expected: expected.name(),
            found: found.name(),
        })
    }

    fn check_list_size(element_count: ElementCount32) -> Result<()> {
        if element_count < (1 << 29) {
            Ok(())
        } else {
            Err(Error::failed(format!(
                "Lists are limited to 2**29 elements, got {element_count}"
            )))
        }
    }

    /// Where an allocation landed, and the positional pointer that must be written to reach
    /// it. The caller fills in the size fields of `pointer` and stores it at
    /// (`pointer_segment`, `pointer_index`).
    pub struct Allocation {
        pub pointer_segment: SegmentId,
        pub pointer_index: WordCount32,
        pub pointer: WirePointer,
        pub segment_id: SegmentId,
        pub index: WordCount32,
    }

    impl Allocation {
        fn store(&self, arena: &dyn BuilderArena) -> Result<()> {
            arena.set_word(self.pointer_segment, self.pointer_index, self.pointer.to_word())
        }
    }

    pub fn allocate(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        amount: WordCount32,
        kind: WirePointerKind,
    ) -> Result<Allocation> {
        let mut pointer = WirePointer::default();

        if amount == 0 && kind == WirePointerKind::Struct {
            pointer.set_kind_and_target_for_empty_struct();
            return Ok(Allocation {
                pointer_segment: segment_id,
                pointer_index: reff_index,
                pointer,
                segment_id,
                index: reff_index,
            });
        }

        match arena.allocate(segment_id, amount) {
            Some(index) => {
                pointer.set_kind_and_target(kind, reff_index, index);
                Ok(Allocation {
                    pointer_segment: segment_id,
                    pointer_index: reff_index,
                    pointer,
                    segment_id,
                    index,
                })
            }
            None => {
                //# Need to allocate in a new segment. We'll need to
                //# allocate an extra pointer worth of space to act as
                //# the landing pad for a far pointer.
                let amount_plus_ref = amount + POINTER_SIZE_IN_WORDS as u32;
                let (far_segment, pad) = arena.allocate_anywhere(amount_plus_ref);

                let mut far = WirePointer::default();
                far.set_far(false, pad);
                far.set_far_segment_id(far_segment);
                arena.set_word(segment_id, reff_index, far.to_word())?;
                tracing::trace!(
                    from_segment = segment_id,
                    to_segment = far_segment,
                    landing_pad = pad,
                    "wrote far pointer"
                );

                //# Initialize the landing pad to indicate that the
                //# data immediately follows the pad.
                pointer.set_kind_and_target(kind, pad, pad + 1);
                Ok(Allocation {
                    pointer_segment: far_segment,
                    pointer_index: pad,
                    pointer,
                    segment_id: far_segment,
                    index: pad + 1,
                })
            }
        }
    }

    /// Resolves the pointer `reff`, read from word `reff_index` of `segment_id`, through any
    /// far pointers. Returns the positional pointer describing the object, the segment it
    /// lives in, and the index of its first word.
    pub fn follow_fars(
        arena: &dyn ReaderArena,
        reff: WirePointer,
        reff_index: WordCount32,
        segment_id: SegmentId,
    ) -> Result<(WirePointer, SegmentId, WordCount32)> {
        match reff.kind() {
            WirePointerKind::Far => {
                let far_segment = reff.far_segment_id();
                let pad_index = reff.far_position_in_segment();
                let pad_words = if reff.is_double_far() { 2 } else { 1 };
                arena.contains_interval(far_segment, pad_index, pad_words)?;
                let segment = arena.get_segment(far_segment)?;
                let pad = WirePointer::from_word(read_word(segment, pad_index)?);

                if !reff.is_double_far() {
                    if !pad.is_positional() {
                        return Err(unexpected(WirePointerKind::Struct, pad.kind()));
                    }
                    let target = pad.target(pad_index).ok_or_else(out_of_bounds)?;
                    Ok((pad, far_segment, target))
                } else {
                    //# Landing pad is another far pointer. It is
                    //# followed by a tag describing the pointed-to
                    //# object.
                    if pad.kind() != WirePointerKind::Far {
                        return Err(unexpected(WirePointerKind::Far, pad.kind()));
                    }
                    let tag = WirePointer::from_word(read_word(
                        segment,
                        pad_index + 1,
                    )?);
                    let content_segment = pad.far_segment_id();
                    arena.get_segment(content_segment)?;
                    Ok((tag, content_segment, pad.far_position_in_segment()))
                }
            }
            WirePointerKind::Other => {
                Err(Error::from_kind(ErrorKind::UnsupportedCapabilityPointer))
            }
            _ => {
                let target = reff.target(reff_index).ok_or_else(out_of_bounds)?;
                Ok((reff, segment_id, target))
            }
        }
    }

    /// Builder-side counterpart of `follow_fars()`.
    pub fn follow_builder_fars(
        arena: &dyn BuilderArena,
        reff: WirePointer,
        reff_index: WordCount32,
        segment_id: SegmentId,
    ) -> Result<(WirePointer, SegmentId, WordCount32)> {
        match reff.kind() {
            WirePointerKind::Far => {
                let far_segment = reff.far_segment_id();
                let pad_index = reff.far_position_in_segment();
                // Builders only write single far pointers.
                if reff.is_double_far() {
                    return Err(Error::from_kind(ErrorKind::Failed)
                        .context("double-far pointer in a message being built"));
                }
                let pad = WirePointer::from_word(arena.get_word(far_segment, pad_index)?);
                let target = pad.target(pad_index).ok_or_else(out_of_bounds)?;
                Ok((pad, far_segment, target))
            }
            WirePointerKind::Other => {
                Err(Error::from_kind(ErrorKind::UnsupportedCapabilityPointer))
            }
            _ => {
                let target = reff.target(reff_index).ok_or_else(out_of_bounds)?;
                Ok((reff, segment_id, target))
            }
        }
    }

    pub fn init_struct_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        size: StructSize,
    ) -> Result<StructBuilder<'_>> {
        let mut allocation =
            allocate(arena, segment_id, reff_index, size.total(), WirePointerKind::Struct)?;
        allocation
            .pointer
            .set_struct_size_from_pieces(size.data, size.pointers);
        allocation.store(arena)?;

        Ok(StructBuilder {
            arena,
            segment_id: allocation.segment_id,
            data: word_to_byte(allocation.index),
            pointers: allocation.index + WordCount32::from(size.data),
            data_size: u32::from(size.data) * BITS_PER_WORD as BitCount32,
            pointer_count: size.pointers,
        })
    }

    pub fn init_list_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        element_count: ElementCount32,
        element_size: ElementSize,
    ) -> Result<ListBuilder<'_>> {
        if element_size == InlineComposite {
            // Struct lists need a struct size; see init_struct_list_pointer().
            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize));
        }
        check_list_size(element_count)?;

        let data_size = data_bits_per_element(element_size);
        let pointer_count = pointers_per_element(element_size);
        let step = data_size + pointer_count * BITS_PER_POINTER as u32;
        let word_count = round_bits_up_to_words(u64::from(element_count) * u64::from(step));

        let mut allocation = allocate(
            arena,
            segment_id,
            reff_index,
            word_count as WordCount32,
            WirePointerKind::List,
        )?;
        allocation
            .pointer
            .set_list_size_and_count(element_size, element_count);
        allocation.store(arena)?;

        Ok(ListBuilder {
            arena,
            segment_id: allocation.segment_id,
            ptr: word_to_byte(allocation.index),
            element_count,
            step,
            struct_data_size: data_size,
            struct_pointer_count: pointer_count as WirePointerCount16,
            element_size,
        })
    }

    pub fn init_struct_list_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> Result<ListBuilder<'_>> {
        check_list_size(element_count)?;
        let words_per_element = element_size.total();

        //# Allocate the list, prefixed by a single WirePointer.
        let word_count = u64::from(element_count) * u64::from(words_per_element);
        assert!(
            word_count < (1 << 29),
            "Inline composite lists are limited to 2**29 words"
        );
        let word_count = word_count as WordCount32;
        let mut allocation = allocate(
            arena,
            segment_id,
            reff_index,
            POINTER_SIZE_IN_WORDS as u32 + word_count,
            WirePointerKind::List,
        )?;
        allocation.pointer.set_list_inline_composite(word_count);
        allocation.store(arena)?;

        //# Initialize the list tag.
        let mut tag = WirePointer::default();
        tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        tag.set_struct_size_from_pieces(element_size.data, element_size.pointers);
        arena.set_word(allocation.segment_id, allocation.index, tag.to_word())?;

        Ok(ListBuilder {
            arena,
            segment_id: allocation.segment_id,
            ptr: word_to_byte(allocation.index + POINTER_SIZE_IN_WORDS as u32),
            element_count,
            step: words_per_element * BITS_PER_WORD as u32,
            struct_data_size: u32::from(element_size.data) * BITS_PER_WORD as u32,
            struct_pointer_count: element_size.pointers,
            element_size: InlineComposite,
        })
    }

    /// Writes `bytes` as a byte list, followed by a NUL byte if `nul_terminated` is set.
    pub fn set_blob_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        bytes: &[u8],
        nul_terminated: bool,
    ) -> Result<()> {
        let byte_size = bytes.len() + usize::from(nul_terminated);
        check_list_size(u32::try_from(byte_size).unwrap_or(u32::MAX))?;
        let byte_size = byte_size as ByteCount32;

        let mut allocation = allocate(
            arena,
            segment_id,
            reff_index,
            round_bytes_up_to_words(byte_size),
            WirePointerKind::List,
        )?;
        allocation.pointer.set_list_size_and_count(Byte, byte_size);
        allocation.store(arena)?;
        // Fresh words are zeroed, so the terminator is already in place.
        arena.write_bytes(allocation.segment_id, word_to_byte(allocation.index), bytes)
    }

    pub fn get_writable_struct_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        default_size: StructSize,
    ) -> Result<StructBuilder<'_>> {
        let reff = WirePointer::from_word(arena.get_word(segment_id, reff_index)?);
        if reff.is_null() {
            return init_struct_pointer(arena, segment_id, reff_index, default_size);
        }

        let (tag, segment_id, target) = follow_builder_fars(arena, reff, reff_index, segment_id)?;
        if tag.kind() != WirePointerKind::Struct {
            return Err(unexpected(WirePointerKind::Struct, tag.kind()));
        }

        Ok(StructBuilder {
            arena,
            segment_id,
            data: word_to_byte(target),
            pointers: target + WordCount32::from(tag.struct_data_size()),
            data_size: u32::from(tag.struct_data_size()) * BITS_PER_WORD as u32,
            pointer_count: tag.struct_ptr_count(),
        })
    }

    pub fn get_writable_list_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        expected_element_size: Option<ElementSize>,
    ) -> Result<Option<ListBuilder<'_>>> {
        let reff = WirePointer::from_word(arena.get_word(segment_id, reff_index)?);
        if reff.is_null() {
            return Ok(None);
        }

        let (tag, segment_id, target) = follow_builder_fars(arena, reff, reff_index, segment_id)?;
        if tag.kind() != WirePointerKind::List {
            return Err(unexpected(WirePointerKind::List, tag.kind()));
        }
        let element_size = tag.list_element_size();
        if let Some(expected) = expected_element_size {
            if expected != element_size {
                return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize));
            }
        }

        if element_size == InlineComposite {
            let tag = WirePointer::from_word(arena.get_word(segment_id, target)?);
            if tag.kind() != WirePointerKind::Struct {
                return Err(unexpected(WirePointerKind::Struct, tag.kind()));
            }
            Ok(Some(ListBuilder {
                arena,
                segment_id,
                ptr: word_to_byte(target + POINTER_SIZE_IN_WORDS as u32),
                element_count: tag.inline_composite_list_element_count(),
                step: tag.struct_word_size() * BITS_PER_WORD as u32,
                struct_data_size: u32::from(tag.struct_data_size()) * BITS_PER_WORD as u32,
                struct_pointer_count: tag.struct_ptr_count(),
                element_size,
            }))
        } else {
            let data_size = data_bits_per_element(element_size);
            let pointer_count = pointers_per_element(element_size);
            Ok(Some(ListBuilder {
                arena,
                segment_id,
                ptr: word_to_byte(target),
                element_count: tag.list_element_count(),
                step: data_size + pointer_count * BITS_PER_POINTER as u32,
                struct_data_size: data_size,
                struct_pointer_count: pointer_count as WirePointerCount16,
                element_size,
            }))
        }
    }

    /// Reads back a byte list written by `set_blob_pointer()`, dropping the terminator
    /// when `nul_terminated` is set.
    pub fn get_writable_blob_pointer(
        arena: &dyn BuilderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        nul_terminated: bool,
    ) -> Result<Vec<u8>> {
        let reff = WirePointer::from_word(arena.get_word(segment_id, reff_index)?);
        if reff.is_null() {
            return Ok(Vec::new());
        }

        let (tag, segment_id, target) = follow_builder_fars(arena, reff, reff_index, segment_id)?;
        if tag.kind() != WirePointerKind::List {
            return Err(unexpected(WirePointerKind::List, tag.kind()));
        }
        if tag.list_element_size() != Byte {
            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize));
        }
        let size = tag.list_element_count() as usize;
        let len = if nul_terminated {
            size.saturating_sub(1)
        } else {
            size
        };
        let mut bytes = vec![0; len];
        arena.read_bytes(segment_id, word_to_byte(target), &mut bytes)?;
        Ok(bytes)
    }

    pub fn read_struct_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        nesting_limit: i32,
    ) -> Result<Option<StructReader<'a>>> {
        let segment = arena.get_segment(segment_id)?;
        let reff = WirePointer::from_word(read_word(segment, reff_index)?);
        if reff.is_null() {
            return Ok(None);
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::NestingLimitExceeded));
        }

        let (tag, segment_id, target) = follow_fars(arena, reff, reff_index, segment_id)?;
        if tag.kind() != WirePointerKind::Struct {
            return Err(unexpected(WirePointerKind::Struct, tag.kind()));
        }

        let data_size_words = tag.struct_data_size();
        let ptr_count = tag.struct_ptr_count();
        arena.contains_interval(segment_id, target, u64::from(tag.struct_word_size()))?;
        if tag.struct_word_size() == 0 {
            arena.amplified_read(1)?;
        }

        Ok(Some(StructReader {
            arena,
            segment_id,
            data: word_to_byte(target),
            pointers: target + WordCount32::from(data_size_words),
            data_size: u32::from(data_size_words) * BITS_PER_WORD as BitCount32,
            pointer_count: ptr_count,
            nesting_limit: nesting_limit - 1,
        }))
    }

    pub fn read_list_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        expected_element_size: Option<ElementSize>,
        nesting_limit: i32,
    ) -> Result<Option<ListReader<'a>>> {
        let segment = arena.get_segment(segment_id)?;
        let reff = WirePointer::from_word(read_word(segment, reff_index)?);
        if reff.is_null() {
            return Ok(None);
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::NestingLimitExceeded));
        }

        let (list_ref, segment_id, target) = follow_fars(arena, reff, reff_index, segment_id)?;
        if list_ref.kind() != WirePointerKind::List {
            return Err(unexpected(WirePointerKind::List, list_ref.kind()));
        }

        let element_size = list_ref.list_element_size();
        match element_size {
            InlineComposite => {
                let word_count = list_ref.list_inline_composite_word_count();

                //# An InlineComposite list tag is followed by its elements.
                arena.contains_interval(segment_id, target, u64::from(word_count) + 1)?;
                let segment = arena.get_segment(segment_id)?;
                let tag = WirePointer::from_word(read_word(segment, target)?);
                if tag.kind() != WirePointerKind::Struct {
                    return Err(unexpected(WirePointerKind::Struct, tag.kind()));
                }

                let size = tag.inline_composite_list_element_count();
                let data_size = tag.struct_data_size();
                let ptr_count = tag.struct_ptr_count();
                let words_per_element = tag.struct_word_size();

                if u64::from(size) * u64::from(words_per_element) > u64::from(word_count) {
                    return Err(Error::from_kind(ErrorKind::InlineCompositeListOverrun));
                }

                if words_per_element == 0 {
                    //# Watch out for lists of zero-sized structs, which can claim to be
                    //# arbitrarily large without having sent actual data.
                    arena.amplified_read(u64::from(size))?;
                }

                //# If a struct list was not expected, then presumably a non-struct list was
                //# upgraded to a struct list. We need to manipulate the pointer to point at the
                //# first field of the struct. Together with the `step` field, this will allow the
                //# struct list to be accessed as if it were a primitive list without branching.

                //# Check whether the size is compatible.
                match expected_element_size {
                    None | Some(Void | InlineComposite) => (),
                    Some(Bit) => {
                        return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                            .context("found struct list where bit list was expected"));
                    }
                    Some(Byte | TwoBytes | FourBytes | EightBytes) => {
                        if data_size == 0 {
                            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                                .context("found struct list without data where data was expected"));
                        }
                    }
                    Some(Pointer) => {
                        if ptr_count == 0 {
                            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                                .context("found struct list with no pointer section"));
                        }
                    }
                }

                Ok(Some(ListReader {
                    arena,
                    segment_id,
                    ptr: word_to_byte(target + POINTER_SIZE_IN_WORDS as u32),
                    element_count: size,
                    step: words_per_element * BITS_PER_WORD as u32,
                    struct_data_size: u32::from(data_size) * BITS_PER_WORD as u32,
                    struct_pointer_count: ptr_count,
                    element_size,
                    nesting_limit: nesting_limit - 1,
                }))
            }
            _ => {
                //# This is a primitive or pointer list, but all such
                //# lists can also be interpreted as struct lists. We
                //# need to compute the data size and pointer count for
                //# such structs.
                let data_size = data_bits_per_element(element_size);
                let pointer_count = pointers_per_element(element_size);
                let element_count = list_ref.list_element_count();
                let step = data_size + pointer_count * BITS_PER_POINTER as u32;

                let word_count = round_bits_up_to_words(u64::from(element_count) * u64::from(step));
                arena.contains_interval(segment_id, target, word_count)?;

                if element_size == Void {
                    //# Watch out for lists of void, which can claim to be arbitrarily large
                    //# without having sent actual data.
                    arena.amplified_read(u64::from(element_count))?;
                }

                if let Some(expected) = expected_element_size {
                    if expected != Void && (element_size == Bit) != (expected == Bit) {
                        return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                            .context("bit lists are never upgraded to or from other lists"));
                    }

                    //# Verify that the elements are at least as large as
                    //# the expected type. Note that if we expected
                    //# InlineComposite, the expected sizes here will be
                    //# zero, because bounds checking will be performed at
                    //# field access time. So this check here is for the
                    //# case where we expected a list of some primitive or
                    //# pointer type.
                    let expected_data_bits_per_element = data_bits_per_element(expected);
                    let expected_pointers_per_element = pointers_per_element(expected);

                    if expected_data_bits_per_element > data_size
                        || expected_pointers_per_element > pointer_count
                    {
                        return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize));
                    }
                }

                Ok(Some(ListReader {
                    arena,
                    segment_id,
                    ptr: word_to_byte(target),
                    element_count,
                    step,
                    struct_data_size: data_size,
                    struct_pointer_count: pointer_count as u16,
                    element_size,
                    nesting_limit: nesting_limit - 1,
                }))
            }
        }
    }

    /// Resolves a byte list. With `nul_terminated` set, the trailing NUL is dropped and, in
    /// strict mode, required.
    pub fn read_blob_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff_index: WordCount32,
        nul_terminated: bool,
    ) -> Result<Option<&'a [u8]>> {
        let segment = arena.get_segment(segment_id)?;
        let reff = WirePointer::from_word(read_word(segment, reff_index)?);
        if reff.is_null() {
            return Ok(None);
        }

        let (tag, segment_id, target) = follow_fars(arena, reff, reff_index, segment_id)?;
        if tag.kind() != WirePointerKind::List {
            return Err(unexpected(WirePointerKind::List, tag.kind()));
        }
        if tag.list_element_size() != Byte {
            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                .context("expected a list of bytes"));
        }

        let size = tag.list_element_count();
        arena.contains_interval(segment_id, target, u64::from(round_bytes_up_to_words(size)))?;
        let start = word_to_byte(target);
        let bytes = arena
            .get_segment(segment_id)?
            .get(start..start + size as usize)
            .ok_or_else(out_of_bounds)?;

        if !nul_terminated {
            return Ok(Some(bytes));
        }
        match bytes.split_last() {
            Some((&0, text)) => Ok(Some(text)),
            Some((_, text)) if !arena.strict() => Ok(Some(text)),
            None if !arena.strict() => Ok(Some(bytes)),
            _ => Err(Error::from_kind(ErrorKind::TextIsNotNulTerminated)),
        }
    }
}

/// Permissive read policy: malformed pointers read as null unless the arena is strict.
fn tolerate<T>(arena: &dyn ReaderArena, result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(e) if e.is_malformed_pointer() && !arena.strict() => {
            tracing::debug!(error = %e, "reading malformed pointer as null");
            Ok(None)
        }
        other => other,
    }
}

fn bytes_at<'a>(
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    byte_offset: ByteCount,
    len: ByteCount,
) -> Result<&'a [u8]> {
    arena
        .get_segment(segment_id)?
        .get(byte_offset..byte_offset + len)
        .ok_or_else(|| Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer))
}

fn data_field_error(offset: BitCount0, width: BitCount0, size: BitCount32) -> Error {
    Error::from_kind(ErrorKind::DataFieldOutOfBounds {
        offset,
        width,
        size,
    })
}

fn check_data_field<T>(byte_offset: ByteCount, data_size: BitCount32) -> Result<()> {
    let width = bits_per_element::<T>();
    let offset = byte_offset.saturating_mul(BITS_PER_BYTE);
    if offset.saturating_add(width) > data_size as usize {
        Err(data_field_error(offset, width, data_size))
    } else {
        Ok(())
    }
}

fn check_bool_field(bit_offset: BitCount0, data_size: BitCount32) -> Result<()> {
    if bit_offset >= data_size as usize {
        Err(data_field_error(bit_offset, 1, data_size))
    } else {
        Ok(())
    }
}

fn check_pointer_field(index: WirePointerCount, count: WirePointerCount16) -> Result<()> {
    if index >= count as usize {
        Err(Error::from_kind(ErrorKind::PointerFieldOutOfBounds { index, count }))
    } else {
        Ok(())
    }
}

/// Elements of type `T` must fit in the data part of each list element.
fn check_element_width<T: PrimitiveElement>(element_data_size: BitCount32) -> Result<()> {
    if data_bits_per_element(T::element_size()) > element_data_size {
        Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
            .context("element type is wider than the list's elements"))
    } else {
        Ok(())
    }
}

fn check_index(index: ElementCount32, len: ElementCount32) -> Result<()> {
    if index >= len {
        Err(Error::from_kind(ErrorKind::IndexOutOfBounds { index, len }))
    } else {
        Ok(())
    }
}

macro_rules! data_getters {
    ($($name:ident -> $typ:ty),*) => {
        $(
            #[inline]
            pub fn $name(&self, byte_offset: ByteCount) -> Result<$typ> {
                self.get_data_field::<$typ>(byte_offset)
            }
        )*
    };
}

macro_rules! data_setters {
    ($($name:ident($typ:ty)),*) => {
        $(
            #[inline]
            pub fn $name(&mut self, byte_offset: ByteCount, value: $typ) -> Result<()> {
                self.set_data_field::<$typ>(byte_offset, value)
            }
        )*
    };
}

#[derive(Clone, Copy)]
pub struct PointerReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    pointer: Option<WordCount32>,
    nesting_limit: i32,
}

impl<'a> PointerReader<'a> {
    pub fn get_root(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        location: WordCount32,
        nesting_limit: i32,
    ) -> Result<Self> {
        arena.contains_interval(segment_id, location, POINTER_SIZE_IN_WORDS as u64)?;
        Ok(PointerReader {
            arena,
            segment_id,
            pointer: Some(location),
            nesting_limit,
        })
    }

    fn word(&self) -> Result<WirePointer> {
        match self.pointer {
            None => Ok(WirePointer::default()),
            Some(index) => Ok(WirePointer::from_word(read_word(
                self.arena.get_segment(self.segment_id)?,
                index,
            )?)),
        }
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(self.word()?.is_null())
    }

    /// Reads the pointer word as-is, without following it.
    pub fn get_raw(&self) -> Result<WirePointer> {
        self.word()
    }

    /// Resolves a struct. Null reads as `None`, as do malformed pointers unless the message
    /// is read strictly.
    pub fn get_struct(&self) -> Result<Option<StructReader<'a>>> {
        let Some(index) = self.pointer else {
            return Ok(None);
        };
        tolerate(
            self.arena,
            wire_helpers::read_struct_pointer(
                self.arena,
                self.segment_id,
                index,
                self.nesting_limit,
            ),
        )
    }

    /// Like `get_struct()`, but with no tolerance for malformed pointers.
    pub(crate) fn get_struct_strict(&self) -> Result<Option<StructReader<'a>>> {
        match self.pointer {
            None => Ok(None),
            Some(index) => wire_helpers::read_struct_pointer(
                self.arena,
                self.segment_id,
                index,
                self.nesting_limit,
            ),
        }
    }

    /// Resolves a list. `expected_element_size` enables the usual compatibility checks;
    /// `InlineComposite` accepts any list that can be viewed as a struct list.
    pub fn get_list(
        &self,
        expected_element_size: Option<ElementSize>,
    ) -> Result<Option<ListReader<'a>>> {
        let Some(index) = self.pointer else {
            return Ok(None);
        };
        tolerate(
            self.arena,
            wire_helpers::read_list_pointer(
                self.arena,
                self.segment_id,
                index,
                expected_element_size,
                self.nesting_limit,
            ),
        )
    }

    pub fn get_text(&self) -> Result<text::Reader<'a>> {
        let Some(index) = self.pointer else {
            return Ok("");
        };
        let bytes = tolerate(
            self.arena,
            wire_helpers::read_blob_pointer(self.arena, self.segment_id, index, true),
        )?;
        match text::new_reader(bytes.unwrap_or(&[])) {
            Err(e) if !self.arena.strict() => {
                tracing::debug!(error = %e, "reading non-UTF-8 text as empty");
                Ok("")
            }
            other => other,
        }
    }

    pub fn get_data(&self) -> Result<data::Reader<'a>> {
        let Some(index) = self.pointer else {
            return Ok(data::new_reader(&[]));
        };
        let bytes = tolerate(
            self.arena,
            wire_helpers::read_blob_pointer(self.arena, self.segment_id, index, false),
        )?;
        Ok(data::new_reader(bytes.unwrap_or(&[])))
    }
}

#[derive(Clone, Copy)]
pub struct PointerBuilder<'a> {
    arena: &'a dyn BuilderArena,
    segment_id: SegmentId,
    pointer: WordCount32,
}

impl<'a> PointerBuilder<'a> {
    pub fn get_root(
        arena: &'a dyn BuilderArena,
        segment_id: SegmentId,
        location: WordCount32,
    ) -> Self {
        PointerBuilder {
            arena,
            segment_id,
            pointer: location,
        }
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(WirePointer::from_word(self.arena.get_word(self.segment_id, self.pointer)?).is_null())
    }

    pub fn get_raw(&self) -> Result<WirePointer> {
        Ok(WirePointer::from_word(
            self.arena.get_word(self.segment_id, self.pointer)?,
        ))
    }

    /// Allocates a fresh struct and points at it. Whatever the pointer referred to before
    /// stays in the message, unreachable.
    pub fn init_struct(self, size: StructSize) -> Result<StructBuilder<'a>> {
        wire_helpers::init_struct_pointer(self.arena, self.segment_id, self.pointer, size)
    }

    /// Returns the struct already pointed at, or initializes one of `default_size` if the
    /// pointer is null.
    pub fn get_struct(self, default_size: StructSize) -> Result<StructBuilder<'a>> {
        wire_helpers::get_writable_struct_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            default_size,
        )
    }

    pub fn init_list(
        self,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::init_list_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            element_count,
            element_size,
        )
    }

    pub fn init_struct_list(
        self,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::init_struct_list_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            element_count,
            element_size,
        )
    }

    /// Returns the list already pointed at, or `None` if the pointer is null.
    pub fn get_list(
        self,
        expected_element_size: Option<ElementSize>,
    ) -> Result<Option<ListBuilder<'a>>> {
        wire_helpers::get_writable_list_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            expected_element_size,
        )
    }

    /// Like `get_list()`, but a null pointer reads as an empty list.
    pub fn get_list_or_empty(self, expected_element_size: ElementSize) -> Result<ListBuilder<'a>> {
        Ok(match self.get_list(Some(expected_element_size))? {
            Some(list) => list,
            None => ListBuilder {
                arena: self.arena,
                segment_id: self.segment_id,
                ptr: 0,
                element_count: 0,
                step: 0,
                struct_data_size: 0,
                struct_pointer_count: 0,
                element_size: expected_element_size,
            },
        })
    }

    pub fn set_text(&self, value: &str) -> Result<()> {
        wire_helpers::set_blob_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            value.as_bytes(),
            true,
        )
    }

    pub fn get_text(&self) -> Result<String> {
        let bytes = wire_helpers::get_writable_blob_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            true,
        )?;
        String::from_utf8(bytes).map_err(|e| {
            Error::from_kind(ErrorKind::TextContainsNonUtf8Data).context(format!("{e}"))
        })
    }

    pub fn set_data(&self, value: &[u8]) -> Result<()> {
        wire_helpers::set_blob_pointer(self.arena, self.segment_id, self.pointer, value, false)
    }

    pub fn get_data(&self) -> Result<Vec<u8>> {
        wire_helpers::get_writable_blob_pointer(self.arena, self.segment_id, self.pointer, false)
    }

    /// Resets the pointer to null.
    pub fn clear(&self) -> Result<()> {
        self.arena.set_word(self.segment_id, self.pointer, 0)
    }
}

#[derive(Clone, Copy)]
pub struct StructReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    /// Byte offset of the data section within the segment.
    data: ByteCount,
    /// Word index of the pointer section.
    pointers: WordCount32,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
    nesting_limit: i32,
}

impl<'a> StructReader<'a> {
    /// An empty struct that belongs to no message. Every data field is out of bounds.
    pub fn new_default<'b>() -> StructReader<'b> {
        StructReader {
            arena: &NullArena,
            segment_id: 0,
            data: 0,
            pointers: 0,
            data_size: 0,
            pointer_count: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    /// Loads a little-endian value at `byte_offset` from the start of the data section.
    #[inline]
    pub fn get_data_field<T: Primitive>(&self, byte_offset: ByteCount) -> Result<T> {
        check_data_field::<T>(byte_offset, self.data_size)?;
        let bytes = bytes_at(
            self.arena,
            self.segment_id,
            self.data + byte_offset,
            core::mem::size_of::<T>(),
        )?;
        Ok(primitive::read(bytes))
    }

    /// Loads bit `bit_offset % 8` of byte `bit_offset / 8` of the data section.
    #[inline]
    pub fn get_bool(&self, bit_offset: BitCount0) -> Result<bool> {
        check_bool_field(bit_offset, self.data_size)?;
        let byte = bytes_at(
            self.arena,
            self.segment_id,
            self.data + bit_offset / BITS_PER_BYTE,
            1,
        )?[0];
        Ok(byte & (1u8 << (bit_offset % BITS_PER_BYTE)) != 0)
    }

    data_getters!(
        get_i8 -> i8, get_i16 -> i16, get_i32 -> i32, get_i64 -> i64,
        get_u8 -> u8, get_u16 -> u16, get_u32 -> u32, get_u64 -> u64,
        get_f32 -> f32, get_f64 -> f64
    );

    pub fn get_pointer_field(&self, ptr_index: WirePointerCount) -> Result<PointerReader<'a>> {
        check_pointer_field(ptr_index, self.pointer_count)?;
        Ok(PointerReader {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: Some(self.pointers + ptr_index as WordCount32),
            nesting_limit: self.nesting_limit,
        })
    }

    pub fn get_struct(&self, ptr_index: WirePointerCount) -> Result<Option<StructReader<'a>>> {
        self.get_pointer_field(ptr_index)?.get_struct()
    }

    pub fn get_list(
        &self,
        ptr_index: WirePointerCount,
        expected_element_size: ElementSize,
    ) -> Result<Option<ListReader<'a>>> {
        self.get_pointer_field(ptr_index)?
            .get_list(Some(expected_element_size))
    }

    pub fn get_text(&self, ptr_index: WirePointerCount) -> Result<text::Reader<'a>> {
        self.get_pointer_field(ptr_index)?.get_text()
    }

    pub fn get_data(&self, ptr_index: WirePointerCount) -> Result<data::Reader<'a>> {
        self.get_pointer_field(ptr_index)?.get_data()
    }
}

#[derive(Clone, Copy)]
pub struct StructBuilder<'a> {
    arena: &'a dyn BuilderArena,
    segment_id: SegmentId,
    data: ByteCount,
    pointers: WordCount32,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
}

impl<'a> StructBuilder<'a> {
    #[inline]
    pub fn reborrow(&mut self) -> StructBuilder<'_> {
        *self
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    #[inline]
    pub fn set_data_field<T: Primitive>(&mut self, byte_offset: ByteCount, value: T) -> Result<()> {
        check_data_field::<T>(byte_offset, self.data_size)?;
        let mut raw = T::Raw::default();
        T::set(&mut raw, value);
        self.arena
            .write_bytes(self.segment_id, self.data + byte_offset, raw.as_ref())
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, byte_offset: ByteCount) -> Result<T> {
        check_data_field::<T>(byte_offset, self.data_size)?;
        let mut raw = T::Raw::default();
        self.arena
            .read_bytes(self.segment_id, self.data + byte_offset, raw.as_mut())?;
        Ok(T::get(&raw))
    }

    #[inline]
    pub fn set_bool(&mut self, bit_offset: BitCount0, value: bool) -> Result<()> {
        check_bool_field(bit_offset, self.data_size)?;
        let byte_offset = self.data + bit_offset / BITS_PER_BYTE;
        let bitnum = bit_offset % BITS_PER_BYTE;
        let mut byte = [0u8];
        self.arena
            .read_bytes(self.segment_id, byte_offset, &mut byte)?;
        byte[0] = (byte[0] & !(1 << bitnum)) | (u8::from(value) << bitnum);
        self.arena.write_bytes(self.segment_id, byte_offset, &byte)
    }

    #[inline]
    pub fn get_bool(&self, bit_offset: BitCount0) -> Result<bool> {
        check_bool_field(bit_offset, self.data_size)?;
        let mut byte = [0u8];
        self.arena.read_bytes(
            self.segment_id,
            self.data + bit_offset / BITS_PER_BYTE,
            &mut byte,
        )?;
        Ok(byte[0] & (1u8 << (bit_offset % BITS_PER_BYTE)) != 0)
    }

    data_getters!(
        get_i8 -> i8, get_i16 -> i16, get_i32 -> i32, get_i64 -> i64,
        get_u8 -> u8, get_u16 -> u16, get_u32 -> u32, get_u64 -> u64,
        get_f32 -> f32, get_f64 -> f64
    );

    data_setters!(
        set_i8(i8), set_i16(i16), set_i32(i32), set_i64(i64),
        set_u8(u8), set_u16(u16), set_u32(u32), set_u64(u64),
        set_f32(f32), set_f64(f64)
    );

    pub fn get_pointer_field(&self, ptr_index: WirePointerCount) -> Result<PointerBuilder<'a>> {
        check_pointer_field(ptr_index, self.pointer_count)?;
        Ok(PointerBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: self.pointers + ptr_index as WordCount32,
        })
    }

    pub fn init_struct(
        &self,
        ptr_index: WirePointerCount,
        size: StructSize,
    ) -> Result<StructBuilder<'a>> {
        self.get_pointer_field(ptr_index)?.init_struct(size)
    }

    pub fn get_struct(
        &self,
        ptr_index: WirePointerCount,
        default_size: StructSize,
    ) -> Result<StructBuilder<'a>> {
        self.get_pointer_field(ptr_index)?.get_struct(default_size)
    }

    pub fn init_list(
        &self,
        ptr_index: WirePointerCount,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(ptr_index)?.init_list(element_size, element_count)
    }

    pub fn init_struct_list(
        &self,
        ptr_index: WirePointerCount,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(ptr_index)?
            .init_struct_list(element_count, element_size)
    }

    pub fn get_list(
        &self,
        ptr_index: WirePointerCount,
        expected_element_size: ElementSize,
    ) -> Result<Option<ListBuilder<'a>>> {
        self.get_pointer_field(ptr_index)?
            .get_list(Some(expected_element_size))
    }

    pub fn set_text(&mut self, ptr_index: WirePointerCount, value: &str) -> Result<()> {
        self.get_pointer_field(ptr_index)?.set_text(value)
    }

    pub fn get_text(&self, ptr_index: WirePointerCount) -> Result<String> {
        self.get_pointer_field(ptr_index)?.get_text()
    }

    pub fn set_data(&mut self, ptr_index: WirePointerCount, value: &[u8]) -> Result<()> {
        self.get_pointer_field(ptr_index)?.set_data(value)
    }

    pub fn get_data(&self, ptr_index: WirePointerCount) -> Result<Vec<u8>> {
        self.get_pointer_field(ptr_index)?.get_data()
    }
}

#[derive(Clone, Copy)]
pub struct ListReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    /// Byte offset of the first element, past the tag word of a struct list.
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
    nesting_limit: i32,
}

impl<'a> ListReader<'a> {
    pub fn new_default<'b>() -> ListReader<'b> {
        ListReader {
            arena: &NullArena,
            segment_id: 0,
            ptr: 0,
            element_count: 0,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
            element_size: Void,
            nesting_limit: 0x7fffffff,
        }
    }

    /// The number of elements. For struct lists this comes from the tag word, not from the
    /// word count in the list pointer.
    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    fn element_byte(&self, index: ElementCount32) -> ByteCount {
        self.ptr + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as ByteCount
    }

    pub fn get<T: PrimitiveElement>(&self, index: ElementCount32) -> Result<T> {
        check_index(index, self.element_count)?;
        check_element_width::<T>(self.struct_data_size)?;
        T::get(self, index)
    }

    pub fn get_struct_element(&self, index: ElementCount32) -> Result<StructReader<'a>> {
        check_index(index, self.element_count)?;
        let index_byte = self.element_byte(index);
        let struct_pointers =
            (index_byte + self.struct_data_size as usize / BITS_PER_BYTE) / BYTES_PER_WORD;

        Ok(StructReader {
            arena: self.arena,
            segment_id: self.segment_id,
            data: index_byte,
            pointers: struct_pointers as WordCount32,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
            nesting_limit: self.nesting_limit - 1,
        })
    }

    /// The first pointer of element `index`: the element itself in a pointer list.
    pub fn get_pointer_element(&self, index: ElementCount32) -> Result<PointerReader<'a>> {
        check_index(index, self.element_count)?;
        if self.struct_pointer_count == 0 {
            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                .context("list elements have no pointers"));
        }
        let byte = self.element_byte(index) + self.struct_data_size as usize / BITS_PER_BYTE;
        Ok(PointerReader {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: Some((byte / BYTES_PER_WORD) as WordCount32),
            nesting_limit: self.nesting_limit,
        })
    }
}

#[derive(Clone, Copy)]
pub struct ListBuilder<'a> {
    arena: &'a dyn BuilderArena,
    segment_id: SegmentId,
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
}

impl<'a> ListBuilder<'a> {
    #[inline]
    pub fn reborrow(&mut self) -> ListBuilder<'_> {
        *self
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    fn element_byte(&self, index: ElementCount32) -> ByteCount {
        self.ptr + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as ByteCount
    }

    pub fn get<T: PrimitiveElement>(&self, index: ElementCount32) -> Result<T> {
        check_index(index, self.element_count)?;
        check_element_width::<T>(self.struct_data_size)?;
        T::get_from_builder(self, index)
    }

    pub fn set<T: PrimitiveElement>(&mut self, index: ElementCount32, value: T) -> Result<()> {
        check_index(index, self.element_count)?;
        check_element_width::<T>(self.struct_data_size)?;
        T::set(self, index, value)
    }

    pub fn get_struct_element(&self, index: ElementCount32) -> Result<StructBuilder<'a>> {
        check_index(index, self.element_count)?;
        let index_byte = self.element_byte(index);
        let struct_pointers =
            (index_byte + self.struct_data_size as usize / BITS_PER_BYTE) / BYTES_PER_WORD;
        Ok(StructBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            data: index_byte,
            pointers: struct_pointers as WordCount32,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
        })
    }

    pub fn get_pointer_element(&self, index: ElementCount32) -> Result<PointerBuilder<'a>> {
        check_index(index, self.element_count)?;
        if self.struct_pointer_count == 0 {
            return Err(Error::from_kind(ErrorKind::IncompatibleListElementSize)
                .context("list elements have no pointers"));
        }
        let byte = self.element_byte(index) + self.struct_data_size as usize / BITS_PER_BYTE;
        Ok(PointerBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: (byte / BYTES_PER_WORD) as WordCount32,
        })
    }
}

/// A value that can be an element of a primitive list. Indexes are checked by the list
/// before these are called.
pub trait PrimitiveElement: Sized {
    fn get(list_reader: &ListReader, index: ElementCount32) -> Result<Self>;
    fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Result<Self>;
    fn set(list_builder: &ListBuilder, index: ElementCount32, value: Self) -> Result<()>;
    fn element_size() -> ElementSize;
}

macro_rules! primitive_element_impl(
    ($typ:ty, $size:expr) => (
        impl PrimitiveElement for $typ {
            #[inline]
            fn get(list_reader: &ListReader, index: ElementCount32) -> Result<Self> {
                let bytes = bytes_at(
                    list_reader.arena,
                    list_reader.segment_id,
                    list_reader.element_byte(index),
                    core::mem::size_of::<$typ>(),
                )?;
                Ok(primitive::read(bytes))
            }

            #[inline]
            fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Result<Self> {
                let mut raw = <$typ as Primitive>::Raw::default();
                list_builder.arena.read_bytes(
                    list_builder.segment_id,
                    list_builder.element_byte(index),
                    raw.as_mut(),
                )?;
                Ok(<$typ as Primitive>::get(&raw))
            }

            #[inline]
            fn set(list_builder: &ListBuilder, index: ElementCount32, value: Self) -> Result<()> {
                let mut raw = <$typ as Primitive>::Raw::default();
                <$typ as Primitive>::set(&mut raw, value);
                list_builder.arena.write_bytes(
                    list_builder.segment_id,
                    list_builder.element_byte(index),
                    raw.as_ref(),
                )
            }

            fn element_size() -> ElementSize {
                $size
            }
        }
        );
    );

primitive_element_impl!(u8, Byte);
primitive_element_impl!(i8, Byte);
primitive_element_impl!(u16, TwoBytes);
primitive_element_impl!(i16, TwoBytes);
primitive_element_impl!(u32, FourBytes);
primitive_element_impl!(i32, FourBytes);
primitive_element_impl!(u64, EightBytes);
primitive_element_impl!(i64, EightBytes);
primitive_element_impl!(f32, FourBytes);
primitive_element_impl!(f64, EightBytes);

impl PrimitiveElement for bool {
    #[inline]
    fn get(list: &ListReader, index: ElementCount32) -> Result<Self> {
        let bindex = u64::from(index) * u64::from(list.step);
        let b = bytes_at(
            list.arena,
            list.segment_id,
            list.ptr + (bindex / BITS_PER_BYTE as u64) as usize,
            1,
        )?[0];
        Ok((b & (1 << (bindex % BITS_PER_BYTE as u64))) != 0)
    }

    #[inline]
    fn get_from_builder(list: &ListBuilder, index: ElementCount32) -> Result<Self> {
        let bindex = u64::from(index) * u64::from(list.step);
        let mut b = [0u8];
        list.arena.read_bytes(
            list.segment_id,
            list.ptr + (bindex / BITS_PER_BYTE as u64) as usize,
            &mut b,
        )?;
        Ok((b[0] & (1 << (bindex % BITS_PER_BYTE as u64))) != 0)
    }

    #[inline]
    fn set(list: &ListBuilder, index: ElementCount32, value: Self) -> Result<()> {
        let bindex = u64::from(index) * u64::from(list.step);
        let byte_offset = list.ptr + (bindex / BITS_PER_BYTE as u64) as usize;
        let bitnum = bindex % BITS_PER_BYTE as u64;
        let mut b = [0u8];
        list.arena.read_bytes(list.segment_id, byte_offset, &mut b)?;
        b[0] = (b[0] & !(1 << bitnum)) | (u8::from(value) << bitnum);
        list.arena.write_bytes(list.segment_id, byte_offset, &b)
    }

    fn element_size() -> ElementSize {
        Bit
    }
}

impl PrimitiveElement for () {
    #[inline]
    fn get(_list: &ListReader, _index: ElementCount32) -> Result<Self> {
        Ok(())
    }

    #[inline]
    fn get_from_builder(_list: &ListBuilder, _index: ElementCount32) -> Result<Self> {
        Ok(())
    }

    #[inline]
    fn set(_list: &ListBuilder, _index: ElementCount32, _value: ()) -> Result<()> {
        Ok(())
    }

    fn element_size() -> ElementSize {
        Void
    }
}

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


use core::cell::{Cell, Ref, RefCell};

use byteorder::{ByteOrder, LittleEndian};

use crate::message::{AllocationStrategy, BuilderOptions, ReaderOptions, ReaderSegments};
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::segment::Segment;
use crate::{Error, ErrorKind, Result};

pub type SegmentId = u32;

pub trait ReaderArena {
    /// Returns the bytes of segment `id`, a whole number of words.
    fn get_segment(&self, id: SegmentId) -> Result<&[u8]>;

    /// Checks that `size_in_words` words starting at word `start` lie inside segment `id`,
    /// and charges them against the traversal limit.
    fn contains_interval(&self, id: SegmentId, start: WordCount32, size_in_words: u64)
        -> Result<()>;

    /// Charges reads that cost nothing on the wire, such as elements of a void list.
    fn amplified_read(&self, virtual_amount: u64) -> Result<()>;

    fn nesting_limit(&self) -> i32;

    /// Whether malformed pointers are errors rather than null.
    fn strict(&self) -> bool;
}

/// Reads a little-endian word out of `segment`.
pub fn read_word(segment: &[u8], index: WordCount32) -> Result<u64> {
    let start = word_to_byte(index);
    match segment.get(start..start + BYTES_PER_WORD) {
        Some(bytes) => Ok(LittleEndian::read_u64(bytes)),
        None => Err(Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer)),
    }
}

pub struct ReaderArenaImpl<S> {
    segments: S,
    read_limiter: ReadLimiter,
    nesting_limit: i32,
    strict: bool,
}

impl<S> ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        let limiter = ReadLimiter::new(options.traversal_limit_in_words);
        Self {
            segments,
            read_limiter: limiter,
            nesting_limit: options.nesting_limit,
            strict: options.strict_pointers,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn into_segments(self) -> S {
        self.segments
    }

    pub fn segments(&self) -> &S {
        &self.segments
    }
}

impl<S> ReaderArena for ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    fn get_segment(&self, id: SegmentId) -> Result<&[u8]> {
        match self.segments.get_segment(id) {
            Some(seg) => Ok(seg),
            None => Err(Error::from_kind(ErrorKind::InvalidSegmentId(id))),
        }
    }

    fn contains_interval(
        &self,
        id: SegmentId,
        start: WordCount32,
        size_in_words: u64,
    ) -> Result<()> {
        let segment = self.get_segment(id)?;
        let segment_words = (segment.len() / BYTES_PER_WORD) as u64;
        if u64::from(start) + size_in_words > segment_words {
            Err(Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer).context(format!(
                "words {start}..{} of segment {id}, which has {segment_words} words",
                u64::from(start) + size_in_words
            )))
        } else {
            self.read_limiter.can_read(size_in_words as usize)
        }
    }

    fn amplified_read(&self, virtual_amount: u64) -> Result<()> {
        self.read_limiter.can_read(virtual_amount as usize)
    }

    fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }

    fn strict(&self) -> bool {
        self.strict
    }
}

/// Backs readers that do not belong to any message, such as the default struct returned for
/// a null root.
pub struct NullArena;

impl ReaderArena for NullArena {
    fn get_segment(&self, _id: SegmentId) -> Result<&[u8]> {
        Err(Error::from_kind(ErrorKind::TriedToReadFromNullArena))
    }

    fn contains_interval(&self, _id: SegmentId, _start: WordCount32, size: u64) -> Result<()> {
        if size == 0 {
            Ok(())
        } else {
            Err(Error::from_kind(ErrorKind::TriedToReadFromNullArena))
        }
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }

    fn strict(&self) -> bool {
        false
    }
}

/// Segment memory that builder views write through. Views hold a shared reference, so
/// every method takes `&self`.
pub trait BuilderArena {
    /// Bump-allocates `amount` words in segment `segment_id`, or returns `None` if that
    /// segment has reached its size limit.
    fn allocate(&self, segment_id: SegmentId, amount: WordCount32) -> Option<WordCount32>;

    /// Allocates `amount` contiguous words in whichever segment has room, opening a new
    /// segment if none does.
    fn allocate_anywhere(&self, amount: WordCount32) -> (SegmentId, WordCount32);

    fn get_word(&self, segment_id: SegmentId, index: WordCount32) -> Result<u64>;
    fn set_word(&self, segment_id: SegmentId, index: WordCount32, value: u64) -> Result<()>;

    /// Fills `buf` from the bytes at `byte_offset`.
    fn read_bytes(&self, segment_id: SegmentId, byte_offset: ByteCount, buf: &mut [u8])
        -> Result<()>;
    fn write_bytes(&self, segment_id: SegmentId, byte_offset: ByteCount, bytes: &[u8])
        -> Result<()>;

    fn len(&self) -> usize;
}

pub struct BuilderArenaImpl {
    segments: RefCell<Vec<Segment>>,
    /// Size each segment was opened with. Only enforced when `max_segment_words` is set.
    segment_limits: RefCell<Vec<WordCount32>>,
    next_size: Cell<WordCount32>,
    allocation_strategy: AllocationStrategy,
    max_segment_words: Option<WordCount32>,
}

impl BuilderArenaImpl {
    pub fn new(options: BuilderOptions) -> Self {
        let mut first = options.first_segment_words.max(1);
        if let Some(max) = options.max_segment_words {
            first = first.min(max.max(1));
        }
        Self {
            segments: RefCell::new(vec![Segment::new(first)]),
            segment_limits: RefCell::new(vec![first]),
            next_size: Cell::new(first),
            allocation_strategy: options.allocation_strategy,
            max_segment_words: options.max_segment_words,
        }
    }

    /// Borrows every segment for serialization. Panics if called while another borrow of the
    /// segment list is alive, which builder views never hold across calls.
    pub fn segments(&self) -> Ref<'_, Vec<Segment>> {
        self.segments.borrow()
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments.into_inner()
    }

    fn segment_error(id: SegmentId) -> Error {
        Error::from_kind(ErrorKind::InvalidSegmentId(id))
    }

    /// Opens a new segment with room for at least `minimum_size` words.
    fn allocate_segment(&self, minimum_size: WordCount32) -> SegmentId {
        let size = minimum_size.max(self.next_size.get());
        if let AllocationStrategy::GrowHeuristically = self.allocation_strategy {
            let grown = self.next_size.get().saturating_add(size);
            self.next_size.set(match self.max_segment_words {
                Some(max) => grown.min(max),
                None => grown,
            });
        }
        let mut segments = self.segments.borrow_mut();
        segments.push(Segment::new(size));
        self.segment_limits.borrow_mut().push(size);
        let id = (segments.len() - 1) as SegmentId;
        tracing::trace!(segment_id = id, words = size, "opened new segment");
        id
    }
}

impl BuilderArena for BuilderArenaImpl {
    fn allocate(&self, segment_id: SegmentId, amount: WordCount32) -> Option<WordCount32> {
        let mut segments = self.segments.borrow_mut();
        let segment = segments.get_mut(segment_id as usize)?;
        match self.max_segment_words {
            None => Some(segment.allocate(amount)),
            Some(_) => {
                // A segment opened for a single oversized object is as large as that object.
                let limit = *self.segment_limits.borrow().get(segment_id as usize)?;
                segment.try_allocate(amount, limit)
            }
        }
    }

    fn allocate_anywhere(&self, amount: WordCount32) -> (SegmentId, WordCount32) {
        // First try the existing segments, then try allocating a new segment.
        let allocated_len = self.len() as SegmentId;
        for segment_id in 0..allocated_len {
            if let Some(idx) = self.allocate(segment_id, amount) {
                return (segment_id, idx);
            }
        }

        let segment_id = self.allocate_segment(amount);
        let idx = self.segments.borrow_mut()[segment_id as usize].allocate(amount);
        (segment_id, idx)
    }

    fn get_word(&self, segment_id: SegmentId, index: WordCount32) -> Result<u64> {
        match self.segments.borrow().get(segment_id as usize) {
            Some(segment) => segment.read_word(index),
            None => Err(Self::segment_error(segment_id)),
        }
    }

    fn set_word(&self, segment_id: SegmentId, index: WordCount32, value: u64) -> Result<()> {
        match self.segments.borrow_mut().get_mut(segment_id as usize) {
            Some(segment) => segment.write_word(index, value),
            None => Err(Self::segment_error(segment_id)),
        }
    }

    fn read_bytes(
        &self,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        buf: &mut [u8],
    ) -> Result<()> {
        match self.segments.borrow().get(segment_id as usize) {
            Some(segment) => {
                buf.copy_from_slice(segment.bytes(byte_offset, buf.len())?);
                Ok(())
            }
            None => Err(Self::segment_error(segment_id)),
        }
    }

    fn write_bytes(
        &self,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        bytes: &[u8],
    ) -> Result<()> {
        match self.segments.borrow_mut().get_mut(segment_id as usize) {
            Some(segment) => {
                segment.bytes_mut(byte_offset, bytes.len())?.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(Self::segment_error(segment_id)),
        }
    }

    fn len(&self) -> usize {
        self.segments.borrow().len()
    }
}

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


//! A single word-addressed arena of message memory.

use byteorder::{ByteOrder, LittleEndian};

use crate::private::units::{word_to_byte, WordCount32, BYTES_PER_WORD};
use crate::{Error, ErrorKind, Result};

/// A growable buffer of 8-byte words with a bump allocator.
///
/// Words are handed out in order and never reclaimed. When an allocation does not fit,
/// the backing buffer doubles (as many times as needed) and the old contents are moved;
/// code that needs to refer to a word keeps its index, never a reference into the buffer.
#[derive(Clone, Debug, Default)]
pub struct Segment {
    /// Backing memory. Its length is the capacity; bytes past the allocated words are zero.
    bytes: Vec<u8>,

    /// Number of words already handed out.
    allocated: WordCount32,
}

impl Segment {
    /// Creates an empty segment with room for `capacity_words` words before it needs to grow.
    pub fn new(capacity_words: WordCount32) -> Self {
        Self {
            bytes: vec![0; word_to_byte(capacity_words)],
            allocated: 0,
        }
    }

    /// Wraps existing memory. Every whole word of `bytes` counts as allocated; a trailing
    /// partial word is ignored.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        let words = bytes.len() / BYTES_PER_WORD;
        bytes.truncate(words * BYTES_PER_WORD);
        Self {
            bytes,
            allocated: words as WordCount32,
        }
    }

    /// Number of words handed out so far.
    pub fn len_words(&self) -> WordCount32 {
        self.allocated
    }

    /// Number of words that fit before the next growth.
    pub fn capacity_words(&self) -> WordCount32 {
        (self.bytes.len() / BYTES_PER_WORD) as WordCount32
    }

    /// Reserves `words` contiguous words and returns the index of the first one.
    /// The new words are zeroed.
    pub fn allocate(&mut self, words: WordCount32) -> WordCount32 {
        let result = self.allocated;
        let needed = result
            .checked_add(words)
            .expect("segment size overflows a 32-bit word count");
        self.ensure_capacity(needed);
        self.allocated = needed;
        result
    }

    /// Like `allocate()`, but refuses to let the segment grow past `limit` words.
    pub fn try_allocate(&mut self, words: WordCount32, limit: WordCount32) -> Option<WordCount32> {
        match self.allocated.checked_add(words) {
            Some(needed) if needed <= limit => Some(self.allocate(words)),
            _ => None,
        }
    }

    fn ensure_capacity(&mut self, words: WordCount32) {
        let capacity = self.capacity_words();
        if words <= capacity {
            return;
        }
        let mut new_capacity = capacity.max(1);
        while new_capacity < words {
            new_capacity = new_capacity.saturating_mul(2);
        }
        self.bytes.resize(word_to_byte(new_capacity), 0);
    }

    /// Reads the little-endian word at `index`.
    pub fn read_word(&self, index: WordCount32) -> Result<u64> {
        let start = self.check_range(word_to_byte(index), BYTES_PER_WORD)?;
        Ok(LittleEndian::read_u64(&self.bytes[start..start + BYTES_PER_WORD]))
    }

    /// Overwrites the word at `index`.
    pub fn write_word(&mut self, index: WordCount32, value: u64) -> Result<()> {
        let start = self.check_range(word_to_byte(index), BYTES_PER_WORD)?;
        LittleEndian::write_u64(&mut self.bytes[start..start + BYTES_PER_WORD], value);
        Ok(())
    }

    /// Borrows `len` allocated bytes starting at `byte_offset`.
    pub fn bytes(&self, byte_offset: usize, len: usize) -> Result<&[u8]> {
        let start = self.check_range(byte_offset, len)?;
        Ok(&self.bytes[start..start + len])
    }

    /// Mutably borrows `len` allocated bytes starting at `byte_offset`.
    pub fn bytes_mut(&mut self, byte_offset: usize, len: usize) -> Result<&mut [u8]> {
        let start = self.check_range(byte_offset, len)?;
        Ok(&mut self.bytes[start..start + len])
    }

    /// The allocated portion of the segment, `len_words() * 8` bytes long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..word_to_byte(self.allocated)]
    }

    /// Consumes the segment, returning exactly its allocated bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.bytes.truncate(word_to_byte(self.allocated));
        self.bytes
    }

    fn check_range(&self, start: usize, len: usize) -> Result<usize> {
        match start.checked_add(len) {
            Some(end) if end <= word_to_byte(self.allocated) => Ok(start),
            _ => Err(Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer).context(
                format!(
                    "bytes {start}..{} outside segment of {} words",
                    start.saturating_add(len),
                    self.allocated
                ),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Segment;

    #[test]
    fn bump_allocation_is_monotonic() {
        let mut segment = Segment::new(2);
        assert_eq!(segment.allocate(1), 0);
        assert_eq!(segment.allocate(3), 1);
        assert_eq!(segment.allocate(0), 4);
        assert_eq!(segment.len_words(), 4);
        assert_eq!(segment.as_bytes().len(), 32);
    }

    #[test]
    fn growth_doubles_until_request_fits() {
        let mut segment = Segment::new(1);
        segment.allocate(1);
        assert_eq!(segment.capacity_words(), 1);
        segment.allocate(1);
        assert_eq!(segment.capacity_words(), 2);
        segment.allocate(5);
        assert_eq!(segment.capacity_words(), 8);

        let mut empty = Segment::new(0);
        assert_eq!(empty.allocate(3), 0);
        assert_eq!(empty.capacity_words(), 4);
    }

    #[test]
    fn words_survive_growth() {
        let mut segment = Segment::new(1);
        let first = segment.allocate(1);
        segment.write_word(first, 0x0123_4567_89ab_cdef).unwrap();
        segment.allocate(100);
        assert_eq!(segment.read_word(first).unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(&segment.as_bytes()[..2], &[0xef, 0xcd]);
        assert_eq!(segment.read_word(50).unwrap(), 0);
    }

    #[test]
    fn out_of_range_word_access_fails() {
        let mut segment = Segment::new(16);
        segment.allocate(2);
        assert!(segment.read_word(2).is_err());
        assert!(segment.write_word(7, 1).is_err());
        assert!(segment.bytes(12, 5).is_err());
        assert!(segment.bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn try_allocate_respects_limit() {
        let mut segment = Segment::new(4);
        assert_eq!(segment.try_allocate(3, 4), Some(0));
        assert_eq!(segment.try_allocate(2, 4), None);
        assert_eq!(segment.try_allocate(1, 4), Some(3));
    }

    #[test]
    fn from_bytes_wraps_whole_words() {
        let segment = Segment::from_bytes(vec![1, 0, 0, 0, 0, 0, 0, 0, 9, 9, 9]);
        assert_eq!(segment.len_words(), 1);
        assert_eq!(segment.read_word(0).unwrap(), 1);
        assert_eq!(segment.into_bytes().len(), 8);
    }
}

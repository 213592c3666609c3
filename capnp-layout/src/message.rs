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


//! Untyped root container for a Cap'n Proto message.

use core::cell::{Cell, Ref};

use crate::private::arena::{BuilderArenaImpl, ReaderArena, ReaderArenaImpl};
use crate::private::layout::{
    PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize,
};
use crate::segment::Segment;
use crate::{Error, ErrorKind, Result};

/// Options controlling how data is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Limits how many total words of data are allowed to be traversed. Traversal is counted when
    /// a new struct or list reader is obtained, e.g. from a get() accessor. This means that calling
    /// the getter for the same sub-struct multiple times will cause it to be double-counted. Once
    /// the traversal limit is reached, an error will be reported.
    ///
    /// This limit exists for security reasons. It is possible for an attacker to construct a
    /// message in which multiple pointers point at the same location. Using such a message, an
    /// attacker could cause a message which is small on the wire to appear much larger when
    /// actually traversed.
    pub traversal_limit_in_words: u64,

    /// Limits how deeply nested a message structure can be, e.g. structs containing other
    /// structs or lists of structs. Cyclic messages hit this limit instead of recursing forever.
    pub nesting_limit: i32,

    /// When set, a pointer whose kind or element size does not fit the role it is read in is an
    /// error. Otherwise it reads as null, an empty string or empty data.
    pub strict_pointers: bool,
}

pub const DEFAULT_READER_OPTIONS: ReaderOptions = ReaderOptions {
    traversal_limit_in_words: 8 * 1024 * 1024,
    nesting_limit: 256,
    strict_pointers: false,
};

impl Default for ReaderOptions {
    fn default() -> Self {
        DEFAULT_READER_OPTIONS
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        DEFAULT_READER_OPTIONS
    }

    pub fn nesting_limit(&mut self, value: i32) -> &mut Self {
        self.nesting_limit = value;
        self
    }

    pub fn traversal_limit_in_words(&mut self, value: u64) -> &mut Self {
        self.traversal_limit_in_words = value;
        self
    }

    pub fn strict_pointers(&mut self, value: bool) -> &mut Self {
        self.strict_pointers = value;
        self
    }
}

/// An object that manages the buffers underlying a Cap'n Proto message reader.
pub trait ReaderSegments {
    /// Gets the segment with index `idx`. Returns `None` if `idx` is out of range.
    fn get_segment(&self, idx: u32) -> Option<&[u8]>;

    /// Gets the number of segments.
    fn len(&self) -> usize {
        let mut i = 0;
        while self.get_segment(i).is_some() {
            i += 1;
        }
        i as usize
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> ReaderSegments for &S
where
    S: ReaderSegments + ?Sized,
{
    fn get_segment(&self, idx: u32) -> Option<&[u8]> {
        (**self).get_segment(idx)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// An array of segments.
pub struct SegmentArray<'a> {
    segments: &'a [&'a [u8]],
}

impl<'a> SegmentArray<'a> {
    pub fn new(segments: &'a [&'a [u8]]) -> Self {
        Self { segments }
    }
}

impl ReaderSegments for SegmentArray<'_> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segments.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

impl ReaderSegments for [&[u8]] {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        <[&[u8]]>::len(self)
    }
}

impl ReaderSegments for Vec<Segment> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.get(id as usize).map(Segment::as_bytes)
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// A container used to read a message.
pub struct Reader<S>
where
    S: ReaderSegments,
{
    arena: ReaderArenaImpl<S>,
}

impl<S> Reader<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        Self {
            arena: ReaderArenaImpl::new(segments, options),
        }
    }

    /// Number of segments the message was parsed into. Zero for empty or truncated input.
    pub fn segment_count(&self) -> usize {
        self.arena.len()
    }

    pub fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.arena.segments().get_segment(id)
    }

    /// The root pointer, word 0 of segment 0.
    pub fn get_root_pointer(&self) -> Result<PointerReader<'_>> {
        if self.arena.len() == 0 {
            return Err(Error::from_kind(ErrorKind::EmptyMessage));
        }
        PointerReader::get_root(&self.arena, 0, 0, self.arena.nesting_limit())
    }

    /// Decodes the root pointer as a struct. A null root reads as an empty struct.
    pub fn get_root(&self) -> Result<StructReader<'_>> {
        match self.get_root_pointer()?.get_struct_strict() {
            Ok(Some(root)) => Ok(root),
            Ok(None) => Ok(StructReader::new_default()),
            Err(e) if e.is_malformed_pointer() => {
                Err(Error::from_kind(ErrorKind::RootIsNotAStruct).context(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub fn into_segments(self) -> S {
        self.arena.into_segments()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Allocates the same number of words for each segment, to the extent possible.
    FixedSize,

    /// Increases segment size by a multiplicative factor for each subsequent segment.
    GrowHeuristically,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;
pub const SUGGESTED_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::GrowHeuristically;

/// Options controlling how a message::Builder lays out its segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Initial capacity of segment 0, in words.
    pub first_segment_words: u32,

    /// How the size of each further segment is chosen.
    pub allocation_strategy: AllocationStrategy,

    /// Upper bound on the size of a segment. `None` keeps the whole message in segment 0,
    /// which grows as needed. With a bound, objects that do not fit go to a new segment and
    /// are reached through far pointers.
    pub max_segment_words: Option<u32>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self {
            first_segment_words: SUGGESTED_FIRST_SEGMENT_WORDS,
            allocation_strategy: SUGGESTED_ALLOCATION_STRATEGY,
            max_segment_words: None,
        }
    }

    pub fn first_segment_words(mut self, value: u32) -> Self {
        self.first_segment_words = value;
        self
    }

    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> Self {
        self.allocation_strategy = value;
        self
    }

    pub fn max_segment_words(mut self, value: Option<u32>) -> Self {
        self.max_segment_words = value;
        self
    }
}

/// The allocated portion of each segment of a message::Builder, borrowed for output.
pub struct OutputSegments<'a> {
    segments: Ref<'a, Vec<Segment>>,
}

impl OutputSegments<'_> {
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(Segment::as_bytes)
    }
}

impl ReaderSegments for OutputSegments<'_> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segments.get(id as usize).map(Segment::as_bytes)
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

/// A container used to build a message.
///
/// Segment 0 starts with the root pointer. All views handed out by a builder write straight
/// into its segments, so bytes produced by `to_bytes()` reflect every change made so far.
pub struct Builder {
    arena: BuilderArenaImpl,
    root_initialized: Cell<bool>,
}

impl Builder {
    pub fn new(options: BuilderOptions) -> Self {
        use crate::private::arena::BuilderArena;

        let arena = BuilderArenaImpl::new(options);
        arena.allocate(0, 1).expect("allocate root pointer");
        Self {
            arena,
            root_initialized: Cell::new(false),
        }
    }

    pub fn new_default() -> Self {
        Self::new(BuilderOptions::new())
    }

    fn root_pointer(&self) -> PointerBuilder<'_> {
        PointerBuilder::get_root(&self.arena, 0, 0)
    }

    /// Allocates the root struct and points word 0 of segment 0 at it. Fails if the root was
    /// already initialized.
    pub fn init_root(&self, size: StructSize) -> Result<StructBuilder<'_>> {
        if self.root_initialized.get() {
            return Err(Error::from_kind(ErrorKind::RootAlreadyInitialized));
        }
        let root = self.root_pointer().init_struct(size)?;
        self.root_initialized.set(true);
        tracing::debug!(data_words = size.data, pointers = size.pointers, "initialized root");
        Ok(root)
    }

    pub fn get_root(&self) -> Result<StructBuilder<'_>> {
        if !self.root_initialized.get() {
            return Err(Error::from_kind(ErrorKind::RootNotInitialized));
        }
        self.root_pointer().get_struct(StructSize::new(0, 0))
    }

    /// Borrows the segments for output. Builder views must not write while the result is alive.
    pub fn get_segments_for_output(&self) -> OutputSegments<'_> {
        OutputSegments {
            segments: self.arena.segments(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.arena.segments().len()
    }

    /// Total allocated words across all segments, not counting the segment table.
    pub fn size_in_words(&self) -> usize {
        self.arena
            .segments()
            .iter()
            .map(|s| s.len_words() as usize)
            .sum()
    }

    /// Serializes the message with its segment table. Can be called any number of times.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::serialize::write_message_to_bytes(self)
    }

    /// Turns the builder into a reader over the same segment memory.
    pub fn into_reader(self) -> Reader<Vec<Segment>> {
        Reader::new(self.arena.into_segments(), ReaderOptions::new())
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.arena.into_segments()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new_default()
    }
}

#[cfg(test)]
mod test {
    use super::{Builder, BuilderOptions, Reader, ReaderOptions, SegmentArray};
    use crate::{ErrorKind, StructSize};

    #[test]
    fn root_is_initialized_once() {
        let message = Builder::new_default();
        assert_eq!(
            message.get_root().err().map(|e| e.kind),
            Some(ErrorKind::RootNotInitialized)
        );
        let mut root = message.init_root(StructSize::new(1, 0)).unwrap();
        root.set_u32(0, 7).unwrap();
        assert_eq!(
            message.init_root(StructSize::new(1, 0)).err().map(|e| e.kind),
            Some(ErrorKind::RootAlreadyInitialized)
        );
        assert_eq!(message.get_root().unwrap().get_u32(0).unwrap(), 7);
        assert_eq!(message.size_in_words(), 2);
    }

    #[test]
    fn empty_message_has_no_root() {
        let segments: &[&[u8]] = &[];
        let message = Reader::new(SegmentArray::new(segments), ReaderOptions::new());
        assert_eq!(message.segment_count(), 0);
        assert_eq!(
            message.get_root().err().map(|e| e.kind),
            Some(ErrorKind::EmptyMessage)
        );
    }

    #[test]
    fn null_root_reads_as_empty_struct() {
        let segment = [0u8; 8];
        let segments: &[&[u8]] = &[&segment];
        let message = Reader::new(SegmentArray::new(segments), ReaderOptions::new());
        let root = message.get_root().unwrap();
        assert_eq!(root.get_data_section_size(), 0);
        assert_eq!(root.get_pointer_section_size(), 0);
    }

    #[test]
    fn list_root_is_rejected() {
        // A list pointer of zero bytes.
        let segment = [0x01, 0, 0, 0, 0x02, 0, 0, 0];
        let segments: &[&[u8]] = &[&segment];
        let message = Reader::new(SegmentArray::new(segments), ReaderOptions::new());
        assert_eq!(
            message.get_root().err().map(|e| e.kind),
            Some(ErrorKind::RootIsNotAStruct)
        );
    }

    #[test]
    fn into_reader_keeps_segments() {
        let message = Builder::new(BuilderOptions::new().first_segment_words(1));
        let mut root = message.init_root(StructSize::new(2, 0)).unwrap();
        root.set_i64(8, -5).unwrap();
        let reader = message.into_reader();
        assert_eq!(reader.segment_count(), 1);
        assert_eq!(reader.get_root().unwrap().get_i64(8).unwrap(), -5);
    }
}

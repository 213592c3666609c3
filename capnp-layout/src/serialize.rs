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


//! Reading and writing of messages using the
//! [standard stream framing](https://capnproto.org/encoding.html#serialization-over-a-stream).
//!
//! Reading is lenient: input too short for its header reads as a message with no segments,
//! and segments that do not fit in the input are dropped. Neither is an error.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::message;
use crate::message::ReaderSegments;
use crate::private::units::BYTES_PER_WORD;
use crate::Result;

/// Segments read from a single flat slice of bytes.
pub struct SliceSegments<'a> {
    bytes: &'a [u8],
    segment_slices: Vec<(usize, usize)>,
}

impl ReaderSegments for SliceSegments<'_> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        let (a, b) = *self.segment_slices.get(id as usize)?;
        Some(&self.bytes[a..b])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a serialized message from a slice of bytes without copying it.
pub fn read_message_from_bytes(
    bytes: &[u8],
    options: message::ReaderOptions,
) -> message::Reader<SliceSegments<'_>> {
    let segment_slices = read_segment_table(bytes);
    message::Reader::new(
        SliceSegments {
            bytes,
            segment_slices,
        },
        options,
    )
}

pub struct OwnedSegments {
    segment_slices: Vec<(usize, usize)>,
    owned_space: Vec<u8>,
}

impl ReaderSegments for OwnedSegments {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        let (a, b) = *self.segment_slices.get(id as usize)?;
        Some(&self.owned_space[a..b])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads `read` to its end and parses the result as a message.
///
/// For optimal performance, `read` should be a buffered reader type.
pub fn read_message<R>(
    mut read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<OwnedSegments>>
where
    R: Read,
{
    let mut owned_space = Vec::new();
    read.read_to_end(&mut owned_space)?;
    let segment_slices = read_segment_table(&owned_space);
    Ok(message::Reader::new(
        OwnedSegments {
            segment_slices,
            owned_space,
        },
        options,
    ))
}

/// Number of words taken by the table for `segment_count` segments, padding included.
fn segment_table_words(segment_count: u64) -> u64 {
    segment_count / 2 + 1
}

/// Parses the segment table at the start of `bytes` and returns the byte range of every
/// segment that fits in `bytes`.
///
/// The segment table format for streams is defined in the Cap'n Proto
/// [encoding spec](https://capnproto.org/encoding.html)
fn read_segment_table(bytes: &[u8]) -> Vec<(usize, usize)> {
    if bytes.len() < BYTES_PER_WORD {
        tracing::debug!(len = bytes.len(), "message is shorter than its header");
        return Vec::new();
    }

    let segment_count = u64::from(LittleEndian::read_u32(&bytes[0..4])) + 1;
    let table_bytes = segment_table_words(segment_count) * BYTES_PER_WORD as u64;
    if table_bytes > bytes.len() as u64 {
        tracing::debug!(
            segment_count,
            len = bytes.len(),
            "segment table does not fit in message"
        );
        return Vec::new();
    }

    let mut segment_slices = Vec::with_capacity(segment_count as usize);
    let mut start = table_bytes as usize;
    for idx in 0..segment_count as usize {
        let entry = 4 * (idx + 1);
        let words = LittleEndian::read_u32(&bytes[entry..entry + 4]) as usize;
        let end = words
            .checked_mul(BYTES_PER_WORD)
            .and_then(|len| start.checked_add(len));
        match end {
            Some(end) if end <= bytes.len() => {
                segment_slices.push((start, end));
                start = end;
            }
            _ => {
                tracing::debug!(
                    segment_count,
                    kept = idx,
                    "segment data truncated; dropping remaining segments"
                );
                break;
            }
        }
    }
    segment_slices
}

/// Encodes the segment table for `segments`. A message with no segments is written as a
/// single empty segment.
fn write_segment_table<R>(segments: &R) -> Vec<u8>
where
    R: ReaderSegments + ?Sized,
{
    let segment_count = segments.len().max(1);
    let mut table = vec![0; segment_table_words(segment_count as u64) as usize * BYTES_PER_WORD];
    LittleEndian::write_u32(&mut table[0..4], segment_count as u32 - 1);
    for idx in 0..segment_count {
        let words = segments
            .get_segment(idx as u32)
            .map_or(0, |segment| segment.len() / BYTES_PER_WORD);
        let entry = 4 * (idx + 1);
        LittleEndian::write_u32(&mut table[entry..entry + 4], words as u32);
    }
    table
}

/// Constructs a flat vector containing the entire message.
pub fn write_message_to_bytes(message: &message::Builder) -> Vec<u8> {
    flatten_segments(&message.get_segments_for_output())
}

pub fn write_message_segments_to_bytes<R>(segments: &R) -> Vec<u8>
where
    R: ReaderSegments + ?Sized,
{
    flatten_segments(segments)
}

fn flatten_segments<R: ReaderSegments + ?Sized>(segments: &R) -> Vec<u8> {
    let mut result = Vec::with_capacity(compute_serialized_size(segments) * BYTES_PER_WORD);
    result.extend_from_slice(&write_segment_table(segments));
    for i in 0..segments.len() {
        if let Some(segment) = segments.get_segment(i as u32) {
            result.extend_from_slice(segment);
        }
    }
    result
}

/// Writes the provided message to `write`.
///
/// For optimal performance, `write` should be a buffered writer. `flush` will not be called on
/// the writer.
pub fn write_message<W>(write: W, message: &message::Builder) -> std::io::Result<()>
where
    W: Write,
{
    write_message_segments(write, &message.get_segments_for_output())
}

pub fn write_message_segments<W, R>(mut write: W, segments: &R) -> std::io::Result<()>
where
    W: Write,
    R: ReaderSegments + ?Sized,
{
    write.write_all(&write_segment_table(segments))?;
    for i in 0..segments.len() {
        if let Some(segment) = segments.get_segment(i as u32) {
            write.write_all(segment)?;
        }
    }
    Ok(())
}

fn compute_serialized_size<R: ReaderSegments + ?Sized>(segments: &R) -> usize {
    let len = segments.len();
    let mut size = segment_table_words(len.max(1) as u64) as usize;
    for i in 0..len {
        if let Some(segment) = segments.get_segment(i as u32) {
            size += segment.len() / BYTES_PER_WORD;
        }
    }
    size
}

/// Returns the number of words required to serialize the message.
pub fn compute_serialized_size_in_words(message: &message::Builder) -> usize {
    compute_serialized_size(&message.get_segments_for_output())
}

#[cfg(test)]
pub mod test {
    use quickcheck::{quickcheck, TestResult};

    use super::{
        compute_serialized_size, flatten_segments, read_message, read_message_from_bytes,
        read_segment_table, write_message_segments, write_segment_table,
    };
    use crate::message::{self, ReaderSegments};

    fn to_bytes(segment: &[u64]) -> Vec<u8> {
        segment.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    #[test]
    #[rustfmt::skip]
    fn test_read_segment_table() {
        let mut buf = vec![];

        buf.extend([0,0,0,0, // 1 segments
                    0,0,0,0]); // 0 length
        assert_eq!(vec![(8, 8)], read_segment_table(&buf));
        buf.clear();

        buf.extend([0,0,0,0, // 1 segments
                    1,0,0,0]); // 1 length
        buf.extend([0; 8]);
        assert_eq!(vec![(8, 16)], read_segment_table(&buf));
        buf.clear();

        buf.extend([1,0,0,0, // 2 segments
                    1,0,0,0, // 1 length
                    1,0,0,0, // 1 length
                    0,0,0,0]); // padding
        buf.extend([0; 16]);
        assert_eq!(vec![(16, 24), (24, 32)], read_segment_table(&buf));
        buf.clear();

        buf.extend([3,0,0,0,  // 4 segments
                    77,0,0,0, // 77 length
                    23,0,0,0, // 23 length
                    1,0,0,0,  // 1 length
                    99,0,0,0, // 99 length
                    0,0,0,0]); // padding
        buf.extend([0; 200 * 8]);
        assert_eq!(
            vec![(24, 640), (640, 824), (824, 832), (832, 1624)],
            read_segment_table(&buf)
        );
        buf.clear();
    }

    #[test]
    fn short_input_has_no_segments() {
        assert!(read_segment_table(&[]).is_empty());
        assert!(read_segment_table(&[0, 0, 0, 0]).is_empty());
        let message =
            read_message_from_bytes(&[0, 0, 0, 0, 0, 0, 0], message::ReaderOptions::new());
        assert_eq!(message.segment_count(), 0);
    }

    #[test]
    fn oversized_table_has_no_segments() {
        let mut buf = vec![];
        buf.extend([0, 2, 0, 0]); // 513 segments
        buf.extend([0; 12]);
        assert!(read_segment_table(&buf).is_empty());

        // u32::MAX + 1 segments.
        buf.clear();
        buf.extend([255, 255, 255, 255, 0, 0, 0, 0]);
        assert!(read_segment_table(&buf).is_empty());
    }

    #[test]
    #[rustfmt::skip]
    fn truncated_segments_are_dropped() {
        let mut buf = vec![];
        buf.extend([2,0,0,0, // 3 segments
                    1,0,0,0, // 1 length
                    2,0,0,0, // 2 length
                    1,0,0,0]); // 1 length
        buf.extend([0; 8 * 2]);
        // Only the first segment is complete.
        assert_eq!(vec![(16, 24)], read_segment_table(&buf));
        buf.extend([0; 8]);
        assert_eq!(vec![(16, 24), (24, 40)], read_segment_table(&buf));
    }

    #[test]
    fn test_write_segment_table() {
        let segment_0: &[u8] = &[];
        let segment_1: &[u8] = &[1; 8];
        let segment_199: &[u8] = &[201; 199 * 8];

        assert_eq!(
            write_segment_table(&[segment_0][..]),
            [0, 0, 0, 0, // 1 segments
             0, 0, 0, 0] // 0 length
        );

        assert_eq!(
            write_segment_table(&[segment_199][..]),
            [0, 0, 0, 0, // 1 segments
             199, 0, 0, 0] // 199 length
        );

        assert_eq!(
            write_segment_table(&[segment_0, segment_1][..]),
            [1, 0, 0, 0, // 2 segments
             0, 0, 0, 0, // 0 length
             1, 0, 0, 0, // 1 length
             0, 0, 0, 0] // padding
        );

        assert_eq!(
            write_segment_table(&[segment_199, segment_1, segment_199, segment_0][..]),
            [3, 0, 0, 0, // 4 segments
             199, 0, 0, 0, // 199 length
             1, 0, 0, 0, // 1 length
             199, 0, 0, 0, // 199 length
             0, 0, 0, 0, // 0 length
             0, 0, 0, 0] // padding
        );

        assert_eq!(
            write_segment_table(&[segment_199, segment_1, segment_199, segment_0, segment_1][..]),
            [4, 0, 0, 0, // 5 segments
             199, 0, 0, 0, // 199 length
             1, 0, 0, 0, // 1 length
             199, 0, 0, 0, // 199 length
             0, 0, 0, 0, // 0 length
             1, 0, 0, 0] // 1 length
        );

        let no_segments: &[&[u8]] = &[];
        assert_eq!(write_segment_table(no_segments), [0; 8]);
        assert_eq!(compute_serialized_size(no_segments), 1);
    }

    #[test]
    fn check_round_trip() {
        fn round_trip(segments: Vec<Vec<u64>>) -> TestResult {
            if segments.is_empty() {
                return TestResult::discard();
            }
            let owned: Vec<Vec<u8>> = segments.iter().map(|s| to_bytes(s)).collect();
            let borrowed: Vec<&[u8]> = owned.iter().map(|s| &s[..]).collect();

            let mut buf = Vec::new();
            write_message_segments(&mut buf, &borrowed[..]).unwrap();
            let message = read_message(&buf[..], message::ReaderOptions::new()).unwrap();
            let result_segments = message.into_segments();

            TestResult::from_bool(
                result_segments.len() == owned.len()
                    && owned.iter().enumerate().all(|(i, segment)| {
                        result_segments.get_segment(i as u32) == Some(&segment[..])
                    }),
            )
        }

        quickcheck(round_trip as fn(Vec<Vec<u64>>) -> TestResult);
    }

    #[test]
    fn check_round_trip_slice_segments() {
        fn round_trip(segments: Vec<Vec<u64>>) -> TestResult {
            if segments.is_empty() {
                return TestResult::discard();
            }
            let owned: Vec<Vec<u8>> = segments.iter().map(|s| to_bytes(s)).collect();
            let borrowed: Vec<&[u8]> = owned.iter().map(|s| &s[..]).collect();
            let bytes = flatten_segments(&borrowed[..]);
            if bytes.len() != compute_serialized_size(&borrowed[..]) * 8 {
                return TestResult::failed();
            }
            let message = read_message_from_bytes(&bytes, message::ReaderOptions::new());
            let result_segments = message.into_segments();

            TestResult::from_bool(owned.iter().enumerate().all(|(i, segment)| {
                result_segments.get_segment(i as u32) == Some(&segment[..])
            }))
        }

        quickcheck(round_trip as fn(Vec<Vec<u64>>) -> TestResult);
    }
}

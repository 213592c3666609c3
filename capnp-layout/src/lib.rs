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


//! # Cap'n Proto message layout
//!
//! This crate implements the [Cap'n Proto encoding](https://capnproto.org/encoding.html):
//! messages are flat sequences of 8-byte words, split into segments, and navigated through
//! wire pointers without any unpack step.
//!
//! A [`message::Builder`] bump-allocates structs, lists and blobs inside its segments and
//! links them with pointers. [`serialize::write_message_to_bytes`] prepends the segment
//! table. [`serialize::read_message_from_bytes`] wraps the bytes again, and every accessor
//! on [`StructReader`] or [`ListReader`] decodes the pointers it needs on demand.
//!
//! Read paths are permissive by default: a null or mismatched pointer yields `None`, `""`
//! or an empty slice instead of an error. See [`message::ReaderOptions`] for the strict
//! alternative and for the traversal and nesting limits.

pub mod data;
pub mod message;
pub mod pointer;
pub mod primitive_list;
pub(crate) mod private;
pub mod segment;
pub mod serialize;
pub mod struct_list;
pub mod text;
pub mod text_list;
pub mod traits;
pub mod union;

pub use crate::pointer::{ElementSize, WirePointer, WirePointerKind};
pub use crate::private::layout::{
    ListBuilder, ListReader, PointerBuilder, PointerReader, PrimitiveElement, StructBuilder,
    StructReader, StructSize,
};
pub use crate::private::primitive::Primitive;

use core::fmt;

/// Because messages are lazily validated, the return type of any method that reads a pointer
/// field must be wrapped in a `Result`.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// The general kind of the error.
    pub kind: ErrorKind,

    /// Extra context about the error, appended to the kind's description when displayed.
    pub extra: String,
}

/// The kinds of errors that can occur while building or reading a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong.
    #[error("Failed")]
    Failed,

    /// A list index was not less than the list's length.
    #[error("index {index} out of bounds for list of {len} elements")]
    IndexOutOfBounds { index: u32, len: u32 },

    /// A primitive field does not fit inside the struct's data section.
    #[error("{width}-bit field at bit offset {offset} lies outside a {size}-bit data section")]
    DataFieldOutOfBounds { offset: usize, width: usize, size: u32 },

    /// A pointer index was not less than the struct's pointer count.
    #[error("pointer index {index} out of bounds for struct with {count} pointers")]
    PointerFieldOutOfBounds { index: usize, count: u16 },

    #[error("Message contains out-of-bounds pointer")]
    MessageContainsOutOfBoundsPointer,

    /// A decoded pointer's tag does not match the role it was read in.
    #[error("Message contains {found} pointer where {expected} pointer was expected")]
    UnexpectedPointerKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid segment id: {0}")]
    InvalidSegmentId(u32),

    #[error("Message contains list with incompatible element type")]
    IncompatibleListElementSize,

    #[error("InlineComposite list's elements overrun its word count")]
    InlineCompositeListOverrun,

    /// The reserved OTHER pointer tag, used for capabilities by the RPC layer.
    #[error("Message contains a capability pointer, which is not supported")]
    UnsupportedCapabilityPointer,

    #[error("Root pointer is not a struct")]
    RootIsNotAStruct,

    #[error("Root already initialized")]
    RootAlreadyInitialized,

    #[error("Root not initialized")]
    RootNotInitialized,

    #[error("Message has no segments")]
    EmptyMessage,

    #[error("Text contains non-utf8 data")]
    TextContainsNonUtf8Data,

    #[error("Message contains text that is not NUL-terminated")]
    TextIsNotNulTerminated,

    #[error("read limit exceeded")]
    ReadLimitExceeded,

    #[error("Message is too deeply-nested or contains cycles")]
    NestingLimitExceeded,

    /// A union discriminant that the caller's variant table does not know about.
    #[error("Union discriminant {0} was not present in the schema")]
    NotInSchema(u16),

    #[error("Tried to read from null arena")]
    TriedToReadFromNullArena,
}

impl Error {
    pub fn failed(description: String) -> Self {
        Self {
            kind: ErrorKind::Failed,
            extra: description,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            extra: String::new(),
        }
    }

    /// Attaches a description of where the error happened.
    pub fn context(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Whether this error describes a pointer that is well-formed on the wire but not usable
    /// in the role it was read in. Permissive readers turn these into null results.
    pub fn is_malformed_pointer(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnexpectedPointerKind { .. }
                | ErrorKind::InvalidSegmentId(_)
                | ErrorKind::IncompatibleListElementSize
                | ErrorKind::UnsupportedCapabilityPointer
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> ::core::result::Result<(), fmt::Error> {
        if self.extra.is_empty() {
            write!(fmt, "{}", self.kind)
        } else {
            write!(fmt, "{}: {}", self.kind, self.extra)
        }
    }
}

impl ::std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Self {
        Self::failed(format!("{err}"))
    }
}

impl From<::core::str::Utf8Error> for Error {
    fn from(err: ::core::str::Utf8Error) -> Self {
        Self::from_kind(ErrorKind::TextContainsNonUtf8Data).context(format!("{err}"))
    }
}

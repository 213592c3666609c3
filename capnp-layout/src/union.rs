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


//! Discriminated unions.
//!
//! A union occupies a `u16` discriminant somewhere in a struct's data section plus whatever
//! storage its variants use. Nothing here stops a caller from touching the storage of an
//! inactive variant; generated accessors are expected to check `is()` first.

use crate::private::layout::{StructBuilder, StructReader};
use crate::private::units::ByteCount;
use crate::{Error, ErrorKind, Result};

/// Maps discriminant values to variant names.
pub type Variants<'a> = &'a [(u16, &'a str)];

fn lookup<'a>(variants: Variants<'a>, tag: u16) -> Option<&'a str> {
    variants
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, name)| *name)
}

#[derive(Clone, Copy)]
pub struct UnionReader<'a> {
    reader: StructReader<'a>,
    tag_offset: ByteCount,
    variants: Variants<'a>,
}

impl<'a> UnionReader<'a> {
    /// `tag_offset` is the byte offset of the discriminant within the data section.
    pub fn new(reader: StructReader<'a>, tag_offset: ByteCount, variants: Variants<'a>) -> Self {
        UnionReader {
            reader,
            tag_offset,
            variants,
        }
    }

    pub fn get_tag(&self) -> Result<u16> {
        self.reader.get_u16(self.tag_offset)
    }

    /// Name of the active variant, or `None` if the tag is not in the table.
    pub fn get_variant_name(&self) -> Result<Option<&'a str>> {
        Ok(lookup(self.variants, self.get_tag()?))
    }

    pub fn is(&self, tag: u16) -> Result<bool> {
        Ok(self.get_tag()? == tag)
    }

    /// The active variant as a `(tag, name)` pair. Fails with `NotInSchema` for a tag the
    /// table does not know, which is how a reader sees variants added by a newer schema.
    pub fn which(&self) -> Result<(u16, &'a str)> {
        let tag = self.get_tag()?;
        match lookup(self.variants, tag) {
            Some(name) => Ok((tag, name)),
            None => Err(Error::from_kind(ErrorKind::NotInSchema(tag))),
        }
    }

    /// The struct holding the union, for reading variant fields.
    pub fn get_struct(&self) -> StructReader<'a> {
        self.reader
    }
}

pub struct UnionBuilder<'a> {
    builder: StructBuilder<'a>,
    tag_offset: ByteCount,
    variants: Variants<'a>,
}

impl<'a> UnionBuilder<'a> {
    pub fn new(builder: StructBuilder<'a>, tag_offset: ByteCount, variants: Variants<'a>) -> Self {
        UnionBuilder {
            builder,
            tag_offset,
            variants,
        }
    }

    pub fn get_tag(&self) -> Result<u16> {
        self.builder.get_u16(self.tag_offset)
    }

    /// Writes the discriminant. The storage of the previously active variant is left as it was.
    pub fn set_tag(&mut self, tag: u16) -> Result<()> {
        self.builder.set_u16(self.tag_offset, tag)
    }

    /// Makes `tag` the active variant, then hands the struct to `init` to fill in the
    /// variant's fields.
    pub fn init_variant<T, F>(&mut self, tag: u16, init: F) -> Result<T>
    where
        F: FnOnce(StructBuilder<'a>) -> Result<T>,
    {
        self.set_tag(tag)?;
        init(self.builder)
    }

    pub fn get_variant_name(&self) -> Result<Option<&'a str>> {
        Ok(lookup(self.variants, self.get_tag()?))
    }

    pub fn is(&self, tag: u16) -> Result<bool> {
        Ok(self.get_tag()? == tag)
    }

    pub fn which(&self) -> Result<(u16, &'a str)> {
        let tag = self.get_tag()?;
        match lookup(self.variants, tag) {
            Some(name) => Ok((tag, name)),
            None => Err(Error::from_kind(ErrorKind::NotInSchema(tag))),
        }
    }

    pub fn get_struct(&self) -> StructBuilder<'a> {
        self.builder
    }
}

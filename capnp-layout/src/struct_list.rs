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


//! List of structs.

use crate::pointer::ElementSize;
use crate::private::layout::{
    ListBuilder, ListReader, PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize,
};
use crate::traits::{FromPointerReader, IndexMove, ListIter};
use crate::Result;

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: ListReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: ListReader<'a>) -> Self {
        Reader { reader }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(self) -> ListIter<Reader<'a>, Result<StructReader<'a>>> {
        ListIter::new(self, self.len())
    }

    /// Gets the element at position `index`. Elements never overlap: each one starts
    /// `data + pointers` words after the previous one.
    pub fn get(&self, index: u32) -> Result<StructReader<'a>> {
        self.reader.get_struct_element(index)
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        let list = reader
            .get_list(Some(ElementSize::InlineComposite))?
            .unwrap_or_else(|| ListReader::new_default());
        Ok(Reader::new(list))
    }
}

impl<'a> IndexMove<u32, Result<StructReader<'a>>> for Reader<'a> {
    fn index_move(&self, index: u32) -> Result<StructReader<'a>> {
        self.get(index)
    }
}

pub struct Builder<'a> {
    builder: ListBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Builder { builder }
    }

    /// Allocates `length` zeroed structs of shape `size`, preceded by the tag word that
    /// records the element count and shape.
    pub fn init_pointer(
        builder: PointerBuilder<'a>,
        length: u32,
        size: StructSize,
    ) -> Result<Self> {
        Ok(Builder::new(builder.init_struct_list(length, size)?))
    }

    pub fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Self> {
        Ok(Builder::new(
            builder.get_list_or_empty(ElementSize::InlineComposite)?,
        ))
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: u32) -> Result<StructBuilder<'a>> {
        self.builder.get_struct_element(index)
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder::new(self.builder)
    }
}

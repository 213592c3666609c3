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


//! List of strings containing UTF-8 encoded text.

use crate::pointer::ElementSize;
use crate::private::layout::{ListBuilder, ListReader, PointerBuilder, PointerReader};
use crate::traits::{FromPointerBuilder, FromPointerReader, IndexMove, ListIter};
use crate::{text, Result};

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

    pub fn iter(self) -> ListIter<Reader<'a>, Result<text::Reader<'a>>> {
        let l = self.len();
        ListIter::new(self, l)
    }

    /// Gets the text at position `index`. A null element reads as `""`.
    pub fn get(&self, index: u32) -> Result<text::Reader<'a>> {
        self.reader.get_pointer_element(index)?.get_text()
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        let list = reader
            .get_list(Some(ElementSize::Pointer))?
            .unwrap_or_else(|| ListReader::new_default());
        Ok(Reader::new(list))
    }
}

impl<'a> IndexMove<u32, Result<text::Reader<'a>>> for Reader<'a> {
    fn index_move(&self, index: u32) -> Result<text::Reader<'a>> {
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

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&mut self, index: u32, value: &str) -> Result<()> {
        self.builder.get_pointer_element(index)?.set_text(value)
    }

    pub fn get(&self, index: u32) -> Result<String> {
        self.builder.get_pointer_element(index)?.get_text()
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder::new(self.builder)
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Result<Builder<'a>> {
        Ok(Builder::new(builder.init_list(ElementSize::Pointer, size)?))
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        Ok(Builder::new(builder.get_list_or_empty(ElementSize::Pointer)?))
    }
}

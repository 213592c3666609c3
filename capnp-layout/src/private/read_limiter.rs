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


use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{Error, ErrorKind, Result};

/// Counts words traversed by a reader. Atomic so that a `message::Reader` can be shared
/// between threads that only read.
pub struct ReadLimiter {
    pub limit: AtomicU64,
    pub limit_reached: AtomicBool,
}

impl ReadLimiter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit: AtomicU64::new(limit),
            limit_reached: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn can_read(&self, amount: usize) -> Result<()> {
        if self.limit_reached.load(Ordering::Relaxed) {
            return Err(Error::from_kind(ErrorKind::ReadLimitExceeded));
        }

        let amount = amount as u64;
        let previous = self
            .limit
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(amount)
            });
        match previous {
            Ok(_) => Ok(()),
            Err(_) => {
                self.limit_reached.store(true, Ordering::Relaxed);
                Err(Error::from_kind(ErrorKind::ReadLimitExceeded))
            }
        }
    }
}

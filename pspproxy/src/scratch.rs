// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Best-fit, coalescing free-list allocator over the scratch region the
//! code module reports at connect time.
//!
//! Chunks are tracked in a list sorted by address; freeing a chunk merges
//! it with its immediate neighbors when they're adjacent, so the free
//! list never grows more fragmented than the actual allocation pattern
//! requires.

use pspproxy_wire::PspAddr;

use crate::ProxyError;

/// A free chunk `{start, len}`, always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeChunk {
    start: u32,
    len: u32,
}

impl FreeChunk {
    fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Free-list allocator over a single contiguous PSP memory region.
///
/// Not thread-safe and not multi-CCD-safe: each PSP has its own scratch
/// region, so callers must pin one `ProxyContext` to one CCD before the
/// first allocation.
#[derive(Debug)]
pub struct ScratchAllocator {
    region_start: u32,
    region_len: u32,
    /// Sorted by `start`, non-overlapping, no two entries touch at a
    /// boundary (always coalesced).
    free: Vec<FreeChunk>,
}

impl ScratchAllocator {
    /// Creates an allocator over `[region_start, region_start + region_len)`,
    /// initially a single free chunk covering the whole region.
    pub fn new(region_start: PspAddr, region_len: u32) -> Self {
        ScratchAllocator {
            region_start: region_start.0,
            region_len,
            free: vec![FreeChunk { start: region_start.0, len: region_len }],
        }
    }

    /// Best-fit allocation: finds the smallest free chunk that still fits
    /// `len`, and carves the returned region off the *top* of that chunk so
    /// the remaining space stays contiguous from the chunk's low end.
    pub fn alloc(&mut self, len: u32) -> Result<PspAddr, ProxyError> {
        if len == 0 {
            return Err(ProxyError::ArgumentError("scratch alloc of zero bytes".into()));
        }

        let best = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, c)| c.len >= len)
            .min_by_key(|(_, c)| c.len)
            .map(|(i, c)| (i, *c));

        let (idx, chunk) = match best {
            Some(found) => found,
            None => return Err(ProxyError::ArgumentError("scratch space exhausted".into())),
        };

        let alloc_start = chunk.end() - len;
        if chunk.len == len {
            self.free.remove(idx);
        } else {
            self.free[idx].len -= len;
        }
        Ok(PspAddr(alloc_start))
    }

    /// Returns a previously allocated `[addr, addr+len)` region to the free
    /// list, coalescing with an immediately-preceding and/or
    /// immediately-following chunk.
    pub fn free(&mut self, addr: PspAddr, len: u32) -> Result<(), ProxyError> {
        let start = addr.0;
        let end = start + len;
        if start < self.region_start || end > self.region_start + self.region_len {
            return Err(ProxyError::ArgumentError("scratch free outside managed region".into()));
        }

        let insert_at = self.free.partition_point(|c| c.start < start);

        let merge_prev = insert_at > 0 && self.free[insert_at - 1].end() == start;
        let merge_next = insert_at < self.free.len() && self.free[insert_at].start == end;

        match (merge_prev, merge_next) {
            (true, true) => {
                let next_len = self.free[insert_at].len;
                self.free[insert_at - 1].len += len + next_len;
                self.free.remove(insert_at);
            }
            (true, false) => {
                self.free[insert_at - 1].len += len;
            }
            (false, true) => {
                self.free[insert_at].start = start;
                self.free[insert_at].len += len;
            }
            (false, false) => {
                self.free.insert(insert_at, FreeChunk { start, len });
            }
        }
        Ok(())
    }

    /// True if the free list has collapsed back to exactly the initial
    /// whole-region chunk (used by tests to confirm every allocation was
    /// eventually freed and coalesced).
    pub fn is_fully_free(&self) -> bool {
        self.free.len() == 1 && self.free[0].start == self.region_start && self.free[0].len == self.region_len
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed addresses exchanged in PDU payloads.
//!
//! Each address space gets its own newtype instead of a bare integer, so a
//! PSP memory address and an SMN offset can't be swapped by accident at a
//! call site.

/// A 32-bit address in PSP (ARM) address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PspAddr(pub u32);

/// A 32-bit offset into the System Management Network register fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SmnAddr(pub u32);

/// A 64-bit x86 physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct X86PhysAddr(pub u64);

/// A 64-bit host kernel virtual address (ring 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct R0Ptr(pub u64);

impl PspAddr {
    pub fn offset(self, delta: u32) -> Self {
        PspAddr(self.0.wrapping_add(delta))
    }
}

impl X86PhysAddr {
    pub fn offset(self, delta: u64) -> Self {
        X86PhysAddr(self.0.wrapping_add(delta))
    }
}

/// Caching behavior requested for an x86 memory or MMIO access, as an enum
/// rather than a raw flag so an invalid hint cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingHint {
    /// Use whatever the platform's default memory type is for the range.
    Default,
    /// Force an uncacheable mapping (the usual choice for MMIO).
    Uncached,
    /// Write-combining, useful for large linear writes (e.g. framebuffers).
    WriteCombine,
}

/// A tagged address: which of the PSP's address spaces a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    PspMem(PspAddr),
    PspMmio(PspAddr),
    Smn(SmnAddr),
    X86Mem(X86PhysAddr, CachingHint),
    X86Mmio(X86PhysAddr, CachingHint),
}

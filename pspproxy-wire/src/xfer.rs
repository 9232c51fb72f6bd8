// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flags carried by the generic `DataXfer` request.

use bitflags::bitflags;

bitflags! {
    /// Flags for the stride-/address-space-parameterized generic transfer.
    ///
    /// `READ` and `WRITE` are mutually exclusive; `MEMSET` without `WRITE`
    /// is meaningless. `pspproxy::ProxyError::ArgumentError` is returned
    /// before any wire traffic if a caller combines them incorrectly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataXferFlags: u32 {
        const READ       = 1 << 0;
        const WRITE      = 1 << 1;
        const MEMSET     = 1 << 2;
        const INCR_ADDR  = 1 << 3;
    }
}

impl DataXferFlags {
    /// True if this flag combination is one the protocol can act on at all:
    /// exactly one of READ/WRITE, and MEMSET only alongside WRITE.
    pub fn is_well_formed(self) -> bool {
        let read = self.contains(DataXferFlags::READ);
        let write = self.contains(DataXferFlags::WRITE);
        if read == write {
            // both or neither set
            return false;
        }
        if self.contains(DataXferFlags::MEMSET) && !write {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_together_is_malformed() {
        let both = DataXferFlags::READ | DataXferFlags::WRITE;
        assert!(!both.is_well_formed());
    }

    #[test]
    fn neither_read_nor_write_is_malformed() {
        assert!(!DataXferFlags::INCR_ADDR.is_well_formed());
    }

    #[test]
    fn memset_without_write_is_malformed() {
        let f = DataXferFlags::READ | DataXferFlags::MEMSET;
        assert!(!f.is_well_formed());
    }

    #[test]
    fn memset_with_write_is_well_formed() {
        let f = DataXferFlags::WRITE | DataXferFlags::MEMSET;
        assert!(f.is_well_formed());
    }

    #[test]
    fn plain_read_or_write_is_well_formed() {
        assert!(DataXferFlags::READ.is_well_formed());
        assert!(DataXferFlags::WRITE.is_well_formed());
        assert!((DataXferFlags::WRITE | DataXferFlags::INCR_ADDR).is_well_formed());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-layout PDU header and footer.
//!
//! These structs are read directly out of (and written directly into) a
//! byte buffer with no serialization step, so their layout is pinned with
//! `zerocopy`'s byte-exact derive traits rather than left to the compiler.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use static_assertions::const_assert_eq;

/// Size in bytes of [`PduHeader`] on the wire.
pub const HEADER_LEN: usize = 16;
/// Size in bytes of [`PduFooter`] on the wire.
pub const FOOTER_LEN: usize = 8;

/// Largest payload this crate will ever buffer for a single PDU. Providers
/// may negotiate a smaller `cbPduMax` at connect time; this is only the
/// local receive-buffer ceiling.
pub const MAX_PDU_SIZE: usize = 4096;

/// The 16-byte PDU header, exactly as it appears on the wire (little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C)]
pub struct PduHeader {
    /// Start-of-PDU magic; direction-specific.
    pub magic: [u8; 4],
    /// Payload length in bytes, excluding pad.
    pub cb_pdu: [u8; 4],
    /// Running sequence number.
    pub seq: [u8; 4],
    /// RRN-ID discriminant (see [`crate::RrnId`]).
    pub rrn_id: [u8; 2],
    /// Target/source CCD index.
    pub ccd: u8,
    /// Reserved; zero from the host.
    pub reserved: u8,
}

const_assert_eq!(core::mem::size_of::<PduHeader>(), HEADER_LEN);

impl PduHeader {
    pub fn new(magic: u32, cb_pdu: u32, seq: u32, rrn_id: u16, ccd: u8) -> Self {
        PduHeader {
            magic: magic.to_le_bytes(),
            cb_pdu: cb_pdu.to_le_bytes(),
            seq: seq.to_le_bytes(),
            rrn_id: rrn_id.to_le_bytes(),
            ccd,
            reserved: 0,
        }
    }

    pub fn magic(&self) -> u32 {
        u32::from_le_bytes(self.magic)
    }

    pub fn cb_pdu(&self) -> u32 {
        u32::from_le_bytes(self.cb_pdu)
    }

    pub fn seq(&self) -> u32 {
        u32::from_le_bytes(self.seq)
    }

    pub fn rrn_id_raw(&self) -> u16 {
        u16::from_le_bytes(self.rrn_id)
    }
}

/// The 8-byte PDU footer, exactly as it appears on the wire (little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C)]
pub struct PduFooter {
    /// Negated running byte-sum over header + payload + pad.
    pub checksum: [u8; 4],
    /// End-of-PDU magic; direction-specific.
    pub magic: [u8; 4],
}

const_assert_eq!(core::mem::size_of::<PduFooter>(), FOOTER_LEN);

impl PduFooter {
    pub fn new(checksum: u32, magic: u32) -> Self {
        PduFooter {
            checksum: checksum.to_le_bytes(),
            magic: magic.to_le_bytes(),
        }
    }

    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.checksum)
    }

    pub fn magic(&self) -> u32 {
        u32::from_le_bytes(self.magic)
    }
}

/// Number of zero pad bytes needed to bring `payload_len` up to the next
/// multiple of 8 (0 if it is already a multiple of 8).
pub fn pad_len(payload_len: usize) -> usize {
    (8 - (payload_len % 8)) % 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_footer_sizes_match_wire_layout() {
        assert_eq!(core::mem::size_of::<PduHeader>(), 16);
        assert_eq!(core::mem::size_of::<PduFooter>(), 8);
    }

    #[test]
    fn pad_len_reaches_next_multiple_of_eight() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(1), 7);
        assert_eq!(pad_len(7), 1);
        assert_eq!(pad_len(8), 0);
        assert_eq!(pad_len(9), 7);
        assert_eq!(pad_len(1024), 0);
    }

    #[test]
    fn header_field_accessors_round_trip() {
        let hdr = PduHeader::new(0x1234_5678, 42, 7, 0x2000, 3);
        assert_eq!(hdr.magic(), 0x1234_5678);
        assert_eq!(hdr.cb_pdu(), 42);
        assert_eq!(hdr.seq(), 7);
        assert_eq!(hdr.rrn_id_raw(), 0x2000);
        assert_eq!(hdr.ccd, 3);
        assert_eq!(hdr.reserved, 0);
    }

    #[test]
    fn header_bytes_are_little_endian() {
        let hdr = PduHeader::new(0x0102_0304, 0, 0, 0, 0);
        let bytes = zerocopy::IntoBytes::as_bytes(&hdr);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
    }
}

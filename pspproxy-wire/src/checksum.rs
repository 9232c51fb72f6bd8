// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PDU checksum.
//!
//! Every header byte, payload byte, and pad byte is widened to `u32` and
//! accumulated with wrapping addition; a PDU is valid when that running sum
//! plus the footer's stored checksum field wraps to zero mod 2^32. Pad bytes
//! are always zero, so folding them into the sum on both the send and
//! receive side is a no-op in practice but keeps the two sides symmetric.

/// Computes the checksum field that belongs in a PDU's footer for the given
/// header bytes, payload bytes, and pad bytes (in that order). The returned
/// value is the two's-complement negation of the running sum, so that
/// `sum_over_bytes(header ++ payload ++ pad) + checksum` wraps to zero.
pub fn checksum_of(header: &[u8], payload: &[u8], pad: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for &b in header.iter().chain(payload).chain(pad) {
        sum = sum.wrapping_add(b as u32);
    }
    sum.wrapping_neg()
}

/// Verifies that `header ++ payload ++ pad ++ checksum` sums to zero mod
/// 2^32, i.e. that `checksum` is exactly what `checksum_of` would produce.
pub fn verify(header: &[u8], payload: &[u8], pad: &[u8], checksum: u32) -> bool {
    let mut sum: u32 = 0;
    for &b in header.iter().chain(payload).chain(pad) {
        sum = sum.wrapping_add(b as u32);
    }
    sum.wrapping_add(checksum) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_is_zero() {
        assert_eq!(checksum_of(&[], &[], &[]), 0);
    }

    #[test]
    fn checksum_round_trips_through_verify() {
        let header = [0x50, 0x53, 0x50, 0x48, 0x04, 0x00, 0x00, 0x00];
        let payload = [0xde, 0xad, 0xbe, 0xef];
        let pad = [0, 0, 0, 0];
        let chk = checksum_of(&header, &payload, &pad);
        assert!(verify(&header, &payload, &pad, chk));
    }

    #[test]
    fn corrupted_payload_fails_verify() {
        let header = [1, 2, 3, 4];
        let payload = [5, 6, 7, 8];
        let pad = [];
        let chk = checksum_of(&header, &payload, &pad);
        let corrupted = [5, 6, 7, 9];
        assert!(!verify(&header, &corrupted, &pad, chk));
    }

    #[test]
    fn zero_pad_does_not_change_checksum() {
        let header = [9, 9, 9];
        let payload = [1, 2, 3, 4, 5];
        let with_pad = checksum_of(&header, &payload, &[0, 0, 0]);
        let without_pad = checksum_of(&header, &payload, &[]);
        assert_eq!(with_pad, without_pad);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-layer error type: a plain enum with a hand-written `Display`.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Header/footer magic did not match the expected direction.
    BadMagic,
    /// `cb_pdu` exceeds the receive buffer's remaining capacity.
    PayloadTooLarge,
    /// RRN-ID discriminant fell outside all three declared ranges.
    RrnIdOutOfRange,
    /// Footer checksum did not validate.
    ChecksumMismatch,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::BadMagic => write!(f, "PDU magic mismatch"),
            WireError::PayloadTooLarge => write!(f, "PDU payload length exceeds buffer capacity"),
            WireError::RrnIdOutOfRange => write!(f, "RRN-ID outside all declared ranges"),
            WireError::ChecksumMismatch => write!(f, "PDU checksum mismatch"),
        }
    }
}

impl std::error::Error for WireError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_displays_without_panicking() {
        for e in [
            WireError::BadMagic,
            WireError::PayloadTooLarge,
            WireError::RrnIdOutOfRange,
            WireError::ChecksumMismatch,
        ] {
            let _ = format!("{e}");
        }
    }
}

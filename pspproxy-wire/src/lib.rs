// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire format for the PSP proxy PDU protocol.
//!
//! This crate owns everything that must match bit-for-bit between host and
//! stub: the framed header/footer layout, the RRN-ID discriminant ranges,
//! the checksum algorithm, and the typed addresses that travel inside
//! request/response payloads. It has no knowledge of transports or of the
//! engine that drives them — see `pspproxy-provider` and `pspproxy`.

mod addr;
mod checksum;
mod error;
mod pdu;
mod rrn;
mod xfer;

pub use addr::{Address, CachingHint, PspAddr, R0Ptr, SmnAddr, X86PhysAddr};
pub use checksum::{checksum_of, verify};
pub use error::WireError;
pub use pdu::{pad_len, PduFooter, PduHeader, FOOTER_LEN, HEADER_LEN, MAX_PDU_SIZE};
pub use rrn::RrnId;
pub use xfer::DataXferFlags;

/// Start-of-PDU magic used on host-to-stub frames.
pub const START_MAGIC_HOST_TO_STUB: u32 = 0x5053_5048; // "PSPH"
/// Start-of-PDU magic used on stub-to-host frames.
pub const START_MAGIC_STUB_TO_HOST: u32 = 0x5053_5053; // "PSPS"
/// End-of-PDU magic used on host-to-stub frames.
pub const END_MAGIC_HOST_TO_STUB: u32 = 0x454e_4448; // "ENDH"
/// End-of-PDU magic used on stub-to-host frames.
pub const END_MAGIC_STUB_TO_HOST: u32 = 0x454e_4453; // "ENDS"

/// Hard ceiling on the number of CCDs a single system can report; the wire
/// format's `ccd` field is a `u8` but the protocol additionally refuses any
/// CCD index at or above this value regardless of what a handshake claims.
pub const MAX_CCDS: u32 = 16;

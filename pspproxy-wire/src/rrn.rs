// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request/Response/Notification identifiers.
//!
//! Requests, responses, and notifications occupy three disjoint numeric
//! ranges, so a misrouted PDU fails header validation instead of silently
//! matching the wrong handler.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// First discriminant of the request range (inclusive).
pub const REQUEST_FIRST: u16 = 0x0001;
/// One past the last discriminant of the request range (exclusive).
pub const REQUEST_INVALID_FIRST: u16 = 0x0013;

/// First discriminant of the response range (inclusive).
pub const RESPONSE_FIRST: u16 = 0x1001;
/// One past the last discriminant of the response range (exclusive).
pub const RESPONSE_INVALID_FIRST: u16 = 0x1012;

/// First discriminant of the notification range (inclusive).
pub const NOTIFICATION_FIRST: u16 = 0x2000;
/// One past the last discriminant of the notification range (exclusive).
pub const NOTIFICATION_INVALID_FIRST: u16 = 0x2005;

/// The RRN-ID discriminant naming a PDU's kind.
///
/// Request and response values occupy disjoint numeric ranges so a
/// misrouted PDU fails validation instead of silently matching the wrong
/// handler; notifications occupy a third range. See `REQUEST_FIRST` and
/// friends above for the exact bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum RrnId {
    // --- requests ---
    Connect = 0x0001,
    SmnRead = 0x0002,
    SmnWrite = 0x0003,
    PspMemRead = 0x0004,
    PspMemWrite = 0x0005,
    PspMmioRead = 0x0006,
    PspMmioWrite = 0x0007,
    X86MemRead = 0x0008,
    X86MemWrite = 0x0009,
    X86MmioRead = 0x000a,
    X86MmioWrite = 0x000b,
    DataXfer = 0x000c,
    CoProcRead = 0x000d,
    CoProcWrite = 0x000e,
    LoadCodeMod = 0x000f,
    ExecCodeMod = 0x0010,
    InputBufWrite = 0x0011,
    BranchTo = 0x0012,

    // --- responses (request id | 0x1000) ---
    ConnectResponse = 0x1001,
    SmnReadResponse = 0x1002,
    SmnWriteResponse = 0x1003,
    PspMemReadResponse = 0x1004,
    PspMemWriteResponse = 0x1005,
    PspMmioReadResponse = 0x1006,
    PspMmioWriteResponse = 0x1007,
    X86MemReadResponse = 0x1008,
    X86MemWriteResponse = 0x1009,
    X86MmioReadResponse = 0x100a,
    X86MmioWriteResponse = 0x100b,
    DataXferResponse = 0x100c,
    CoProcReadResponse = 0x100d,
    CoProcWriteResponse = 0x100e,
    LoadCodeModResponse = 0x100f,
    ExecCodeModResponse = 0x1010,
    InputBufWriteResponse = 0x1011,

    // --- notifications ---
    Beacon = 0x2000,
    LogMsg = 0x2001,
    OutputBufWrite = 0x2002,
    Irq = 0x2003,
    CodeModExecFinished = 0x2004,
}

impl RrnId {
    /// The response RRN-ID expected for a request RRN-ID, or `None` for
    /// `BranchTo`, which is a one-way request with no response.
    pub fn expected_response(self) -> Option<RrnId> {
        use RrnId::*;
        Some(match self {
            Connect => ConnectResponse,
            SmnRead => SmnReadResponse,
            SmnWrite => SmnWriteResponse,
            PspMemRead => PspMemReadResponse,
            PspMemWrite => PspMemWriteResponse,
            PspMmioRead => PspMmioReadResponse,
            PspMmioWrite => PspMmioWriteResponse,
            X86MemRead => X86MemReadResponse,
            X86MemWrite => X86MemWriteResponse,
            X86MmioRead => X86MmioReadResponse,
            X86MmioWrite => X86MmioWriteResponse,
            DataXfer => DataXferResponse,
            CoProcRead => CoProcReadResponse,
            CoProcWrite => CoProcWriteResponse,
            LoadCodeMod => LoadCodeModResponse,
            ExecCodeMod => ExecCodeModResponse,
            InputBufWrite => InputBufWriteResponse,
            BranchTo => return None,
            _ => return None,
        })
    }

    pub fn is_notification(self) -> bool {
        let raw = self as u16;
        (NOTIFICATION_FIRST..NOTIFICATION_INVALID_FIRST).contains(&raw)
    }

    pub fn is_response(self) -> bool {
        let raw = self as u16;
        (RESPONSE_FIRST..RESPONSE_INVALID_FIRST).contains(&raw)
    }

    /// Parses a raw discriminant, rejecting anything outside the three
    /// declared ranges (request, response, notification) even if it would
    /// otherwise decode to an enum variant via `FromPrimitive` — the three
    /// ranges are validated independently of the enum's exhaustive variant
    /// list.
    pub fn from_raw(raw: u16) -> Option<RrnId> {
        let in_range = (REQUEST_FIRST..REQUEST_INVALID_FIRST).contains(&raw)
            || (RESPONSE_FIRST..RESPONSE_INVALID_FIRST).contains(&raw)
            || (NOTIFICATION_FIRST..NOTIFICATION_INVALID_FIRST).contains(&raw);
        if !in_range {
            return None;
        }
        RrnId::from_u16(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_response_ranges_disjoint() {
        assert!(REQUEST_INVALID_FIRST <= RESPONSE_FIRST);
        assert!(RESPONSE_INVALID_FIRST <= NOTIFICATION_FIRST);
    }

    #[test]
    fn every_request_maps_to_its_response_except_branch_to() {
        use RrnId::*;
        for req in [
            Connect, SmnRead, SmnWrite, PspMemRead, PspMemWrite, PspMmioRead,
            PspMmioWrite, X86MemRead, X86MemWrite, X86MmioRead, X86MmioWrite,
            DataXfer, CoProcRead, CoProcWrite, LoadCodeMod, ExecCodeMod,
            InputBufWrite,
        ] {
            let resp = req.expected_response().expect("must have a response");
            assert!(resp.is_response());
        }
        assert_eq!(BranchTo.expected_response(), None);
    }

    #[test]
    fn from_raw_rejects_out_of_range_and_gap_values() {
        assert!(RrnId::from_raw(0x0000).is_none());
        assert!(RrnId::from_raw(REQUEST_INVALID_FIRST).is_none());
        assert!(RrnId::from_raw(RESPONSE_FIRST - 1).is_none());
        assert!(RrnId::from_raw(NOTIFICATION_INVALID_FIRST).is_none());
        assert_eq!(RrnId::from_raw(0x0001), Some(RrnId::Connect));
        assert_eq!(RrnId::from_raw(0x2000), Some(RrnId::Beacon));
    }

    #[test]
    fn notification_classification() {
        assert!(RrnId::Beacon.is_notification());
        assert!(!RrnId::Connect.is_notification());
        assert!(!RrnId::ConnectResponse.is_notification());
    }
}

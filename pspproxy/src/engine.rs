// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The framed, checksummed, sequenced request/response/notification
//! protocol engine.
//!
//! [`PduEngine::recv_one`] runs a small header/payload/footer receive
//! state machine with byte-wise resync on a bad start magic, so garbage
//! or a stub restart mid-stream doesn't wedge the connection. Responses
//! complete an outstanding request; notifications (`LogMsg`,
//! `OutputBufWrite`, `Irq`, ...) are dispatched to the engine's
//! `HostIoSink` or recorded as pending state, never surfaced as a
//! response to the caller. The engine holds its `HostIoSink` directly and
//! calls into it synchronously rather than threading callbacks back
//! through the owning context.
//!
//! Request/response payload layouts below (field order and exact sizes)
//! are documented alongside the RRN-ID and notification semantics they
//! implement; see `DESIGN.md` for the full per-operation field tables.

use std::time::{Duration, Instant};

use pspproxy_provider::{PollOutcome, Provider};
use pspproxy_wire::{
    self as wire, pad_len, PduFooter, PduHeader, RrnId, FOOTER_LEN, HEADER_LEN, MAX_PDU_SIZE,
};

use crate::hostio::HostIoSink;
use crate::ProxyError;

/// Hard ceiling on CCD index: notifications naming a CCD at or beyond
/// this fail rather than silently growing per-CCD state.
const MAX_CCDS: usize = wire::MAX_CCDS as usize;

/// Size of the log-line reassembly buffer.
const LOG_BUF_CAPACITY: usize = 1024;

/// Fixed fields preceding the optional inline payload of a `DataXfer`
/// request: `addr:u64, cb_xfer:u32, flags:u8, stride:u8, addr_space:u8,
/// reserved:u8`.
pub(crate) const XFER_FIXED_FIELDS_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct CcdState {
    pending_irq: bool,
    pending_firq: bool,
    notification_pending: bool,
}

/// Outcome of a completed wait-for-interrupt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfiOutcome {
    Change { ccd: u8, irq: bool, firq: bool },
    NoChange,
}

/// Connection parameters learned at handshake.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub cb_pdu_max: u32,
    pub cb_scratch: u32,
    pub psp_addr_scratch: u32,
    pub c_sys_sockets: u32,
    pub c_ccds_per_socket: u32,
}

impl ConnectionInfo {
    pub fn total_ccds(&self) -> u32 {
        self.c_sys_sockets * self.c_ccds_per_socket
    }
}

struct RawPdu {
    header: PduHeader,
    payload: Vec<u8>,
}

pub struct PduEngine {
    provider: Box<dyn Provider>,
    sink: Box<dyn HostIoSink>,

    send_seq: u32,
    expected_inbound_seq: u32,
    connected: bool,
    info: Option<ConnectionInfo>,
    beacons_seen: u32,
    last_request_status: i32,

    ccd_state: [CcdState; MAX_CCDS],
    log_buf: Vec<u8>,
    pending_exec_finished: Option<Vec<u8>>,
}

impl PduEngine {
    pub fn new(provider: Box<dyn Provider>, sink: Box<dyn HostIoSink>) -> Self {
        PduEngine {
            provider,
            sink,
            send_seq: 0,
            expected_inbound_seq: 1,
            connected: false,
            info: None,
            beacons_seen: 0,
            last_request_status: 0,
            ccd_state: [CcdState::default(); MAX_CCDS],
            log_buf: Vec::with_capacity(LOG_BUF_CAPACITY),
            pending_exec_finished: None,
        }
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.info
    }

    pub fn last_request_status(&self) -> i32 {
        self.last_request_status
    }

    pub fn max_xfer_payload_per_pdu(&self) -> Result<usize, ProxyError> {
        self.max_payload_for_fixed_fields(XFER_FIXED_FIELDS_LEN)
    }

    /// Largest inline data payload a single request carrying `fixed_fields_len`
    /// bytes of fixed request fields can fit within the negotiated `cbPduMax`.
    /// Shared by every chunked request kind, not just `DataXfer`.
    pub fn max_payload_for_fixed_fields(&self, fixed_fields_len: usize) -> Result<usize, ProxyError> {
        let info = self.info.ok_or_else(|| ProxyError::ArgumentError("not connected".into()))?;
        Ok(info.cb_pdu_max as usize - HEADER_LEN - FOOTER_LEN - fixed_fields_len)
    }

    // ---- connect handshake ----

    /// Waits for a beacon (bounded by `timeout_ms`), then performs the
    /// `Connect` request/response round trip.
    pub fn connect(&mut self, timeout_ms: u32) -> Result<ConnectionInfo, ProxyError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);

        loop {
            let budget = ms_until(deadline)?;
            let pdu = self.recv_one(budget)?;
            let rrn = rrn_of(&pdu)?;
            if rrn == RrnId::Beacon {
                let counter = u32_at(&pdu.payload, 0)?;
                self.beacons_seen = counter;
                break;
            }
            self.dispatch_notification(rrn, pdu.header.ccd, &pdu.payload)?;
        }

        self.send_pdu(RrnId::Connect, 0, &[])?;
        let budget = ms_until(deadline)?;
        let payload = self.await_response(RrnId::ConnectResponse, budget)?;
        if payload.len() < 20 {
            return Err(ProxyError::UnexpectedPdu);
        }
        let info = ConnectionInfo {
            cb_pdu_max: u32_at(&payload, 0)?,
            cb_scratch: u32_at(&payload, 4)?,
            psp_addr_scratch: u32_at(&payload, 8)?,
            c_sys_sockets: u32_at(&payload, 12)?,
            c_ccds_per_socket: u32_at(&payload, 16)?,
        };

        self.connected = true;
        self.expected_inbound_seq = 1;
        self.info = Some(info);
        Ok(info)
    }

    // ---- generic request/response ----

    pub fn request_response(
        &mut self,
        rrn: RrnId,
        ccd: u8,
        payload: &[u8],
        timeout_ms: u32,
    ) -> Result<Vec<u8>, ProxyError> {
        let expected = rrn
            .expected_response()
            .ok_or_else(|| ProxyError::ArgumentError("request has no response (one-way)".into()))?;
        self.send_pdu(rrn, ccd, payload)?;
        self.await_response(expected, timeout_ms)
    }

    /// Sends a one-way request with no expectation of a reply (`BranchTo`).
    pub fn send_one_way(&mut self, rrn: RrnId, ccd: u8, payload: &[u8]) -> Result<(), ProxyError> {
        self.send_pdu(rrn, ccd, payload)
    }

    fn await_response(&mut self, expected: RrnId, timeout_ms: u32) -> Result<Vec<u8>, ProxyError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            let budget = ms_until(deadline)?;
            let pdu = self.recv_one(budget)?;
            let rrn = rrn_of(&pdu)?;
            if rrn == expected {
                return Ok(pdu.payload);
            }
            if rrn.is_notification() {
                self.dispatch_notification(rrn, pdu.header.ccd, &pdu.payload)?;
                continue;
            }
            return Err(ProxyError::UnexpectedPdu);
        }
    }

    /// Receives and dispatches at most one PDU within `timeout_ms`,
    /// without expecting any particular response. Used by the code-module
    /// runloop, where no request is outstanding between `InputBufWrite`
    /// round trips. Returns the notification's RRN-ID, or `None` on
    /// timeout.
    pub fn pump_one(&mut self, timeout_ms: u32) -> Result<Option<RrnId>, ProxyError> {
        match self.recv_one(timeout_ms) {
            Ok(pdu) => {
                let rrn = rrn_of(&pdu)?;
                if !rrn.is_notification() {
                    return Err(ProxyError::UnexpectedPdu);
                }
                self.dispatch_notification(rrn, pdu.header.ccd, &pdu.payload)?;
                Ok(Some(rrn))
            }
            Err(ProxyError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn take_exec_finished(&mut self) -> Option<u32> {
        self.pending_exec_finished.take().and_then(|p| u32_at(&p, 0).ok())
    }

    pub fn sink_mut(&mut self) -> &mut dyn HostIoSink {
        self.sink.as_mut()
    }

    // ---- wait-for-interrupt ----

    pub fn wfi(&mut self, timeout_ms: u32) -> Result<WfiOutcome, ProxyError> {
        if let Some(outcome) = self.take_pending_irq() {
            return Ok(outcome);
        }
        if timeout_ms == 0 {
            return Ok(WfiOutcome::NoChange);
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            let budget = ms_until(deadline)?;
            match self.pump_one(budget) {
                Ok(Some(_)) => {
                    if let Some(outcome) = self.take_pending_irq() {
                        return Ok(outcome);
                    }
                }
                Ok(None) => return Ok(WfiOutcome::NoChange),
                Err(e) => return Err(e),
            }
        }
    }

    fn take_pending_irq(&mut self) -> Option<WfiOutcome> {
        let ccd = self.ccd_state.iter().position(|s| s.notification_pending)?;
        let state = &mut self.ccd_state[ccd];
        let outcome = WfiOutcome::Change { ccd: ccd as u8, irq: state.pending_irq, firq: state.pending_firq };
        state.pending_irq = false;
        state.pending_firq = false;
        state.notification_pending = false;
        Some(outcome)
    }

    // ---- send path ----

    fn send_pdu(&mut self, rrn: RrnId, ccd: u8, payload: &[u8]) -> Result<(), ProxyError> {
        if payload.len() > MAX_PDU_SIZE - HEADER_LEN - FOOTER_LEN {
            return Err(ProxyError::ArgumentError("payload exceeds MAX_PDU_SIZE".into()));
        }
        self.send_seq += 1;
        let header = PduHeader::new(
            wire::START_MAGIC_HOST_TO_STUB,
            payload.len() as u32,
            self.send_seq,
            rrn as u16,
            ccd,
        );
        let pad = vec![0u8; pad_len(payload.len())];
        let checksum = wire::checksum_of(zerocopy::IntoBytes::as_bytes(&header), payload, &pad);
        let footer = PduFooter::new(checksum, wire::END_MAGIC_HOST_TO_STUB);

        self.provider.write(zerocopy::IntoBytes::as_bytes(&header))?;
        self.provider.write(payload)?;
        self.provider.write(&pad)?;
        self.provider.write(zerocopy::IntoBytes::as_bytes(&footer))?;
        Ok(())
    }

    // ---- receive state machine ----

    fn recv_one(&mut self, timeout_ms: u32) -> Result<RawPdu, ProxyError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            self.scan_for_start_magic(deadline)?;
            match self.read_pdu_body(deadline) {
                Ok(pdu) => {
                    if self.connected {
                        self.expected_inbound_seq += 1;
                    }
                    return Ok(pdu);
                }
                Err(ProxyError::FramingError(e)) => {
                    log::warn!("PDU framing error, resyncing: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Byte-wise resync: reads 4 bytes, and while they don't equal the
    /// stub->host start magic, shifts the window left by one byte and reads
    /// one more, forever (until the deadline) — self-synchronizing against
    /// garbage or partial reconnects.
    fn scan_for_start_magic(&mut self, deadline: Instant) -> Result<(), ProxyError> {
        let mut window = [0u8; 4];
        self.read_exact_within(&mut window, deadline)?;
        loop {
            if u32::from_le_bytes(window) == wire::START_MAGIC_STUB_TO_HOST {
                return Ok(());
            }
            window.copy_within(1..4, 0);
            self.read_exact_within(&mut window[3..4], deadline)?;
        }
    }

    fn read_pdu_body(&mut self, deadline: Instant) -> Result<RawPdu, ProxyError> {
        let mut rest = [0u8; HEADER_LEN - 4];
        self.read_exact_within(&mut rest, deadline)?;
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes[0..4].copy_from_slice(&wire::START_MAGIC_STUB_TO_HOST.to_le_bytes());
        header_bytes[4..].copy_from_slice(&rest);
        let header = <PduHeader as zerocopy::FromBytes>::read_from_bytes(&header_bytes[..])
            .map_err(|_| wire::WireError::BadMagic)?;

        let max_payload = MAX_PDU_SIZE - HEADER_LEN - FOOTER_LEN;
        if header.cb_pdu() as usize > max_payload {
            return Err(ProxyError::FramingError(wire::WireError::PayloadTooLarge));
        }
        if wire::RrnId::from_raw(header.rrn_id_raw()).is_none() {
            return Err(ProxyError::FramingError(wire::WireError::RrnIdOutOfRange));
        }
        if self.connected && header.seq() != self.expected_inbound_seq {
            return Err(ProxyError::SequenceError(format!(
                "expected inbound seq {}, got {}",
                self.expected_inbound_seq,
                header.seq()
            )));
        }
        // CCD must be below the total CCD count; before connect, the total
        // isn't known yet, so only the hard protocol ceiling applies.
        let ccd_limit = self.info.map_or(MAX_CCDS, |info| (info.total_ccds() as usize).min(MAX_CCDS));
        if header.ccd as usize >= ccd_limit {
            return Err(ProxyError::FramingError(wire::WireError::RrnIdOutOfRange));
        }

        let cb_pdu = header.cb_pdu() as usize;
        let pad = pad_len(cb_pdu);
        let mut payload = vec![0u8; cb_pdu + pad];
        self.read_exact_within(&mut payload, deadline)?;
        payload.truncate(cb_pdu);
        let padding = &vec![0u8; pad][..];

        let mut footer_bytes = [0u8; FOOTER_LEN];
        self.read_exact_within(&mut footer_bytes, deadline)?;
        let footer = <PduFooter as zerocopy::FromBytes>::read_from_bytes(&footer_bytes[..])
            .map_err(|_| wire::WireError::BadMagic)?;

        if footer.magic() != wire::END_MAGIC_STUB_TO_HOST {
            return Err(ProxyError::FramingError(wire::WireError::BadMagic));
        }
        if !wire::verify(zerocopy::IntoBytes::as_bytes(&header), &payload, padding, footer.checksum()) {
            return Err(ProxyError::FramingError(wire::WireError::ChecksumMismatch));
        }

        Ok(RawPdu { header, payload })
    }

    fn read_exact_within(&mut self, buf: &mut [u8], deadline: Instant) -> Result<(), ProxyError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.provider.read(&mut buf[filled..])?;
            if n > 0 {
                filled += n;
                continue;
            }
            let budget = ms_until(deadline)?;
            match self.provider.poll(budget)? {
                PollOutcome::Ready => continue,
                PollOutcome::TimedOut => return Err(ProxyError::Timeout),
            }
        }
        Ok(())
    }

    // ---- notification dispatch ----

    fn dispatch_notification(&mut self, rrn: RrnId, ccd: u8, payload: &[u8]) -> Result<(), ProxyError> {
        match rrn {
            RrnId::Beacon => {
                let counter = u32_at(payload, 0)?;
                if !self.connected {
                    self.beacons_seen = counter;
                } else if counter == self.beacons_seen + 1 {
                    self.beacons_seen = counter;
                } else {
                    return Err(ProxyError::ResetDetected);
                }
            }
            RrnId::LogMsg => self.reassemble_log(payload),
            RrnId::OutputBufWrite => {
                if payload.len() < 4 {
                    return Err(ProxyError::UnexpectedPdu);
                }
                let buf_id = u32_at(payload, 0)?;
                self.sink.out_buf_write(buf_id, &payload[4..]);
            }
            RrnId::Irq => {
                if payload.is_empty() {
                    return Err(ProxyError::UnexpectedPdu);
                }
                let idx = ccd as usize;
                if idx >= MAX_CCDS {
                    return Err(ProxyError::ArgumentError("CCD index exceeds hard maximum".into()));
                }
                let flags = payload[0];
                let state = &mut self.ccd_state[idx];
                state.pending_irq = flags & 0x1 != 0;
                state.pending_firq = flags & 0x2 != 0;
                state.notification_pending = true;
            }
            RrnId::CodeModExecFinished => {
                self.pending_exec_finished = Some(payload.to_vec());
            }
            _ => unreachable!("non-notification RRN-ID reached dispatch_notification"),
        }
        log::trace!("dispatched notification {rrn:?} for ccd {ccd}");
        Ok(())
    }

    fn reassemble_log(&mut self, payload: &[u8]) {
        if self.log_buf.len() + payload.len() > LOG_BUF_CAPACITY {
            log::warn!("dropping log PDU that would overflow the {LOG_BUF_CAPACITY}-byte reassembly buffer");
            return;
        }
        self.log_buf.extend_from_slice(payload);
        while let Some(pos) = self.log_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.log_buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            self.sink.log_line(&text);
        }
    }

    pub fn set_last_request_status(&mut self, status: i32) {
        self.last_request_status = status;
    }
}

fn rrn_of(pdu: &RawPdu) -> Result<RrnId, ProxyError> {
    wire::RrnId::from_raw(pdu.header.rrn_id_raw()).ok_or(ProxyError::FramingError(wire::WireError::RrnIdOutOfRange))
}

fn u32_at(buf: &[u8], offset: usize) -> Result<u32, ProxyError> {
    buf.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ProxyError::UnexpectedPdu)
}

pub(crate) fn ms_until(deadline: Instant) -> Result<u32, ProxyError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(ProxyError::Timeout);
    }
    Ok((deadline - now).as_millis().min(u32::MAX as u128) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pspproxy_provider::ProviderError;
    use std::collections::VecDeque;

    /// In-memory loopback provider for engine tests: bytes written with
    /// [`LoopbackProvider::push_inbound`] are what subsequent `read` calls
    /// return.
    #[derive(Default)]
    struct LoopbackProvider {
        inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
    }

    impl LoopbackProvider {
        fn push_inbound(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes);
        }
    }

    impl Provider for LoopbackProvider {
        fn peek(&mut self) -> Result<usize, ProviderError> {
            Ok(self.inbound.len())
        }

        fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProviderError> {
            let n = dst.len().min(self.inbound.len());
            for slot in dst.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write(&mut self, src: &[u8]) -> Result<(), ProviderError> {
            self.outbound.extend_from_slice(src);
            Ok(())
        }

        fn poll(&mut self, _timeout_ms: u32) -> Result<PollOutcome, ProviderError> {
            if self.inbound.is_empty() {
                Ok(PollOutcome::TimedOut)
            } else {
                Ok(PollOutcome::Ready)
            }
        }

        fn interrupt(&mut self) -> Result<(), ProviderError> {
            Ok(())
        }

        fn destroy(&mut self) {}
    }

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<String>,
    }

    impl HostIoSink for RecordingSink {
        fn log_line(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
        fn out_buf_write(&mut self, _buf_id: u32, _bytes: &[u8]) {}
        fn in_buf_peek(&mut self, _buf_id: u32) -> usize {
            0
        }
        fn in_buf_read(&mut self, _buf_id: u32, _dst: &mut [u8]) -> usize {
            0
        }
    }

    fn encode_pdu(rrn: RrnId, seq: u32, ccd: u8, payload: &[u8]) -> Vec<u8> {
        let header = PduHeader::new(wire::START_MAGIC_STUB_TO_HOST, payload.len() as u32, seq, rrn as u16, ccd);
        let pad = vec![0u8; pad_len(payload.len())];
        let checksum = wire::checksum_of(zerocopy::IntoBytes::as_bytes(&header), payload, &pad);
        let footer = PduFooter::new(checksum, wire::END_MAGIC_STUB_TO_HOST);

        let mut out = Vec::new();
        out.extend_from_slice(zerocopy::IntoBytes::as_bytes(&header));
        out.extend_from_slice(payload);
        out.extend_from_slice(&pad);
        out.extend_from_slice(zerocopy::IntoBytes::as_bytes(&footer));
        out
    }

    fn new_engine() -> (PduEngine, LoopbackProvider) {
        // Engine owns the provider; to observe outbound writes in tests we
        // reach through a second handle isn't possible with `Box<dyn _>`,
        // so tests that need outbound bytes construct their own pair and
        // inspect it before handing ownership to the engine where needed.
        let provider = LoopbackProvider::default();
        (PduEngine::new(Box::new(LoopbackProvider::default()), Box::new(RecordingSink::default())), provider)
    }

    #[test]
    fn connect_handshake_happy_path() {
        let mut provider = LoopbackProvider::default();
        provider.push_inbound(&encode_pdu(RrnId::Beacon, 0, 0, &7u32.to_le_bytes()));
        let mut connect_resp_payload = Vec::new();
        connect_resp_payload.extend_from_slice(&256u32.to_le_bytes()); // cb_pdu_max
        connect_resp_payload.extend_from_slice(&0x8000u32.to_le_bytes()); // cb_scratch
        connect_resp_payload.extend_from_slice(&0x2000_0000u32.to_le_bytes()); // scratch addr
        connect_resp_payload.extend_from_slice(&1u32.to_le_bytes()); // sockets
        connect_resp_payload.extend_from_slice(&1u32.to_le_bytes()); // ccds per socket
        provider.push_inbound(&encode_pdu(RrnId::ConnectResponse, 1, 0, &connect_resp_payload));

        let mut engine = PduEngine::new(Box::new(provider), Box::new(RecordingSink::default()));
        let info = engine.connect(1000).unwrap();
        assert_eq!(info.cb_pdu_max, 256);
        assert_eq!(info.total_ccds(), 1);
    }

    #[test]
    fn resync_skips_junk_before_a_valid_pdu() {
        let mut provider = LoopbackProvider::default();
        provider.push_inbound(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        provider.push_inbound(&encode_pdu(RrnId::Beacon, 0, 0, &1u32.to_le_bytes()));

        let mut engine = PduEngine::new(Box::new(provider), Box::new(RecordingSink::default()));
        let pdu = engine.recv_one(1000).unwrap();
        assert_eq!(rrn_of(&pdu).unwrap(), RrnId::Beacon);
    }

    #[test]
    fn reset_detected_when_beacon_counter_regresses() {
        let mut provider = LoopbackProvider::default();
        provider.push_inbound(&encode_pdu(RrnId::Beacon, 0, 0, &1u32.to_le_bytes()));
        let mut engine = PduEngine::new(Box::new(provider), Box::new(RecordingSink::default()));
        engine.connected = true;
        engine.beacons_seen = 5;
        engine.expected_inbound_seq = 0; // bypass seq check for this notification-only test
        let pdu = engine.recv_one(1000).unwrap();
        let rrn = rrn_of(&pdu).unwrap();
        let err = engine.dispatch_notification(rrn, pdu.header.ccd, &pdu.payload).unwrap_err();
        assert!(matches!(err, ProxyError::ResetDetected));
    }

    #[test]
    fn log_reassembly_splits_on_newline() {
        let (mut engine, _unused) = new_engine();
        engine.reassemble_log(b"hello ");
        engine.reassemble_log(b"world\nmore");
        engine.reassemble_log(b" text\n");
        assert!(engine.log_buf.is_empty());
    }

    #[test]
    fn irq_notification_sets_pending_flags_for_its_ccd() {
        let (mut engine, _unused) = new_engine();
        engine.dispatch_notification(RrnId::Irq, 2, &[0x3]).unwrap();
        assert!(engine.ccd_state[2].pending_irq);
        assert!(engine.ccd_state[2].pending_firq);
        assert!(engine.ccd_state[2].notification_pending);
    }

    #[test]
    fn wfi_reports_and_clears_pending_irq() {
        let (mut engine, _unused) = new_engine();
        engine.dispatch_notification(RrnId::Irq, 0, &[0x1]).unwrap();
        let outcome = engine.wfi(0).unwrap();
        assert_eq!(outcome, WfiOutcome::Change { ccd: 0, irq: true, firq: false });
        assert_eq!(engine.wfi(0).unwrap(), WfiOutcome::NoChange);
    }
}

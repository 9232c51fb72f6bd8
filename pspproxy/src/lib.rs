// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side client for the PSP proxy PDU protocol.
//!
//! [`ProxyContext`] is the public, typed entry point: it validates argument
//! shape (sizes, strides, flag combinations) before any wire traffic, then
//! routes to [`PduEngine`] for the framed request/response/notification
//! protocol. `PduEngine` in turn drives a [`pspproxy_provider::Provider`]
//! trait object for the byte-level transport. Each layer owns the next
//! rather than reaching through it: callers only ever see `ProxyContext`,
//! which owns the engine, which owns the provider.
//!
//! Request/response payload layouts for each operation (field order, the
//! leading status word on every response) are documented per-operation in
//! `DESIGN.md` alongside the field tables.

mod engine;
mod error;
mod hostio;
mod scratch;

pub use engine::{ConnectionInfo, WfiOutcome};
pub use error::ProxyError;
pub use hostio::{HostIoSink, StdIoSink};
pub use scratch::ScratchAllocator;

use std::time::{Duration, Instant};

use pspproxy_wire::{
    Address, CachingHint, DataXferFlags, PspAddr, RrnId, SmnAddr, X86PhysAddr, FOOTER_LEN,
    HEADER_LEN,
};

use engine::{ms_until, PduEngine, XFER_FIXED_FIELDS_LEN};

/// Fixed fields preceding the inline payload of `PspMemRead`/`PspMemWrite`:
/// `addr:u32, cb_xfer:u32`.
const PSP_MEM_FIXED_FIELDS_LEN: usize = 8;
/// Fixed fields of a `PspMmioRead`/`PspMmioWrite`/`SmnRead`/`SmnWrite`
/// register access: `addr:u32, size:u8, reserved:u8x3`.
const REG_ACCESS_FIXED_FIELDS_LEN: usize = 8;
/// Fixed fields preceding the inline payload of `X86MemRead`/`X86MemWrite`:
/// `addr:u64, cb_xfer:u32, caching_hint:u8, reserved:u8x3`.
const X86_MEM_FIXED_FIELDS_LEN: usize = 16;
/// Fixed fields of an `X86MmioRead`/`X86MmioWrite` register access:
/// `addr:u64, size:u8, caching_hint:u8, reserved:u8x2`.
const X86_REG_ACCESS_FIXED_FIELDS_LEN: usize = 12;
/// Fixed fields of a `CoProcRead`/`CoProcWrite` request:
/// `id_coproc:u8, crn:u8, crm:u8, opc1:u8, opc2:u8, reserved:u8x3`.
const COPROC_FIXED_FIELDS_LEN: usize = 8;
/// Fixed fields preceding the inline payload of an `InputBufWrite`:
/// `buffer_id:u32`.
const INPUT_BUF_FIXED_FIELDS_LEN: usize = 4;

/// How long a single `pump_one` slice of the code-module exec runloop waits
/// before checking stdin again.
const RUNLOOP_SLICE_MS: u32 = 50;
/// Local stack buffer size for one `InputBufWrite` fed from host stdin.
const RUNLOOP_STDIN_CHUNK: usize = 256;

fn validate_reg_size(size: u8) -> Result<(), ProxyError> {
    match size {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(ProxyError::ArgumentError(format!("register size must be 1, 2, 4, or 8, got {size}"))),
    }
}

fn le_bytes_to_u64(data: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..data.len()].copy_from_slice(data);
    u64::from_le_bytes(buf)
}

fn addr_space_tag(addr: Address) -> (u64, u8) {
    match addr {
        Address::PspMem(a) => (a.0 as u64, 0),
        Address::PspMmio(a) => (a.0 as u64, 1),
        Address::Smn(a) => (a.0 as u64, 2),
        Address::X86Mem(a, _hint) => (a.0, 3),
        Address::X86Mmio(a, _hint) => (a.0, 4),
    }
}

fn round_down_to_stride(cap: usize, stride: u8) -> usize {
    cap - (cap % stride as usize)
}

fn caching_hint_byte(hint: CachingHint) -> u8 {
    match hint {
        CachingHint::Default => 0,
        CachingHint::Uncached => 1,
        CachingHint::WriteCombine => 2,
    }
}

/// The host-side client for one PSP stub connection.
///
/// Exclusively owns a [`PduEngine`], which in turn exclusively owns its
/// `Provider` and `HostIoSink`; dropping a `ProxyContext` releases the
/// whole chain. Not `Sync`: the `Provider` and `HostIoSink` trait objects
/// carry no `Send`/`Sync` bound, so the compiler already refuses to share
/// or move a `ProxyContext` across a thread boundary where that would be
/// unsound — the single-threaded cooperative scheduling model falls out
/// of the type system rather than a runtime check.
pub struct ProxyContext {
    engine: PduEngine,
    scratch: Option<ScratchAllocator>,
    ccd: u8,
}

impl ProxyContext {
    /// Opens `device_uri` (a `scheme://rest` device URI), then runs the
    /// connect handshake bounded by `connect_timeout_ms`. The handshake is
    /// unconditional: every provider, including `em100tcp`'s ring-buffer
    /// channel, goes through it.
    pub fn new(device_uri: &str, sink: Box<dyn HostIoSink>, connect_timeout_ms: u32) -> Result<Self, ProxyError> {
        let provider = pspproxy_provider::open(device_uri)?;
        let mut engine = PduEngine::new(provider, sink);
        engine.connect(connect_timeout_ms)?;
        log::info!("connected to {device_uri}");
        Ok(ProxyContext { engine, scratch: None, ccd: 0 })
    }

    /// Consumes and drops the context, releasing the transport substrate.
    /// Equivalent to simply letting the value go out of scope; provided so
    /// callers can name the moment of release explicitly.
    pub fn destroy(self) {}

    /// Connection parameters learned at handshake. Always populated: a
    /// `ProxyContext` cannot exist without having connected successfully.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.engine
            .connection_info()
            .expect("ProxyContext::new always completes the connect handshake before returning")
    }

    /// The status code carried by the most recent response, 0 on success.
    pub fn last_request_status(&self) -> i32 {
        self.engine.last_request_status()
    }

    /// The CCD index used as the implicit target for PSP mem/MMIO,
    /// coprocessor, code-module, and branch-to operations.
    pub fn current_ccd(&self) -> u8 {
        self.ccd
    }

    /// Selects the CCD used as the implicit target for later operations.
    /// Don't call this again on a context that has already performed a
    /// scratch allocation — each PSP has its own scratch region, so the
    /// allocator's bookkeeping would describe the wrong CCD after a
    /// switch. Use one `ProxyContext` per CCD instead.
    pub fn select_ccd(&mut self, ccd: u8) -> Result<(), ProxyError> {
        let total = self.connection_info().total_ccds();
        if ccd as u32 >= total {
            return Err(ProxyError::ArgumentError(format!("ccd {ccd} out of range (0..{total})")));
        }
        self.ccd = ccd;
        Ok(())
    }

    /// Strips and validates the 4-byte little-endian status word every
    /// response payload leads with, recording it for
    /// `last_request_status` and translating a non-zero status into
    /// `RemoteError`.
    fn strip_status<'a>(&mut self, payload: &'a [u8]) -> Result<&'a [u8], ProxyError> {
        if payload.len() < 4 {
            return Err(ProxyError::UnexpectedPdu);
        }
        let status = i32::from_le_bytes(payload[0..4].try_into().unwrap());
        self.engine.set_last_request_status(status);
        if status != 0 {
            return Err(ProxyError::RemoteError(status));
        }
        Ok(&payload[4..])
    }

    // ---- SMN ----

    pub fn smn_read(&mut self, ccd: u8, addr: SmnAddr, size: u8, timeout_ms: u32) -> Result<u64, ProxyError> {
        validate_reg_size(size)?;
        let mut payload = Vec::with_capacity(REG_ACCESS_FIXED_FIELDS_LEN);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.extend_from_slice(&[0u8; 3]);
        let resp = self.engine.request_response(RrnId::SmnRead, ccd, &payload, timeout_ms)?;
        let data = self.strip_status(&resp)?;
        if data.len() != size as usize {
            return Err(ProxyError::PayloadSizeMismatch);
        }
        Ok(le_bytes_to_u64(data))
    }

    pub fn smn_write(&mut self, ccd: u8, addr: SmnAddr, size: u8, value: u64, timeout_ms: u32) -> Result<(), ProxyError> {
        validate_reg_size(size)?;
        let mut payload = Vec::with_capacity(REG_ACCESS_FIXED_FIELDS_LEN + size as usize);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.extend_from_slice(&[0u8; 3]);
        payload.extend_from_slice(&value.to_le_bytes()[..size as usize]);
        let resp = self.engine.request_response(RrnId::SmnWrite, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;
        Ok(())
    }

    // ---- PSP memory ----

    pub fn psp_mem_read(&mut self, addr: PspAddr, dst: &mut [u8], timeout_ms: u32) -> Result<(), ProxyError> {
        let chunk_cap = self.engine.max_payload_for_fixed_fields(PSP_MEM_FIXED_FIELDS_LEN)?;
        let ccd = self.ccd;
        let mut cur = addr;
        let mut off = 0;
        while off < dst.len() {
            let chunk = (dst.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(PSP_MEM_FIXED_FIELDS_LEN);
            payload.extend_from_slice(&cur.0.to_le_bytes());
            payload.extend_from_slice(&(chunk as u32).to_le_bytes());
            let resp = self.engine.request_response(RrnId::PspMemRead, ccd, &payload, timeout_ms)?;
            let data = self.strip_status(&resp)?;
            if data.len() != chunk {
                return Err(ProxyError::PayloadSizeMismatch);
            }
            dst[off..off + chunk].copy_from_slice(data);
            off += chunk;
            cur = cur.offset(chunk as u32);
        }
        Ok(())
    }

    pub fn psp_mem_write(&mut self, addr: PspAddr, src: &[u8], timeout_ms: u32) -> Result<(), ProxyError> {
        let chunk_cap = self.engine.max_payload_for_fixed_fields(PSP_MEM_FIXED_FIELDS_LEN)?;
        let ccd = self.ccd;
        let mut cur = addr;
        let mut off = 0;
        while off < src.len() {
            let chunk = (src.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(PSP_MEM_FIXED_FIELDS_LEN + chunk);
            payload.extend_from_slice(&cur.0.to_le_bytes());
            payload.extend_from_slice(&(chunk as u32).to_le_bytes());
            payload.extend_from_slice(&src[off..off + chunk]);
            let resp = self.engine.request_response(RrnId::PspMemWrite, ccd, &payload, timeout_ms)?;
            self.strip_status(&resp)?;
            off += chunk;
            cur = cur.offset(chunk as u32);
        }
        Ok(())
    }

    pub fn psp_mmio_read(&mut self, addr: PspAddr, size: u8, timeout_ms: u32) -> Result<u64, ProxyError> {
        validate_reg_size(size)?;
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(REG_ACCESS_FIXED_FIELDS_LEN);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.extend_from_slice(&[0u8; 3]);
        let resp = self.engine.request_response(RrnId::PspMmioRead, ccd, &payload, timeout_ms)?;
        let data = self.strip_status(&resp)?;
        if data.len() != size as usize {
            return Err(ProxyError::PayloadSizeMismatch);
        }
        Ok(le_bytes_to_u64(data))
    }

    pub fn psp_mmio_write(&mut self, addr: PspAddr, size: u8, value: u64, timeout_ms: u32) -> Result<(), ProxyError> {
        validate_reg_size(size)?;
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(REG_ACCESS_FIXED_FIELDS_LEN + size as usize);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.extend_from_slice(&[0u8; 3]);
        payload.extend_from_slice(&value.to_le_bytes()[..size as usize]);
        let resp = self.engine.request_response(RrnId::PspMmioWrite, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;
        Ok(())
    }

    // ---- x86 memory / MMIO ----

    pub fn x86_mem_read(&mut self, addr: X86PhysAddr, dst: &mut [u8], hint: CachingHint, timeout_ms: u32) -> Result<(), ProxyError> {
        let chunk_cap = self.engine.max_payload_for_fixed_fields(X86_MEM_FIXED_FIELDS_LEN)?;
        let ccd = self.ccd;
        let cache = caching_hint_byte(hint);
        let mut cur = addr;
        let mut off = 0;
        while off < dst.len() {
            let chunk = (dst.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(X86_MEM_FIXED_FIELDS_LEN);
            payload.extend_from_slice(&cur.0.to_le_bytes());
            payload.extend_from_slice(&(chunk as u32).to_le_bytes());
            payload.push(cache);
            payload.extend_from_slice(&[0u8; 3]);
            let resp = self.engine.request_response(RrnId::X86MemRead, ccd, &payload, timeout_ms)?;
            let data = self.strip_status(&resp)?;
            if data.len() != chunk {
                return Err(ProxyError::PayloadSizeMismatch);
            }
            dst[off..off + chunk].copy_from_slice(data);
            off += chunk;
            cur = cur.offset(chunk as u64);
        }
        Ok(())
    }

    pub fn x86_mem_write(&mut self, addr: X86PhysAddr, src: &[u8], hint: CachingHint, timeout_ms: u32) -> Result<(), ProxyError> {
        let chunk_cap = self.engine.max_payload_for_fixed_fields(X86_MEM_FIXED_FIELDS_LEN)?;
        let ccd = self.ccd;
        let cache = caching_hint_byte(hint);
        let mut cur = addr;
        let mut off = 0;
        while off < src.len() {
            let chunk = (src.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(X86_MEM_FIXED_FIELDS_LEN + chunk);
            payload.extend_from_slice(&cur.0.to_le_bytes());
            payload.extend_from_slice(&(chunk as u32).to_le_bytes());
            payload.push(cache);
            payload.extend_from_slice(&[0u8; 3]);
            payload.extend_from_slice(&src[off..off + chunk]);
            let resp = self.engine.request_response(RrnId::X86MemWrite, ccd, &payload, timeout_ms)?;
            self.strip_status(&resp)?;
            off += chunk;
            cur = cur.offset(chunk as u64);
        }
        Ok(())
    }

    pub fn x86_mmio_read(&mut self, addr: X86PhysAddr, size: u8, hint: CachingHint, timeout_ms: u32) -> Result<u64, ProxyError> {
        validate_reg_size(size)?;
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(X86_REG_ACCESS_FIXED_FIELDS_LEN);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.push(caching_hint_byte(hint));
        payload.extend_from_slice(&[0u8; 2]);
        let resp = self.engine.request_response(RrnId::X86MmioRead, ccd, &payload, timeout_ms)?;
        let data = self.strip_status(&resp)?;
        if data.len() != size as usize {
            return Err(ProxyError::PayloadSizeMismatch);
        }
        Ok(le_bytes_to_u64(data))
    }

    pub fn x86_mmio_write(&mut self, addr: X86PhysAddr, size: u8, value: u64, hint: CachingHint, timeout_ms: u32) -> Result<(), ProxyError> {
        validate_reg_size(size)?;
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(X86_REG_ACCESS_FIXED_FIELDS_LEN + size as usize);
        payload.extend_from_slice(&addr.0.to_le_bytes());
        payload.push(size);
        payload.push(caching_hint_byte(hint));
        payload.extend_from_slice(&[0u8; 2]);
        payload.extend_from_slice(&value.to_le_bytes()[..size as usize]);
        let resp = self.engine.request_response(RrnId::X86MmioWrite, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;
        Ok(())
    }

    // ---- generic address-space transfer ----

    /// The stride-/flags-/address-space-parameterized generic transfer.
    /// `buf` is the data read into or written from, depending on
    /// `flags`; for `MEMSET`, `buf` holds one stride's worth of pattern
    /// data that gets repeated `buf.len() / stride` times (the wire
    /// transfer still only ever sends one stride's worth per request).
    pub fn data_xfer(
        &mut self,
        addr: Address,
        flags: DataXferFlags,
        stride: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), ProxyError> {
        if !flags.is_well_formed() {
            return Err(ProxyError::ArgumentError("DataXfer flags must set exactly one of READ/WRITE, and MEMSET only with WRITE".into()));
        }
        if !matches!(stride, 1 | 2 | 4) {
            return Err(ProxyError::ArgumentError(format!("DataXfer stride must be 1, 2, or 4, got {stride}")));
        }
        if buf.len() % stride as usize != 0 {
            return Err(ProxyError::ArgumentError("DataXfer length is not a multiple of stride".into()));
        }

        let is_read = flags.contains(DataXferFlags::READ);
        let is_memset = flags.contains(DataXferFlags::MEMSET);
        let incr = flags.contains(DataXferFlags::INCR_ADDR);
        let ccd = self.ccd;
        let (mut cur_addr, addr_space) = addr_space_tag(addr);
        let chunk_cap = round_down_to_stride(self.engine.max_xfer_payload_per_pdu()?, stride);
        if chunk_cap == 0 {
            return Err(ProxyError::ArgumentError("negotiated PDU size too small for this stride".into()));
        }

        if is_memset {
            let mut off = 0;
            let stride_len = stride as usize;
            while off < buf.len() {
                let mut payload = Vec::with_capacity(XFER_FIXED_FIELDS_LEN + stride_len);
                payload.extend_from_slice(&cur_addr.to_le_bytes());
                payload.extend_from_slice(&(buf.len() as u32).to_le_bytes());
                payload.push(flags.bits() as u8);
                payload.push(stride);
                payload.push(addr_space);
                payload.push(0);
                payload.extend_from_slice(&buf[off..off + stride_len]);
                let resp = self.engine.request_response(RrnId::DataXfer, ccd, &payload, timeout_ms)?;
                self.strip_status(&resp)?;
                off += stride_len;
                if incr {
                    cur_addr += stride_len as u64;
                }
            }
            return Ok(());
        }

        let mut off = 0;
        while off < buf.len() {
            let chunk = (buf.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(XFER_FIXED_FIELDS_LEN + if is_read { 0 } else { chunk });
            payload.extend_from_slice(&cur_addr.to_le_bytes());
            payload.extend_from_slice(&(chunk as u32).to_le_bytes());
            payload.push(flags.bits() as u8);
            payload.push(stride);
            payload.push(addr_space);
            payload.push(0);
            if !is_read {
                payload.extend_from_slice(&buf[off..off + chunk]);
            }
            let resp = self.engine.request_response(RrnId::DataXfer, ccd, &payload, timeout_ms)?;
            if is_read {
                let data = self.strip_status(&resp)?;
                if data.len() != chunk {
                    return Err(ProxyError::PayloadSizeMismatch);
                }
                buf[off..off + chunk].copy_from_slice(data);
            } else {
                self.strip_status(&resp)?;
            }
            off += chunk;
            if incr {
                cur_addr += chunk as u64;
            }
        }
        Ok(())
    }

    // ---- coprocessor ----

    pub fn coproc_read(&mut self, id_coproc: u8, crn: u8, crm: u8, opc1: u8, opc2: u8, timeout_ms: u32) -> Result<u32, ProxyError> {
        let ccd = self.ccd;
        let payload = [id_coproc, crn, crm, opc1, opc2, 0, 0, 0];
        debug_assert_eq!(payload.len(), COPROC_FIXED_FIELDS_LEN);
        let resp = self.engine.request_response(RrnId::CoProcRead, ccd, &payload, timeout_ms)?;
        let data = self.strip_status(&resp)?;
        if data.len() != 4 {
            return Err(ProxyError::PayloadSizeMismatch);
        }
        Ok(u32::from_le_bytes(data.try_into().unwrap()))
    }

    pub fn coproc_write(&mut self, id_coproc: u8, crn: u8, crm: u8, opc1: u8, opc2: u8, value: u32, timeout_ms: u32) -> Result<(), ProxyError> {
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(COPROC_FIXED_FIELDS_LEN + 4);
        payload.extend_from_slice(&[id_coproc, crn, crm, opc1, opc2, 0, 0, 0]);
        payload.extend_from_slice(&value.to_le_bytes());
        let resp = self.engine.request_response(RrnId::CoProcWrite, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;
        Ok(())
    }

    // ---- wait-for-interrupt ----

    pub fn wfi(&mut self, timeout_ms: u32) -> Result<WfiOutcome, ProxyError> {
        self.engine.wfi(timeout_ms)
    }

    // ---- scratch space ----

    fn scratch_allocator(&mut self) -> Result<&mut ScratchAllocator, ProxyError> {
        if self.scratch.is_none() {
            let info = self.connection_info();
            self.scratch = Some(ScratchAllocator::new(PspAddr(info.psp_addr_scratch), info.cb_scratch));
        }
        Ok(self.scratch.as_mut().expect("just initialized above"))
    }

    pub fn scratch_alloc(&mut self, len: u32) -> Result<PspAddr, ProxyError> {
        self.scratch_allocator()?.alloc(len)
    }

    pub fn scratch_free(&mut self, addr: PspAddr, len: u32) -> Result<(), ProxyError> {
        self.scratch_allocator()?.free(addr, len)
    }

    // ---- code module upload / execute ----

    /// Uploads `module` as a flat binary: one `LoadCodeMod` request naming
    /// buffer 0, then the module bits streamed via repeated
    /// `InputBufWrite` requests chunked to the negotiated max.
    pub fn code_mod_load(&mut self, module: &[u8], timeout_ms: u32) -> Result<(), ProxyError> {
        const CODE_MOD_TYPE_FLAT_BINARY: u8 = 0;
        const LOAD_CODE_MOD_FIXED_FIELDS_LEN: usize = 8;

        let ccd = self.ccd;
        let mut load_payload = Vec::with_capacity(LOAD_CODE_MOD_FIXED_FIELDS_LEN);
        load_payload.push(CODE_MOD_TYPE_FLAT_BINARY);
        load_payload.extend_from_slice(&[0u8; 3]);
        load_payload.extend_from_slice(&0u32.to_le_bytes()); // input_buffer_id
        let resp = self.engine.request_response(RrnId::LoadCodeMod, ccd, &load_payload, timeout_ms)?;
        self.strip_status(&resp)?;

        let chunk_cap = self.engine.max_payload_for_fixed_fields(INPUT_BUF_FIXED_FIELDS_LEN)?;
        let mut off = 0;
        while off < module.len() {
            let chunk = (module.len() - off).min(chunk_cap);
            let mut payload = Vec::with_capacity(INPUT_BUF_FIXED_FIELDS_LEN + chunk);
            payload.extend_from_slice(&0u32.to_le_bytes());
            payload.extend_from_slice(&module[off..off + chunk]);
            let resp = self.engine.request_response(RrnId::InputBufWrite, ccd, &payload, timeout_ms)?;
            self.strip_status(&resp)?;
            off += chunk;
        }
        log::info!("uploaded {} byte code module", module.len());
        Ok(())
    }

    /// Sends `ExecCodeMod` with the four argument registers, then drives the
    /// cooperative runloop: pumps notifications (`LogMsg`,
    /// `OutputBufWrite`, `Irq`) until `CodeModExecFinished` arrives, and on
    /// every receive timeout checks `HostIoSink::in_buf_peek` for stdin
    /// data to forward as an `InputBufWrite`. Bounded in total by
    /// `timeout_ms`.
    pub fn code_mod_exec(&mut self, args: [u32; 4], timeout_ms: u32) -> Result<u32, ProxyError> {
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(16);
        for arg in args {
            payload.extend_from_slice(&arg.to_le_bytes());
        }
        let resp = self.engine.request_response(RrnId::ExecCodeMod, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            if let Some(ret) = self.engine.take_exec_finished() {
                return Ok(ret);
            }
            let remaining = ms_until(deadline)?;
            let slice = remaining.min(RUNLOOP_SLICE_MS);
            match self.engine.pump_one(slice)? {
                Some(_) => {
                    if let Some(ret) = self.engine.take_exec_finished() {
                        return Ok(ret);
                    }
                }
                None => self.feed_stdin_to_code_mod(ccd, timeout_ms)?,
            }
        }
    }

    fn feed_stdin_to_code_mod(&mut self, ccd: u8, timeout_ms: u32) -> Result<(), ProxyError> {
        let avail = self.engine.sink_mut().in_buf_peek(0);
        if avail == 0 {
            return Ok(());
        }
        let mut buf = [0u8; RUNLOOP_STDIN_CHUNK];
        let want = avail.min(RUNLOOP_STDIN_CHUNK);
        let n = self.engine.sink_mut().in_buf_read(0, &mut buf[..want]);
        if n == 0 {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(INPUT_BUF_FIXED_FIELDS_LEN + n);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&buf[..n]);
        let resp = self.engine.request_response(RrnId::InputBufWrite, ccd, &payload, timeout_ms)?;
        self.strip_status(&resp)?;
        Ok(())
    }

    // ---- branch-to ----

    /// One-way request that transfers control on the PSP to `target`; no
    /// response is expected, so a successful send is all this returns —
    /// the stub may never respond again after a real branch.
    pub fn branch_to(&mut self, target: u32, thumb: bool, regs: [u32; 13]) -> Result<(), ProxyError> {
        let ccd = self.ccd;
        let mut payload = Vec::with_capacity(4 + 4 + 13 * 4);
        payload.extend_from_slice(&target.to_le_bytes());
        payload.push(thumb as u8);
        payload.extend_from_slice(&[0u8; 3]);
        for r in regs {
            payload.extend_from_slice(&r.to_le_bytes());
        }
        self.engine.send_one_way(RrnId::BranchTo, ccd, &payload)
    }
}

// Silence "unused" on the wire-layer sizing constants imported purely for
// the doc comments above to stay accurate if header/footer sizes change.
const _: usize = HEADER_LEN + FOOTER_LEN;

#[cfg(test)]
mod tests {
    use super::*;
    use pspproxy_provider::{PollOutcome, Provider, ProviderError};
    use pspproxy_wire::{self as wire, pad_len, PduFooter, PduHeader};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct LoopbackProvider {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
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

    fn connect_response_payload(cb_pdu_max: u32, cb_scratch: u32, scratch_addr: u32, sockets: u32, ccds_per_socket: u32) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&cb_pdu_max.to_le_bytes());
        p.extend_from_slice(&cb_scratch.to_le_bytes());
        p.extend_from_slice(&scratch_addr.to_le_bytes());
        p.extend_from_slice(&sockets.to_le_bytes());
        p.extend_from_slice(&ccds_per_socket.to_le_bytes());
        p
    }

    /// Builds a `ProxyContext` whose transport is a `LoopbackProvider`
    /// preloaded with a beacon and connect response, and queues `replies`
    /// (already-encoded PDUs) to be returned for subsequent requests.
    fn connected_ctx(cb_pdu_max: u32, extra_inbound: &[u8]) -> ProxyContext {
        let mut provider = LoopbackProvider::default();
        provider.push_inbound(&encode_pdu(RrnId::Beacon, 0, 0, &7u32.to_le_bytes()));
        provider.push_inbound(&encode_pdu(
            RrnId::ConnectResponse,
            1,
            0,
            &connect_response_payload(cb_pdu_max, 0x8000, 0x2000_0000, 1, 1),
        ));
        provider.push_inbound(extra_inbound);

        let mut engine = PduEngine::new(Box::new(provider), Box::new(StdIoSink::new()));
        engine.connect(1000).unwrap();
        ProxyContext { engine, scratch: None, ccd: 0 }
    }

    fn ok_response(data: &[u8]) -> Vec<u8> {
        let mut p = 0i32.to_le_bytes().to_vec();
        p.extend_from_slice(data);
        p
    }

    #[test]
    fn smn_read_decodes_little_endian_value() {
        let resp = encode_pdu(RrnId::SmnReadResponse, 1, 0, &ok_response(&[0xDE, 0xAD, 0xBE, 0xEF]));
        let mut ctx = connected_ctx(256, &resp);
        let value = ctx.smn_read(0, SmnAddr(0x0005_A078), 4, 1000).unwrap();
        assert_eq!(value, 0xEFBE_ADDE);
    }

    #[test]
    fn smn_read_rejects_bad_size_before_any_wire_traffic() {
        let mut ctx = connected_ctx(256, &[]);
        let err = ctx.smn_read(0, SmnAddr(0), 3, 1000).unwrap_err();
        assert!(matches!(err, ProxyError::ArgumentError(_)));
    }

    #[test]
    fn psp_mem_read_chunks_across_the_negotiated_pdu_size() {
        let cb_pdu_max = 256u32;
        let chunk_cap = cb_pdu_max as usize - HEADER_LEN - FOOTER_LEN - PSP_MEM_FIXED_FIELDS_LEN;
        let total = 1024usize;
        let data: Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();

        let mut inbound = Vec::new();
        let mut off = 0;
        let mut seq = 1u32;
        while off < total {
            let n = (total - off).min(chunk_cap);
            inbound.extend_from_slice(&encode_pdu(RrnId::PspMemReadResponse, seq, 0, &ok_response(&data[off..off + n])));
            off += n;
            seq += 1;
        }

        let mut ctx = connected_ctx(cb_pdu_max, &inbound);
        let mut dst = vec![0u8; total];
        ctx.psp_mem_read(PspAddr(0x4000_0000), &mut dst, 1000).unwrap();
        assert_eq!(dst, data);
    }

    #[test]
    fn remote_error_status_surfaces_and_is_remembered() {
        let mut bad = (-5i32).to_le_bytes().to_vec();
        bad.extend_from_slice(&[0u8; 4]);
        let resp = encode_pdu(RrnId::SmnReadResponse, 1, 0, &bad);
        let mut ctx = connected_ctx(256, &resp);
        let err = ctx.smn_read(0, SmnAddr(0), 4, 1000).unwrap_err();
        assert!(matches!(err, ProxyError::RemoteError(-5)));
        assert_eq!(ctx.last_request_status(), -5);
    }

    #[test]
    fn select_ccd_rejects_out_of_range_index() {
        let mut ctx = connected_ctx(256, &[]);
        assert_eq!(ctx.connection_info().total_ccds(), 1);
        assert!(ctx.select_ccd(1).is_err());
        assert!(ctx.select_ccd(0).is_ok());
    }

    #[test]
    fn scratch_alloc_lazily_inits_from_connect_response() {
        let mut ctx = connected_ctx(256, &[]);
        let addr = ctx.scratch_alloc(0x1000).unwrap();
        assert_eq!(addr, PspAddr(0x2000_0000 + 0x8000 - 0x1000));
        ctx.scratch_free(addr, 0x1000).unwrap();
    }

    #[test]
    fn data_xfer_rejects_malformed_flag_combination() {
        let mut ctx = connected_ctx(256, &[]);
        let mut buf = [0u8; 4];
        let err = ctx
            .data_xfer(Address::PspMem(PspAddr(0)), DataXferFlags::READ | DataXferFlags::WRITE, 4, &mut buf, 1000)
            .unwrap_err();
        assert!(matches!(err, ProxyError::ArgumentError(_)));
    }

    #[test]
    fn data_xfer_rejects_length_not_a_multiple_of_stride() {
        let mut ctx = connected_ctx(256, &[]);
        let mut buf = [0u8; 3];
        let err = ctx.data_xfer(Address::PspMem(PspAddr(0)), DataXferFlags::READ, 4, &mut buf, 1000).unwrap_err();
        assert!(matches!(err, ProxyError::ArgumentError(_)));
    }

    #[test]
    fn data_xfer_read_round_trips_one_chunk() {
        let resp = encode_pdu(RrnId::DataXferResponse, 1, 0, &ok_response(&[1, 2, 3, 4]));
        let mut ctx = connected_ctx(256, &resp);
        let mut buf = [0u8; 4];
        ctx.data_xfer(Address::PspMem(PspAddr(0x1000)), DataXferFlags::READ, 4, &mut buf, 1000).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn code_mod_load_sends_load_then_chunked_input_writes() {
        let cb_pdu_max = 64u32;
        let load_resp = encode_pdu(RrnId::LoadCodeModResponse, 1, 0, &ok_response(&[]));
        let chunk_cap = cb_pdu_max as usize - HEADER_LEN - FOOTER_LEN - INPUT_BUF_FIXED_FIELDS_LEN;
        let module = vec![0xAAu8; chunk_cap * 2 + 3];
        let mut inbound = load_resp;
        let n_chunks = (module.len() + chunk_cap - 1) / chunk_cap;
        for i in 0..n_chunks {
            inbound.extend_from_slice(&encode_pdu(RrnId::InputBufWriteResponse, 2 + i as u32, 0, &ok_response(&[])));
        }
        let mut ctx = connected_ctx(cb_pdu_max, &inbound);
        ctx.code_mod_load(&module, 1000).unwrap();
    }

    #[test]
    fn code_mod_exec_returns_value_from_exec_finished_notification() {
        let exec_resp = encode_pdu(RrnId::ExecCodeModResponse, 1, 0, &ok_response(&[]));
        let finished = encode_pdu(RrnId::CodeModExecFinished, 2, 0, &0x1234u32.to_le_bytes());
        let mut inbound = exec_resp;
        inbound.extend_from_slice(&finished);
        let mut ctx = connected_ctx(256, &inbound);
        let ret = ctx.code_mod_exec([0, 0, 0, 0], 1000).unwrap();
        assert_eq!(ret, 0x1234);
    }

    #[test]
    fn branch_to_is_one_way_and_does_not_await_a_response() {
        let mut ctx = connected_ctx(256, &[]);
        ctx.branch_to(0x1000_0000, true, [0u32; 13]).unwrap();
    }
}

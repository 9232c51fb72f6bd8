// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SPI-flash ring-buffer provider, fronted by a network flash emulator.
//!
//! The transport isn't a byte stream at all but a SPI flash image, shared
//! with the PSP through a fixed-offset message-channel header containing
//! two ring buffers (`ext2psp` for host->PSP traffic, `psp2ext` for
//! PSP->host). The host reads and writes that flash image over a small
//! request/response protocol (a magic-tagged header, a status word, and a
//! payload) carried on a plain TCP connection to the flash emulator; this
//! is unrelated to the `tcp` provider's own PDU framing, which here rides
//! on top of the ring buffers instead of directly on the socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::{PollOutcome, Provider, ProviderError};

const REQHDR_MAGIC: u32 = 0xebad_c0de;
const REQ_CMD_READ: u32 = 0;
const REQ_CMD_WRITE: u32 = 1;

const SPI_MSG_CHAN_HDR_OFF: u32 = 0x00aa_b000;
const SPI_MSG_CHAN_HDR_MAGIC: u32 = 0x1892_0103;
const RING_BUF_CAPACITY: u32 = 4096;

/// `off_ext2psp_buf`, `off_psp2ext_buf`, and the two [`RingBufHeader`]s, plus
/// the trailing magic.
const MSG_CHAN_HDR_LEN: u32 = 4 + 4 + RING_BUF_HEADER_LEN * 2 + 4;
const RING_BUF_HEADER_LEN: u32 = 12;

/// Byte offset of the ext->psp ring's `off_head` field within
/// [`MsgChanHdr`]'s on-flash layout, used to write back just the advanced
/// pointer rather than the whole header.
const EXT2PSP_HEAD_FIELD_OFF: u32 = 4 + 4 + 4;
const PSP2EXT_TAIL_FIELD_OFF: u32 = 4 + 4 + RING_BUF_HEADER_LEN + 8;

#[derive(Debug, Clone, Copy, Default)]
struct RingBufHeader {
    cb_ring_buf: u32,
    off_head: u32,
    off_tail: u32,
}

impl RingBufHeader {
    fn from_bytes(b: &[u8]) -> Self {
        RingBufHeader {
            cb_ring_buf: u32::from_le_bytes(b[0..4].try_into().unwrap()),
            off_head: u32::from_le_bytes(b[4..8].try_into().unwrap()),
            off_tail: u32::from_le_bytes(b[8..12].try_into().unwrap()),
        }
    }

    fn to_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.cb_ring_buf.to_le_bytes());
        out[4..8].copy_from_slice(&self.off_head.to_le_bytes());
        out[8..12].copy_from_slice(&self.off_tail.to_le_bytes());
        out
    }

    fn free(&self) -> u32 {
        if self.off_head >= self.off_tail {
            self.cb_ring_buf - (self.off_head - self.off_tail)
        } else {
            self.off_tail - self.off_head
        }
    }

    fn used(&self) -> u32 {
        self.cb_ring_buf - self.free()
    }

    fn writable_in_one_go(&self) -> u32 {
        self.free().min(self.cb_ring_buf - self.off_head)
    }

    fn readable_in_one_go(&self) -> u32 {
        self.used().min(self.cb_ring_buf - self.off_tail)
    }

    fn advance_write(&mut self, n: u32) {
        self.off_head = (self.off_head + n) % self.cb_ring_buf;
    }

    fn advance_read(&mut self, n: u32) {
        self.off_tail = (self.off_tail + n) % self.cb_ring_buf;
    }
}

#[derive(Debug, Clone, Copy)]
struct MsgChanHdr {
    off_ext2psp_buf: u32,
    off_psp2ext_buf: u32,
    ext2psp: RingBufHeader,
    psp2ext: RingBufHeader,
}

impl MsgChanHdr {
    fn fresh() -> Self {
        MsgChanHdr {
            off_ext2psp_buf: MSG_CHAN_HDR_LEN,
            off_psp2ext_buf: MSG_CHAN_HDR_LEN + RING_BUF_CAPACITY,
            ext2psp: RingBufHeader { cb_ring_buf: RING_BUF_CAPACITY, off_head: 0, off_tail: 0 },
            psp2ext: RingBufHeader { cb_ring_buf: RING_BUF_CAPACITY, off_head: 0, off_tail: 0 },
        }
    }

    fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MSG_CHAN_HDR_LEN as usize);
        out.extend_from_slice(&self.off_ext2psp_buf.to_le_bytes());
        out.extend_from_slice(&self.off_psp2ext_buf.to_le_bytes());
        out.extend_from_slice(&self.ext2psp.to_bytes());
        out.extend_from_slice(&self.psp2ext.to_bytes());
        out.extend_from_slice(&SPI_MSG_CHAN_HDR_MAGIC.to_le_bytes());
        out
    }

    fn from_bytes(b: &[u8]) -> Self {
        MsgChanHdr {
            off_ext2psp_buf: u32::from_le_bytes(b[0..4].try_into().unwrap()),
            off_psp2ext_buf: u32::from_le_bytes(b[4..8].try_into().unwrap()),
            ext2psp: RingBufHeader::from_bytes(&b[8..20]),
            psp2ext: RingBufHeader::from_bytes(&b[20..32]),
        }
    }
}

pub struct Em100TcpProvider {
    stream: TcpStream,
    hdr: MsgChanHdr,
}

impl Em100TcpProvider {
    /// `rest` is `host:port` of the flash emulator, the same shape as the
    /// `tcp` provider's device string.
    pub fn connect(rest: &str) -> Result<Self, ProviderError> {
        let stream = TcpStream::connect(rest)
            .map_err(|e| ProviderError::ConnectFailed(format!("{rest}: {e}")))?;
        stream.set_nodelay(true)?;
        let mut this = Em100TcpProvider { stream, hdr: MsgChanHdr::fresh() };
        this.msg_buffer_init()?;
        Ok(this)
    }

    fn spi_flash_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), ProviderError> {
        let mut req = [0u8; 16];
        req[0..4].copy_from_slice(&REQHDR_MAGIC.to_le_bytes());
        req[4..8].copy_from_slice(&REQ_CMD_READ.to_le_bytes());
        req[8..12].copy_from_slice(&addr.to_le_bytes());
        req[12..16].copy_from_slice(&(buf.len() as u32).to_le_bytes());
        self.stream.write_all(&req)?;

        let mut status = [0u8; 4];
        self.stream.read_exact(&mut status)?;
        if i32::from_le_bytes(status) != 0 {
            return Err(ProviderError::ConnectFailed("flash read rejected by emulator".into()));
        }
        self.stream.read_exact(buf)?;
        Ok(())
    }

    fn spi_flash_write(&mut self, addr: u32, buf: &[u8]) -> Result<(), ProviderError> {
        let mut req = [0u8; 16];
        req[0..4].copy_from_slice(&REQHDR_MAGIC.to_le_bytes());
        req[4..8].copy_from_slice(&REQ_CMD_WRITE.to_le_bytes());
        req[8..12].copy_from_slice(&addr.to_le_bytes());
        req[12..16].copy_from_slice(&(buf.len() as u32).to_le_bytes());
        self.stream.write_all(&req)?;
        self.stream.write_all(buf)?;

        let mut status = [0u8; 4];
        self.stream.read_exact(&mut status)?;
        if i32::from_le_bytes(status) != 0 {
            return Err(ProviderError::ConnectFailed("flash write rejected by emulator".into()));
        }
        Ok(())
    }

    fn msg_buffer_init(&mut self) -> Result<(), ProviderError> {
        self.hdr = MsgChanHdr::fresh();
        let bytes = self.hdr.to_bytes();
        self.spi_flash_write(SPI_MSG_CHAN_HDR_OFF, &bytes)
    }

    fn msg_buffer_hdr_fetch(&mut self) -> Result<(), ProviderError> {
        let mut bytes = vec![0u8; MSG_CHAN_HDR_LEN as usize];
        self.spi_flash_read(SPI_MSG_CHAN_HDR_OFF, &mut bytes)?;
        self.hdr = MsgChanHdr::from_bytes(&bytes);
        Ok(())
    }
}

impl Provider for Em100TcpProvider {
    fn peek(&mut self) -> Result<usize, ProviderError> {
        self.msg_buffer_hdr_fetch()?;
        Ok(self.hdr.psp2ext.used() as usize)
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProviderError> {
        let mut read_left = dst.len();
        let mut off = 0;
        while read_left > 0 {
            self.msg_buffer_hdr_fetch()?;
            let this_read = (read_left as u32).min(self.hdr.psp2ext.readable_in_one_go());
            if this_read == 0 {
                break;
            }
            let flash_addr = SPI_MSG_CHAN_HDR_OFF + self.hdr.off_psp2ext_buf + self.hdr.psp2ext.off_tail;
            self.spi_flash_read(flash_addr, &mut dst[off..off + this_read as usize])?;
            self.hdr.psp2ext.advance_read(this_read);
            self.spi_flash_write(
                SPI_MSG_CHAN_HDR_OFF + PSP2EXT_TAIL_FIELD_OFF,
                &self.hdr.psp2ext.off_tail.to_le_bytes(),
            )?;
            off += this_read as usize;
            read_left -= this_read as usize;
        }
        Ok(off)
    }

    fn write(&mut self, src: &[u8]) -> Result<(), ProviderError> {
        let mut write_left = src.len();
        let mut off = 0;
        while write_left > 0 {
            self.msg_buffer_hdr_fetch()?;
            let this_write = (write_left as u32).min(self.hdr.ext2psp.writable_in_one_go());
            if this_write == 0 {
                std::thread::sleep(Duration::from_micros(200));
                continue;
            }
            let flash_addr = SPI_MSG_CHAN_HDR_OFF + self.hdr.off_ext2psp_buf + self.hdr.ext2psp.off_head;
            self.spi_flash_write(flash_addr, &src[off..off + this_write as usize])?;
            self.hdr.ext2psp.advance_write(this_write);
            self.spi_flash_write(
                SPI_MSG_CHAN_HDR_OFF + EXT2PSP_HEAD_FIELD_OFF,
                &self.hdr.ext2psp.off_head.to_le_bytes(),
            )?;
            off += this_write as usize;
            write_left -= this_write as usize;
        }
        Ok(())
    }

    fn poll(&mut self, timeout_ms: u32) -> Result<PollOutcome, ProviderError> {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            if self.peek()? > 0 {
                return Ok(PollOutcome::Ready);
            }
            if std::time::Instant::now() >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn interrupt(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn destroy(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl Drop for Em100TcpProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_starts_empty() {
        let r = RingBufHeader { cb_ring_buf: RING_BUF_CAPACITY, off_head: 0, off_tail: 0 };
        assert_eq!(r.used(), 0);
        assert_eq!(r.free(), RING_BUF_CAPACITY);
    }

    #[test]
    fn ring_buffer_wraparound_accounting() {
        let mut r = RingBufHeader { cb_ring_buf: 16, off_head: 12, off_tail: 0 };
        assert_eq!(r.used(), 12);
        assert_eq!(r.writable_in_one_go(), 4); // until end of buffer, not until tail
        r.advance_write(4);
        assert_eq!(r.off_head, 0); // wrapped
        assert_eq!(r.used(), 16);
    }

    #[test]
    fn msg_chan_hdr_round_trips_through_bytes() {
        let hdr = MsgChanHdr::fresh();
        let bytes = hdr.to_bytes();
        let back = MsgChanHdr::from_bytes(&bytes);
        assert_eq!(back.off_ext2psp_buf, hdr.off_ext2psp_buf);
        assert_eq!(back.off_psp2ext_buf, hdr.off_psp2ext_buf);
        assert_eq!(back.ext2psp.cb_ring_buf, RING_BUF_CAPACITY);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stream-socket provider.
//!
//! Connects a TCP socket to `host:port` with `TCP_NODELAY` set and keeps it
//! non-blocking throughout: `std::net::TcpStream` has no `FIONREAD`
//! equivalent, so both `peek` and `read` treat `WouldBlock` as "nothing
//! available yet" rather than an error.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::{PollOutcome, Provider, ProviderError};

const PEEK_BUF_LEN: usize = 4096;

pub struct TcpProvider {
    stream: TcpStream,
}

impl TcpProvider {
    /// `rest` is `host:port`, the part of the URI after `tcp://`.
    pub fn connect(rest: &str) -> Result<Self, ProviderError> {
        let stream = TcpStream::connect(rest)
            .map_err(|e| ProviderError::ConnectFailed(format!("{rest}: {e}")))?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(TcpProvider { stream })
    }
}

impl Provider for TcpProvider {
    fn peek(&mut self) -> Result<usize, ProviderError> {
        let mut buf = [0u8; PEEK_BUF_LEN];
        match self.stream.peek(&mut buf) {
            Ok(0) => Err(ProviderError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProviderError> {
        match self.stream.read(dst) {
            Ok(0) if !dst.is_empty() => Err(ProviderError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<(), ProviderError> {
        let mut offset = 0;
        while offset < src.len() {
            match self.stream.write(&src[offset..]) {
                Ok(0) => return Err(ProviderError::Disconnected),
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_micros(200));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn poll(&mut self, timeout_ms: u32) -> Result<PollOutcome, ProviderError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            if self.peek()? > 0 {
                return Ok(PollOutcome::Ready);
            }
            if Instant::now() >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    fn interrupt(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn destroy(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl Drop for TcpProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}

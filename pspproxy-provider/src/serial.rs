// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serial (TTY) provider.
//!
//! The device string is `/path:baud:databits:parity:stopbits`, e.g.
//! `/dev/ttyUSB0:115200:8:n:1`. The `serialport` crate does the actual
//! raw-mode setup; `bytes_to_read()` stands in for an `ioctl(FIONREAD)`.
//!
//! `serialport` has one timeout shared between read and write, so `read`
//! (non-blocking) and `write` (blocking-until-accepted) can't both use the
//! port's configured timeout as-is. `ensure_blocking_mode` tracks which mode
//! the port is currently in and only issues `set_timeout` on an actual
//! transition between the two.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, Parity, StopBits};

use crate::{PollOutcome, Provider, ProviderError};

/// Effectively unbounded: `write` must block until every byte is accepted
/// or a fatal transport error occurs, so the port's write timeout is set
/// this long while writing rather than left at the non-blocking value
/// `read`/`peek` use.
const BLOCKING_WRITE_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct SerialProvider {
    port: Box<dyn serialport::SerialPort>,
    blocking: bool,
}

impl SerialProvider {
    /// `rest` is `/path:baud:databits:parity:stopbits`, e.g.
    /// `/dev/ttyUSB0:115200:8:n:1`.
    pub fn connect(rest: &str) -> Result<Self, ProviderError> {
        let malformed = || ProviderError::MalformedUri(rest.to_string());

        let mut parts = rest.splitn(5, ':');
        let path = parts.next().ok_or_else(malformed)?;
        let baud_rate: u32 = parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
        let data_bits = match parts.next().ok_or_else(malformed)? {
            "5" => DataBits::Five,
            "6" => DataBits::Six,
            "7" => DataBits::Seven,
            "8" => DataBits::Eight,
            _ => return Err(malformed()),
        };
        let parity = match parts.next().ok_or_else(malformed)? {
            "n" => Parity::None,
            "o" => Parity::Odd,
            "e" => Parity::Even,
            _ => return Err(malformed()),
        };
        let stop_bits = match parts.next().ok_or_else(malformed)? {
            "1" => StopBits::One,
            "2" => StopBits::Two,
            _ => return Err(malformed()),
        };

        let port = serialport::new(path, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(0))
            .open()
            .map_err(|e| ProviderError::ConnectFailed(format!("{path}: {e}")))?;
        Ok(SerialProvider { port, blocking: false })
    }

    /// Switches the port's timeout between the non-blocking value `read`/
    /// `peek` need and the long, effectively-blocking value `write` needs,
    /// only touching the port when the requested mode actually differs from
    /// the current one.
    fn ensure_blocking_mode(&mut self, blocking: bool) -> Result<(), ProviderError> {
        if self.blocking == blocking {
            return Ok(());
        }
        let timeout = if blocking { BLOCKING_WRITE_TIMEOUT } else { Duration::from_millis(0) };
        self.port
            .set_timeout(timeout)
            .map_err(|e| ProviderError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        self.blocking = blocking;
        Ok(())
    }
}

impl Provider for SerialProvider {
    fn peek(&mut self) -> Result<usize, ProviderError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| ProviderError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProviderError> {
        self.ensure_blocking_mode(false)?;
        match self.port.read(dst) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<(), ProviderError> {
        self.ensure_blocking_mode(true)?;
        self.port.write_all(src).map_err(ProviderError::from)
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
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    fn interrupt(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn destroy(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_too_few_fields() {
        assert!(matches!(
            SerialProvider::connect("/dev/ttyUSB0:115200"),
            Err(ProviderError::MalformedUri(_))
        ));
    }

    #[test]
    fn connect_rejects_bad_parity_letter() {
        assert!(matches!(
            SerialProvider::connect("/dev/ttyUSB0:115200:8:x:1"),
            Err(ProviderError::MalformedUri(_))
        ));
    }

    #[test]
    fn connect_rejects_nonnumeric_baud() {
        assert!(matches!(
            SerialProvider::connect("/dev/ttyUSB0:fast:8:n:1"),
            Err(ProviderError::MalformedUri(_))
        ));
    }
}

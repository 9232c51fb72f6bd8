// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport providers for the PSP proxy.
//!
//! Each transport implements the [`Provider`] trait: a small set of
//! peek/read/write/poll/interrupt operations that look identical regardless
//! of what substrate carries the bytes underneath. `init` becomes a
//! per-transport constructor (`TcpProvider::connect`, ...) rather than a
//! trait method, so a provider's socket or file handle is already open and
//! ready by the time the rest of the type is usable.

mod em100;
mod error;
mod local;
mod serial;
mod tcp;

pub use em100::Em100TcpProvider;
pub use error::ProviderError;
pub use local::LocalDeviceProvider;
pub use serial::SerialProvider;
pub use tcp::TcpProvider;

/// Outcome of a bounded wait for transport activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Data became available before the timeout elapsed.
    Ready,
    /// The timeout elapsed with nothing to read.
    TimedOut,
}

/// A byte-stream transport capable of carrying framed PDUs.
///
/// Implementations are not required to be `Sync`; `pspproxy::ProxyContext`
/// holds its provider behind a single-threaded borrow, matching the
/// cooperative single-threaded run loop the engine above it drives.
pub trait Provider {
    /// Returns the number of bytes immediately available to [`Provider::read`]
    /// without blocking, 0 if none.
    fn peek(&mut self) -> Result<usize, ProviderError>;

    /// Reads up to `dst.len()` bytes without blocking. Returns the number of
    /// bytes actually copied into `dst`, which may be 0.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProviderError>;

    /// Writes the entirety of `src`, blocking until all bytes are accepted
    /// by the transport.
    fn write(&mut self, src: &[u8]) -> Result<(), ProviderError>;

    /// Blocks up to `timeout_ms` milliseconds for readable data.
    fn poll(&mut self, timeout_ms: u32) -> Result<PollOutcome, ProviderError>;

    /// Best-effort request to unblock a concurrent [`Provider::poll`] call.
    /// Transports that cannot cancel a wait in progress may return `Ok(())`
    /// having done nothing: callers must not depend on `interrupt` actually
    /// shortening an in-flight poll.
    fn interrupt(&mut self) -> Result<(), ProviderError>;

    /// Releases the underlying transport resource. Called at most once;
    /// concrete providers also release on `Drop` as a backstop.
    fn destroy(&mut self);
}

/// Opens a provider from a `scheme://rest` device URI.
///
/// Recognized schemes: `tcp` (host:port stream socket), `serial` (TTY
/// device path), `em100tcp` (SPI-flash ring buffer over a network
/// emulator), and `local` (the out-of-scope direct-ioctl provider, which
/// always fails to connect).
pub fn open(uri: &str) -> Result<Box<dyn Provider>, ProviderError> {
    let (scheme, rest) = split_uri(uri)?;
    match scheme {
        "tcp" => Ok(Box::new(TcpProvider::connect(rest)?)),
        "serial" => Ok(Box::new(SerialProvider::connect(rest)?)),
        "em100tcp" => Ok(Box::new(Em100TcpProvider::connect(rest)?)),
        "local" => Ok(Box::new(LocalDeviceProvider::connect(rest)?)),
        other => Err(ProviderError::UnknownScheme(other.to_string())),
    }
}

fn split_uri(uri: &str) -> Result<(&str, &str), ProviderError> {
    match uri.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok((scheme, rest)),
        _ => Err(ProviderError::MalformedUri(uri.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_uri_accepts_scheme_and_rest() {
        assert_eq!(split_uri("tcp://localhost:4455").unwrap(), ("tcp", "localhost:4455"));
        assert_eq!(split_uri("serial:///dev/ttyUSB0").unwrap(), ("serial", "/dev/ttyUSB0"));
    }

    #[test]
    fn split_uri_rejects_missing_separator() {
        assert!(matches!(split_uri("localhost:4455"), Err(ProviderError::MalformedUri(_))));
    }

    #[test]
    fn split_uri_rejects_empty_rest() {
        assert!(matches!(split_uri("tcp://"), Err(ProviderError::MalformedUri(_))));
    }

    #[test]
    fn open_rejects_unknown_scheme() {
        assert!(matches!(open("carrier-pigeon://nest"), Err(ProviderError::UnknownScheme(_))));
    }
}

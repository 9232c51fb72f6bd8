// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ProxyContext`/`PduEngine`-layer error type.
//!
//! A plain enum with a hand-written `Display`, no `thiserror`, matching
//! the lower-layer error types it wraps.

use core::fmt;

use pspproxy_provider::ProviderError;
use pspproxy_wire::WireError;

#[derive(Debug)]
pub enum ProxyError {
    /// Bad argument shape caught before any wire traffic: SMN size not
    /// in {1,2,4,8}, stride not in {1,2,4}, transfer not a multiple of
    /// stride, or a malformed `DataXferFlags` combination.
    ArgumentError(String),
    /// The transport failed at the I/O level.
    TransportFailure(ProviderError),
    /// A received PDU failed header/footer/checksum validation. The
    /// receive state machine has already reset itself; the context itself
    /// remains usable.
    FramingError(WireError),
    /// The inbound sequence counter skipped a value, or a beacon counter
    /// regressed while connected. Fatal: the `ProxyContext` must be
    /// recreated.
    SequenceError(String),
    /// A beacon arrived whose counter didn't continue the established
    /// series: the stub restarted. Fatal, same as `SequenceError`.
    ResetDetected,
    /// A structurally valid PDU arrived whose RRN-ID was neither the
    /// awaited response nor a recognized notification.
    UnexpectedPdu,
    /// An operation's millisecond budget elapsed. Informational: retry
    /// with a longer budget, or treat the pending response as orphaned.
    Timeout,
    /// The stub's response carried a non-success status code.
    RemoteError(i32),
    /// A response's data payload was a different length than the request's
    /// own chunk size implied (e.g. a chunked read came back short).
    PayloadSizeMismatch,
    /// The active provider doesn't implement the requested capability.
    Unsupported(&'static str),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::ArgumentError(msg) => write!(f, "invalid argument: {msg}"),
            ProxyError::TransportFailure(e) => write!(f, "transport failure: {e}"),
            ProxyError::FramingError(e) => write!(f, "framing error: {e}"),
            ProxyError::SequenceError(msg) => write!(f, "sequence error: {msg}"),
            ProxyError::ResetDetected => write!(f, "stub restarted (reset detected)"),
            ProxyError::UnexpectedPdu => write!(f, "received an unexpected PDU"),
            ProxyError::Timeout => write!(f, "operation timed out"),
            ProxyError::RemoteError(status) => write!(f, "remote request failed with status {status}"),
            ProxyError::PayloadSizeMismatch => write!(f, "response payload length did not match the requested chunk size"),
            ProxyError::Unsupported(op) => write!(f, "unsupported by this provider: {op}"),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::TransportFailure(e) => Some(e),
            ProxyError::FramingError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for ProxyError {
    fn from(e: ProviderError) -> Self {
        ProxyError::TransportFailure(e)
    }
}

impl From<WireError> for ProxyError {
    fn from(e: WireError) -> Self {
        ProxyError::FramingError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn every_variant_displays_without_panicking() {
        let variants = [
            ProxyError::ArgumentError("bad stride".into()),
            ProxyError::TransportFailure(ProviderError::Io(io::Error::from(io::ErrorKind::TimedOut))),
            ProxyError::FramingError(WireError::ChecksumMismatch),
            ProxyError::SequenceError("gap".into()),
            ProxyError::ResetDetected,
            ProxyError::UnexpectedPdu,
            ProxyError::Timeout,
            ProxyError::RemoteError(-1),
            ProxyError::PayloadSizeMismatch,
            ProxyError::Unsupported("x86 mem alloc"),
        ];
        for e in variants {
            let _ = format!("{e}");
        }
    }
}

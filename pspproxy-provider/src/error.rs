// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Provider-layer error type.
//!
//! A plain enum with a hand-written `Display` impl, no `thiserror`.

use core::fmt;
use std::io;

#[derive(Debug)]
pub enum ProviderError {
    /// The device URI did not parse as `scheme://rest`.
    MalformedUri(String),
    /// The URI scheme did not match any known provider.
    UnknownScheme(String),
    /// A provider operation isn't implemented by this transport.
    Unsupported(&'static str),
    /// The transport's connect handshake (socket connect, ring buffer init,
    /// termios setup, ...) failed.
    ConnectFailed(String),
    /// The peer closed the connection or the device disappeared.
    Disconnected,
    /// Underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MalformedUri(uri) => write!(f, "malformed device URI: {uri}"),
            ProviderError::UnknownScheme(scheme) => write!(f, "unknown provider scheme: {scheme}"),
            ProviderError::Unsupported(op) => write!(f, "operation not supported by this provider: {op}"),
            ProviderError::ConnectFailed(reason) => write!(f, "provider connect failed: {reason}"),
            ProviderError::Disconnected => write!(f, "transport disconnected"),
            ProviderError::Io(e) => write!(f, "provider I/O error: {e}"),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProviderError {
    fn from(e: io::Error) -> Self {
        ProviderError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_displays_without_panicking() {
        let variants = [
            ProviderError::MalformedUri("bad".into()),
            ProviderError::UnknownScheme("foo".into()),
            ProviderError::Unsupported("interrupt"),
            ProviderError::ConnectFailed("refused".into()),
            ProviderError::Disconnected,
            ProviderError::Io(io::Error::from(io::ErrorKind::TimedOut)),
        ];
        for e in variants {
            let _ = format!("{e}");
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Direct local-device provider.
//!
//! The local ioctl-backed transport (talking to a PSP driver already loaded
//! on this host) is out of scope for this crate: it's a direct syscall
//! adapter with no protocol logic of its own. This stub exists only so that
//! the `local://` scheme resolves to a recognizable error instead of
//! [`ProviderError::UnknownScheme`].

use crate::{PollOutcome, Provider, ProviderError};

pub struct LocalDeviceProvider {
    _private: (),
}

impl LocalDeviceProvider {
    pub fn connect(_rest: &str) -> Result<Self, ProviderError> {
        Err(ProviderError::Unsupported("local device provider is out of scope for this crate"))
    }
}

impl Provider for LocalDeviceProvider {
    fn peek(&mut self) -> Result<usize, ProviderError> {
        Err(ProviderError::Unsupported("peek"))
    }

    fn read(&mut self, _dst: &mut [u8]) -> Result<usize, ProviderError> {
        Err(ProviderError::Unsupported("read"))
    }

    fn write(&mut self, _src: &[u8]) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("write"))
    }

    fn poll(&mut self, _timeout_ms: u32) -> Result<PollOutcome, ProviderError> {
        Err(ProviderError::Unsupported("poll"))
    }

    fn interrupt(&mut self) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("interrupt"))
    }

    fn destroy(&mut self) {}
}

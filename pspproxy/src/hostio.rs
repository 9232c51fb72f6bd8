// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side I/O callback capability consumed by [`crate::PduEngine`].
//!
//! A plain trait rather than a function-pointer table: the engine holds
//! a `&mut dyn HostIoSink` and calls it synchronously for log lines,
//! code-module output, and stdin forwarding, so callers plug in whatever
//! sink (terminal, test buffer, GUI pane) makes sense for them.

/// All callbacks run on the caller's thread, from inside the code-module
/// runloop or notification dispatch; implementations must not block
/// indefinitely or re-enter the owning `ProxyContext`.
pub trait HostIoSink {
    /// A complete, newline-terminated line of stub log output.
    fn log_line(&mut self, line: &str);

    /// A chunk of stdout-like data written by the stub to output buffer
    /// `buf_id`.
    fn out_buf_write(&mut self, buf_id: u32, bytes: &[u8]);

    /// Bytes immediately available to forward to the stub's input buffer
    /// `buf_id` (e.g. pending stdin), without blocking.
    fn in_buf_peek(&mut self, buf_id: u32) -> usize;

    /// Reads up to `dst.len()` bytes from input buffer `buf_id` without
    /// blocking; returns the number of bytes copied into `dst`.
    fn in_buf_read(&mut self, buf_id: u32, dst: &mut [u8]) -> usize;
}

/// Default sink: logs to stdout, discards output-buffer writes, and never
/// offers stdin data. Suitable for library callers that don't care about
/// code-module interactivity (e.g. one-shot memory peeks).
#[derive(Debug, Default)]
pub struct StdIoSink {
    _private: (),
}

impl StdIoSink {
    pub fn new() -> Self {
        StdIoSink { _private: () }
    }
}

impl HostIoSink for StdIoSink {
    fn log_line(&mut self, line: &str) {
        log::info!(target: "pspproxy::stub", "{line}");
    }

    fn out_buf_write(&mut self, buf_id: u32, bytes: &[u8]) {
        if buf_id == 0 {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(bytes);
            let _ = stdout.flush();
        } else {
            log::trace!("discarding {} bytes written to output buffer {buf_id}", bytes.len());
        }
    }

    fn in_buf_peek(&mut self, _buf_id: u32) -> usize {
        0
    }

    fn in_buf_read(&mut self, _buf_id: u32, _dst: &mut [u8]) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        lines: Vec<String>,
        out: Vec<(u32, Vec<u8>)>,
    }

    impl HostIoSink for RecordingSink {
        fn log_line(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }

        fn out_buf_write(&mut self, buf_id: u32, bytes: &[u8]) {
            self.out.push((buf_id, bytes.to_vec()));
        }

        fn in_buf_peek(&mut self, _buf_id: u32) -> usize {
            0
        }

        fn in_buf_read(&mut self, _buf_id: u32, _dst: &mut [u8]) -> usize {
            0
        }
    }

    #[test]
    fn recording_sink_captures_calls() {
        let mut sink = RecordingSink { lines: vec![], out: vec![] };
        sink.log_line("hello world");
        sink.out_buf_write(1, b"abc");
        assert_eq!(sink.lines, vec!["hello world".to_string()]);
        assert_eq!(sink.out, vec![(1, b"abc".to_vec())]);
    }
}

//! Deadline-bounded response collection
//!
//! Devices of this class answer with short ASCII replies, usually ending in
//! `#`, some with a single unterminated character and many not at all. The
//! collector polls the transport until it sees the terminator, hits the size
//! cap, or runs out of time. Partial bytes are always handed back.

use std::thread;
use std::time::{Duration, Instant};

use crate::constants::{MAX_RESPONSE_BYTES, POLL_INTERVAL, TERMINATOR};
use crate::error::ConnectionResult;
use crate::transport::Transport;

/// Bytes read for one command and whether the deadline cut collection short
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectedResponse {
    pub bytes: Vec<u8>,
    pub timed_out: bool,
}

impl CollectedResponse {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Polling response reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCollector {
    pub terminator: u8,
    pub max_bytes: usize,
    pub poll_interval: Duration,
}

impl Default for ResponseCollector {
    fn default() -> Self {
        Self {
            terminator: TERMINATOR,
            max_bytes: MAX_RESPONSE_BYTES,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl ResponseCollector {
    pub fn new(terminator: u8, max_bytes: usize, poll_interval: Duration) -> Self {
        Self { terminator, max_bytes, poll_interval }
    }

    /// Collect until terminator, size cap or `deadline`.
    ///
    /// The transport is checked at least once even when the deadline has
    /// already passed. Only transport failures are errors.
    pub fn collect<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        deadline: Instant,
    ) -> ConnectionResult<CollectedResponse> {
        let mut bytes = Vec::new();

        loop {
            let available = transport.bytes_available()?;
            if available > 0 {
                let chunk = transport.read(available)?;
                bytes.extend_from_slice(&chunk);

                if bytes.contains(&self.terminator) || bytes.len() >= self.max_bytes {
                    return Ok(CollectedResponse { bytes, timed_out: false });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                log::trace!("Collection deadline reached with {} bytes", bytes.len());
                return Ok(CollectedResponse { bytes, timed_out: true });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Collect with a deadline `timeout` from now
    pub fn collect_for<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        timeout: Duration,
    ) -> ConnectionResult<CollectedResponse> {
        self.collect(transport, Instant::now() + timeout)
    }
}

/// Collect with explicit terminator and cap at the default poll interval
pub fn collect<T: Transport + ?Sized>(
    transport: &mut T,
    deadline: Instant,
    terminator: u8,
    max_bytes: usize,
) -> ConnectionResult<CollectedResponse> {
    ResponseCollector::new(terminator, max_bytes, POLL_INTERVAL).collect(transport, deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out one queued chunk per availability check
    struct ChunkedTransport {
        chunks: VecDeque<Vec<u8>>,
        current: Vec<u8>,
    }

    impl ChunkedTransport {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                current: Vec::new(),
            }
        }
    }

    impl Transport for ChunkedTransport {
        fn write(&mut self, _bytes: &[u8]) -> ConnectionResult<()> {
            Ok(())
        }
        fn bytes_available(&mut self) -> ConnectionResult<usize> {
            if self.current.is_empty() {
                self.current = self.chunks.pop_front().unwrap_or_default();
            }
            Ok(self.current.len())
        }
        fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>> {
            let n = n.min(self.current.len());
            Ok(self.current.drain(..n).collect())
        }
        fn close(&mut self) {}
    }

    fn fast() -> ResponseCollector {
        ResponseCollector::new(b'#', 50, Duration::from_millis(5))
    }

    #[test]
    fn test_stops_at_terminator() {
        let mut t = ChunkedTransport::new(&[b"12:3", b"4:56#"]);
        let r = fast().collect_for(&mut t, Duration::from_secs(1)).unwrap();
        assert_eq!(r.bytes, b"12:34:56#");
        assert!(!r.timed_out);
    }

    #[test]
    fn test_partial_bytes_kept_on_timeout() {
        let mut t = ChunkedTransport::new(&[b"G"]);
        let r = fast().collect_for(&mut t, Duration::from_millis(50)).unwrap();
        assert_eq!(r.bytes, b"G");
        assert!(r.timed_out);
    }

    #[test]
    fn test_size_cap_ends_collection() {
        let long = [b'x'; 60];
        let mut t = ChunkedTransport::new(&[&long]);
        let start = Instant::now();
        let r = fast().collect_for(&mut t, Duration::from_secs(5)).unwrap();
        assert!(!r.timed_out);
        assert!(r.bytes.len() >= 50);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_past_deadline_still_checks_once() {
        let mut t = ChunkedTransport::new(&[b"60.1#"]);
        let r = fast().collect(&mut t, Instant::now()).unwrap();
        assert_eq!(r.bytes, b"60.1#");
        assert!(!r.timed_out);
    }
}

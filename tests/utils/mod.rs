//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lx200r::error::{ConnectionError, ConnectionResult};
use lx200r::{CancelToken, Lx200Emulator, ResponseCollector, RunnerConfig, Transport};

/// Runner timings scaled down so full catalog runs finish quickly
pub fn fast_config() -> RunnerConfig {
    RunnerConfig {
        response_timeout: Duration::from_millis(60),
        probe_timeout: Duration::from_millis(40),
        settle_delay: Duration::from_millis(20),
        collector: ResponseCollector::new(b'#', 50, Duration::from_millis(5)),
    }
}

/// Timestamped record of every write a transport saw
#[derive(Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<(Instant, Vec<u8>)>>>);

impl WriteLog {
    fn record(&self, bytes: &[u8]) {
        self.0.lock().unwrap().push((Instant::now(), bytes.to_vec()));
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.0.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Transport whose replies come from a closure, with hooks to fail or
/// cancel on a given write (1-based).
pub struct ScriptedTransport {
    responder: Responder,
    pending: VecDeque<u8>,
    log: WriteLog,
    writes: usize,
    fail_on_write: Option<usize>,
    cancel_on_write: Option<(usize, CancelToken)>,
}

impl ScriptedTransport {
    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            log: WriteLog::default(),
            writes: 0,
            fail_on_write: None,
            cancel_on_write: None,
        }
    }

    /// Backed by the in-process device emulator
    pub fn emulated() -> Self {
        let mut device = Lx200Emulator::new();
        Self::with_responder(move |bytes| device.feed(bytes))
    }

    /// Never answers anything
    pub fn silent() -> Self {
        Self::with_responder(|_| Vec::new())
    }

    pub fn fail_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    pub fn cancel_on_write(mut self, n: usize, token: CancelToken) -> Self {
        self.cancel_on_write = Some((n, token));
        self
    }

    pub fn log(&self) -> WriteLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        self.writes += 1;
        if self.fail_on_write == Some(self.writes) {
            return Err(ConnectionError::WriteFailed { reason: "cable unplugged".to_string() });
        }
        self.log.record(bytes);
        if let Some((n, token)) = &self.cancel_on_write {
            if *n == self.writes {
                token.cancel();
            }
        }
        let reply = (self.responder)(bytes);
        self.pending.extend(reply);
        Ok(())
    }

    fn bytes_available(&mut self) -> ConnectionResult<usize> {
        Ok(self.pending.len())
    }

    fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>> {
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn close(&mut self) {}

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Delivers a fixed byte stream in chunks, one chunk per availability check
pub struct TrickleTransport {
    chunks: VecDeque<Vec<u8>>,
    current: Vec<u8>,
}

impl TrickleTransport {
    pub fn new(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            current: Vec::new(),
        }
    }
}

impl Transport for TrickleTransport {
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
        let take = n.min(self.current.len());
        Ok(self.current.drain(..take).collect())
    }

    fn close(&mut self) {}
}

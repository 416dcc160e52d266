//! Transport module for talking to the device under test
//!
//! The tester only needs a duplex byte stream it can poll. [`Transport`] is
//! that seam; [`TcpTransport`] reaches devices exposed through a serial-to-TCP
//! bridge and [`crate::emulator::EmulatorTransport`] runs fully in process.
//!
//! A [`Link`] wraps one transport so that a test run and interactive probes
//! never interleave on the same stream.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ConnectionError, ConnectionResult, LX200Error, LX200Result};

/// Duplex byte stream consumed by the collector and the runner
pub trait Transport: Send {
    /// Write all bytes to the device
    fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()>;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> ConnectionResult<usize>;

    /// Read up to `n` already-available bytes
    fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>>;

    /// Release the underlying resource
    fn close(&mut self);

    /// Short description for logs
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        (**self).write(bytes)
    }

    fn bytes_available(&mut self) -> ConnectionResult<usize> {
        (**self).bytes_available()
    }

    fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>> {
        (**self).read(n)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// TCP connection to a device behind a serial bridge (ser2net and friends)
pub struct TcpTransport {
    stream: TcpStream,
    address: String,
    pending: VecDeque<u8>,
}

impl TcpTransport {
    /// Connect with an explicit timeout. The same limit bounds every write.
    pub fn open(address: &str, timeout: Duration) -> ConnectionResult<Self> {
        let open_failed = |reason: String| ConnectionError::OpenFailed {
            address: address.to_string(),
            reason,
        };

        let addr: SocketAddr = address
            .to_socket_addrs()
            .map_err(|e| open_failed(e.to_string()))?
            .next()
            .ok_or_else(|| open_failed("No socket addresses resolved".to_string()))?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| open_failed(e.to_string()))?;
        stream.set_nodelay(true).map_err(|e| open_failed(e.to_string()))?;
        // Bounds the blocking writes in `write`
        stream.set_write_timeout(Some(timeout)).map_err(|e| open_failed(e.to_string()))?;
        stream.set_nonblocking(true).map_err(|e| open_failed(e.to_string()))?;

        log::info!("Connected to {address}");

        Ok(Self {
            stream,
            address: address.to_string(),
            pending: VecDeque::new(),
        })
    }

    /// Move at most one read's worth of socket data into `pending`, so a
    /// chatty device cannot keep a poll from returning.
    fn fill(&mut self) -> ConnectionResult<()> {
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut buffer) {
                Ok(0) => {
                    if self.pending.is_empty() {
                        return Err(ConnectionError::Closed);
                    }
                    return Ok(());
                }
                Ok(n) => {
                    log::trace!("{}: {} bytes buffered", self.address, n);
                    self.pending.extend(&buffer[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        let write_failed = |e: std::io::Error| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectionError::WriteFailed {
                reason: format!("write timed out: {e}"),
            },
            _ => ConnectionError::WriteFailed { reason: e.to_string() },
        };

        // Blocking under the write timeout set in `open`
        self.stream.set_nonblocking(false).map_err(write_failed)?;
        let result = self.stream.write_all(bytes).and_then(|_| self.stream.flush());
        self.stream.set_nonblocking(true).map_err(write_failed)?;
        result.map_err(write_failed)
    }

    fn bytes_available(&mut self) -> ConnectionResult<usize> {
        self.fill()?;
        Ok(self.pending.len())
    }

    fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>> {
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("Shutdown of {} failed: {}", self.address, e);
        }
        log::info!("Disconnected from {}", self.address);
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Upper bound on bytes moved from the socket per availability check
const READ_CHUNK_SIZE: usize = 512;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// One transport shared between the foreground caller and at most one run.
///
/// Cloning a `Link` clones the handle, not the stream.
#[derive(Clone)]
pub struct Link {
    transport: SharedTransport,
    in_use: Arc<AtomicBool>,
    description: String,
}

impl Link {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        let description = transport.describe();
        Self {
            transport: Arc::new(Mutex::new(transport)),
            in_use: Arc::new(AtomicBool::new(false)),
            description,
        }
    }

    /// Claim exclusive use of the transport, or fail with `Busy` without
    /// touching it.
    pub fn acquire(&self) -> LX200Result<LinkGuard> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LX200Error::Busy)?;
        Ok(LinkGuard {
            transport: Arc::clone(&self.transport),
            in_use: Arc::clone(&self.in_use),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Close the transport. Refused while a run holds the link.
    pub fn close(&self) -> LX200Result<()> {
        let guard = self.acquire()?;
        guard.with_transport(|t| t.close());
        Ok(())
    }
}

/// Exclusive claim on a [`Link`]; released on drop
pub struct LinkGuard {
    transport: SharedTransport,
    in_use: Arc<AtomicBool>,
}

impl LinkGuard {
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut dyn Transport) -> R) -> R {
        let mut guard = match self.transport.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Transport mutex poisoned - recovering");
                poisoned.into_inner()
            }
        };
        f(&mut **guard)
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
    }
}

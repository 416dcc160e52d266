//! LX200R: conformance tester for the LX200 telescope serial protocol
//!
//! Sends a fixed catalog of LX200 commands to a device one at a time,
//! collects each reply under a deadline, checks it against the expected
//! response shape and aggregates the verdicts into a report.

/// Protocol constants and default timings
pub mod constants;

/// Error types
pub mod error;

/// COMMAND CATALOG: the ordered registry of LX200 commands under test
pub mod catalog;

/// TRANSPORT: byte-stream seam, TCP bridge transport and the shared link
pub mod transport;

/// Deadline-bounded response reading
pub mod collector;

/// Response format matching
pub mod validator;

/// TEST RUNNER: sequential, cancellable execution of the catalog
pub mod runner;

/// Report aggregation and rendering
pub mod report;

/// DEVICE EMULATOR: in-process LX200 mount for running without hardware
pub mod emulator;

/// Configuration management
pub mod config;

// Re-export the types most callers need
pub use catalog::{CommandCatalog, CommandCategory, CommandDefinition, FormatClass, GuideDirection};
pub use collector::{CollectedResponse, ResponseCollector};
pub use config::{ConnectionMode, TesterConfig};
pub use emulator::{EmulatorTransport, Lx200Emulator};
pub use error::{
    CatalogError, ConfigError, ConnectionError, FailureReason, LX200Error, LX200Result,
};
pub use report::{ReportAggregator, TestRunSummary, Verdict};
pub use runner::{
    CancelToken, RunEvent, RunHandle, RunState, RunnerConfig, TestOutcome, TestRun, TestRunner,
};
pub use transport::{Link, TcpTransport, Transport};
pub use validator::ResponseValidator;

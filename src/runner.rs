//! Sequential, cancellable test runner
//!
//! A run walks the catalog in order: write the command, collect the reply,
//! validate it, record the outcome, let the device settle, repeat. One
//! command is always in flight at most. Cancellation is cooperative and
//! only observed between commands.
//!
//! [`TestRunner::start`] runs on a worker thread and reports through a
//! channel of [`RunEvent`]s; [`TestRunner::run_blocking`] does the same work
//! on the caller's thread with a callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::catalog::{escape_bytes, CommandCatalog, CommandDefinition};
use crate::collector::ResponseCollector;
use crate::constants::{PROBE_RESPONSE_TIMEOUT, RUN_RESPONSE_TIMEOUT, SETTLE_DELAY};
use crate::error::{ConnectionError, ConnectionResult, FailureReason, LX200Error, LX200Result};
use crate::report::{ReportAggregator, TestRunSummary};
use crate::transport::{Link, LinkGuard, Transport};
use crate::validator::ResponseValidator;

/// Timings and collection limits for runs and probes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Collection deadline per command in a full run
    pub response_timeout: Duration,
    /// Collection deadline for `send_once`
    pub probe_timeout: Duration,
    /// Pause between consecutive commands of a run
    pub settle_delay: Duration,
    pub collector: ResponseCollector,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            response_timeout: RUN_RESPONSE_TIMEOUT,
            probe_timeout: PROBE_RESPONSE_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            collector: ResponseCollector::default(),
        }
    }
}

/// Lifecycle of a runner: `Idle -> Running -> {Completed, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled)
    }
}

/// Result of sending one command
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub name: String,
    pub sent_bytes: Vec<u8>,
    pub received_bytes: Vec<u8>,
    pub elapsed: Duration,
    pub passed: bool,
    pub failure_reason: Option<FailureReason>,
}

/// Outcomes of one run in catalog order
#[derive(Debug, Clone)]
pub struct TestRun {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub outcomes: Vec<TestOutcome>,
    pub cancelled: bool,
    pub total_catalog_size: usize,
    /// Catalog entries never sent, in catalog order
    pub not_attempted: Vec<String>,
    /// Transport failure that aborted the run, if any
    pub error: Option<ConnectionError>,
}

impl TestRun {
    pub fn new(total_catalog_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            outcomes: Vec::new(),
            cancelled: false,
            total_catalog_size,
            not_attempted: Vec::new(),
            error: None,
        }
    }

    pub fn final_state(&self) -> RunState {
        if self.cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        }
    }
}

/// Events delivered to the caller while a run progresses
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// About to test command `index` (1-based) of `total`
    Progress { index: usize, total: usize, name: String },
    Outcome(TestOutcome),
    /// The transport failed; the run stops after this event
    Aborted(ConnectionError),
    /// Always the last event of a run
    Complete(TestRunSummary),
}

/// Cooperative stop request shared between caller and worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Write one command, collect and judge its reply.
///
/// Only transport failures are returned as errors; timeouts and mismatches
/// are encoded in the outcome.
pub fn execute_command(
    command: &CommandDefinition,
    transport: &mut dyn Transport,
    collector: &ResponseCollector,
    timeout: Duration,
) -> ConnectionResult<TestOutcome> {
    let start = Instant::now();

    transport.write(&command.wire_bytes)?;
    log::info!("SENT: {} - {}", command.printable_wire(), command.description);

    let response = collector.collect(transport, start + timeout)?;
    let elapsed = start.elapsed();

    if !response.is_empty() {
        log::info!("RECV: '{}'", escape_bytes(&response.bytes));
    }

    let verdict = ResponseValidator.judge(&command.expected_format, &response.bytes);
    match (&verdict, command.expected_format.expects_response()) {
        (Ok(()), false) => log::info!("PASS - Command sent (no response expected)"),
        (Ok(()), true) => log::info!("PASS - Response matches expected format"),
        (Err(FailureReason::Timeout), _) => log::warn!("FAIL - No response received (timeout)"),
        (Err(FailureReason::FormatMismatch), _) => log::warn!(
            "FAIL - Expected: {}, Got: '{}'",
            command.expected_format,
            escape_bytes(&response.bytes)
        ),
    }

    Ok(TestOutcome {
        name: command.name.clone(),
        sent_bytes: command.wire_bytes.clone(),
        received_bytes: response.bytes,
        elapsed,
        passed: verdict.is_ok(),
        failure_reason: verdict.err(),
    })
}

/// Walk the catalog against one transport. Emits progress, outcome and
/// abort events but not `Complete`, which belongs to whoever owns the run.
pub fn run_catalog(
    catalog: &CommandCatalog,
    transport: &mut dyn Transport,
    config: &RunnerConfig,
    cancel: &CancelToken,
    mut on_event: impl FnMut(RunEvent),
) -> TestRun {
    let total = catalog.len();
    let mut run = TestRun::new(total);

    log::info!("{}", "=".repeat(60));
    log::info!("STARTING AUTOMATED TEST SEQUENCE ({} commands on {})", total, transport.describe());
    log::info!("{}", "=".repeat(60));

    for (i, command) in catalog.iter().enumerate() {
        if cancel.is_cancelled() {
            log::warn!("Test sequence stopped by user");
            run.cancelled = true;
            run.not_attempted = catalog.iter().skip(i).map(|c| c.name.clone()).collect();
            break;
        }

        on_event(RunEvent::Progress { index: i + 1, total, name: command.name.clone() });
        log::info!("Testing: {}", command.name);

        match execute_command(command, transport, &config.collector, config.response_timeout) {
            Ok(outcome) => {
                run.outcomes.push(outcome.clone());
                on_event(RunEvent::Outcome(outcome));
            }
            Err(e) => {
                log::error!("FAIL - {}: {}", command.name, e);
                run.cancelled = true;
                run.error = Some(e.clone());
                run.not_attempted = catalog.iter().skip(i).map(|c| c.name.clone()).collect();
                on_event(RunEvent::Aborted(e));
                break;
            }
        }

        if i + 1 < total {
            thread::sleep(config.settle_delay);
        }
    }

    run
}

/// Owns the runner state machine and starts runs against a [`Link`]
#[derive(Debug)]
pub struct TestRunner {
    config: RunnerConfig,
    state: Arc<Mutex<RunState>>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        read_state(&self.state)
    }

    /// Claim the link and move to `Running`. Fails with `Busy` if a run is
    /// already active here or the link is held elsewhere.
    fn begin(&self, link: &Link) -> LX200Result<LinkGuard> {
        if self.state() == RunState::Running {
            return Err(LX200Error::Busy);
        }
        let guard = link.acquire()?;
        set_state(&self.state, RunState::Running);
        Ok(guard)
    }

    /// Undo `begin` after the worker could not be spawned. The link guard
    /// went down with the unspawned closure.
    fn abandon_start(&self, error: std::io::Error) -> LX200Error {
        log::error!("Failed to start test run worker: {error}");
        set_state(&self.state, RunState::Idle);
        error.into()
    }

    /// Start a run on a worker thread
    pub fn start(&self, catalog: Arc<CommandCatalog>, link: &Link) -> LX200Result<RunHandle> {
        let guard = self.begin(link)?;
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let total = catalog.len();

        let worker_cancel = cancel.clone();
        let worker_state = Arc::clone(&self.state);
        let config = self.config;

        let spawned = thread::Builder::new()
            .name("lx200-test-run".to_string())
            .spawn(move || {
                let on_event = |event: RunEvent| {
                    // The caller may have dropped the receiver; the run still finishes
                    let _ = tx.send(event);
                };
                finish_run(&worker_state, guard, &catalog, &config, &worker_cancel, on_event)
            });

        let join = spawned.map_err(|e| self.abandon_start(e))?;

        Ok(RunHandle {
            cancel,
            events: rx,
            join: Some(join),
            state: Arc::clone(&self.state),
            total,
        })
    }

    /// Run the catalog on the calling thread, reporting through `on_event`
    pub fn run_blocking(
        &self,
        catalog: &CommandCatalog,
        link: &Link,
        cancel: &CancelToken,
        on_event: impl FnMut(RunEvent),
    ) -> LX200Result<TestRun> {
        let guard = self.begin(link)?;
        Ok(finish_run(&self.state, guard, catalog, &self.config, cancel, on_event))
    }

    /// Send a single command with the shorter probe deadline. Does not touch
    /// run state; refused with `Busy` while a run holds the link.
    pub fn send_once(&self, command: &CommandDefinition, link: &Link) -> LX200Result<TestOutcome> {
        let guard = link.acquire()?;
        let collector = self.config.collector;
        let timeout = self.config.probe_timeout;
        log::info!("Testing: {}", command.name);
        let outcome = guard.with_transport(|t| execute_command(command, t, &collector, timeout))?;
        Ok(outcome)
    }
}

/// Drive a claimed run to its terminal state, then release the link before
/// announcing completion.
fn finish_run(
    state: &Mutex<RunState>,
    guard: LinkGuard,
    catalog: &CommandCatalog,
    config: &RunnerConfig,
    cancel: &CancelToken,
    mut on_event: impl FnMut(RunEvent),
) -> TestRun {
    let run = guard.with_transport(|t| run_catalog(catalog, t, config, cancel, &mut on_event));
    drop(guard);

    set_state(state, run.final_state());
    let summary = ReportAggregator::summarize(&run);
    log::info!(
        "TEST SEQUENCE {}: {} passed, {} failed, {:.1}% success",
        if run.cancelled { "STOPPED" } else { "COMPLETED" },
        summary.passed_count,
        summary.failed_count,
        summary.success_rate_percent
    );
    on_event(RunEvent::Complete(summary));
    run
}

fn read_state(state: &Mutex<RunState>) -> RunState {
    match state.lock() {
        Ok(s) => *s,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn set_state(state: &Mutex<RunState>, next: RunState) {
    let mut s = match state.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    log::debug!("Runner state {:?} -> {:?}", *s, next);
    *s = next;
}

/// Caller's handle on a background run
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancelToken,
    events: Receiver<RunEvent>,
    join: Option<JoinHandle<TestRun>>,
    state: Arc<Mutex<RunState>>,
    total: usize,
}

impl RunHandle {
    /// Request a stop at the next command boundary
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    pub fn state(&self) -> RunState {
        read_state(&self.state)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Block until the worker finishes and take ownership of its run
    pub fn wait(mut self) -> TestRun {
        let join = match self.join.take() {
            Some(j) => j,
            None => unreachable!("run handle joined twice"),
        };
        match join.join() {
            Ok(run) => run,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

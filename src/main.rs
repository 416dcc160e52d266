//! Command-line entry point for LX200R
//!
//! Runs the standard command catalog against a device reached over a
//! serial-to-TCP bridge (or the built-in emulator) and prints the report.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};

use lx200r::config::{self, ConnectionMode, TesterConfig};
use lx200r::{
    CommandCatalog, CommandDefinition, EmulatorTransport, Link, ReportAggregator, RunEvent,
    RunHandle, TcpTransport, TestOutcome, TestRun, TestRunSummary, TestRunner,
};

/// Exit code for usage problems and connection failures, including a link lost mid-run
const EXIT_USAGE: i32 = 2;

#[derive(Debug, Default)]
struct CliOptions {
    address: Option<String>,
    emulate: bool,
    config_path: Option<PathBuf>,
    list: bool,
    command: Option<String>,
    raw: Option<String>,
    json_path: Option<PathBuf>,
    verbose: bool,
}

fn print_help() {
    println!("LX200R - LX200 protocol conformance tester");
    println!();
    println!("Usage: lx200r [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --address <host:port> or -a <host:port>  Device behind a serial-to-TCP bridge (default: localhost:4030)");
    println!("  --emulate or -e                          Test the built-in device emulator instead");
    println!("  --config <path> or -c <path>             Configuration file (default: platform config dir)");
    println!("  --list or -l                             List the command catalog and exit");
    println!("  --command <name>                         Send a single catalog command");
    println!("  --raw <text>                             Send a custom command, e.g. \":GR#\"");
    println!("  --json <path>                            Also write the run report as JSON");
    println!("  --verbose or -v                          Debug logging");
    println!("  --help or -h                             Show this help message");
    println!();
    println!("Example:");
    println!("  lx200r --address 192.168.1.50:4030 --json run.json");
}

fn require_value(args: &[String], i: usize, flag: &str) -> String {
    if i + 1 < args.len() {
        args[i + 1].clone()
    } else {
        eprintln!("Error: {flag} requires a value");
        process::exit(EXIT_USAGE);
    }
}

fn parse_args(args: &[String]) -> CliOptions {
    let mut options = CliOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--address" | "-a" => {
                options.address = Some(require_value(args, i, "--address"));
                i += 1;
            }
            "--emulate" | "-e" => options.emulate = true,
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(require_value(args, i, "--config")));
                i += 1;
            }
            "--list" | "-l" => options.list = true,
            "--command" => {
                options.command = Some(require_value(args, i, "--command"));
                i += 1;
            }
            "--raw" => {
                options.raw = Some(require_value(args, i, "--raw"));
                i += 1;
            }
            "--json" => {
                options.json_path = Some(PathBuf::from(require_value(args, i, "--json")));
                i += 1;
            }
            "--verbose" | "-v" => options.verbose = true,
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            other => {
                eprintln!("Error: unknown option '{other}' (see --help)");
                process::exit(EXIT_USAGE);
            }
        }
        i += 1;
    }

    options
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn print_catalog(catalog: &CommandCatalog) {
    let mut current = None;
    for (i, command) in catalog.iter().enumerate() {
        if current != Some(command.category) {
            current = Some(command.category);
            println!("\n{}:", command.category.label());
        }
        println!(
            "  {:2}. {:<24} {:<16} expects {}",
            i + 1,
            command.name,
            command.printable_wire(),
            command.expected_format
        );
    }
}

fn print_outcome(outcome: &TestOutcome) {
    let verdict = if outcome.passed { "PASS" } else { "FAIL" };
    print!(
        "{verdict} | {} -> '{}' ({} ms)",
        outcome.name,
        lx200r::catalog::escape_bytes(&outcome.received_bytes),
        outcome.elapsed.as_millis()
    );
    match outcome.failure_reason {
        Some(reason) => println!(" {reason}"),
        None => println!(),
    }
}

fn open_link(config: &TesterConfig) -> anyhow::Result<Link> {
    match config.connection_mode()? {
        ConnectionMode::Emulator => {
            log::info!("Using built-in LX200 emulator");
            Ok(Link::new(EmulatorTransport::new()))
        }
        ConnectionMode::Tcp => {
            let address = config.address();
            let transport = TcpTransport::open(&address, config.open_timeout()?)
                .with_context(|| format!("Could not connect to {address}"))?;
            Ok(Link::new(transport))
        }
    }
}

/// Print events as they arrive, then collect the finished run
fn drain_events(handle: RunHandle) -> TestRun {
    for event in handle.events().iter() {
        match event {
            RunEvent::Progress { index, total, name } => println!("[{index}/{total}] {name}"),
            RunEvent::Outcome(outcome) => print_outcome(&outcome),
            RunEvent::Aborted(error) => eprintln!("Run aborted: {error}"),
            RunEvent::Complete(_) => break,
        }
    }
    handle.wait()
}

/// 0 when nothing failed, 1 on failed commands, 2 when the link broke mid-run
fn exit_code(summary: &TestRunSummary) -> i32 {
    if summary.error.is_some() {
        EXIT_USAGE
    } else if summary.all_passed() {
        0
    } else {
        1
    }
}

async fn run_cli(options: CliOptions) -> anyhow::Result<i32> {
    let catalog = CommandCatalog::standard();

    if options.list {
        print_catalog(&catalog);
        return Ok(0);
    }

    let config_path = options.config_path.clone().unwrap_or_else(config::default_config_path);
    let mut tester_config = config::load_config(&config_path);
    if let Some(address) = &options.address {
        tester_config.set_property("connection.address", address.as_str());
        tester_config.set_property("connection.mode", "tcp");
    }
    if options.emulate {
        tester_config.set_property("connection.mode", "emulator");
    }

    let runner = TestRunner::new(tester_config.runner_config()?);
    let link = open_link(&tester_config)?;

    let single = match (&options.command, &options.raw) {
        (Some(_), Some(_)) => bail!("--command and --raw cannot be combined"),
        (Some(name), None) => Some(catalog.get(name)?.clone()),
        (None, Some(text)) => {
            if text.trim().is_empty() {
                bail!("--raw requires a non-empty command");
            }
            Some(CommandDefinition::custom(text))
        }
        (None, None) => None,
    };

    if let Some(command) = single {
        let outcome = runner.send_once(&command, &link)?;
        print_outcome(&outcome);
        if let Err(e) = link.close() {
            log::warn!("Failed to close link: {e}");
        }
        return Ok(if outcome.passed { 0 } else { 1 });
    }

    let handle = runner.start(catalog, &link)?;
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current command");
            cancel.cancel();
        }
    });

    let run = tokio::task::spawn_blocking(move || drain_events(handle))
        .await
        .context("Test run worker failed")?;

    if let Err(e) = link.close() {
        log::warn!("Failed to close link: {e}");
    }

    let summary = ReportAggregator::summarize(&run);
    println!();
    print!(
        "{}",
        ReportAggregator::render_text_with_threshold(&summary, tester_config.healthy_rate_percent())
    );

    if let Some(path) = &options.json_path {
        let json = ReportAggregator::to_json(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
        log::info!("JSON report written to {}", path.display());
    }

    Ok(exit_code(&summary))
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args);
    init_logging(options.verbose);

    match run_cli(options).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(EXIT_USAGE);
        }
    }
}

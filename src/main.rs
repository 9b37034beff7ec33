//! proc_monitor binary
//!
//! Samples the selected metrics once per interval, appends them to the
//! output directory and prints a snapshot of the current values.

use anyhow::Context;
use clap::{Parser, Subcommand};
use proc_monitor::metrics::CpuSample;
use proc_monitor::{
    MetricKind, Monitor, MonitorConfig, OutputMode, ProcFs, SystemError, DEFAULT_INTERVAL_MS,
    DEFAULT_OUTPUT_DIR, DEFAULT_PROC_ROOT,
};
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;
use sysinfo::System;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Clears the terminal and moves the cursor home.
const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";

#[derive(Parser)]
#[command(name = "proc_monitor")]
#[command(about = "Sample /proc counters and record CPU, memory, network and process metrics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
#[command(
    long_about = "Periodically samples the kernel counters exposed under /proc, derives \
                  rates and percentages between consecutive samples and writes one CSV or \
                  JSON file per metric while printing a live snapshot."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory receiving one output file per metric
    #[arg(short, long, global = true, default_value = DEFAULT_OUTPUT_DIR)]
    out_dir: String,

    /// Output format: csv or json
    #[arg(short, long, global = true, default_value = "csv")]
    mode: String,

    /// Sampling interval in milliseconds
    #[arg(short, long, global = true, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Total monitoring duration in seconds (0 runs until interrupted)
    #[arg(long, global = true, default_value_t = 0)]
    duration: u64,

    /// Metrics to monitor: cpu,mem,net,proc (comma separated, empty for all)
    #[arg(long, global = true, default_value = "")]
    metrics: String,

    /// Mount point of the proc filesystem
    #[arg(long, global = true, default_value = DEFAULT_PROC_ROOT)]
    proc_root: String,

    /// Do not clear the terminal between ticks
    #[arg(long, global = true)]
    no_clear: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor until interrupted or until the duration elapses (default)
    Run,

    /// Take two samples one interval apart, print the result and exit
    Snapshot,

    /// Show host information
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    let result = match &cli.command {
        Some(Commands::Run) | None => run_command(&cli).await,
        Some(Commands::Snapshot) => snapshot_command(&cli).await,
        Some(Commands::Info) => info_command(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Configuration problems refuse startup with 1, anything later exits with 2.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SystemError>() {
        Some(e) if e.is_config() => 1,
        _ => 2,
    }
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn build_config(cli: &Cli) -> Result<MonitorConfig, SystemError> {
    let mode: OutputMode = cli.mode.parse()?;
    let metrics = MetricKind::parse_list(&cli.metrics)?;
    let duration = (cli.duration > 0).then_some(cli.duration);

    let config = MonitorConfig::new(&cli.out_dir, mode)
        .with_interval_ms(cli.interval)
        .with_duration_secs(duration)
        .with_metrics(metrics)
        .with_proc_root(&cli.proc_root);
    config.validate()?;

    Ok(config)
}

async fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = build_config(cli)?;
    let deadline = config
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut monitor = Monitor::new(config.clone()).context("failed to start monitoring")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break Ok(());
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Monitoring duration reached");
            break Ok(());
        }

        match monitor.tick() {
            Ok(screen) => {
                let mut stdout = std::io::stdout().lock();
                if !cli.no_clear {
                    write!(stdout, "{}", CLEAR_SCREEN)?;
                }
                write!(stdout, "{}", screen)?;
                stdout.flush()?;
            }
            Err(e) => break Err(e),
        }
    };

    let closed = monitor.close();
    outcome.context("monitoring stopped")?;
    closed.context("failed to close output files")?;

    Ok(())
}

async fn snapshot_command(cli: &Cli) -> anyhow::Result<()> {
    let config = build_config(cli)?;
    let interval = Duration::from_millis(config.interval_ms);
    let mut monitor = Monitor::new(config).context("failed to start monitoring")?;

    monitor.tick().context("first sample failed")?;
    tokio::time::sleep(interval).await;
    let screen = monitor.tick().context("second sample failed")?;
    monitor.close().context("failed to close output files")?;

    print!("{}", screen);
    Ok(())
}

fn info_command(cli: &Cli) -> anyhow::Result<()> {
    let procfs = ProcFs::new(&cli.proc_root);
    let stat = std::fs::read_to_string(procfs.stat_path())
        .with_context(|| format!("failed to read {}", procfs.stat_path().display()))?;
    let cpu = CpuSample::parse(&stat)?;

    let mut system = System::new();
    system.refresh_memory();

    println!("Host Information");
    println!("================");
    println!();
    println!(
        "  Hostname: {}",
        System::host_name().unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "  OS: {} {}",
        System::name().unwrap_or_else(|| "unknown".to_string()),
        System::os_version().unwrap_or_default()
    );
    println!(
        "  Kernel: {}",
        System::kernel_version().unwrap_or_else(|| "unknown".to_string())
    );
    println!("  Uptime: {} seconds", System::uptime());
    println!("  CPU cores: {}", cpu.core_count());
    println!(
        "  Memory: {:.1} GB total",
        system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0
    );
    println!(
        "  Boot time: {}",
        chrono::DateTime::from_timestamp(cpu.boot_time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    Ok(())
}

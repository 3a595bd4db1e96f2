//! # A37474 gun driver
//!
//! Loads the board configuration, brings up the converter board, serves the
//! Modbus RTU register map over TCP and runs the 10 ms control tick until
//! SIGINT/SIGTERM.

use clap::Parser;
use gun_common::config::{ConfigLoader, LogLevel};
use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::ControlSource;
use gun_control::board::simulation::SimulationBoard;
use gun_control::server::ModbusServer;
use gun_control::tick::{TickRunner, rt_setup};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// A37474 gun driver: control tick + Modbus RTU slave
#[derive(Parser, Debug)]
#[command(name = "gun_control")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Electron-gun driver control loop with a Modbus RTU register map")]
struct Args {
    /// Path to the board configuration TOML.
    #[arg(long, default_value = "config/a37474.toml")]
    config: PathBuf,

    /// Modbus listen address (default: ethernet.local_ip:ethernet.port).
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Run without the Modbus listener.
    #[arg(long)]
    no_modbus: bool,

    /// Stop after this many ticks.
    #[arg(long)]
    ticks: Option<u64>,

    /// CPU core to pin the tick thread to (`rt` builds only).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = BoardConfig::load(&args.config);
    let config_level = loaded.as_ref().ok().map(|c| c.shared.log_level);
    setup_tracing(&args, config_level);

    info!("A37474 gun driver v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("A37474 gun driver shutdown complete");
}

fn run(args: &Args, config: BoardConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!(
        path = %args.config.display(),
        service = %config.shared.service_name,
        interface = ?config.interface,
        "Config OK"
    );

    rt_setup(args.cpu_core)?;

    let mut runner = TickRunner::with_config(SimulationBoard::new(&config), &config);
    runner.init()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let server = if args.no_modbus {
        None
    } else {
        let addr = args
            .bind
            .unwrap_or_else(|| SocketAddr::from((config.ethernet.local_ip, config.ethernet.port)));
        let mut server = ModbusServer::bind(
            addr,
            Arc::clone(runner.shared()),
            &config,
            ControlSource::Ethernet,
        )?;
        let r = running.clone();
        Some(
            thread::Builder::new()
                .name("modbus".to_string())
                .spawn(move || server.run(&r))?,
        )
    };

    info!("Tick runner initialised, entering control loop");
    let result = runner.run(&running, args.ticks);
    running.store(false, Ordering::SeqCst);

    if let Some(handle) = server {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Modbus server error: {e}"),
            Err(_) => warn!("Modbus server thread panicked"),
        }
    }
    runner.shutdown()?;
    result?;
    Ok(())
}

/// Setup tracing subscriber: `--verbose` wins, then the configured level.
fn setup_tracing(args: &Args, config_level: Option<LogLevel>) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match config_level.unwrap_or_default() {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

//! Binary entrypoint for the Microlink CLI.
//!
//! Commands:
//! - `start [--port <path>]` - run the protocol engine and an interactive
//!   monitor prompt against a UPS
//! - `init` - create a starter `config.toml`
//! - `status` - print the configuration and decoder summary
//!
//! See the library crate docs for module-level details: `microlink::`.
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;

use microlink::config::Config;
use microlink::protocol::decode;
use microlink::protocol::engine::EngineHandle;
use microlink::protocol::build_write_message;

#[derive(Parser)]
#[command(name = "microlink")]
#[command(about = "Decoder and live monitor for the APC Smart-UPS Microlink serial protocol")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a UPS and run the interactive monitor
    Start {
        /// Serial device port (e.g., /dev/ttyUSB0); overrides the config
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Initialize a new configuration file
    Init,
    /// Show configuration and decoder summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            println!("Configured port:  {}", display_port(&config.ups.port));
            println!("Baud rate:        {}", config.ups.baud_rate);
            println!("Poll interval:    {} ms", config.link.poll_interval_ms);
            println!("Liveness timeout: {} ms", config.link.liveness_timeout_ms);
            println!("Known message ids: {}", decode::known_ids().len());
        }
        Commands::Start { port } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting microlink v{}", env!("CARGO_PKG_VERSION"));

            let port_name = match port {
                Some(p) => p,
                None if !config.ups.port.is_empty() => config.ups.port.clone(),
                None => bail!("no --port given and no ups.port configured"),
            };

            #[cfg(not(feature = "serial"))]
            {
                let _ = port_name;
                bail!("built without serial support; enable the 'serial' feature");
            }

            #[cfg(feature = "serial")]
            {
                use microlink::protocol::engine::ProtocolEngine;
                use microlink::transport::SerialTransport;

                let transport = SerialTransport::open(&port_name, config.ups.baud_rate)?;
                info!(
                    "Connected to UPS on {} at {} baud",
                    port_name, config.ups.baud_rate
                );
                let (engine, handle) = ProtocolEngine::new(
                    transport,
                    config.link.timeouts(),
                    config.link.poll_interval(),
                );
                let engine_task = tokio::spawn(engine.run());

                interactive_loop(&handle).await?;

                handle.shutdown();
                match engine_task.await {
                    Ok(result) => result?,
                    Err(e) => log::warn!("engine task join error: {}", e),
                }
            }
        }
    }
    Ok(())
}

fn display_port(port: &str) -> &str {
    if port.is_empty() {
        "(none)"
    } else {
        port
    }
}

/// Operator prompt. Reads one command per line from stdin; every query goes
/// through the engine handle and never blocks the decode loop.
async fn interactive_loop(handle: &EngineHandle) -> Result<()> {
    use std::io::Write as _;
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("Microlink monitor. Type help or ? to list commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("(apc) ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        let args: Vec<&str> = parts.collect();
        match cmd {
            "help" | "?" => print_help(),
            "commstate" => println!("{}", handle.link_state()),
            "voltage" => print_params(handle, &["voltage_in", "voltage_out", "battery_voltage"]),
            "current" => print_params(handle, &["current_out"]),
            "frequency" => print_params(handle, &["frequency_in", "frequency_out"]),
            "runtime" => print_params(
                handle,
                &[
                    "runtime_remaining",
                    "runtime_remaining_2",
                    "runtime_minimum_return",
                    "loadshed_runtime_remaining",
                    "loadshed_runtime_limit",
                ],
            ),
            "battery" => print_params(
                handle,
                &["battery_voltage", "battery_soc", "battery_error"],
            ),
            "status" => print_params(handle, &["ups_status", "outlet_status", "input_status"]),
            "all" => {
                let snapshot = handle.parameters();
                let mut names: Vec<&String> = snapshot.keys().collect();
                names.sort();
                for name in names {
                    println!("{} = {}", name, snapshot[name].value);
                }
            }
            "json" => {
                let snapshot = handle.parameters();
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            "get" => match args.first() {
                Some(name) => print_params(handle, &[name]),
                None => println!("Usage: get <parameter>"),
            },
            "write" => match parse_write(&args) {
                Ok(msg) => {
                    println!("Sending {}", microlink::logutil::hex_snippet(&msg, 32));
                    if !handle.queue_write(msg) {
                        println!("Error sending");
                    }
                }
                Err(e) => println!("{}", e),
            },
            "exit" | "quit" => break,
            other => println!("Unknown command '{}'. Type help for a list.", other),
        }
    }
    Ok(())
}

fn print_help() {
    println!("commstate          Show the link synchronization state");
    println!("voltage            Show all actual voltages");
    println!("current            Show all actual currents");
    println!("frequency          Show actual frequencies");
    println!("runtime            Show runtime information and configuration");
    println!("battery            Show battery information and errors");
    println!("status             Show UPS status fields");
    println!("all                Show all known parameters");
    println!("json               Dump all known parameters as JSON");
    println!("get <name>         Show one parameter");
    println!("write <id> <offset> <hex data>   Send a raw write message");
    println!("exit               Exit the monitor");
}

fn print_params(handle: &EngineHandle, names: &[&str]) {
    for name in names {
        match handle.parameter(name) {
            Some(entry) => println!("{} = {}", name, entry.value),
            None => println!("{} = unknown", name),
        }
    }
}

/// Parse `write <hex id> <hex offset> <hex data>` into a wire message.
fn parse_write(args: &[&str]) -> Result<Vec<u8>> {
    if args.len() != 3 {
        bail!("Usage: write <hex id> <hex offset> <hex data>");
    }
    let id = parse_hex_byte(args[0])?;
    let offset = parse_hex_byte(args[1])?;
    let data = parse_hex_bytes(args[2])?;
    if data.is_empty() {
        bail!("write data must not be empty");
    }
    Ok(build_write_message(id, offset, &data))
}

fn parse_hex_byte(s: &str) -> Result<u8> {
    let trimmed = s.trim_start_matches("0x");
    u8::from_str_radix(trimmed, 16).map_err(|_| anyhow::anyhow!("invalid hex byte '{}'", s))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim_start_matches("0x");
    if trimmed.is_empty() || trimmed.len() % 2 != 0 {
        bail!("hex data must be an even number of digits");
    }
    (0..trimmed.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&trimmed[i..i + 2], 16)
                .map_err(|_| anyhow::anyhow!("invalid hex data '{}'", s))
        })
        .collect()
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Some(cfg) = config {
        if verbosity == 0 {
            let level = match cfg.logging.level.as_str() {
                "error" => log::LevelFilter::Error,
                "warn" => log::LevelFilter::Warn,
                "debug" => log::LevelFilter::Debug,
                "trace" => log::LevelFilter::Trace,
                _ => log::LevelFilter::Info,
            };
            builder.filter_level(level);
        }
        if let Some(ref file) = cfg.logging.file {
            if let Ok(f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
            {
                let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
                let is_tty = atty::is(atty::Stream::Stdout);
                builder.format(move |fmt, record| {
                    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                    let line = format!("{} [{}] {}", ts, record.level(), record.args());
                    if let Ok(mut guard) = write_mutex.lock() {
                        let _ = writeln!(guard, "{}", line);
                    }
                    if is_tty {
                        writeln!(fmt, "{}", line)?;
                    }
                    Ok(())
                });
            }
        }
    }
    let _ = builder.try_init();
}

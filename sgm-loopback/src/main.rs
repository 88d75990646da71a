//! SGMulti loopback simulation entry point.
//!
//! ```text
//! sgm-loopback                   Run with sgm-loopback.toml (or defaults)
//! sgm-loopback --config <path>   Load a custom config TOML
//! sgm-loopback --ticks <n>       Override the number of rounds
//! sgm-loopback --json            Print the report as JSON
//! sgm-loopback --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sgm_loopback::config::LoopbackConfig;
use sgm_loopback::sim::{SimReport, Simulation};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sgm-loopback", about = "SGMulti loopback simulation")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "sgm-loopback.toml")]
    config: PathBuf,

    /// Number of rounds, overriding the config.
    #[arg(short, long)]
    ticks: Option<u32>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&LoopbackConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = LoopbackConfig::load(&cli.config);
    if let Some(ticks) = cli.ticks {
        config.simulation.ticks = ticks;
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::File::create(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    info!("sgm-loopback v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {} (max {})", config.server.name, config.server.max_players);
    info!("clients: {}", config.clients.names.join(", "));
    info!("rounds: {}", config.simulation.ticks);

    let running = Arc::new(AtomicBool::new(true));
    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop.store(false, Ordering::SeqCst);
    });

    let ticks = config.simulation.ticks;
    let interval_ms = config.simulation.tick_interval_ms;
    let mut sim = Simulation::new(config);
    sim.start()?;

    let mut interval = (interval_ms > 0)
        .then(|| tokio::time::interval(Duration::from_millis(interval_ms)));
    while sim.tick() < ticks && running.load(Ordering::SeqCst) {
        if let Some(interval) = interval.as_mut() {
            interval.tick().await;
        }
        sim.step();
    }

    let report = sim.report();
    sim.finish();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &SimReport) {
    println!("rounds: {}", report.ticks);
    println!(
        "server \"{}\": {}/{} players ({} pending)",
        report.server.name,
        report.server.players.len(),
        report.server.max_players,
        report.server.pending
    );
    for player in &report.server.players {
        let name = player.name.as_deref().unwrap_or("?");
        println!("  {} {name}: {}", player.peer, player.status);
    }
    for client in &report.clients {
        print!(
            "client {} ({}): {}, {} chat lines, {} spawns",
            client.name,
            client.peer,
            client.status,
            client.chats.len(),
            client.spawns.len()
        );
        match &client.closed {
            Some(closed) => println!(", closed: {closed}"),
            None => println!(),
        }
    }
    println!(
        "packets: {} control, {} data, {} dropped; {} sent",
        report.traffic.control, report.traffic.data, report.traffic.dropped, report.messages_sent
    );
}

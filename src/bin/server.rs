//! dualwire Server Binary
//!
//! Starts the TCP and UDP listeners and serves until stdin closes.

use std::io::BufRead;

use clap::Parser;
use dualwire::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// dualwire Server
#[derive(Parser, Debug)]
#[command(name = "dualwire-server")]
#[command(about = "Concurrent TCP + UDP counter service")]
#[command(version)]
struct Args {
    /// Host to bind both listeners to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port
    #[arg(short, long, default_value = "7878")]
    tcp_port: u16,

    /// UDP port
    #[arg(short, long, default_value = "7879")]
    udp_port: u16,

    /// Maximum concurrently active handlers per transport
    #[arg(short, long, default_value = "64")]
    max_concurrent_handlers: usize,

    /// Pending datagram queue capacity
    #[arg(short = 'q', long, default_value = "1024")]
    udp_queue_capacity: usize,

    /// Idle timeout for TCP sessions, in milliseconds
    #[arg(short, long, default_value = "30000")]
    idle_timeout_ms: u64,

    /// Grace period for in-flight handlers on stop, in milliseconds
    #[arg(short = 'g', long, default_value = "5000")]
    stop_grace_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dualwire=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("dualwire Server v{}", dualwire::VERSION);

    // Build config from args
    let config = Config::builder()
        .host(&args.host)
        .tcp_port(args.tcp_port)
        .udp_port(args.udp_port)
        .max_concurrent_handlers(args.max_concurrent_handlers)
        .udp_queue_capacity(args.udp_queue_capacity)
        .idle_timeout_ms(args.idle_timeout_ms)
        .stop_grace_ms(args.stop_grace_ms)
        .build();

    let handle = match Server::new(config).start() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Serving; close stdin or type 'quit' to stop");
    wait_for_quit();

    tracing::info!("Shutdown requested (counter = {})", handle.counter_value());
    handle.stop();
}

/// Block until stdin reaches EOF or reads `quit`
fn wait_for_quit() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => return,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                return;
            }
        }
    }
}

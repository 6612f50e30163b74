//! dualwire CLI Client
//!
//! Command-line interface for talking to a dualwire server over TCP or UDP.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use dualwire::client::{Client, DatagramClient};
use dualwire::Result;

/// dualwire CLI
#[derive(Parser, Debug)]
#[command(name = "dualwire-cli")]
#[command(about = "CLI for the dualwire counter service")]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Use UDP instead of TCP
    #[arg(short, long)]
    udp: bool,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server
    Ping,

    /// Echo text back
    Echo {
        /// The text to echo
        text: String,
    },

    /// Increment the shared counter
    Incr {
        /// How many increments to send
        #[arg(short, long, default_value = "1")]
        count: u64,
    },

    /// Read the shared counter
    Get,
}

/// The operations both transports offer
enum Session {
    Tcp(Client),
    Udp(DatagramClient),
}

impl Session {
    fn ping(&mut self) -> Result<()> {
        match self {
            Session::Tcp(c) => c.ping(),
            Session::Udp(c) => c.ping(),
        }
    }

    fn echo(&mut self, text: String) -> Result<Vec<u8>> {
        let reply = match self {
            Session::Tcp(c) => c.echo(text)?,
            Session::Udp(c) => c.echo(text)?,
        };
        Ok(reply.to_vec())
    }

    fn incr(&mut self) -> Result<i64> {
        match self {
            Session::Tcp(c) => c.incr(),
            Session::Udp(c) => c.incr(),
        }
    }

    fn get(&mut self) -> Result<i64> {
        match self {
            Session::Tcp(c) => c.get(),
            Session::Udp(c) => c.get(),
        }
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let timeout = Duration::from_millis(args.timeout_ms);
    let mut session = if args.udp {
        Session::Udp(DatagramClient::connect(args.server.as_str(), timeout)?)
    } else {
        let mut client = Client::connect(args.server.as_str())?;
        client.set_timeout(timeout)?;
        Session::Tcp(client)
    };

    match args.command {
        Commands::Ping => {
            let started = Instant::now();
            session.ping()?;
            println!("PONG ({:?})", started.elapsed());
        }
        Commands::Echo { text } => {
            let reply = session.echo(text)?;
            println!("{}", String::from_utf8_lossy(&reply));
        }
        Commands::Incr { count } => {
            let mut value = 0;
            for _ in 0..count {
                value = session.incr()?;
            }
            println!("{}", value);
        }
        Commands::Get => {
            println!("{}", session.get()?);
        }
    }

    Ok(())
}

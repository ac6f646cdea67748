//! Command line interface for the `framelink` binary.
//!
//! Shared with the build script, which renders the man page from it, so this
//! module depends on nothing but `clap` and `std`.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command line arguments for the `framelink` binary.
#[derive(Debug, Parser)]
#[command(
    name = "framelink",
    version,
    about = "Length-prefixed JSON messaging over TCP"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the multi-client server until Ctrl+C.
    Serve(ServeArgs),
    /// Connect to a server and exercise it.
    Client(ClientArgs),
}

/// Host and port of the server.
#[derive(Debug, Clone, Args)]
pub struct Endpoint {
    /// Host name or IP address.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// TCP port.
    #[arg(long, default_value_t = 9999)]
    pub port: u16,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub endpoint: Endpoint,
    /// Largest accepted payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_length: Option<usize>,
    /// Text of the welcome message sent to new clients.
    #[arg(long, conflicts_with = "no_greeting")]
    pub greeting: Option<String>,
    /// Do not send a welcome message.
    #[arg(long)]
    pub no_greeting: bool,
    /// Value of `echoed_by` in echo replies.
    #[arg(long)]
    pub echo_marker: Option<String>,
    /// Number of accept tasks. Defaults to the available parallelism.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[command(flatten)]
    pub endpoint: Endpoint,
    /// What the client does once connected.
    #[arg(value_enum, default_value_t = ClientMode::Demo)]
    pub mode: ClientMode,
    /// Echo requests sent in performance mode.
    #[arg(long, default_value_t = 100)]
    pub requests: usize,
    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClientMode {
    /// Ping, echo, broadcast, stats and a custom message.
    Demo,
    /// Read commands from stdin.
    Interactive,
    /// Time a burst of echo requests.
    Performance,
}

//! `framelink` binary: run a server or drive one from the command line.

mod cli;
mod modes;

use std::{error::Error, net::SocketAddr, time::Duration};

use clap::Parser;
use cli::{Cli, ClientArgs, ClientMode, Command, Endpoint, ServeArgs};
use framelink::{Client, server::FrameServer};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Client(args) => client(args).await,
    }
}

async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, BoxError> {
    tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await?
        .next()
        .ok_or_else(|| format!("no address found for {}", endpoint.host).into())
}

async fn serve(args: ServeArgs) -> Result<(), BoxError> {
    install_metrics(args.metrics_addr)?;

    let mut server = FrameServer::new();
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }
    if let Some(length) = args.max_frame_length {
        server = server.max_frame_length(length);
    }
    if args.no_greeting {
        server = server.without_greeting();
    } else if let Some(greeting) = args.greeting {
        server = server.greeting(greeting);
    }
    if let Some(marker) = args.echo_marker {
        server = server.echo_marker(marker);
    }

    let addr = resolve(&args.endpoint).await?;
    server.bind(addr)?.run().await?;
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), BoxError> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "prometheus exporter listening");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), BoxError> {
    if addr.is_some() {
        tracing::warn!("built without the `metrics` feature; ignoring --metrics-addr");
    }
    Ok(())
}

async fn client(args: ClientArgs) -> Result<(), BoxError> {
    let addr = resolve(&args.endpoint).await?;
    let client = Client::builder()
        .request_timeout(Duration::from_secs(args.timeout))
        .connect(addr)
        .await?;
    println!("connected to {addr}");

    let outcome = match args.mode {
        ClientMode::Demo => modes::demo(&client).await,
        ClientMode::Interactive => modes::interactive(&client).await,
        ClientMode::Performance => modes::performance(&client, args.requests).await,
    };
    client.disconnect().await;
    outcome
}

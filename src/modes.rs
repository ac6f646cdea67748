//! Client modes of the `framelink` binary.

use std::time::Instant;

use framelink::{Client, ClientError, Message};
use serde_json::{Map, json};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};

use crate::BoxError;

/// Print unsolicited messages as they arrive.
fn print_incoming(client: &Client) -> Option<JoinHandle<()>> {
    let mut incoming = client.take_incoming()?;
    Some(tokio::spawn(async move {
        while let Some(message) = incoming.recv().await {
            println!("<< {}", describe(&message));
        }
    }))
}

fn describe(message: &Message) -> String {
    serde_json::to_string(message).unwrap_or_else(|_| message.kind().to_owned())
}

/// Run the scripted tour of every request type.
pub async fn demo(client: &Client) -> Result<(), BoxError> {
    let printer = print_incoming(client);

    let pong = client.ping().await?;
    let lag = pong
        .ping_time()
        .and_then(|sent| (pong.pong_timestamp - sent).num_microseconds())
        .unwrap_or_default();
    println!("pong for {} (server lag {lag} us)", pong.client_id);

    for text in ["Hello, framelink!", "Length-prefixed JSON"] {
        let echo = client.echo(text).await?;
        println!("echo: {} (by {})", echo.content, echo.echoed_by);
    }

    let sent = client.broadcast("Hello from the demo client").await?;
    println!("broadcast reached {} other client(s)", sent.recipients);

    let stats = client.server_stats().await?;
    println!(
        "server: {} client(s), {} message(s), up {}s",
        stats.connected_clients, stats.total_messages, stats.uptime_seconds
    );

    let mut fields = Map::new();
    fields.insert("payload".into(), json!({ "answer": 42 }));
    let reply = client.send_custom("custom_demo", fields).await?;
    println!("custom reply: {}", describe(&reply));

    if let Some(printer) = printer {
        printer.abort();
    }
    Ok(())
}

/// Read commands from stdin until `/exit` or end of input.
pub async fn interactive(client: &Client) -> Result<(), BoxError> {
    let printer = print_incoming(client);
    println!("commands: /ping /echo <text> /broadcast <text> /stats /custom <type> /exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let outcome = match command {
            "/exit" | "/quit" => break,
            "/ping" => client.ping().await.map(|p| format!("pong ({})", p.client_id)),
            "/echo" => client.echo(rest).await.map(|e| format!("echo: {}", e.content)),
            "/broadcast" => client
                .broadcast(rest)
                .await
                .map(|b| format!("broadcast sent to {}", b.recipients)),
            "/stats" => client.server_stats().await.map(|s| {
                format!(
                    "{} client(s), {} message(s), up {}s",
                    s.connected_clients, s.total_messages, s.uptime_seconds
                )
            }),
            "/custom" if !rest.is_empty() => client
                .send_custom(rest, Map::new())
                .await
                .map(|m| describe(&m)),
            _ => client.echo(line).await.map(|e| format!("echo: {}", e.content)),
        };
        match outcome {
            Ok(text) => println!("{text}"),
            Err(err @ ClientError::Server { .. }) => println!("server error: {err}"),
            Err(err) if err.is_recoverable() => println!("error: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(printer) = printer {
        printer.abort();
    }
    Ok(())
}

/// Send `count` echo requests back to back and report throughput.
pub async fn performance(client: &Client, count: usize) -> Result<(), BoxError> {
    let started = Instant::now();
    let mut succeeded = 0_usize;
    for n in 0..count {
        match client.echo(format!("performance test message {n}")).await {
            Ok(_) => succeeded += 1,
            Err(err) if err.is_recoverable() => tracing::debug!(%err, "echo failed"),
            Err(err) => return Err(err.into()),
        }
    }
    let elapsed = started.elapsed();
    #[expect(clippy::cast_precision_loss, reason = "display only")]
    let (rate, success) = (
        succeeded as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        if count == 0 { 0.0 } else { succeeded as f64 * 100.0 / count as f64 },
    );
    println!("sent {count} echo request(s), {succeeded} succeeded ({success:.1}%)");
    println!("took {:.3}s, {rate:.1} requests/s", elapsed.as_secs_f64());
    Ok(())
}

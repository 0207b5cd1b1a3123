//! Capscope worker binary
//!
//! NDJSON front for the worker: inbound envelopes are read one JSON object
//! per line from stdin, broadcast events are written one JSON object per line
//! to stdout. Reply-bearing requests (`select-frames`, `check-filter`) may
//! carry a numeric `id` field, echoed back on their reply line so the host
//! can correlate responses.

use anyhow::Result;
use capscope_shared::Request;
use capscope_worker::{Worker, WorkerConfig};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "capscope-worker")]
#[command(about = "Capture-analysis worker hosting the WASM dissection engine", long_about = None)]
#[command(version)]
struct Args {
    /// URL of the compressed engine module binary
    #[arg(long, env = "CAPSCOPE_WASM_URL")]
    wasm_url: String,

    /// URL of the compressed auxiliary data package
    #[arg(long, env = "CAPSCOPE_DATA_URL")]
    data_url: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = WorkerConfig {
        wasm_url: args.wasm_url,
        data_url: args.data_url,
    };

    let (events, mut events_rx) = broadcast::channel(256);

    // Stream broadcast events to stdout as NDJSON
    let printer = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("failed to encode event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event stream lagged, dropped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let handle = Worker::start(config, events).await?;
    let client = handle.client();

    // Pump stdin envelopes into the worker
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                debug!("ignoring unparseable envelope: {}", e);
                continue;
            }
        };

        let request = match serde_json::from_value::<Request>(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                debug!("ignoring undispatchable envelope: {}", e);
                continue;
            }
        };

        match request {
            // Reply-bearing operations answer on their own line, off the
            // broadcast stream, with the envelope's id echoed back. The send
            // happens here in arrival order; only awaiting the reply is
            // spawned off so the stdin loop keeps pumping.
            request @ (Request::SelectFrames { .. } | Request::CheckFilter { .. }) => {
                let id = value.get("id").cloned();
                let reply_rx = match client.request_deferred(&request) {
                    Ok(reply_rx) => reply_rx,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    match reply_rx.await {
                        Ok(reply) => {
                            let mut line = match serde_json::to_value(&reply) {
                                Ok(Value::Object(map)) => map,
                                _ => return,
                            };
                            if let Some(id) = id {
                                line.insert("id".to_string(), id);
                            }
                            if let Ok(text) = serde_json::to_string(&line) {
                                println!("{}", text);
                            }
                        }
                        Err(_) => warn!("worker terminated before replying"),
                    }
                });
            }
            request => {
                if client.send(&request).is_err() {
                    break;
                }
            }
        }
    }

    // Stdin closed: let the queue drain and surface any terminal engine error
    drop(client);
    let result = handle.into_join().await?;
    printer.abort();
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

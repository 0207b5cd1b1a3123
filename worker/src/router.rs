//! Message router and query handlers.
//!
//! A single task owns the engine and consumes inbound envelopes from an mpsc
//! queue, so engine calls are strictly serialized. Results go out on the
//! broadcast bus, except `select-frames` and `check-filter` which answer on
//! the reply channel attached to their envelope.
//!
//! `process:file` does not hold the queue for the duration of the file read:
//! the read runs in its own task and re-queues the bytes as a buffer-load
//! message, so a later fast request can complete first.

use crate::bootstrap;
use crate::config::WorkerConfig;
use anyhow::{Context, Result};
use capscope_engine::{Dissector, FilterCheck, StatusUpdate};
use capscope_shared::{sanitize, Event, Reply, Request};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// An inbound envelope: the raw JSON payload plus, for reply-bearing
/// operations, the one-shot channel the response goes to.
pub struct Inbound {
    pub payload: Value,
    pub reply: Option<oneshot::Sender<Reply>>,
}

impl Inbound {
    /// Envelope from raw host JSON, no reply channel.
    pub fn raw(payload: Value) -> Self {
        Self {
            payload,
            reply: None,
        }
    }

    /// Envelope from an already-typed request, no reply channel.
    pub fn request(request: &Request) -> Self {
        Self {
            // Request serialization to a plain JSON object cannot fail
            payload: serde_json::to_value(request).unwrap_or(Value::Null),
            reply: None,
        }
    }
}

/// Cloneable sending half of a worker.
#[derive(Clone)]
pub struct WorkerClient {
    tx: UnboundedSender<Inbound>,
}

impl WorkerClient {
    /// Forward a raw host envelope. Unknown `type` tags are ignored by the
    /// router, so this never fails on content, only on a dead worker.
    pub fn send_raw(&self, payload: Value) -> Result<()> {
        self.tx
            .send(Inbound::raw(payload))
            .map_err(|_| anyhow::anyhow!("worker is no longer running"))
    }

    /// Send a typed request without waiting for anything.
    pub fn send(&self, request: &Request) -> Result<()> {
        self.tx
            .send(Inbound::request(request))
            .map_err(|_| anyhow::anyhow!("worker is no longer running"))
    }

    /// Enqueue a reply-bearing request (`select-frames`, `check-filter`) and
    /// return the receiver for its reply. The send happens before this
    /// returns, so the request keeps its arrival-order slot relative to
    /// anything sent afterwards; only the await is deferred.
    pub fn request_deferred(&self, request: &Request) -> Result<oneshot::Receiver<Reply>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let inbound = Inbound {
            payload: serde_json::to_value(request).unwrap_or(Value::Null),
            reply: Some(reply_tx),
        };
        self.tx
            .send(inbound)
            .map_err(|_| anyhow::anyhow!("worker is no longer running"))?;
        Ok(reply_rx)
    }

    /// Send a reply-bearing request and await its reply-channel response.
    pub async fn request(&self, request: &Request) -> Result<Reply> {
        self.request_deferred(request)?
            .await
            .context("worker terminated before replying")
    }
}

/// A running worker: its client plus the join handle through which a terminal
/// engine failure becomes visible to the host.
pub struct WorkerHandle {
    client: WorkerClient,
    pub join: JoinHandle<Result<()>>,
}

impl WorkerHandle {
    pub fn client(&self) -> WorkerClient {
        self.client.clone()
    }

    /// Release the handle's own sender and return the join handle, so the
    /// queue can drain and close once all other clients are dropped.
    pub fn into_join(self) -> JoinHandle<Result<()>> {
        self.join
    }
}

/// The worker task: owns the engine, drains the queue.
pub struct Worker {
    engine: Box<dyn Dissector>,
    events: broadcast::Sender<Event>,
    // Used by file-read tasks to re-queue loads; weak so the queue closes
    // when the last client goes away.
    requeue: WeakUnboundedSender<Inbound>,
}

impl Worker {
    /// Spawn a worker around an already-initialized engine.
    pub fn spawn(engine: Box<dyn Dissector>, events: broadcast::Sender<Event>) -> WorkerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
        let mut worker = Worker {
            engine,
            events,
            requeue: tx.downgrade(),
        };

        let join = tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                worker.dispatch(inbound)?;
            }
            debug!("worker queue closed, shutting down");
            Ok(())
        });

        WorkerHandle {
            client: WorkerClient { tx },
            join,
        }
    }

    /// Bootstrap the engine from remote assets, then spawn the worker.
    ///
    /// Emits `status` events while the engine initializes, then `init` on
    /// success or `error` on failure. One-shot: a failure here is terminal.
    pub async fn start(
        config: WorkerConfig,
        events: broadcast::Sender<Event>,
    ) -> Result<WorkerHandle> {
        config.validate()?;

        let assets = match bootstrap::fetch_assets(&config).await {
            Ok(assets) => assets,
            Err(e) => {
                error!("asset fetch failed: {:#}", e);
                let _ = events.send(Event::Error {
                    error: format!("{e:#}"),
                });
                return Err(e);
            }
        };

        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StatusUpdate>();
        let status_events = events.clone();
        tokio::spawn(async move {
            while let Some(update) = status_rx.recv().await {
                let _ = status_events.send(Event::Status {
                    code: update.code,
                    status: update.status,
                });
            }
        });

        let engine = tokio::task::spawn_blocking(move || {
            bootstrap::init_engine(assets, status_tx)
        })
        .await
        .context("engine initialization task panicked")?;

        let engine = match engine {
            Ok(engine) => engine,
            Err(e) => {
                error!("engine initialization failed: {}", e);
                let _ = events.send(Event::Error {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        info!("engine initialized");
        let _ = events.send(Event::Init);
        Ok(Self::spawn(Box::new(engine), events))
    }

    /// Handle one envelope: look up its operation, run the engine call, emit
    /// the result. Unknown operations are dropped without error; engine
    /// failures (other than an invalid filter) propagate and terminate the
    /// worker.
    fn dispatch(&mut self, inbound: Inbound) -> Result<()> {
        let request = match serde_json::from_value::<Request>(inbound.payload) {
            Ok(request) => request,
            // Unknown tag and known tag with malformed fields both drop, but
            // the error text tells a debugging host which one it was
            Err(e) => {
                debug!("ignoring undispatchable envelope: {}", e);
                return Ok(());
            }
        };

        match request {
            Request::Columns => {
                let data = self.engine.columns()?;
                let _ = self.events.send(Event::Columns { data });
            }
            Request::Select { number } => {
                let data = sanitize(self.engine.frame(number)?);
                let _ = self.events.send(Event::Selected { data });
            }
            Request::SelectFrames {
                skip,
                limit,
                filter,
            } => {
                let data = sanitize(self.engine.frames(&filter, skip, limit)?);
                Self::reply(inbound.reply, Reply::Frames { data });
            }
            Request::CheckFilter { filter } => {
                let reply = match self.engine.check_filter(&filter)? {
                    FilterCheck::Ok => Reply::filter_ok(),
                    FilterCheck::Invalid { reason } => Reply::FilterError { error: reason },
                };
                Self::reply(inbound.reply, reply);
            }
            Request::ProcessBuffer { name, data } => {
                let summary = self.engine.load(&name, &data)?;
                let _ = self.events.send(Event::Processed {
                    name,
                    data: summary,
                });
            }
            Request::ProcessFile { file } => {
                let requeue = self.requeue.clone();
                tokio::spawn(async move {
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.to_string_lossy().into_owned());
                    match tokio::fs::read(&file).await {
                        Ok(data) => {
                            if let Some(tx) = requeue.upgrade() {
                                let _ = tx.send(Inbound::request(&Request::ProcessBuffer {
                                    name,
                                    data,
                                }));
                            }
                        }
                        Err(e) => {
                            warn!("failed to read {}: {}", file.display(), e);
                        }
                    }
                });
            }
        }
        Ok(())
    }

    fn reply(channel: Option<oneshot::Sender<Reply>>, reply: Reply) {
        match channel {
            // A dropped receiver means the requester stopped waiting
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("reply-bearing request arrived without a reply channel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capscope_engine::MockDissector;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_type_produces_nothing() {
        let (events, mut rx) = broadcast::channel(16);
        let handle = Worker::spawn(Box::new(MockDissector::new()), events);
        let client = handle.client();

        client.send_raw(json!({"type": "defragment"})).unwrap();
        client.send(&Request::Columns).unwrap();

        // The only event is the one for the known request
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::Columns { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_worker_stops_when_clients_drop() {
        let (events, _rx) = broadcast::channel(16);
        let handle = Worker::spawn(Box::new(MockDissector::new()), events);
        handle.into_join().await.unwrap().unwrap();
    }
}

//! Messaging client backed by a sidecar process.
//!
//! The sidecar owns the messaging protocol and device pairing. It talks
//! newline-delimited JSON over stdio:
//!
//! - sidecar → gateway: `{"event":"qr","code":..}`, `{"event":"ready"}`,
//!   `{"event":"sent","id":N}`, `{"event":"failed","id":N,"error":..}`,
//!   `{"event":"log","message":..}`
//! - gateway → sidecar: `{"id":N,"target":..,"message":{"kind":..}}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::traits::{OutgoingMessage, StatusClient};
use crate::session::SessionEvent;

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Reply = std::result::Result<(), String>;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Qr { code: String },
    Ready,
    Sent { id: u64 },
    Failed { id: u64, error: String },
    Log { message: String },
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    target: &'a str,
    message: &'a OutgoingMessage,
}

pub struct BridgeClient {
    name: String,
    reader: Mutex<Option<Reader>>,
    writer: tokio::sync::Mutex<Writer>,
    /// Sends awaiting a `sent`/`failed` reply, keyed by request id
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
    /// Set once the sidecar output has ended; no reply can arrive after it
    closed: AtomicBool,
    _child: Mutex<Option<Child>>,
}

impl BridgeClient {
    /// Start the sidecar. It is killed when the client is dropped.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn messaging bridge `{program}`"))?;

        let stdin = child.stdin.take().context("Bridge stdin was not captured")?;
        let stdout = child.stdout.take().context("Bridge stdout was not captured")?;
        info!(program, pid = ?child.id(), "Messaging bridge started");

        let client = Self::from_io(program, BufReader::new(stdout), stdin);
        *client._child.lock() = Some(child);
        Ok(client)
    }

    /// Build a client over arbitrary streams.
    pub fn from_io<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            reader: Mutex::new(Some(Box::new(reader))),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            _child: Mutex::new(None),
        }
    }

    fn resolve(&self, id: u64, reply: Reply) {
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => warn!(bridge = %self.name, id, "Reply for unknown request"),
        }
    }

    fn fail_pending(&self, cause: &str) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(cause.to_string()));
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    async fn read_events(&self, reader: &mut Reader, tx: &mpsc::Sender<SessionEvent>) -> Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .context("Failed to read from messaging bridge")?;
            if n == 0 {
                warn!(bridge = %self.name, "Messaging bridge output closed");
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let session_event = match serde_json::from_str::<BridgeEvent>(trimmed) {
                Ok(BridgeEvent::Qr { code }) => SessionEvent::PairingCode(code),
                Ok(BridgeEvent::Ready) => SessionEvent::Ready,
                Ok(BridgeEvent::Sent { id }) => {
                    debug!(bridge = %self.name, id, "Message confirmed");
                    self.resolve(id, Ok(()));
                    continue;
                }
                Ok(BridgeEvent::Failed { id, error }) => {
                    self.resolve(id, Err(error));
                    continue;
                }
                Ok(BridgeEvent::Log { message }) => {
                    info!(bridge = %self.name, "{message}");
                    continue;
                }
                Err(e) => {
                    warn!(bridge = %self.name, error = %e, line = %trimmed, "Skipping unparseable bridge line");
                    continue;
                }
            };

            if tx.send(session_event).await.is_err() {
                debug!(bridge = %self.name, "Session listener dropped; stopping");
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl StatusClient for BridgeClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn listen(&self, tx: mpsc::Sender<SessionEvent>) -> Result<()> {
        let mut reader = self
            .reader
            .lock()
            .take()
            .context("Messaging bridge is already being listened to")?;

        let result = self.read_events(&mut reader, &tx).await;
        self.closed.store(true, Ordering::SeqCst);
        self.fail_pending("messaging bridge closed");
        result
    }

    async fn send_message(&self, target: &str, message: OutgoingMessage) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&BridgeRequest {
            id,
            target,
            message: &message,
        })
        .context("Failed to encode bridge request")?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // Checked after registering so a concurrent drain in `listen` cannot
        // miss this request.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().remove(&id);
            anyhow::bail!("Messaging bridge closed");
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().remove(&id);
            return Err(e).context("Failed to write to messaging bridge");
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => anyhow::bail!("{cause}"),
            Err(_) => anyhow::bail!("Messaging bridge dropped request {id}"),
        }
    }
}

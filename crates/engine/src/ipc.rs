// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-scoped IPC: the bridge between the engine and the `meow` CLI
//! invocations running inside agent sessions and branch conditions.
//!
//! Each engine listens on a unix socket next to its run document. Wire
//! format: 4-byte length prefix (big-endian) + JSON payload. Requests are
//! one-shot: connect, send, await response, close.

use crate::router::{EventRouter, Outcome, Predicate};
use indexmap::IndexMap;
use meow_core::{AgentId, EngineEvent, Value, EVENT_AGENT_OUTPUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Protocol errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,
}

/// Maximum message size (16 MB) — outputs blobs, not bulk data.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A request from a `meow` CLI invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// `meow event <type>` — fire-and-forget emit.
    Emit {
        event_type: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        payload: IndexMap<String, Value>,
    },
    /// `meow await-event <type>` — block until matched or timeout.
    Await {
        event_type: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        predicate: Vec<(String, Value)>,
        timeout_ms: u64,
    },
    /// `meow done` — agent hands its outputs back to the engine.
    Done {
        agent_id: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        outputs: IndexMap<String, Value>,
    },
}

/// Engine's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Matched {
        payload: IndexMap<String, Value>,
    },
    TimedOut,
    Error {
        message: String,
    },
}

/// Read a length-prefixed message from an async reader.
async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, IpcError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(IpcError::ConnectionClosed);
        }
        Err(e) => return Err(IpcError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed message to an async writer.
async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), IpcError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Listener task accepting CLI connections for one run.
pub struct IpcListener {
    socket: UnixListener,
    socket_path: PathBuf,
    router: EventRouter,
    cancel: CancellationToken,
}

impl IpcListener {
    /// Bind the run's socket. A stale socket file is removed first.
    pub fn bind(
        socket_path: &Path,
        router: EventRouter,
        cancel: CancellationToken,
    ) -> Result<Self, IpcError> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let socket = UnixListener::bind(socket_path)?;
        Ok(Self {
            socket,
            socket_path: socket_path.to_path_buf(),
            router,
            cancel,
        })
    }

    /// Accept connections until cancelled, handling each in its own task.
    pub async fn run(self) {
        loop {
            tokio::select! {
                accepted = self.socket.accept() => match accepted {
                    Ok((stream, _)) => {
                        let router = self.router.clone();
                        let cancel = self.cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, router, cancel).await {
                                match e {
                                    IpcError::ConnectionClosed => {
                                        tracing::debug!("client disconnected")
                                    }
                                    _ => tracing::error!(error = %e, "connection error"),
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept error");
                    }
                },
                _ = self.cancel.cancelled() => {
                    let _ = std::fs::remove_file(&self.socket_path);
                    return;
                }
            }
        }
    }
}

/// Handle one client connection: read a request, act, reply.
async fn handle_connection(
    stream: UnixStream,
    router: EventRouter,
    cancel: CancellationToken,
) -> Result<(), IpcError> {
    let (mut reader, mut writer) = stream.into_split();

    let bytes = read_message(&mut reader).await?;
    let request: Request = serde_json::from_slice(&bytes)?;
    tracing::debug!(request = ?request, "ipc request");

    let response = match request {
        Request::Emit {
            event_type,
            payload,
        } => {
            router.emit(&EngineEvent::new(event_type, payload));
            Response::Ok
        }
        Request::Await {
            event_type,
            predicate,
            timeout_ms,
        } => {
            let predicate = Predicate { equals: predicate };
            let outcome = router
                .await_event(
                    &event_type,
                    predicate,
                    Duration::from_millis(timeout_ms),
                    &cancel,
                )
                .await;
            match outcome {
                Outcome::Matched(payload) => Response::Matched { payload },
                Outcome::TimedOut => Response::TimedOut,
                Outcome::Cancelled => Response::Error {
                    message: "engine shutting down".to_string(),
                },
            }
        }
        Request::Done { agent_id, outputs } => {
            let event = EngineEvent::agent_output(&AgentId::new(agent_id), outputs);
            router.emit(&event);
            Response::Ok
        }
    };

    let data = serde_json::to_vec(&response)?;
    write_message(&mut writer, &data).await
}

/// Client side, used by the CLI subcommands.
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Send one request and await the engine's response.
    pub async fn request(&self, request: &Request) -> Result<Response, IpcError> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;
        let data = serde_json::to_vec(request)?;
        write_message(&mut stream, &data).await?;
        let bytes = read_message(&mut stream).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;

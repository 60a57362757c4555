//! Local event intake endpoint.
//!
//! One Unix domain socket per running instance. Hook scripts connect, write
//! one JSON payload, read a one-line ack, and close. The socket is the only
//! trust boundary: filesystem-scoped, owner-only permissions, bounded reads.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_core::events::HookEvent;

/// Intake configuration.
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    /// Filesystem path the socket binds to. Recreated on each start.
    pub socket_path: PathBuf,
    /// Hard cap on a single payload. Connections exceeding it are rejected.
    pub max_payload_bytes: usize,
    /// When set, events whose cwd does not start with this root are dropped
    /// before they reach the correlator.
    pub expected_root: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_payload_bytes: 64 * 1024,
            expected_root: None,
        }
    }
}

/// Upper bound on the bytes discarded from an oversized connection before
/// the error ack is written.
const OVERSIZE_DRAIN_LIMIT: u64 = 1024 * 1024;

/// Default socket path under the user's home directory.
pub fn default_socket_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".tether")
        .join("intake.sock")
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("failed to bind intake socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to prepare socket directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct IntakeHandle {
    socket_path: PathBuf,
    _accept: tokio::task::JoinHandle<()>,
}

impl IntakeHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting and remove the socket file.
    pub fn shutdown(self) {
        self._accept.abort();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.socket_path.display(), error = %e, "failed to unlink intake socket");
            }
        }
    }
}

/// Bind the intake socket and start accepting hook connections.
///
/// Bind failure is a configuration error and is fatal; per-connection
/// failures are logged and never take the listener down.
pub fn start(
    config: IntakeConfig,
    events: mpsc::Sender<HookEvent>,
) -> Result<IntakeHandle, IntakeError> {
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| IntakeError::Prepare {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // A stale socket from a previous run blocks the bind.
    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(IntakeError::Prepare {
                path: config.socket_path.clone(),
                source,
            })
        }
    }

    let listener = UnixListener::bind(&config.socket_path).map_err(|source| IntakeError::Bind {
        path: config.socket_path.clone(),
        source,
    })?;

    // Owner-only: hooks run as the same user, nothing else needs access.
    if let Err(e) = std::fs::set_permissions(
        &config.socket_path,
        std::fs::Permissions::from_mode(0o600),
    ) {
        warn!(path = %config.socket_path.display(), error = %e, "failed to restrict socket permissions");
    }

    info!(path = %config.socket_path.display(), "intake socket listening");

    let socket_path = config.socket_path.clone();
    let accept = tokio::spawn(accept_loop(listener, config, events));

    Ok(IntakeHandle {
        socket_path,
        _accept: accept,
    })
}

async fn accept_loop(
    listener: UnixListener,
    config: IntakeConfig,
    events: mpsc::Sender<HookEvent>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                // Hooks fire concurrently; each connection is independent and
                // only the channel send is a synchronized step.
                let config = config.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    handle_connection(stream, &config, &events).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "intake accept failed");
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    config: &IntakeConfig,
    events: &mpsc::Sender<HookEvent>,
) {
    let mut payload = Vec::new();
    // One extra byte past the cap distinguishes "exactly at the limit"
    // from "over it".
    let limit = config.max_payload_bytes as u64 + 1;
    if let Err(e) = (&mut stream).take(limit).read_to_end(&mut payload).await {
        debug!(error = %e, "intake read failed");
        return;
    }

    if payload.is_empty() {
        return;
    }
    if payload.len() > config.max_payload_bytes {
        warn!(bytes = payload.len(), "oversized intake payload rejected");
        // Drain whatever the client is still writing, within a bound, so the
        // error ack is read instead of a connection reset.
        let _ = tokio::io::copy(
            &mut (&mut stream).take(OVERSIZE_DRAIN_LIMIT),
            &mut tokio::io::sink(),
        )
        .await;
        respond(&mut stream, r#"{"status":"error","message":"payload too large"}"#).await;
        return;
    }

    let event = match HookEvent::from_slice(&payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "undecodable intake payload rejected");
            respond(&mut stream, r#"{"status":"error","message":"invalid payload"}"#).await;
            return;
        }
    };

    if let Some(root) = &config.expected_root {
        if !Path::new(&event.cwd).starts_with(root) {
            debug!(cwd = %event.cwd, root = %root.display(), "event outside expected root dropped");
            respond(&mut stream, r#"{"status":"ignored"}"#).await;
            return;
        }
    }

    debug!(kind = event.kind.label(), cwd = %event.cwd, "intake event accepted");
    if events.send(event).await.is_err() {
        warn!("event channel closed, dropping intake event");
        respond(&mut stream, r#"{"status":"error","message":"shutting down"}"#).await;
        return;
    }

    respond(&mut stream, r#"{"status":"ok"}"#).await;
}

async fn respond(stream: &mut UnixStream, body: &str) {
    if let Err(e) = stream.write_all(body.as_bytes()).await {
        debug!(error = %e, "failed to write intake ack");
    }
    let _ = stream.shutdown().await;
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Transport lifecycle module
//!
//! [`Transport`] owns the single listening HTTP server of the process. It moves
//! through a fixed sequence of states, published on a `watch` channel:
//!
//! ```text
//! Created -> Starting -> Listening -> Draining -> Stopped
//! ```
//!
//! Draining is entered when the shutdown token is cancelled, which happens
//! through a [`DrainHandle`] held by the execution engine. While draining the
//! listener is closed and in-flight requests run to completion, bounded by the
//! drain timeout.

use std::{fmt, io, net::SocketAddr, time::Duration};

use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle states of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed, nothing attached
    Created,
    /// Application attached, socket not bound yet
    Starting,
    /// Socket bound, accepting connections
    Listening,
    /// No new connections accepted, in-flight requests finishing
    Draining,
    /// All connections closed
    Stopped,
}

impl TransportState {
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Starting)
                | (Self::Starting, Self::Listening)
                | (Self::Listening, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Created => write!(f, "created"),
            TransportState::Starting => write!(f, "starting"),
            TransportState::Listening => write!(f, "listening"),
            TransportState::Draining => write!(f, "draining"),
            TransportState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a drain finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request completed within the drain timeout
    Graceful,
    /// The drain timeout elapsed and remaining connections were aborted
    Forced,
}

/// Hook through which the execution engine drains the transport
#[derive(Debug, Clone)]
pub struct DrainHandle {
    shutdown: CancellationToken,
    state: watch::Receiver<TransportState>,
}

impl DrainHandle {
    /// Stop accepting connections and begin draining
    pub fn drain(&self) {
        debug!("drain requested");
        self.shutdown.cancel();
    }

    /// Wait until the transport has stopped
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // A closed channel means the transport is gone, which is as stopped as it gets
        let _ = state
            .wait_for(|state| *state == TransportState::Stopped)
            .await;
    }

    /// Whether draining has been requested
    pub fn is_draining(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// The process-wide HTTP transport
///
/// Not `Clone`: exactly one transport serves a process.
#[derive(Debug)]
pub struct Transport {
    state: watch::Sender<TransportState>,
    router: Option<Router>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    drain_timeout: Duration,
}

impl Transport {
    /// Create a transport in the `Created` state
    pub fn new(drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(TransportState::Created);
        Self {
            state,
            router: None,
            listener: None,
            local_addr: None,
            shutdown: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Address the transport is bound to, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Handle that lets the execution engine drain this transport
    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle {
            shutdown: self.shutdown.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Attach the fully assembled application
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Lifecycle` unless the transport is `Created`.
    pub fn attach(&mut self, router: Router) -> ServerResult<()> {
        advance(&self.state, TransportState::Starting)?;
        self.router = Some(router);
        Ok(())
    }

    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Lifecycle` unless an application is attached,
    /// `ServerError::Bind` if the address cannot be bound, or
    /// `ServerError::Startup` if the bound address cannot be read back.
    pub async fn start(&mut self, addr: SocketAddr) -> ServerResult<SocketAddr> {
        let from = self.state();
        if !from.can_advance_to(TransportState::Listening) {
            return Err(ServerError::Lifecycle {
                from,
                to: TransportState::Listening,
            });
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        advance(&self.state, TransportState::Listening)?;
        self.listener = Some(listener);
        self.local_addr = Some(local_addr);

        info!(address = %local_addr, "transport listening");
        Ok(local_addr)
    }

    /// Serve connections until drained
    ///
    /// Each accepted connection runs as its own task. Once the shutdown token
    /// is cancelled the listener is closed and every connection is asked to
    /// finish its in-flight request and close. Connections still open when the
    /// drain timeout elapses are aborted along with the requests they carry.
    ///
    /// Resolves once the transport reaches `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Lifecycle` unless the transport is `Listening`.
    pub async fn serve(mut self) -> ServerResult<DrainOutcome> {
        let from = self.state();
        let (Some(listener), Some(router)) = (self.listener.take(), self.router.take()) else {
            return Err(ServerError::Lifecycle {
                from,
                to: TransportState::Draining,
            });
        };

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "connection accepted");
                        connections.spawn(serve_connection(
                            stream,
                            router.clone(),
                            self.shutdown.clone(),
                        ));
                    }
                    Err(e) if is_connection_error(&e) => {
                        debug!(error = %e, "connection failed before it was accepted");
                    }
                    Err(e) => {
                        // Typically descriptor exhaustion, back off until connections close
                        warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "connection task failed");
                    }
                }
                () = self.shutdown.cancelled() => break,
            }
        }

        drop(listener);
        advance(&self.state, TransportState::Draining)?;
        info!(
            connections = connections.len(),
            "transport draining, new connections refused"
        );

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        let outcome = if drained.is_ok() {
            DrainOutcome::Graceful
        } else {
            warn!(
                timeout_seconds = self.drain_timeout.as_secs(),
                connections = connections.len(),
                "drain timeout elapsed, aborting remaining connections"
            );
            connections.shutdown().await;
            DrainOutcome::Forced
        };

        advance(&self.state, TransportState::Stopped)?;
        info!(outcome = ?outcome, "transport stopped");
        Ok(outcome)
    }
}

/// Serve one connection, closing it gracefully once `shutdown` is cancelled
async fn serve_connection(stream: TcpStream, router: Router, shutdown: CancellationToken) {
    let builder = Builder::new(TokioExecutor::new());
    let connection =
        builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "connection closed with error");
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn advance(state: &watch::Sender<TransportState>, to: TransportState) -> ServerResult<()> {
    let mut result = Ok(());
    state.send_if_modified(|current| {
        if current.can_advance_to(to) {
            debug!(from = %current, to = %to, "transport state changed");
            *current = to;
            true
        } else {
            result = Err(ServerError::Lifecycle { from: *current, to });
            false
        }
    });
    result
}

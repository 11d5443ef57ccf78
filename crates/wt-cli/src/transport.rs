//! Websocket connection to the scale server.
//!
//! The transport runs as its own task and only pushes [`TransportEvent`]s into
//! the engine mailbox. When the connection drops it waits [`RECONNECT_DELAY`]
//! and tries again until it is cancelled.

use anyhow::{Context, Result, bail};
use chrono::Local;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use wt_core::Reading;

use crate::Config;
use crate::protocol::{self, ClientMessage};

/// Fixed delay before reconnecting after the connection is lost.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Events produced by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
    Reading(Reading),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("engine mailbox closed")]
    MailboxClosed,
}

/// Where to connect and how to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub scale_id: u32,
}

impl From<&Config> for Endpoint {
    fn from(config: &Config) -> Self {
        Self {
            url: config.server_url.clone(),
            scale_id: config.scale_id,
        }
    }
}

/// Owns the connection task and its cancellation.
#[derive(Debug, Default)]
pub struct TransportController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl TransportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Starts the connection loop, delivering events into `mailbox`.
    pub fn connect<M>(&mut self, endpoint: Endpoint, mailbox: mpsc::Sender<M>) -> Result<()>
    where
        M: From<TransportEvent> + Send + 'static,
    {
        if self.is_active() {
            bail!("transport already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(connection_loop(endpoint, mailbox, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops the connection loop. No reconnect attempt follows.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("transport task failed to join")
        } else {
            Ok(())
        }
    }
}

async fn emit<M: From<TransportEvent>>(
    mailbox: &mpsc::Sender<M>,
    event: TransportEvent,
) -> Result<(), TransportError> {
    mailbox
        .send(M::from(event))
        .await
        .map_err(|_| TransportError::MailboxClosed)
}

async fn connection_loop<M>(
    endpoint: Endpoint,
    mailbox: mpsc::Sender<M>,
    cancel_token: CancellationToken,
) where
    M: From<TransportEvent> + Send + 'static,
{
    loop {
        if emit(&mailbox, TransportEvent::Connecting).await.is_err() {
            break;
        }

        match run_connection(&endpoint, &mailbox, &cancel_token).await {
            Ok(()) => tracing::info!(url = %endpoint.url, "disconnected from server"),
            Err(TransportError::MailboxClosed) => break,
            Err(err) => {
                tracing::warn!(error = %err, "connection failed");
                if emit(&mailbox, TransportEvent::Error(err.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }

        if cancel_token.is_cancelled() {
            break;
        }
        if emit(&mailbox, TransportEvent::Disconnected).await.is_err() {
            break;
        }

        tracing::info!(delay_secs = RECONNECT_DELAY.as_secs(), "reconnecting");
        tokio::select! {
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }

    tracing::debug!("transport loop shutting down");
}

/// Runs one connection until the server closes it, it fails, or it is cancelled.
async fn run_connection<M: From<TransportEvent>>(
    endpoint: &Endpoint,
    mailbox: &mpsc::Sender<M>,
    cancel_token: &CancellationToken,
) -> Result<(), TransportError> {
    let connected = tokio::select! {
        () = cancel_token.cancelled() => return Ok(()),
        connected = connect_async(endpoint.url.as_str()) => connected,
    };
    let (mut socket, _response) = connected.map_err(|source| TransportError::Connect {
        url: endpoint.url.clone(),
        source,
    })?;

    tracing::info!(url = %endpoint.url, "connected to server");
    emit(mailbox, TransportEvent::Connected).await?;

    let register = protocol::encode(&ClientMessage::register(endpoint.scale_id))?;
    socket.send(Message::Text(register)).await?;

    loop {
        let frame = tokio::select! {
            () = cancel_token.cancelled() => {
                if let Err(err) = socket.close(None).await {
                    tracing::debug!(error = %err, "close handshake failed");
                }
                return Ok(());
            }
            frame = socket.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let received_at = Local::now().naive_local();
                if let Some(reading) = protocol::reading_from_frame(&text, received_at) {
                    emit(mailbox, TransportEvent::Reading(reading)).await?;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(?frame, "server closed connection");
                return Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
            None => return Ok(()),
        }
    }
}

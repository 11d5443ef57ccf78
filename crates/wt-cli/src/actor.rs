//! Single-task owner of the [`Engine`].
//!
//! Transport events and operator requests share one mailbox, so readings and
//! commands are applied strictly in arrival order and the engine is never
//! reentered.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use wt_core::{Engine, EngineError, SessionLog, SessionRecord, SessionState, SessionSummary, Status};

use crate::transport::TransportEvent;

/// Mailbox capacity; transport sends wait when the engine falls behind.
const MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandleError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("engine task has stopped")]
    Stopped,
}

/// Point-in-time copy of the engine's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub state: SessionState,
    pub connected: bool,
    pub current_weight: f64,
    pub log: SessionLog,
}

impl EngineSnapshot {
    fn of(engine: &Engine) -> Self {
        Self {
            state: engine.state(),
            connected: engine.is_connected(),
            current_weight: engine.current_weight(),
            log: engine.log().clone(),
        }
    }

    pub fn totals(&self) -> SessionSummary {
        self.log.summary()
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

#[derive(Debug)]
pub enum OperatorRequest {
    Start(Reply<()>),
    Stop(Reply<SessionSummary>),
    Save(Reply<SessionRecord>),
    Clear(Reply<bool>),
    /// The operator closed the connection: ends any session, then marks the
    /// engine disconnected.
    Disconnected(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

#[derive(Debug)]
pub enum EngineMessage {
    Transport(TransportEvent),
    Operator(OperatorRequest),
}

impl From<TransportEvent> for EngineMessage {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

/// Cloneable handle for submitting work to the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    mailbox: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Sender for producers such as the transport.
    pub fn mailbox(&self) -> mpsc::Sender<EngineMessage> {
        self.mailbox.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> OperatorRequest,
    ) -> Result<T, HandleError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(EngineMessage::Operator(make(reply)))
            .await
            .map_err(|_| HandleError::Stopped)?;
        response.await.map_err(|_| HandleError::Stopped)
    }

    pub async fn start_session(&self) -> Result<(), HandleError> {
        Ok(self.request(OperatorRequest::Start).await??)
    }

    pub async fn stop_session(&self) -> Result<SessionSummary, HandleError> {
        Ok(self.request(OperatorRequest::Stop).await??)
    }

    pub async fn manual_save(&self) -> Result<SessionRecord, HandleError> {
        Ok(self.request(OperatorRequest::Save).await??)
    }

    pub async fn clear_log(&self) -> Result<bool, HandleError> {
        Ok(self.request(OperatorRequest::Clear).await??)
    }

    pub async fn operator_disconnected(&self) -> Result<(), HandleError> {
        self.request(OperatorRequest::Disconnected).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, HandleError> {
        self.request(OperatorRequest::Snapshot).await
    }
}

/// Spawns the engine task. Notifications are delivered to `statuses`.
///
/// The task ends once every [`EngineHandle`] and mailbox sender is dropped,
/// and yields the engine back.
pub fn spawn(engine: Engine, statuses: mpsc::Sender<Status>) -> (EngineHandle, JoinHandle<Engine>) {
    let (mailbox, inbox) = mpsc::channel(MAILBOX_CAPACITY);
    let task = tokio::spawn(run(engine, inbox, statuses));
    (EngineHandle { mailbox }, task)
}

async fn run(
    mut engine: Engine,
    mut inbox: mpsc::Receiver<EngineMessage>,
    statuses: mpsc::Sender<Status>,
) -> Engine {
    while let Some(message) = inbox.recv().await {
        match message {
            EngineMessage::Transport(event) => {
                if let Some(status) = apply_transport_event(&mut engine, event) {
                    publish(&statuses, status).await;
                }
            }
            EngineMessage::Operator(request) => handle_request(&mut engine, request),
        }

        for status in engine.drain_notifications() {
            publish(&statuses, status).await;
        }
    }

    tracing::debug!("engine task stopped");
    engine
}

/// Applies a transport event; returns a status the engine does not track itself.
fn apply_transport_event(engine: &mut Engine, event: TransportEvent) -> Option<Status> {
    match event {
        TransportEvent::Connecting => Some(Status::Connecting),
        TransportEvent::Error(message) => Some(Status::ConnectionError { message }),
        TransportEvent::Connected => {
            engine.on_connection_change(true);
            None
        }
        TransportEvent::Disconnected => {
            engine.on_connection_change(false);
            None
        }
        TransportEvent::Reading(reading) => {
            engine.on_reading(reading);
            None
        }
    }
}

fn handle_request(engine: &mut Engine, request: OperatorRequest) {
    // A dropped reply means the requester gave up; the engine state still applies.
    match request {
        OperatorRequest::Start(reply) => {
            let _ = reply.send(engine.start_session());
        }
        OperatorRequest::Stop(reply) => {
            let _ = reply.send(engine.stop_session());
        }
        OperatorRequest::Save(reply) => {
            let now = chrono::Local::now().naive_local();
            let _ = reply.send(engine.manual_save(now));
        }
        OperatorRequest::Clear(reply) => {
            let _ = reply.send(engine.clear_log());
        }
        OperatorRequest::Disconnected(reply) => {
            if engine.state() == SessionState::Measuring {
                let _ = engine.stop_session();
            }
            if engine.is_connected() {
                engine.on_connection_change(false);
            }
            let _ = reply.send(());
        }
        OperatorRequest::Snapshot(reply) => {
            let _ = reply.send(EngineSnapshot::of(engine));
        }
    }
}

async fn publish(statuses: &mpsc::Sender<Status>, status: Status) {
    if statuses.send(status).await.is_err() {
        tracing::trace!("status receiver dropped");
    }
}

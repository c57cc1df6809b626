//! [`SessionHandle`]: the public, cloneable front for a session actor.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::protocol::{ProtocolError, ServerMessage};
use crate::timecode::Framerate;

use super::{actor, Command};

/// Opaque client identifier, assigned at accept time (spec §3 "Client").
pub type ClientId = String;

/// Bound on the session's command mailbox. Generous relative to the
/// per-client outbound channel (§4.F suggests 256) since every member's
/// join/leave/control request and every ticker wakeup funnels through it.
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// A cheap, `Clone`-able reference to a running session actor.
///
/// `id` and `framerate` are immutable for the session's lifetime so callers
/// (the registry, the status reporter) can read them without a round trip
/// through the actor; everything that can change (`current_frame`,
/// `running`, `members`) is only ever touched inside the actor task.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub framerate: Framerate,
    tx: mpsc::Sender<Command>,
}

/// A point-in-time view of a session, for the status reporter (SPEC_FULL
/// §10.5) — the only consumer that needs to read session state without
/// otherwise interacting with it.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub framerate_key: &'static str,
    pub running: bool,
    pub current_timecode: String,
}

/// Spawn a new session actor at `initial_frame` under `rate` and return a
/// handle to it. The session id is freshly generated 128-bit randomness
/// rendered as a UUID string (spec §9, "choose any 128-bit-strength
/// encoding").
pub fn spawn_session(rate: Framerate, initial_frame: u32) -> SessionHandle {
    let id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let handle = SessionHandle { id: id.clone(), framerate: rate, tx: tx.clone() };
    tokio::spawn(actor::run(id, rate, initial_frame, tx, rx));
    handle
}

/// Send `cmd` and await its reply, logging (rather than panicking) if the
/// actor has already exited — a straggler command arriving after shutdown
/// is a normal race, not a bug.
async fn call<T>(
    tx: &mpsc::Sender<Command>,
    build: impl FnOnce(oneshot::Sender<T>) -> Command,
    default: T,
) -> T {
    let (reply_tx, reply_rx) = oneshot::channel();
    if tx.send(build(reply_tx)).await.is_err() {
        warn!("session actor is gone; dropping command");
        return default;
    }
    reply_rx.await.unwrap_or(default)
}

impl SessionHandle {
    pub async fn add_member(
        &self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) {
        call(
            &self.tx,
            |reply| Command::AddMember { client_id, sender, cancel, reply },
            (),
        )
        .await
    }

    pub async fn join(
        &self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) {
        call(&self.tx, |reply| Command::Join { client_id, sender, cancel, reply }, ()).await
    }

    pub async fn leave(&self, client_id: ClientId) {
        call(&self.tx, |reply| Command::Leave { client_id, reply }, ()).await
    }

    pub async fn disconnect(&self, client_id: ClientId) {
        call(&self.tx, |reply| Command::Disconnect { client_id, reply }, ()).await
    }

    pub async fn start(&self) {
        call(&self.tx, |reply| Command::Start { reply }, ()).await
    }

    pub async fn stop(&self) {
        call(&self.tx, |reply| Command::Stop { reply }, ()).await
    }

    pub async fn reset(&self, timecode: Option<String>) -> Result<(), ProtocolError> {
        call(
            &self.tx,
            |reply| Command::Reset { timecode, reply },
            Err(ProtocolError::InternalError("session actor exited".to_string())),
        )
        .await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        call(
            &self.tx,
            |reply| Command::Snapshot { reply },
            SessionSnapshot {
                id: self.id.clone(),
                framerate_key: self.framerate.key,
                running: false,
                current_timecode: "00:00:00:00".to_string(),
            },
        )
        .await
    }

    pub async fn shutdown(&self) {
        call(&self.tx, |reply| Command::Shutdown { reply }, ()).await
    }
}

//! Session lifecycle and membership (spec §3 "Session", §4.C).
//!
//! A session is implemented as an actor: [`actor::run`] owns the only copy
//! of the session's state and processes [`Command`]s one at a time from a
//! channel. This is the §5 "serialization domain per session" made literal
//! — there is no lock to take because there is only one task that ever
//! touches `current_frame`, `running`, `members`, or the epoch.

mod actor;
mod handle;
pub mod ticker;

pub use handle::{spawn_session, ClientId, SessionHandle, SessionSnapshot};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::protocol::{ProtocolError, ServerMessage};

/// Messages accepted by a session actor. Not part of the public API —
/// callers go through [`SessionHandle`].
pub(crate) enum Command {
    /// Register a member without sending any message (used by
    /// `create_session`, whose creator already knows the initial state
    /// from the `session_created` reply).
    AddMember {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
        reply: oneshot::Sender<()>,
    },
    /// Register a member and send it `session_joined` (used by
    /// `join_session`).
    Join {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
        reply: oneshot::Sender<()>,
    },
    /// Remove a member and send it `session_left`.
    Leave {
        client_id: ClientId,
        reply: oneshot::Sender<()>,
    },
    /// Remove a member whose socket is already gone — no message is sent.
    Disconnect {
        client_id: ClientId,
        reply: oneshot::Sender<()>,
    },
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Reset {
        timecode: Option<String>,
        reply: oneshot::Sender<Result<(), ProtocolError>>,
    },
    /// Sent by the session's own ticker task. `k` is the number of frame
    /// periods elapsed since `epoch_wall` as of when the ticker observed
    /// it — not necessarily `previous k + 1` (see `ticker::run`).
    Tick {
        k: u64,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

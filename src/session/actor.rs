//! The session actor loop: the one task that ever mutates a session's
//! state (spec §5, "serialization domain per session").

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::protocol::{ProtocolError, ServerMessage};
use crate::timecode::{self, Framerate, DEFAULT_TIMECODE};

use super::handle::{ClientId, SessionSnapshot};
use super::{ticker, Command};

struct Member {
    sender: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
}

struct SessionState {
    id: String,
    rate: Framerate,
    current_frame: u32,
    running: bool,
    members: HashMap<ClientId, Member>,
    epoch_wall: Instant,
    epoch_frame: u32,
    ticker_cancel: Option<CancellationToken>,
    ticker_handle: Option<JoinHandle<()>>,
    self_tx: mpsc::Sender<Command>,
}

impl SessionState {
    /// Deliver `msg` to every member's outbound channel. Uses `try_send` so
    /// a full channel never blocks the actor (§5: "broadcasts enqueue to
    /// member channels outside the critical section") — a member whose
    /// channel is full or closed is disconnected (§4.C slow-consumer
    /// policy).
    fn broadcast(&mut self, msg: ServerMessage) {
        let mut drop_list = Vec::new();
        for (client_id, member) in &self.members {
            match member.sender.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session_id = %self.id, client_id = %client_id, "slow consumer, disconnecting");
                    drop_list.push(client_id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    drop_list.push(client_id.clone());
                }
            }
        }
        for client_id in drop_list {
            if let Some(member) = self.members.remove(&client_id) {
                member.cancel.cancel();
            }
        }
    }

    fn send_to(&mut self, client_id: &ClientId, msg: ServerMessage) {
        if let Some(member) = self.members.get(client_id) {
            if member.sender.try_send(msg).is_err() {
                warn!(session_id = %self.id, %client_id, "could not deliver message to new/leaving member");
            }
        }
    }

    fn formatted_timecode(&self) -> String {
        timecode::format(self.current_frame, self.rate)
    }

    /// Cancel and wait out the current ticker, if any. Used by `stop`,
    /// `reset` (while running), and `shutdown` — always followed by either
    /// nothing (stopped) or a fresh ticker with a fresh epoch.
    async fn cancel_ticker(&mut self) {
        if let Some(cancel) = self.ticker_cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.ticker_handle.take() {
            let _ = handle.await;
        }
    }

    fn spawn_ticker(&mut self) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ticker::run(
            self.self_tx.clone(),
            self.epoch_wall,
            self.rate,
            cancel.clone(),
        ));
        self.ticker_cancel = Some(cancel);
        self.ticker_handle = Some(handle);
    }

    /// Reset `epoch_wall`/`epoch_frame` to "now, at `current_frame`" and,
    /// if running, restart the ticker against the fresh epoch. Spec §4.D
    /// requires every start *and* reset to reset the epoch; rather than
    /// teaching a live ticker to notice an epoch change mid-flight, we
    /// cancel and respawn it — the cancellation is synchronous (awaited)
    /// before the new epoch is published, so no frame from the old epoch
    /// can race a frame from the new one.
    async fn resync_epoch(&mut self) {
        let was_running = self.running;
        if was_running {
            self.cancel_ticker().await;
        }
        self.epoch_wall = Instant::now();
        self.epoch_frame = self.current_frame;
        if was_running {
            self.spawn_ticker();
        }
    }
}

pub(crate) async fn run(
    id: String,
    rate: Framerate,
    initial_frame: u32,
    self_tx: mpsc::Sender<Command>,
    mut rx: mpsc::Receiver<Command>,
) {
    let mut state = SessionState {
        id: id.clone(),
        rate,
        current_frame: initial_frame,
        running: false,
        members: HashMap::new(),
        epoch_wall: Instant::now(),
        epoch_frame: initial_frame,
        ticker_cancel: None,
        ticker_handle: None,
        self_tx,
    };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::AddMember { client_id, sender, cancel, reply } => {
                state.members.insert(client_id, Member { sender, cancel });
                let _ = reply.send(());
            }
            Command::Join { client_id, sender, cancel, reply } => {
                state.members.insert(client_id.clone(), Member { sender, cancel });
                let msg = ServerMessage::SessionJoined {
                    session_id: state.id.clone(),
                    framerate: state.rate.key.to_string(),
                    timecode: state.formatted_timecode(),
                    running: state.running,
                };
                state.send_to(&client_id, msg);
                let _ = reply.send(());
            }
            Command::Leave { client_id, reply } => {
                if let Some(member) = state.members.remove(&client_id) {
                    let _ = member
                        .sender
                        .try_send(ServerMessage::SessionLeft { session_id: state.id.clone() });
                }
                let _ = reply.send(());
            }
            Command::Disconnect { client_id, reply } => {
                state.members.remove(&client_id);
                let _ = reply.send(());
            }
            Command::Start { reply } => {
                if !state.running {
                    state.running = true;
                    state.epoch_wall = Instant::now();
                    state.epoch_frame = state.current_frame;
                    state.spawn_ticker();
                    let timecode = state.formatted_timecode();
                    state.broadcast(ServerMessage::TimecodeStarted { timecode });
                }
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                if state.running {
                    state.cancel_ticker().await;
                    state.running = false;
                    let timecode = state.formatted_timecode();
                    state.broadcast(ServerMessage::TimecodeStopped { timecode });
                }
                let _ = reply.send(());
            }
            Command::Reset { timecode, reply } => {
                let text = timecode.unwrap_or_else(|| DEFAULT_TIMECODE.to_string());
                match timecode::parse(&text, state.rate) {
                    Ok(frame) => {
                        state.current_frame = frame;
                        state.resync_epoch().await;
                        let timecode = state.formatted_timecode();
                        state.broadcast(ServerMessage::TimecodeReset { timecode });
                        let _ = reply.send(Ok(()));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(ProtocolError::InvalidTimecode(err.to_string())));
                    }
                }
            }
            Command::Tick { k } => {
                // A tick from a ticker we already cancelled (stop/reset
                // raced the wakeup) is stale; ignore it rather than
                // resurrecting a stopped session's timecode.
                if !state.running {
                    continue;
                }
                let total = state.rate.total_frames() as u64;
                let k_mod = (k % total) as u32;
                state.current_frame = timecode::advance(state.epoch_frame, state.rate, k_mod);
                let timecode = state.formatted_timecode();
                state.broadcast(ServerMessage::TimecodeUpdate { timecode });
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    id: state.id.clone(),
                    framerate_key: state.rate.key,
                    running: state.running,
                    current_timecode: state.formatted_timecode(),
                });
            }
            Command::Shutdown { reply } => {
                state.cancel_ticker().await;
                state.broadcast(ServerMessage::ServerShutdown);
                for (_, member) in state.members.drain() {
                    member.cancel.cancel();
                }
                let _ = reply.send(());
                info!(session_id = %state.id, "session shut down");
                return;
            }
        }
    }
}

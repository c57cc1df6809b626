//! Per-client connection handler (spec §4.F).
//!
//! Each accepted socket gets an id, a `welcome`, and two concurrent flows:
//! a reader that parses and dispatches requests, and a writer that drains
//! the client's outbound channel to the socket. Either flow ending —
//! socket closed, write error, or the session closing the client's channel
//! as its slow-consumer/shutdown policy — tears down the other and calls
//! [`Registry::on_client_disconnect`].

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{ClientRequest, CodecError, LineCodec, ProtocolError, ServerMessage};
use crate::registry::Registry;
use crate::session::ClientId;
use crate::timecode;

/// Bound on a client's outbound queue (spec §4.F: "suggested 256").
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

fn new_client_id() -> ClientId {
    uuid::Uuid::new_v4().to_string()
}

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: std::sync::Arc<Registry>,
) {
    let client_id = new_client_id();
    info!(%client_id, %peer, "client connected");

    let (read_half, write_half) = stream.into_split();
    let mut framed_reader = FramedRead::new(read_half, LineCodec::new());
    let mut framed_writer = FramedWrite::new(write_half, LineCodec::new());

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    // The registry keeps its own clone of this client's sender and
    // cancellation token (spec §3: Client owns a `send_channel`) so that
    // `Registry::shutdown` can close every registered client's channel
    // directly, not only clients that happen to be session members.
    registry.register_client(client_id.clone(), tx.clone(), cancel.clone()).await;

    let welcome = ServerMessage::Welcome {
        client_id: client_id.clone(),
        supported_framerates: timecode::supported_keys().into_iter().map(String::from).collect(),
    };
    if tx.try_send(welcome).is_err() {
        warn!(%client_id, "failed to enqueue welcome message");
    }

    let writer_cancel = cancel.clone();
    let mut writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                received = rx.recv() => {
                    match received {
                        Some(msg) => {
                            if framed_writer.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut framed_writer.into_inner()).await;
    });

    let reader_cancel = cancel.clone();
    let reader_registry = registry.clone();
    let reader_client_id = client_id.clone();
    let reader_tx = tx.clone();
    let mut reader_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                line = framed_reader.next() => {
                    match line {
                        Some(Ok(text)) => {
                            dispatch(&text, &reader_client_id, &reader_registry, &reader_tx).await;
                        }
                        Some(Err(CodecError::TooLarge)) => {
                            let _ = reader_tx.send(ProtocolError::MessageTooLarge.into()).await;
                            break;
                        }
                        Some(Err(err)) => {
                            debug!(client_id = %reader_client_id, %err, "connection read error");
                            break;
                        }
                        None => break, // EOF
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut reader_task => writer_task.abort(),
        _ = &mut writer_task => reader_task.abort(),
    }
    cancel.cancel();
    registry.on_client_disconnect(&client_id).await;
    info!(%client_id, "client disconnected");
}

/// Parse one line as a [`ClientRequest`] and dispatch it against `registry`
/// on behalf of `client_id`, replying (ack via a session broadcast, or an
/// explicit `error`) on `tx`.
async fn dispatch(
    text: &str,
    client_id: &ClientId,
    registry: &Registry,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            let _ = tx.send(ProtocolError::BadRequest(err.to_string()).into()).await;
            return;
        }
    };

    match request {
        ClientRequest::CreateSession { framerate, initial_timecode } => {
            match registry
                .create_session(client_id.clone(), &framerate, initial_timecode)
                .await
            {
                Ok((session_id, framerate, timecode)) => {
                    let _ = tx
                        .send(ServerMessage::SessionCreated {
                            session_id,
                            framerate: framerate.to_string(),
                            timecode,
                        })
                        .await;
                }
                Err(err) => {
                    let _ = tx.send(err.into()).await;
                }
            }
        }
        ClientRequest::JoinSession { session_id } => {
            if let Err(err) = registry.join_session(client_id.clone(), &session_id).await {
                let _ = tx.send(err.into()).await;
            }
        }
        ClientRequest::LeaveSession => {
            if let Err(err) = registry.leave_session(client_id).await {
                let _ = tx.send(err.into()).await;
            }
        }
        ClientRequest::StartTimecode => match registry.current_session(client_id).await {
            Some(session) => session.start().await,
            None => {
                let _ = tx.send(ProtocolError::NotInSession.into()).await;
            }
        },
        ClientRequest::StopTimecode => match registry.current_session(client_id).await {
            Some(session) => session.stop().await,
            None => {
                let _ = tx.send(ProtocolError::NotInSession.into()).await;
            }
        },
        ClientRequest::ResetTimecode { timecode } => match registry.current_session(client_id).await {
            Some(session) => {
                if let Err(err) = session.reset(timecode).await {
                    let _ = tx.send(err.into()).await;
                }
            }
            None => {
                let _ = tx.send(ProtocolError::NotInSession.into()).await;
            }
        },
    }
}

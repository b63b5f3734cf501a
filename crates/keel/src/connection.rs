//! Per-connection lifecycle: read loop, write queue, heartbeat wiring.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`], plus two small helper tasks it owns: a writer
//! draining the outbound FIFO and a heartbeat supervisor. The flow is:
//!
//!   1. Allocate an [`Entity`], build the channels, enter room 0
//!   2. Loop: read one frame → dispatch to the current room → apply
//!      the outcome (keep going, transition, or close)
//!   3. Teardown: leave the room, stop the helpers, release the socket
//!
//! The read loop awaits each dispatch outcome before arming the next
//! read. Combined with the old room removing the member inside its own
//! actor, this makes a transition atomic: at every dispatch point the
//! connection is a member of exactly one room.

use std::fmt;
use std::sync::Arc;

use keel_heartbeat::{HeartbeatConfig, HeartbeatSupervisor, Probe};
use keel_protocol::{
    decode_body, decode_header, opcode, InMessage, MessageHeader, Opcode,
    OutMessage, RoomId,
};
use keel_room::{ClientHandle, CloseReason, Dispatch, RoomDirectory, RoomHandle};
use keel_transport::{
    Connection, ConnectionReader, ConnectionWriter, Entity, TcpConnection,
    TcpReader, TcpWriter, TransportError,
};
use tokio::sync::mpsc;

use crate::config::CloseMode;
use crate::KeelError;

/// The shared server state every connection task holds.
pub(crate) struct ServerState {
    pub(crate) directory: RoomDirectory,
    pub(crate) heartbeat: HeartbeatConfig,
    pub(crate) max_body_size: usize,
    pub(crate) close_mode: CloseMode,
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle phase of one connection, traced on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

fn advance(entity: Entity, state: &mut ConnState, next: ConnState) {
    tracing::trace!(%entity, from = %state, to = %next, "connection state");
    *state = next;
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ServerState>,
) -> Result<(), KeelError> {
    let entity = Entity::next();
    let peer = conn.peer_addr().ok();
    let mut conn_state = ConnState::Connecting;
    tracing::info!(%entity, ?peer, "connection accepted");

    let (mut reader, writer) = conn.split();

    // Outbound FIFO: rooms and the heartbeat task queue frames here; the
    // writer task keeps exactly one write_all in flight at a time.
    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutMessage>();
    // Close requests: single-shot by capacity, first reason wins.
    let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(1);

    let supervisor = HeartbeatSupervisor::new(state.heartbeat.clone());
    let pulse = supervisor.pulse();
    let client = ClientHandle::new(entity, out_tx.clone(), close_tx.clone(), pulse);

    // Enter the entry room before the first read is armed, so the first
    // frame already has a dispatch table to land in.
    let mut room = state.directory.get(RoomId::ENTRY).await?;
    room.enter(client).await?;
    advance(entity, &mut conn_state, ConnState::Active);

    let writer_task =
        tokio::spawn(write_loop(writer, out_rx, close_tx.clone(), entity));
    let heartbeat_task = tokio::spawn(heartbeat_loop(
        supervisor,
        out_tx.clone(),
        close_tx.clone(),
        entity,
    ));

    let close_reason = loop {
        tokio::select! {
            // Close requests outrank pending traffic.
            biased;

            reason = close_rx.recv() => {
                break reason.unwrap_or(CloseReason::TransportFailed);
            }

            frame = read_frame(&mut reader, state.max_body_size) => {
                match frame {
                    Ok(Some((op, payload))) => {
                        let msg = InMessage::new(entity, op, payload);
                        match room.dispatch(msg).await {
                            Ok(Dispatch::Handled) => {}
                            Ok(Dispatch::Transition { target, client }) => {
                                match enter_room(&state.directory, target, client).await {
                                    Ok(next) => {
                                        tracing::info!(
                                            %entity,
                                            from = %room.room_id(),
                                            to = %target,
                                            "room transition"
                                        );
                                        room = next;
                                    }
                                    Err(error) => {
                                        tracing::error!(
                                            %entity,
                                            target = %target,
                                            %error,
                                            "room transition failed"
                                        );
                                        break CloseReason::Internal;
                                    }
                                }
                            }
                            Ok(Dispatch::Close(reason)) => break reason,
                            Err(error) => {
                                tracing::error!(%entity, %error, "room unavailable");
                                break CloseReason::Internal;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!(%entity, "peer closed the connection");
                        break CloseReason::PeerClosed;
                    }
                    Err(KeelError::MessageTooLarge { size, limit }) => {
                        tracing::warn!(%entity, size, limit, "oversized frame rejected");
                        break CloseReason::MessageTooLarge;
                    }
                    Err(KeelError::Protocol(error)) => {
                        tracing::warn!(%entity, %error, "malformed frame");
                        break CloseReason::ProtocolViolation;
                    }
                    Err(KeelError::Transport(error)) => {
                        tracing::debug!(%entity, %error, "read failed");
                        break CloseReason::TransportFailed;
                    }
                    Err(error) => {
                        tracing::error!(%entity, %error, "unexpected read-path error");
                        break CloseReason::Internal;
                    }
                }
            }
        }
    };

    // --- Teardown ---
    advance(entity, &mut conn_state, ConnState::Closing);

    // A close outcome does not remove membership; do it here so the room
    // drops its channel clones. NotMember is fine after a failed
    // transition (the old room already removed us).
    if let Err(error) = room.leave(entity).await {
        tracing::debug!(%entity, %error, "leave on teardown");
    }
    heartbeat_task.abort();
    let _ = heartbeat_task.await;

    match state.close_mode {
        CloseMode::Graceful => {
            // Last sender clone; the writer ends once the queue drains.
            drop(out_tx);
            let _ = writer_task.await;
        }
        CloseMode::Abortive => {
            writer_task.abort();
            let _ = writer_task.await;
        }
    }

    advance(entity, &mut conn_state, ConnState::Closed);
    tracing::info!(%entity, reason = %close_reason, "connection closed");
    Ok(())
}

/// Completes a transition by entering the target room.
async fn enter_room(
    directory: &RoomDirectory,
    target: RoomId,
    client: ClientHandle,
) -> Result<RoomHandle, KeelError> {
    let next = directory.get(target).await?;
    next.enter(client).await?;
    Ok(next)
}

/// Reads one complete frame: header, ceiling check, body, split.
///
/// Returns `Ok(None)` when the peer closes cleanly at a frame boundary.
/// Hanging up mid-frame surfaces as a transport error instead. The body
/// is never buffered when its declared size exceeds `max_body_size`.
async fn read_frame(
    reader: &mut TcpReader,
    max_body_size: usize,
) -> Result<Option<(Opcode, Vec<u8>)>, KeelError> {
    let mut header_buf = [0u8; MessageHeader::SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(()) => {}
        Err(TransportError::Closed) => return Ok(None),
        Err(error) => return Err(error.into()),
    }

    let header = decode_header(&header_buf)?;
    let body_size = header.body_size as usize;
    if body_size > max_body_size {
        return Err(KeelError::MessageTooLarge {
            size: body_size,
            limit: max_body_size,
        });
    }

    let mut body = vec![0u8; body_size];
    reader.read_exact(&mut body).await?;

    let (op, payload) = decode_body(&body)?;
    Ok(Some((op, payload.to_vec())))
}

/// Drains the outbound FIFO, one `write_all` at a time.
async fn write_loop(
    mut writer: TcpWriter,
    mut out_rx: mpsc::UnboundedReceiver<OutMessage>,
    close_tx: mpsc::Sender<CloseReason>,
    entity: Entity,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(error) = writer.write_all(msg.bytes()).await {
            tracing::debug!(%entity, %error, "write failed");
            let _ = close_tx.try_send(CloseReason::TransportFailed);
            break;
        }
    }
}

/// Runs the liveness supervisor: probes on schedule, closes on
/// exhaustion. Distinguished from transport failures by its close reason.
async fn heartbeat_loop(
    mut supervisor: HeartbeatSupervisor,
    out_tx: mpsc::UnboundedSender<OutMessage>,
    close_tx: mpsc::Sender<CloseReason>,
    entity: Entity,
) {
    // A 2-byte body never overflows the length field.
    let Ok(probe) = OutMessage::new(opcode::HEARTBEAT, &[]) else {
        return;
    };

    loop {
        match supervisor.tick().await {
            Probe::Send { missed } => {
                if missed > 1 {
                    tracing::debug!(%entity, missed, "probes unacknowledged");
                }
                if out_tx.send(probe.clone()).is_err() {
                    break;
                }
            }
            Probe::Exhausted => {
                tracing::warn!(%entity, "heartbeat retry budget exhausted");
                // The exhausting tick still probes, so a peer that went
                // quiet sees one frame per tick right up to the close.
                let _ = out_tx.send(probe.clone());
                let _ = close_tx.try_send(CloseReason::HeartbeatTimeout);
                break;
            }
        }
    }
}

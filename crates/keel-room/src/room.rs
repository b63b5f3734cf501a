//! Room actor: an isolated Tokio task owning one dispatch domain.
//!
//! Each room runs in its own task and is reached only through its
//! command channel. Membership and handler state are therefore mutated
//! by exactly one task — the serialized access the shared-resource
//! policy requires — while the opcode table itself is immutable after
//! construction.

use std::collections::HashMap;

use keel_heartbeat::Pulse;
use keel_protocol::{InMessage, OutMessage, RoomId};
use keel_transport::Entity;
use tokio::sync::{mpsc, oneshot};

use crate::{CloseReason, Effect, Handler, HandlerController, RoomContext, RoomError};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// ClientHandle
// ---------------------------------------------------------------------------

/// Everything a room needs to reach one member connection.
///
/// Cheap to clone: channel senders plus the shared liveness counter.
/// The connection task owns the other ends; when it is gone, sends and
/// closes become silent no-ops.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    entity: Entity,
    out_tx: mpsc::UnboundedSender<OutMessage>,
    close_tx: mpsc::Sender<CloseReason>,
    pulse: Pulse,
}

impl ClientHandle {
    /// Bundles a connection's channels into a membership record.
    pub fn new(
        entity: Entity,
        out_tx: mpsc::UnboundedSender<OutMessage>,
        close_tx: mpsc::Sender<CloseReason>,
        pulse: Pulse,
    ) -> Self {
        Self {
            entity,
            out_tx,
            close_tx,
            pulse,
        }
    }

    /// The session this handle belongs to.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Queues a frame on the connection's FIFO send queue.
    ///
    /// Returns `false` if the connection is already gone.
    pub fn send(&self, msg: OutMessage) -> bool {
        self.out_tx.send(msg).is_ok()
    }

    /// Requests the connection be closed. Idempotent: once the first
    /// reason is delivered, later ones are dropped.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.close_tx.try_send(reason);
    }

    /// The liveness acknowledgement handle for this connection.
    pub fn pulse(&self) -> &Pulse {
        &self.pulse
    }
}

// ---------------------------------------------------------------------------
// Commands and outcomes
// ---------------------------------------------------------------------------

/// Outcome of dispatching one inbound frame.
///
/// The connection task awaits this before arming its next read, which is
/// what makes room transitions atomic with respect to dispatch order.
#[derive(Debug)]
pub enum Dispatch {
    /// The frame was consumed; keep reading.
    Handled,
    /// The sender was removed from this room and must enter `target`
    /// before its next frame is dispatched. The membership record is
    /// handed back to the connection task for the enter.
    Transition {
        /// The room to enter.
        target: RoomId,
        /// The sender's membership record, relinquished by this room.
        client: ClientHandle,
    },
    /// A handler closed the sender; stop reading.
    Close(CloseReason),
}

/// Commands sent to a room actor through its channel.
enum RoomCommand {
    Enter {
        client: ClientHandle,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        entity: Entity,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Inbound {
        msg: InMessage,
        reply: oneshot::Sender<Dispatch>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The room's id.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Adds a connection to the room's membership and runs the room's
    /// enter hooks exactly once.
    pub async fn enter(&self, client: ClientHandle) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Enter {
                client,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Removes a connection from the room's membership.
    pub async fn leave(&self, entity: Entity) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leave {
                entity,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Routes one inbound frame through the room's handler table and
    /// waits for the outcome.
    pub async fn dispatch(&self, msg: InMessage) -> Result<Dispatch, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Inbound {
                msg,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Tells the room actor to stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<H: Handler> {
    room_id: RoomId,
    controller: HandlerController<H>,
    members: HashMap<Entity, ClientHandle>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<H: Handler> RoomActor<H> {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Enter { client, reply } => {
                    let result = self.handle_enter(client);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { entity, reply } => {
                    let result = self.handle_leave(entity);
                    let _ = reply.send(result);
                }
                RoomCommand::Inbound { msg, reply } => {
                    let outcome = self.handle_inbound(msg).await;
                    let _ = reply.send(outcome);
                }
                RoomCommand::Shutdown => break,
            }
        }

        tracing::info!(room_id = %self.room_id, "room stopped");
    }

    fn handle_enter(&mut self, client: ClientHandle) -> Result<(), RoomError> {
        let entity = client.entity();
        if self.members.contains_key(&entity) {
            return Err(RoomError::AlreadyMember(entity, self.room_id));
        }
        self.members.insert(entity, client);
        tracing::debug!(
            room_id = %self.room_id,
            %entity,
            members = self.members.len(),
            "client entered"
        );

        // Enter hooks run once, after the member is visible to lookups.
        let ctx = RoomContext::new(self.room_id, &self.members);
        let mut effects = Vec::new();
        for handler in self.controller.handlers_mut() {
            effects.extend(handler.on_client_entered(entity, &ctx));
        }
        drop(ctx);

        for effect in effects {
            match effect {
                Effect::Send(target, msg) => self.deliver(target, msg),
                Effect::Close(target, reason) => {
                    if let Some(member) = self.members.get(&target) {
                        member.close(reason);
                    }
                }
                Effect::Transition(target, room) => {
                    // Enter hooks do join-time setup only; re-homing a
                    // connection from inside an enter would nest
                    // transitions and break their atomicity.
                    tracing::warn!(
                        room_id = %self.room_id,
                        entity = %target,
                        target_room = %room,
                        "transition from enter hook discarded"
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_leave(&mut self, entity: Entity) -> Result<(), RoomError> {
        if self.members.remove(&entity).is_none() {
            return Err(RoomError::NotMember(entity, self.room_id));
        }
        for handler in self.controller.handlers_mut() {
            handler.on_client_left(entity);
        }
        tracing::debug!(
            room_id = %self.room_id,
            %entity,
            members = self.members.len(),
            "client left"
        );
        Ok(())
    }

    async fn handle_inbound(&mut self, msg: InMessage) -> Dispatch {
        let entity = msg.entity;

        if !self.members.contains_key(&entity) {
            // The connection task only dispatches while it is a member,
            // so this indicates a caller bug rather than peer behavior.
            tracing::warn!(
                room_id = %self.room_id,
                %entity,
                opcode = %msg.opcode,
                "frame from non-member dropped"
            );
            return Dispatch::Handled;
        }

        let ctx = RoomContext::new(self.room_id, &self.members);
        let effects = match self.controller.lookup(msg.opcode) {
            Some(handler) => {
                handler.process(entity, msg.opcode, &msg.payload, &ctx).await
            }
            None => {
                // Forward/backward compatibility: an opcode we do not
                // route is observable but never fatal.
                tracing::debug!(
                    room_id = %self.room_id,
                    %entity,
                    opcode = %msg.opcode,
                    "unknown opcode ignored"
                );
                return Dispatch::Handled;
            }
        };
        drop(ctx);

        self.apply(entity, effects)
    }

    /// Applies a handler's effects. Sends go out immediately; the first
    /// transition or close for the dispatching entity decides the
    /// outcome returned to its connection task.
    fn apply(&mut self, sender: Entity, effects: Vec<Effect>) -> Dispatch {
        let mut outcome = Dispatch::Handled;

        for effect in effects {
            match effect {
                Effect::Send(target, msg) => self.deliver(target, msg),
                Effect::Close(target, reason) if target == sender => {
                    if matches!(outcome, Dispatch::Handled) {
                        outcome = Dispatch::Close(reason);
                    }
                }
                Effect::Close(target, reason) => {
                    if let Some(member) = self.members.get(&target) {
                        member.close(reason);
                    }
                }
                Effect::Transition(target, room) if target == sender => {
                    if matches!(outcome, Dispatch::Handled) {
                        // Removal happens here, inside the actor; the
                        // connection task completes the enter before it
                        // dispatches anything else, so the sender is
                        // never a member of two rooms at once.
                        if let Some(client) = self.members.remove(&target) {
                            // Transitioning out is leaving too; handlers
                            // holding per-entity state drop it now.
                            for handler in self.controller.handlers_mut() {
                                handler.on_client_left(target);
                            }
                            tracing::debug!(
                                room_id = %self.room_id,
                                entity = %target,
                                target_room = %room,
                                "client transitioning out"
                            );
                            outcome = Dispatch::Transition {
                                target: room,
                                client,
                            };
                        }
                    }
                }
                Effect::Transition(target, room) => {
                    // Only the dispatching connection's task can re-home
                    // its routing; handlers wanting to move a third
                    // party must do it through that party's own traffic.
                    tracing::warn!(
                        room_id = %self.room_id,
                        entity = %target,
                        target_room = %room,
                        "cross-entity transition unsupported, discarded"
                    );
                }
            }
        }

        outcome
    }

    fn deliver(&self, target: Entity, msg: OutMessage) {
        match self.members.get(&target) {
            Some(member) => {
                if !member.send(msg) {
                    tracing::debug!(
                        room_id = %self.room_id,
                        entity = %target,
                        "send to departed connection dropped"
                    );
                }
            }
            None => {
                tracing::debug!(
                    room_id = %self.room_id,
                    entity = %target,
                    "send to non-member dropped"
                );
            }
        }
    }
}

/// Spawns a room actor around a built handler table and returns its
/// handle.
pub fn spawn_room<H: Handler>(
    room_id: RoomId,
    controller: HandlerController<H>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);

    let actor = RoomActor {
        room_id,
        controller,
        members: HashMap::new(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}

//! The core handler set every server carries.
//!
//! Room 0 (the entry room) is built with exactly two handlers:
//! [`NetHandler`] for connection upkeep and [`AuthHandler`] for login.
//! [`NetHandler`] is also registered into gameplay rooms so heartbeat
//! acknowledgements and disconnect requests keep working after a
//! connection moves on.

use std::collections::HashMap;
use std::sync::Arc;

use keel_protocol::{opcode, Opcode, OutMessage, RoomId};
use keel_room::{CloseReason, Effect, Handler, RoomContext};
use keel_session::{Authenticator, Credentials, PlayerId, SessionError};
use keel_transport::Entity;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Payload of a `LOGIN_OK` frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginOk {
    /// The authenticated identity.
    pub player_id: PlayerId,
}

/// Payload of a `LOGIN_FAIL` frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginFail {
    /// Human-readable rejection reason.
    pub reason: String,
}

/// Builds a JSON-payload frame, falling back to a close effect when the
/// frame cannot be built. Both failure paths are server-side bugs, not
/// peer behavior, so the fallback reason is [`CloseReason::Internal`].
fn json_frame(
    entity: Entity,
    op: Opcode,
    payload: &impl Serialize,
) -> Effect {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(error) => {
            tracing::error!(%entity, opcode = %op, %error, "reply encode failed");
            return Effect::Close(entity, CloseReason::Internal);
        }
    };
    match OutMessage::new(op, &body) {
        Ok(msg) => Effect::Send(entity, msg),
        Err(error) => {
            tracing::error!(%entity, opcode = %op, %error, "reply frame failed");
            Effect::Close(entity, CloseReason::Internal)
        }
    }
}

// ---------------------------------------------------------------------------
// NetHandler
// ---------------------------------------------------------------------------

/// Connection upkeep: heartbeat acknowledgements and orderly disconnects.
#[derive(Debug, Default)]
pub struct NetHandler;

impl NetHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for NetHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        vec![opcode::HEARTBEAT_ACK, opcode::DISCONNECT]
    }

    async fn process(
        &mut self,
        entity: Entity,
        op: Opcode,
        _payload: &[u8],
        ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match op {
            opcode::HEARTBEAT_ACK => {
                // Reset the liveness budget. No reply: the ack is itself
                // the reply to our probe.
                if let Some(client) = ctx.client(entity) {
                    client.pulse().beat();
                }
                Vec::new()
            }
            opcode::DISCONNECT => {
                tracing::info!(%entity, "client requested disconnect");
                vec![Effect::Close(entity, CloseReason::Requested)]
            }
            other => {
                // The table only routes the opcodes claimed above.
                tracing::warn!(%entity, opcode = %other, "unroutable opcode");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AuthHandler
// ---------------------------------------------------------------------------

/// Login processing for the entry room.
///
/// On success the connection is moved into `post_auth_room`; on failure
/// the peer gets a `LOGIN_FAIL` and a bounded number of further tries.
pub struct AuthHandler<A: Authenticator> {
    auth: Arc<A>,
    post_auth_room: RoomId,
    max_attempts: u32,
    attempts: HashMap<Entity, u32>,
}

impl<A: Authenticator> AuthHandler<A> {
    pub fn new(auth: Arc<A>, post_auth_room: RoomId, max_attempts: u32) -> Self {
        Self {
            auth,
            post_auth_room,
            max_attempts,
            attempts: HashMap::new(),
        }
    }

    async fn handle_login(&mut self, entity: Entity, payload: &[u8]) -> Vec<Effect> {
        let credentials: Credentials = match serde_json::from_slice(payload) {
            Ok(credentials) => credentials,
            Err(error) => {
                // Structured payloads are part of the versioned
                // contract; garbage here is a violation, not a typo.
                tracing::warn!(%entity, %error, "undecodable login payload");
                return vec![Effect::Close(entity, CloseReason::ProtocolViolation)];
            }
        };

        match self.auth.check(&credentials).await {
            Ok(player_id) => {
                self.attempts.remove(&entity);
                tracing::info!(%entity, %player_id, "login accepted");
                vec![
                    json_frame(entity, opcode::LOGIN_OK, &LoginOk { player_id }),
                    Effect::Transition(entity, self.post_auth_room),
                ]
            }
            Err(SessionError::Unavailable(error)) => {
                // Store trouble is not the peer's fault; no attempt is
                // charged.
                tracing::error!(%entity, %error, "credential store unavailable");
                vec![json_frame(
                    entity,
                    opcode::LOGIN_FAIL,
                    &LoginFail {
                        reason: "service unavailable, try again".to_string(),
                    },
                )]
            }
            Err(error) => {
                let attempts = self.attempts.entry(entity).or_insert(0);
                *attempts += 1;
                tracing::info!(
                    %entity,
                    attempts = *attempts,
                    max_attempts = self.max_attempts,
                    %error,
                    "login rejected"
                );

                let mut effects = vec![json_frame(
                    entity,
                    opcode::LOGIN_FAIL,
                    &LoginFail {
                        reason: "invalid credentials".to_string(),
                    },
                )];
                if *attempts >= self.max_attempts {
                    self.attempts.remove(&entity);
                    effects.push(Effect::Close(entity, CloseReason::AuthFailed));
                }
                effects
            }
        }
    }
}

impl<A: Authenticator> Handler for AuthHandler<A> {
    fn opcodes(&self) -> Vec<Opcode> {
        vec![opcode::LOGIN]
    }

    async fn process(
        &mut self,
        entity: Entity,
        op: Opcode,
        payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match op {
            opcode::LOGIN => self.handle_login(entity, payload).await,
            other => {
                tracing::warn!(%entity, opcode = %other, "unroutable opcode");
                Vec::new()
            }
        }
    }

    fn on_client_left(&mut self, entity: Entity) {
        // Entity ids are never reused, so a failed-login entry that
        // outlives its connection would stay in the map forever.
        self.attempts.remove(&entity);
    }
}

// ---------------------------------------------------------------------------
// CoreHandler
// ---------------------------------------------------------------------------

/// The closed handler set of the entry room.
///
/// An enum rather than trait objects: dispatch is an exhaustive match
/// the compiler checks, and adding a member forces every arm to be
/// revisited.
pub enum CoreHandler<A: Authenticator> {
    Net(NetHandler),
    Auth(AuthHandler<A>),
}

impl<A: Authenticator> Handler for CoreHandler<A> {
    fn opcodes(&self) -> Vec<Opcode> {
        match self {
            Self::Net(h) => h.opcodes(),
            Self::Auth(h) => h.opcodes(),
        }
    }

    async fn process(
        &mut self,
        entity: Entity,
        op: Opcode,
        payload: &[u8],
        ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match self {
            Self::Net(h) => h.process(entity, op, payload, ctx).await,
            Self::Auth(h) => h.process(entity, op, payload, ctx).await,
        }
    }

    fn on_client_entered(
        &mut self,
        entity: Entity,
        ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match self {
            Self::Net(h) => h.on_client_entered(entity, ctx),
            Self::Auth(h) => h.on_client_entered(entity, ctx),
        }
    }

    fn on_client_left(&mut self, entity: Entity) {
        match self {
            Self::Net(h) => h.on_client_left(entity),
            Self::Auth(h) => h.on_client_left(entity),
        }
    }
}

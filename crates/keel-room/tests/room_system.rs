//! Integration tests for the room system using mock handlers.

use std::sync::{Arc, Mutex};

use keel_heartbeat::{HeartbeatConfig, HeartbeatSupervisor};
use keel_protocol::{InMessage, Opcode, OutMessage, RoomId};
use keel_room::{
    spawn_room, ClientHandle, CloseReason, Dispatch, Effect, Handler,
    HandlerController, RoomContext, RoomDirectory, RoomError,
};
use keel_transport::Entity;
use tokio::sync::mpsc;

// =========================================================================
// Mock handlers
// =========================================================================

const OP_ECHO: Opcode = Opcode(0x0100);
const OP_OTHER: Opcode = Opcode(0x0101);
const OP_MOVE: Opcode = Opcode(0x0102);
const OP_KICK: Opcode = Opcode(0x0103);
const OP_KICK_PEER: Opcode = Opcode(0x0104);

/// Replies to its opcodes with the payload echoed back on the same
/// opcode.
struct EchoHandler {
    ops: Vec<Opcode>,
}

impl Handler for EchoHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        self.ops.clone()
    }

    async fn process(
        &mut self,
        entity: Entity,
        opcode: Opcode,
        payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        let reply = OutMessage::new(opcode, payload).expect("small frame");
        vec![Effect::Send(entity, reply)]
    }
}

/// Emits a transition to a fixed target room.
struct MoveHandler {
    target: RoomId,
}

impl Handler for MoveHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        vec![OP_MOVE]
    }

    async fn process(
        &mut self,
        entity: Entity,
        _opcode: Opcode,
        _payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        vec![Effect::Transition(entity, self.target)]
    }
}

/// Closes either the sender or the peer named in the payload.
struct KickHandler;

impl Handler for KickHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        vec![OP_KICK, OP_KICK_PEER]
    }

    async fn process(
        &mut self,
        entity: Entity,
        opcode: Opcode,
        payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        if opcode == OP_KICK {
            vec![Effect::Close(entity, CloseReason::AuthFailed)]
        } else {
            let raw = u64::from_be_bytes(payload.try_into().expect("8 bytes"));
            vec![Effect::Close(Entity::from_raw(raw), CloseReason::Requested)]
        }
    }
}

/// Sends a greeting from the enter hook.
struct GreeterHandler;

impl Handler for GreeterHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        Vec::new()
    }

    async fn process(
        &mut self,
        _entity: Entity,
        _opcode: Opcode,
        _payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        Vec::new()
    }

    fn on_client_entered(
        &mut self,
        entity: Entity,
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        let hello = OutMessage::new(OP_OTHER, b"hello").expect("small frame");
        vec![Effect::Send(entity, hello)]
    }
}

/// Records departures into a shared log, like a handler keeping
/// per-entity state would to drop it.
struct RosterHandler {
    left: Arc<Mutex<Vec<Entity>>>,
}

impl Handler for RosterHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        Vec::new()
    }

    async fn process(
        &mut self,
        _entity: Entity,
        _opcode: Opcode,
        _payload: &[u8],
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        Vec::new()
    }

    fn on_client_left(&mut self, entity: Entity) {
        self.left.lock().expect("lock").push(entity);
    }
}

/// A closed enum over the mock handlers, the same shape the core crate
/// uses for its Net/Auth set.
enum MockHandler {
    Echo(EchoHandler),
    Move(MoveHandler),
    Kick(KickHandler),
    Greet(GreeterHandler),
    Roster(RosterHandler),
}

impl Handler for MockHandler {
    fn opcodes(&self) -> Vec<Opcode> {
        match self {
            Self::Echo(h) => h.opcodes(),
            Self::Move(h) => h.opcodes(),
            Self::Kick(h) => h.opcodes(),
            Self::Greet(h) => h.opcodes(),
            Self::Roster(h) => h.opcodes(),
        }
    }

    async fn process(
        &mut self,
        entity: Entity,
        opcode: Opcode,
        payload: &[u8],
        ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match self {
            Self::Echo(h) => h.process(entity, opcode, payload, ctx).await,
            Self::Move(h) => h.process(entity, opcode, payload, ctx).await,
            Self::Kick(h) => h.process(entity, opcode, payload, ctx).await,
            Self::Greet(h) => h.process(entity, opcode, payload, ctx).await,
            Self::Roster(h) => h.process(entity, opcode, payload, ctx).await,
        }
    }

    fn on_client_entered(
        &mut self,
        entity: Entity,
        ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        match self {
            Self::Echo(h) => h.on_client_entered(entity, ctx),
            Self::Move(h) => h.on_client_entered(entity, ctx),
            Self::Kick(h) => h.on_client_entered(entity, ctx),
            Self::Greet(h) => h.on_client_entered(entity, ctx),
            Self::Roster(h) => h.on_client_entered(entity, ctx),
        }
    }

    fn on_client_left(&mut self, entity: Entity) {
        match self {
            Self::Echo(h) => h.on_client_left(entity),
            Self::Move(h) => h.on_client_left(entity),
            Self::Kick(h) => h.on_client_left(entity),
            Self::Greet(h) => h.on_client_left(entity),
            Self::Roster(h) => h.on_client_left(entity),
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct TestClient {
    handle: ClientHandle,
    entity: Entity,
    out_rx: mpsc::UnboundedReceiver<OutMessage>,
    close_rx: mpsc::Receiver<CloseReason>,
}

fn test_client() -> TestClient {
    let entity = Entity::next();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = mpsc::channel(1);
    let pulse = HeartbeatSupervisor::new(HeartbeatConfig::default()).pulse();
    TestClient {
        handle: ClientHandle::new(entity, out_tx, close_tx, pulse),
        entity,
        out_rx,
        close_rx,
    }
}

fn echo(ops: &[Opcode]) -> MockHandler {
    MockHandler::Echo(EchoHandler { ops: ops.to_vec() })
}

fn frame(entity: Entity, opcode: Opcode, payload: &[u8]) -> InMessage {
    InMessage::new(entity, opcode, payload.to_vec())
}

// =========================================================================
// HandlerController construction
// =========================================================================

#[test]
fn test_controller_build_with_disjoint_opcodes() {
    let controller = HandlerController::build(vec![
        echo(&[OP_ECHO]),
        echo(&[OP_OTHER]),
    ])
    .expect("disjoint sets should build");
    assert_eq!(controller.opcode_count(), 2);
    assert!(controller.routes(OP_ECHO));
    assert!(controller.routes(OP_OTHER));
    assert!(!controller.routes(OP_MOVE));
}

#[test]
fn test_controller_build_rejects_overlapping_opcodes() {
    let result = HandlerController::build(vec![
        echo(&[OP_ECHO, OP_OTHER]),
        echo(&[OP_OTHER]),
    ]);
    assert!(
        matches!(result, Err(RoomError::DuplicateOpcode(op)) if op == OP_OTHER),
        "overlap must fail at build time"
    );
}

#[test]
fn test_controller_build_rejects_overlap_within_one_handler() {
    let result = HandlerController::build(vec![echo(&[OP_ECHO, OP_ECHO])]);
    assert!(matches!(result, Err(RoomError::DuplicateOpcode(_))));
}

// =========================================================================
// Dispatch routing
// =========================================================================

#[tokio::test]
async fn test_dispatch_routes_to_exactly_one_handler() {
    let controller = HandlerController::build(vec![
        echo(&[OP_ECHO]),
        echo(&[OP_OTHER]),
    ])
    .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let mut client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");

    let outcome = room
        .dispatch(frame(client.entity, OP_ECHO, b"ping"))
        .await
        .expect("dispatch");
    assert!(matches!(outcome, Dispatch::Handled));

    // Exactly one reply, from the handler bound to OP_ECHO.
    let reply = client.out_rx.recv().await.expect("reply");
    assert_eq!(reply.opcode(), OP_ECHO);
    assert!(client.out_rx.try_recv().is_err(), "no second reply");
}

#[tokio::test]
async fn test_unknown_opcode_is_not_fatal() {
    let controller =
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build");
    let room = spawn_room(RoomId(1), controller);

    let mut client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");

    // A newer peer speaks an opcode we do not route.
    let outcome = room
        .dispatch(frame(client.entity, Opcode(0x7777), b""))
        .await
        .expect("dispatch");
    assert!(matches!(outcome, Dispatch::Handled));

    // The connection was not closed and a subsequent valid frame is
    // still processed.
    assert!(client.close_rx.try_recv().is_err());
    room.dispatch(frame(client.entity, OP_ECHO, b"still here"))
        .await
        .expect("dispatch");
    let reply = client.out_rx.recv().await.expect("reply");
    assert_eq!(reply.opcode(), OP_ECHO);
}

#[tokio::test]
async fn test_frame_from_non_member_is_dropped() {
    let controller =
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build");
    let room = spawn_room(RoomId(1), controller);

    let mut client = test_client();
    // Never entered the room.
    let outcome = room
        .dispatch(frame(client.entity, OP_ECHO, b"hi"))
        .await
        .expect("dispatch");
    assert!(matches!(outcome, Dispatch::Handled));
    assert!(client.out_rx.try_recv().is_err(), "no reply to outsiders");
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn test_double_enter_is_rejected() {
    let controller =
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build");
    let room = spawn_room(RoomId(1), controller);

    let client = test_client();
    room.enter(client.handle.clone()).await.expect("first enter");
    let err = room
        .enter(client.handle.clone())
        .await
        .expect_err("second enter must fail");
    assert!(matches!(err, RoomError::AlreadyMember(e, r)
        if e == client.entity && r == RoomId(1)));
}

#[tokio::test]
async fn test_leave_removes_membership() {
    let controller =
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build");
    let room = spawn_room(RoomId(1), controller);

    let mut client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");
    room.leave(client.entity).await.expect("leave");

    // After leaving, frames are dropped.
    room.dispatch(frame(client.entity, OP_ECHO, b"gone"))
        .await
        .expect("dispatch");
    assert!(client.out_rx.try_recv().is_err());

    let err = room.leave(client.entity).await.expect_err("second leave");
    assert!(matches!(err, RoomError::NotMember(_, _)));
}

#[tokio::test]
async fn test_enter_hook_runs_once_on_enter() {
    let controller = HandlerController::build(vec![
        MockHandler::Greet(GreeterHandler),
        echo(&[OP_ECHO]),
    ])
    .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let mut client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");

    let hello = client.out_rx.recv().await.expect("greeting");
    assert_eq!(hello.opcode(), OP_OTHER);
    assert!(client.out_rx.try_recv().is_err(), "greeting sent exactly once");
}

#[tokio::test]
async fn test_leave_notifies_handlers() {
    let left = Arc::new(Mutex::new(Vec::new()));
    let controller = HandlerController::build(vec![
        MockHandler::Roster(RosterHandler {
            left: Arc::clone(&left),
        }),
        echo(&[OP_ECHO]),
    ])
    .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");
    assert!(left.lock().expect("lock").is_empty());

    room.leave(client.entity).await.expect("leave");
    assert_eq!(*left.lock().expect("lock"), vec![client.entity]);
}

#[tokio::test]
async fn test_transition_out_notifies_handlers() {
    // A transition removes the member without an explicit leave;
    // handler cleanup must run there too.
    let left = Arc::new(Mutex::new(Vec::new()));
    let controller = HandlerController::build(vec![
        MockHandler::Roster(RosterHandler {
            left: Arc::clone(&left),
        }),
        MockHandler::Move(MoveHandler { target: RoomId(2) }),
    ])
    .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");

    let outcome = room
        .dispatch(frame(client.entity, OP_MOVE, b""))
        .await
        .expect("dispatch");
    assert!(matches!(outcome, Dispatch::Transition { .. }));
    assert_eq!(*left.lock().expect("lock"), vec![client.entity]);
}

// =========================================================================
// Effects: transition and close
// =========================================================================

#[tokio::test]
async fn test_transition_effect_rehomes_the_sender() {
    let lobby = spawn_room(
        RoomId(0),
        HandlerController::build(vec![
            MockHandler::Move(MoveHandler { target: RoomId(2) }),
        ])
        .expect("build"),
    );
    let game = spawn_room(
        RoomId(2),
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build"),
    );

    let mut client = test_client();
    lobby.enter(client.handle.clone()).await.expect("enter lobby");

    let outcome = lobby
        .dispatch(frame(client.entity, OP_MOVE, b""))
        .await
        .expect("dispatch");
    let relinquished = match outcome {
        Dispatch::Transition { target, client } => {
            assert_eq!(target, RoomId(2));
            client
        }
        other => panic!("expected transition, got {other:?}"),
    };

    // The old room no longer routes for this entity...
    lobby
        .dispatch(frame(client.entity, OP_MOVE, b""))
        .await
        .expect("dispatch");

    // ...and after completing the enter, the target room does.
    game.enter(relinquished).await.expect("enter game");
    game.dispatch(frame(client.entity, OP_ECHO, b"in game"))
        .await
        .expect("dispatch");
    let reply = client.out_rx.recv().await.expect("reply");
    assert_eq!(reply.opcode(), OP_ECHO);
}

#[tokio::test]
async fn test_close_effect_for_sender_returns_close_outcome() {
    let controller =
        HandlerController::build(vec![MockHandler::Kick(KickHandler)])
            .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let client = test_client();
    room.enter(client.handle.clone()).await.expect("enter");

    let outcome = room
        .dispatch(frame(client.entity, OP_KICK, b""))
        .await
        .expect("dispatch");
    assert!(matches!(
        outcome,
        Dispatch::Close(CloseReason::AuthFailed)
    ));
}

#[tokio::test]
async fn test_close_effect_for_peer_signals_their_connection() {
    let controller =
        HandlerController::build(vec![MockHandler::Kick(KickHandler)])
            .expect("build");
    let room = spawn_room(RoomId(1), controller);

    let kicker = test_client();
    let mut victim = test_client();
    room.enter(kicker.handle.clone()).await.expect("enter");
    room.enter(victim.handle.clone()).await.expect("enter");

    let payload = victim.entity.into_inner().to_be_bytes();
    let outcome = room
        .dispatch(frame(kicker.entity, OP_KICK_PEER, &payload))
        .await
        .expect("dispatch");

    // The kicker's own connection stays up; the victim's gets the close.
    assert!(matches!(outcome, Dispatch::Handled));
    let reason = victim.close_rx.recv().await.expect("close signal");
    assert_eq!(reason, CloseReason::Requested);
}

// =========================================================================
// RoomDirectory
// =========================================================================

#[tokio::test]
async fn test_directory_register_get_remove() {
    let directory = RoomDirectory::new();
    assert!(directory.is_empty().await);

    let room = spawn_room(
        RoomId(0),
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build"),
    );
    directory.register(room).await.expect("register");
    assert_eq!(directory.len().await, 1);

    let handle = directory.get(RoomId(0)).await.expect("get");
    assert_eq!(handle.room_id(), RoomId(0));

    let err = directory.get(RoomId(9)).await.expect_err("missing room");
    assert!(matches!(err, RoomError::NotFound(r) if r == RoomId(9)));

    directory.remove(RoomId(0)).await.expect("remove");
    assert!(directory.is_empty().await);
}

#[tokio::test]
async fn test_directory_rejects_duplicate_ids() {
    let directory = RoomDirectory::new();
    let a = spawn_room(
        RoomId(3),
        HandlerController::build(vec![echo(&[OP_ECHO])]).expect("build"),
    );
    let b = spawn_room(
        RoomId(3),
        HandlerController::build(vec![echo(&[OP_OTHER])]).expect("build"),
    );

    directory.register(a).await.expect("first register");
    let err = directory.register(b).await.expect_err("duplicate id");
    assert!(matches!(err, RoomError::DuplicateRoom(r) if r == RoomId(3)));
}

//! # Keel
//!
//! Session and protocol layer for real-time multiplayer game servers.
//!
//! Keel owns everything between the accepted socket and the gameplay
//! logic: length-prefixed framing, per-room opcode dispatch, login, and
//! heartbeat liveness. Gameplay rooms plug in by implementing
//! [`Handler`](keel_room::Handler) and registering under a
//! [`RoomId`](keel_protocol::RoomId); every connection starts in room 0,
//! authenticates there, and is moved into a gameplay room on success.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), KeelError> {
//!     let auth = MemoryAuthenticator::new()
//!         .with_user("alice", "hunter2", PlayerId(1));
//!
//!     let server = ServerBuilder::new(ServerConfig::default())
//!         .post_auth_room(RoomId(1))
//!         .build(auth)
//!         .await?;
//!     server.add_room(RoomId(1), vec![NetHandler::new()]).await?;
//!     server.run().await
//! }
//! ```

mod config;
mod connection;
mod error;
pub mod handlers;
mod server;

pub use config::{CloseMode, DbConfig, ServerConfig};
pub use error::KeelError;
pub use handlers::{AuthHandler, CoreHandler, LoginFail, LoginOk, NetHandler};
pub use server::{Server, ServerBuilder};

/// Everything a server binary typically needs.
pub mod prelude {
    pub use crate::{
        AuthHandler, CloseMode, CoreHandler, KeelError, LoginFail, LoginOk,
        NetHandler, Server, ServerBuilder, ServerConfig,
    };
    pub use keel_heartbeat::{HeartbeatConfig, Pulse};
    pub use keel_protocol::{
        opcode, InMessage, MessageHeader, Opcode, OutMessage, RoomId,
        PROTOCOL_VERSION,
    };
    pub use keel_room::{
        CloseReason, Effect, Handler, RoomContext, RoomError,
    };
    pub use keel_session::{
        Authenticator, Credentials, MemoryAuthenticator, PlayerId,
        SessionError,
    };
    pub use keel_transport::Entity;
}

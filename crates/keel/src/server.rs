//! `Server` builder and accept loop.
//!
//! This is the entry point for running a Keel game server. It ties the
//! layers together: transport → protocol → room dispatch → session.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use keel_protocol::{opcode, RoomId};
use keel_room::{spawn_room, Handler, HandlerController, RoomDirectory};
use keel_session::Authenticator;
use keel_transport::{TcpTransport, Transport};

use crate::connection::{handle_connection, ServerState};
use crate::handlers::{AuthHandler, CoreHandler, NetHandler};
use crate::{KeelError, ServerConfig};

/// Builder for configuring and starting a Keel server.
///
/// # Example
///
/// ```rust,ignore
/// use keel::prelude::*;
///
/// let server = ServerBuilder::new(ServerConfig::default())
///     .post_auth_room(RoomId(1))
///     .build(my_auth)?;
/// server.add_room(RoomId(1), vec![NetHandler::new()]).await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    bind_addr: Option<SocketAddr>,
    post_auth_room: RoomId,
}

impl ServerBuilder {
    /// Creates a builder over an explicit configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            bind_addr: None,
            post_auth_room: RoomId(1),
        }
    }

    /// Overrides the listen address. Defaults to all interfaces on the
    /// configured game port; tests bind `127.0.0.1:0`.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Sets the room authenticated connections are moved into.
    pub fn post_auth_room(mut self, room_id: RoomId) -> Self {
        self.post_auth_room = room_id;
        self
    }

    /// Binds the transport and constructs the server around the given
    /// authenticator.
    ///
    /// The entry room (room 0) is registered here with exactly the core
    /// handler pair: net upkeep and login. Gameplay rooms are added
    /// through [`Server::add_room`].
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<Server, KeelError> {
        let addr = self.bind_addr.unwrap_or_else(|| {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.game_listen_port))
        });
        let transport = TcpTransport::bind(
            addr,
            self.config.listen_backlog,
            self.config.tcp_no_delay,
        )?;

        let directory = RoomDirectory::new();
        let entry = HandlerController::build(vec![
            CoreHandler::Net(NetHandler::new()),
            CoreHandler::Auth(AuthHandler::new(
                Arc::new(auth),
                self.post_auth_room,
                self.config.max_login_attempts,
            )),
        ])?;
        directory
            .register(spawn_room(RoomId::ENTRY, entry))
            .await?;

        let state = Arc::new(ServerState {
            directory,
            heartbeat: self.config.heartbeat(),
            max_body_size: self.config.max_body_size,
            close_mode: self.config.close_mode,
        });

        Ok(Server { transport, state })
    }
}

/// A running Keel game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl Server {
    /// Registers a gameplay room under `room_id`.
    ///
    /// Heartbeats keep running after a connection transitions, so any
    /// room members can land in must route `HEARTBEAT_ACK` — include a
    /// [`NetHandler`] alongside the gameplay handlers. A room without
    /// that route still registers, with a warning: its members' acks
    /// land as unknown opcodes and liveness closes them within one
    /// detection window.
    ///
    /// # Errors
    /// Fails when two handlers claim the same opcode or the id is
    /// already registered. Both are wiring mistakes surfaced at startup.
    pub async fn add_room<H: Handler>(
        &self,
        room_id: RoomId,
        handlers: Vec<H>,
    ) -> Result<(), KeelError> {
        let controller = HandlerController::build(handlers)?;
        if !controller.routes(opcode::HEARTBEAT_ACK) {
            tracing::warn!(
                %room_id,
                "room does not route heartbeat acks; members will time out"
            );
        }
        self.state
            .directory
            .register(spawn_room(room_id, controller))
            .await?;
        Ok(())
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Spawns one task per accepted connection. A failure on one
    /// connection never affects another — and an accept error leaves
    /// the loop running.
    pub async fn run(mut self) -> Result<(), KeelError> {
        tracing::info!("keel server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

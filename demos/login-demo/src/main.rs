//! Minimal Keel server: a couple of hard-coded accounts, the entry room
//! for login, and one lobby to land in afterwards.
//!
//! Run with an optional JSON config path:
//!
//! ```text
//! cargo run -p login-demo -- server.json
//! RUST_LOG=keel=debug cargo run -p login-demo
//! ```

use keel::prelude::*;

const LOBBY: RoomId = RoomId(1);

#[tokio::main]
async fn main() -> Result<(), KeelError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    };

    let auth = MemoryAuthenticator::new()
        .with_user("alice", "hunter2", PlayerId(1))
        .with_user("bob", "swordfish", PlayerId(2));

    let server = ServerBuilder::new(config)
        .post_auth_room(LOBBY)
        .build(auth)
        .await?;
    server.add_room(LOBBY, vec![NetHandler::new()]).await?;

    match server.local_addr() {
        Ok(addr) => tracing::info!(%addr, "login demo listening"),
        Err(error) => tracing::warn!(%error, "local address unavailable"),
    }
    server.run().await
}

//! Room dispatch layer for Keel.
//!
//! A room is a dispatch domain: a named group of connections sharing one
//! opcode-indexed handler table. Each room runs as an isolated Tokio task
//! (actor model), so membership mutation and handler state are serialized
//! without locks — the per-room execution affinity the concurrency model
//! requires.
//!
//! # Key types
//!
//! - [`Handler`] — the contract protocol logic implements
//! - [`Effect`] — what a handler asks for (send / transition / close),
//!   as data, applied by the room actor
//! - [`HandlerController`] — the opcode → handler table, built once,
//!   immutable afterwards
//! - [`RoomHandle`] / [`spawn_room`] — command channel into a room actor
//! - [`RoomDirectory`] — the `RoomId → RoomHandle` registry
//! - [`ClientHandle`] — what a room holds per member connection

#![allow(async_fn_in_trait)]

mod controller;
mod directory;
mod error;
mod handler;
mod room;

pub use controller::HandlerController;
pub use directory::RoomDirectory;
pub use error::RoomError;
pub use handler::{CloseReason, Effect, Handler, RoomContext};
pub use room::{spawn_room, ClientHandle, Dispatch, RoomHandle};

//! Session identity and authentication for Keel.
//!
//! The server core never talks to a credential store itself — it consumes
//! an abstract authentication-check capability:
//!
//! 1. **Identity** ([`PlayerId`]) — who an authenticated session is.
//! 2. **Credentials** ([`Credentials`]) — what the client submits.
//! 3. **The check** ([`Authenticator`] trait) — validated by whatever
//!    backs it (database lookup, token service, an in-memory map in
//!    tests).
//!
//! # How it fits in the stack
//!
//! ```text
//! Auth handler (above)  ← submits Credentials, receives PlayerId
//!     ↕
//! Session layer (this crate)  ← defines the capability boundary
//!     ↕
//! Credential store (below)  ← out of scope, behind the trait
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;

pub use auth::{Authenticator, MemoryAuthenticator};
pub use error::SessionError;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an authenticated player.
///
/// Distinct from the transport-level entity handle: an entity identifies
/// a socket, a `PlayerId` identifies an account. The same player may come
/// back on a different socket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// What a client submits on the login opcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account secret. Carried opaquely; hashing/token schemes live
    /// behind the [`Authenticator`].
    pub password: String,
}

//! Error types for the session layer.

/// Errors that can occur while establishing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The submitted credentials were not recognized.
    ///
    /// Deliberately carries no detail — whether the user exists is not
    /// something the wire protocol should reveal.
    #[error("authentication failed")]
    AuthFailed,

    /// The credential store could not be reached.
    ///
    /// Unlike [`SessionError::AuthFailed`] this is not the client's
    /// fault and should not count against its attempt budget.
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

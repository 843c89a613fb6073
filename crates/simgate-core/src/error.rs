//! Error types for the session layer.

use thiserror::Error;

/// Failures raised by a client transport. Any of these flips the owning
/// connection slot to dead; none of them is ever surfaced to the host.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("episode negotiation failed: {0}")]
    Negotiation(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host misuse of the lifecycle hooks. The only error class a hook returns:
/// it indicates a programming error in the caller, not a runtime condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("`{hook}` called out of order, requires `{requires}` first")]
    OutOfOrder {
        hook: &'static str,
        requires: &'static str,
    },

    #[error("no spawn points available to choose from")]
    NoSpawnPoints,

    #[error("no player agent registered")]
    NoAgentRegistered,
}

/// Settings file loading errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

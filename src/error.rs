use std::time::Duration;

use thiserror::Error;

/// Error taxonomy for the actor kernel (see the error handling design in the
/// project notes). Each variant maps to exactly one of the failure domains
/// [`driver::run`](crate::driver::run) or [`Master`](crate::master::Master)
/// has to react to; callers match on the variant rather than on a message
/// string.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("actor construction failed for '{actor}': {reason}")]
    ActorConstruction { actor: String, reason: String },

    #[error("actor '{actor}' did not acknowledge {phase} within {timeout:?}")]
    LifecycleTimeout {
        actor: String,
        phase: &'static str,
        timeout: Duration,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("universe '{0}' aborted: a non-optional actor failed")]
    UniverseAborted(String),
}

/// Errors raised while parsing or validating a [`Configuration`](crate::config::Configuration) tree.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("duplicate actor name '{0}'")]
    DuplicateActorName(String),

    #[error("actor '{0}' has neither 'class' nor 'remote'")]
    MissingClassOrRemote(String),

    #[error("unresolved vault reference '??{0}'")]
    UnresolvedVaultKey(String),

    #[error("unresolved '${{{0}}}' placeholder")]
    UnresolvedPlaceholder(String),
}

/// Errors surfaced by the remote transport layer. These never escape as
/// kernel-level panics; they degrade into `ProviderGone` notifications on
/// the bus (see [`crate::remote::connector`]).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to '{0}' closed")]
    Closed(String),

    #[error("i/o error talking to '{peer}': {source}")]
    Io {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload for channel '{channel}' has no registered codec")]
    Unserializable { channel: String },

    #[error("malformed wire envelope: {0}")]
    Malformed(String),
}

/// Error returned by a fallible user-actor message handler or lifecycle hook.
/// The kernel does not interpret the payload; it only decides, based on
/// which hook raised it, whether the actor resumes or is marked `Failed`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ActorError(pub String);

impl ActorError {
    pub fn new(msg: impl Into<String>) -> Self {
        ActorError(msg.into())
    }
}

impl From<&str> for ActorError {
    fn from(s: &str) -> Self {
        ActorError(s.to_string())
    }
}

impl From<String> for ActorError {
    fn from(s: String) -> Self {
        ActorError(s)
    }
}

//! Transparent cross-process publish/subscribe (§4.6, §6 "Wire protocol").

pub mod connector;
pub mod transport;
pub mod wire;

pub use connector::{InboundConnector, OutboundConnector, ProviderGone, RemotePayload};
pub use transport::Transport;
pub use wire::{Envelope, TypeTag};

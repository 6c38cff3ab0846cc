//! Outbound/inbound BusConnector pair (§4.6 "Mechanism").
//!
//! For each remote peer Universe the Master instantiates one
//! [`OutboundConnector`] (local publish → wire) and one [`InboundConnector`]
//! (wire → local publish). Grounded in the teacher's `RemoteActorRef`/
//! `RemoteHandle` split between the local stand-in and the actual network
//! channel: neither side of a `BusConnector` is itself an Actor, so it talks
//! to the [`Bus`] directly rather than through a mailbox.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::bus::{is_local_only, Bus, DEAD_LETTERS_CHANNEL};
use crate::error::TransportError;

use super::transport::Transport;
use super::wire::{Envelope, TypeTag};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Published locally whenever the remote peer served by a connector becomes
/// unreachable (§4.6 "Failure model", §4.5 edge case (b)).
#[derive(Debug, Clone)]
pub struct ProviderGone {
    pub peer: String,
    pub channels: Vec<String>,
}

/// Serializes local publications for channels with a registered remote
/// interest and writes them to the wire, discarding `/local/`-prefixed
/// channels and anything without a codec (§4.6, §3 "Channel").
pub struct OutboundConnector<T: Transport> {
    universe_name: String,
    transport: T,
    forwarded_channels: Vec<String>,
    sequence: AtomicU64,
}

/// A payload codec registered per class tag, used to serialize an
/// `Arc<dyn Any + Send + Sync>` for the wire (§4.6 "Non-serializable
/// payloads").
pub type Codec = Arc<dyn Fn(&crate::bus::Payload) -> Option<(String, Vec<u8>)> + Send + Sync>;

/// A ready-made [`Codec`] for any payload type with a `serde::Serialize`
/// impl, for applications that don't want to hand-roll a binary format per
/// channel. The paired [`decode_json`] is used on the inbound side once the
/// class tag names a type the receiver knows how to deserialize.
pub fn json_codec<T>(class_tag: &'static str) -> Codec
where
    T: serde::Serialize + Send + Sync + 'static,
{
    Arc::new(move |payload| {
        let value = payload.downcast_ref::<T>()?;
        let bytes = serde_json::to_vec(value).ok()?;
        Some((class_tag.to_string(), bytes))
    })
}

pub fn decode_json<T: serde::de::DeserializeOwned>(payload: &RemotePayload) -> Result<T, TransportError> {
    serde_json::from_slice(&payload.bytes)
        .map_err(|e| TransportError::Malformed(format!("invalid json payload for '{}': {e}", payload.class_tag)))
}

impl<T: Transport> OutboundConnector<T> {
    pub fn new(universe_name: impl Into<String>, transport: T, forwarded_channels: Vec<String>) -> Self {
        OutboundConnector {
            universe_name: universe_name.into(),
            transport,
            forwarded_channels,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn serves(&self, channel: &str) -> bool {
        !is_local_only(channel) && self.forwarded_channels.iter().any(|c| c == channel)
    }

    /// Encodes and sends one publication. Returns `Err` (never panics) if
    /// the codec can't serialize the payload or the transport fails; the
    /// caller is responsible for logging and continuing (§4.6
    /// "Non-serializable payloads").
    pub async fn forward(
        &mut self,
        channel: &str,
        class_tag: String,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        if is_local_only(channel) {
            return Err(TransportError::Unserializable {
                channel: channel.to_string(),
            });
        }
        let envelope = Envelope {
            source_universe: self.universe_name.clone(),
            channel: channel.to_string(),
            type_tag: TypeTag::Data(class_tag),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            payload: bytes,
        };
        self.transport.send(&envelope).await
    }

    pub async fn heartbeat(&mut self) -> Result<(), TransportError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.transport
            .send(&super::wire::heartbeat(self.universe_name.clone(), seq))
            .await
    }

    /// Adds `channel` to the forwarded set and tells the peer to expect data
    /// on it, so a Master that grows its local interest after the connector
    /// was built doesn't need to be rebuilt (§4.6 "local interest changing
    /// while a connection is live").
    pub async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if !self.forwarded_channels.iter().any(|c| c == channel) {
            self.forwarded_channels.push(channel.to_string());
        }
        self.send_control(channel, TypeTag::Subscribe).await
    }

    /// Drops `channel` from the forwarded set and tells the peer it no
    /// longer needs to see it.
    pub async fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        self.forwarded_channels.retain(|c| c != channel);
        self.send_control(channel, TypeTag::Unsubscribe).await
    }

    async fn send_control(&mut self, channel: &str, type_tag: TypeTag) -> Result<(), TransportError> {
        let envelope = Envelope {
            source_universe: self.universe_name.clone(),
            channel: channel.to_string(),
            type_tag,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            payload: Vec::new(),
        };
        self.transport.send(&envelope).await
    }
}

/// Deserializes inbound envelopes and republishes them on the local Bus;
/// runs a reconnect loop with exponential backoff on transport failure
/// (§4.6 "Failure model").
pub struct InboundConnector {
    peer_label: String,
    bus: Bus,
}

impl InboundConnector {
    pub fn new(peer_label: impl Into<String>, bus: Bus) -> Self {
        InboundConnector {
            peer_label: peer_label.into(),
            bus,
        }
    }

    /// Drains one connected transport until it closes or errors, publishing
    /// every data envelope locally and reacting to control envelopes.
    /// Returns the channels that were being served, so the caller can
    /// publish a [`ProviderGone`] and attempt reconnection.
    pub async fn drain<T: Transport>(&self, transport: &mut T) -> Vec<String> {
        let mut served_channels = Vec::new();
        loop {
            match transport.recv().await {
                Ok(envelope) => self.handle(envelope, &mut served_channels).await,
                Err(e) => {
                    warn!(peer = %self.peer_label, error = %e, "remote connection lost");
                    return served_channels;
                }
            }
        }
    }

    async fn handle(&self, envelope: Envelope, served_channels: &mut Vec<String>) {
        match envelope.type_tag {
            TypeTag::Data(class_tag) => {
                if !served_channels.contains(&envelope.channel) {
                    served_channels.push(envelope.channel.clone());
                }
                let payload: crate::bus::Payload = Arc::new(RemotePayload {
                    class_tag,
                    bytes: envelope.payload,
                });
                self.bus.publish(&envelope.channel, payload, None).await;
            }
            TypeTag::Heartbeat => {
                info!(peer = %self.peer_label, "heartbeat");
            }
            TypeTag::Subscribe => {
                if !served_channels.contains(&envelope.channel) {
                    served_channels.push(envelope.channel.clone());
                }
            }
            TypeTag::Unsubscribe => {
                served_channels.retain(|c| c != &envelope.channel);
            }
            TypeTag::ProviderGone => {
                warn!(peer = %self.peer_label, channel = %envelope.channel, "peer reports provider gone");
            }
        }
    }

    /// Publishes a [`ProviderGone`] for every channel this connector was
    /// serving, then returns the next backoff to wait before reconnecting
    /// (§4.6 "Reconnection is attempted with exponential backoff").
    pub async fn announce_gone(&self, channels: Vec<String>, previous_backoff: Duration) -> Duration {
        if !channels.is_empty() {
            let payload: crate::bus::Payload = Arc::new(ProviderGone {
                peer: self.peer_label.clone(),
                channels: channels.clone(),
            });
            self.bus.publish(DEAD_LETTERS_CHANNEL, payload, None).await;
        }
        next_backoff(previous_backoff)
    }
}

/// The undecoded form a remote payload arrives in. A real deployment
/// registers per-class codecs (see [`Codec`]) so receiving actors can
/// downcast the same way they would a local payload; the kernel keeps the
/// raw bytes alongside the class tag rather than guessing a decoding.
#[derive(Debug, Clone)]
pub struct RemotePayload {
    pub class_tag: String,
    pub bytes: Vec<u8>,
}

pub(crate) fn next_backoff(previous: Duration) -> Duration {
    let doubled = if previous.is_zero() { INITIAL_BACKOFF } else { previous.saturating_mul(2) };
    let capped = doubled.min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4 + 1);
    capped + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_prefixed_channels_are_never_forwarded() {
        let connector = OutboundConnector::new(
            "alpha",
            NullTransport,
            vec!["/local/secret".to_string(), "/track/*".to_string()],
        );
        assert!(!connector.serves("/local/secret"));
    }

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Track {
        lat: f64,
        lon: f64,
    }

    #[test]
    fn json_codec_round_trips_through_remote_payload() {
        let codec = json_codec::<Track>("Track");
        let payload: crate::bus::Payload = Arc::new(Track { lat: 1.0, lon: 2.0 });
        let (tag, bytes) = codec(&payload).unwrap();
        let remote = RemotePayload { class_tag: tag, bytes };
        let decoded: Track = decode_json(&remote).unwrap();
        assert_eq!(decoded, Track { lat: 1.0, lon: 2.0 });
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_update_the_forwarded_set_and_notify_the_peer() {
        let mut connector = OutboundConnector::new("alpha", RecordingTransport::default(), Vec::new());
        assert!(!connector.serves("/track/ac1"));

        connector.subscribe("/track/ac1").await.unwrap();
        assert!(connector.serves("/track/ac1"));

        connector.unsubscribe("/track/ac1").await.unwrap();
        assert!(!connector.serves("/track/ac1"));

        let sent = connector.transport.sent.clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].type_tag, TypeTag::Subscribe);
        assert_eq!(sent[1].type_tag, TypeTag::Unsubscribe);
    }

    #[tokio::test]
    async fn inbound_handle_grows_and_shrinks_served_channels_on_control_envelopes() {
        let inbound = InboundConnector::new("alpha", Bus::new());
        let mut served = Vec::new();

        inbound
            .handle(
                Envelope {
                    source_universe: "alpha".into(),
                    channel: "/track/ac1".into(),
                    type_tag: TypeTag::Subscribe,
                    sequence: 0,
                    payload: Vec::new(),
                },
                &mut served,
            )
            .await;
        assert_eq!(served, vec!["/track/ac1".to_string()]);

        inbound
            .handle(
                Envelope {
                    source_universe: "alpha".into(),
                    channel: "/track/ac1".into(),
                    type_tag: TypeTag::Unsubscribe,
                    sequence: 1,
                    payload: Vec::new(),
                },
                &mut served,
            )
            .await;
        assert!(served.is_empty());
    }

    #[test]
    fn backoff_grows_but_stays_capped() {
        let mut d = Duration::ZERO;
        for _ in 0..20 {
            d = next_backoff(d);
        }
        assert!(d <= MAX_BACKOFF + Duration::from_secs(8));
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<Envelope>,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            self.sent.push(envelope.clone());
            Ok(())
        }
        async fn recv(&mut self) -> Result<Envelope, TransportError> {
            Err(TransportError::Closed("recording".into()))
        }
    }

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn send(&mut self, _envelope: &Envelope) -> Result<(), TransportError> {
            Ok(())
        }
        async fn recv(&mut self) -> Result<Envelope, TransportError> {
            Err(TransportError::Closed("null".into()))
        }
    }
}

//! Cross-process transparent publish/subscribe: a publication made through
//! an [`OutboundConnector`] on one "process" shows up on the matching
//! [`InboundConnector`]'s local bus, and a `/local/` channel never crosses
//! (§4.6, §8 "For all channels prefixed `/local/`, no remote transport
//! outbound message mentions them").

use std::time::Duration;

use race_kernel::bus::Bus;
use race_kernel::clock::Clock;
use race_kernel::remote::connector::{InboundConnector, OutboundConnector};
use race_kernel::remote::transport::{StreamTransport, TcpTransport};
use race_kernel::testkit::ChannelProbe;
use tokio::net::TcpListener;

#[tokio::test]
async fn publication_crosses_process_boundary() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let remote_bus = Bus::new();
    let remote_bus_for_task = remote_bus.clone();
    let inbound_task = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let mut transport = StreamTransport::new(stream, peer.to_string());
        let inbound = InboundConnector::new(peer.to_string(), remote_bus_for_task);
        inbound.drain(&mut transport).await;
    });

    let transport = TcpTransport::connect(&addr).await.unwrap();
    let mut outbound = OutboundConnector::new(
        "local-universe",
        transport,
        vec!["/track/ac1".to_string()],
    );

    let clock = Clock::real_time();
    let mut probe = ChannelProbe::subscribe(&remote_bus, &clock, "/track/*").await;

    outbound
        .forward("/track/ac1", "TrackUpdate".to_string(), b"lat,lon".to_vec())
        .await
        .unwrap();

    assert!(
        probe
            .expect::<race_kernel::remote::connector::RemotePayload>(Duration::from_millis(500), |p| {
                p.class_tag == "TrackUpdate" && p.bytes == b"lat,lon"
            })
            .await
    );

    drop(outbound);
    let _ = tokio::time::timeout(Duration::from_millis(500), inbound_task).await;
}

#[tokio::test]
async fn local_prefixed_channel_is_rejected_by_the_outbound_connector() {
    struct NeverSend;
    #[async_trait::async_trait]
    impl race_kernel::remote::transport::Transport for NeverSend {
        async fn send(
            &mut self,
            _e: &race_kernel::remote::wire::Envelope,
        ) -> Result<(), race_kernel::error::TransportError> {
            panic!("must not be called for a /local/ channel");
        }
        async fn recv(&mut self) -> Result<race_kernel::remote::wire::Envelope, race_kernel::error::TransportError> {
            unimplemented!()
        }
    }

    let mut outbound = OutboundConnector::new("local-universe", NeverSend, vec!["/local/secret".to_string()]);
    let err = outbound
        .forward("/local/secret", "Anything".to_string(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, race_kernel::error::TransportError::Unserializable { .. }));
}

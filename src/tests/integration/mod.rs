//! Integration tests: a fake node on a real TCP socket, driven through `dial`.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_test::traced_test;

use crate::chain::types::{HashOrNumber, H256};
use crate::chain::{Chain, ChainOracle};
use crate::config::ClientConfig;
use crate::crypto::Keypair;
use crate::network::connection::{dial, dial_with_newest_generation, Connection, ETH_66};
use crate::network::message::{DisconnectReason, GetBlockHeaders, Message};
use crate::network::serve::RequestMode;
use crate::network::transport::FramedChannel;
use crate::network::NodeRecord;
use crate::tests::shared::{peer_hello, peer_status, test_chain};
use crate::utils::ConformanceError;

/// Accept one dial on localhost and run `script` against the accepted connection.
async fn fake_node<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(Connection<FramedChannel<tokio::net::TcpStream>>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let key = Keypair::generate().unwrap();
    let record = NodeRecord { id: key.node_id(), host: "127.0.0.1".into(), port };

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let channel = FramedChannel::accept(stream, &key).await.unwrap();
        script(Connection::new(channel, key, ClientConfig::default())).await;
    });
    (record.to_string(), handle)
}

/// Answer the client's Hello and Status the way a correct eth/66 node would.
async fn greet(node: &mut Connection<FramedChannel<tokio::net::TcpStream>>, chain: &Chain) {
    assert!(matches!(node.read().await.unwrap(), Message::Hello(_)));
    node.write(&Message::Hello(peer_hello(5, &[64, 65, 66]))).await.unwrap();
    // both sides advertised p2p v5, so everything after Hello is snappy-compressed
    node.set_compressed(true);
    node.write(&Message::Status(peer_status(chain, ETH_66))).await.unwrap();
    match node.read().await.unwrap() {
        Message::Status(status) => assert_eq!(status.protocol_version, ETH_66),
        other => panic!("expected status, got {other:?}"),
    }
}

#[traced_test]
#[tokio::test]
async fn header_query_against_a_live_node() {
    let chain = Arc::new(test_chain());
    let node_chain = chain.clone();

    let (enode, node) = fake_node(move |mut node| async move {
        greet(&mut node, &node_chain).await;

        let (client_id, request) = match node.read_correlated().await.unwrap() {
            (id, Message::GetBlockHeaders(req)) => (id, req),
            other => panic!("expected header request, got {other:?}"),
        };

        // ask the client something first; it must answer before getting its headers
        let ours = GetBlockHeaders {
            origin: HashOrNumber::Number(0),
            amount: 3,
            skip: 0,
            reverse: false,
        };
        node.write_correlated(99, &Message::GetBlockHeaders(ours)).await.unwrap();
        match node.read_correlated().await.unwrap() {
            (99, Message::BlockHeaders(headers)) => {
                assert_eq!(headers, node_chain.get_headers(&ours).unwrap());
            }
            other => panic!("expected served headers, got {other:?}"),
        }

        let answer = node_chain.get_headers(&request).unwrap();
        node.write_correlated(client_id, &Message::BlockHeaders(answer)).await.unwrap();
        node.close().await.unwrap();
    })
    .await;

    let mut conn = dial_with_newest_generation(&enode, ClientConfig::default()).await.unwrap();
    let peer = conn.perform_handshake_and_status(chain.as_ref(), None).await.unwrap();
    assert_eq!(conn.negotiated_version(), ETH_66);
    assert_eq!(peer.head, chain.head_hash());

    let origin: H256 = chain.header(3).unwrap().hash();
    let request = GetBlockHeaders {
        origin: HashOrNumber::Hash(origin),
        amount: 2,
        skip: 1,
        reverse: false,
    };
    let headers = conn
        .headers_request(&request, chain.as_ref(), RequestMode::Correlated(42))
        .await
        .unwrap();
    assert_eq!(headers, chain.get_headers(&request).unwrap());
    assert_eq!(headers.iter().map(|h| h.number).collect::<Vec<_>>(), vec![3, 5]);
    assert!(logs_contain("negotiated eth/66 with fake-node"));
    assert!(logs_contain("snappy payload compression on"));
    assert!(logs_contain("serving 3 headers for inbound request 99"));

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    node.await.unwrap();
}

#[traced_test]
#[tokio::test]
async fn status_below_our_highest_version_is_refused() {
    let chain = Arc::new(test_chain());
    let node_chain = chain.clone();

    let (enode, node) = fake_node(move |mut node| async move {
        assert!(matches!(node.read().await.unwrap(), Message::Hello(_)));
        node.write(&Message::Hello(peer_hello(5, &[64, 65]))).await.unwrap();
        node.set_compressed(true);
        // claims eth/64 while the client's highest is eth/65
        node.write(&Message::Status(peer_status(&node_chain, 64))).await.unwrap();
        let _ = node.read().await;
    })
    .await;

    let mut conn = dial(&enode, ClientConfig::default()).await.unwrap();
    let err = conn.perform_handshake_and_status(chain.as_ref(), None).await.unwrap_err();
    assert!(matches!(err, ConformanceError::StatusExchange(_)), "{err}");
    assert_eq!(conn.negotiated_version(), 65);
    assert!(logs_contain("negotiated eth/65 with fake-node"));
    assert!(!logs_contain("status exchanged"));
    conn.close().await.unwrap();
    node.await.unwrap();
}

#[tokio::test]
async fn disconnect_during_hello_is_reported() {
    let (enode, node) = fake_node(|mut node| async move {
        assert!(matches!(node.read().await.unwrap(), Message::Hello(_)));
        let bye = crate::network::message::Disconnect { reason: DisconnectReason::TooManyPeers };
        node.write(&Message::Disconnect(bye)).await.unwrap();
    })
    .await;

    let mut conn = dial(&enode, ClientConfig::default()).await.unwrap();
    match conn.exchange_hello().await.unwrap() {
        Message::Disconnect(d) => assert_eq!(d.reason, DisconnectReason::TooManyPeers),
        other => panic!("expected disconnect, got {other:?}"),
    }
    node.await.unwrap();
}

#[tokio::test]
async fn dialing_a_closed_port_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let enode = NodeRecord { id: Keypair::generate().unwrap().node_id(), host: "127.0.0.1".into(), port };
    let err = dial(&enode.to_string(), ClientConfig::default()).await.unwrap_err();
    assert!(matches!(err, ConformanceError::Transport(_)), "{err}");

    let err = dial("enode://nope", ClientConfig::default()).await.unwrap_err();
    assert!(matches!(err, ConformanceError::InvalidNodeRecord(_)), "{err}");
}

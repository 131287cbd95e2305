//! Integration tests for the 3-way handshake.
//!
//! Each test binds real UDP sockets on loopback, runs the acceptor half in a
//! background task, and checks that both sides reach
//! `ConnectionState::Established` with agreeing sequence numbers.

use std::net::SocketAddr;
use std::time::Duration;

use gbn_transport::{
    config::Config,
    error::TransportError,
    handshake,
    socket::{Channel, UdpChannel},
    state::ConnectionState,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ephemeral() -> UdpChannel {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    UdpChannel::bind(addr).await.expect("bind loopback socket")
}

fn configs(receiver: SocketAddr) -> (Config, Config) {
    let mut sc = Config::sender();
    sc.peer = receiver;
    sc.recv_timeout = Duration::from_secs(2);
    let mut rc = Config::receiver();
    rc.recv_timeout = Duration::from_secs(5);
    (sc, rc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Both sides reach `Established` after a clean handshake on loopback.
#[tokio::test]
async fn handshake_both_sides_reach_established() {
    let server = ephemeral().await;
    let (sc, rc) = configs(server.local_addr());

    let server_task = tokio::spawn(async move { handshake::accept(&server, &rc).await });

    let client = ephemeral().await;
    let client_ctx = handshake::connect(&client, &sc)
        .await
        .expect("client connect failed");
    let server_ctx = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server accept timed out")
        .expect("server task panicked")
        .expect("server accept failed");

    assert_eq!(client_ctx.state, ConnectionState::Established);
    assert_eq!(server_ctx.state, ConnectionState::Established);
    assert_eq!(server_ctx.peer, client.local_addr(), "acceptor learns the peer address");
}

/// The acceptor expects the first data segment exactly where the initiator
/// will send it, and each side learned the other's window and MSS.
#[tokio::test]
async fn handshake_sequence_numbers_agree() {
    let server = ephemeral().await;
    let (sc, rc) = configs(server.local_addr());

    let server_task = tokio::spawn(async move { handshake::accept(&server, &rc).await });

    let client = ephemeral().await;
    let client_ctx = handshake::connect(&client, &sc).await.unwrap();
    let server_ctx = server_task.await.unwrap().unwrap();

    assert_eq!(
        server_ctx.peer_seq, client_ctx.local_seq,
        "acceptor's expected sequence should equal initiator's first data sequence"
    );
    assert!(handshake::ISN_RANGE.contains(&(client_ctx.local_seq - 2)));
    assert_eq!(client_ctx.local_ack, server_ctx.local_seq);
    assert_eq!((client_ctx.peer_window, client_ctx.peer_mss), (4, 15));
    assert_eq!((server_ctx.peer_window, server_ctx.peer_mss), (9, 15));
}

/// Connecting to an address where nobody is listening fails after one
/// receive timeout rather than hanging.
#[tokio::test]
async fn connect_to_silent_peer_fails() {
    let silent_addr = {
        let tmp = ephemeral().await;
        tmp.local_addr() // tmp is dropped here, closing the port
    };

    let client = ephemeral().await;
    let mut sc = Config::sender();
    sc.peer = silent_addr;
    sc.recv_timeout = Duration::from_millis(300);

    let result = handshake::connect(&client, &sc).await;
    assert!(
        matches!(result, Err(TransportError::HandshakeFailed(_))),
        "expected HandshakeFailed, got: {result:?}"
    );
}

/// An acceptor nobody talks to gives up after its receive timeout.
#[tokio::test]
async fn accept_without_syn_fails() {
    let server = ephemeral().await;
    let mut rc = Config::receiver();
    rc.recv_timeout = Duration::from_millis(300);

    let result = handshake::accept(&server, &rc).await;
    assert!(matches!(result, Err(TransportError::HandshakeFailed("no SYN received"))));
}

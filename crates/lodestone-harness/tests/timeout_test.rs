//! Login kick and keep-alive watchdog in virtual time.

use std::time::Duration;

use lodestone_client::{ClientNotice, ClientOptions, connect};
use lodestone_harness::{MockGateway, SimPeer, SimServer};
use lodestone_proto::Packet;
use lodestone_server::ServerConfig;
use tokio::time::Instant;

/// Answer every probe until `deadline`. Panics if the server closes first.
async fn keep_alive_until(peer: &mut SimPeer, deadline: Instant) -> usize {
    let mut probes = 0;
    loop {
        match tokio::time::timeout_at(deadline, peer.next_packet()).await {
            Err(_) => return probes,
            Ok(Ok(Some(Packet::KeepAlive(probe)))) => {
                probes += 1;
                peer.answer_keep_alive(probe.keep_alive_id).await.unwrap();
            },
            Ok(Ok(Some(other))) => panic!("unexpected {}", other.name()),
            Ok(Ok(None)) => {
                panic!("closed early: {:?}", peer.stream().peer_close_reason());
            },
            Ok(Err(e)) => panic!("transport failed: {e}"),
        }
    }
}

/// Collect probe ids, never answering, until the server closes.
async fn probes_until_closed(peer: &mut SimPeer) -> (Vec<i32>, Option<String>) {
    let mut ids = Vec::new();
    while let Some(packet) = peer.next_packet().await.unwrap() {
        match packet {
            Packet::KeepAlive(probe) => ids.push(probe.keep_alive_id),
            other => panic!("unexpected {}", other.name()),
        }
    }
    (ids, peer.stream().peer_close_reason().map(str::to_string))
}

#[tokio::test(start_paused = true)]
async fn idle_connection_is_kicked_at_the_login_deadline() {
    let server = SimServer::start(ServerConfig::default(), 1).unwrap();
    let (host, port) = server.address();

    let start = Instant::now();
    let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
    peer.handshake(2).await.unwrap();

    assert_eq!(peer.closed().await.unwrap().as_deref(), Some("LoginTimeout"));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "kicked after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(11), "kicked after {elapsed:?}");
    assert_eq!(server.handle().session_count().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn login_before_the_deadline_disarms_the_kick() {
    let server = SimServer::start(ServerConfig::default(), 2).unwrap();
    let (host, port) = server.address();

    let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
    tokio::time::sleep(Duration::from_secs(9)).await;
    peer.login("Steve").await.unwrap();

    let probes = keep_alive_until(&mut peer, Instant::now() + Duration::from_secs(30)).await;
    assert_eq!(probes, 7);
    assert_eq!(server.handle().player_count().await, 1);

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_player_is_kicked_for_stale_keep_alive() {
    let server = SimServer::start(ServerConfig::default(), 3).unwrap();
    let (host, port) = server.address();

    let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
    peer.login("Steve").await.unwrap();
    let logged_in = Instant::now();

    let (probes, reason) = probes_until_closed(&mut peer).await;
    let elapsed = logged_in.elapsed();

    // Checks at 4s and 8s probe; the 12s check is past the 10s limit
    assert_eq!(probes.len(), 2);
    assert!(probes.iter().all(|id| *id >= 0));
    assert_eq!(reason.as_deref(), Some("KeepAliveTimeout"));
    assert!(elapsed >= Duration::from_secs(12), "kicked after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(13), "kicked after {elapsed:?}");
    assert_eq!(server.handle().player_count().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn staleness_equal_to_the_limit_survives_one_more_check() {
    let config = ServerConfig {
        kick_timeout: Duration::from_secs(8),
        check_timeout_interval: Duration::from_secs(4),
        ..ServerConfig::default()
    };
    let server = SimServer::start(config, 4).unwrap();
    let (host, port) = server.address();

    let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
    peer.login("Steve").await.unwrap();
    let logged_in = Instant::now();

    let (probes, reason) = probes_until_closed(&mut peer).await;
    let elapsed = logged_in.elapsed();

    // At 8s the silence equals the limit, which is not stale yet
    assert_eq!(probes.len(), 2);
    assert_eq!(reason.as_deref(), Some("KeepAliveTimeout"));
    assert!(elapsed >= Duration::from_secs(12), "kicked after {elapsed:?}");

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn answering_probes_keeps_the_player() {
    let server = SimServer::start(ServerConfig::default(), 5).unwrap();
    let (host, port) = server.address();

    let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
    peer.login("Steve").await.unwrap();

    keep_alive_until(&mut peer, Instant::now() + Duration::from_secs(60)).await;
    assert_eq!(server.handle().player_count().await, 1);
    assert!(!peer.stream().is_peer_closed());

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn probe_ids_follow_the_seed() {
    async fn first_probes(seed: u64) -> Vec<i32> {
        let server = SimServer::start(ServerConfig::default(), seed).unwrap();
        let (host, port) = server.address();
        let mut peer = SimPeer::connect(server.connector(), host, port).await.unwrap();
        peer.login("Steve").await.unwrap();
        let (probes, _) = probes_until_closed(&mut peer).await;
        server.stop().await.unwrap();
        probes
    }

    assert_eq!(first_probes(42).await, first_probes(42).await);
    assert_ne!(first_probes(42).await, first_probes(43).await);
}

#[tokio::test(start_paused = true)]
async fn client_runtime_answers_keep_alives() {
    let server = SimServer::start(ServerConfig::default(), 6).unwrap();
    let (host, port) = server.address();
    let gateway = MockGateway::accepting();

    let options = ClientOptions::new("Steve").with_address(host, port);
    let mut client = connect(options, &gateway, server.connector()).await.unwrap();
    assert!(matches!(client.next_notice().await, Some(ClientNotice::LoggedIn { .. })));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.handle().player_count().await, 1);
    assert!(client.notices.try_recv().is_err(), "probes are answered, not surfaced");

    server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn client_without_keep_alive_is_kicked() {
    let server = SimServer::start(ServerConfig::default(), 7).unwrap();
    let (host, port) = server.address();
    let gateway = MockGateway::accepting();

    let options = ClientOptions::new("Steve").with_address(host, port).with_keep_alive(false);
    let mut client = connect(options, &gateway, server.connector()).await.unwrap();

    let mut probes = 0;
    loop {
        match client.next_notice().await {
            Some(ClientNotice::LoggedIn { .. }) => {},
            Some(ClientNotice::Packet(Packet::KeepAlive(_))) => probes += 1,
            Some(ClientNotice::Ended { .. }) => break,
            other => panic!("unexpected notice {other:?}"),
        }
    }

    assert_eq!(probes, 2);
    assert_eq!(server.handle().player_count().await, 0);

    server.stop().await.unwrap();
}

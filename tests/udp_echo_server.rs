use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use futures::StreamExt;
use more_asserts as ma;
use tokio::net::UdpSocket;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use udp_ping::{
    decode_request, encode_response, PacketTag, PingConfig, PingProducer, PingResult, PingSendingError, PingSession,
    RuntimeClock, SessionInitiation, StaticSessionInitiator, TokioUdpTransport,
};

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

const TOKEN: &str = "AAECAwQFBgcICQoLDA0ODw==";

#[derive(Clone, Copy)]
enum Behaviour {
    Echo,
    Silent,
    /// Expires the session on the given request, counted from 1.
    ExpireOnRequest(usize),
}

/// Local ping server. Returns its address and the number of requests it saw.
async fn spawn_server(behaviour: Behaviour) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    tokio::spawn(async move {
        let mut buffer = [0u8; 1500];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buffer).await else {
                return;
            };
            let Some(request) = decode_request(&buffer[..len]) else {
                continue;
            };
            assert_eq!((0u8..16).collect::<Vec<u8>>(), request.token);
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let reply = match behaviour {
                Behaviour::Silent => continue,
                Behaviour::ExpireOnRequest(n) if n == count => encode_response(PacketTag::Error, 0),
                Behaviour::Echo | Behaviour::ExpireOnRequest(_) => encode_response(PacketTag::Reply, request.sequence),
            };
            let _ = socket.send_to(&reply, peer).await;
        }
    });
    (address, requests)
}

fn initiator(address: SocketAddr) -> Arc<StaticSessionInitiator> {
    Arc::new(StaticSessionInitiator::new(SessionInitiation {
        server_address: address.ip().to_string(),
        server_port: address.port().to_string(),
        token: TOKEN.to_string(),
        ip_version: None,
    }))
}

fn config() -> PingConfig {
    PingConfig::new()
        .with_interval(Duration::from_millis(20))
        .with_timeout(Duration::from_millis(200))
        .with_cleanup_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_ping_session_against_local_server() {
    setup();
    let (address, requests) = spawn_server(Behaviour::Echo).await;

    let mut session =
        PingSession::new(initiator(address), TokioUdpTransport::new(), Arc::new(RuntimeClock::new()), &config());
    let token = session.initiate_ping_session().await.unwrap();
    assert_eq!(address.port().to_string(), token.credentials().port);

    for _ in 0..3 {
        let rtt = session.send_ping(&token).await.unwrap();
        ma::assert_gt!(rtt, Duration::ZERO);
        ma::assert_lt!(rtt, Duration::from_secs(1));
    }
    assert_eq!(3, requests.load(Ordering::SeqCst));
    assert_eq!(0, session.pending_count());
}

#[tokio::test]
async fn test_unanswered_ping_times_out() {
    setup();
    let (address, _requests) = spawn_server(Behaviour::Silent).await;

    let mut session =
        PingSession::new(initiator(address), TokioUdpTransport::new(), Arc::new(RuntimeClock::new()), &config());
    let token = session.initiate_ping_session().await.unwrap();

    let ping = session.send_ping(&token);
    let sweep = async {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.cleanup_expired_pings();
        }
    };
    let result = tokio::select! {
        result = ping => result,
        _ = sweep => unreachable!(),
    };
    assert!(matches!(result, Err(PingSendingError::TimedOut)));
}

#[tokio::test]
async fn test_producer_reinitiates_expired_session() {
    setup();
    let (address, requests) = spawn_server(Behaviour::ExpireOnRequest(2)).await;

    let producer =
        PingProducer::new(initiator(address), TokioUdpTransport::new, Arc::new(RuntimeClock::new()), config()).unwrap();
    let results: Vec<PingResult> = producer.into_stream().take(4).collect().await;

    assert!(results.iter().all(PingResult::is_interval));
    // Four results took five requests; the expired one is never surfaced.
    assert_eq!(5, requests.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_producer_statistics_against_local_server() {
    setup();
    let (address, _requests) = spawn_server(Behaviour::ExpireOnRequest(3)).await;

    let mut producer =
        PingProducer::new(initiator(address), TokioUdpTransport::new, Arc::new(RuntimeClock::new()), config()).unwrap();
    for _ in 0..5 {
        assert!(producer.next().await.unwrap().is_interval());
    }

    let statistics = producer.statistics();
    assert_eq!(6, statistics.sent);
    assert_eq!(5, statistics.succeeded);
    assert_eq!(1, statistics.reinitiations);
    assert_eq!(0, statistics.timed_out);
    ma::assert_le!(statistics.min.unwrap(), statistics.max.unwrap());
    assert!(statistics.loss() == 0.0);

    producer.stop_token().cancel();
    assert!(producer.next().await.is_none());
}

//! End-to-end runs over the real transport bindings on loopback: a server
//! task accepting streams, a client driving the full benchmark against it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rstest::rstest;

use streambench::client::{run_client, RunTotals};
use streambench::config::BenchConfig;
use streambench::error::StreamError;
use streambench::server;
use streambench::transport::TransportKind;

fn test_config() -> BenchConfig {
    BenchConfig {
        run_timeout: Duration::from_secs(60),
        ..BenchConfig::default()
    }
}

fn listen_addr(kind: TransportKind) -> String {
    static NEXT_SOCKET: AtomicU64 = AtomicU64::new(0);
    match kind {
        TransportKind::Tcp => "127.0.0.1:0".to_string(),
        TransportKind::Uds => std::env::temp_dir()
            .join(format!(
                "streambench-e2e-{}-{}.sock",
                std::process::id(),
                NEXT_SOCKET.fetch_add(1, Ordering::Relaxed),
            ))
            .to_string_lossy()
            .into_owned(),
    }
}

async fn run_loopback(kind: TransportKind, num_messages: u64, payload_bytes: usize) -> Result<RunTotals, StreamError> {
    let config = test_config();
    let transport = kind.create(&config);

    let listener = transport.bind(&listen_addr(kind)).await.expect("bind failed");
    let target = listener.local_addr();

    let server_task = tokio::spawn(server::serve(listener, "loopback", config.clone()));

    let result = run_client(transport.as_ref(), &target, num_messages, payload_bytes, &config).await;

    server_task.abort();
    result
}

#[rstest]
#[case::tcp(TransportKind::Tcp)]
#[case::uds(TransportKind::Uds)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thousand_messages_of_64_kib(#[case] kind: TransportKind) {
    let totals = run_loopback(kind, 1000, 64 * 1024).await.unwrap();

    assert_eq!(totals.messages, 1000);
    assert_eq!(totals.bytes, 1000 * 65536);
}

#[rstest]
#[case::tcp_500_kib(TransportKind::Tcp, 500 * 1024)]
#[case::tcp_1_mib(TransportKind::Tcp, 1024 * 1024)]
#[case::uds_500_kib(TransportKind::Uds, 500 * 1024)]
#[case::uds_1_mib(TransportKind::Uds, 1024 * 1024)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transport_matrix(#[case] kind: TransportKind, #[case] payload_bytes: usize) {
    let num_messages = 200;
    let totals = run_loopback(kind, num_messages, payload_bytes).await.unwrap();

    assert_eq!(totals.messages, num_messages);
    assert_eq!(totals.bytes, num_messages * payload_bytes as u64);
    assert!(totals.elapsed > Duration::ZERO);
}

#[rstest]
#[case::tcp(TransportKind::Tcp)]
#[case::uds(TransportKind::Uds)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_messages_complete_immediately(#[case] kind: TransportKind) {
    let totals = run_loopback(kind, 0, 64 * 1024).await.unwrap();

    assert_eq!(totals.messages, 0);
    assert_eq!(totals.bytes, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_byte_payloads_are_counted_as_messages() {
    let totals = run_loopback(TransportKind::Tcp, 50, 0).await.unwrap();

    assert_eq!(totals.messages, 50);
    assert_eq!(totals.bytes, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connecting_to_a_dead_port_fails() {
    let config = test_config();
    let transport = TransportKind::Tcp.create(&config);

    // bind and immediately drop to get a port that nobody listens on
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = run_client(transport.as_ref(), &format!("127.0.0.1:{}", port), 10, 1024, &config).await;
    assert!(matches!(result, Err(StreamError::Transport(_))));
}

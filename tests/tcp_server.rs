//! Client and server over a real socket: the async server on one side, the
//! blocking TCP transport on the other.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wirecall::config::{CodecLimits, NetworkConfig, ServerConfig};
use wirecall::core::packet::Packet;
use wirecall::core::serialization::decode;
use wirecall::error::{ProtocolError, Result};
use wirecall::protocol::dispatcher::{Dispatcher, HandlerRegistry};
use wirecall::protocol::handler::{access, CallContext, RequestHandler, ServerRequest};
use wirecall::protocol::message::{ServerErrorResponse, WireMessage};
use wirecall::service::client::ClientInvoker;
use wirecall::service::endpoint::Endpoint;
use wirecall::transport::server::Server;
use wirecall::transport::tcp::TcpTransport;
use wirecall::utils::compression::CompressionKind;

#[derive(Debug, Serialize, Deserialize)]
struct Repeat {
    word: String,
    times: u32,
}

wirecall::wire_type!(Repeat => "com.example.Repeat");

impl ServerRequest for Repeat {
    type Response = Vec<String>;
    type Access = access::Ordinary;
}

struct RepeatHandler;

impl RequestHandler<Repeat> for RepeatHandler {
    fn handle_request(&self, _ctx: &CallContext, request: Repeat) -> Result<Vec<String>> {
        Ok(vec![request.word; request.times as usize])
    }
}

struct Running {
    address: SocketAddr,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(()).await.unwrap();
        self.task.await.unwrap().unwrap();
    }
}

async fn start_server() -> Running {
    let mut builder = HandlerRegistry::builder();
    builder.register::<Repeat, _>(RepeatHandler).unwrap();
    let config = ServerConfig {
        address: "127.0.0.1:0".to_string(),
        host_label: Some("tcp-test".into()),
        shutdown_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::from_config(builder.build().unwrap(), &config));
    let endpoint = Arc::new(Endpoint::new(dispatcher, "/invoke", CodecLimits::default()));

    let server = Server::bind(&config, endpoint).await.unwrap();
    let address = server.local_addr().unwrap();
    let (shutdown, rx) = mpsc::channel(1);
    let task = tokio::spawn(server.run_with_shutdown(rx));
    Running {
        address,
        shutdown,
        task,
    }
}

fn invoker(address: SocketAddr, configure: impl FnOnce(&mut NetworkConfig)) -> ClientInvoker {
    let mut config = NetworkConfig::default_with_overrides(configure);
    config.client.http_server = address.to_string();
    let transport = Arc::new(TcpTransport::new(&config.client, CodecLimits::default()));
    ClientInvoker::new(&config, transport)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_over_tcp() {
    let server = start_server().await;
    let address = server.address;

    let words = tokio::task::spawn_blocking(move || {
        let client = invoker(address, |_| {});
        client.send_request(
            &Repeat {
                word: "hey".into(),
                times: 3,
            },
            &address.to_string(),
        )
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(words, vec!["hey", "hey", "hey"]);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streamed_and_compressed_bodies_over_tcp() {
    let server = start_server().await;
    let address = server.address;

    tokio::task::spawn_blocking(move || {
        for (stream, compression) in [
            (true, None),
            (true, Some(CompressionKind::Zstd)),
            (false, Some(CompressionKind::Gzip)),
        ] {
            let client = invoker(address, |c| {
                c.transport.stream_requests = stream;
                c.transport.compression = compression;
            });
            let words = client
                .send_request(
                    &Repeat {
                        word: "x".repeat(100),
                        times: 2000,
                    },
                    &address.to_string(),
                )
                .unwrap();
            assert_eq!(words.len(), 2000);
        }
    })
    .await
    .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_frame_gets_error_response() {
    let server = start_server().await;
    let address = server.address;

    let error = tokio::task::spawn_blocking(move || {
        let mut stream = std::net::TcpStream::connect(address).unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let packet = Packet::read_from(&mut stream, CodecLimits::default()).unwrap();
        let value = decode(&packet.body, CodecLimits::default()).unwrap();
        ServerErrorResponse::from_value(value).unwrap()
    })
    .await
    .unwrap();
    assert_eq!(error.error_type, "InvalidHeader");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_path_is_reported() {
    let server = start_server().await;
    let address = server.address;

    let err = tokio::task::spawn_blocking(move || {
        let client = invoker(address, |c| c.client.endpoint_path = "/elsewhere".into());
        client
            .send_request(
                &Repeat {
                    word: "a".into(),
                    times: 1,
                },
                &address.to_string(),
            )
            .unwrap_err()
    })
    .await
    .unwrap();
    assert!(matches!(
        err,
        ProtocolError::RemoteExecution { ref error_type, .. } if error_type == "ConfigError"
    ));

    server.stop().await;
}

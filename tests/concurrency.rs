//! Concurrency tests: per-call context isolation, shared codec use and the
//! shared upload budget.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::codec::{Decoder, Encoder};
use wirecall::config::CodecLimits;
use wirecall::core::codec::PacketCodec;
use wirecall::core::packet::Packet;
use wirecall::core::value::{from_value, to_tagged};
use wirecall::error::Result;
use wirecall::protocol::dispatcher::{Dispatcher, HandlerRegistry};
use wirecall::protocol::envelope::{ResponseEnvelope, SessionEnvelope, SessionId};
use wirecall::protocol::handler::{
    access, AuthorizationResponse, CallContext, PrivilegedRequest, PrivilegedRequestHandler,
    RequestHandler, ServerRequest,
};
use wirecall::protocol::message::{SuccessfulExecution, WireMessage};
use wirecall::utils::rate_limit::{RateLimiter, TokenBucket};
use wirecall::Value;

#[derive(Debug, Serialize, Deserialize)]
struct WhoAmI {
    user: Option<String>,
}

wirecall::wire_type!(WhoAmI => "com.example.WhoAmI");

impl ServerRequest for WhoAmI {
    type Response = String;
    type Access = access::Privileged;
}

impl PrivilegedRequest for WhoAmI {
    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

struct WhoAmIHandler;

impl PrivilegedRequestHandler<WhoAmI> for WhoAmIHandler {
    fn authorized(&self, ctx: &CallContext, _request: &WhoAmI) -> AuthorizationResponse {
        match ctx.subject() {
            Some(_) => AuthorizationResponse::Authorized,
            None => AuthorizationResponse::NotAuthenticated("anonymous".into()),
        }
    }

    fn handle_request(&self, ctx: &CallContext, _request: WhoAmI) -> Result<String> {
        // Give other threads a chance to interleave mid-call
        thread::yield_now();
        Ok(format!(
            "{}/{}",
            ctx.subject().unwrap_or_default(),
            ctx.request_id().unwrap_or_default()
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Peek {}

wirecall::wire_type!(Peek => "com.example.Peek");

impl ServerRequest for Peek {
    type Response = Option<String>;
    type Access = access::Ordinary;
}

struct PeekHandler;

impl RequestHandler<Peek> for PeekHandler {
    fn handle_request(&self, ctx: &CallContext, _request: Peek) -> Result<Option<String>> {
        Ok(ctx.subject().map(str::to_owned))
    }
}

fn dispatcher() -> Arc<Dispatcher> {
    let mut builder = HandlerRegistry::builder();
    builder
        .register_privileged::<WhoAmI, _>(WhoAmIHandler)
        .unwrap()
        .register::<Peek, _>(PeekHandler)
        .unwrap();
    Arc::new(Dispatcher::new(builder.build().unwrap(), None))
}

fn wrapped(request: Value, user: &str, id: &str) -> Value {
    SessionEnvelope {
        request,
        session: SessionId::current(Some(user.to_string())),
        unique_id: id.to_string(),
    }
    .into_value()
}

#[test]
fn test_concurrent_calls_see_only_their_own_subject() {
    let dispatcher = dispatcher();
    let mut workers = Vec::new();

    for t in 0..8 {
        let dispatcher = dispatcher.clone();
        workers.push(thread::spawn(move || {
            let user = format!("user-{t}");
            for i in 0..200 {
                let id = format!("{t}-{i}");
                let request = to_tagged(&WhoAmI { user: None }).unwrap();
                let response = dispatcher.execute(wrapped(request, &user, &id)).unwrap();

                let inner = ResponseEnvelope::from_value(response).unwrap().into_response();
                let result = SuccessfulExecution::from_value(inner).unwrap();
                assert_eq!(result.response, Value::from(format!("{user}/{id}")));

                // Ordinary requests never observe a subject, even right after a
                // privileged call on the same thread
                let peek = dispatcher
                    .execute(wrapped(to_tagged(&Peek {}).unwrap(), &user, &id))
                    .unwrap();
                let peek = ResponseEnvelope::from_value(peek).unwrap().into_response();
                assert_eq!(from_value::<Option<String>>(peek).unwrap(), None);
            }
        }));
    }

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_bare_privileged_request_uses_request_user() {
    let dispatcher = dispatcher();
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let user = format!("bare-{t}");
                let request = to_tagged(&WhoAmI {
                    user: Some(user.clone()),
                })
                .unwrap();
                let response = dispatcher.execute(request).unwrap();
                let result = SuccessfulExecution::from_value(response).unwrap();
                assert_eq!(result.response, Value::from(format!("{user}/")));
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_codec_use() {
    use tokio::task::JoinSet;

    let payload_sizes = [0usize, 64, 4096, 65536];
    let mut tasks = JoinSet::new();

    for &size in &payload_sizes {
        tasks.spawn(async move {
            let mut codec = PacketCodec::new(CodecLimits::default());
            let mut buf = BytesMut::new();
            for i in 0..500usize {
                let body = vec![((i + size) & 0xFF) as u8; size];
                codec
                    .encode(Packet::new("/invoke", body.clone()), &mut buf)
                    .unwrap();
                let decoded = codec.decode(&mut buf).unwrap().unwrap();
                assert_eq!(decoded.body, body);
                assert!(buf.is_empty());
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
}

#[test]
fn test_token_bucket_shared_between_threads() {
    // 64 KiB burst, then 256 KiB/s
    let bucket = Arc::new(TokenBucket::new(256 * 1024, 64 * 1024));
    let start = Instant::now();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bucket = bucket.clone();
            thread::spawn(move || {
                for _ in 0..8 {
                    bucket.acquire(4 * 1024);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // 128 KiB total: the burst covers half, the rest takes ~250ms
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert!(bucket.available() < 64 * 1024);
}

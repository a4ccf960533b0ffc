//! Shared fixtures for the integration tests

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tollgate_lib::config::Config;
use tollgate_lib::monitor::{MemorySample, MemorySource, MonitorError};
use tollgate_lib::pipeline::response::full_body;
use tollgate_lib::pipeline::{ReqBody, RequestHandler, RespBody};
use tollgate_lib::TrafficContext;

pub const SECRET: &str = "integration-secret";

/// Memory source whose usage percentage is set by the test
#[derive(Clone, Default)]
pub struct MemoryDial(Arc<AtomicU64>);

impl MemoryDial {
    pub fn set_percent(&self, percent: u64) {
        self.0.store(percent, Ordering::SeqCst);
    }
}

impl MemorySource for MemoryDial {
    fn sample(&self) -> Result<MemorySample, MonitorError> {
        Ok(MemorySample { used_bytes: self.0.load(Ordering::SeqCst), total_bytes: 100 })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_listen(
        "127.0.0.1:0".parse().unwrap_or_else(|e| panic!("listen address: {e}")),
    );
    config.identity.jwt_secret = Some(SECRET.to_string());
    config
}

/// Context with a controllable memory source and JWT identities signed with [`SECRET`]
pub fn context(config: Config) -> (Arc<TrafficContext>, MemoryDial) {
    let dial = MemoryDial::default();
    dial.set_percent(10);
    let ctx = TrafficContext::builder(config).memory_source(Box::new(dial.clone())).build();
    ctx.monitor().sample();
    (Arc::new(ctx), dial)
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    role: &'a str,
    exp: u64,
}

pub fn token(role: &str) -> String {
    token_signed_with(SECRET, role)
}

pub fn token_signed_with(secret: &str, role: &str) -> String {
    let claims = Claims { sub: "operator-1", role, exp: 9_999_999_999 };
    let key = EncodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .unwrap_or_else(|e| panic!("encode token: {e}"))
}

pub fn peer(ip: &str) -> SocketAddr {
    format!("{ip}:40000").parse().unwrap_or_else(|e| panic!("peer address: {e}"))
}

pub fn get(path: &str) -> Request<ReqBody> {
    request(http::Method::GET, path, None, "")
}

pub fn get_as(path: &str, bearer: &str) -> Request<ReqBody> {
    request(http::Method::GET, path, Some(bearer), "")
}

pub fn request(
    method: http::Method,
    path: &str,
    bearer: Option<&str>,
    body: &'static str,
) -> Request<ReqBody> {
    let mut builder = Request::builder().method(method).uri(path).header("user-agent", "it/1.0");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(full_body(body)).unwrap_or_else(|e| panic!("request: {e}"))
}

pub async fn body_json(resp: Response<RespBody>) -> serde_json::Value {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .unwrap_or_else(|e| panic!("body: {e}"))
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("json: {e}"))
}

/// Answers 200 immediately and counts calls
#[derive(Default)]
pub struct OkHandler {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RequestHandler for OkHandler {
    async fn handle(&self, _req: Request<ReqBody>) -> Response<RespBody> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut resp = Response::new(full_body("ok"));
        *resp.status_mut() = StatusCode::OK;
        resp
    }
}

/// Holds every request until the test adds a permit
pub struct HeldHandler {
    pub release: Arc<Semaphore>,
    pub served: Arc<std::sync::Mutex<Vec<String>>>,
}

impl HeldHandler {
    pub fn new() -> Self {
        Self {
            release: Arc::new(Semaphore::new(0)),
            served: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl RequestHandler for HeldHandler {
    async fn handle(&self, req: Request<ReqBody>) -> Response<RespBody> {
        self.served
            .lock()
            .unwrap_or_else(|e| panic!("served lock: {e}"))
            .push(req.uri().path().to_string());
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        Response::new(full_body("done"))
    }
}

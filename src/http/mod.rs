//! HTTP-backed map refresh
//!
//! Drives the [`stage`] machine: resolves the host (A and AAAA in
//! parallel), opens one keep-alive connection, and fetches the body, then
//! optionally `<path>.pub` and `<path>.sig` over that same connection. Each
//! response body is streamed to a temporary file and memory-mapped once
//! complete. Every network operation is bounded by the map timeout.

pub mod buffer;
pub mod resolve;
pub mod stage;

pub use buffer::{FetchBuffers, Resource};
pub use resolve::{RecordType, Resolver, StaticResolver, SystemResolver};
pub use stage::{step, Action, FetchContext, FetchEvent, Stage};

use crate::error::{MapError, Result};
use crate::map::{HttpSource, Map};
use crate::registry::EngineContext;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::SendRequest;
use hyper::{header, Method, Request};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

type Sender = SendRequest<Empty<Bytes>>;

/// Result of one HTTP refresh cycle
#[derive(Debug)]
pub enum FetchOutcome {
    /// Another holder had the refresh lock; nothing was sent
    Locked,
    /// Server answered 304, only the freshness date moved
    NotModified,
    /// New data was verified, parsed and published
    Published,
    /// The cycle failed; the previous generation stays
    Failed(MapError),
}

impl FetchOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, FetchOutcome::Locked)
    }
}

/// Format a date as an HTTP `If-Modified-Since` value
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP `Date` header value
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn transport(e: impl std::fmt::Display) -> MapError {
    MapError::Transport(e.to_string())
}

async fn with_timeout<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MapError::Timeout(format!("{} after {:?}", what, limit))),
    }
}

fn host_header(host: &str, port: u16) -> String {
    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    if port == 80 {
        host
    } else {
        format!("{}:{}", host, port)
    }
}

async fn connect(addr: SocketAddr) -> Result<Sender> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| MapError::Connect(format!("{}: {}", addr, e)))?;
    let io = TokioIo::new(stream);

    let (sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(transport)?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(%addr, "map connection closed: {}", e);
        }
    });

    Ok(sender)
}

struct Response {
    status: u16,
    date: Option<DateTime<Utc>>,
}

/// Send one GET and buffer a 200 body into `dest`
async fn request(
    sender: &mut Sender,
    source: &HttpSource,
    resource: Resource,
    user_agent: &str,
    if_modified_since: Option<DateTime<Utc>>,
    dest: &Path,
) -> Result<Response> {
    let target = format!("{}{}", source.path, resource.suffix());
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(target.as_str())
        .header(header::HOST, host_header(&source.host, source.port))
        .header(header::USER_AGENT, user_agent)
        .header(header::CONNECTION, "keep-alive");
    if let Some(date) = if_modified_since {
        builder = builder.header(header::IF_MODIFIED_SINCE, format_http_date(&date));
    }
    let req = builder.body(Empty::<Bytes>::new()).map_err(transport)?;

    sender.ready().await.map_err(transport)?;
    let resp = sender.send_request(req).await.map_err(transport)?;

    let status = resp.status().as_u16();
    let date = resp
        .headers()
        .get(header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let mut body = resp.into_body();
    if status == 200 {
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(transport)?;
            if let Ok(chunk) = frame.into_data() {
                file.write_all(&chunk).await?;
            }
        }
        file.flush().await?;
    } else {
        // Drain so the connection stays usable
        body.collect().await.map_err(transport)?;
    }

    Ok(Response { status, date })
}

async fn next_dns_reply(
    dns: &mut JoinSet<Result<Vec<IpAddr>>>,
    tag: &str,
    host: &str,
) -> Vec<IpAddr> {
    match dns.join_next().await {
        Some(Ok(Ok(addrs))) => addrs,
        Some(Ok(Err(e))) => {
            info!(tag = %tag, host = %host, "DNS lookup failed: {}", e);
            Vec::new()
        }
        Some(Err(e)) => {
            debug!(tag = %tag, host = %host, "DNS task ended: {}", e);
            Vec::new()
        }
        None => Vec::new(),
    }
}

async fn run_fetch(map: &Map, source: &HttpSource, engine: &EngineContext) -> Result<FetchOutcome> {
    let config = engine.config();
    let tag = map.pool().tag();
    let limit = config.map_timeout();
    let buffers = FetchBuffers::create(&config.temp_dir, map.id())?;

    let mut dns = JoinSet::new();
    for record in [RecordType::A, RecordType::Aaaa] {
        let lookup = engine.resolver().resolve(&source.host, record);
        let dns_timeout = config.dns_timeout();
        dns.spawn(async move { with_timeout(dns_timeout, "dns lookup", lookup).await });
    }

    let mut ctx = FetchContext::new(
        source.host.as_str(),
        source.port,
        map.uri(),
        map.is_signed(),
        map.trusted_key().cloned(),
    );
    let mut sender: Option<Sender> = None;
    let mut server_date = None;
    let mut action = Action::AwaitDns;

    loop {
        let event = match action {
            Action::AwaitDns => FetchEvent::DnsReply(next_dns_reply(&mut dns, tag, &source.host).await),

            Action::Ignore => return Err(MapError::Transport("fetch stalled".to_string())),

            Action::Connect(addr) => match with_timeout(limit, "connect", connect(addr)).await {
                Ok(connected) => {
                    dns.abort_all();
                    sender = Some(connected);
                    FetchEvent::Connected
                }
                Err(e) => {
                    info!(tag = %tag, %addr, "cannot connect: {}", e);
                    FetchEvent::ConnectFailed
                }
            },

            Action::Request(resource) => {
                let conn = sender
                    .as_mut()
                    .ok_or_else(|| MapError::Transport("request without connection".to_string()))?;
                let if_modified_since = match resource {
                    Resource::File => source.last_checked(),
                    _ => None,
                };
                let response = with_timeout(
                    limit,
                    "request",
                    request(
                        conn,
                        source,
                        resource,
                        &config.user_agent,
                        if_modified_since,
                        buffers.path(resource),
                    ),
                )
                .await?;

                if resource == Resource::File {
                    server_date = response.date;
                }
                debug!(
                    tag = %tag,
                    status = response.status,
                    "got reply for {}{}",
                    map.uri(),
                    resource.suffix()
                );
                FetchEvent::Response {
                    status: response.status,
                }
            }

            Action::CheckPubkey => {
                let data = buffers.map(Resource::Pubkey)?;
                let origin = format!("{}{}", map.uri(), Resource::Pubkey.suffix());
                match engine.verifier().accept_discovered(&data, &origin) {
                    Ok(key) => FetchEvent::KeyAccepted(key),
                    Err(e) => FetchEvent::KeyRejected(e),
                }
            }

            Action::Verify => {
                let key = ctx
                    .key()
                    .cloned()
                    .ok_or_else(|| MapError::Transport("no key to verify with".to_string()))?;
                let body = buffers.map(Resource::File)?;
                let signature = buffers.map(Resource::Signature)?;
                FetchEvent::Verified(engine.verifier().check(&body, &signature, &key, map.uri()))
            }

            Action::Publish => {
                let body = buffers.map(Resource::File)?;
                map.load(&body);
                source.set_last_checked(server_date.unwrap_or_else(Utc::now));
                info!(tag = %tag, size = body.len(), "read map data from {}", map.uri());
                return Ok(FetchOutcome::Published);
            }

            Action::NotModified => {
                source.set_last_checked(server_date.unwrap_or_else(Utc::now));
                debug!(tag = %tag, "map {} has not been modified since last check", map.uri());
                return Ok(FetchOutcome::NotModified);
            }

            Action::Fail(e) => return Err(e),
        };

        let (next, next_action) = step(ctx, event);
        ctx = next;
        action = next_action;
    }
}

/// One timer tick for an HTTP map
pub async fn fetch_http(map: &Map, source: &HttpSource, engine: &EngineContext) -> FetchOutcome {
    let _guard = match map.lock().try_acquire() {
        Some(guard) => guard,
        None => {
            info!(
                tag = %map.pool().tag(),
                "don't try to reread map as it is locked by other process, will reread it later"
            );
            return FetchOutcome::Locked;
        }
    };

    match run_fetch(map, source, engine).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(tag = %map.pool().tag(), "cannot load map {}: {}", map.uri(), e);
            FetchOutcome::Failed(e)
        }
    }
}

//! HTTP fetch stage machine
//!
//! Stages progress strictly forward:
//!
//! ```text
//! ResolveHost2 -> ResolveHost1 -> LoadFile -> [LoadPubkey] -> [LoadSignature] -> Done
//! ```
//!
//! - Two DNS replies (A and AAAA) are outstanding at first; the first usable
//!   address is tried and the second reply is only a fallback
//! - An unsigned map is published straight after `LoadFile`
//! - A signed map with an inline key skips `LoadPubkey`
//!
//! [`step`] is pure: it consumes an event and returns the next action for
//! the driver to perform. All I/O lives in the driver.

use super::buffer::Resource;
use crate::error::MapError;
use crate::signature::PublicKey;
use std::net::{IpAddr, SocketAddr};

/// Fetch progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Both DNS replies outstanding
    ResolveHost2,
    /// One DNS reply left
    ResolveHost1,
    LoadFile,
    LoadPubkey,
    LoadSignature,
    /// Terminal, the fetch is over
    Done,
}

/// Things that happen to a fetch
#[derive(Debug)]
pub enum FetchEvent {
    /// A DNS reply arrived; empty on failure or timeout
    DnsReply(Vec<IpAddr>),
    Connected,
    ConnectFailed,
    /// A response was fully received; a 200 body is already buffered
    Response { status: u16 },
    /// The discovered key decoded and is trusted
    KeyAccepted(PublicKey),
    KeyRejected(MapError),
    /// Outcome of signature verification
    Verified(Result<(), MapError>),
}

/// What the driver should do next
#[derive(Debug)]
pub enum Action {
    /// Wait for the next DNS reply
    AwaitDns,
    /// Nothing to do, the event was stale
    Ignore,
    Connect(SocketAddr),
    /// Send a GET for a resource over the current connection
    Request(Resource),
    /// Decode the buffered `.pub` and check it against the trusted set
    CheckPubkey,
    /// Verify the buffered body against the buffered `.sig`
    Verify,
    /// Parse the buffered body and publish it
    Publish,
    /// Server reported 304, only freshness moves
    NotModified,
    Fail(MapError),
}

/// Pure state of one fetch
#[derive(Debug)]
pub struct FetchContext {
    stage: Stage,
    host: String,
    port: u16,
    url: String,
    signed: bool,
    trusted_key: Option<PublicKey>,
    key: Option<PublicKey>,
    addr: Option<SocketAddr>,
}

impl FetchContext {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        url: impl Into<String>,
        signed: bool,
        trusted_key: Option<PublicKey>,
    ) -> Self {
        FetchContext {
            stage: Stage::ResolveHost2,
            host: host.into(),
            port,
            url: url.into(),
            signed,
            trusted_key,
            key: None,
            addr: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Key the signature is checked against, once known
    pub fn key(&self) -> Option<&PublicKey> {
        self.key.as_ref()
    }

    /// Address of the current connection attempt
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fail(&mut self, err: MapError) -> Action {
        self.stage = Stage::Done;
        Action::Fail(err)
    }

    fn resolve_failed(&mut self, connect_attempted: bool) -> Action {
        match self.stage {
            Stage::ResolveHost2 => {
                self.stage = Stage::ResolveHost1;
                Action::AwaitDns
            }
            _ if connect_attempted => {
                let target = format!("{}:{}", self.host, self.port);
                self.fail(MapError::Connect(target))
            }
            _ => {
                let host = self.host.clone();
                self.fail(MapError::Resolve(host))
            }
        }
    }

    fn body_loaded(&mut self) -> Action {
        if !self.signed {
            self.stage = Stage::Done;
            return Action::Publish;
        }

        match self.trusted_key.clone() {
            Some(key) => {
                self.key = Some(key);
                self.stage = Stage::LoadSignature;
                Action::Request(Resource::Signature)
            }
            None => {
                self.stage = Stage::LoadPubkey;
                Action::Request(Resource::Pubkey)
            }
        }
    }
}

/// Advance the fetch by one event
pub fn step(mut ctx: FetchContext, event: FetchEvent) -> (FetchContext, Action) {
    let action = match (ctx.stage, event) {
        (Stage::Done, event) => Action::Fail(MapError::Transport(format!(
            "event {:?} after fetch completed",
            event
        ))),

        (Stage::ResolveHost2 | Stage::ResolveHost1, FetchEvent::DnsReply(addrs)) => {
            match addrs.first() {
                Some(ip) => {
                    let addr = SocketAddr::new(*ip, ctx.port);
                    ctx.addr = Some(addr);
                    Action::Connect(addr)
                }
                None => ctx.resolve_failed(false),
            }
        }
        (Stage::ResolveHost2 | Stage::ResolveHost1, FetchEvent::ConnectFailed) => {
            ctx.resolve_failed(true)
        }
        (Stage::ResolveHost2 | Stage::ResolveHost1, FetchEvent::Connected) => {
            ctx.stage = Stage::LoadFile;
            Action::Request(Resource::File)
        }

        // Late DNS replies are ignored once connected
        (_, FetchEvent::DnsReply(_)) => Action::Ignore,

        (Stage::LoadFile, FetchEvent::Response { status: 200 }) => ctx.body_loaded(),
        (Stage::LoadFile, FetchEvent::Response { status: 304 }) => {
            ctx.stage = Stage::Done;
            Action::NotModified
        }

        (Stage::LoadPubkey, FetchEvent::Response { status: 200 }) => Action::CheckPubkey,
        (Stage::LoadPubkey, FetchEvent::KeyAccepted(key)) => {
            ctx.key = Some(key);
            ctx.stage = Stage::LoadSignature;
            Action::Request(Resource::Signature)
        }
        (Stage::LoadPubkey, FetchEvent::KeyRejected(err)) => ctx.fail(err),

        (Stage::LoadSignature, FetchEvent::Response { status: 200 }) => Action::Verify,
        (Stage::LoadSignature, FetchEvent::Verified(Ok(()))) => {
            ctx.stage = Stage::Done;
            Action::Publish
        }
        (Stage::LoadSignature, FetchEvent::Verified(Err(err))) => ctx.fail(err),

        (stage, FetchEvent::Response { status }) => {
            let suffix = match stage {
                Stage::LoadPubkey => Resource::Pubkey.suffix(),
                Stage::LoadSignature => Resource::Signature.suffix(),
                _ => "",
            };
            let url = format!("{}{}", ctx.url, suffix);
            ctx.fail(MapError::Http { status, url })
        }

        (stage, event) => ctx.fail(MapError::Transport(format!(
            "unexpected {:?} in stage {:?}",
            event, stage
        ))),
    };

    (ctx, action)
}

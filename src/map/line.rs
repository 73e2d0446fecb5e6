//! Map definition grammar
//!
//! ```text
//! ["sign+"] ["key=" <64 hex chars> ("+" | ":")] (<absolute path> | "file://" <path> | "http://" <host>[":"<port>]<path>)
//! ```
//!
//! Prefixes are matched case-insensitively.

use crate::error::{MapError, Result};
use crate::signature::{PublicKey, HEX_KEY_LEN};
use hyper::Uri;
use std::path::PathBuf;

const SIGN_PREFIX: &str = "sign+";
const KEY_PREFIX: &str = "key=";
const FILE_PREFIX: &str = "file://";
const HTTP_PREFIX: &str = "http://";

/// Where a map's data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Http { host: String, port: u16, path: String },
}

/// Parsed map definition
#[derive(Debug, Clone)]
pub struct MapLine {
    /// Source URI (`http://...` kept whole, `file://` stripped)
    pub uri: String,
    /// Signature verification required
    pub signed: bool,
    /// Inline trusted key, bypasses key discovery
    pub trusted_key: Option<PublicKey>,
    pub location: Location,
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Whether a configuration value looks like a map definition
pub fn is_map(line: &str) -> bool {
    line.starts_with('/')
        || strip_prefix_ci(line, SIGN_PREFIX).is_some()
        || strip_prefix_ci(line, FILE_PREFIX).is_some()
        || strip_prefix_ci(line, HTTP_PREFIX).is_some()
}

fn parse_http(uri: &str) -> Result<Location> {
    let parsed: Uri = uri
        .parse()
        .map_err(|e| MapError::InvalidUrl(format!("{}: {}", uri, e)))?;

    let host = parsed
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MapError::InvalidUrl(format!("{}: no host", uri)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = parsed.port_u16().unwrap_or(80);
    let path = parsed
        .path_and_query()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();

    Ok(Location::Http { host, port, path })
}

impl MapLine {
    /// Parse a map definition
    pub fn parse(line: &str) -> Result<Self> {
        let mut pos = line.trim();
        let mut signed = false;
        let mut trusted_key = None;

        if let Some(rest) = strip_prefix_ci(pos, SIGN_PREFIX) {
            signed = true;
            pos = rest;
        }

        if let Some(rest) = strip_prefix_ci(pos, KEY_PREFIX) {
            // The key must be followed by the actual location
            if rest.len() <= HEX_KEY_LEN || !rest.is_char_boundary(HEX_KEY_LEN) {
                return Err(MapError::InvalidPubkey(format!(
                    "cannot read pubkey from map: {}",
                    line
                )));
            }
            let (hex_key, rest) = rest.split_at(HEX_KEY_LEN);
            trusted_key = Some(PublicKey::from_hex(hex_key).map_err(|e| {
                MapError::InvalidPubkey(format!("cannot read pubkey from map {}: {}", line, e))
            })?);
            pos = rest
                .strip_prefix('+')
                .or_else(|| rest.strip_prefix(':'))
                .unwrap_or(rest);
        }

        let (uri, location) = if strip_prefix_ci(pos, HTTP_PREFIX).is_some() {
            (pos.to_string(), parse_http(pos)?)
        } else if let Some(path) = strip_prefix_ci(pos, FILE_PREFIX) {
            (path.to_string(), Location::File(PathBuf::from(path)))
        } else if pos.starts_with('/') {
            (pos.to_string(), Location::File(PathBuf::from(pos)))
        } else {
            return Err(MapError::InvalidMapLine(format!(
                "invalid map fetching protocol: {}",
                line
            )));
        };

        Ok(MapLine {
            uri,
            signed,
            trusted_key,
            location,
        })
    }
}

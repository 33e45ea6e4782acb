//! Peer identity extraction.

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;

pub const UNKNOWN_PEER: &str = "unknown";

/// Remote IP of the caller, without port or IPv6 brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Peer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| peer_id(addr))
            .unwrap_or_else(|| UNKNOWN_PEER.to_string());

        Ok(Peer(peer))
    }
}

/// IPv4-mapped IPv6 addresses collapse to their IPv4 form so one host
/// always maps to one identity.
pub fn peer_id(addr: &SocketAddr) -> String {
    addr.ip().to_canonical().to_string()
}

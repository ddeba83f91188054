use axum::{
    extract::{connect_info::MockConnectInfo, ConnectInfo, Request},
    http::HeaderMap,
};
use std::net::{IpAddr, SocketAddr};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Scope key used when the peer address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Left-most address of `X-Forwarded-For`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

pub fn peer_ip(request: &Request) -> Option<IpAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| addr.ip())
        })
}

/// Client IP for admission scope keys. Forwarded headers are only honoured
/// behind a trusted proxy.
pub fn client_ip(request: &Request, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return Some(ip);
        }
    }
    peer_ip(request)
}

pub fn scope_key(request: &Request, trust_proxy: bool) -> String {
    client_ip(request, trust_proxy)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(addr: &str, forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header(FORWARDED_FOR, value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        request
    }

    #[test]
    fn test_peer_address_by_default() {
        let request = request_from("10.0.0.7:5123", Some("1.2.3.4"));
        assert_eq!(scope_key(&request, false), "10.0.0.7");
    }

    #[test]
    fn test_forwarded_for_when_trusted() {
        let request = request_from("10.0.0.7:5123", Some("1.2.3.4, 10.0.0.1"));
        assert_eq!(scope_key(&request, true), "1.2.3.4");

        let garbage = request_from("10.0.0.7:5123", Some("not-an-ip"));
        assert_eq!(scope_key(&garbage, true), "10.0.0.7");
    }

    #[test]
    fn test_unknown_without_connect_info() {
        let request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(scope_key(&request, false), UNKNOWN_CLIENT);
    }
}

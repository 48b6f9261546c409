//! Reverse-proxy header contract
//!
//! The edge proxy terminates TLS and forwards plaintext to the hub over
//! loopback. The hub trusts `X-Forwarded-*` only when the TCP peer is the
//! configured proxy address; anything else is treated as a direct, insecure
//! connection. The edge is also expected to add the security headers in
//! [`EDGE_RESPONSE_HEADERS`] to every response.

use std::net::IpAddr;

/// Header carrying the original client protocol
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Header carrying the original client address chain
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers (name, expected value) the edge must emit on every response
pub const EDGE_RESPONSE_HEADERS: &[(&str, &str)] = &[
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Raw forwarded headers as received on a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedHeaders {
    pub proto: Option<String>,
    pub forwarded_for: Option<String>,
}

/// What the hub believes about a request's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    /// True only if the trusted proxy asserted TLS
    pub secure: bool,
    /// Best-known client address (forwarded address if trusted, else the peer)
    pub client_addr: IpAddr,
    /// Whether the peer was the trusted proxy
    pub via_trusted_proxy: bool,
}

/// Evaluate the forwarded headers of a request arriving from `peer`.
pub fn assess_transport(
    peer: IpAddr,
    trusted_proxy: IpAddr,
    headers: &ForwardedHeaders,
) -> Transport {
    if peer != trusted_proxy {
        if headers.proto.is_some() || headers.forwarded_for.is_some() {
            tracing::debug!("Ignoring forwarded headers from untrusted peer {}", peer);
        }
        return Transport {
            secure: false,
            client_addr: peer,
            via_trusted_proxy: false,
        };
    }

    let secure = headers
        .proto
        .as_deref()
        .and_then(|p| p.split(',').next())
        .map(|p| p.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    // The proxy appends the address it saw; the first entry is the original client.
    let client_addr = headers
        .forwarded_for
        .as_deref()
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer);

    Transport {
        secure,
        client_addr,
        via_trusted_proxy: true,
    }
}

/// A missing or wrong edge security header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeViolation {
    pub header: &'static str,
    pub expected: &'static str,
    pub actual: Option<String>,
}

impl std::fmt::Display for EdgeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: expected \"{}\", got \"{}\"",
                self.header, self.expected, actual
            ),
            None => write!(f, "{}: missing (expected \"{}\")", self.header, self.expected),
        }
    }
}

/// Check a response's headers against the edge contract.
///
/// `lookup` returns the value of a header by lower-case name.
pub fn check_edge_headers<F>(lookup: F) -> Vec<EdgeViolation>
where
    F: Fn(&str) -> Option<String>,
{
    EDGE_RESPONSE_HEADERS
        .iter()
        .filter_map(|(name, expected)| match lookup(name) {
            Some(actual) if actual.trim().eq_ignore_ascii_case(expected) => None,
            actual => Some(EdgeViolation {
                header: name,
                expected,
                actual,
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    const PROXY: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn https_from(client: &str) -> ForwardedHeaders {
        ForwardedHeaders {
            proto: Some("https".into()),
            forwarded_for: Some(client.into()),
        }
    }

    #[test]
    fn test_trusted_proxy_https_is_secure() {
        let t = assess_transport(PROXY, PROXY, &https_from("203.0.113.9, 10.0.0.1"));
        assert!(t.secure);
        assert!(t.via_trusted_proxy);
        assert_eq!(t.client_addr, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        let t = assess_transport(peer, PROXY, &https_from("203.0.113.9"));
        assert!(!t.secure);
        assert_eq!(t.client_addr, peer);
    }

    #[test]
    fn test_missing_proto_is_insecure() {
        let t = assess_transport(PROXY, PROXY, &ForwardedHeaders::default());
        assert!(!t.secure);
        assert_eq!(t.client_addr, PROXY);
    }

    #[test]
    fn test_http_proto_is_insecure() {
        let headers = ForwardedHeaders {
            proto: Some("http".into()),
            forwarded_for: None,
        };
        assert!(!assess_transport(PROXY, PROXY, &headers).secure);
    }

    #[test]
    fn test_check_edge_headers() {
        let mut present: HashMap<&str, &str> = EDGE_RESPONSE_HEADERS.iter().copied().collect();
        assert!(check_edge_headers(|n| present.get(n).map(|v| v.to_string())).is_empty());

        present.remove("x-frame-options");
        present.insert("referrer-policy", "unsafe-url");
        let violations = check_edge_headers(|n| present.get(n).map(|v| v.to_string()));
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.header == "x-frame-options" && v.actual.is_none()));
    }
}

//! Client address resolution for the ip tier.
//!
//! Proxied deployments hide the client behind forwarding headers; trusting
//! the wrong one lets a caller spoof their way out of the ip tier. Headers
//! are consulted in a fixed precedence order and a value only wins if it is
//! a publicly routable address; everything else falls back to the socket
//! peer, which cannot be spoofed.

use http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Forwarding headers in trust order: CDN first, then reverse proxies, then
/// the looser legacy headers.
const HEADER_PRECEDENCE: [&str; 7] = [
    "cf-connecting-ip",
    "x-real-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// Resolve the client address from forwarding headers, falling back to the
/// socket peer address.
///
/// Comma-separated chains (`X-Forwarded-For`, `Forwarded-For`) contribute
/// their first value, the original client. `Forwarded` is parsed per
/// RFC 7239. A header value that is not a publicly routable address is
/// skipped in favor of the next header.
///
/// # Example
/// ```
/// use gateway_throttle::resolve_client_ip;
/// use http::HeaderMap;
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "93.184.216.34, 10.0.0.1".parse().unwrap());
///
/// let socket = IpAddr::V4(Ipv4Addr::new(10, 2, 3, 4));
/// assert_eq!(
///     resolve_client_ip(&headers, socket),
///     IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
/// );
/// ```
pub fn resolve_client_ip(headers: &HeaderMap, socket_addr: IpAddr) -> IpAddr {
    for name in HEADER_PRECEDENCE {
        let Some(raw) = headers.get(name).and_then(|value| value.to_str().ok()) else {
            continue;
        };
        if let Some(candidate) = parse_candidate(name, raw) {
            if is_publicly_routable(candidate) {
                return candidate;
            }
        }
    }
    socket_addr
}

/// Whether `ip` is valid for identifying an external client: not private,
/// loopback, link-local, or otherwise reserved.
pub fn is_publicly_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_routable_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(mapped) => is_routable_v4(mapped),
            None => is_routable_v6(v6),
        },
    }
}

fn is_routable_v4(v4: Ipv4Addr) -> bool {
    let octets = v4.octets();
    // Carrier-grade NAT, 100.64.0.0/10
    let shared = octets[0] == 100 && (64..128).contains(&octets[1]);
    // Reserved, 240.0.0.0/4
    let reserved = octets[0] >= 240;

    !(v4.is_unspecified()
        || v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_documentation()
        || shared
        || reserved)
}

fn is_routable_v6(v6: Ipv6Addr) -> bool {
    let segments = v6.segments();
    // Unique local, fc00::/7
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    // Link local, fe80::/10
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    // Documentation, 2001:db8::/32
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;

    !(v6.is_unspecified() || v6.is_loopback() || unique_local || link_local || documentation)
}

fn parse_candidate(name: &str, raw: &str) -> Option<IpAddr> {
    match name {
        // Chains list the original client first, then each proxy hop.
        "x-forwarded-for" | "forwarded-for" => raw.split(',').next()?.trim().parse().ok(),
        "forwarded" => parse_forwarded(raw),
        _ => raw.trim().parse().ok(),
    }
}

/// Extract the client from an RFC 7239 `Forwarded` header, e.g.
/// `for=192.0.2.60;proto=https, for=203.0.113.43`.
fn parse_forwarded(raw: &str) -> Option<IpAddr> {
    let first_hop = raw.split(',').next()?;
    for directive in first_hop.split(';') {
        if let Some((key, value)) = directive.split_once('=') {
            if key.trim().eq_ignore_ascii_case("for") {
                return parse_node(value);
            }
        }
    }
    None
}

/// Parse an RFC 7239 node: bare address, quoted, bracketed IPv6, optional
/// port.
fn parse_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        let end = rest.find(']')?;
        return rest[..end].parse().ok();
    }
    if let Ok(ip) = value.parse() {
        return Some(ip);
    }
    // IPv4 with a port suffix, e.g. "192.0.2.60:8080"
    let (host, _port) = value.rsplit_once(':')?;
    host.parse().ok()
}

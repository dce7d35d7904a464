//! SSRF guards applied before connecting to any HTTP/SSE upstream URL.
//!
//! Scheme whitelisting plus a pre-flight DNS resolution check against
//! private/reserved/cloud-metadata address space. This is best-effort
//! (TOCTOU against DNS rebinding is not solved here) but catches the
//! common case of an upstream config accidentally pointing at localhost
//! or an internal service.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use hatago_support::HatagoError;

/// Validate `raw_url`'s scheme. `http://` is rejected unless the operator
/// set `allow_insecure` on that server's config.
pub fn validate_scheme(raw_url: &str, allow_insecure: bool) -> Result<(), HatagoError> {
    let scheme_end = raw_url.find("://").ok_or_else(|| {
        HatagoError::Config(format!("URL '{raw_url}' has no scheme (expected https:// or http://)"))
    })?;
    let scheme = raw_url[..scheme_end].to_ascii_lowercase();

    match scheme.as_str() {
        "https" => Ok(()),
        "http" if allow_insecure => Ok(()),
        "http" => Err(HatagoError::Config(format!(
            "URL '{raw_url}' uses http:// without allow_insecure"
        ))),
        other => Err(HatagoError::Config(format!(
            "unsupported URL scheme '{other}://' for '{raw_url}'"
        ))),
    }
}

/// Resolve `raw_url`'s host and reject it if any resolved address falls
/// in blocked space. An unparseable host or DNS failure is let through;
/// the transport itself will surface a clearer connection error.
pub fn preflight_check(raw_url: &str) -> Result<(), HatagoError> {
    let Some((host, port)) = parse_host_port(raw_url) else {
        return Ok(());
    };
    let socket_addr = format!("{host}:{port}");
    let Ok(addrs) = socket_addr.to_socket_addrs() else {
        return Ok(());
    };
    for addr in addrs {
        if is_dangerous_ip(addr.ip()) {
            return Err(HatagoError::Config(format!(
                "URL '{raw_url}' resolves to a blocked address ({})",
                addr.ip()
            )));
        }
    }
    Ok(())
}

/// Extract `(host, port)` from an HTTP(S) URL via basic string parsing.
pub fn parse_host_port(url: &str) -> Option<(String, u16)> {
    let after_scheme = url.split("://").nth(1)?;
    let authority = after_scheme.split('/').next()?;
    let host_port = authority.rsplit('@').next()?;
    let default_port = if url.starts_with("https") { 443 } else { 80 };

    if let Some(bracket_end) = host_port.find(']') {
        let host = &host_port[..=bracket_end];
        let port = host_port[bracket_end + 1..]
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        Some((host.to_string(), port))
    } else if let Some((h, p)) = host_port.rsplit_once(':') {
        let port = p.parse().unwrap_or(default_port);
        Some((h.to_string(), port))
    } else {
        Some((host_port.to_string(), default_port))
    }
}

/// True for loopback, private, link-local, unspecified, or well-known
/// cloud metadata addresses (e.g. `169.254.169.254`).
pub fn is_dangerous_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_dangerous_v4(v4),
        IpAddr::V6(v6) => is_dangerous_v6(v6),
    }
}

fn is_dangerous_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip == Ipv4Addr::UNSPECIFIED
        || ip == Ipv4Addr::new(169, 254, 169, 254)
}

fn is_dangerous_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip == Ipv6Addr::UNSPECIFIED {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_dangerous_v4(v4);
    }
    let first = ip.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_http_without_opt_in() {
        assert!(validate_scheme("http://example.com/mcp", false).is_err());
    }

    #[test]
    fn allows_http_when_opted_in() {
        assert!(validate_scheme("http://example.com/mcp", true).is_ok());
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(validate_scheme("ftp://example.com/mcp", true).is_err());
    }

    #[test]
    fn allows_ordinary_https_host() {
        assert!(validate_scheme("https://mcp.example.com/v1", false).is_ok());
    }

    #[test]
    fn parses_host_and_explicit_port() {
        let (host, port) = parse_host_port("https://example.com:8443/mcp").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 8443);
    }

    #[test]
    fn parses_default_https_port() {
        let (_, port) = parse_host_port("https://example.com/mcp").unwrap();
        assert_eq!(port, 443);
    }

    #[test]
    fn rejects_literal_loopback_ip() {
        assert!(is_dangerous_ip("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn rejects_cloud_metadata_ip() {
        assert!(is_dangerous_ip("169.254.169.254".parse().unwrap()));
    }

    #[test]
    fn ipv4_mapped_ipv6_loopback_is_dangerous() {
        assert!(is_dangerous_ip("::ffff:127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn unique_local_ipv6_is_dangerous() {
        assert!(is_dangerous_ip("fc00::1".parse().unwrap()));
    }

    #[test]
    fn ordinary_public_ip_is_allowed() {
        assert!(!is_dangerous_ip("93.184.216.34".parse().unwrap()));
    }
}

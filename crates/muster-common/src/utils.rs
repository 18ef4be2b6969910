//! Utility functions for muster

use if_addrs::IfAddr;

/// Validate a service name: non-blank, no whitespace, no `:` (the registry
/// key separator).
///
/// # Examples
///
/// ```
/// use muster_common::is_valid_service_name;
///
/// assert!(is_valid_service_name("candidate-svc"));
/// assert!(!is_valid_service_name("   "));
/// assert!(!is_valid_service_name("bad:name"));
/// ```
pub fn is_valid_service_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(|c| c.is_whitespace() || c == ':')
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Machine hostname, falling back to the local IP when it is not valid UTF-8
/// or cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(local_ip)
}

/// `http://host:port`
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

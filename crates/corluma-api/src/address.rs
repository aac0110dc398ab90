// Host/port normalisation for device addresses.
//
// Addresses reach the discovery layer from three places: SSDP `Location`
// headers (`http://10.0.0.3:16021`), NUPnP directory entries (bare IPs),
// and manual entry (anything a user types). Everything is reduced to a
// bare host plus an optional port before it is compared or stored.

/// Split an address into `(host, port)`, dropping any scheme and path.
///
/// ```
/// use corluma_api::normalize_host;
///
/// assert_eq!(normalize_host("http://10.0.0.3:16021/"), ("10.0.0.3".into(), Some(16021)));
/// assert_eq!(normalize_host(" 192.168.1.50 "), ("192.168.1.50".into(), None));
/// ```
pub fn normalize_host(input: &str) -> (String, Option<u16>) {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    // Bracketed IPv6 literal: `[fe80::1]:80`
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host.to_owned(), port);
        }
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
            Ok(port) => (host.to_owned(), Some(port)),
            Err(_) => (host.to_owned(), None),
        },
        _ => (authority.to_owned(), None),
    }
}

/// Format `host` and `port` as an HTTP base URL, omitting port 80.
pub(crate) fn http_base(host: &str, port: u16) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    if port == 80 {
        format!("http://{host}")
    } else {
        format!("http://{host}:{port}")
    }
}

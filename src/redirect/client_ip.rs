use axum::http::HeaderMap;

/// Resolve the client IP a tracking event should carry.
///
/// Precedence: `CF-Connecting-IP`, then the first entry of
/// `X-Forwarded-For`, then the socket peer address.
pub fn resolve_user_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(cf_ip) = headers
        .get("cf-connecting-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return cf_ip.to_string();
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // The first entry in the chain is typically the original client.
        if let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return first.to_string();
        }
    }

    remote_addr.to_string()
}

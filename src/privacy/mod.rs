use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Extract the client IP: proxy headers first, then the direct peer
/// address. Degrades to the empty string, which still produces a
/// deterministic visitor id.
pub fn get_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // X-Forwarded-For: first entry is the client in a proxy chain
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    // X-Real-IP (Nginx)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

pub fn get_user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub fn get_referrer(headers: &HeaderMap) -> String {
    headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

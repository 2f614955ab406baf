use std::future::Future;
use std::net::IpAddr;

use tokio::sync::mpsc;

/// Run `fut` on the runtime and deliver its output to the event loop.
pub fn run_async_to_loop<T, Fut>(tx: &mpsc::UnboundedSender<T>, fut: Fut)
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(fut.await);
    });
}

/// Add a scheme to a bare host. Loopback hosts get `http`, anything else
/// `https`.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    let scheme = if is_loopback(trimmed) { "http" } else { "https" };
    format!("{scheme}://{trimmed}")
}

fn is_loopback(authority: &str) -> bool {
    let host_port = authority.split('/').next().unwrap_or_default();
    let host = match host_port.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or_default(),
        None => host_port.split(':').next().unwrap_or_default(),
    };
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

//! Helpers shared by unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create an empty directory under the OS temp dir, unique per call.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "kally-test-{}-{}-{}",
        prefix,
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Serve `app` on an ephemeral local port.
#[cfg(feature = "gateway-server")]
pub async fn spawn_server(app: axum::Router) -> std::net::SocketAddr {
    let (listener, addr) = bind_local().await;
    serve_on(listener, app);
    addr
}

/// Bind a listener first so a router can embed its own address.
#[cfg(feature = "gateway-server")]
pub async fn bind_local() -> (tokio::net::TcpListener, std::net::SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[cfg(feature = "gateway-server")]
pub fn serve_on(listener: tokio::net::TcpListener, app: axum::Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Encode a small solid-colour PNG at `path`.
pub fn write_test_png(path: &std::path::Path, width: u32, height: u32) {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    img.save(path).unwrap();
}

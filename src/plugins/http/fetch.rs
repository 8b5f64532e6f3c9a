use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use indicatif::ProgressBar;
use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::model::StreamLink;
use crate::plugins::registry::BackendContext;

/// Fetches a stream-download link into `dir`, the way a browser would save it.
/// Writes to `<name>.partial` first and renames once the body is complete; a
/// failed transfer leaves no partial file behind.
pub async fn save_stream(ctx: &BackendContext, link: &StreamLink, dir: &Path, pb: &ProgressBar) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create_dir_all {}", dir.display()))?;

    let name = match sanitize(&link.filename) {
        s if s.trim().is_empty() => "download.bin".to_string(),
        s => s,
    };
    let target = dir.join(&name);
    let partial = dir.join(format!("{name}.partial"));

    if let Err(e) = fetch_into(ctx, link, &partial, pb).await {
        if tokio::fs::remove_file(&partial).await.is_ok() {
            debug!(path = %partial.display(), "removed partial file");
        }
        warn!(url = %link.download_url, error = %e, "stream download failed");
        return Err(e);
    }

    if tokio::fs::metadata(&target).await.is_ok() {
        let _ = tokio::fs::remove_file(&target).await;
    }
    tokio::fs::rename(&partial, &target).await?;
    Ok(target)
}

async fn fetch_into(ctx: &BackendContext, link: &StreamLink, partial: &Path, pb: &ProgressBar) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(ctx.user_agent.clone())
        .connect_timeout(Duration::from_secs(ctx.timeout_secs.max(1)))
        .build()?;
    let resp = client
        .get(&link.download_url)
        .send()
        .await
        .with_context(|| format!("GET {}", link.download_url))?
        .error_for_status()?;

    if let Some(total) = resp.content_length() {
        pb.set_length(total);
    }

    let mut file = tokio::fs::File::create(partial)
        .await
        .with_context(|| format!("create {}", partial.display()))?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use url::Url;

    /// Answers a single request with `head` followed by `body`, then closes.
    async fn serve_once(head: String, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 1024];
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
            sock.flush().await.unwrap();
        });
        format!("http://{}/files/clip.mp4", addr)
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("remote-downloader-{}", uuid::Uuid::new_v4()))
    }

    fn ctx() -> BackendContext {
        BackendContext::new(Url::parse("http://127.0.0.1:5000").unwrap())
    }

    #[tokio::test]
    async fn saves_body_under_sanitized_name() {
        let body: &'static [u8] = b"not really an mp4";
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
        let url = serve_once(head, body).await;
        let dir = scratch_dir();
        let link = StreamLink { download_url: url, filename: "my/clip.mp4".to_string() };

        let pb = ProgressBar::hidden();
        let path = save_stream(&ctx(), &link, &dir, &pb).await.unwrap();

        assert_eq!(path, dir.join("myclip.mp4"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
        assert_eq!(pb.position(), body.len() as u64);
        assert!(!dir.join("myclip.mp4.partial").exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn truncated_body_leaves_no_partial_file() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, b"only a few bytes").await;
        let dir = scratch_dir();
        let link = StreamLink { download_url: url, filename: "clip.webm".to_string() };

        assert!(save_stream(&ctx(), &link, &dir, &ProgressBar::hidden()).await.is_err());
        assert!(!dir.join("clip.webm.partial").exists());
        assert!(!dir.join("clip.webm").exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, b"").await;
        let dir = scratch_dir();
        let link = StreamLink { download_url: url, filename: "clip.mp4".to_string() };

        assert!(save_stream(&ctx(), &link, &dir, &ProgressBar::hidden()).await.is_err());
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::core::error::{ClientError, ClientResult};
use crate::core::model::{
    DownloadKind, DownloadOptions, DownloadRequest, FormatEstimates, MediaInfo, ProgressReport, SessionId, StreamLink,
};
use crate::plugins::http::wire::{
    AnalyzeBody, AnalyzeFormatsBody, AnalyzeFormatsResponse, AnalyzeResponse, Envelope, OptionsBody, ProgressResponse,
    StreamBody, StreamResponse, SubmitBody, SubmitResponse,
};
use crate::plugins::registry::{BackendContext, MediaBackend};

pub struct HttpBackend {
    client: reqwest::Client,
    ctx: BackendContext,
}

impl HttpBackend {
    pub fn new(ctx: BackendContext) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(ctx.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, ctx })
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.ctx.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Validation(format!("invalid server url: {}", self.ctx.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> ClientResult<(StatusCode, String)> {
        let resp = req
            .timeout(Duration::from_secs(self.ctx.timeout_secs.max(1)))
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| ClientError::Network(e.to_string()))?;
        Ok((status, text))
    }

    /// Maps a non-2xx answer to a backend error, preferring the server's own
    /// `error` text.
    fn failure(status: StatusCode, text: &str) -> ClientError {
        let msg = serde_json::from_str::<Envelope>(text)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| format!("server returned {}", status));
        ClientError::Backend(msg)
    }

    fn decode<T: DeserializeOwned>(status: StatusCode, text: &str) -> ClientResult<T> {
        if !status.is_success() {
            return Err(Self::failure(status, text));
        }
        serde_json::from_str(text).map_err(|e| ClientError::Backend(format!("invalid response: {}", e)))
    }

    async fn post_json<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ClientResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let (status, text) = self.send(self.client.post(url).json(body)).await?;
        Self::decode(status, &text)
    }

    async fn control(&self, action: &str, id: &SessionId) -> ClientResult<()> {
        let url = self.endpoint(&["api", action, &id.0])?;
        debug!(%url, "POST");
        let (status, text) = self.send(self.client.post(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id.0.clone()));
        }
        let env: Envelope = Self::decode(status, &text)?;
        if env.succeeded() {
            Ok(())
        } else {
            Err(ClientError::Backend(env.error.unwrap_or_else(|| format!("failed to {} download", action))))
        }
    }
}

#[async_trait]
impl MediaBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http-backend"
    }

    async fn analyze(&self, url: &str) -> ClientResult<MediaInfo> {
        let r: AnalyzeResponse = self.post_json(&["api", "analyze"], &AnalyzeBody { url }).await?;
        if !r.envelope.succeeded() {
            let msg = r.envelope.error.clone().unwrap_or_else(|| "Failed to analyze video".to_string());
            return Err(ClientError::Backend(msg));
        }
        r.into_media_info()
            .ok_or_else(|| ClientError::Backend("analyze response carried no media info".to_string()))
    }

    async fn analyze_formats(&self, url: &str, destination: &str) -> ClientResult<FormatEstimates> {
        let body = AnalyzeFormatsBody { url, download_path: destination };
        let r: AnalyzeFormatsResponse = self.post_json(&["api", "analyze-formats"], &body).await?;
        if !r.envelope.succeeded() {
            let msg = r.envelope.error.clone().unwrap_or_else(|| "Failed to analyze formats".to_string());
            return Err(ClientError::Backend(msg));
        }
        Ok(r.into_estimates(destination))
    }

    async fn submit(&self, req: &DownloadRequest) -> ClientResult<SessionId> {
        let (path, download_type) = match &req.kind {
            DownloadKind::Single => ("download", None),
            DownloadKind::Playlist { download_type } => ("download-playlist", Some(download_type.as_str())),
        };
        let body = SubmitBody {
            url: &req.url,
            format: &req.format,
            options: OptionsBody::from(&req.options),
            folder: &req.destination,
            download_type,
        };
        let r: SubmitResponse = self.post_json(&["api", path], &body).await?;
        if !r.envelope.succeeded() {
            let msg = r.envelope.error.clone().unwrap_or_else(|| "Failed to start download".to_string());
            return Err(ClientError::Backend(msg));
        }
        r.download_id()
            .map(SessionId)
            .ok_or_else(|| ClientError::Backend("Failed to start download".to_string()))
    }

    async fn stream_link(&self, url: &str, format: &str, options: &DownloadOptions) -> ClientResult<StreamLink> {
        let body = StreamBody { url, format, options: OptionsBody::from(options) };
        let r: StreamResponse = self.post_json(&["api", "stream-download"], &body).await?;
        if !r.envelope.succeeded() {
            let msg = r.envelope.error.clone().unwrap_or_else(|| "Download failed".to_string());
            return Err(ClientError::Backend(msg));
        }
        let raw = r
            .download_url
            .ok_or_else(|| ClientError::Backend("stream response carried no download_url".to_string()))?;
        let download_url = self
            .ctx
            .base_url
            .join(&raw)
            .map_err(|e| ClientError::Backend(format!("invalid download_url {}: {}", raw, e)))?;
        Ok(StreamLink {
            download_url: download_url.to_string(),
            filename: r.filename.unwrap_or_else(|| "download.bin".to_string()),
        })
    }

    /// Every failure here is reported as transient so the poll loop keeps going.
    async fn progress(&self, id: &SessionId) -> ClientResult<ProgressReport> {
        let url = self.endpoint(&["api", "progress", &id.0])?;
        let (status, text) = self.send(self.client.get(url)).await?;
        if !status.is_success() {
            warn!(%status, download_id = %id, "progress request rejected");
            return Err(ClientError::Network(format!("progress returned {}", status)));
        }
        serde_json::from_str::<ProgressResponse>(&text)
            .map(ProgressResponse::into_report)
            .map_err(|e| ClientError::Network(format!("unreadable progress response: {}", e)))
    }

    async fn pause(&self, id: &SessionId) -> ClientResult<()> {
        self.control("pause", id).await
    }

    async fn resume(&self, id: &SessionId) -> ClientResult<()> {
        self.control("resume", id).await
    }

    async fn stop(&self, id: &SessionId) -> ClientResult<()> {
        self.control("stop", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        let mut ctx = BackendContext::new(Url::parse(base).unwrap());
        ctx.timeout_secs = 1;
        HttpBackend::new(ctx).unwrap()
    }

    #[test]
    fn endpoint_joins_and_escapes_segments() {
        let b = backend("http://localhost:5000");
        assert_eq!(
            b.endpoint(&["api", "progress", "a b/c"]).unwrap().as_str(),
            "http://localhost:5000/api/progress/a%20b%2Fc"
        );
        let b = backend("http://host/prefix/");
        assert_eq!(b.endpoint(&["api", "pause", "7"]).unwrap().as_str(), "http://host/prefix/api/pause/7");
    }

    #[test]
    fn failure_prefers_server_error_text() {
        let e = HttpBackend::failure(StatusCode::BAD_REQUEST, r#"{"error":"URL is required"}"#);
        assert_eq!(e, ClientError::Backend("URL is required".to_string()));
        let e = HttpBackend::failure(StatusCode::INTERNAL_SERVER_ERROR, "<html>");
        assert!(matches!(e, ClientError::Backend(m) if m.contains("500")));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let b = backend("http://127.0.0.1:9");
        let err = b.progress(&SessionId("1".to_string())).await.unwrap_err();
        assert!(err.is_transient());
    }
}

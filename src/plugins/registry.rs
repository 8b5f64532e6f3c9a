use async_trait::async_trait;
use crate::core::error::ClientResult;
use crate::core::model::{
    DownloadOptions, DownloadRequest, FormatEstimates, MediaInfo, ProgressReport, SessionId, StreamLink,
};
use clap::{ArgMatches, Command};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct BackendContext {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl BackendContext {
    pub fn new(base_url: Url) -> Self {
        Self { base_url, user_agent: "remote-downloader/0.1".to_string(), timeout_secs: 15 }
    }
}

/// The remote worker as seen by the client. Every call is one request; no
/// retries happen at this level.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, url: &str) -> ClientResult<MediaInfo>;

    async fn analyze_formats(&self, url: &str, destination: &str) -> ClientResult<FormatEstimates>;

    /// Server-side submission; returns the job id to poll.
    async fn submit(&self, req: &DownloadRequest) -> ClientResult<SessionId>;

    async fn stream_link(&self, url: &str, format: &str, options: &DownloadOptions) -> ClientResult<StreamLink>;

    async fn progress(&self, id: &SessionId) -> ClientResult<ProgressReport>;

    async fn pause(&self, id: &SessionId) -> ClientResult<()>;

    async fn resume(&self, id: &SessionId) -> ClientResult<()>;

    async fn stop(&self, id: &SessionId) -> ClientResult<()>;
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut BackendContext) -> anyhow::Result<()>;
}

pub struct PluginRegistry {
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl PluginRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = Self { cli_plugins: vec![] };
        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        self.cli_plugins.iter().fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, matches: &ArgMatches, ctx: &mut BackendContext) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            debug!(plugin = p.name(), "applying CLI options");
            p.apply_matches(matches, ctx)?;
        }
        Ok(())
    }

    pub fn backend(&self, ctx: &BackendContext) -> anyhow::Result<Arc<dyn MediaBackend>> {
        let backend: Arc<dyn MediaBackend> = Arc::new(crate::plugins::http::driver::HttpBackend::new(ctx.clone())?);
        info!(backend = backend.name(), base_url = %ctx.base_url, timeout_secs = ctx.timeout_secs, "backend ready");
        Ok(backend)
    }
}

//! In-memory backend for controller and estimator tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::error::{ClientError, ClientResult};
use crate::core::model::{
    Confidence, DownloadOptions, DownloadRequest, FormatEstimates, FormatSizeEstimate, MediaInfo, ProgressReport,
    SessionId, StorageSnapshot, StreamLink, WireStatus,
};
use crate::plugins::registry::MediaBackend;

#[derive(Default)]
struct Script {
    progress: VecDeque<ClientResult<ProgressReport>>,
    last_progress: Option<ClientResult<ProgressReport>>,
    submit_error: Option<ClientError>,
    submit_delay: Option<Duration>,
    pause_error: Option<ClientError>,
    resume_error: Option<ClientError>,
    stop_error: Option<ClientError>,
    estimates: Option<ClientResult<FormatEstimates>>,
    calls: Vec<String>,
    submitted: Vec<DownloadRequest>,
}

pub struct ScriptedBackend {
    script: Mutex<Script>,
}

pub fn report(status: &str, progress: f64) -> ProgressReport {
    let mut r = ProgressReport::with_status(WireStatus::parse(status));
    r.progress = Some(progress);
    r
}

pub fn sample_estimates(destination: &str) -> FormatEstimates {
    let mut best = FormatSizeEstimate::new("best", 600_000_000, Confidence::High, false);
    best.size_display = Some("572.2 MB".to_string());
    FormatEstimates {
        formats: vec![
            best,
            FormatSizeEstimate::new("best[height<=720]", 300_000_000, Confidence::Medium, true),
            FormatSizeEstimate::new("bestaudio", 0, Confidence::Unknown, true),
        ],
        storage: Some(StorageSnapshot::new(destination, 500_000_000, 1_000_000_000, None)),
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self { script: Mutex::new(Script::default()) }
    }

    /// Queues poll answers; the last one repeats once the queue runs dry.
    pub fn push_progress(&self, r: ClientResult<ProgressReport>) {
        self.script.lock().unwrap().progress.push_back(r);
    }

    pub fn fail_submit(&self, e: ClientError) {
        self.script.lock().unwrap().submit_error = Some(e);
    }

    /// Makes `submit` take this long before answering.
    pub fn delay_submit(&self, d: Duration) {
        self.script.lock().unwrap().submit_delay = Some(d);
    }

    pub fn fail_pause(&self, e: ClientError) {
        self.script.lock().unwrap().pause_error = Some(e);
    }

    pub fn fail_resume(&self, e: ClientError) {
        self.script.lock().unwrap().resume_error = Some(e);
    }

    pub fn fail_stop(&self, e: ClientError) {
        self.script.lock().unwrap().stop_error = Some(e);
    }

    pub fn fail_estimates(&self, e: ClientError) {
        self.script.lock().unwrap().estimates = Some(Err(e));
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| *c == name).count()
    }

    pub fn total_calls(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn submitted(&self) -> Vec<DownloadRequest> {
        self.script.lock().unwrap().submitted.clone()
    }

    fn record(&self, name: &str) {
        self.script.lock().unwrap().calls.push(name.to_string());
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn analyze(&self, _url: &str) -> ClientResult<MediaInfo> {
        self.record("analyze");
        Ok(MediaInfo::Video { title: "Clip".to_string(), channel: None, duration: None, thumbnail: None })
    }

    async fn analyze_formats(&self, _url: &str, destination: &str) -> ClientResult<FormatEstimates> {
        self.record("analyze_formats");
        let s = self.script.lock().unwrap();
        match &s.estimates {
            Some(r) => r.clone(),
            None => Ok(sample_estimates(destination)),
        }
    }

    async fn submit(&self, req: &DownloadRequest) -> ClientResult<SessionId> {
        self.record("submit");
        let delay = self.script.lock().unwrap().submit_delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let mut s = self.script.lock().unwrap();
        s.submitted.push(req.clone());
        match s.submit_error.clone() {
            Some(e) => Err(e),
            None => Ok(SessionId("job-1".to_string())),
        }
    }

    async fn stream_link(&self, _url: &str, _format: &str, _options: &DownloadOptions) -> ClientResult<StreamLink> {
        self.record("stream_link");
        Ok(StreamLink { download_url: "http://localhost/files/clip.mp4".to_string(), filename: "clip.mp4".to_string() })
    }

    async fn progress(&self, _id: &SessionId) -> ClientResult<ProgressReport> {
        self.record("progress");
        let mut s = self.script.lock().unwrap();
        if let Some(next) = s.progress.pop_front() {
            s.last_progress = Some(next.clone());
            return next;
        }
        s.last_progress.clone().unwrap_or_else(|| Ok(report("starting", 0.0)))
    }

    async fn pause(&self, _id: &SessionId) -> ClientResult<()> {
        self.record("pause");
        self.script.lock().unwrap().pause_error.clone().map_or(Ok(()), Err)
    }

    async fn resume(&self, _id: &SessionId) -> ClientResult<()> {
        self.record("resume");
        self.script.lock().unwrap().resume_error.clone().map_or(Ok(()), Err)
    }

    async fn stop(&self, _id: &SessionId) -> ClientResult<()> {
        self.record("stop");
        self.script.lock().unwrap().stop_error.clone().map_or(Ok(()), Err)
    }
}

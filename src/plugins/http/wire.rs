//! JSON shapes of the backend, and their normalization into core types.
//!
//! The backend has shipped more than one spelling for storage fields
//! (`free_space`/`free`, `total_space`/`total`, `usage_percent`/`percent`).
//! Both are accepted here and nothing past this module sees the difference.

use crate::core::model::{
    Confidence, DownloadOptions, FormatEstimates, FormatSizeEstimate, MediaInfo, ProgressReport, StorageSnapshot,
    WireStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
pub struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope {
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(false) && self.error.is_none()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageInfo {
    #[serde(default)]
    free_space: Option<f64>,
    #[serde(default)]
    free: Option<f64>,
    #[serde(default)]
    total_space: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    usage_percent: Option<f64>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    remaining_space: Option<f64>,
}

impl StorageInfo {
    pub fn into_snapshot(self, destination: &str) -> StorageSnapshot {
        let free = to_bytes(self.free_space.or(self.free));
        let total = to_bytes(self.total_space.or(self.total));
        let usage = self.usage_percent.or(self.percent).filter(|p| p.is_finite());
        StorageSnapshot::new(destination, free, total, usage)
    }
}

#[derive(Debug, Deserialize)]
pub struct WireFormat {
    selector: String,
    #[serde(default)]
    size_bytes: Option<f64>,
    #[serde(default)]
    size_display: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    estimated: Option<bool>,
}

impl WireFormat {
    fn into_estimate(self) -> FormatSizeEstimate {
        let confidence = self.confidence.as_deref().map(Confidence::parse).unwrap_or(Confidence::Unknown);
        let mut e = FormatSizeEstimate::new(
            self.selector,
            to_bytes(self.size_bytes),
            confidence,
            self.estimated.unwrap_or(true),
        );
        e.size_display = clean_label(self.size_display);
        e
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeFormatsResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    formats: Vec<WireFormat>,
    #[serde(default)]
    storage_info: Option<StorageInfo>,
}

impl AnalyzeFormatsResponse {
    pub fn into_estimates(self, destination: &str) -> FormatEstimates {
        FormatEstimates {
            formats: self.formats.into_iter().map(WireFormat::into_estimate).collect(),
            storage: self.storage_info.map(|s| s.into_snapshot(destination)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    speed: Option<Value>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    eta: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    storage_info: Option<StorageInfo>,
}

impl ProgressResponse {
    pub fn into_report(self) -> ProgressReport {
        ProgressReport {
            status: WireStatus::parse(self.status.as_deref().unwrap_or("")),
            progress: self.progress.filter(|p| p.is_finite()),
            speed: value_label(self.speed),
            size: value_label(self.size),
            eta: value_label(self.eta),
            message: clean_label(self.message),
            remaining_space_bytes: self
                .storage_info
                .and_then(|s| s.remaining_space)
                .filter(|r| r.is_finite())
                .map(|r| r as i64),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub download_id: Option<Value>,
}

impl SubmitResponse {
    /// The id is a string on some servers and a bare number on others.
    pub fn download_id(&self) -> Option<String> {
        match self.download_id.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default)]
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    video_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    is_playlist: bool,
    #[serde(default)]
    info: Option<VideoInfo>,
    #[serde(default)]
    playlist_info: Option<PlaylistInfo>,
}

impl AnalyzeResponse {
    pub fn into_media_info(self) -> Option<MediaInfo> {
        if self.is_playlist {
            let p = self.playlist_info?;
            return Some(MediaInfo::Playlist {
                title: p.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
                video_count: p.video_count,
            });
        }
        let v = self.info?;
        Some(MediaInfo::Video {
            title: v.title.unwrap_or_else(|| "Unknown Title".to_string()),
            channel: clean_label(v.channel),
            duration: value_label(v.duration),
            thumbnail: clean_label(v.thumbnail),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeBody<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeFormatsBody<'a> {
    pub url: &'a str,
    pub download_path: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OptionsBody {
    pub subtitles: bool,
    pub thumbnail: bool,
    pub extract_audio: bool,
}

impl From<&DownloadOptions> for OptionsBody {
    fn from(o: &DownloadOptions) -> Self {
        Self { subtitles: o.subtitles, thumbnail: o.thumbnail, extract_audio: o.extract_audio }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitBody<'a> {
    pub url: &'a str,
    pub format: &'a str,
    pub options: OptionsBody,
    pub folder: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_type: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct StreamBody<'a> {
    pub url: &'a str,
    pub format: &'a str,
    pub options: OptionsBody,
}

fn to_bytes(v: Option<f64>) -> u64 {
    match v {
        Some(f) if f.is_finite() && f > 0.0 => f as u64,
        _ => 0,
    }
}

fn clean_label(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "undefined" && s != "null")
}

fn value_label(v: Option<Value>) -> Option<String> {
    match v? {
        Value::String(s) => clean_label(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

use std::fmt;
use uuid::Uuid;

/// Remote job id as handed out by `/api/download`. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local handle returned by `submit`/`attach`. `local` changes on every new
/// session even if the backend reuses ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub local: Uuid,
    pub id: SessionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Preparing,
    Downloading,
    Paused,
    Completed,
    Error,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }
}

/// Status vocabulary as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireStatus {
    Preparing,
    Starting,
    Downloading,
    Paused,
    Completed,
    Error,
    Stopped,
    Info,
    Warning,
    Other(String),
}

impl WireStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "preparing" => Self::Preparing,
            "starting" => Self::Starting,
            "downloading" => Self::Downloading,
            "paused" => Self::Paused,
            "completed" | "finished" => Self::Completed,
            "error" => Self::Error,
            "stopped" | "cancelled" | "canceled" => Self::Stopped,
            "info" => Self::Info,
            "warning" => Self::Warning,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Session status this wire value moves the state machine to. `None` means
    /// the value is informational and the current status is kept.
    pub fn session_status(&self) -> Option<SessionStatus> {
        match self {
            Self::Preparing | Self::Starting => Some(SessionStatus::Preparing),
            Self::Downloading => Some(SessionStatus::Downloading),
            Self::Paused => Some(SessionStatus::Paused),
            Self::Completed => Some(SessionStatus::Completed),
            Self::Error => Some(SessionStatus::Error),
            Self::Stopped => Some(SessionStatus::Stopped),
            Self::Info | Self::Warning | Self::Other(_) => None,
        }
    }
}

/// One normalized `/api/progress/{id}` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub status: WireStatus,
    pub progress: Option<f64>,
    pub speed: Option<String>,
    pub size: Option<String>,
    pub eta: Option<String>,
    pub message: Option<String>,
    pub remaining_space_bytes: Option<i64>,
}

impl ProgressReport {
    pub fn with_status(status: WireStatus) -> Self {
        Self {
            status,
            progress: None,
            speed: None,
            size: None,
            eta: None,
            message: None,
            remaining_space_bytes: None,
        }
    }
}

/// Which control the user is offered next for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    Pause,
    Resume,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSession {
    /// `None` only for a submission the backend refused.
    pub id: Option<SessionId>,
    pub status: SessionStatus,
    pub progress_percent: f64,
    pub speed: Option<String>,
    pub size_label: Option<String>,
    pub eta_label: Option<String>,
    pub message: Option<String>,
    pub remaining_space_bytes: Option<i64>,
    pub is_paused: bool,
    pub is_stop_requested: bool,
}

impl DownloadSession {
    pub fn preparing(id: SessionId) -> Self {
        Self {
            id: Some(id),
            status: SessionStatus::Preparing,
            progress_percent: 0.0,
            speed: None,
            size_label: None,
            eta_label: None,
            message: None,
            remaining_space_bytes: None,
            is_paused: false,
            is_stop_requested: false,
        }
    }

    pub fn rejected(message: String) -> Self {
        Self {
            id: None,
            status: SessionStatus::Error,
            message: Some(message),
            ..Self::preparing(SessionId(String::new()))
        }
    }

    pub fn affordance(&self) -> Affordance {
        if self.is_paused {
            Affordance::Resume
        } else {
            Affordance::Pause
        }
    }

    pub fn low_space_during_download(&self) -> bool {
        self.remaining_space_bytes
            .map(|r| r < crate::core::feasibility::LOW_SPACE_THRESHOLD_BYTES)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Unknown,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatSizeEstimate {
    pub format_selector: String,
    /// 0 means unknown.
    pub size_bytes: u64,
    pub size_display: Option<String>,
    pub confidence: Confidence,
    pub estimated: bool,
}

impl FormatSizeEstimate {
    /// Builds an estimate, forcing `size_bytes` to 0 when the confidence is unknown.
    pub fn new(format_selector: impl Into<String>, size_bytes: u64, confidence: Confidence, estimated: bool) -> Self {
        let size_bytes = if confidence == Confidence::Unknown { 0 } else { size_bytes };
        Self {
            format_selector: format_selector.into(),
            size_bytes,
            size_display: None,
            confidence,
            estimated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSnapshot {
    pub destination: String,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub usage_percent: Option<f64>,
}

impl StorageSnapshot {
    /// Uses the supplied usage when present, otherwise derives it. Undefined for a
    /// zero-sized volume.
    pub fn new(destination: impl Into<String>, free_bytes: u64, total_bytes: u64, usage_percent: Option<f64>) -> Self {
        let usage_percent = usage_percent.or_else(|| {
            if total_bytes == 0 {
                None
            } else {
                Some(100.0 * (total_bytes as f64 - free_bytes as f64) / total_bytes as f64)
            }
        });
        Self { destination: destination.into(), free_bytes, total_bytes, usage_percent }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatEstimates {
    pub formats: Vec<FormatSizeEstimate>,
    pub storage: Option<StorageSnapshot>,
}

impl FormatEstimates {
    pub fn find(&self, selector: &str) -> Option<&FormatSizeEstimate> {
        self.formats.iter().find(|f| f.format_selector == selector)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    pub subtitles: bool,
    pub thumbnail: bool,
    pub extract_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadKind {
    Single,
    Playlist { download_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: String,
    pub options: DownloadOptions,
    pub destination: String,
    pub kind: DownloadKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaInfo {
    Video {
        title: String,
        channel: Option<String>,
        duration: Option<String>,
        thumbnail: Option<String>,
    },
    Playlist {
        title: String,
        video_count: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLink {
    pub download_url: String,
    pub filename: String,
}

/// Named quality presets; anything else is passed through untouched.
pub fn resolve_format_preset(name: &str) -> String {
    match name {
        "best" => "best",
        "720p" => "best[height<=720]",
        "480p" => "best[height<=480]",
        "360p" => "best[height<=360]",
        "audio" => "bestaudio",
        "m4a" => "bestaudio[ext=m4a]/bestaudio",
        other => other,
    }
    .to_string()
}

pub fn format_bytes(bytes: i64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let sign = if bytes < 0 { "-" } else { "" };
    let mut v = bytes.unsigned_abs() as f64;
    let mut i = 0;
    while v >= 1024.0 && i < UNITS.len() - 1 {
        v /= 1024.0;
        i += 1;
    }
    if i == 0 {
        format!("{sign}{} B", bytes.unsigned_abs())
    } else {
        format!("{sign}{:.1} {}", v, UNITS[i])
    }
}

/// Unsigned sizes from the wire; values beyond `i64::MAX` saturate.
pub fn format_size(bytes: u64) -> String {
    format_bytes(i64::try_from(bytes).unwrap_or(i64::MAX))
}

//! Client-side texts for download status, telemetry fallbacks and prompts.
//! English (`en`) and Simplified/Traditional Chinese (`zh`) are bundled;
//! messages sent by the backend are shown as received.
use crate::core::model::{SessionStatus, WireStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// Parses the `--locale` value. Region suffixes are ignored and anything
    /// unrecognized falls back to English.
    pub fn from_str(s: &str) -> Self {
        let lang = s.trim().split(['-', '_']).next().unwrap_or_default();
        if lang.eq_ignore_ascii_case("zh") {
            Self::Zh
        } else {
            Self::En
        }
    }
}

pub struct Messages {
    pub downloading: &'static str,
    pub preparing: &'static str,
    pub completed: &'static str,
    pub failed: &'static str,
    pub paused: &'static str,
    pub stopped: &'static str,
    pub processing: &'static str,
    pub pause_label: &'static str,
    pub resume_label: &'static str,
    pub speed_unknown: &'static str,
    pub size_unknown: &'static str,
    pub eta_unknown: &'static str,
    pub choose_folder: &'static str,
    pub space_ok: &'static str,
    pub space_low: &'static str,
    pub space_insufficient: &'static str,
    pub size_unknown_hint: &'static str,
    pub low_space_during: &'static str,
    pub controls_hint: &'static str,
}

pub static EN: Messages = Messages {
    downloading: "Downloading...",
    preparing: "Preparing download...",
    completed: "Download completed!",
    failed: "Download failed",
    paused: "Paused",
    stopped: "Download stopped",
    processing: "Processing...",
    pause_label: "Pause",
    resume_label: "Resume",
    speed_unknown: "0 MB/s",
    size_unknown: "0 MB",
    eta_unknown: "--:--",
    choose_folder: "Please choose a download folder (--dest <DIR>) before starting",
    space_ok: "Space after download",
    space_low: "Low disk space after download",
    space_insufficient: "Insufficient disk space",
    size_unknown_hint: "Size unknown; storage check skipped",
    low_space_during: "Low disk space remaining!",
    controls_hint: "p+Enter pause, r+Enter resume, s+Enter stop",
};

pub static ZH: Messages = Messages {
    downloading: "下载中...",
    preparing: "正在准备下载...",
    completed: "下载完成！",
    failed: "下载失败",
    paused: "已暂停",
    stopped: "下载已停止",
    processing: "处理中...",
    pause_label: "暂停",
    resume_label: "继续",
    speed_unknown: "0 MB/s",
    size_unknown: "0 MB",
    eta_unknown: "--:--",
    choose_folder: "开始前请先选择下载目录 (--dest <DIR>)",
    space_ok: "下载后剩余空间",
    space_low: "下载后磁盘空间不足 100MB",
    space_insufficient: "磁盘空间不足",
    size_unknown_hint: "大小未知，跳过空间检查",
    low_space_during: "剩余磁盘空间不足！",
    controls_hint: "p+回车 暂停，r+回车 继续，s+回车 停止",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}

impl Messages {
    /// Fallback text for a poll response that carried no message.
    pub fn for_wire_status(&self, status: &WireStatus) -> &'static str {
        match status {
            WireStatus::Downloading => self.downloading,
            WireStatus::Starting | WireStatus::Preparing => self.preparing,
            WireStatus::Completed => self.completed,
            WireStatus::Error => self.failed,
            WireStatus::Paused => self.paused,
            WireStatus::Stopped => self.stopped,
            WireStatus::Info | WireStatus::Warning | WireStatus::Other(_) => self.processing,
        }
    }

    pub fn for_status(&self, status: SessionStatus) -> &'static str {
        match status {
            SessionStatus::Preparing => self.preparing,
            SessionStatus::Downloading => self.downloading,
            SessionStatus::Paused => self.paused,
            SessionStatus::Completed => self.completed,
            SessionStatus::Error => self.failed,
            SessionStatus::Stopped => self.stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_reads_as_processing() {
        let m = get_messages(Locale::En);
        assert_eq!(m.for_wire_status(&WireStatus::parse("transcoding")), "Processing...");
        assert_eq!(m.for_wire_status(&WireStatus::Starting), "Preparing download...");
    }

    #[test]
    fn locale_parsing_falls_back_to_english() {
        assert_eq!(Locale::from_str("zh-CN"), Locale::Zh);
        assert_eq!(Locale::from_str(" ZH_tw "), Locale::Zh);
        assert_eq!(Locale::from_str("zh-Hans"), Locale::Zh);
        assert_eq!(Locale::from_str("zhx"), Locale::En);
        assert_eq!(Locale::from_str(""), Locale::En);
        assert_eq!(Locale::from_str("fr"), Locale::En);
    }
}

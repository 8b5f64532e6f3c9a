mod core;
mod i18n;
mod plugins;

use clap::{Arg, ArgAction, ArgMatches, Command};
use crate::core::controller::SessionController;
use crate::core::estimator::Estimator;
use crate::core::events::SessionEvent;
use crate::core::feasibility::{evaluate, FeasibilityStatus, FeasibilityVerdict};
use crate::core::intents::{Intent, IntentLoop};
use crate::core::model::*;
use crate::i18n::{get_messages, Locale, Messages};
use indicatif::{ProgressBar, ProgressStyle};
use crate::plugins::registry::{BackendContext, MediaBackend, PluginRegistry};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

fn build_cli(registry: &PluginRegistry) -> Command {
    let url_arg = || Arg::new("url").help("Media URL (video or playlist)").required(true).num_args(1);
    let format_arg = || {
        Arg::new("format")
            .long("format")
            .short('f')
            .help("Format selector or preset: best, 720p, 480p, 360p, audio, m4a")
            .default_value("720p")
            .num_args(1)
    };
    let id_arg = || Arg::new("id").help("Download id returned by the backend").required(true).num_args(1);
    let option_flags = |cmd: Command| {
        cmd.arg(Arg::new("subs").long("subs").help("Also fetch English subtitles").action(ArgAction::SetTrue))
            .arg(Arg::new("thumbnail").long("thumbnail").help("Also fetch the thumbnail").action(ArgAction::SetTrue))
            .arg(Arg::new("audio").long("audio").help("Extract audio to mp3").action(ArgAction::SetTrue))
    };

    let analyze = Command::new("analyze").about("Show title / playlist info for a URL").arg(url_arg());

    let formats = Command::new("formats")
        .about("Show per-format size estimates and free space at the destination")
        .arg(url_arg())
        .arg(Arg::new("dest").long("dest").short('d').help("Destination folder on the backend host").num_args(1))
        .arg(format_arg());

    let download = option_flags(
        Command::new("download")
            .about("Submit a server-side download and follow it until it finishes")
            .arg(url_arg())
            .arg(format_arg())
            .arg(
                Arg::new("dest")
                    .long("dest")
                    .short('d')
                    .help("Destination folder on the backend host (required)")
                    .num_args(1),
            )
            .arg(Arg::new("playlist").long("playlist").help("Submit as a playlist download").action(ArgAction::SetTrue))
            .arg(
                Arg::new("download_type")
                    .long("download-type")
                    .help("Playlist download type")
                    .default_value("individual")
                    .num_args(1),
            )
            .arg(
                Arg::new("require_space")
                    .long("require-space")
                    .help("Refuse to submit when the estimate does not fit in free space")
                    .action(ArgAction::SetTrue),
            ),
    );

    let link = option_flags(
        Command::new("link")
            .about("Ask the backend for a direct stream link and save it locally")
            .arg(url_arg())
            .arg(format_arg())
            .arg(Arg::new("out_dir").long("out-dir").help("Local output directory").default_value("./downloads")),
    );

    let app = Command::new("remote-downloader")
        .about("Client for a remote yt-dlp download service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("server")
                .long("server")
                .help("Backend base URL")
                .default_value("http://localhost:5000")
                .global(true)
                .num_args(1),
        )
        .arg(Arg::new("locale").long("locale").help("Message language (en, zh)").default_value("en").global(true))
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .help("Log filter when RUST_LOG is unset")
                .default_value("warn")
                .global(true),
        )
        .subcommand(analyze)
        .subcommand(formats)
        .subcommand(download)
        .subcommand(Command::new("watch").about("Follow an already running download").arg(id_arg()))
        .subcommand(Command::new("pause").about("Pause a running download").arg(id_arg()))
        .subcommand(Command::new("resume").about("Resume a paused download").arg(id_arg()))
        .subcommand(Command::new("stop").about("Stop a download").arg(id_arg()))
        .subcommand(link);

    registry.augment_command(app)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn options_from(m: &ArgMatches) -> DownloadOptions {
    DownloadOptions { subtitles: m.get_flag("subs"), thumbnail: m.get_flag("thumbnail"), extract_audio: m.get_flag("audio") }
}

fn format_from(m: &ArgMatches) -> String {
    m.get_one::<String>("format").map(|f| resolve_format_preset(f)).unwrap_or_else(|| "best".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = PluginRegistry::with_defaults();
    let matches = build_cli(&registry).get_matches();

    init_logging(matches.get_one::<String>("log_level").map(String::as_str).unwrap_or("warn"));
    let messages = get_messages(Locale::from_str(matches.get_one::<String>("locale").map(String::as_str).unwrap_or("en")));

    let server = matches.get_one::<String>("server").map(String::as_str).unwrap_or("http://localhost:5000");
    let mut ctx = BackendContext::new(Url::parse(server)?);
    registry.apply_matches(&matches, &mut ctx)?;
    let backend = registry.backend(&ctx)?;

    match matches.subcommand() {
        Some(("analyze", m)) => run_analyze(backend, m).await,
        Some(("formats", m)) => run_formats(backend, messages, m).await,
        Some(("download", m)) => run_download(backend, messages, m).await,
        Some(("watch", m)) => {
            let controller = SessionController::new(backend, messages);
            let id = SessionId(m.get_one::<String>("id").cloned().unwrap_or_default());
            let ui = spawn_renderer(&controller, messages);
            controller.attach(id).await?;
            finish(&controller, ui, messages).await
        }
        Some((action @ ("pause" | "resume" | "stop"), m)) => {
            let id = SessionId(m.get_one::<String>("id").cloned().unwrap_or_default());
            match action {
                "pause" => backend.pause(&id).await?,
                "resume" => backend.resume(&id).await?,
                _ => backend.stop(&id).await?,
            }
            println!("{} {}: ok", action, id);
            Ok(())
        }
        Some(("link", m)) => run_link(backend, &ctx, m).await,
        _ => Ok(()),
    }
}

async fn run_analyze(backend: Arc<dyn MediaBackend>, m: &ArgMatches) -> anyhow::Result<()> {
    let url = m.get_one::<String>("url").cloned().unwrap_or_default();
    match backend.analyze(&url).await? {
        MediaInfo::Video { title, channel, duration, thumbnail } => {
            println!("Title:     {}", title);
            println!("Channel:   {}", channel.as_deref().unwrap_or("Unknown Channel"));
            println!("Duration:  {}", duration.as_deref().unwrap_or("0:00"));
            if let Some(t) = thumbnail {
                println!("Thumbnail: {}", t);
            }
        }
        MediaInfo::Playlist { title, video_count } => {
            println!("Playlist:  {}", title);
            println!("Videos:    {}", video_count.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()));
        }
    }
    Ok(())
}

fn confidence_icon(c: Confidence) -> &'static str {
    match c {
        Confidence::High => "✓",
        Confidence::Medium => "~",
        Confidence::Low | Confidence::Unknown => "?",
    }
}

fn describe_verdict(m: &Messages, verdict: &FeasibilityVerdict) -> String {
    match verdict.status {
        FeasibilityStatus::Ok => format!("{}: {}", m.space_ok, format_bytes(verdict.space_after_bytes)),
        FeasibilityStatus::LowSpaceWarning => {
            format!("{} ({} remaining)", m.space_low, format_bytes(verdict.space_after_bytes))
        }
        FeasibilityStatus::Insufficient => {
            format!("{} (short by {})", m.space_insufficient, format_bytes(-verdict.space_after_bytes))
        }
    }
}

async fn run_formats(backend: Arc<dyn MediaBackend>, messages: &'static Messages, m: &ArgMatches) -> anyhow::Result<()> {
    let url = m.get_one::<String>("url").cloned().unwrap_or_default();
    let dest = m.get_one::<String>("dest").cloned().unwrap_or_default();
    let format = format_from(m);

    let estimates = Estimator::new(backend).estimate(&url, &dest).await?;
    for f in &estimates.formats {
        let size = f.size_display.clone().unwrap_or_else(|| format_size(f.size_bytes));
        let marker = if f.format_selector == format { "*" } else { " " };
        println!(
            "{} {} {:<32} {}{}",
            marker,
            confidence_icon(f.confidence),
            f.format_selector,
            size,
            if f.estimated { " (estimated)" } else { "" }
        );
    }
    match &estimates.storage {
        Some(s) => {
            let usage = s.usage_percent.map(|p| format!("{:.1}% used", p)).unwrap_or_else(|| "Unknown usage".to_string());
            println!("Storage {}: {} free of {} ({})", s.destination, format_size(s.free_bytes), format_size(s.total_bytes), usage);
            let verdict = evaluate(&format, &estimates.formats, s);
            println!("{}", describe_verdict(messages, &verdict));
        }
        None => println!("{}", messages.size_unknown_hint),
    }
    Ok(())
}

async fn run_download(backend: Arc<dyn MediaBackend>, messages: &'static Messages, m: &ArgMatches) -> anyhow::Result<()> {
    let url = m.get_one::<String>("url").cloned().unwrap_or_default();
    let dest = m.get_one::<String>("dest").cloned().unwrap_or_default();
    let kind = if m.get_flag("playlist") {
        DownloadKind::Playlist {
            download_type: m.get_one::<String>("download_type").cloned().unwrap_or_else(|| "individual".to_string()),
        }
    } else {
        DownloadKind::Single
    };

    let controller = SessionController::new(backend.clone(), messages);
    let estimator = Estimator::new(backend);
    let mut intents = IntentLoop::new(controller.clone(), estimator, url).require_space(m.get_flag("require_space"));

    intents.handle(Intent::SetDestination(dest)).await?;
    intents.handle(Intent::SelectFormat(format_from(m))).await?;
    match intents.verdict() {
        Some(v) => eprintln!("{}", describe_verdict(messages, &v)),
        None => eprintln!("{}", messages.size_unknown_hint),
    }

    let ui = spawn_renderer(&controller, messages);
    let handle = intents.handle(Intent::Submit { options: options_from(m), kind }).await?;
    if let Some(h) = handle {
        eprintln!("download id: {}  ({})", h.id, messages.controls_hint);
    }

    let (tx, rx) = mpsc::channel(16);
    spawn_keyboard(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Intent::Stop).await;
        }
    });
    tokio::spawn(intents.run(rx));

    finish(&controller, ui, messages).await
}

/// Lines typed on stdin become control intents. Runs on its own thread since
/// stdin reads block.
fn spawn_keyboard(tx: mpsc::Sender<Intent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let intent = match line.trim().to_ascii_lowercase().as_str() {
                "p" | "pause" => Intent::Pause,
                "r" | "resume" => Intent::Resume,
                "s" | "stop" => Intent::Stop,
                _ => continue,
            };
            if tx.blocking_send(intent).is_err() {
                break;
            }
        }
    });
}

fn spawn_renderer(controller: &SessionController, messages: &'static Messages) -> tokio::task::JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let pb = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}") {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));

        loop {
            let evt = match rx.recv().await {
                Ok(e) => e,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            };
            match evt {
                SessionEvent::Updated { session, .. } => {
                    pb.set_position(session.progress_percent.round() as u64);
                    let label = match session.affordance() {
                        Affordance::Pause => messages.pause_label,
                        Affordance::Resume => messages.resume_label,
                    };
                    let mut msg = format!(
                        "{} | {} | {} | ETA {} | [{}]",
                        session.message.as_deref().unwrap_or(messages.for_status(session.status)),
                        session.speed.as_deref().unwrap_or(messages.speed_unknown),
                        session.size_label.as_deref().unwrap_or(messages.size_unknown),
                        session.eta_label.as_deref().unwrap_or(messages.eta_unknown),
                        label,
                    );
                    if session.low_space_during_download() {
                        msg.push_str(" | ");
                        msg.push_str(messages.low_space_during);
                    }
                    pb.set_message(msg);
                }
                SessionEvent::StatusChanged { from, to, .. } => {
                    pb.println(format!("[status] {:?} -> {:?}", from, to));
                }
                SessionEvent::ProgressCorrected { from, to, .. } => {
                    pb.println(format!("[progress] {:.1}% -> {:.1}%", from, to));
                }
                SessionEvent::AffordanceChanged { affordance, .. } => {
                    let label = match affordance {
                        Affordance::Pause => messages.pause_label,
                        Affordance::Resume => messages.resume_label,
                    };
                    pb.println(format!("[control] {}", label));
                }
                SessionEvent::Error { scope, message } => {
                    pb.println(format!("[error] {}: {}", scope, message));
                }
                SessionEvent::MonitorFinished { status, .. } => {
                    pb.finish_with_message(messages.for_status(status).to_string());
                    break;
                }
                SessionEvent::PollFailed { .. } | SessionEvent::Estimates { .. } | SessionEvent::Feasibility { .. } => {}
            }
        }
    })
}

async fn finish(
    controller: &SessionController,
    ui: tokio::task::JoinHandle<()>,
    messages: &'static Messages,
) -> anyhow::Result<()> {
    let fin = controller.wait().await;
    let _ = ui.await;

    match fin {
        Some(s) if s.status == SessionStatus::Completed => {
            println!("{}", s.message.as_deref().unwrap_or(messages.completed));
            Ok(())
        }
        Some(s) if s.status == SessionStatus::Stopped => {
            println!("{}", messages.stopped);
            Ok(())
        }
        Some(s) => anyhow::bail!("{}", s.message.unwrap_or_else(|| messages.failed.to_string())),
        None => Ok(()),
    }
}

async fn run_link(backend: Arc<dyn MediaBackend>, ctx: &BackendContext, m: &ArgMatches) -> anyhow::Result<()> {
    let url = m.get_one::<String>("url").cloned().unwrap_or_default();
    let out_dir: PathBuf = m.get_one::<String>("out_dir").cloned().unwrap_or_else(|| "./downloads".to_string()).into();

    let link = backend.stream_link(&url, &format_from(m), &options_from(m)).await?;
    eprintln!("saving {} from {}", link.filename, link.download_url);

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
    ) {
        pb.set_style(style);
    }
    let path = crate::plugins::http::fetch::save_stream(ctx, &link, &out_dir, &pb).await?;
    pb.finish_and_clear();
    println!("saved {}", path.display());
    Ok(())
}

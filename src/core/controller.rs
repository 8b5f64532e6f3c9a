use crate::core::error::{ClientError, ClientResult};
use crate::core::events::SessionEvent;
use crate::core::model::*;
use crate::core::pacing::PollPacing;
use crate::i18n::Messages;
use crate::plugins::registry::MediaBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

struct ActiveSession {
    local: Uuid,
    session: DownloadSession,
    /// Highest poll sequence applied so far; older answers are dropped.
    applied_seq: u64,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    done_tx: watch::Sender<bool>,
}

impl ActiveSession {
    fn new(local: Uuid, session: DownloadSession) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            local,
            session,
            applied_seq: 0,
            cancel: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            done_tx,
        }
    }

    fn is_busy(&self) -> bool {
        !self.session.status.is_terminal() && !*self.done_tx.borrow()
    }

    fn stop_monitoring(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    fn matches(&self, id: &SessionId) -> bool {
        self.session.id.as_ref() == Some(id)
    }
}

/// Holds the slot claimed by an in-flight submission. If the submitting
/// future is dropped before the backend answers, the placeholder is marked
/// failed so the slot can be claimed again.
struct PendingClaim {
    active: Arc<Mutex<Option<ActiveSession>>>,
    event_tx: broadcast::Sender<SessionEvent>,
    local: Uuid,
    message: &'static str,
    armed: bool,
}

impl PendingClaim {
    fn disarm(mut self) {
        self.armed = false;
    }
}

fn abandon_pending(
    slot: &mut Option<ActiveSession>,
    local: Uuid,
    message: &str,
    event_tx: &broadcast::Sender<SessionEvent>,
) {
    let Some(a) = slot.as_mut().filter(|a| a.local == local) else { return };
    if a.session.status.is_terminal() || *a.done_tx.borrow() {
        return;
    }
    let from = a.session.status;
    a.session.status = SessionStatus::Error;
    a.session.message = Some(message.to_string());
    a.stop_monitoring();
    a.done_tx.send_replace(true);
    warn!(%local, "submission abandoned before the backend answered");
    let _ = event_tx.send(SessionEvent::StatusChanged { local, from, to: SessionStatus::Error });
    let _ = event_tx.send(SessionEvent::Updated { local, session: a.session.clone() });
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.active.try_lock() {
            Ok(mut slot) => abandon_pending(&mut slot, self.local, self.message, &self.event_tx),
            Err(_) => {
                let Ok(rt) = tokio::runtime::Handle::try_current() else { return };
                let (active, event_tx, local, message) =
                    (self.active.clone(), self.event_tx.clone(), self.local, self.message);
                rt.spawn(async move {
                    let mut slot = active.lock().await;
                    abandon_pending(&mut slot, local, message, &event_tx);
                });
            }
        }
    }
}

enum Applied {
    Continue { progress: f64, status: SessionStatus },
    Stale,
    Terminal,
    Detached,
}

/// Owns the lifecycle of at most one download at a time: submit, poll, and the
/// pause/resume/stop intents. Observers follow along through [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct SessionController {
    backend: Arc<dyn MediaBackend>,
    messages: &'static Messages,
    event_tx: broadcast::Sender<SessionEvent>,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn MediaBackend>, messages: &'static Messages) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { backend, messages, event_tx, active: Arc::new(Mutex::new(None)) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    pub async fn snapshot(&self) -> Option<DownloadSession> {
        self.active.lock().await.as_ref().map(|a| a.session.clone())
    }

    fn validate(&self, req: &DownloadRequest) -> ClientResult<()> {
        if req.destination.trim().is_empty() {
            return Err(ClientError::Validation(self.messages.choose_folder.to_string()));
        }
        if req.format.trim().is_empty() {
            return Err(ClientError::Validation("Please select a format".to_string()));
        }
        if req.url.trim().is_empty() {
            return Err(ClientError::Validation("URL is required".to_string()));
        }
        Url::parse(req.url.trim()).map_err(|e| ClientError::Validation(format!("invalid URL {}: {}", req.url, e)))?;
        Ok(())
    }

    /// Reserves the single session slot. A finished session is replaced.
    async fn claim(&self, session: DownloadSession) -> ClientResult<Uuid> {
        let mut slot = self.active.lock().await;
        if let Some(a) = slot.as_ref() {
            if a.is_busy() {
                return Err(ClientError::Validation("a download is already in progress".to_string()));
            }
        }
        let local = Uuid::new_v4();
        *slot = Some(ActiveSession::new(local, session));
        Ok(local)
    }

    pub async fn submit(&self, req: DownloadRequest) -> ClientResult<SessionHandle> {
        self.validate(&req)?;

        let mut pending = DownloadSession::preparing(SessionId(String::new()));
        pending.id = None;
        pending.message = Some(self.messages.preparing.to_string());
        let local = self.claim(pending).await?;
        let guard = PendingClaim {
            active: self.active.clone(),
            event_tx: self.event_tx.clone(),
            local,
            message: self.messages.failed,
            armed: true,
        };

        match self.backend.submit(&req).await {
            Ok(id) => {
                info!(download_id = %id, url = %req.url, format = %req.format, "download submitted");
                let session = {
                    let mut slot = self.active.lock().await;
                    let a = slot.as_mut().filter(|a| a.local == local).ok_or_else(|| {
                        ClientError::Validation("session was discarded during submission".to_string())
                    })?;
                    a.session.id = Some(id.clone());
                    a.session.clone()
                };
                let _ = self.event_tx.send(SessionEvent::Updated { local, session });
                self.spawn_monitor(local, id.clone()).await;
                guard.disarm();
                Ok(SessionHandle { local, id })
            }
            Err(e) => {
                warn!(error = %e, url = %req.url, "submission rejected");
                let message = match &e {
                    ClientError::Backend(m) if !m.is_empty() => m.clone(),
                    _ => self.messages.failed.to_string(),
                };
                let session = DownloadSession::rejected(message);
                {
                    let mut slot = self.active.lock().await;
                    if let Some(a) = slot.as_mut().filter(|a| a.local == local) {
                        a.session = session.clone();
                        a.done_tx.send_replace(true);
                    }
                }
                guard.disarm();
                let _ = self.event_tx.send(SessionEvent::StatusChanged {
                    local,
                    from: SessionStatus::Preparing,
                    to: SessionStatus::Error,
                });
                let _ = self.event_tx.send(SessionEvent::Updated { local, session });
                Err(e)
            }
        }
    }

    /// Starts monitoring a job that was submitted elsewhere.
    pub async fn attach(&self, id: SessionId) -> ClientResult<SessionHandle> {
        if id.0.trim().is_empty() {
            return Err(ClientError::Validation("download id is required".to_string()));
        }
        let mut session = DownloadSession::preparing(id.clone());
        session.message = Some(self.messages.preparing.to_string());
        let local = self.claim(session.clone()).await?;
        info!(download_id = %id, "attached to download");
        let _ = self.event_tx.send(SessionEvent::Updated { local, session });
        self.spawn_monitor(local, id.clone()).await;
        Ok(SessionHandle { local, id })
    }

    async fn spawn_monitor(&self, local: Uuid, id: SessionId) {
        let (cancel, cancelled) = {
            let slot = self.active.lock().await;
            match slot.as_ref().filter(|a| a.local == local) {
                Some(a) => (a.cancel.clone(), a.cancelled.clone()),
                None => return,
            }
        };
        let this = self.clone();
        tokio::spawn(async move {
            this.monitor(local, id, cancel, cancelled).await;
        });
    }

    async fn monitor(&self, local: Uuid, id: SessionId, cancel: Arc<Notify>, cancelled: Arc<AtomicBool>) {
        let mut pacing = PollPacing::new();
        let mut seq = 0u64;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            seq += 1;

            let wait = match self.backend.progress(&id).await {
                Ok(report) => {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    match self.apply_report(local, seq, report).await {
                        Applied::Continue { progress, status } => pacing.observe(progress, status),
                        Applied::Stale => pacing.after_error(),
                        Applied::Terminal | Applied::Detached => break,
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(download_id = %id, error = %e, "progress poll failed; retrying");
                    let _ = self.event_tx.send(SessionEvent::PollFailed { local, message: e.to_string() });
                    pacing.after_error()
                }
                Err(e) => {
                    error!(download_id = %id, error = %e, "progress poll cannot succeed as issued");
                    let _ = self.event_tx.send(SessionEvent::Error { scope: "poll".to_string(), message: e.to_string() });
                    pacing.after_error()
                }
            };

            debug!(
                download_id = %id,
                interval_ms = pacing.interval_ms(),
                stale_reads = pacing.consecutive_stale_reads(),
                wait_ms = wait.as_millis() as u64,
                "next poll scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.notified() => break,
            }
        }

        self.finish_monitor(local).await;
    }

    async fn finish_monitor(&self, local: Uuid) {
        let status = {
            let slot = self.active.lock().await;
            match slot.as_ref().filter(|a| a.local == local) {
                Some(a) => {
                    a.done_tx.send_replace(true);
                    Some(a.session.status)
                }
                None => None,
            }
        };
        if let Some(status) = status {
            debug!(%local, ?status, "monitoring finished");
            let _ = self.event_tx.send(SessionEvent::MonitorFinished { local, status });
        }
    }

    async fn apply_report(&self, local: Uuid, seq: u64, report: ProgressReport) -> Applied {
        let mut events = Vec::new();
        let outcome = {
            let mut slot = self.active.lock().await;
            let a = match slot.as_mut().filter(|a| a.local == local) {
                Some(a) => a,
                None => return Applied::Detached,
            };
            if seq <= a.applied_seq {
                return Applied::Stale;
            }
            a.applied_seq = seq;

            let s = &mut a.session;
            if s.status.is_terminal() {
                return Applied::Terminal;
            }

            let prev = s.status;
            let next = report.status.session_status().unwrap_or(prev);
            let reported = report.progress.map(|p| p.clamp(0.0, 100.0));

            if let Some(p) = reported {
                if prev == SessionStatus::Downloading && next == SessionStatus::Downloading && p < s.progress_percent {
                    events.push(SessionEvent::ProgressCorrected { local, from: s.progress_percent, to: p });
                }
                s.progress_percent = p;
            }
            if report.speed.is_some() {
                s.speed = report.speed;
            }
            if report.size.is_some() {
                s.size_label = report.size;
            }
            if report.eta.is_some() {
                s.eta_label = report.eta;
            }
            if report.remaining_space_bytes.is_some() {
                s.remaining_space_bytes = report.remaining_space_bytes;
            }
            s.message = Some(
                report
                    .message
                    .unwrap_or_else(|| self.messages.for_wire_status(&report.status).to_string()),
            );

            let was_paused = s.is_paused;
            if next == SessionStatus::Paused && prev != SessionStatus::Paused {
                s.is_paused = true;
            } else if prev == SessionStatus::Paused && next == SessionStatus::Downloading {
                s.is_paused = false;
            }
            if s.is_paused != was_paused {
                events.push(SessionEvent::AffordanceChanged { local, affordance: s.affordance() });
            }

            s.status = next;
            if next != prev {
                info!(download_id = ?s.id, from = ?prev, to = ?next, "status changed");
                events.push(SessionEvent::StatusChanged { local, from: prev, to: next });
            }
            events.push(SessionEvent::Updated { local, session: s.clone() });

            if next.is_terminal() {
                Applied::Terminal
            } else {
                Applied::Continue { progress: reported.unwrap_or(0.0), status: next }
            }
        };

        for e in events {
            let _ = self.event_tx.send(e);
        }
        outcome
    }

    /// Looks up the running session for a control intent.
    async fn controllable(&self, id: &SessionId) -> ClientResult<Uuid> {
        let slot = self.active.lock().await;
        match slot.as_ref() {
            Some(a) if a.matches(id) && !a.session.status.is_terminal() => Ok(a.local),
            _ => Err(ClientError::NotFound(id.0.clone())),
        }
    }

    /// Flips the pause flag and announces the new affordance. Returns the
    /// previous value.
    async fn set_paused(&self, local: Uuid, paused: bool) -> Option<bool> {
        let (prev, affordance) = {
            let mut slot = self.active.lock().await;
            let a = slot.as_mut().filter(|a| a.local == local)?;
            let prev = a.session.is_paused;
            a.session.is_paused = paused;
            (prev, a.session.affordance())
        };
        if prev != paused {
            let _ = self.event_tx.send(SessionEvent::AffordanceChanged { local, affordance });
        }
        Some(prev)
    }

    /// Status is left to the next poll; only the offered control flips.
    pub async fn pause(&self, id: &SessionId) -> ClientResult<()> {
        let local = self.controllable(id).await?;
        let prev = self.set_paused(local, true).await.unwrap_or(false);
        match self.backend.pause(id).await {
            Ok(()) => {
                info!(download_id = %id, "pause confirmed");
                Ok(())
            }
            Err(e) => {
                warn!(download_id = %id, error = %e, "pause rejected");
                self.set_paused(local, prev).await;
                Err(e)
            }
        }
    }

    pub async fn resume(&self, id: &SessionId) -> ClientResult<()> {
        let local = self.controllable(id).await?;
        let prev = self.set_paused(local, false).await.unwrap_or(true);
        match self.backend.resume(id).await {
            Ok(()) => {
                info!(download_id = %id, "resume confirmed");
                Ok(())
            }
            Err(e) => {
                warn!(download_id = %id, error = %e, "resume rejected");
                self.set_paused(local, prev).await;
                Err(e)
            }
        }
    }

    pub async fn stop(&self, id: &SessionId) -> ClientResult<()> {
        let local = self.controllable(id).await?;
        {
            let mut slot = self.active.lock().await;
            if let Some(a) = slot.as_mut().filter(|a| a.local == local) {
                a.session.is_stop_requested = true;
            }
        }

        if let Err(e) = self.backend.stop(id).await {
            warn!(download_id = %id, error = %e, "stop rejected");
            let mut slot = self.active.lock().await;
            if let Some(a) = slot.as_mut().filter(|a| a.local == local) {
                a.session.is_stop_requested = false;
            }
            return Err(e);
        }

        info!(download_id = %id, "stop confirmed");
        let changed = {
            let mut slot = self.active.lock().await;
            match slot.as_mut().filter(|a| a.local == local) {
                Some(a) => {
                    let from = a.session.status;
                    if !from.is_terminal() {
                        a.session.status = SessionStatus::Stopped;
                        a.session.message = Some(self.messages.stopped.to_string());
                    }
                    a.stop_monitoring();
                    Some((from, a.session.clone()))
                }
                None => None,
            }
        };
        if let Some((from, session)) = changed {
            if from != session.status {
                let _ = self.event_tx.send(SessionEvent::StatusChanged { local, from, to: session.status });
            }
            let _ = self.event_tx.send(SessionEvent::Updated { local, session });
        }
        Ok(())
    }

    /// Waits until the monitor of the current session exits and returns the
    /// final snapshot.
    pub async fn wait(&self) -> Option<DownloadSession> {
        let mut rx = {
            let slot = self.active.lock().await;
            slot.as_ref()?.done_tx.subscribe()
        };
        let _ = rx.wait_for(|done| *done).await;
        self.snapshot().await
    }

    /// Drops the local session without touching the backend job. Monitoring
    /// ends at its next suspension point.
    pub async fn discard(&self) {
        let mut slot = self.active.lock().await;
        if let Some(a) = slot.take() {
            a.stop_monitoring();
            a.done_tx.send_replace(true);
        }
    }
}

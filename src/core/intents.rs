use crate::core::controller::SessionController;
use crate::core::error::{ClientError, ClientResult};
use crate::core::estimator::Estimator;
use crate::core::events::SessionEvent;
use crate::core::feasibility::{evaluate, FeasibilityStatus, FeasibilityVerdict};
use crate::core::model::{DownloadKind, DownloadOptions, DownloadRequest, FormatEstimates, SessionHandle, SessionId};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// User intents pushed by a front end.
#[derive(Debug, Clone)]
pub enum Intent {
    Submit { options: DownloadOptions, kind: DownloadKind },
    Pause,
    Resume,
    Stop,
    SelectFormat(String),
    SetDestination(String),
}

/// Owns what the user has picked so far (format, destination) and keeps the
/// estimate and feasibility verdict in step with it.
pub struct IntentLoop {
    controller: SessionController,
    estimator: Estimator,
    events: broadcast::Sender<SessionEvent>,
    media_url: String,
    format: String,
    destination: String,
    estimates: Option<FormatEstimates>,
    verdict: Option<FeasibilityVerdict>,
    /// Refuse to submit when the verdict says the file cannot fit.
    require_space: bool,
}

impl IntentLoop {
    pub fn new(controller: SessionController, estimator: Estimator, media_url: impl Into<String>) -> Self {
        let events = controller.events();
        Self {
            controller,
            estimator,
            events,
            media_url: media_url.into(),
            format: String::new(),
            destination: String::new(),
            estimates: None,
            verdict: None,
            require_space: false,
        }
    }

    pub fn require_space(mut self, on: bool) -> Self {
        self.require_space = on;
        self
    }

    pub fn verdict(&self) -> Option<FeasibilityVerdict> {
        self.verdict
    }

    pub fn estimates(&self) -> Option<&FormatEstimates> {
        self.estimates.as_ref()
    }

    async fn refresh_estimates(&mut self) {
        self.estimates = if self.destination.trim().is_empty() {
            None
        } else {
            self.estimator.estimate_or_unknown(&self.media_url, &self.destination).await
        };
        let _ = self.events.send(SessionEvent::Estimates { estimates: self.estimates.clone() });
    }

    fn reevaluate(&mut self) {
        self.verdict = match &self.estimates {
            Some(FormatEstimates { formats, storage: Some(storage) }) if !self.format.is_empty() => {
                Some(evaluate(&self.format, formats, storage))
            }
            _ => None,
        };
        debug!(format = %self.format, verdict = ?self.verdict, "feasibility re-evaluated");
        let _ = self.events.send(SessionEvent::Feasibility { format: self.format.clone(), verdict: self.verdict });
    }

    async fn current_id(&self) -> ClientResult<SessionId> {
        self.controller
            .snapshot()
            .await
            .and_then(|s| s.id)
            .ok_or_else(|| ClientError::NotFound("no active download".to_string()))
    }

    pub async fn handle(&mut self, intent: Intent) -> ClientResult<Option<SessionHandle>> {
        match intent {
            Intent::SetDestination(dest) => {
                self.destination = dest.trim().to_string();
                self.refresh_estimates().await;
                self.reevaluate();
            }
            Intent::SelectFormat(format) => {
                self.format = format.trim().to_string();
                if self.estimates.is_none() && !self.destination.is_empty() {
                    self.refresh_estimates().await;
                }
                self.reevaluate();
            }
            Intent::Submit { options, kind } => {
                if self.require_space
                    && matches!(self.verdict, Some(v) if v.status == FeasibilityStatus::Insufficient)
                {
                    return Err(ClientError::Validation("Insufficient disk space for the selected format".to_string()));
                }
                let req = DownloadRequest {
                    url: self.media_url.clone(),
                    format: self.format.clone(),
                    options,
                    destination: self.destination.clone(),
                    kind,
                };
                return self.controller.submit(req).await.map(Some);
            }
            Intent::Pause => {
                let id = self.current_id().await?;
                self.controller.pause(&id).await?;
            }
            Intent::Resume => {
                let id = self.current_id().await?;
                self.controller.resume(&id).await?;
            }
            Intent::Stop => {
                let id = self.current_id().await?;
                self.controller.stop(&id).await?;
            }
        }
        Ok(None)
    }

    /// Drains intents until every sender is dropped. Failures are reported as
    /// events rather than ending the loop.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Intent>) {
        while let Some(intent) = rx.recv().await {
            let scope = format!("{:?}", intent);
            if let Err(e) = self.handle(intent).await {
                warn!(%scope, error = %e, "intent failed");
                let _ = self.events.send(SessionEvent::Error { scope, message: e.to_string() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SessionStatus;
    use crate::core::testing::{report, ScriptedBackend};
    use crate::i18n::EN;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<ScriptedBackend>, IntentLoop) {
        let backend = Arc::new(ScriptedBackend::new());
        let ctl = SessionController::new(backend.clone(), &EN);
        let est = Estimator::new(backend.clone());
        (backend, IntentLoop::new(ctl, est, "https://www.youtube.com/watch?v=x"))
    }

    #[tokio::test]
    async fn destination_and_format_drive_the_verdict() {
        let (backend, mut lp) = setup();
        lp.handle(Intent::SelectFormat("best".to_string())).await.unwrap();
        assert_eq!(lp.verdict(), None);
        assert_eq!(backend.calls_to("analyze_formats"), 0);

        lp.handle(Intent::SetDestination("/media".to_string())).await.unwrap();
        let v = lp.verdict().unwrap();
        assert_eq!(v.status, FeasibilityStatus::Insufficient);
        assert_eq!(v.space_after_bytes, -100_000_000);

        lp.handle(Intent::SelectFormat("best[height<=720]".to_string())).await.unwrap();
        assert_eq!(lp.verdict().unwrap().status, FeasibilityStatus::Ok);
        assert_eq!(backend.calls_to("analyze_formats"), 1);

        lp.handle(Intent::SetDestination("/other".to_string())).await.unwrap();
        assert_eq!(backend.calls_to("analyze_formats"), 2);
        assert_eq!(lp.estimates().unwrap().storage.as_ref().unwrap().destination, "/other");
    }

    #[tokio::test]
    async fn estimator_failure_leaves_verdict_unknown() {
        let (backend, mut lp) = setup();
        backend.fail_estimates(ClientError::Backend("yt-dlp crashed".to_string()));
        lp.handle(Intent::SelectFormat("best".to_string())).await.unwrap();
        lp.handle(Intent::SetDestination("/media".to_string())).await.unwrap();
        assert_eq!(lp.verdict(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_space_is_advisory_by_default() {
        let (backend, mut lp) = setup();
        backend.push_progress(Ok(report("completed", 100.0)));
        lp.handle(Intent::SetDestination("/media".to_string())).await.unwrap();
        lp.handle(Intent::SelectFormat("best".to_string())).await.unwrap();
        let handle = lp
            .handle(Intent::Submit { options: DownloadOptions::default(), kind: DownloadKind::Single })
            .await
            .unwrap();
        assert!(handle.is_some());
        let sent = backend.submitted();
        assert_eq!(sent[0].destination, "/media");
        assert_eq!(sent[0].format, "best");
    }

    #[tokio::test]
    async fn require_space_blocks_insufficient_submission() {
        let (backend, lp) = setup();
        let mut lp = lp.require_space(true);
        lp.handle(Intent::SetDestination("/media".to_string())).await.unwrap();
        lp.handle(Intent::SelectFormat("best".to_string())).await.unwrap();
        let err = lp
            .handle(Intent::Submit { options: DownloadOptions::default(), kind: DownloadKind::Single })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(backend.calls_to("submit"), 0);
    }

    #[tokio::test]
    async fn submit_without_destination_is_a_validation_error() {
        let (backend, mut lp) = setup();
        lp.handle(Intent::SelectFormat("best".to_string())).await.unwrap();
        let err = lp
            .handle(Intent::Submit { options: DownloadOptions::default(), kind: DownloadKind::Single })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_forwards_controls_and_reports_failures() {
        let (backend, lp) = setup();
        backend.push_progress(Ok(report("downloading", 12.0)));
        let ctl = lp.controller.clone();
        let mut events = ctl.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(lp.run(rx));

        tx.send(Intent::Pause).await.unwrap();
        tx.send(Intent::SetDestination("/media".to_string())).await.unwrap();
        tx.send(Intent::SelectFormat("best".to_string())).await.unwrap();
        tx.send(Intent::Submit { options: DownloadOptions::default(), kind: DownloadKind::Single }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(Intent::Stop).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(ctl.wait().await.unwrap().status, SessionStatus::Stopped);
        assert_eq!(backend.calls_to("pause"), 0);
        assert_eq!(backend.calls_to("stop"), 1);

        let mut errors = 0;
        while let Ok(e) = events.try_recv() {
            if let SessionEvent::Error { scope, .. } = e {
                assert_eq!(scope, "Pause");
                errors += 1;
            }
        }
        assert_eq!(errors, 1);
    }
}

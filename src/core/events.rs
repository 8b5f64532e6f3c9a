use crate::core::feasibility::FeasibilityVerdict;
use crate::core::model::{Affordance, DownloadSession, FormatEstimates, SessionStatus};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusChanged { local: Uuid, from: SessionStatus, to: SessionStatus },
    /// Fresh snapshot after every applied poll or confirmed intent.
    Updated { local: Uuid, session: DownloadSession },
    /// Progress went backwards while downloading (e.g. next playlist item).
    ProgressCorrected { local: Uuid, from: f64, to: f64 },
    AffordanceChanged { local: Uuid, affordance: Affordance },
    PollFailed { local: Uuid, message: String },
    MonitorFinished { local: Uuid, status: SessionStatus },
    Estimates { estimates: Option<FormatEstimates> },
    Feasibility { format: String, verdict: Option<FeasibilityVerdict> },
    Error { scope: String, message: String },
}

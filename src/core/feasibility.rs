use crate::core::model::{FormatSizeEstimate, StorageSnapshot};

pub const LOW_SPACE_THRESHOLD_BYTES: i64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeasibilityStatus {
    Ok,
    LowSpaceWarning,
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeasibilityVerdict {
    pub status: FeasibilityStatus,
    pub space_after_bytes: i64,
}

/// Advisory only: nothing here stops a submission.
///
/// A missing estimate (or a size of 0) counts as "no opinion" and leaves the
/// free space untouched.
pub fn evaluate(
    selected_format: &str,
    estimates: &[FormatSizeEstimate],
    storage: &StorageSnapshot,
) -> FeasibilityVerdict {
    let size = estimates
        .iter()
        .find(|e| e.format_selector == selected_format)
        .map(|e| e.size_bytes)
        .unwrap_or(0);

    let free = i64::try_from(storage.free_bytes).unwrap_or(i64::MAX);
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    let space_after_bytes = free.saturating_sub(size);

    let status = if space_after_bytes < 0 {
        FeasibilityStatus::Insufficient
    } else if space_after_bytes < LOW_SPACE_THRESHOLD_BYTES {
        FeasibilityStatus::LowSpaceWarning
    } else {
        FeasibilityStatus::Ok
    };

    FeasibilityVerdict { status, space_after_bytes }
}

//! Communication health monitor
//!
//! Any received line marks the link healthy. Silence longer than the warning
//! timeout degrades it to `Warning`, longer than the error timeout to `Error`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Link health as seen from received traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommsStatus {
    /// Monitor not running
    #[default]
    Stopped,
    /// Traffic seen within the warning timeout
    Ok,
    /// Quiet for longer than the warning timeout
    Warning,
    /// Quiet for longer than the error timeout
    Error,
}

impl CommsStatus {
    /// Whether the device counts as online
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }
}

/// Tracks time since the last received line
#[derive(Debug)]
pub struct CommsMonitor {
    warning_after: Duration,
    error_after: Duration,
    started_at: Option<Instant>,
    last_activity: Option<Instant>,
    status: CommsStatus,
}

impl CommsMonitor {
    /// Create a stopped monitor
    pub fn new(warning_after: Duration, error_after: Duration) -> Self {
        Self {
            warning_after,
            error_after,
            started_at: None,
            last_activity: None,
            status: CommsStatus::Stopped,
        }
    }

    /// Start timing from `now`; the link starts in `Warning` until traffic is seen
    pub fn start(&mut self, now: Instant) -> Option<CommsStatus> {
        if self.started_at.is_some() {
            return None;
        }
        self.started_at = Some(now);
        self.last_activity = None;
        self.set(CommsStatus::Warning)
    }

    /// Stop monitoring
    pub fn stop(&mut self) -> Option<CommsStatus> {
        self.started_at = None;
        self.last_activity = None;
        self.set(CommsStatus::Stopped)
    }

    /// A line was received; returns the new status if it changed
    pub fn record_activity(&mut self, now: Instant) -> Option<CommsStatus> {
        if self.started_at.is_none() {
            return None;
        }
        self.last_activity = Some(now);
        self.set(CommsStatus::Ok)
    }

    /// Re-evaluate at `now`; returns the new status if it changed
    pub fn evaluate(&mut self, now: Instant) -> Option<CommsStatus> {
        let started = self.started_at?;
        let quiet = now.saturating_duration_since(self.last_activity.unwrap_or(started));

        let status = if quiet >= self.error_after {
            CommsStatus::Error
        } else if quiet >= self.warning_after || self.last_activity.is_none() {
            CommsStatus::Warning
        } else {
            CommsStatus::Ok
        };
        self.set(status)
    }

    /// Current status
    pub fn status(&self) -> CommsStatus {
        self.status
    }

    fn set(&mut self, status: CommsStatus) -> Option<CommsStatus> {
        if self.status == status {
            return None;
        }
        self.status = status;
        Some(status)
    }
}

//! Audit trail collaborator

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Package accepted
    Uploaded,
    /// Package target changed
    Promoted,
    /// Package removed
    Deleted,
    /// Stored metadata re-derived from the original archive
    MetadataRefreshed,
    /// Feeds regenerated on request
    FeedsRebuilt,
    /// Submitted signature failed verification
    TrustFailure,
    /// Actor lacked a capability
    PermissionDenied,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uploaded => "uploaded",
            Self::Promoted => "promoted",
            Self::Deleted => "deleted",
            Self::MetadataRefreshed => "metadata-refreshed",
            Self::FeedsRebuilt => "feeds-rebuilt",
            Self::TrustFailure => "trust-failure",
            Self::PermissionDenied => "permission-denied",
        };
        f.write_str(name)
    }
}

/// One audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub kind: AuditKind,
    /// Package involved, if any
    pub package_id: Option<String>,
    /// Group the action was performed for
    pub group: Option<String>,
    /// Human-readable detail
    pub message: String,
    /// Security-relevant
    pub important: bool,
}

impl AuditEvent {
    /// New event stamped now
    pub fn new(kind: AuditKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            package_id: None,
            group: None,
            message: message.into(),
            important: matches!(kind, AuditKind::TrustFailure | AuditKind::PermissionDenied),
        }
    }

    /// Attach a package identifier
    pub fn with_package(mut self, package_id: impl ToString) -> Self {
        self.package_id = Some(package_id.to_string());
        self
    }

    /// Attach a group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Receiver of audit events
pub trait AuditSink: Send + Sync {
    /// Record one event; must not fail the calling operation
    fn record(&self, event: AuditEvent);
}

/// Emits events on the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.important {
            warn!(
                target: "audit",
                kind = %event.kind,
                package_id = event.package_id.as_deref(),
                group = event.group.as_deref(),
                "{}",
                event.message
            );
        } else {
            info!(
                target: "audit",
                kind = %event.kind,
                package_id = event.package_id.as_deref(),
                group = event.group.as_deref(),
                "{}",
                event.message
            );
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of `kind`
    pub fn events_of(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

//! Community events and user notifications.
//!
//! Both sinks are fire-and-forget from the core's point of view: a failing
//! sink is logged and never aborts the operation that produced the record.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{Page, Paged, RelatedType};
use market_types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Trade,
    Mint,
    Burn,
    AirdropPoints,
}

/// Event payload handed to an [`EventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub kind: EventKind,
    pub user_id: UserId,
    pub description: String,
    pub related: Option<(RelatedType, u64)>,
    pub at: DateTime<Utc>,
}

/// Stored, publicly visible event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityEvent {
    pub id: u64,
    pub event_type: EventKind,
    pub user_id: UserId,
    pub description: String,
    pub related_id: Option<u64>,
    pub related_type: Option<RelatedType>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("sink unavailable: {0}")]
pub struct SinkError(pub String);

/// Append-only community/audit event sink.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn record(&self, event: NewEvent) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Trade,
    Offer,
    Points,
    Asset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub related_id: Option<u64>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        related_id: u64,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            content: content.into(),
            related_id: Some(related_id),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), SinkError>;
}

/// Notifier that only writes the notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: &Notification) -> Result<(), SinkError> {
        info!(
            user_id = n.user_id,
            kind = ?n.kind,
            related_id = ?n.related_id,
            title = %n.title,
            "Notification"
        );
        Ok(())
    }
}

/// In-process community event log.
#[derive(Debug, Default)]
pub struct EventLog {
    rows: Mutex<Vec<CommunityEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first, optionally filtered by kind.
    pub fn list(&self, kind: Option<EventKind>, page: Page) -> Paged<CommunityEvent> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        page.paginate(
            rows.iter()
                .filter(|e| kind.map_or(true, |k| e.event_type == k)),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn record(&self, event: NewEvent) -> Result<(), SinkError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let id = rows.len() as u64 + 1;
        let (related_type, related_id) = match event.related {
            Some((kind, id)) => (Some(kind), Some(id)),
            None => (None, None),
        };
        rows.push(CommunityEvent {
            id,
            event_type: event.kind,
            user_id: event.user_id,
            description: event.description,
            related_id,
            related_type,
            created_at: event.at,
        });
        Ok(())
    }
}

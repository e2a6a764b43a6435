//! Audit trail for ticket lifecycle events.
//!
//! The central authentication service emits one [`AuditEvent`] per operation
//! outcome to an injected [`AuditLogger`]. Ticket ids in events are always
//! sanitized.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Kinds of ticket lifecycle events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A login created a ticket-granting ticket
    TicketGrantingTicketCreated,
    /// A ticket-granting ticket was destroyed (logout)
    TicketGrantingTicketDestroyed,
    /// A service ticket was granted
    ServiceTicketGranted,
    /// A proxy ticket was granted from a proxy-granting ticket
    ProxyTicketGranted,
    /// A proxy-granting ticket was created
    ProxyGrantingTicketCreated,
    /// A service ticket validated successfully
    ServiceTicketValidated,
    /// A request was rejected
    RequestRejected,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    pub event_type: AuditEventType,

    pub timestamp: DateTime<Utc>,

    /// Principal id, or `unknown` when none is resolved yet
    pub actor: String,

    /// Sanitized id of the ticket the event concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Error name for rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Sanitized ids of related tickets (granting ticket, cascaded tickets)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_ids: Option<Vec<String>>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, actor: impl Into<String>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::now_v7().simple()),
            event_type,
            timestamp: Utc::now(),
            actor: actor.into(),
            ticket_id: None,
            service: None,
            error: None,
            details: None,
            related_ids: None,
        }
    }

    /// Rejection event carrying the error's name and message.
    pub fn rejected(actor: impl Into<String>, error: &Error) -> Self {
        Self::new(AuditEventType::RequestRejected, actor)
            .with_error(error.name())
            .with_details(error.to_string())
    }

    pub fn with_ticket(mut self, sanitized_id: impl Into<String>) -> Self {
        self.ticket_id = Some(sanitized_id.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_related(mut self, ids: Vec<String>) -> Self {
        self.related_ids = Some(ids);
        self
    }
}

/// Sink for audit events.
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    fn log(&self, event: AuditEvent);
}

/// Writes events as JSON through `tracing` under the `cas::audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLogger;

impl TracingAuditLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "cas::audit", event_type = ?event.event_type, "{}", json),
            Err(e) => info!(target: "cas::audit", error = %e, "Failed to serialize audit event"),
        }
    }
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _event: AuditEvent) {}
}

/// Keeps events in memory, for tests and embedders that ship events elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain_events(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

//! Ticket registry: resolves ticket ids to live tickets.
//!
//! The registry is the only place tickets are looked up by id. Tickets link to
//! their parents directly, so the registry is never consulted while walking a
//! chain; it only owns reachability from the outside world.

use crate::error::{Error, Result};
use crate::service::Service;
use crate::ticket::{sanitize_ticket_id, ServiceTicket, Ticket, TicketGrantingTicket, TicketId, TicketKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Storage of live tickets.
pub trait TicketRegistry: Send + Sync + fmt::Debug {
    /// Store a ticket, replacing any ticket with the same id.
    fn add_ticket(&self, ticket: Ticket);

    fn get_ticket(&self, id: &str) -> Option<Ticket>;

    /// Remove exactly one ticket without touching its descendants.
    fn delete_single_ticket(&self, id: &str) -> Option<Ticket>;

    /// Snapshot of every stored ticket.
    fn tickets(&self) -> Vec<Ticket>;

    /// Resolve a ticket-granting or proxy-granting ticket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTicket` if the id is unknown or names another kind.
    fn get_ticket_granting_ticket(&self, id: &str) -> Result<Arc<TicketGrantingTicket>> {
        match self.get_ticket(id) {
            Some(Ticket::TicketGranting(t)) | Some(Ticket::ProxyGranting(t)) => Ok(t),
            Some(other) => Err(Error::InvalidTicket(format!(
                "{} is a {} ticket, not a granting ticket",
                sanitize_ticket_id(id),
                other.kind()
            ))),
            None => Err(Error::InvalidTicket(format!(
                "ticket {} not found",
                sanitize_ticket_id(id)
            ))),
        }
    }

    /// Resolve a service or proxy ticket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTicket` if the id is unknown or names another kind.
    fn get_service_ticket(&self, id: &str) -> Result<Arc<ServiceTicket>> {
        match self.get_ticket(id) {
            Some(Ticket::Service(t)) => Ok(t),
            Some(other) => Err(Error::InvalidTicket(format!(
                "{} is a {} ticket, not a service ticket",
                sanitize_ticket_id(id),
                other.kind()
            ))),
            None => Err(Error::InvalidTicket(format!(
                "ticket {} not found",
                sanitize_ticket_id(id)
            ))),
        }
    }

    /// Remove a ticket and, for granting tickets, every service ticket and
    /// proxy-granting ticket issued from it, transitively.
    ///
    /// Returns the number of tickets removed.
    fn delete_ticket(&self, id: &str) -> usize {
        let Some(first) = self.delete_single_ticket(id) else {
            return 0;
        };

        let mut removed = 0;
        let mut pending = vec![first];
        while let Some(ticket) = pending.pop() {
            removed += 1;
            if let Some(granting) = ticket.as_ticket_granting() {
                let children = granting
                    .services()
                    .into_keys()
                    .chain(granting.proxy_granting_tickets());
                pending.extend(children.filter_map(|child| self.delete_single_ticket(child.as_str())));

                if let Some(parent) = granting.parent() {
                    parent.remove_proxy_granting_ticket(granting.id().as_str());
                }
            }
        }

        debug!(ticket_id = %sanitize_ticket_id(id), removed, "Deleted ticket");
        removed
    }

    /// Number of root ticket-granting tickets, i.e. SSO sessions.
    fn session_count(&self) -> usize {
        self.tickets()
            .iter()
            .filter(|t| t.kind() == TicketKind::TicketGranting)
            .count()
    }

    /// Number of service and proxy tickets.
    fn service_ticket_count(&self) -> usize {
        self.tickets()
            .iter()
            .filter(|t| t.kind().is_service())
            .count()
    }
}

/// In-memory registry backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct DefaultTicketRegistry {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
}

impl DefaultTicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tickets: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.tickets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TicketRegistry for DefaultTicketRegistry {
    fn add_ticket(&self, ticket: Ticket) {
        debug!(ticket_id = %ticket.id().sanitized(), kind = %ticket.kind(), "Adding ticket");
        self.tickets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ticket.id().clone(), ticket);
    }

    fn get_ticket(&self, id: &str) -> Option<Ticket> {
        self.tickets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn delete_single_ticket(&self, id: &str) -> Option<Ticket> {
        self.tickets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn tickets(&self) -> Vec<Ticket> {
        self.tickets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

// ============================================================================
// Cleaner
// ============================================================================

/// Outcome of one cleaner pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Tickets removed, including cascaded descendants.
    pub removed: usize,
    /// Services that held sessions under expired ticket-granting tickets,
    /// for single logout notification.
    pub logouts: Vec<(TicketId, Arc<dyn Service>)>,
}

/// Removes expired tickets from a registry on demand.
///
/// Scheduling is up to the caller.
#[derive(Debug, Clone)]
pub struct RegistryCleaner {
    registry: Arc<dyn TicketRegistry>,
}

impl RegistryCleaner {
    pub fn new(registry: Arc<dyn TicketRegistry>) -> Self {
        Self { registry }
    }

    pub fn clean(&self) -> CleanupReport {
        self.clean_at(Utc::now())
    }

    /// Remove every ticket expired at `now`.
    pub fn clean_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let expired: Vec<Ticket> = self
            .registry
            .tickets()
            .into_iter()
            .filter(|t| t.is_expired_at(now))
            .collect();

        let mut report = CleanupReport::default();
        for ticket in expired {
            if let Ticket::TicketGranting(tgt) = &ticket {
                report.logouts.extend(tgt.services());
                tgt.expire();
            }
            report.removed += self.registry.delete_ticket(ticket.id().as_str());
        }

        if report.removed > 0 {
            info!(
                removed = report.removed,
                logouts = report.logouts.len(),
                "Removed expired tickets"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::{Authentication, Principal};
    use crate::expiration::{ExpirationPolicy, NeverExpiresExpirationPolicy, TimeoutExpirationPolicy};
    use crate::generator::TicketGenerator;
    use crate::id_generator::DefaultUniqueTicketIdGenerator;
    use crate::service::WebApplicationService;
    use std::time::Duration;

    fn generator() -> TicketGenerator {
        TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(
                DefaultUniqueTicketIdGenerator::new(),
            ))
            .ticket_granting_ticket_expiration_policy(Arc::new(NeverExpiresExpirationPolicy))
            .service_ticket_expiration_policy(Arc::new(NeverExpiresExpirationPolicy))
            .only_track_most_recent_session(false)
            .build()
            .unwrap()
    }

    fn auth(user: &str) -> Authentication {
        Authentication::new(Principal::new(user))
    }

    fn web(url: &str) -> Arc<dyn Service> {
        Arc::new(WebApplicationService::new(url))
    }

    #[test]
    fn test_typed_lookup() {
        let registry = DefaultTicketRegistry::new();
        let gen = generator();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st = gen.generate_service_ticket(&tgt, web("https://a/"), false).unwrap();
        registry.add_ticket(Ticket::from(Arc::clone(&tgt)));
        registry.add_ticket(Ticket::from(Arc::clone(&st)));

        assert!(registry.get_ticket_granting_ticket(tgt.id().as_str()).is_ok());
        assert!(registry.get_service_ticket(st.id().as_str()).is_ok());

        match registry.get_service_ticket(tgt.id().as_str()).unwrap_err() {
            Error::InvalidTicket(msg) => assert!(msg.contains("not a service ticket")),
            e => panic!("Expected InvalidTicket, got {:?}", e),
        }
        match registry.get_ticket_granting_ticket("TGT-404").unwrap_err() {
            Error::InvalidTicket(msg) => assert!(msg.contains("not found")),
            e => panic!("Expected InvalidTicket, got {:?}", e),
        }
    }

    #[test]
    fn test_cascade_delete() {
        let registry = DefaultTicketRegistry::new();
        let gen = generator();

        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st1 = gen.generate_service_ticket(&tgt, web("https://a/"), false).unwrap();
        let st2 = gen.generate_service_ticket(&tgt, web("https://p/"), false).unwrap();
        let pgt = gen.generate_proxy_granting_ticket(&st2, auth("p")).unwrap();
        let pt = gen.generate_service_ticket(&pgt, web("https://b/"), false).unwrap();

        let other = gen.generate_ticket_granting_ticket(auth("v")).unwrap();

        for t in [Ticket::from(Arc::clone(&tgt)), Ticket::from(Arc::clone(&pgt)), Ticket::from(Arc::clone(&other))] {
            registry.add_ticket(t);
        }
        for t in [st1, st2, pt] {
            registry.add_ticket(Ticket::from(t));
        }
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.service_ticket_count(), 3);

        assert_eq!(registry.delete_ticket(tgt.id().as_str()), 5);
        assert_eq!(registry.len(), 1);
        assert!(registry.get_ticket(other.id().as_str()).is_some());

        assert_eq!(registry.delete_ticket(tgt.id().as_str()), 0);
    }

    #[test]
    fn test_deleting_pgt_detaches_from_parent() {
        let registry = DefaultTicketRegistry::new();
        let gen = generator();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st = gen.generate_service_ticket(&tgt, web("https://p/"), false).unwrap();
        let pgt = gen.generate_proxy_granting_ticket(&st, auth("p")).unwrap();
        registry.add_ticket(Ticket::from(Arc::clone(&pgt)));

        assert_eq!(tgt.proxy_granting_tickets().len(), 1);
        assert_eq!(registry.delete_ticket(pgt.id().as_str()), 1);
        assert!(tgt.proxy_granting_tickets().is_empty());
    }

    #[test]
    fn test_cascade_reaches_explicitly_parented_pgt() {
        let registry = DefaultTicketRegistry::new();
        let gen = generator();
        let never: Arc<dyn ExpirationPolicy> = Arc::new(NeverExpiresExpirationPolicy);

        let tgt = gen
            .generate_ticket_granting_ticket_with(
                TicketId::from_string("TGT-1").unwrap(),
                None,
                auth("u"),
                Arc::clone(&never),
            )
            .unwrap();
        let pgt = gen
            .generate_ticket_granting_ticket_with(
                TicketId::from_string("PGT-1").unwrap(),
                Some(Arc::clone(&tgt)),
                auth("p"),
                never,
            )
            .unwrap();
        registry.add_ticket(Ticket::from(Arc::clone(&tgt)));
        registry.add_ticket(Ticket::from(Arc::clone(&pgt)));

        assert_eq!(tgt.proxy_granting_tickets(), vec![pgt.id().clone()]);
        assert_eq!(registry.delete_ticket("TGT-1"), 2);
        assert!(registry.get_ticket("PGT-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cleaner_removes_expired_and_reports_logouts() {
        let registry: Arc<dyn TicketRegistry> = Arc::new(DefaultTicketRegistry::new());
        let short: Arc<dyn ExpirationPolicy> =
            Arc::new(TimeoutExpirationPolicy::new(Duration::from_secs(60)));
        let gen = TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(
                DefaultUniqueTicketIdGenerator::new(),
            ))
            .ticket_granting_ticket_expiration_policy(short)
            .service_ticket_expiration_policy(Arc::new(NeverExpiresExpirationPolicy))
            .build()
            .unwrap();

        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st = gen.generate_service_ticket(&tgt, web("https://a/"), false).unwrap();
        registry.add_ticket(Ticket::from(Arc::clone(&tgt)));
        registry.add_ticket(Ticket::from(st));

        let cleaner = RegistryCleaner::new(Arc::clone(&registry));

        let report = cleaner.clean_at(Utc::now());
        assert_eq!(report.removed, 0);

        let report = cleaner.clean_at(Utc::now() + chrono::Duration::seconds(120));
        assert_eq!(report.removed, 2);
        assert_eq!(report.logouts.len(), 1);
        assert_eq!(report.logouts[0].1.id(), "https://a/");
        assert!(registry.tickets().is_empty());
    }
}

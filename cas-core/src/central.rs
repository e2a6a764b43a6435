//! The central authentication service: the operations the web tier calls.
//!
//! Each operation resolves ticket ids through the registry, checks the
//! service registry and authentication policies, delegates ticket creation to
//! the [`TicketGenerator`], and records the outcome in the audit trail.

use crate::audit::{AuditEvent, AuditEventType, AuditLogger, NoOpLogger};
use crate::authentication::{
    AcceptAnyAuthenticationPolicy, Authentication, ContextualAuthenticationPolicy,
    RequiredHandlerAuthenticationPolicy,
};
use crate::error::{Error, ErrorCode, Result};
use crate::generator::TicketGenerator;
use crate::registry::TicketRegistry;
use crate::service::{RegisteredService, Service, ServicesManager};
use crate::ticket::{sanitize_ticket_id, ServiceTicket, Ticket, TicketGrantingTicket, TicketId, TicketKind};
use crate::validation::{Assertion, ValidationSpecification};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNKNOWN_ACTOR: &str = "unknown";

/// Orchestrates ticket creation, validation and logout.
#[derive(Debug)]
pub struct CentralAuthenticationService {
    generator: TicketGenerator,
    registry: Arc<dyn TicketRegistry>,
    services_manager: Arc<dyn ServicesManager>,
    audit: Arc<dyn AuditLogger>,
}

impl CentralAuthenticationService {
    pub fn new(
        generator: TicketGenerator,
        registry: Arc<dyn TicketRegistry>,
        services_manager: Arc<dyn ServicesManager>,
    ) -> Self {
        Self {
            generator,
            registry,
            services_manager,
            audit: Arc::new(NoOpLogger),
        }
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn generator(&self) -> &TicketGenerator {
        &self.generator
    }

    pub fn registry(&self) -> &Arc<dyn TicketRegistry> {
        &self.registry
    }

    pub fn services_manager(&self) -> &Arc<dyn ServicesManager> {
        &self.services_manager
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Start an SSO session for an authentication produced by the credential
    /// layer.
    pub fn create_ticket_granting_ticket(
        &self,
        authentication: Authentication,
    ) -> Result<Arc<TicketGrantingTicket>> {
        let actor = authentication.principal().id().to_string();
        let tgt = self
            .generator
            .generate_ticket_granting_ticket(authentication)
            .map_err(|e| self.reject(&actor, None, None, e))?;
        self.registry.add_ticket(Ticket::from(Arc::clone(&tgt)));

        info!(
            ticket_id = %tgt.id().sanitized(),
            principal = %actor,
            "Created SSO session"
        );
        self.audit.log(
            AuditEvent::new(AuditEventType::TicketGrantingTicketCreated, actor)
                .with_ticket(tgt.id().sanitized()),
        );
        Ok(tgt)
    }

    /// Grant a service ticket from an SSO session.
    ///
    /// `credentials` is a fresh authentication when the user re-entered
    /// credentials (renew); it must belong to the session's principal.
    ///
    /// # Errors
    ///
    /// - `InvalidTicket`: unknown or expired ticket-granting ticket.
    /// - `UnauthorizedService`: service unregistered or disabled.
    /// - `MixedPrincipal`: `credentials` name a different principal.
    /// - `UnauthorizedSsoService`: service excluded from SSO and no fresh
    ///   credentials on an already-used session, or no id generator for it.
    /// - `UnsatisfiedAuthenticationPolicy`: required handlers missing.
    pub fn grant_service_ticket(
        &self,
        ticket_granting_ticket_id: &str,
        service: Arc<dyn Service>,
        credentials: Option<Authentication>,
    ) -> Result<Arc<ServiceTicket>> {
        let service_id = service.id().to_string();
        let reject = |actor: &str, e| {
            self.reject(actor, Some(ticket_granting_ticket_id), Some(&service_id), e)
        };

        let tgt = self
            .live_ticket_granting_ticket(ticket_granting_ticket_id)
            .map_err(|e| reject(UNKNOWN_ACTOR, e))?;
        let actor = tgt.root_authentication().principal().id().to_string();

        let st = self
            .grant(&tgt, service, credentials)
            .map_err(|e| reject(&actor, e))?;

        self.audit.log(
            AuditEvent::new(AuditEventType::ServiceTicketGranted, actor)
                .with_ticket(st.id().sanitized())
                .with_service(service_id)
                .with_related(vec![tgt.id().sanitized()]),
        );
        Ok(st)
    }

    /// Grant a proxy ticket from a proxy-granting ticket.
    ///
    /// # Errors
    ///
    /// As [`Self::grant_service_ticket`]; `InvalidTicket` also when the id
    /// names a root ticket-granting ticket.
    pub fn grant_proxy_ticket(
        &self,
        proxy_granting_ticket_id: &str,
        service: Arc<dyn Service>,
    ) -> Result<Arc<ServiceTicket>> {
        let service_id = service.id().to_string();
        let reject = |actor: &str, e| {
            self.reject(actor, Some(proxy_granting_ticket_id), Some(&service_id), e)
        };

        let pgt = self
            .live_ticket_granting_ticket(proxy_granting_ticket_id)
            .map_err(|e| reject(UNKNOWN_ACTOR, e))?;
        let actor = pgt.root_authentication().principal().id().to_string();
        if pgt.kind() != TicketKind::ProxyGranting {
            return Err(reject(
                &actor,
                Error::InvalidTicket(format!(
                    "{} is not a proxy-granting ticket",
                    pgt.id().sanitized()
                )),
            ));
        }

        let pt = self
            .grant(&pgt, service, None)
            .map_err(|e| reject(&actor, e))?;

        self.audit.log(
            AuditEvent::new(AuditEventType::ProxyTicketGranted, actor)
                .with_ticket(pt.id().sanitized())
                .with_service(service_id)
                .with_related(vec![pgt.id().sanitized()]),
        );
        Ok(pt)
    }

    /// Issue a proxy-granting ticket for the service behind a service ticket.
    ///
    /// `authentication` is the authentication of the proxying service itself
    /// (its callback), produced by the credential layer.
    ///
    /// # Errors
    ///
    /// - `InvalidTicket`: unknown or expired service ticket.
    /// - `UnauthorizedProxying`: the service may not proxy.
    /// - `ProxyChainTooDeep`: the chain is already at the permitted depth.
    /// - `TicketState`: a proxy-granting ticket was already issued for this
    ///   service ticket.
    pub fn create_proxy_granting_ticket(
        &self,
        service_ticket_id: &str,
        authentication: Authentication,
    ) -> Result<Arc<TicketGrantingTicket>> {
        let st = self
            .registry
            .get_service_ticket(service_ticket_id)
            .map_err(|e| self.reject(UNKNOWN_ACTOR, Some(service_ticket_id), None, e))?;
        let service_id = st.service().id().to_string();
        let actor = st
            .granting_ticket()
            .root_authentication()
            .principal()
            .id()
            .to_string();
        let reject = |e| self.reject(&actor, Some(service_ticket_id), Some(&service_id), e);

        if st.is_expired() {
            self.registry.delete_ticket(service_ticket_id);
            return Err(reject(Error::InvalidTicket(format!(
                "service ticket {} is expired",
                st.id().sanitized()
            ))));
        }

        let proxy_allowed = self
            .services_manager
            .find_service_by(st.service().as_ref())
            .map(|r| r.is_enabled() && r.is_proxy_allowed())
            .unwrap_or(false);
        if !proxy_allowed {
            return Err(reject(Error::UnauthorizedProxying(format!(
                "service '{}' is not allowed to proxy",
                service_id
            ))));
        }

        let pgt = self
            .generator
            .generate_proxy_granting_ticket(&st, authentication)
            .map_err(reject)?;
        self.registry.add_ticket(Ticket::from(Arc::clone(&pgt)));

        info!(
            ticket_id = %pgt.id().sanitized(),
            proxied_by = %service_id,
            chain_length = pgt.chain_length(),
            "Created proxy-granting ticket"
        );
        self.audit.log(
            AuditEvent::new(AuditEventType::ProxyGrantingTicketCreated, actor)
                .with_ticket(pgt.id().sanitized())
                .with_service(service_id)
                .with_related(vec![st.id().sanitized(), st.granting_ticket().id().sanitized()]),
        );
        Ok(pgt)
    }

    /// Validate a service or proxy ticket presented by `service`.
    ///
    /// The ticket's use is recorded whether or not the service matches, and a
    /// ticket that is expired afterwards is removed from the registry.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedService`: service unregistered or disabled.
    /// - `InvalidTicket`: unknown, expired or consumed ticket.
    /// - `ServiceMismatch`: ticket issued for a different service.
    pub fn validate_service_ticket(
        &self,
        service_ticket_id: &str,
        service: &dyn Service,
    ) -> Result<Assertion> {
        let reject =
            |actor: &str, e| self.reject(actor, Some(service_ticket_id), Some(service.id()), e);

        self.find_registered_service(service)
            .map_err(|e| reject(UNKNOWN_ACTOR, e))?;
        let st = self
            .registry
            .get_service_ticket(service_ticket_id)
            .map_err(|e| reject(UNKNOWN_ACTOR, e))?;
        let actor = st
            .granting_ticket()
            .root_authentication()
            .principal()
            .id()
            .to_string();

        let outcome = st.validate_for(service);
        if st.is_expired() {
            self.registry.delete_ticket(service_ticket_id);
        }
        outcome.map_err(|e| reject(&actor, e))?;

        let assertion = Assertion::new(
            st.granting_ticket().chained_authentications(),
            Arc::clone(st.service()),
            st.is_from_new_login(),
        )
        .map_err(|e| reject(&actor, e))?;

        debug!(
            ticket_id = %st.id().sanitized(),
            service = %service.id(),
            principal = %actor,
            proxied = assertion.is_proxied(),
            "Validated service ticket"
        );
        self.audit.log(
            AuditEvent::new(AuditEventType::ServiceTicketValidated, actor)
                .with_ticket(st.id().sanitized())
                .with_service(service.id()),
        );
        Ok(assertion)
    }

    /// Validate and then check the assertion against `specification`.
    pub fn validate_service_ticket_with(
        &self,
        service_ticket_id: &str,
        service: &dyn Service,
        specification: &ValidationSpecification,
    ) -> Result<Assertion> {
        let assertion = self.validate_service_ticket(service_ticket_id, service)?;
        specification
            .check(&sanitize_ticket_id(service_ticket_id), &assertion)
            .map_err(|e| {
                self.reject(
                    assertion.primary_authentication().principal().id(),
                    Some(service_ticket_id),
                    Some(service.id()),
                    e,
                )
            })?;
        Ok(assertion)
    }

    /// End an SSO session.
    ///
    /// Removes the ticket and everything issued from it, and returns the
    /// services that held sessions so the web tier can send single logout
    /// notifications. An unknown id is not an error and yields no services.
    pub fn destroy_ticket_granting_ticket(
        &self,
        ticket_granting_ticket_id: &str,
    ) -> Result<Vec<(TicketId, Arc<dyn Service>)>> {
        let Some(ticket) = self.registry.get_ticket(ticket_granting_ticket_id) else {
            debug!(
                ticket_id = %sanitize_ticket_id(ticket_granting_ticket_id),
                "Logout for unknown ticket-granting ticket"
            );
            return Ok(Vec::new());
        };
        let Some(tgt) = ticket.as_ticket_granting() else {
            return Err(self.reject(
                UNKNOWN_ACTOR,
                Some(ticket_granting_ticket_id),
                None,
                Error::InvalidTicket(format!(
                    "{} is not a ticket-granting ticket",
                    ticket.id().sanitized()
                )),
            ));
        };

        let mut services: Vec<(TicketId, Arc<dyn Service>)> = tgt.services().into_iter().collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));

        let removed = self.registry.delete_ticket(ticket_granting_ticket_id);
        tgt.expire();
        tgt.remove_all_services();

        let actor = tgt.root_authentication().principal().id().to_string();
        info!(
            ticket_id = %tgt.id().sanitized(),
            principal = %actor,
            removed,
            services = services.len(),
            "Destroyed SSO session"
        );
        self.audit.log(
            AuditEvent::new(AuditEventType::TicketGrantingTicketDestroyed, actor)
                .with_ticket(tgt.id().sanitized())
                .with_related(services.iter().map(|(id, _)| id.sanitized()).collect()),
        );
        Ok(services)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn live_ticket_granting_ticket(&self, id: &str) -> Result<Arc<TicketGrantingTicket>> {
        let tgt = self.registry.get_ticket_granting_ticket(id)?;
        if tgt.is_expired() {
            self.registry.delete_ticket(id);
            return Err(Error::InvalidTicket(format!(
                "ticket-granting ticket {} is expired",
                tgt.id().sanitized()
            )));
        }
        Ok(tgt)
    }

    fn find_registered_service(&self, service: &dyn Service) -> Result<RegisteredService> {
        match self.services_manager.find_service_by(service) {
            Some(registered) if registered.is_enabled() => Ok(registered),
            Some(_) => Err(Error::UnauthorizedService(format!(
                "service '{}' is disabled",
                service.id()
            ))),
            None => Err(Error::UnauthorizedService(format!(
                "service '{}' is not registered",
                service.id()
            ))),
        }
    }

    fn grant(
        &self,
        tgt: &Arc<TicketGrantingTicket>,
        service: Arc<dyn Service>,
        credentials: Option<Authentication>,
    ) -> Result<Arc<ServiceTicket>> {
        let registered = self.find_registered_service(service.as_ref())?;

        let credentials_provided = credentials.is_some();
        if let Some(current) = &credentials {
            let original = tgt.authentication().principal();
            if current.principal().id() != original.id() {
                return Err(Error::MixedPrincipal {
                    original: original.id().to_string(),
                    presented: current.principal().id().to_string(),
                });
            }
        }

        if !registered.is_sso_enabled() && !credentials_provided && tgt.count_of_uses() > 0 {
            return Err(Error::UnauthorizedSsoService(format!(
                "service '{}' requires fresh credentials",
                service.id()
            )));
        }

        Self::check_authentication_policy(tgt, credentials.as_ref(), &registered)?;

        let st = self
            .generator
            .generate_service_ticket(tgt, service, credentials_provided)?;
        // The session only learns the fresh credentials once the grant went through
        if let Some(current) = credentials {
            tgt.add_supplemental_authentication(current);
        }
        self.registry.add_ticket(Ticket::from(Arc::clone(&st)));
        Ok(st)
    }

    fn authentication_policy_for(
        registered: &RegisteredService,
    ) -> Box<dyn ContextualAuthenticationPolicy> {
        if registered.required_handlers().is_empty() {
            Box::new(AcceptAnyAuthenticationPolicy)
        } else {
            Box::new(RequiredHandlerAuthenticationPolicy::new(
                registered.required_handlers().iter().cloned(),
            ))
        }
    }

    /// The presented credentials, the most recent supplemental authentication
    /// or the original one must satisfy the service's policy.
    fn check_authentication_policy(
        tgt: &TicketGrantingTicket,
        candidate: Option<&Authentication>,
        registered: &RegisteredService,
    ) -> Result<()> {
        let policy = Self::authentication_policy_for(registered);
        let supplemental = tgt.supplemental_authentications();
        let satisfied = candidate
            .into_iter()
            .chain(supplemental.iter().rev())
            .chain(std::iter::once(tgt.authentication()))
            .any(|a| policy.is_satisfied_by(a));
        if satisfied {
            Ok(())
        } else {
            Err(Error::UnsatisfiedAuthenticationPolicy {
                policy: policy.describe(),
            })
        }
    }

    fn reject(
        &self,
        actor: &str,
        ticket_id: Option<&str>,
        service: Option<&str>,
        error: Error,
    ) -> Error {
        let ticket = ticket_id.map(sanitize_ticket_id);
        let noisy = error.is_replay_signal()
            || matches!(
                error.code(),
                ErrorCode::UnauthorizedService
                    | ErrorCode::UnauthorizedSsoService
                    | ErrorCode::UnauthorizedProxying
                    | ErrorCode::ProxyChainTooDeep
            );
        if noisy {
            warn!(
                ticket_id = ?ticket,
                service = ?service,
                error = %error,
                code = error.name(),
                "Rejected ticket request"
            );
        } else {
            debug!(
                ticket_id = ?ticket,
                service = ?service,
                error = %error,
                code = error.name(),
                "Rejected ticket request"
            );
        }

        let mut event = AuditEvent::rejected(actor, &error);
        if let Some(ticket) = ticket {
            event = event.with_ticket(ticket);
        }
        if let Some(service) = service {
            event = event.with_service(service);
        }
        self.audit.log(event);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLogger;
    use crate::authentication::Principal;
    use crate::expiration::NeverExpiresExpirationPolicy;
    use crate::id_generator::DefaultUniqueTicketIdGenerator;
    use crate::registry::DefaultTicketRegistry;
    use crate::service::{DefaultServicesManager, WebApplicationService};

    struct Fixture {
        cas: CentralAuthenticationService,
        audit: Arc<MemoryAuditLogger>,
    }

    fn fixture(services: Vec<RegisteredService>) -> Fixture {
        let generator = TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(
                DefaultUniqueTicketIdGenerator::new(),
            ))
            .ticket_granting_ticket_expiration_policy(Arc::new(NeverExpiresExpirationPolicy))
            .build()
            .unwrap();
        let audit = Arc::new(MemoryAuditLogger::new());
        let cas = CentralAuthenticationService::new(
            generator,
            Arc::new(DefaultTicketRegistry::new()),
            Arc::new(DefaultServicesManager::with_services(services)),
        )
        .with_audit_logger(audit.clone());
        Fixture { cas, audit }
    }

    fn any_service() -> RegisteredService {
        RegisteredService::new(1, "all", "https://.*").unwrap()
    }

    fn web(url: &str) -> Arc<dyn Service> {
        Arc::new(WebApplicationService::new(url))
    }

    fn auth(user: &str) -> Authentication {
        Authentication::new(Principal::new(user)).with_successful_handler("password")
    }

    #[test]
    fn test_login_grant_validate() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        let st = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap();

        let assertion = f
            .cas
            .validate_service_ticket(st.id().as_str(), &WebApplicationService::new("https://app/"))
            .unwrap();
        assert_eq!(assertion.primary_authentication().principal().id(), "alice");
        assert!(assertion.is_from_new_login());
        assert!(!assertion.is_proxied());

        // Single-use ticket is gone
        assert!(f.cas.registry().get_ticket(st.id().as_str()).is_none());
        assert_eq!(f.audit.count(AuditEventType::ServiceTicketValidated), 1);
    }

    #[test]
    fn test_unregistered_service() {
        let f = fixture(vec![]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        match f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap_err()
        {
            Error::UnauthorizedService(_) => {}
            e => panic!("Expected UnauthorizedService, got {:?}", e),
        }
        assert_eq!(tgt.count_of_uses(), 0);
        assert_eq!(f.audit.count(AuditEventType::RequestRejected), 1);
    }

    #[test]
    fn test_disabled_service() {
        let f = fixture(vec![any_service().with_enabled(false)]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        assert!(matches!(
            f.cas
                .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
                .unwrap_err(),
            Error::UnauthorizedService(_)
        ));
    }

    #[test]
    fn test_sso_disabled_requires_credentials_after_first_use() {
        let f = fixture(vec![any_service().with_sso_enabled(false)]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();

        // First use of the session is the login itself
        f.cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap();

        match f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap_err()
        {
            Error::UnauthorizedSsoService(_) => {}
            e => panic!("Expected UnauthorizedSsoService, got {:?}", e),
        }

        let st = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), Some(auth("alice")))
            .unwrap();
        assert!(st.is_from_new_login());
        assert_eq!(tgt.supplemental_authentications().len(), 1);
    }

    #[test]
    fn test_mixed_principal() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        match f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), Some(auth("mallory")))
            .unwrap_err()
        {
            Error::MixedPrincipal { original, presented } => {
                assert_eq!(original, "alice");
                assert_eq!(presented, "mallory");
            }
            e => panic!("Expected MixedPrincipal, got {:?}", e),
        }
    }

    #[test]
    fn test_required_handlers() {
        let f = fixture(vec![any_service().with_required_handlers(["otp"])]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();

        match f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap_err()
        {
            Error::UnsatisfiedAuthenticationPolicy { policy } => {
                assert_eq!(policy.requirements, vec!["otp".to_string()]);
            }
            e => panic!("Expected UnsatisfiedAuthenticationPolicy, got {:?}", e),
        }

        // Step up with a second factor
        let stronger = auth("alice").with_successful_handler("otp");
        assert!(f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), Some(stronger))
            .is_ok());
    }

    #[test]
    fn test_rejected_step_up_leaves_session_untouched() {
        let f = fixture(vec![any_service().with_required_handlers(["otp"])]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();

        // Fresh credentials that still lack the second factor
        match f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), Some(auth("alice")))
            .unwrap_err()
        {
            Error::UnsatisfiedAuthenticationPolicy { .. } => {}
            e => panic!("Expected UnsatisfiedAuthenticationPolicy, got {:?}", e),
        }
        assert!(tgt.supplemental_authentications().is_empty());
        assert_eq!(tgt.count_of_uses(), 0);
        assert!(tgt.services().is_empty());
    }

    #[test]
    fn test_grant_without_id_generator_leaves_session_untouched() {
        #[derive(Debug)]
        struct NativeApp(String);

        impl Service for NativeApp {
            fn id(&self) -> &str {
                &self.0
            }
            fn matches(&self, other: &dyn Service) -> bool {
                self.0 == other.id()
            }
            fn set_principal(&self, _principal: &Principal) {}
            fn principal(&self) -> Option<Principal> {
                None
            }
        }

        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();

        match f
            .cas
            .grant_service_ticket(
                tgt.id().as_str(),
                Arc::new(NativeApp("https://native/".into())),
                Some(auth("alice")),
            )
            .unwrap_err()
        {
            Error::UnauthorizedSsoService(_) => {}
            e => panic!("Expected UnauthorizedSsoService, got {:?}", e),
        }
        assert!(tgt.supplemental_authentications().is_empty());
        assert_eq!(tgt.count_of_uses(), 0);
        assert!(f.cas.registry().get_ticket(tgt.id().as_str()).is_some());
    }

    #[test]
    fn test_proxying_requires_permission() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        let st = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://proxy/"), None)
            .unwrap();

        match f
            .cas
            .create_proxy_granting_ticket(st.id().as_str(), auth("proxy"))
            .unwrap_err()
        {
            Error::UnauthorizedProxying(_) => {}
            e => panic!("Expected UnauthorizedProxying, got {:?}", e),
        }
        assert!(!st.has_granted_ticket());
    }

    #[test]
    fn test_proxy_flow() {
        let f = fixture(vec![any_service().with_proxy_allowed(true)]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        let st = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://proxy/"), None)
            .unwrap();
        let pgt = f
            .cas
            .create_proxy_granting_ticket(st.id().as_str(), auth("proxy"))
            .unwrap();

        let pt = f
            .cas
            .grant_proxy_ticket(pgt.id().as_str(), web("https://backend/"))
            .unwrap();
        assert_eq!(pt.kind(), TicketKind::Proxy);

        let target = WebApplicationService::new("https://backend/");
        match f
            .cas
            .validate_service_ticket_with(
                pt.id().as_str(),
                &target,
                &ValidationSpecification::service_validate(),
            )
            .unwrap_err()
        {
            Error::ValidationSpecificationUnsatisfied { .. } => {}
            e => panic!("Expected ValidationSpecificationUnsatisfied, got {:?}", e),
        }

        let pt2 = f
            .cas
            .grant_proxy_ticket(pgt.id().as_str(), web("https://backend/"))
            .unwrap();
        let assertion = f
            .cas
            .validate_service_ticket_with(
                pt2.id().as_str(),
                &target,
                &ValidationSpecification::proxy_validate(),
            )
            .unwrap();
        assert_eq!(assertion.proxies(), vec!["proxy"]);
        assert_eq!(assertion.primary_authentication().principal().id(), "alice");
    }

    #[test]
    fn test_grant_proxy_ticket_rejects_root_tgt() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        match f
            .cas
            .grant_proxy_ticket(tgt.id().as_str(), web("https://app/"))
            .unwrap_err()
        {
            Error::InvalidTicket(_) => {}
            e => panic!("Expected InvalidTicket, got {:?}", e),
        }
    }

    #[test]
    fn test_validate_wrong_service() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        let st = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://app/"), None)
            .unwrap();

        let err = f
            .cas
            .validate_service_ticket(st.id().as_str(), &WebApplicationService::new("https://other/"))
            .unwrap_err();
        assert_eq!(err.protocol_code(), "INVALID_SERVICE");

        // The failed attempt consumed the single-use ticket
        match f
            .cas
            .validate_service_ticket(st.id().as_str(), &WebApplicationService::new("https://app/"))
            .unwrap_err()
        {
            Error::InvalidTicket(_) => {}
            e => panic!("Expected InvalidTicket, got {:?}", e),
        }
    }

    #[test]
    fn test_destroy_returns_services_and_cascades() {
        let f = fixture(vec![any_service()]);
        let tgt = f.cas.create_ticket_granting_ticket(auth("alice")).unwrap();
        let st1 = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://a/"), None)
            .unwrap();
        let st2 = f
            .cas
            .grant_service_ticket(tgt.id().as_str(), web("https://b/"), None)
            .unwrap();

        let services = f.cas.destroy_ticket_granting_ticket(tgt.id().as_str()).unwrap();
        let ids: Vec<&str> = services.iter().map(|(_, s)| s.id()).collect();
        assert_eq!(services.len(), 2);
        assert!(ids.contains(&"https://a/"));
        assert!(ids.contains(&"https://b/"));

        assert!(tgt.is_expired());
        assert!(f.cas.registry().get_ticket(st1.id().as_str()).is_none());
        assert!(f.cas.registry().get_ticket(st2.id().as_str()).is_none());
        assert!(f
            .cas
            .destroy_ticket_granting_ticket(tgt.id().as_str())
            .unwrap()
            .is_empty());
    }
}

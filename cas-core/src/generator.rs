//! Factory for every ticket kind.
//!
//! The generator owns the id generators and expiration policies. Ticket types
//! never build each other except through the calls made here.

use crate::authentication::Authentication;
use crate::error::{Error, Result};
use crate::expiration::{
    ExpirationPolicy, MultiTimeUseOrTimeoutExpirationPolicy, TicketGrantingTicketExpirationPolicy,
};
use crate::id_generator::{DefaultUniqueTicketIdGenerator, UniqueTicketIdGenerator};
use crate::service::{service_type_of, Service};
use crate::ticket::{
    ServiceTicket, TicketGrantingTicket, TicketId, PROXY_GRANTING_TICKET_PREFIX,
    PROXY_TICKET_PREFIX, SERVICE_TICKET_PREFIX, TICKET_GRANTING_TICKET_PREFIX,
};
use crate::MAX_PROXY_CHAIN_DEPTH;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default idle window of a ticket-granting ticket.
pub const DEFAULT_TGT_TIME_TO_KILL: Duration = Duration::from_secs(7200);
/// Default hard lifetime of a ticket-granting ticket.
pub const DEFAULT_TGT_MAX_TIME_TO_LIVE: Duration = Duration::from_secs(28800);
/// Default number of uses of a service ticket.
pub const DEFAULT_ST_NUMBER_OF_USES: u32 = 1;
/// Default lifetime of an unused service ticket.
pub const DEFAULT_ST_TIME_TO_KILL: Duration = Duration::from_secs(10);

/// Creates ticket-granting, service and proxy-granting tickets.
#[derive(Debug)]
pub struct TicketGenerator {
    ticket_granting_ticket_id_generator: Arc<dyn UniqueTicketIdGenerator>,
    service_ticket_id_generators: HashMap<String, Arc<dyn UniqueTicketIdGenerator>>,
    ticket_granting_ticket_expiration_policy: Arc<dyn ExpirationPolicy>,
    service_ticket_expiration_policy: Arc<dyn ExpirationPolicy>,
    proxy_granting_ticket_expiration_policy: Arc<dyn ExpirationPolicy>,
    only_track_most_recent_session: bool,
    max_proxy_chain_depth: usize,
}

impl TicketGenerator {
    pub fn builder() -> TicketGeneratorBuilder {
        TicketGeneratorBuilder::new()
    }

    pub fn ticket_granting_ticket_expiration_policy(&self) -> &Arc<dyn ExpirationPolicy> {
        &self.ticket_granting_ticket_expiration_policy
    }

    pub fn service_ticket_expiration_policy(&self) -> &Arc<dyn ExpirationPolicy> {
        &self.service_ticket_expiration_policy
    }

    pub fn proxy_granting_ticket_expiration_policy(&self) -> &Arc<dyn ExpirationPolicy> {
        &self.proxy_granting_ticket_expiration_policy
    }

    pub fn only_track_most_recent_session(&self) -> bool {
        self.only_track_most_recent_session
    }

    pub fn max_proxy_chain_depth(&self) -> usize {
        self.max_proxy_chain_depth
    }

    fn next_id(generator: &dyn UniqueTicketIdGenerator, prefix: &str) -> Result<TicketId> {
        let raw = generator.new_ticket_id(prefix);
        TicketId::from_string(raw).map_err(|e| {
            Error::TicketCreation(format!("id generator produced a malformed id: {}", e))
        })
    }

    /// Create a root ticket-granting ticket with the configured policy.
    pub fn generate_ticket_granting_ticket(
        &self,
        authentication: Authentication,
    ) -> Result<Arc<TicketGrantingTicket>> {
        let id = Self::next_id(
            self.ticket_granting_ticket_id_generator.as_ref(),
            TICKET_GRANTING_TICKET_PREFIX,
        )?;
        let ticket = Arc::new(TicketGrantingTicket::new(
            id,
            None,
            None,
            authentication,
            Arc::clone(&self.ticket_granting_ticket_expiration_policy),
        )?);

        debug!(
            ticket_id = %ticket.id().sanitized(),
            principal = %ticket.authentication().principal(),
            "Created ticket-granting ticket"
        );
        Ok(ticket)
    }

    /// Create a ticket-granting ticket with an explicit id, parent and policy.
    ///
    /// A root takes a `TGT-` id and no parent; a child takes a `PGT-` id and a
    /// parent, which then tracks it for cascading deletes.
    pub fn generate_ticket_granting_ticket_with(
        &self,
        id: TicketId,
        parent: Option<Arc<TicketGrantingTicket>>,
        authentication: Authentication,
        expiration_policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<Arc<TicketGrantingTicket>> {
        if let Some(parent) = &parent {
            self.check_proxy_depth(parent.chain_length() + 1)?;
        }
        let ticket = Arc::new(TicketGrantingTicket::new(
            id,
            parent,
            None,
            authentication,
            expiration_policy,
        )?);
        if let Some(parent) = ticket.parent() {
            parent.add_proxy_granting_ticket(ticket.id().clone());
        }
        debug!(
            ticket_id = %ticket.id().sanitized(),
            chain_length = ticket.chain_length(),
            "Created ticket-granting ticket with explicit id"
        );
        Ok(ticket)
    }

    /// Create a service ticket for `service` from `ticket_granting_ticket`.
    ///
    /// The id generator is chosen by the service's type. Tickets issued from a
    /// proxy chain get the `PT` prefix.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedSsoService` if no id generator is registered for
    /// the service's type.
    pub fn generate_service_ticket(
        &self,
        ticket_granting_ticket: &Arc<TicketGrantingTicket>,
        service: Arc<dyn Service>,
        credentials_provided: bool,
    ) -> Result<Arc<ServiceTicket>> {
        let service_type = service.service_type();
        let generator = self
            .service_ticket_id_generators
            .get(service_type)
            .ok_or_else(|| {
                Error::UnauthorizedSsoService(format!(
                    "no ticket id generator configured for service type {}",
                    service_type
                ))
            })?;

        let prefix = if ticket_granting_ticket.chain_length() > 1 {
            PROXY_TICKET_PREFIX
        } else {
            SERVICE_TICKET_PREFIX
        };
        let id = Self::next_id(generator.as_ref(), prefix)?;

        let ticket = ticket_granting_ticket.grant_service_ticket(
            id,
            service,
            Arc::clone(&self.service_ticket_expiration_policy),
            credentials_provided,
            self.only_track_most_recent_session,
        )?;

        debug!(
            ticket_id = %ticket.id().sanitized(),
            granting_ticket = %ticket_granting_ticket.id().sanitized(),
            service = %ticket.service().id(),
            from_new_login = ticket.is_from_new_login(),
            "Granted service ticket"
        );
        Ok(ticket)
    }

    /// Create the proxy-granting ticket for `service_ticket`.
    ///
    /// # Errors
    ///
    /// - `ProxyChainTooDeep` if the chain would exceed the configured depth.
    /// - `TicketState` if the service ticket already granted one.
    pub fn generate_proxy_granting_ticket(
        &self,
        service_ticket: &ServiceTicket,
        authentication: Authentication,
    ) -> Result<Arc<TicketGrantingTicket>> {
        self.check_proxy_depth(service_ticket.granting_ticket().chain_length() + 1)?;

        let id = Self::next_id(
            self.ticket_granting_ticket_id_generator.as_ref(),
            PROXY_GRANTING_TICKET_PREFIX,
        )?;
        let ticket = service_ticket.grant_ticket_granting_ticket(
            id,
            authentication,
            Arc::clone(&self.proxy_granting_ticket_expiration_policy),
        )?;

        debug!(
            ticket_id = %ticket.id().sanitized(),
            service_ticket = %service_ticket.id().sanitized(),
            proxied_by = %service_ticket.service().id(),
            chain_length = ticket.chain_length(),
            "Created proxy-granting ticket"
        );
        Ok(ticket)
    }

    fn check_proxy_depth(&self, chain_length: usize) -> Result<()> {
        let depth = chain_length - 1;
        if depth > self.max_proxy_chain_depth {
            return Err(Error::ProxyChainTooDeep {
                depth,
                max: self.max_proxy_chain_depth,
            });
        }
        Ok(())
    }
}

/// Builder for [`TicketGenerator`].
///
/// Every setting has a default except the per-service-type id generators; a
/// generator with none registered can create ticket-granting tickets but no
/// service tickets.
#[derive(Debug)]
pub struct TicketGeneratorBuilder {
    ticket_granting_ticket_id_generator: Option<Arc<dyn UniqueTicketIdGenerator>>,
    service_ticket_id_generators: HashMap<String, Arc<dyn UniqueTicketIdGenerator>>,
    ticket_granting_ticket_expiration_policy: Option<Arc<dyn ExpirationPolicy>>,
    service_ticket_expiration_policy: Option<Arc<dyn ExpirationPolicy>>,
    proxy_granting_ticket_expiration_policy: Option<Arc<dyn ExpirationPolicy>>,
    only_track_most_recent_session: bool,
    max_proxy_chain_depth: usize,
}

impl TicketGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            ticket_granting_ticket_id_generator: None,
            service_ticket_id_generators: HashMap::new(),
            ticket_granting_ticket_expiration_policy: None,
            service_ticket_expiration_policy: None,
            proxy_granting_ticket_expiration_policy: None,
            only_track_most_recent_session: true,
            max_proxy_chain_depth: MAX_PROXY_CHAIN_DEPTH,
        }
    }

    /// Id generator for ticket-granting and proxy-granting tickets.
    pub fn ticket_granting_ticket_id_generator(
        mut self,
        generator: Arc<dyn UniqueTicketIdGenerator>,
    ) -> Self {
        self.ticket_granting_ticket_id_generator = Some(generator);
        self
    }

    /// Register the service ticket id generator for services of type `S`.
    pub fn service_ticket_id_generator<S: Service>(
        self,
        generator: Arc<dyn UniqueTicketIdGenerator>,
    ) -> Self {
        self.service_ticket_id_generator_for_type(service_type_of::<S>(), generator)
    }

    /// Register a service ticket id generator under a raw service type key.
    pub fn service_ticket_id_generator_for_type(
        mut self,
        service_type: impl Into<String>,
        generator: Arc<dyn UniqueTicketIdGenerator>,
    ) -> Self {
        self.service_ticket_id_generators
            .insert(service_type.into(), generator);
        self
    }

    pub fn ticket_granting_ticket_expiration_policy(
        mut self,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Self {
        self.ticket_granting_ticket_expiration_policy = Some(policy);
        self
    }

    pub fn service_ticket_expiration_policy(mut self, policy: Arc<dyn ExpirationPolicy>) -> Self {
        self.service_ticket_expiration_policy = Some(policy);
        self
    }

    pub fn proxy_granting_ticket_expiration_policy(
        mut self,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Self {
        self.proxy_granting_ticket_expiration_policy = Some(policy);
        self
    }

    pub fn only_track_most_recent_session(mut self, enabled: bool) -> Self {
        self.only_track_most_recent_session = enabled;
        self
    }

    /// Maximum number of proxy hops below the root ticket-granting ticket.
    pub fn max_proxy_chain_depth(mut self, depth: usize) -> Self {
        self.max_proxy_chain_depth = depth;
        self
    }

    pub fn build(self) -> Result<TicketGenerator> {
        let tgt_policy: Arc<dyn ExpirationPolicy> =
            match self.ticket_granting_ticket_expiration_policy {
                Some(policy) => policy,
                None => Arc::new(TicketGrantingTicketExpirationPolicy::new(
                    DEFAULT_TGT_MAX_TIME_TO_LIVE,
                    DEFAULT_TGT_TIME_TO_KILL,
                )?),
            };
        let st_policy: Arc<dyn ExpirationPolicy> =
            self.service_ticket_expiration_policy.unwrap_or_else(|| {
                Arc::new(MultiTimeUseOrTimeoutExpirationPolicy::new(
                    DEFAULT_ST_NUMBER_OF_USES,
                    DEFAULT_ST_TIME_TO_KILL,
                ))
            });
        let pgt_policy = self
            .proxy_granting_ticket_expiration_policy
            .unwrap_or_else(|| Arc::clone(&tgt_policy));

        Ok(TicketGenerator {
            ticket_granting_ticket_id_generator: self
                .ticket_granting_ticket_id_generator
                .unwrap_or_else(|| Arc::new(DefaultUniqueTicketIdGenerator::new())),
            service_ticket_id_generators: self.service_ticket_id_generators,
            ticket_granting_ticket_expiration_policy: tgt_policy,
            service_ticket_expiration_policy: st_policy,
            proxy_granting_ticket_expiration_policy: pgt_policy,
            only_track_most_recent_session: self.only_track_most_recent_session,
            max_proxy_chain_depth: self.max_proxy_chain_depth,
        })
    }
}

impl Default for TicketGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::Principal;
    use crate::expiration::NeverExpiresExpirationPolicy;
    use crate::id_generator::UuidTicketIdGenerator;
    use crate::service::WebApplicationService;
    use crate::ticket::TicketKind;

    fn generator() -> TicketGenerator {
        TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(
                DefaultUniqueTicketIdGenerator::new(),
            ))
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
    fn test_tgt_uses_prefix_and_policy() {
        let gen = generator();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        assert_eq!(tgt.kind(), TicketKind::TicketGranting);
        assert!(tgt.id().as_str().starts_with("TGT-"));
        assert!(tgt.is_root());
        assert_eq!(
            tgt.expiration_policy().time_to_live(),
            Some(DEFAULT_TGT_MAX_TIME_TO_LIVE)
        );
    }

    #[test]
    fn test_st_then_pt_prefixes() {
        let gen = generator();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st = gen
            .generate_service_ticket(&tgt, web("https://proxy/"), false)
            .unwrap();
        assert_eq!(st.kind(), TicketKind::Service);

        let pgt = gen.generate_proxy_granting_ticket(&st, auth("proxy")).unwrap();
        assert_eq!(pgt.kind(), TicketKind::ProxyGranting);

        let pt = gen
            .generate_service_ticket(&pgt, web("https://backend/"), false)
            .unwrap();
        assert_eq!(pt.kind(), TicketKind::Proxy);
        assert!(pt.id().as_str().starts_with("PT-"));
    }

    #[test]
    fn test_missing_service_generator_is_unauthorized_sso() {
        let gen = TicketGenerator::builder().build().unwrap();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();

        match gen
            .generate_service_ticket(&tgt, web("https://a/"), false)
            .unwrap_err()
        {
            Error::UnauthorizedSsoService(msg) => assert!(msg.contains("WebApplicationService")),
            e => panic!("Expected UnauthorizedSsoService, got {:?}", e),
        }
        assert_eq!(tgt.service_count(), 0);
        assert_eq!(tgt.count_of_uses(), 0);
    }

    #[test]
    fn test_malformed_generated_id_is_creation_error() {
        #[derive(Debug)]
        struct Broken;
        impl UniqueTicketIdGenerator for Broken {
            fn new_ticket_id(&self, _prefix: &str) -> String {
                "garbage".to_string()
            }
        }

        let gen = TicketGenerator::builder()
            .ticket_granting_ticket_id_generator(Arc::new(Broken))
            .build()
            .unwrap();
        match gen.generate_ticket_granting_ticket(auth("u")).unwrap_err() {
            Error::TicketCreation(_) => {}
            e => panic!("Expected TicketCreation, got {:?}", e),
        }
    }

    #[test]
    fn test_proxy_depth_limit() {
        let gen = TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(UuidTicketIdGenerator))
            .max_proxy_chain_depth(1)
            .build()
            .unwrap();

        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        let st = gen.generate_service_ticket(&tgt, web("https://p1/"), false).unwrap();
        let pgt = gen.generate_proxy_granting_ticket(&st, auth("p1")).unwrap();

        let pt = gen.generate_service_ticket(&pgt, web("https://p2/"), false).unwrap();
        match gen.generate_proxy_granting_ticket(&pt, auth("p2")).unwrap_err() {
            Error::ProxyChainTooDeep { depth, max } => {
                assert_eq!(depth, 2);
                assert_eq!(max, 1);
            }
            e => panic!("Expected ProxyChainTooDeep, got {:?}", e),
        }
        // Depth failure must not consume the ticket
        assert!(!pt.has_granted_ticket());
    }

    #[test]
    fn test_explicit_id_generation() {
        let gen = generator();
        let never: Arc<dyn ExpirationPolicy> = Arc::new(NeverExpiresExpirationPolicy);
        let root = gen
            .generate_ticket_granting_ticket_with(
                TicketId::from_string("TGT-1").unwrap(),
                None,
                auth("u"),
                Arc::clone(&never),
            )
            .unwrap();
        let child = gen
            .generate_ticket_granting_ticket_with(
                TicketId::from_string("PGT-1").unwrap(),
                Some(Arc::clone(&root)),
                auth("p"),
                never,
            )
            .unwrap();
        assert!(Arc::ptr_eq(&child.root(), &root));
        assert!(child.proxied_by().is_none());
    }

    #[test]
    fn test_only_track_most_recent_session_flag_forwarded() {
        let gen = TicketGenerator::builder()
            .service_ticket_id_generator::<WebApplicationService>(Arc::new(UuidTicketIdGenerator))
            .only_track_most_recent_session(false)
            .build()
            .unwrap();
        let tgt = gen.generate_ticket_granting_ticket(auth("u")).unwrap();
        gen.generate_service_ticket(&tgt, web("https://a/"), false).unwrap();
        gen.generate_service_ticket(&tgt, web("https://a/"), false).unwrap();
        assert_eq!(tgt.service_count(), 2);
    }
}

//! # CAS Core
//!
//! Ticket lifecycle and authentication-chaining engine for CAS single sign-on.
//!
//! A user logs in once and receives a ticket-granting ticket (the SSO
//! session). Every application the user visits gets a short-lived service
//! ticket issued from that session, which the application validates once. An
//! application allowed to proxy can obtain a proxy-granting ticket and use it
//! to mint proxy tickets for back-end services, forming a chain of
//! authentications that always ends at the original login.
//!
//! ## Key Concepts
//!
//! - **Ticket-granting ticket**: the SSO session; with a parent it is a
//!   proxy-granting ticket
//! - **Service ticket**: one-shot credential for one service; from a proxy
//!   chain it is a proxy ticket
//! - **Expiration policy**: pure predicate deciding when a ticket is dead;
//!   a dead ticket kills everything issued from it
//! - **Registry**: resolves ticket ids to live tickets
//!
//! ## Example
//!
//! ```rust,ignore
//! use cas::{CentralAuthenticationService, TicketingConfig, DefaultTicketRegistry};
//! use cas::{Authentication, Principal, WebApplicationService};
//! use std::sync::Arc;
//!
//! let config = TicketingConfig::from_file("ticketing.yaml")?;
//! let cas = CentralAuthenticationService::new(
//!     config.build_generator()?,
//!     Arc::new(DefaultTicketRegistry::new()),
//!     Arc::new(config.build_services_manager()?),
//! );
//!
//! let tgt = cas.create_ticket_granting_ticket(Authentication::new(Principal::new("alice")))?;
//! let st = cas.grant_service_ticket(
//!     tgt.id().as_str(),
//!     Arc::new(WebApplicationService::new("https://app.example.org/")),
//!     None,
//! )?;
//!
//! let assertion = cas.validate_service_ticket(
//!     st.id().as_str(),
//!     &WebApplicationService::new("https://app.example.org/"),
//! )?;
//! assert_eq!(assertion.primary_authentication().principal().id(), "alice");
//! ```

pub mod audit;
pub mod authentication;
pub mod central;
pub mod config;
pub mod error;
pub mod expiration;
pub mod generator;
pub mod id_generator;
pub mod registry;
pub mod service;
pub mod ticket;
pub mod validation;

// Re-exports for convenience
pub use audit::{AuditEvent, AuditEventType, AuditLogger, MemoryAuditLogger, NoOpLogger, TracingAuditLogger};
pub use authentication::{
    AcceptAnyAuthenticationPolicy, Attributes, Authentication, ContextualAuthenticationPolicy,
    Principal, RequiredHandlerAuthenticationPolicy, UnmetPolicy, REMEMBER_ME_ATTRIBUTE,
};
pub use central::CentralAuthenticationService;
pub use config::{ConfigError, ExpirationPolicyConfig, TicketingConfig};
pub use error::{Error, ErrorCode, Result};
pub use expiration::{
    AlwaysExpiresExpirationPolicy, ExpirationPolicy, HardTimeoutExpirationPolicy,
    MultiTimeUseOrTimeoutExpirationPolicy, NeverExpiresExpirationPolicy,
    RememberMeDelegatingExpirationPolicy, ThrottledUseAndTimeoutExpirationPolicy,
    TicketGrantingTicketExpirationPolicy, TicketState, TimeoutExpirationPolicy,
};
pub use generator::{TicketGenerator, TicketGeneratorBuilder};
pub use id_generator::{DefaultUniqueTicketIdGenerator, UniqueTicketIdGenerator, UuidTicketIdGenerator};
pub use registry::{CleanupReport, DefaultTicketRegistry, RegistryCleaner, TicketRegistry};
pub use service::{
    service_type_of, DefaultServicesManager, RegisteredService, Service, ServicesManager,
    WebApplicationService,
};
pub use ticket::{
    sanitize_ticket_id, ServiceTicket, Ticket, TicketGrantingTicket, TicketId, TicketKind,
};
pub use validation::{Assertion, ValidationSpecification};

/// Maximum number of proxy hops below a root ticket-granting ticket.
///
/// Deployments can lower this through configuration.
pub const MAX_PROXY_CHAIN_DEPTH: usize = 64;

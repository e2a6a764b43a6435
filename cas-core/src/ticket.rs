//! Ticket types and their lifecycle.
//!
//! Three kinds of ticket exist:
//!
//! - [`TicketGrantingTicket`]: the SSO session. A ticket-granting ticket with
//!   a parent is a proxy-granting ticket; it shares the same type.
//! - [`ServiceTicket`]: a one-shot credential for a single service. Issued
//!   from a proxy-granting ticket it is called a proxy ticket.
//! - [`Ticket`]: the closed sum over the above, as stored in a registry.
//!
//! Parent links are strong [`Arc`]s pointing toward the root. A parent must
//! exist before its child is built, so the chain can never contain a cycle,
//! and every walk up the chain is a plain loop.
//!
//! # Concurrency
//!
//! Tickets are shared across threads. Usage counters sit behind a mutex,
//! the explicit-expiry flag and the "already granted a PGT" flag are atomics,
//! and the map of granted services has its own mutex that is held for the
//! whole grant so that reading the use count, recording the use and inserting
//! the service are one step.

use crate::authentication::Authentication;
use crate::error::{Error, Result};
use crate::expiration::{ExpirationPolicy, TicketState};
use crate::service::{normalize_service_id, Service};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub const TICKET_GRANTING_TICKET_PREFIX: &str = "TGT";
pub const PROXY_GRANTING_TICKET_PREFIX: &str = "PGT";
pub const SERVICE_TICKET_PREFIX: &str = "ST";
pub const PROXY_TICKET_PREFIX: &str = "PT";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Identifiers
// ============================================================================

/// Kind of ticket, encoded in the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    TicketGranting,
    ProxyGranting,
    Service,
    Proxy,
}

impl TicketKind {
    pub const ALL: [TicketKind; 4] = [
        TicketKind::TicketGranting,
        TicketKind::ProxyGranting,
        TicketKind::Service,
        TicketKind::Proxy,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::TicketGranting => TICKET_GRANTING_TICKET_PREFIX,
            Self::ProxyGranting => PROXY_GRANTING_TICKET_PREFIX,
            Self::Service => SERVICE_TICKET_PREFIX,
            Self::Proxy => PROXY_TICKET_PREFIX,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    /// Ticket-granting and proxy-granting tickets.
    pub fn is_granting(self) -> bool {
        matches!(self, Self::TicketGranting | Self::ProxyGranting)
    }

    /// Service and proxy tickets.
    pub fn is_service(self) -> bool {
        matches!(self, Self::Service | Self::Proxy)
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Opaque ticket identifier of the form `<PREFIX>-<suffix>`.
///
/// Equality, ordering and hashing use the string alone, so a `&str` can be
/// used to look up a `TicketId` key.
#[derive(Clone)]
pub struct TicketId {
    value: String,
    kind: TicketKind,
}

impl TicketId {
    /// Parse a ticket id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTicketId` if the prefix is unknown, the suffix is empty,
    /// or the id contains whitespace or control characters.
    pub fn from_string(s: impl Into<String>) -> Result<Self> {
        let value = s.into();
        let preview: String = value.chars().take(20).collect();

        let Some((prefix, suffix)) = value.split_once('-') else {
            return Err(Error::InvalidTicketId(format!(
                "ticket id must look like '<PREFIX>-<suffix>', got: {}",
                preview
            )));
        };
        let Some(kind) = TicketKind::from_prefix(prefix) else {
            return Err(Error::InvalidTicketId(format!(
                "unknown ticket prefix '{}'",
                prefix.chars().take(8).collect::<String>()
            )));
        };
        if suffix.is_empty() {
            return Err(Error::InvalidTicketId(format!("empty ticket id suffix: {}", preview)));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidTicketId(
                "ticket id contains whitespace or control characters".to_string(),
            ));
        }

        Ok(Self { value, kind })
    }

    pub fn kind(&self) -> TicketKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Form of the id that is safe to write to logs: prefix and the last four
    /// characters, with a fixed-width mask in between.
    pub fn sanitized(&self) -> String {
        sanitize_ticket_id(&self.value)
    }
}

/// Mask a ticket id for logging.
///
/// Strings that do not carry a known prefix are masked entirely.
pub fn sanitize_ticket_id(raw: &str) -> String {
    const VISIBLE_TAIL: usize = 4;
    const MASK: &str = "********";

    match raw.split_once('-') {
        Some((prefix, suffix)) if TicketKind::from_prefix(prefix).is_some() => {
            let chars: Vec<char> = suffix.chars().collect();
            if chars.len() <= VISIBLE_TAIL * 2 {
                format!("{}-{}", prefix, MASK)
            } else {
                let tail: String = chars[chars.len() - VISIBLE_TAIL..].iter().collect();
                format!("{}-{}{}", prefix, MASK, tail)
            }
        }
        _ => MASK.to_string(),
    }
}

impl PartialEq for TicketId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for TicketId {}

impl Hash for TicketId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for TicketId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TicketId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl Borrow<str> for TicketId {
    fn borrow(&self) -> &str {
        &self.value
    }
}

impl AsRef<str> for TicketId {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TicketId({})", self.sanitized())
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl std::str::FromStr for TicketId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl Serialize for TicketId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for TicketId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TicketId::from_string(s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Shared ticket state
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Usage {
    last_time_used: DateTime<Utc>,
    previous_time_used: DateTime<Utc>,
    count_of_uses: u32,
}

impl Usage {
    /// Shift the usage window forward. The clock reading is clamped so the
    /// timestamps never move backwards.
    fn advance(&mut self, now: DateTime<Utc>) {
        let now = now.max(self.last_time_used);
        self.previous_time_used = self.last_time_used;
        self.last_time_used = now;
        self.count_of_uses = self.count_of_uses.saturating_add(1);
    }
}

/// State common to every ticket kind.
struct TicketCore {
    id: TicketId,
    creation_time: DateTime<Utc>,
    usage: Mutex<Usage>,
    expiration_policy: Arc<dyn ExpirationPolicy>,
    expired: AtomicBool,
}

impl TicketCore {
    fn new(id: TicketId, expiration_policy: Arc<dyn ExpirationPolicy>) -> Self {
        let now = Utc::now();
        Self {
            id,
            creation_time: now,
            usage: Mutex::new(Usage {
                last_time_used: now,
                previous_time_used: now,
                count_of_uses: 0,
            }),
            expiration_policy,
            expired: AtomicBool::new(false),
        }
    }

    fn usage(&self) -> Usage {
        *lock(&self.usage)
    }

    fn record_use(&self) {
        lock(&self.usage).advance(Utc::now());
    }

    fn state<'a>(&self, usage: &Usage, authentication: &'a Authentication) -> TicketState<'a> {
        TicketState {
            creation_time: self.creation_time,
            last_time_used: usage.last_time_used,
            previous_time_used: usage.previous_time_used,
            count_of_uses: usage.count_of_uses,
            authentication,
        }
    }

    fn is_expired_with(
        &self,
        usage: &Usage,
        authentication: &Authentication,
        now: DateTime<Utc>,
    ) -> bool {
        self.expired.load(Ordering::Acquire)
            || self
                .expiration_policy
                .is_expired_at(&self.state(usage, authentication), now)
    }

    /// Policy or explicit expiry of this ticket alone, ignoring ancestors.
    fn is_locally_expired_at(&self, authentication: &Authentication, now: DateTime<Utc>) -> bool {
        let usage = self.usage();
        self.is_expired_with(&usage, authentication, now)
    }

    fn expire(&self) {
        self.expired.store(true, Ordering::Release);
    }
}

// ============================================================================
// Ticket-granting ticket
// ============================================================================

/// An SSO session, or a proxy-granting ticket when it has a parent.
pub struct TicketGrantingTicket {
    core: TicketCore,
    authentication: Authentication,
    supplemental_authentications: Mutex<Vec<Authentication>>,
    parent: Option<Arc<TicketGrantingTicket>>,
    proxied_by: Option<Arc<dyn Service>>,
    services: Mutex<HashMap<TicketId, Arc<dyn Service>>>,
    proxy_granting_tickets: Mutex<Vec<TicketId>>,
}

impl TicketGrantingTicket {
    /// Build a ticket-granting ticket.
    ///
    /// A `PGT` id requires a parent and a `TGT` id forbids one.
    pub(crate) fn new(
        id: TicketId,
        parent: Option<Arc<TicketGrantingTicket>>,
        proxied_by: Option<Arc<dyn Service>>,
        authentication: Authentication,
        expiration_policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<Self> {
        match (id.kind(), parent.is_some()) {
            (TicketKind::TicketGranting, false) | (TicketKind::ProxyGranting, true) => {}
            (TicketKind::TicketGranting, true) => {
                return Err(Error::TicketCreation(format!(
                    "{} is a root ticket id but a parent was supplied",
                    id.sanitized()
                )))
            }
            (TicketKind::ProxyGranting, false) => {
                return Err(Error::TicketCreation(format!(
                    "{} is a proxy-granting ticket id but no parent was supplied",
                    id.sanitized()
                )))
            }
            (kind, _) => {
                return Err(Error::TicketCreation(format!(
                    "{} ticket id cannot name a ticket-granting ticket",
                    kind
                )))
            }
        }

        Ok(Self {
            core: TicketCore::new(id, expiration_policy),
            authentication,
            supplemental_authentications: Mutex::new(Vec::new()),
            parent,
            proxied_by,
            services: Mutex::new(HashMap::new()),
            proxy_granting_tickets: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &TicketId {
        &self.core.id
    }

    pub fn kind(&self) -> TicketKind {
        self.core.id.kind()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.core.creation_time
    }

    pub fn last_time_used(&self) -> DateTime<Utc> {
        self.core.usage().last_time_used
    }

    pub fn previous_time_used(&self) -> DateTime<Utc> {
        self.core.usage().previous_time_used
    }

    pub fn count_of_uses(&self) -> u32 {
        self.core.usage().count_of_uses
    }

    pub fn expiration_policy(&self) -> &Arc<dyn ExpirationPolicy> {
        &self.core.expiration_policy
    }

    /// Advance the usage counters by one use.
    pub fn record_use(&self) {
        self.core.record_use();
    }

    /// The authentication this ticket was created with.
    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Authentications added after creation, e.g. by re-entering credentials
    /// during renew.
    pub fn supplemental_authentications(&self) -> Vec<Authentication> {
        lock(&self.supplemental_authentications).clone()
    }

    pub fn add_supplemental_authentication(&self, authentication: Authentication) {
        lock(&self.supplemental_authentications).push(authentication);
    }

    pub fn parent(&self) -> Option<&Arc<TicketGrantingTicket>> {
        self.parent.as_ref()
    }

    /// Service that obtained this proxy-granting ticket.
    pub fn proxied_by(&self) -> Option<&Arc<dyn Service>> {
        self.proxied_by.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Walk to the top of the chain. A root returns itself.
    pub fn root(self: &Arc<Self>) -> Arc<Self> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Number of tickets from here to the root, inclusive.
    pub fn chain_length(&self) -> usize {
        let mut length = 1;
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            length += 1;
            current = parent;
        }
        length
    }

    /// Authentications along the chain, this ticket first and the root last.
    pub fn chained_authentications(&self) -> Vec<Authentication> {
        let mut chain = vec![self.authentication.clone()];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent.authentication.clone());
            current = parent;
        }
        chain
    }

    /// Authentication of the original login at the root of the chain.
    pub fn root_authentication(&self) -> &Authentication {
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            current = parent;
        }
        &current.authentication
    }

    /// Grant a service ticket and record `service` as granted under `id`.
    ///
    /// The service ticket is marked as coming from a new login when this
    /// ticket had never been used before the grant, or when credentials were
    /// just presented. The granted service has the root principal attached.
    ///
    /// When `only_track_most_recent_session` is set, an earlier grant to a
    /// service with the same normalized id is forgotten.
    pub fn grant_service_ticket(
        self: &Arc<Self>,
        id: TicketId,
        service: Arc<dyn Service>,
        expiration_policy: Arc<dyn ExpirationPolicy>,
        credentials_provided: bool,
        only_track_most_recent_session: bool,
    ) -> Result<Arc<ServiceTicket>> {
        if !id.kind().is_service() {
            return Err(Error::TicketCreation(format!(
                "{} ticket id cannot name a service ticket",
                id.kind()
            )));
        }

        let mut services = lock(&self.services);

        let from_new_login = self.core.usage().count_of_uses == 0 || credentials_provided;
        let ticket = Arc::new(ServiceTicket {
            core: TicketCore::new(id.clone(), expiration_policy),
            granting_ticket: Arc::clone(self),
            service: Arc::clone(&service),
            from_new_login,
            granted_ticket_already: AtomicBool::new(false),
        });

        self.core.record_use();
        service.set_principal(self.root_authentication().principal());

        if only_track_most_recent_session {
            let path = normalize_service_id(service.id());
            services.retain(|existing_id, existing| {
                let same = normalize_service_id(existing.id()) == path;
                if same {
                    debug!(
                        ticket_id = %existing_id.sanitized(),
                        service = %existing.id(),
                        "Replacing earlier session for service"
                    );
                }
                !same
            });
        }
        services.insert(id, service);

        Ok(ticket)
    }

    /// Snapshot of services granted through this ticket.
    pub fn services(&self) -> HashMap<TicketId, Arc<dyn Service>> {
        lock(&self.services).clone()
    }

    pub fn service_count(&self) -> usize {
        lock(&self.services).len()
    }

    pub fn remove_all_services(&self) {
        lock(&self.services).clear();
    }

    /// Ids of proxy-granting tickets issued with this ticket as parent.
    pub fn proxy_granting_tickets(&self) -> Vec<TicketId> {
        lock(&self.proxy_granting_tickets).clone()
    }

    pub(crate) fn add_proxy_granting_ticket(&self, id: TicketId) {
        lock(&self.proxy_granting_tickets).push(id);
    }

    pub(crate) fn remove_proxy_granting_ticket(&self, id: &str) {
        lock(&self.proxy_granting_tickets).retain(|pgt| pgt.as_str() != id);
    }

    /// Force this ticket, and therefore every descendant, to read as expired.
    pub fn expire(&self) {
        self.core.expire();
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expired by its own policy, explicitly, or through any ancestor.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let mut current = Some(self);
        while let Some(ticket) = current {
            if ticket.core.is_locally_expired_at(&ticket.authentication, now) {
                return true;
            }
            current = ticket.parent.as_deref();
        }
        false
    }
}

impl fmt::Debug for TicketGrantingTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketGrantingTicket")
            .field("id", &self.core.id)
            .field("principal", &self.authentication.principal().id())
            .field("parent", &self.parent.as_ref().map(|p| p.id().clone()))
            .field("count_of_uses", &self.count_of_uses())
            .finish_non_exhaustive()
    }
}

impl PartialEq for TicketGrantingTicket {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for TicketGrantingTicket {}

impl Hash for TicketGrantingTicket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

// ============================================================================
// Service ticket
// ============================================================================

/// One-shot credential bound to one service.
pub struct ServiceTicket {
    core: TicketCore,
    granting_ticket: Arc<TicketGrantingTicket>,
    service: Arc<dyn Service>,
    from_new_login: bool,
    granted_ticket_already: AtomicBool,
}

impl ServiceTicket {
    pub fn id(&self) -> &TicketId {
        &self.core.id
    }

    pub fn kind(&self) -> TicketKind {
        self.core.id.kind()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.core.creation_time
    }

    pub fn last_time_used(&self) -> DateTime<Utc> {
        self.core.usage().last_time_used
    }

    pub fn previous_time_used(&self) -> DateTime<Utc> {
        self.core.usage().previous_time_used
    }

    pub fn count_of_uses(&self) -> u32 {
        self.core.usage().count_of_uses
    }

    pub fn expiration_policy(&self) -> &Arc<dyn ExpirationPolicy> {
        &self.core.expiration_policy
    }

    pub fn record_use(&self) {
        self.core.record_use();
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub fn granting_ticket(&self) -> &Arc<TicketGrantingTicket> {
        &self.granting_ticket
    }

    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Whether a proxy-granting ticket has already been issued from this ticket.
    pub fn has_granted_ticket(&self) -> bool {
        self.granted_ticket_already.load(Ordering::Acquire)
    }

    /// Record a use, then report whether `service` is the one this ticket was
    /// issued for. The use is recorded even on mismatch.
    pub fn is_valid_for(&self, service: &dyn Service) -> bool {
        self.core.record_use();
        self.service.matches(service)
    }

    /// Check liveness and record a use as a single step.
    ///
    /// Concurrent callers racing on a single-use ticket see exactly one
    /// success; the rest get `InvalidTicket`.
    ///
    /// # Errors
    ///
    /// - `InvalidTicket` if this ticket or its chain is expired.
    /// - `ServiceMismatch` if `service` is not the one the ticket was issued
    ///   for. The use is still recorded.
    pub fn validate_for(&self, service: &dyn Service) -> Result<()> {
        let now = Utc::now();
        {
            let mut usage = lock(&self.core.usage);
            let expired = self.core.is_expired_with(
                &usage,
                self.granting_ticket.authentication(),
                now,
            ) || self.granting_ticket.is_expired_at(now);
            if expired {
                return Err(Error::InvalidTicket(format!(
                    "service ticket {} is expired",
                    self.id().sanitized()
                )));
            }
            usage.advance(now);
        }

        if !self.service.matches(service) {
            return Err(Error::ServiceMismatch {
                ticket_id: self.id().sanitized(),
                service: service.id().to_string(),
            });
        }
        Ok(())
    }

    /// Issue the proxy-granting ticket for this service ticket.
    ///
    /// The new ticket's parent is this ticket's granting ticket and it is
    /// recorded as proxied by this ticket's service. Only one grant ever
    /// succeeds; every later or concurrent call fails.
    ///
    /// # Errors
    ///
    /// - `TicketCreation` if `id` is not a proxy-granting ticket id.
    /// - `TicketState` if a proxy-granting ticket was already granted.
    pub fn grant_ticket_granting_ticket(
        &self,
        id: TicketId,
        authentication: Authentication,
        expiration_policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<Arc<TicketGrantingTicket>> {
        if id.kind() != TicketKind::ProxyGranting {
            return Err(Error::TicketCreation(format!(
                "{} ticket id cannot name a proxy-granting ticket",
                id.kind()
            )));
        }

        if self
            .granted_ticket_already
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                ticket_id = %self.id().sanitized(),
                service = %self.service.id(),
                "Service ticket asked to grant a second proxy-granting ticket"
            );
            return Err(Error::TicketState(format!(
                "service ticket {} has already granted a proxy-granting ticket",
                self.id().sanitized()
            )));
        }

        let pgt = Arc::new(TicketGrantingTicket::new(
            id,
            Some(Arc::clone(&self.granting_ticket)),
            Some(Arc::clone(&self.service)),
            authentication,
            expiration_policy,
        )?);
        self.granting_ticket.add_proxy_granting_ticket(pgt.id().clone());

        Ok(pgt)
    }

    pub fn expire(&self) {
        self.core.expire();
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expired by its own policy, explicitly, or because its granting chain is.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.core
            .is_locally_expired_at(self.granting_ticket.authentication(), now)
            || self.granting_ticket.is_expired_at(now)
    }
}

impl fmt::Debug for ServiceTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTicket")
            .field("id", &self.core.id)
            .field("service", &self.service.id())
            .field("granting_ticket", self.granting_ticket.id())
            .field("from_new_login", &self.from_new_login)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ServiceTicket {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for ServiceTicket {}

impl Hash for ServiceTicket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// Any ticket, as held by a registry.
#[derive(Debug, Clone)]
pub enum Ticket {
    TicketGranting(Arc<TicketGrantingTicket>),
    ProxyGranting(Arc<TicketGrantingTicket>),
    Service(Arc<ServiceTicket>),
}

impl Ticket {
    pub fn id(&self) -> &TicketId {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.id(),
            Self::Service(t) => t.id(),
        }
    }

    pub fn kind(&self) -> TicketKind {
        self.id().kind()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.creation_time(),
            Self::Service(t) => t.creation_time(),
        }
    }

    pub fn count_of_uses(&self) -> u32 {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.count_of_uses(),
            Self::Service(t) => t.count_of_uses(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.is_expired_at(now),
            Self::Service(t) => t.is_expired_at(now),
        }
    }

    pub fn expire(&self) {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.expire(),
            Self::Service(t) => t.expire(),
        }
    }

    /// The ticket this one was issued from: the parent of a proxy-granting
    /// ticket, or the granting ticket of a service ticket.
    pub fn granting_ticket(&self) -> Option<&Arc<TicketGrantingTicket>> {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => t.parent(),
            Self::Service(t) => Some(t.granting_ticket()),
        }
    }

    pub fn as_ticket_granting(&self) -> Option<&Arc<TicketGrantingTicket>> {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => Some(t),
            Self::Service(_) => None,
        }
    }

    pub fn as_service_ticket(&self) -> Option<&Arc<ServiceTicket>> {
        match self {
            Self::Service(t) => Some(t),
            _ => None,
        }
    }

    /// Retention hint from the ticket's expiration policy.
    pub fn time_to_live(&self) -> Option<Duration> {
        match self {
            Self::TicketGranting(t) | Self::ProxyGranting(t) => {
                t.expiration_policy().time_to_live()
            }
            Self::Service(t) => t.expiration_policy().time_to_live(),
        }
    }
}

impl From<Arc<TicketGrantingTicket>> for Ticket {
    fn from(ticket: Arc<TicketGrantingTicket>) -> Self {
        match ticket.kind() {
            TicketKind::ProxyGranting => Self::ProxyGranting(ticket),
            _ => Self::TicketGranting(ticket),
        }
    }
}

impl From<Arc<ServiceTicket>> for Ticket {
    fn from(ticket: Arc<ServiceTicket>) -> Self {
        Self::Service(ticket)
    }
}

impl PartialEq for Ticket {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Ticket {}

impl Hash for Ticket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

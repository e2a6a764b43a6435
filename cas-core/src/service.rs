//! Services that request tickets, and the registry of services allowed to.
//!
//! A [`Service`] is the protocol-level identity presented on a login or
//! validation request. A [`RegisteredService`] is the administrative record
//! that decides whether such a service may use SSO or proxying.

use crate::authentication::Principal;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

/// A relying party requesting or validating tickets.
pub trait Service: Send + Sync + fmt::Debug {
    /// The service identifier, usually the URL the browser returns to.
    fn id(&self) -> &str;

    /// Whether `other` identifies the same service.
    fn matches(&self, other: &dyn Service) -> bool;

    /// Attach the principal the service is being granted a ticket for.
    fn set_principal(&self, principal: &Principal);

    fn principal(&self) -> Option<Principal>;

    /// Key used to select the ticket id generator for this service.
    ///
    /// Defaults to the concrete type name; see [`service_type_of`].
    fn service_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The service type key for `S`, matching the default [`Service::service_type`].
pub fn service_type_of<S: Service>() -> &'static str {
    std::any::type_name::<S>()
}

/// Strip the query string, path parameters and fragment from a service id.
///
/// Two grants whose ids normalize to the same value are treated as the same
/// session slot when only the most recent session is tracked.
pub fn normalize_service_id(id: &str) -> &str {
    match id.find(['?', ';', '#']) {
        Some(idx) => &id[..idx],
        None => id,
    }
}

/// A browser-facing web application identified by URL.
#[derive(Debug)]
pub struct WebApplicationService {
    id: String,
    original_url: String,
    artifact_id: Option<String>,
    principal: Mutex<Option<Principal>>,
}

impl WebApplicationService {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            original_url: id.clone(),
            id,
            artifact_id: None,
            principal: Mutex::new(None),
        }
    }

    /// Build a service from the raw `service` parameter, keeping the original
    /// URL but dropping the fragment from the id.
    pub fn from_url(url: impl Into<String>) -> Self {
        let original_url = url.into();
        let id = match original_url.find('#') {
            Some(idx) => original_url[..idx].to_string(),
            None => original_url.clone(),
        };
        Self {
            id,
            original_url,
            artifact_id: None,
            principal: Mutex::new(None),
        }
    }

    pub fn with_artifact_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    pub fn artifact_id(&self) -> Option<&str> {
        self.artifact_id.as_deref()
    }
}

impl Clone for WebApplicationService {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            original_url: self.original_url.clone(),
            artifact_id: self.artifact_id.clone(),
            principal: Mutex::new(self.principal()),
        }
    }
}

impl Service for WebApplicationService {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, other: &dyn Service) -> bool {
        self.id == other.id()
    }

    fn set_principal(&self, principal: &Principal) {
        *self.principal.lock().unwrap_or_else(PoisonError::into_inner) = Some(principal.clone());
    }

    fn principal(&self) -> Option<Principal> {
        self.principal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Registered services
// ============================================================================

/// Administrative record describing which services may use the ticketing
/// service and how.
#[derive(Debug, Clone)]
pub struct RegisteredService {
    id: u64,
    name: String,
    service_id: String,
    pattern: Regex,
    evaluation_order: i32,
    enabled: bool,
    sso_enabled: bool,
    proxy_allowed: bool,
    required_handlers: Vec<String>,
}

impl RegisteredService {
    /// Create a registered service matching ids against `service_id`.
    ///
    /// The pattern must match the whole service id.
    pub fn new(id: u64, name: impl Into<String>, service_id: impl Into<String>) -> Result<Self> {
        let service_id = service_id.into();
        let pattern = Regex::new(&format!("^(?:{})$", service_id)).map_err(|e| {
            Error::ConfigurationError(format!(
                "invalid service id pattern '{}': {}",
                service_id, e
            ))
        })?;
        Ok(Self {
            id,
            name: name.into(),
            service_id,
            pattern,
            evaluation_order: 0,
            enabled: true,
            sso_enabled: true,
            proxy_allowed: false,
            required_handlers: Vec::new(),
        })
    }

    pub fn with_evaluation_order(mut self, order: i32) -> Self {
        self.evaluation_order = order;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sso_enabled(mut self, sso_enabled: bool) -> Self {
        self.sso_enabled = sso_enabled;
        self
    }

    pub fn with_proxy_allowed(mut self, proxy_allowed: bool) -> Self {
        self.proxy_allowed = proxy_allowed;
        self
    }

    pub fn with_required_handlers<I, S>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_handlers = handlers.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn evaluation_order(&self) -> i32 {
        self.evaluation_order
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_sso_enabled(&self) -> bool {
        self.sso_enabled
    }

    pub fn is_proxy_allowed(&self) -> bool {
        self.proxy_allowed
    }

    pub fn required_handlers(&self) -> &[String] {
        &self.required_handlers
    }

    pub fn matches(&self, service: &dyn Service) -> bool {
        self.pattern.is_match(service.id())
    }
}

/// Lookup of registered services.
pub trait ServicesManager: Send + Sync + fmt::Debug {
    /// First registered service (by evaluation order) matching `service`.
    fn find_service_by(&self, service: &dyn Service) -> Option<RegisteredService>;

    fn find_service_by_id(&self, id: u64) -> Option<RegisteredService>;

    /// Insert or replace the record with the same numeric id.
    fn save(&self, registered_service: RegisteredService);

    fn delete(&self, id: u64) -> Option<RegisteredService>;

    fn all_services(&self) -> Vec<RegisteredService>;

    fn matches_existing_service(&self, service: &dyn Service) -> bool {
        self.find_service_by(service).is_some()
    }
}

/// In-memory [`ServicesManager`] kept sorted by evaluation order.
#[derive(Debug, Default)]
pub struct DefaultServicesManager {
    services: RwLock<Vec<RegisteredService>>,
}

impl DefaultServicesManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: impl IntoIterator<Item = RegisteredService>) -> Self {
        let manager = Self::new();
        for service in services {
            manager.save(service);
        }
        manager
    }
}

impl ServicesManager for DefaultServicesManager {
    fn find_service_by(&self, service: &dyn Service) -> Option<RegisteredService> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let found = services.iter().find(|r| r.matches(service)).cloned();
        if found.is_none() {
            debug!(service = %service.id(), "No registered service matches");
        }
        found
    }

    fn find_service_by_id(&self, id: u64) -> Option<RegisteredService> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.iter().find(|r| r.id == id).cloned()
    }

    fn save(&self, registered_service: RegisteredService) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services.retain(|r| r.id != registered_service.id);
        services.push(registered_service);
        services.sort_by_key(|r| (r.evaluation_order, r.id));
    }

    fn delete(&self, id: u64) -> Option<RegisteredService> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let idx = services.iter().position(|r| r.id == id)?;
        Some(services.remove(idx))
    }

    fn all_services(&self) -> Vec<RegisteredService> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_service_matches_exact_id() {
        let a = WebApplicationService::new("https://app.example.org/");
        let b = WebApplicationService::new("https://app.example.org/");
        let c = WebApplicationService::new("https://app.example.org/other");
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_from_url_drops_fragment() {
        let s = WebApplicationService::from_url("https://app.example.org/page#section");
        assert_eq!(s.id(), "https://app.example.org/page");
        assert_eq!(s.original_url(), "https://app.example.org/page#section");
    }

    #[test]
    fn test_normalize_service_id() {
        assert_eq!(normalize_service_id("https://a/x?y=1"), "https://a/x");
        assert_eq!(normalize_service_id("https://a/x;jsessionid=1"), "https://a/x");
        assert_eq!(normalize_service_id("https://a/x#frag"), "https://a/x");
        assert_eq!(normalize_service_id("https://a/x"), "https://a/x");
    }

    #[test]
    fn test_service_type_matches_helper() {
        let s = WebApplicationService::new("https://a/");
        assert_eq!(s.service_type(), service_type_of::<WebApplicationService>());

        let dynamic: &dyn Service = &s;
        assert_eq!(dynamic.service_type(), service_type_of::<WebApplicationService>());
    }

    #[test]
    fn test_set_principal_survives_clone() {
        let s = WebApplicationService::new("https://a/");
        s.set_principal(&Principal::new("alice"));
        let copy = s.clone();
        assert_eq!(copy.principal().unwrap().id(), "alice");
    }

    #[test]
    fn test_registered_service_pattern_is_anchored() {
        let rs = RegisteredService::new(1, "app", r"https://app\.example\.org/.*").unwrap();
        assert!(rs.matches(&WebApplicationService::new("https://app.example.org/login")));
        assert!(!rs.matches(&WebApplicationService::new(
            "https://evil.org/?r=https://app.example.org/"
        )));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        match RegisteredService::new(1, "bad", "(").unwrap_err() {
            Error::ConfigurationError(msg) => assert!(msg.contains("invalid service id pattern")),
            e => panic!("Expected ConfigurationError, got {:?}", e),
        }
    }

    #[test]
    fn test_manager_respects_evaluation_order() {
        let manager = DefaultServicesManager::with_services([
            RegisteredService::new(1, "catch-all", ".*")
                .unwrap()
                .with_evaluation_order(100),
            RegisteredService::new(2, "specific", r"https://app\.example\.org/.*")
                .unwrap()
                .with_evaluation_order(1)
                .with_proxy_allowed(true),
        ]);

        let found = manager
            .find_service_by(&WebApplicationService::new("https://app.example.org/x"))
            .unwrap();
        assert_eq!(found.name(), "specific");
        assert!(found.is_proxy_allowed());

        let fallback = manager
            .find_service_by(&WebApplicationService::new("https://other.org/"))
            .unwrap();
        assert_eq!(fallback.name(), "catch-all");
    }

    #[test]
    fn test_manager_save_replaces_and_delete() {
        let manager = DefaultServicesManager::new();
        manager.save(RegisteredService::new(7, "v1", ".*").unwrap());
        manager.save(RegisteredService::new(7, "v2", ".*").unwrap());
        assert_eq!(manager.all_services().len(), 1);
        assert_eq!(manager.find_service_by_id(7).unwrap().name(), "v2");

        assert!(manager.delete(7).is_some());
        assert!(manager.delete(7).is_none());
        assert!(!manager.matches_existing_service(&WebApplicationService::new("https://a/")));
    }
}

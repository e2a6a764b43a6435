//! Validation results and the specifications they are checked against.

use crate::authentication::Authentication;
use crate::error::{Error, Result};
use crate::service::Service;
use std::sync::Arc;

/// What a successful service ticket validation proves.
#[derive(Debug, Clone)]
pub struct Assertion {
    chained_authentications: Vec<Authentication>,
    service: Arc<dyn Service>,
    from_new_login: bool,
}

impl Assertion {
    /// `chained_authentications` is ordered from the nearest ticket to the
    /// root login and must not be empty.
    pub fn new(
        chained_authentications: Vec<Authentication>,
        service: Arc<dyn Service>,
        from_new_login: bool,
    ) -> Result<Self> {
        if chained_authentications.is_empty() {
            return Err(Error::TicketCreation(
                "assertion requires at least one authentication".to_string(),
            ));
        }
        Ok(Self {
            chained_authentications,
            service,
            from_new_login,
        })
    }

    /// The original login, at the root of the chain.
    pub fn primary_authentication(&self) -> &Authentication {
        // Non-empty by construction
        &self.chained_authentications[self.chained_authentications.len() - 1]
    }

    pub fn chained_authentications(&self) -> &[Authentication] {
        &self.chained_authentications
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// True when the ticket came through at least one proxy.
    pub fn is_proxied(&self) -> bool {
        self.chained_authentications.len() > 1
    }

    /// Principal ids of the proxies, nearest first.
    pub fn proxies(&self) -> Vec<&str> {
        self.chained_authentications[..self.chained_authentications.len() - 1]
            .iter()
            .map(|a| a.principal().id())
            .collect()
    }
}

/// Requirements a validating service places on an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationSpecification {
    renew: bool,
    allow_proxies: bool,
}

impl ValidationSpecification {
    /// `/serviceValidate`: proxy tickets are not accepted.
    pub fn service_validate() -> Self {
        Self {
            renew: false,
            allow_proxies: false,
        }
    }

    /// `/proxyValidate`: proxy tickets are accepted.
    pub fn proxy_validate() -> Self {
        Self {
            renew: false,
            allow_proxies: true,
        }
    }

    /// Require the ticket to come from a fresh login.
    pub fn with_renew(mut self, renew: bool) -> Self {
        self.renew = renew;
        self
    }

    pub fn is_renew(&self) -> bool {
        self.renew
    }

    pub fn allows_proxies(&self) -> bool {
        self.allow_proxies
    }

    pub fn is_satisfied_by(&self, assertion: &Assertion) -> bool {
        self.unsatisfied_reason(assertion).is_none()
    }

    /// Like [`Self::is_satisfied_by`], with the reason as an error.
    pub fn check(&self, ticket_id: &str, assertion: &Assertion) -> Result<()> {
        match self.unsatisfied_reason(assertion) {
            None => Ok(()),
            Some(reason) => Err(Error::ValidationSpecificationUnsatisfied {
                ticket_id: ticket_id.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    fn unsatisfied_reason(&self, assertion: &Assertion) -> Option<&'static str> {
        if self.renew && !assertion.is_from_new_login() {
            return Some("renew requested but ticket did not come from a new login");
        }
        if !self.allow_proxies && assertion.is_proxied() {
            return Some("proxy tickets are not accepted");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::Principal;
    use crate::service::WebApplicationService;

    fn assertion(users: &[&str], from_new_login: bool) -> Assertion {
        Assertion::new(
            users
                .iter()
                .map(|u| Authentication::new(Principal::new(*u)))
                .collect(),
            Arc::new(WebApplicationService::new("https://a/")),
            from_new_login,
        )
        .unwrap()
    }

    #[test]
    fn test_primary_is_root() {
        let a = assertion(&["proxy2", "proxy1", "user"], false);
        assert_eq!(a.primary_authentication().principal().id(), "user");
        assert!(a.is_proxied());
        assert_eq!(a.proxies(), vec!["proxy2", "proxy1"]);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let result = Assertion::new(
            Vec::new(),
            Arc::new(WebApplicationService::new("https://a/")),
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_renew() {
        let spec = ValidationSpecification::proxy_validate().with_renew(true);
        assert!(spec.is_satisfied_by(&assertion(&["user"], true)));
        assert!(!spec.is_satisfied_by(&assertion(&["user"], false)));
    }

    #[test]
    fn test_proxies() {
        let proxied = assertion(&["proxy", "user"], true);
        assert!(ValidationSpecification::proxy_validate().is_satisfied_by(&proxied));

        match ValidationSpecification::service_validate()
            .check("PT-1", &proxied)
            .unwrap_err()
        {
            Error::ValidationSpecificationUnsatisfied { ticket_id, reason } => {
                assert_eq!(ticket_id, "PT-1");
                assert!(reason.contains("proxy"));
            }
            e => panic!("Expected ValidationSpecificationUnsatisfied, got {:?}", e),
        }
    }
}

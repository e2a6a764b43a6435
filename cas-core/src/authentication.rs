//! Principals, authentications, and contextual authentication policies.
//!
//! An [`Authentication`] is the immutable record of one successful login. It is
//! produced by the credential layer (outside this crate) and attached to a
//! ticket-granting ticket at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute bag shared by principals and authentications.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Authentication attribute marking a "remember me" login.
pub const REMEMBER_ME_ATTRIBUTE: &str = "remember_me";

/// The authenticated subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Record of a successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    principal: Principal,
    authentication_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    successful_handlers: Vec<String>,
}

impl Authentication {
    /// Create an authentication dated now.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            authentication_date: Utc::now(),
            attributes: Attributes::new(),
            successful_handlers: Vec::new(),
        }
    }

    pub fn with_authentication_date(mut self, date: DateTime<Utc>) -> Self {
        self.authentication_date = date;
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Record the name of a handler that vouched for the credentials.
    pub fn with_successful_handler(mut self, handler: impl Into<String>) -> Self {
        let handler = handler.into();
        if !self.successful_handlers.contains(&handler) {
            self.successful_handlers.push(handler);
        }
        self
    }

    /// Mark this as a "remember me" login.
    pub fn with_remember_me(self, remember_me: bool) -> Self {
        self.with_attribute(REMEMBER_ME_ATTRIBUTE, remember_me)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn authentication_date(&self) -> DateTime<Utc> {
        self.authentication_date
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn successful_handlers(&self) -> &[String] {
        &self.successful_handlers
    }

    /// True when the `remember_me` attribute is boolean `true`.
    pub fn is_remember_me(&self) -> bool {
        matches!(
            self.attributes.get(REMEMBER_ME_ATTRIBUTE),
            Some(serde_json::Value::Bool(true))
        )
    }
}

// ============================================================================
// Contextual policies
// ============================================================================

/// Description of a policy an authentication failed to meet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetPolicy {
    pub name: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl UnmetPolicy {
    pub fn new(name: impl Into<String>, requirements: Vec<String>) -> Self {
        Self {
            name: name.into(),
            requirements,
        }
    }
}

impl fmt::Display for UnmetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requirements.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.requirements.join(", "))
        }
    }
}

/// Policy evaluated against an authentication in the context of a service.
pub trait ContextualAuthenticationPolicy: Send + Sync + fmt::Debug {
    fn is_satisfied_by(&self, authentication: &Authentication) -> bool;

    /// Describe the policy for error reporting.
    fn describe(&self) -> UnmetPolicy;
}

/// Accepts every authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyAuthenticationPolicy;

impl ContextualAuthenticationPolicy for AcceptAnyAuthenticationPolicy {
    fn is_satisfied_by(&self, _authentication: &Authentication) -> bool {
        true
    }

    fn describe(&self) -> UnmetPolicy {
        UnmetPolicy::new("accept-any", Vec::new())
    }
}

/// Requires every named handler to appear among the authentication's
/// successful handlers.
#[derive(Debug, Clone, Default)]
pub struct RequiredHandlerAuthenticationPolicy {
    required_handlers: Vec<String>,
}

impl RequiredHandlerAuthenticationPolicy {
    pub fn new<I, S>(required_handlers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_handlers: required_handlers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required_handlers(&self) -> &[String] {
        &self.required_handlers
    }
}

impl ContextualAuthenticationPolicy for RequiredHandlerAuthenticationPolicy {
    fn is_satisfied_by(&self, authentication: &Authentication) -> bool {
        self.required_handlers
            .iter()
            .all(|h| authentication.successful_handlers().contains(h))
    }

    fn describe(&self) -> UnmetPolicy {
        UnmetPolicy::new("required-handlers", self.required_handlers.clone())
    }
}

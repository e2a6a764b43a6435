//! YAML configuration for the ticketing engine.
//!
//! ```yaml
//! version: "1"
//! ticket_granting_ticket:
//!   expiration:
//!     type: ticket_granting
//!     max_time_to_live_secs: 28800
//!     time_to_kill_secs: 7200
//! service_ticket:
//!   expiration:
//!     type: multi_use_or_timeout
//!     number_of_uses: 1
//!     time_to_kill_secs: 10
//! services:
//!   - id: 1
//!     name: Example
//!     service_id: "https://app\\.example\\.org/.*"
//! ```
//!
//! Every section is optional; omitted values take the defaults below.

use crate::expiration::{
    AlwaysExpiresExpirationPolicy, ExpirationPolicy, HardTimeoutExpirationPolicy,
    MultiTimeUseOrTimeoutExpirationPolicy, NeverExpiresExpirationPolicy,
    RememberMeDelegatingExpirationPolicy, ThrottledUseAndTimeoutExpirationPolicy,
    TicketGrantingTicketExpirationPolicy, TimeoutExpirationPolicy,
};
use crate::generator::{
    TicketGenerator, DEFAULT_ST_NUMBER_OF_USES, DEFAULT_ST_TIME_TO_KILL,
    DEFAULT_TGT_MAX_TIME_TO_LIVE, DEFAULT_TGT_TIME_TO_KILL,
};
use crate::id_generator::{
    DefaultUniqueTicketIdGenerator, UniqueTicketIdGenerator, UuidTicketIdGenerator,
    DEFAULT_RANDOM_LENGTH,
};
use crate::service::{DefaultServicesManager, RegisteredService, WebApplicationService};
use crate::MAX_PROXY_CHAIN_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a "remember me" session: 14 days.
pub const DEFAULT_REMEMBER_ME_TIME_TO_KILL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Errors loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration at {location}: {message}")]
    Invalid { location: String, message: String },

    #[error(transparent)]
    Ticketing(#[from] crate::error::Error),
}

impl ConfigError {
    fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Ticketing configuration parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub ticket_granting_ticket: TicketGrantingTicketSettings,
    #[serde(default)]
    pub service_ticket: ServiceTicketSettings,
    #[serde(default)]
    pub proxy_granting_ticket: ProxyGrantingTicketSettings,
    #[serde(default)]
    pub id_generator: IdGeneratorSettings,
    /// Forget an earlier grant to the same service path on a new grant
    #[serde(default = "default_true")]
    pub only_track_most_recent_session: bool,
    /// Maximum proxy hops below a root session
    #[serde(default = "default_max_proxy_chain_depth")]
    pub max_proxy_chain_depth: usize,
    #[serde(default)]
    pub services: Vec<RegisteredServiceConfig>,
}

fn default_version() -> String {
    "1".into()
}

fn default_true() -> bool {
    true
}

fn default_max_proxy_chain_depth() -> usize {
    MAX_PROXY_CHAIN_DEPTH
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            ticket_granting_ticket: TicketGrantingTicketSettings::default(),
            service_ticket: ServiceTicketSettings::default(),
            proxy_granting_ticket: ProxyGrantingTicketSettings::default(),
            id_generator: IdGeneratorSettings::default(),
            only_track_most_recent_session: true,
            max_proxy_chain_depth: MAX_PROXY_CHAIN_DEPTH,
            services: Vec::new(),
        }
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGrantingTicketSettings {
    #[serde(default = "default_tgt_expiration")]
    pub expiration: ExpirationPolicyConfig,
    /// Policy for "remember me" logins; `null` applies `expiration` to all
    #[serde(default = "default_remember_me_expiration")]
    pub remember_me: Option<ExpirationPolicyConfig>,
}

fn default_tgt_expiration() -> ExpirationPolicyConfig {
    ExpirationPolicyConfig::TicketGranting {
        max_time_to_live_secs: DEFAULT_TGT_MAX_TIME_TO_LIVE.as_secs(),
        time_to_kill_secs: DEFAULT_TGT_TIME_TO_KILL.as_secs(),
    }
}

fn default_remember_me_expiration() -> Option<ExpirationPolicyConfig> {
    Some(ExpirationPolicyConfig::HardTimeout {
        time_to_kill_secs: DEFAULT_REMEMBER_ME_TIME_TO_KILL.as_secs(),
    })
}

impl Default for TicketGrantingTicketSettings {
    fn default() -> Self {
        Self {
            expiration: default_tgt_expiration(),
            remember_me: default_remember_me_expiration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTicketSettings {
    #[serde(default = "default_st_expiration")]
    pub expiration: ExpirationPolicyConfig,
}

fn default_st_expiration() -> ExpirationPolicyConfig {
    ExpirationPolicyConfig::MultiUseOrTimeout {
        number_of_uses: DEFAULT_ST_NUMBER_OF_USES,
        time_to_kill_secs: DEFAULT_ST_TIME_TO_KILL.as_secs(),
    }
}

impl Default for ServiceTicketSettings {
    fn default() -> Self {
        Self {
            expiration: default_st_expiration(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyGrantingTicketSettings {
    /// Defaults to the session policy
    #[serde(default)]
    pub expiration: Option<ExpirationPolicyConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneratorKind {
    /// Counter plus random alphanumerics
    #[default]
    Default,
    /// UUID v7
    Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdGeneratorSettings {
    #[serde(default)]
    pub kind: IdGeneratorKind,
    #[serde(default = "default_random_length")]
    pub random_length: usize,
    /// Node suffix, typically the host name
    #[serde(default)]
    pub suffix: Option<String>,
}

fn default_random_length() -> usize {
    DEFAULT_RANDOM_LENGTH
}

impl Default for IdGeneratorSettings {
    fn default() -> Self {
        Self {
            kind: IdGeneratorKind::Default,
            random_length: DEFAULT_RANDOM_LENGTH,
            suffix: None,
        }
    }
}

impl IdGeneratorSettings {
    fn build(&self) -> Arc<dyn UniqueTicketIdGenerator> {
        match self.kind {
            IdGeneratorKind::Uuid => Arc::new(UuidTicketIdGenerator),
            IdGeneratorKind::Default => {
                let mut generator =
                    DefaultUniqueTicketIdGenerator::new().with_random_length(self.random_length);
                if let Some(suffix) = &self.suffix {
                    generator = generator.with_suffix(suffix.clone());
                }
                Arc::new(generator)
            }
        }
    }
}

/// Serializable description of an expiration policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpirationPolicyConfig {
    Never,
    Always,
    HardTimeout {
        time_to_kill_secs: u64,
    },
    Timeout {
        time_to_kill_secs: u64,
    },
    MultiUseOrTimeout {
        number_of_uses: u32,
        time_to_kill_secs: u64,
    },
    ThrottledUseAndTimeout {
        time_to_kill_secs: u64,
        time_in_between_uses_secs: u64,
    },
    TicketGranting {
        max_time_to_live_secs: u64,
        time_to_kill_secs: u64,
    },
    RememberMe {
        remember_me: Box<ExpirationPolicyConfig>,
        session: Box<ExpirationPolicyConfig>,
    },
}

impl ExpirationPolicyConfig {
    pub fn build(&self) -> Result<Arc<dyn ExpirationPolicy>, ConfigError> {
        let secs = Duration::from_secs;
        let policy: Arc<dyn ExpirationPolicy> = match self {
            Self::Never => Arc::new(NeverExpiresExpirationPolicy),
            Self::Always => Arc::new(AlwaysExpiresExpirationPolicy),
            Self::HardTimeout { time_to_kill_secs } => {
                Arc::new(HardTimeoutExpirationPolicy::new(secs(*time_to_kill_secs)))
            }
            Self::Timeout { time_to_kill_secs } => {
                Arc::new(TimeoutExpirationPolicy::new(secs(*time_to_kill_secs)))
            }
            Self::MultiUseOrTimeout {
                number_of_uses,
                time_to_kill_secs,
            } => {
                if *number_of_uses == 0 {
                    return Err(ConfigError::invalid(
                        "expiration.number_of_uses",
                        "must be at least 1",
                    ));
                }
                Arc::new(MultiTimeUseOrTimeoutExpirationPolicy::new(
                    *number_of_uses,
                    secs(*time_to_kill_secs),
                ))
            }
            Self::ThrottledUseAndTimeout {
                time_to_kill_secs,
                time_in_between_uses_secs,
            } => Arc::new(ThrottledUseAndTimeoutExpirationPolicy::new(
                secs(*time_to_kill_secs),
                secs(*time_in_between_uses_secs),
            )),
            Self::TicketGranting {
                max_time_to_live_secs,
                time_to_kill_secs,
            } => Arc::new(TicketGrantingTicketExpirationPolicy::new(
                secs(*max_time_to_live_secs),
                secs(*time_to_kill_secs),
            )?),
            Self::RememberMe {
                remember_me,
                session,
            } => Arc::new(RememberMeDelegatingExpirationPolicy::new(
                remember_me.build()?,
                session.build()?,
            )),
        };
        Ok(policy)
    }
}

/// A registered service as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredServiceConfig {
    pub id: u64,
    pub name: String,
    /// Regular expression matched against the whole service id
    pub service_id: String,
    #[serde(default)]
    pub evaluation_order: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sso_enabled: bool,
    #[serde(default)]
    pub proxy_allowed: bool,
    #[serde(default)]
    pub required_handlers: Vec<String>,
}

impl RegisteredServiceConfig {
    pub fn build(&self) -> Result<RegisteredService, ConfigError> {
        Ok(
            RegisteredService::new(self.id, self.name.clone(), self.service_id.clone())?
                .with_evaluation_order(self.evaluation_order)
                .with_enabled(self.enabled)
                .with_sso_enabled(self.sso_enabled)
                .with_proxy_allowed(self.proxy_allowed)
                .with_required_handlers(self.required_handlers.iter().cloned()),
        )
    }
}

impl TicketingConfig {
    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::FileRead {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Check cross-field consistency without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_generator.random_length == 0 {
            return Err(ConfigError::invalid(
                "id_generator.random_length",
                "must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for (i, service) in self.services.iter().enumerate() {
            if !seen.insert(service.id) {
                return Err(ConfigError::invalid(
                    format!("services[{}].id", i),
                    format!("duplicate service id {}", service.id),
                ));
            }
            if service.service_id.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("services[{}].service_id", i),
                    "pattern must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// The session policy, wrapped for "remember me" logins when configured.
    pub fn ticket_granting_ticket_expiration_policy(
        &self,
    ) -> Result<Arc<dyn ExpirationPolicy>, ConfigError> {
        let session = self.ticket_granting_ticket.expiration.build()?;
        let policy: Arc<dyn ExpirationPolicy> = match &self.ticket_granting_ticket.remember_me {
            Some(remember_me) => Arc::new(RememberMeDelegatingExpirationPolicy::new(
                remember_me.build()?,
                session,
            )),
            None => session,
        };
        Ok(policy)
    }

    /// Wire a [`TicketGenerator`] issuing tickets for web application services.
    pub fn build_generator(&self) -> Result<TicketGenerator, ConfigError> {
        self.validate()?;

        let tgt_policy = self.ticket_granting_ticket_expiration_policy()?;
        let pgt_policy = match &self.proxy_granting_ticket.expiration {
            Some(policy) => policy.build()?,
            None => Arc::clone(&tgt_policy),
        };

        Ok(TicketGenerator::builder()
            .ticket_granting_ticket_id_generator(self.id_generator.build())
            .service_ticket_id_generator::<WebApplicationService>(self.id_generator.build())
            .ticket_granting_ticket_expiration_policy(tgt_policy)
            .service_ticket_expiration_policy(self.service_ticket.expiration.build()?)
            .proxy_granting_ticket_expiration_policy(pgt_policy)
            .only_track_most_recent_session(self.only_track_most_recent_session)
            .max_proxy_chain_depth(self.max_proxy_chain_depth)
            .build()?)
    }

    pub fn build_services_manager(&self) -> Result<DefaultServicesManager, ConfigError> {
        self.validate()?;
        let services = self
            .services
            .iter()
            .map(RegisteredServiceConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DefaultServicesManager::with_services(services))
    }
}

//! Error types for the ticketing engine.
//!
//! Every failure is surfaced synchronously to the immediate caller. Nothing in
//! this crate retries or swallows an error; the web tier decides how each kind
//! is rendered for a protocol client.

use crate::authentication::UnmetPolicy;
use thiserror::Error;

/// Result type alias for ticketing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error codes.
///
/// Code ranges:
/// - 1000-1099: Ticket errors
/// - 1100-1199: Creation errors
/// - 1200-1299: Service errors
/// - 1300-1399: Proxy errors
/// - 1400-1499: Authentication policy errors
/// - 1500-1599: Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // Ticket errors (1000-1099)
    InvalidTicket = 1000,
    InvalidTicketSpec = 1001,
    TicketStateViolation = 1002,

    // Creation errors (1100-1199)
    TicketCreationFailed = 1100,

    // Service errors (1200-1299)
    InvalidService = 1200,
    UnauthorizedService = 1201,
    UnauthorizedSsoService = 1202,

    // Proxy errors (1300-1399)
    UnauthorizedProxying = 1300,
    ProxyChainTooDeep = 1301,

    // Authentication policy errors (1400-1499)
    UnsatisfiedAuthenticationPolicy = 1400,

    // Configuration errors (1500-1599)
    InvalidConfiguration = 1500,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Get machine-readable name (kebab-case).
    ///
    /// Names are unique per code, so they can be used as a metrics label.
    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidTicket => "invalid-ticket",
            Self::InvalidTicketSpec => "invalid-ticket-spec",
            Self::TicketStateViolation => "ticket-state-violation",
            Self::TicketCreationFailed => "ticket-creation-failed",
            Self::InvalidService => "invalid-service",
            Self::UnauthorizedService => "unauthorized-service",
            Self::UnauthorizedSsoService => "unauthorized-sso-service",
            Self::UnauthorizedProxying => "unauthorized-proxying",
            Self::ProxyChainTooDeep => "proxy-chain-too-deep",
            Self::UnsatisfiedAuthenticationPolicy => "unsatisfied-authentication-policy",
            Self::InvalidConfiguration => "invalid-configuration",
        }
    }

    /// Get the CAS protocol error code a validation response should carry.
    ///
    /// Several kinds share one protocol code; use [`ErrorCode::name`] when the
    /// kinds must stay distinguishable.
    pub fn protocol_code(self) -> &'static str {
        match self {
            Self::InvalidTicket | Self::TicketStateViolation => "INVALID_TICKET",
            Self::InvalidTicketSpec | Self::UnsatisfiedAuthenticationPolicy => {
                "INVALID_TICKET_SPEC"
            }
            Self::InvalidService | Self::UnauthorizedService | Self::UnauthorizedSsoService => {
                "INVALID_SERVICE"
            }
            Self::UnauthorizedProxying | Self::ProxyChainTooDeep => "UNAUTHORIZED_SERVICE_PROXY",
            Self::TicketCreationFailed | Self::InvalidConfiguration => "INTERNAL_ERROR",
        }
    }

    /// Get human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidTicket => "Ticket is unknown, expired, or already consumed",
            Self::InvalidTicketSpec => "Ticket does not satisfy the validation specification",
            Self::TicketStateViolation => "Ticket was asked to grant more than once",
            Self::TicketCreationFailed => "Ticket could not be created",
            Self::InvalidService => "Ticket was not issued for the presented service",
            Self::UnauthorizedService => "Service is not authorized to use the ticketing service",
            Self::UnauthorizedSsoService => "Service is not authorized to participate in SSO",
            Self::UnauthorizedProxying => "Service is not authorized to proxy",
            Self::ProxyChainTooDeep => "Proxy chain exceeds the permitted depth",
            Self::UnsatisfiedAuthenticationPolicy => {
                "Authentication does not satisfy the required policy"
            }
            Self::InvalidConfiguration => "Ticketing configuration is invalid",
        }
    }
}

/// Errors that can occur in ticketing operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Ticket Errors
    // =========================================================================
    /// Ticket id does not resolve, or resolves to an expired or consumed ticket.
    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    /// Ticket id is malformed (unknown prefix or empty suffix).
    #[error("invalid ticket id: {0}")]
    InvalidTicketId(String),

    /// Assertion produced by a valid ticket does not satisfy the validation
    /// specification (renew requested, proxies disallowed).
    #[error("ticket {ticket_id} does not satisfy validation specification: {reason}")]
    ValidationSpecificationUnsatisfied { ticket_id: String, reason: String },

    /// A single-grant ticket was asked to grant again.
    ///
    /// This signals replay or a programming error and must never be retried.
    #[error("ticket state violation: {0}")]
    TicketState(String),

    // =========================================================================
    // Creation Errors
    // =========================================================================
    /// A ticket could not be constructed.
    #[error("ticket creation failed: {0}")]
    TicketCreation(String),

    /// Freshly presented credentials resolved to a different principal than
    /// the one that owns the session.
    #[error("mixed principals: session belongs to '{original}', credentials resolved to '{presented}'")]
    MixedPrincipal { original: String, presented: String },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// A valid service ticket was presented by a service it was not issued for.
    #[error("ticket {ticket_id} was not issued for service '{service}'")]
    ServiceMismatch { ticket_id: String, service: String },

    /// Service is unknown to the service registry or disabled.
    #[error("unauthorized service: {0}")]
    UnauthorizedService(String),

    /// Service may not receive tickets through single sign-on, or no ticket id
    /// generator is configured for its type.
    #[error("unauthorized SSO service: {0}")]
    UnauthorizedSsoService(String),

    // =========================================================================
    // Proxy Errors
    // =========================================================================
    /// Service is not permitted to obtain or use proxy-granting tickets.
    #[error("unauthorized proxying: {0}")]
    UnauthorizedProxying(String),

    /// Proxy chain would exceed the configured depth.
    #[error("proxy chain depth {depth} exceeds maximum {max}")]
    ProxyChainTooDeep { depth: usize, max: usize },

    // =========================================================================
    // Policy Errors
    // =========================================================================
    /// Authentication does not meet a contextual policy.
    #[error("authentication policy not satisfied: {policy}")]
    UnsatisfiedAuthenticationPolicy { policy: UnmetPolicy },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration is inconsistent.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl Error {
    /// Map this error to a canonical error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTicket(_) => ErrorCode::InvalidTicket,
            Self::InvalidTicketId(_) => ErrorCode::InvalidTicketSpec,
            Self::ValidationSpecificationUnsatisfied { .. } => ErrorCode::InvalidTicketSpec,
            Self::TicketState(_) => ErrorCode::TicketStateViolation,
            Self::TicketCreation(_) => ErrorCode::TicketCreationFailed,
            Self::MixedPrincipal { .. } => ErrorCode::TicketCreationFailed,
            Self::ServiceMismatch { .. } => ErrorCode::InvalidService,
            Self::UnauthorizedService(_) => ErrorCode::UnauthorizedService,
            Self::UnauthorizedSsoService(_) => ErrorCode::UnauthorizedSsoService,
            Self::UnauthorizedProxying(_) => ErrorCode::UnauthorizedProxying,
            Self::ProxyChainTooDeep { .. } => ErrorCode::ProxyChainTooDeep,
            Self::UnsatisfiedAuthenticationPolicy { .. } => {
                ErrorCode::UnsatisfiedAuthenticationPolicy
            }
            Self::ConfigurationError(_) => ErrorCode::InvalidConfiguration,
        }
    }

    /// Get the machine-readable error name (kebab-case).
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Get the CAS protocol error code for this error.
    pub fn protocol_code(&self) -> &'static str {
        self.code().protocol_code()
    }

    /// Get human-readable description.
    pub fn description(&self) -> &'static str {
        self.code().description()
    }

    /// True when the failure may indicate ticket replay rather than a routine
    /// rejection.
    pub fn is_replay_signal(&self) -> bool {
        matches!(self, Self::TicketState(_))
    }

    /// True for failures caused by a gap in service or generator configuration.
    pub fn is_configuration_gap(&self) -> bool {
        matches!(
            self,
            Self::UnauthorizedService(_)
                | Self::UnauthorizedSsoService(_)
                | Self::ConfigurationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::InvalidTicket.code(), 1000);
        assert_eq!(ErrorCode::TicketStateViolation.code(), 1002);
        assert_eq!(ErrorCode::TicketCreationFailed.code(), 1100);
        assert_eq!(ErrorCode::UnauthorizedSsoService.code(), 1202);
        assert_eq!(ErrorCode::UnauthorizedProxying.code(), 1300);
        assert_eq!(ErrorCode::UnsatisfiedAuthenticationPolicy.code(), 1400);
        assert_eq!(ErrorCode::InvalidConfiguration.code(), 1500);
    }

    #[test]
    fn test_protocol_codes() {
        assert_eq!(
            Error::InvalidTicket("ST-1".into()).protocol_code(),
            "INVALID_TICKET"
        );
        assert_eq!(
            Error::ServiceMismatch {
                ticket_id: "ST-1".into(),
                service: "https://a".into()
            }
            .protocol_code(),
            "INVALID_SERVICE"
        );
        assert_eq!(
            Error::UnauthorizedProxying("no".into()).protocol_code(),
            "UNAUTHORIZED_SERVICE_PROXY"
        );
        assert_eq!(
            Error::TicketCreation("boom".into()).protocol_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_state_violation_distinct_from_invalid_ticket() {
        let replay = Error::TicketState("already granted".into());
        let invalid = Error::InvalidTicket("ST-1".into());

        // Same protocol code, different names
        assert_eq!(replay.protocol_code(), invalid.protocol_code());
        assert_ne!(replay.name(), invalid.name());
        assert!(replay.is_replay_signal());
        assert!(!invalid.is_replay_signal());
    }

    #[test]
    fn test_unsatisfied_policy_carries_context() {
        let err = Error::UnsatisfiedAuthenticationPolicy {
            policy: UnmetPolicy::new("required-handlers", vec!["otp".into()]),
        };
        match &err {
            Error::UnsatisfiedAuthenticationPolicy { policy } => {
                assert_eq!(policy.name, "required-handlers");
                assert_eq!(policy.requirements, vec!["otp".to_string()]);
            }
            e => panic!("Expected UnsatisfiedAuthenticationPolicy, got {:?}", e),
        }
        assert!(err.to_string().contains("otp"));
    }

    #[test]
    fn test_configuration_gaps() {
        assert!(Error::UnauthorizedSsoService("x".into()).is_configuration_gap());
        assert!(Error::UnauthorizedService("x".into()).is_configuration_gap());
        assert!(!Error::InvalidTicket("x".into()).is_configuration_gap());
    }

    #[test]
    fn test_error_name_format() {
        let codes = [
            ErrorCode::InvalidTicket,
            ErrorCode::InvalidTicketSpec,
            ErrorCode::TicketStateViolation,
            ErrorCode::TicketCreationFailed,
            ErrorCode::InvalidService,
            ErrorCode::UnauthorizedService,
            ErrorCode::UnauthorizedSsoService,
            ErrorCode::UnauthorizedProxying,
            ErrorCode::ProxyChainTooDeep,
            ErrorCode::UnsatisfiedAuthenticationPolicy,
            ErrorCode::InvalidConfiguration,
        ];

        for code in codes {
            let name = code.name();
            assert!(
                name.chars().all(|c| c.is_lowercase() || c == '-'),
                "Error name '{}' is not kebab-case",
                name
            );
            assert!(!name.starts_with('-') && !name.ends_with('-'));
        }
    }
}

//! Expiration policies.
//!
//! A policy is a pure predicate over a ticket's usage state and a point in
//! time. Policies never mutate tickets and are shared between many tickets, so
//! every implementation is `Send + Sync` and immutable after construction.

use crate::authentication::Authentication;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Read-only view of a ticket handed to an [`ExpirationPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct TicketState<'a> {
    pub creation_time: DateTime<Utc>,
    pub last_time_used: DateTime<Utc>,
    pub previous_time_used: DateTime<Utc>,
    pub count_of_uses: u32,
    /// Authentication of the ticket, or of its granting ticket for service
    /// tickets.
    pub authentication: &'a Authentication,
}

impl TicketState<'_> {
    fn since_creation(&self, now: DateTime<Utc>) -> ChronoDuration {
        now.signed_duration_since(self.creation_time)
    }

    fn since_last_use(&self, now: DateTime<Utc>) -> ChronoDuration {
        now.signed_duration_since(self.last_time_used)
    }
}

/// Decides whether a ticket is expired.
pub trait ExpirationPolicy: Send + Sync + fmt::Debug {
    /// Evaluate against an explicit clock reading.
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool;

    fn is_expired(&self, state: &TicketState<'_>) -> bool {
        self.is_expired_at(state, Utc::now())
    }

    /// Upper bound on how long a ticket under this policy can live, if any.
    ///
    /// Registries with native eviction use this as a retention hint.
    fn time_to_live(&self) -> Option<Duration>;
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

/// Never expires on its own; the ticket can still be expired explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExpiresExpirationPolicy;

impl ExpirationPolicy for NeverExpiresExpirationPolicy {
    fn is_expired_at(&self, _state: &TicketState<'_>, _now: DateTime<Utc>) -> bool {
        false
    }

    fn time_to_live(&self) -> Option<Duration> {
        None
    }
}

/// Every ticket is expired from birth.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysExpiresExpirationPolicy;

impl ExpirationPolicy for AlwaysExpiresExpirationPolicy {
    fn is_expired_at(&self, _state: &TicketState<'_>, _now: DateTime<Utc>) -> bool {
        true
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(Duration::ZERO)
    }
}

/// Expires a fixed time after creation, regardless of use.
#[derive(Debug, Clone, Copy)]
pub struct HardTimeoutExpirationPolicy {
    time_to_kill: ChronoDuration,
    time_to_kill_std: Duration,
}

impl HardTimeoutExpirationPolicy {
    pub fn new(time_to_kill: Duration) -> Self {
        Self {
            time_to_kill: to_chrono(time_to_kill),
            time_to_kill_std: time_to_kill,
        }
    }
}

impl ExpirationPolicy for HardTimeoutExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        state.since_creation(now) >= self.time_to_kill
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(self.time_to_kill_std)
    }
}

/// Expires after a period of inactivity.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutExpirationPolicy {
    time_to_kill: ChronoDuration,
    time_to_kill_std: Duration,
}

impl TimeoutExpirationPolicy {
    pub fn new(time_to_kill: Duration) -> Self {
        Self {
            time_to_kill: to_chrono(time_to_kill),
            time_to_kill_std: time_to_kill,
        }
    }
}

impl ExpirationPolicy for TimeoutExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        state.since_last_use(now) >= self.time_to_kill
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(self.time_to_kill_std)
    }
}

/// Expires after a number of uses or a period of inactivity, whichever comes
/// first. The usual service ticket policy.
#[derive(Debug, Clone, Copy)]
pub struct MultiTimeUseOrTimeoutExpirationPolicy {
    number_of_uses: u32,
    time_to_kill: ChronoDuration,
    time_to_kill_std: Duration,
}

impl MultiTimeUseOrTimeoutExpirationPolicy {
    pub fn new(number_of_uses: u32, time_to_kill: Duration) -> Self {
        Self {
            number_of_uses,
            time_to_kill: to_chrono(time_to_kill),
            time_to_kill_std: time_to_kill,
        }
    }

    pub fn number_of_uses(&self) -> u32 {
        self.number_of_uses
    }
}

impl ExpirationPolicy for MultiTimeUseOrTimeoutExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        state.count_of_uses >= self.number_of_uses || state.since_last_use(now) >= self.time_to_kill
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(self.time_to_kill_std)
    }
}

/// Expires after inactivity, and also refuses uses that arrive faster than a
/// minimum gap.
#[derive(Debug, Clone, Copy)]
pub struct ThrottledUseAndTimeoutExpirationPolicy {
    time_to_kill: ChronoDuration,
    time_in_between_uses: ChronoDuration,
    time_to_kill_std: Duration,
}

impl ThrottledUseAndTimeoutExpirationPolicy {
    pub fn new(time_to_kill: Duration, time_in_between_uses: Duration) -> Self {
        Self {
            time_to_kill: to_chrono(time_to_kill),
            time_in_between_uses: to_chrono(time_in_between_uses),
            time_to_kill_std: time_to_kill,
        }
    }
}

impl ExpirationPolicy for ThrottledUseAndTimeoutExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        let idle = state.since_last_use(now);

        if state.count_of_uses == 0 && idle < self.time_to_kill {
            return false;
        }
        if idle >= self.time_to_kill {
            return true;
        }
        if idle <= self.time_in_between_uses {
            warn!(
                count_of_uses = state.count_of_uses,
                "Ticket used again before the throttle interval elapsed"
            );
            return true;
        }
        false
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(self.time_to_kill_std)
    }
}

/// Sliding idle window bounded by a hard maximum lifetime. The usual
/// ticket-granting ticket policy.
#[derive(Debug, Clone, Copy)]
pub struct TicketGrantingTicketExpirationPolicy {
    max_time_to_live: ChronoDuration,
    time_to_kill: ChronoDuration,
    max_time_to_live_std: Duration,
}

impl TicketGrantingTicketExpirationPolicy {
    /// Fails if the idle window is longer than the maximum lifetime.
    pub fn new(max_time_to_live: Duration, time_to_kill: Duration) -> Result<Self> {
        if time_to_kill > max_time_to_live {
            return Err(Error::ConfigurationError(format!(
                "time to kill ({:?}) exceeds max time to live ({:?})",
                time_to_kill, max_time_to_live
            )));
        }
        Ok(Self {
            max_time_to_live: to_chrono(max_time_to_live),
            time_to_kill: to_chrono(time_to_kill),
            max_time_to_live_std: max_time_to_live,
        })
    }
}

impl ExpirationPolicy for TicketGrantingTicketExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        state.since_creation(now) >= self.max_time_to_live
            || state.since_last_use(now) >= self.time_to_kill
    }

    fn time_to_live(&self) -> Option<Duration> {
        Some(self.max_time_to_live_std)
    }
}

/// Delegates to one of two policies depending on whether the login was a
/// "remember me" login.
#[derive(Debug, Clone)]
pub struct RememberMeDelegatingExpirationPolicy {
    remember_me: Arc<dyn ExpirationPolicy>,
    session: Arc<dyn ExpirationPolicy>,
}

impl RememberMeDelegatingExpirationPolicy {
    pub fn new(remember_me: Arc<dyn ExpirationPolicy>, session: Arc<dyn ExpirationPolicy>) -> Self {
        Self {
            remember_me,
            session,
        }
    }

    fn select(&self, state: &TicketState<'_>) -> &dyn ExpirationPolicy {
        if state.authentication.is_remember_me() {
            self.remember_me.as_ref()
        } else {
            self.session.as_ref()
        }
    }
}

impl ExpirationPolicy for RememberMeDelegatingExpirationPolicy {
    fn is_expired_at(&self, state: &TicketState<'_>, now: DateTime<Utc>) -> bool {
        self.select(state).is_expired_at(state, now)
    }

    fn time_to_live(&self) -> Option<Duration> {
        match (self.remember_me.time_to_live(), self.session.time_to_live()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        }
    }
}

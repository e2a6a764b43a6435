//! Ticket id generators.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Default length of the random part of a ticket id.
pub const DEFAULT_RANDOM_LENGTH: usize = 20;

/// Produces unique, unguessable ticket ids for a given prefix.
pub trait UniqueTicketIdGenerator: Send + Sync + fmt::Debug {
    /// A new id of the form `<prefix>-<unique part>`.
    fn new_ticket_id(&self, prefix: &str) -> String;
}

/// `<PREFIX>-<counter>-<random alphanumerics>[-<suffix>]`.
///
/// The counter keeps ids unique within a node; the suffix (typically the host
/// name) keeps them unique across a cluster.
#[derive(Debug)]
pub struct DefaultUniqueTicketIdGenerator {
    counter: AtomicU64,
    random_length: usize,
    suffix: Option<String>,
}

impl DefaultUniqueTicketIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            random_length: DEFAULT_RANDOM_LENGTH,
            suffix: None,
        }
    }

    pub fn with_random_length(mut self, length: usize) -> Self {
        self.random_length = length.max(1);
        self
    }

    /// Node identifier appended to every id. Blank suffixes are ignored.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = if suffix.trim().is_empty() {
            None
        } else {
            Some(suffix)
        };
        self
    }

    fn random_part(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.random_length)
            .map(char::from)
            .collect()
    }
}

impl Default for DefaultUniqueTicketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueTicketIdGenerator for DefaultUniqueTicketIdGenerator {
    fn new_ticket_id(&self, prefix: &str) -> String {
        let number = self.counter.fetch_add(1, Ordering::Relaxed);
        let random = self.random_part();
        match &self.suffix {
            Some(suffix) => format!("{}-{}-{}-{}", prefix, number, random, suffix),
            None => format!("{}-{}-{}", prefix, number, random),
        }
    }
}

/// `<PREFIX>-<uuid v7>`, time-ordered.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTicketIdGenerator;

impl UniqueTicketIdGenerator for UuidTicketIdGenerator {
    fn new_ticket_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::now_v7().simple())
    }
}

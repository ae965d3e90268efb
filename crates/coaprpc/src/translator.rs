//! # Single-byte addressing
//!
//! A translator maps well-known services to one byte, so a request can be
//! addressed with `[byte][args...]` instead of `[urn]['?'][args...]`.

use std::collections::HashMap;

use crate::urn::ServiceUrn;

/// Bidirectional byte <-> URN mapping.
pub trait UrnTranslator: Send + Sync + 'static {
    fn byte_to_urn(&self, b: u8) -> Option<ServiceUrn>;

    fn urn_to_byte(&self, urn: &ServiceUrn) -> Option<u8>;
}

/// A fixed translation table.
#[derive(Clone, Debug, Default)]
pub struct StaticTranslator {
    by_byte: HashMap<u8, ServiceUrn>,
    by_urn: HashMap<ServiceUrn, u8>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair. A byte or URN that was already mapped loses its old partner.
    pub fn with(mut self, b: u8, urn: ServiceUrn) -> Self {
        if let Some(old) = self.by_byte.insert(b, urn.clone()) {
            self.by_urn.remove(&old);
        }
        if let Some(old) = self.by_urn.insert(urn, b) {
            if old != b {
                self.by_byte.remove(&old);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.by_byte.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_byte.is_empty()
    }
}

impl UrnTranslator for StaticTranslator {
    fn byte_to_urn(&self, b: u8) -> Option<ServiceUrn> {
        self.by_byte.get(&b).cloned()
    }

    fn urn_to_byte(&self, urn: &ServiceUrn) -> Option<u8> {
        self.by_urn.get(urn).copied()
    }
}

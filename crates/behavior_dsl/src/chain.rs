//! Ordered behavior chain and per-service selection.

use crate::model::Behavior;
use serde::{Deserialize, Serialize};

/// One parsed chain entry: an optional target service and a behavior
/// fragment. An absent service means the entry is global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Target service, or `None` for a global entry.
    pub service: Option<String>,
    /// The behavior fragment this entry contributes.
    pub behavior: Behavior,
}

/// An ordered sequence of `(service, behavior)` entries, as parsed from a
/// behavior string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorChain {
    /// Entries in input order.
    pub entries: Vec<ChainEntry>,
}

impl BehaviorChain {
    /// Appends an entry.
    pub fn push(&mut self, service: Option<String>, behavior: Behavior) {
        self.entries.push(ChainEntry { service, behavior });
    }

    /// Returns true if the chain has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the effective behavior for `service`.
    ///
    /// If any entry names the service, only those entries are merged, in
    /// order; named entries replace the globals rather than extending
    /// them. Otherwise all global entries are merged.
    #[must_use]
    pub fn for_service(&self, service: &str) -> Behavior {
        let mut named = self
            .entries
            .iter()
            .filter(|e| e.service.as_deref() == Some(service))
            .peekable();

        let mut effective = Behavior::default();
        if named.peek().is_some() {
            for entry in named {
                effective.merge(&entry.behavior);
            }
        } else {
            for entry in self.entries.iter().filter(|e| e.service.is_none()) {
                effective.merge(&entry.behavior);
            }
        }
        effective
    }

    /// Reserializes the chain to DSL text.
    ///
    /// A service prefix is emitted only when the target changes between
    /// entries; runs of entries for the same service rely on name
    /// inheritance, mirroring how the parser reads them back.
    #[must_use]
    pub fn to_dsl(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut current: Option<&str> = None;

        for entry in &self.entries {
            let fragment = entry.behavior.to_dsl();
            if fragment.is_empty() {
                continue;
            }
            match entry.service.as_deref() {
                Some(service) if current != Some(service) => {
                    current = Some(service);
                    // Prefix only the first key of the fragment.
                    parts.push(format!("{service}:{fragment}"));
                }
                _ => parts.push(fragment),
            }
        }
        parts.join(",")
    }
}

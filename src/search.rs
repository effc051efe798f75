//! In-flight searches and their periodic re-query.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::common::{compact, Address, Id, Protocol};

/// Minimum time between two engine searches for the same key.
pub const REQUERY_INTERVAL: Duration = Duration::from_secs(60);

/// Consumer of the addresses found for a search.
pub type ResultHandler = Box<dyn FnMut(&[Address])>;

/// Addresses the engine found for a search key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub key: Id,
    pub addresses: Vec<Address>,
}

impl SearchResult {
    /// Decode an engine payload of compact peers of the given family.
    pub fn decode(protocol: Protocol, key: Id, payload: &[u8]) -> Self {
        Self {
            key,
            addresses: compact::decode_peers(protocol, payload),
        }
    }
}

pub struct SearchEntry {
    handler: ResultHandler,
    port: u16,
    last_query: Option<Instant>,
}

impl SearchEntry {
    /// Port announced alongside the search, `0` for none.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn last_query(&self) -> Option<Instant> {
        self.last_query
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.last_query {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= REQUERY_INTERVAL,
        }
    }
}

impl Debug for SearchEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEntry")
            .field("port", &self.port)
            .field("last_query", &self.last_query)
            .finish_non_exhaustive()
    }
}

/// Searches keyed by their 20 byte search key.
///
/// Entries never expire.
#[derive(Debug, Default)]
pub struct SearchTable {
    entries: HashMap<Id, SearchEntry>,
}

impl SearchTable {
    pub fn new() -> Self {
        Self::default()
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Id) -> Option<&SearchEntry> {
        self.entries.get(key)
    }

    // === Public Methods ===

    /// Track a search for `key`, replacing any previous entry for it.
    ///
    /// A new entry is due on the next tick.
    pub fn register<F>(&mut self, key: Id, port: u16, handler: F)
    where
        F: FnMut(&[Address]) + 'static,
    {
        self.entries.insert(
            key,
            SearchEntry {
                handler: Box::new(handler),
                port,
                last_query: None,
            },
        );
    }

    /// Track a search for the hash of `keyword` and return its key.
    pub fn register_keyword<F>(&mut self, keyword: &str, port: u16, handler: F) -> Id
    where
        F: FnMut(&[Address]) + 'static,
    {
        let key = Id::from_keyword(keyword);
        self.register(key, port, handler);
        key
    }

    /// Return the key and port of every entry due for a query, stamping them
    /// as queried at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(Id, u16)> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.is_due(now))
            .map(|(key, entry)| {
                entry.last_query = Some(now);
                (*key, entry.port)
            })
            .collect()
    }

    /// Hand a result to its entry's handler.
    ///
    /// Returns `false`, doing nothing, when no entry tracks the key.
    pub fn deliver(&mut self, result: &SearchResult) -> bool {
        match self.entries.get_mut(&result.key) {
            Some(entry) => {
                (entry.handler)(&result.addresses);
                true
            }
            None => {
                trace!(key = %result.key, "Result for untracked search");
                false
            }
        }
    }
}

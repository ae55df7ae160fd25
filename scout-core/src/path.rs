//! Identifiers: object paths for remote objects, generation tags for the stale-reply guard.

use std::fmt;

/// Object path of a remote object (root context or peer). Opaque; compared by value.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        ObjectPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        ObjectPath(s.to_owned())
    }
}

/// Identity of one context or one peer incarnation. Never reused within a coordinator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic source of generations.
#[derive(Debug, Default)]
pub(crate) struct GenerationCounter(u64);

impl GenerationCounter {
    pub(crate) fn next(&mut self) -> Generation {
        self.0 = self.0.saturating_add(1);
        Generation(self.0)
    }
}

/// Tag carried by every request and echoed back by the transport on the matching
/// reply or signal. Handlers compare it against live generations and drop mismatches.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Tag {
    /// Root-context query and the root-changed subscription, scoped to a coordinator epoch.
    Root(Generation),
    /// Context-level traffic: peer enumeration, created/removed signals.
    Context(Generation),
    /// Peer-level traffic: property fetch and property-changed signals.
    Peer {
        context: Generation,
        peer: Generation,
    },
}

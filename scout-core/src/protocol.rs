//! Transport vocabulary: requests the core asks the host to perform, events the host feeds back.
//! Encoding on the wire is the transport's business; these are plain values.

use std::collections::HashMap;

use crate::path::{ObjectPath, Tag};

/// Property carrying the display name of a peer.
pub const PROP_NAME: &str = "Name";
/// Property carrying the hardware address of a peer.
pub const PROP_ADDRESS: &str = "Address";
/// List-valued property carrying the capability identifiers a peer advertises.
pub const PROP_CAPABILITIES: &str = "UUIDs";

/// A single property value. The capability set is the only list-valued property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::List(_) => None,
        }
    }
}

pub type PropertyMap = HashMap<String, PropertyValue>;

/// Failure reported by the transport for one call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct RemoteError {
    pub name: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Remote method calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Ask the directory service for the current root context.
    GetRootContext,
    /// Enumerate peers under a root context.
    ListPeers(ObjectPath),
    /// Fetch the property dictionary of one peer.
    GetProperties(ObjectPath),
}

/// Subscription scopes. Each scope delivers a fixed set of signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Root-context-changed.
    Root,
    /// Peer-created and peer-removed under one context.
    Context(ObjectPath),
    /// Property-changed for one peer.
    Peer(ObjectPath),
}

/// Work for the transport. The tag must be echoed on the reply / every signal of the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Call { tag: Tag, call: Call },
    Subscribe { tag: Tag, scope: Scope },
    Unsubscribe { tag: Tag, scope: Scope },
}

/// Reply to a `Call`, in the same order as the `Call` variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    RootContext(Result<ObjectPath, RemoteError>),
    Peers(Result<Vec<ObjectPath>, RemoteError>),
    Properties(Result<PropertyMap, RemoteError>),
}

/// Change notifications delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    RootContextChanged(ObjectPath),
    PeerCreated(ObjectPath),
    PeerRemoved(ObjectPath),
    PropertyChanged { name: String, value: PropertyValue },
}

/// Everything the transport hands back to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Reply { tag: Tag, reply: Reply },
    Signal { tag: Tag, signal: Signal },
}

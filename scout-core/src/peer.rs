//! One remote peer: attribute fetch, capability match, property-change tracking.

use tracing::debug;

use crate::path::{Generation, ObjectPath, Tag};
use crate::protocol::{
    Call, PropertyMap, PropertyValue, Request, Scope, PROP_ADDRESS, PROP_CAPABILITIES, PROP_NAME,
};

/// Read-only view of a peer handed to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub path: ObjectPath,
    pub display_name: String,
    pub address: String,
    pub matches_capability: bool,
}

/// Membership test: any occurrence of `required` is a match.
pub fn has_capability(capabilities: &[String], required: &str) -> bool {
    capabilities.iter().any(|c| c == required)
}

/// How a mutation changed the peer from the owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Unchanged,
    /// Started matching.
    Added,
    /// Still matching, name or address changed.
    Updated,
    /// Stopped matching.
    Removed,
}

impl Transition {
    fn from_match(was: bool, now: bool, info_changed: bool) -> Self {
        match (was, now) {
            (false, true) => Transition::Added,
            (true, false) => Transition::Removed,
            (true, true) if info_changed => Transition::Updated,
            _ => Transition::Unchanged,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PeerState {
    path: ObjectPath,
    generation: Generation,
    display_name: String,
    address: String,
    capabilities: Vec<String>,
    matches_capability: bool,
    fetch_pending: bool,
    /// Tick at which the property fetch was issued.
    issued_at: u64,
    subscribed: bool,
}

impl PeerState {
    pub(crate) fn new(path: ObjectPath, generation: Generation, issued_at: u64) -> Self {
        Self {
            path,
            generation,
            display_name: String::new(),
            address: String::new(),
            capabilities: Vec::new(),
            matches_capability: false,
            fetch_pending: true,
            issued_at,
            subscribed: false,
        }
    }

    pub(crate) fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.fetch_pending
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn matches_capability(&self) -> bool {
        self.matches_capability
    }

    pub(crate) fn issued_at(&self) -> u64 {
        self.issued_at
    }

    pub(crate) fn tag(&self, context: Generation) -> Tag {
        Tag::Peer {
            context,
            peer: self.generation,
        }
    }

    pub(crate) fn info(&self) -> PeerInfo {
        PeerInfo {
            path: self.path.clone(),
            display_name: self.display_name.clone(),
            address: self.address.clone(),
            matches_capability: self.matches_capability,
        }
    }

    pub(crate) fn fetch_attributes(&self, context: Generation) -> Request {
        Request::Call {
            tag: self.tag(context),
            call: Call::GetProperties(self.path.clone()),
        }
    }

    /// Clears the pending flag. Returns true if the fetch was still pending, i.e. it counts as resolved now.
    pub(crate) fn resolve(&mut self) -> bool {
        std::mem::replace(&mut self.fetch_pending, false)
    }

    /// Apply a successful property fetch. Returns the owner-visible transition and,
    /// on the first success, the property-changed subscription to issue.
    pub(crate) fn apply_properties(
        &mut self,
        context: Generation,
        props: &PropertyMap,
        required: &str,
    ) -> (Transition, Option<Request>) {
        let was = self.matches_capability;
        let mut info_changed = false;
        if let Some(name) = props.get(PROP_NAME).and_then(PropertyValue::as_text) {
            info_changed |= Self::replace_text(&mut self.display_name, name);
        }
        if let Some(addr) = props.get(PROP_ADDRESS).and_then(PropertyValue::as_text) {
            info_changed |= Self::replace_text(&mut self.address, addr);
        }
        self.set_capabilities(props.get(PROP_CAPABILITIES), required);

        let subscribe = if self.subscribed {
            None
        } else {
            self.subscribed = true;
            Some(Request::Subscribe {
                tag: self.tag(context),
                scope: Scope::Peer(self.path.clone()),
            })
        };
        (
            Transition::from_match(was, self.matches_capability, info_changed),
            subscribe,
        )
    }

    /// Steady-state tracking of a single property. Unknown properties are ignored.
    pub(crate) fn on_attribute_changed(
        &mut self,
        name: &str,
        value: &PropertyValue,
        required: &str,
    ) -> Transition {
        let was = self.matches_capability;
        let mut info_changed = false;
        match name {
            PROP_NAME => {
                if let Some(v) = value.as_text() {
                    info_changed = Self::replace_text(&mut self.display_name, v);
                }
            }
            PROP_ADDRESS => {
                if let Some(v) = value.as_text() {
                    info_changed = Self::replace_text(&mut self.address, v);
                }
            }
            PROP_CAPABILITIES => self.set_capabilities(Some(value), required),
            _ => {}
        }
        Transition::from_match(was, self.matches_capability, info_changed)
    }

    /// Overwrite only on change. Returns whether it changed.
    fn replace_text(field: &mut String, value: &str) -> bool {
        if field == value {
            return false;
        }
        value.clone_into(field);
        true
    }

    fn set_capabilities(&mut self, value: Option<&PropertyValue>, required: &str) {
        self.capabilities = match value {
            Some(PropertyValue::List(v)) => v.clone(),
            Some(PropertyValue::Text(_)) => {
                debug!(peer = %self.path, "capability property is not a list, treating as empty");
                Vec::new()
            }
            None => Vec::new(),
        };
        self.matches_capability = has_capability(&self.capabilities, required);
    }
}

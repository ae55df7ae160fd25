//! Peers under one root context: enumeration, created/removed tracking, quiescence.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::coordinator::{Action, DeviceChange};
use crate::path::{Generation, GenerationCounter, ObjectPath, Tag};
use crate::peer::{PeerInfo, PeerState, Transition};
use crate::protocol::{Call, PropertyMap, PropertyValue, RemoteError, Request, Scope};

/// Coordinator-owned resources a context handler needs while it runs.
pub(crate) struct Step<'a> {
    pub generations: &'a mut GenerationCounter,
    pub capability: &'a str,
    pub now: u64,
    pub actions: &'a mut Vec<Action>,
}

impl Step<'_> {
    fn send(&mut self, request: Request) {
        self.actions.push(Action::Send(request));
    }

    fn report(&mut self, transition: Transition, peer: &PeerState) {
        let change = match transition {
            Transition::Unchanged => return,
            Transition::Added => DeviceChange::Added(peer.info()),
            Transition::Updated => DeviceChange::Updated(peer.info()),
            Transition::Removed => DeviceChange::Removed(peer.path().clone()),
        };
        self.actions.push(Action::Device(change));
    }
}

#[derive(Debug)]
pub(crate) struct ContextState {
    path: ObjectPath,
    generation: Generation,
    peers: HashMap<ObjectPath, PeerState>,
    /// Live peer incarnations, for routing peer-tagged replies and signals.
    by_generation: HashMap<Generation, ObjectPath>,
    expected: usize,
    resolved: usize,
}

impl ContextState {
    pub(crate) fn new(path: ObjectPath, generation: Generation) -> Self {
        Self {
            path,
            generation,
            peers: HashMap::new(),
            by_generation: HashMap::new(),
            expected: 0,
            resolved: 0,
        }
    }

    pub(crate) fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn expected_count(&self) -> usize {
        self.expected
    }

    pub(crate) fn resolved_count(&self) -> usize {
        self.resolved
    }

    pub(crate) fn is_quiescent(&self) -> bool {
        self.resolved >= self.expected
    }

    /// Snapshot ordered by path.
    pub(crate) fn peers(&self) -> Vec<PeerInfo> {
        let mut out: Vec<PeerInfo> = self.peers.values().map(PeerState::info).collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    fn tag(&self) -> Tag {
        Tag::Context(self.generation)
    }

    /// Subscribe to created/removed first, then enumerate.
    pub(crate) fn begin_discovery(&self, step: &mut Step<'_>) {
        debug!(context = %self.path, generation = %self.generation, "Beginning peer discovery");
        step.send(Request::Subscribe {
            tag: self.tag(),
            scope: Scope::Context(self.path.clone()),
        });
        step.send(Request::Call {
            tag: self.tag(),
            call: Call::ListPeers(self.path.clone()),
        });
    }

    pub(crate) fn on_list_reply(
        &mut self,
        result: Result<Vec<ObjectPath>, RemoteError>,
        step: &mut Step<'_>,
    ) {
        match result {
            Err(e) => {
                warn!(context = %self.path, error = %e, "Peer enumeration failed, completing with known peers");
                self.abandon_pending(|_| true);
            }
            Ok(paths) => {
                debug!(context = %self.path, count = paths.len(), "Peer enumeration returned");
                for path in paths {
                    self.insert(path, step);
                }
            }
        }
    }

    pub(crate) fn on_peer_created(&mut self, path: ObjectPath, step: &mut Step<'_>) {
        if !self.insert(path.clone(), step) {
            trace!(context = %self.path, peer = %path, "Peer already known");
        }
    }

    pub(crate) fn on_peer_removed(&mut self, path: &ObjectPath, step: &mut Step<'_>) {
        let Some(mut peer) = self.peers.remove(path) else {
            trace!(context = %self.path, peer = %path, "Removal of unknown peer ignored");
            return;
        };
        self.by_generation.remove(&peer.generation());
        self.expected = self.expected.saturating_sub(1);
        if !peer.resolve() {
            // It had already been counted as resolved.
            self.resolved = self.resolved.saturating_sub(1);
        }
        debug!(
            context = %self.path,
            peer = %path,
            expected = self.expected,
            resolved = self.resolved,
            "Peer removed"
        );
        self.release(&peer, step);
    }

    pub(crate) fn on_properties_reply(
        &mut self,
        peer_generation: Generation,
        result: Result<PropertyMap, RemoteError>,
        step: &mut Step<'_>,
    ) {
        let context = self.generation;
        let Some(peer) = self.peer_mut(peer_generation) else {
            trace!(context = %self.path, generation = %peer_generation, "Property reply for departed peer dropped");
            return;
        };
        let counted = peer.resolve();
        match result {
            Err(e) => {
                warn!(peer = %peer.path(), error = %e, "Property fetch failed, excluding peer from matching");
            }
            Ok(props) => {
                let (transition, subscribe) = peer.apply_properties(context, &props, step.capability);
                debug!(
                    peer = %peer.path(),
                    matches = peer.matches_capability(),
                    "Peer properties resolved"
                );
                if let Some(req) = subscribe {
                    step.send(req);
                }
                step.report(transition, peer);
            }
        }
        if counted {
            self.resolved += 1;
        }
    }

    pub(crate) fn on_property_changed(
        &mut self,
        peer_generation: Generation,
        name: &str,
        value: &PropertyValue,
        step: &mut Step<'_>,
    ) {
        let Some(peer) = self.peer_mut(peer_generation) else {
            trace!(context = %self.path, property = name, "Property change for departed peer dropped");
            return;
        };
        let transition = peer.on_attribute_changed(name, value, step.capability);
        trace!(peer = %peer.path(), property = name, ?transition, "Peer property changed");
        step.report(transition, peer);
    }

    /// Abandon fetches issued at or before `deadline`. Returns how many were abandoned.
    pub(crate) fn expire_fetches(&mut self, deadline: u64) -> usize {
        let n = self.abandon_pending(|p| p.issued_at() <= deadline);
        if n > 0 {
            warn!(context = %self.path, abandoned = n, "Property fetches timed out");
        }
        n
    }

    /// Drop every subscription and report matching peers as gone.
    pub(crate) fn teardown(self, step: &mut Step<'_>) {
        debug!(context = %self.path, generation = %self.generation, peers = self.peers.len(), "Tearing down context");
        step.send(Request::Unsubscribe {
            tag: self.tag(),
            scope: Scope::Context(self.path.clone()),
        });
        let mut peers: Vec<PeerState> = self.peers.into_values().collect();
        peers.sort_by(|a, b| a.path().cmp(b.path()));
        for peer in &peers {
            Self::release_peer(self.generation, peer, step);
        }
    }

    /// Idempotent insert. Returns true if the peer is new.
    fn insert(&mut self, path: ObjectPath, step: &mut Step<'_>) -> bool {
        if self.peers.contains_key(&path) {
            return false;
        }
        let peer = PeerState::new(path.clone(), step.generations.next(), step.now);
        step.send(peer.fetch_attributes(self.generation));
        self.by_generation.insert(peer.generation(), path.clone());
        self.peers.insert(path, peer);
        self.expected += 1;
        true
    }

    fn peer_mut(&mut self, generation: Generation) -> Option<&mut PeerState> {
        let path = self.by_generation.get(&generation)?;
        self.peers.get_mut(path)
    }

    fn abandon_pending(&mut self, mut filter: impl FnMut(&PeerState) -> bool) -> usize {
        let mut n = 0;
        for peer in self.peers.values_mut() {
            if peer.is_pending() && filter(&*peer) && peer.resolve() {
                n += 1;
            }
        }
        self.resolved += n;
        n
    }

    fn release(&self, peer: &PeerState, step: &mut Step<'_>) {
        Self::release_peer(self.generation, peer, step);
    }

    fn release_peer(context: Generation, peer: &PeerState, step: &mut Step<'_>) {
        if peer.is_subscribed() {
            step.send(Request::Unsubscribe {
                tag: peer.tag(context),
                scope: Scope::Peer(peer.path().clone()),
            });
        }
        if peer.matches_capability() {
            step.report(Transition::Removed, peer);
        }
    }
}

//! Host-driven API: DiscoveryCoordinator receives events from the host, returns actions.

use tracing::{debug, info, trace, warn};

use crate::context::{ContextState, Step};
use crate::path::{Generation, GenerationCounter, ObjectPath, Tag};
use crate::peer::PeerInfo;
use crate::protocol::{Call, Event, RemoteError, Reply, Request, Scope, Signal};

/// Service class UUID advertised by devices that accept SyncML sessions.
pub const DEFAULT_CAPABILITY: &str = "00000002-0000-1000-8000-0002ee000002";

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Capability identifier a peer must advertise to match.
    pub capability: String,
    /// Ticks after which an unanswered property fetch is abandoned. 0 disables the deadline.
    pub fetch_timeout_ticks: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            capability: DEFAULT_CAPABILITY.to_owned(),
            fetch_timeout_ticks: 0,
        }
    }
}

/// Change to the set of matching peers, for the owner's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    Added(PeerInfo),
    Updated(PeerInfo),
    Removed(ObjectPath),
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Hand to the transport.
    Send(Request),
    /// Apply to the owner's device list.
    Device(DeviceChange),
}

/// Main coordinator. Host passes events; coordinator returns actions.
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    generations: GenerationCounter,
    /// Current root epoch; `None` before `start` and after `shutdown`.
    epoch: Option<Generation>,
    context: Option<ContextState>,
    done: bool,
    tick_count: u64,
}

impl DiscoveryCoordinator {
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default())
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self {
            config,
            generations: GenerationCounter::default(),
            epoch: None,
            context: None,
            done: false,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// True once the current view is quiescent. Re-evaluated after every event; may flip back.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Snapshot of peers under the current root context, ordered by path.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.context
            .as_ref()
            .map(ContextState::peers)
            .unwrap_or_default()
    }

    pub fn root_context(&self) -> Option<&ObjectPath> {
        self.context.as_ref().map(ContextState::path)
    }

    /// (expected, resolved) for the current context.
    pub fn counts(&self) -> Option<(usize, usize)> {
        self.context
            .as_ref()
            .map(|c| (c.expected_count(), c.resolved_count()))
    }

    /// Subscribe to root changes and ask for the current root context.
    /// Calling again restarts discovery from scratch.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = self.teardown();
        let epoch = self.generations.next();
        self.epoch = Some(epoch);
        self.done = false;
        info!(epoch = %epoch, "Starting peer discovery");
        actions.push(Action::Send(Request::Subscribe {
            tag: Tag::Root(epoch),
            scope: Scope::Root,
        }));
        actions.push(Action::Send(Request::Call {
            tag: Tag::Root(epoch),
            call: Call::GetRootContext,
        }));
        actions
    }

    /// Tear everything down. Later events are stale and dropped.
    pub fn shutdown(&mut self) -> Vec<Action> {
        info!("Stopping peer discovery");
        let actions = self.teardown();
        self.done = true;
        actions
    }

    /// Dispatch one event from the transport.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Reply {
                tag: Tag::Root(epoch),
                reply: Reply::RootContext(result),
            } => self.on_root_context_reply(epoch, result),
            Event::Signal {
                tag: Tag::Root(epoch),
                signal: Signal::RootContextChanged(path),
            } => {
                if self.epoch != Some(epoch) {
                    trace!(epoch = %epoch, "Stale root change dropped");
                    return vec![];
                }
                self.on_root_context_changed(path)
            }
            Event::Reply {
                tag: Tag::Context(generation),
                reply: Reply::Peers(result),
            } => self.with_context(generation, |ctx, step| ctx.on_list_reply(result, step)),
            Event::Signal {
                tag: Tag::Context(generation),
                signal: Signal::PeerCreated(path),
            } => self.with_context(generation, |ctx, step| ctx.on_peer_created(path, step)),
            Event::Signal {
                tag: Tag::Context(generation),
                signal: Signal::PeerRemoved(path),
            } => self.with_context(generation, |ctx, step| ctx.on_peer_removed(&path, step)),
            Event::Reply {
                tag: Tag::Peer { context, peer },
                reply: Reply::Properties(result),
            } => self.with_context(context, |ctx, step| {
                ctx.on_properties_reply(peer, result, step)
            }),
            Event::Signal {
                tag: Tag::Peer { context, peer },
                signal: Signal::PropertyChanged { name, value },
            } => self.with_context(context, |ctx, step| {
                ctx.on_property_changed(peer, &name, &value, step)
            }),
            other => {
                debug!(event = ?other, "Event does not fit its tag, dropped");
                vec![]
            }
        }
    }

    /// Root-context-changed: drop the current context unconditionally and restart under `path`.
    pub fn on_root_context_changed(&mut self, path: ObjectPath) -> Vec<Action> {
        info!(context = %path, "Root context changed");
        let mut actions = Vec::new();
        if let Some(old) = self.context.take() {
            self.run_step(&mut actions, |step| old.teardown(step));
        }
        self.install_context(path, &mut actions);
        actions
    }

    /// Periodic tick: abandon property fetches past their deadline.
    pub fn tick(&mut self) -> Vec<Action> {
        self.tick_count = self.tick_count.saturating_add(1);
        let timeout = self.config.fetch_timeout_ticks;
        if timeout == 0 {
            return vec![];
        }
        let Some(deadline) = self.tick_count.checked_sub(timeout) else {
            return vec![];
        };
        let expired = self
            .context
            .as_mut()
            .map_or(0, |ctx| ctx.expire_fetches(deadline));
        if expired > 0 {
            self.refresh_done();
        }
        vec![]
    }

    fn on_root_context_reply(
        &mut self,
        epoch: Generation,
        result: Result<ObjectPath, RemoteError>,
    ) -> Vec<Action> {
        if self.epoch != Some(epoch) || self.context.is_some() {
            trace!(epoch = %epoch, "Stale root context reply dropped");
            return vec![];
        }
        match result {
            Ok(path) => {
                info!(context = %path, "Root context found");
                let mut actions = Vec::new();
                self.install_context(path, &mut actions);
                actions
            }
            Err(e) => {
                warn!(error = %e, "Root context query failed, no peers will be discovered");
                self.done = true;
                vec![]
            }
        }
    }

    fn install_context(&mut self, path: ObjectPath, actions: &mut Vec<Action>) {
        let ctx = ContextState::new(path, self.generations.next());
        self.done = false;
        self.run_step(actions, |step| ctx.begin_discovery(step));
        self.context = Some(ctx);
    }

    /// Run a context handler if `generation` names the live context.
    fn with_context(
        &mut self,
        generation: Generation,
        f: impl FnOnce(&mut ContextState, &mut Step<'_>),
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let Some(ctx) = self
            .context
            .as_mut()
            .filter(|c| c.generation() == generation)
        else {
            trace!(generation = %generation, "Stale context event dropped");
            return actions;
        };
        let mut step = Step {
            generations: &mut self.generations,
            capability: &self.config.capability,
            now: self.tick_count,
            actions: &mut actions,
        };
        f(ctx, &mut step);
        self.refresh_done();
        actions
    }

    fn run_step(&mut self, actions: &mut Vec<Action>, f: impl FnOnce(&mut Step<'_>)) {
        let mut step = Step {
            generations: &mut self.generations,
            capability: &self.config.capability,
            now: self.tick_count,
            actions,
        };
        f(&mut step);
    }

    fn refresh_done(&mut self) {
        if let Some(ctx) = &self.context {
            let done = ctx.is_quiescent();
            if done != self.done {
                debug!(
                    context = %ctx.path(),
                    done,
                    expected = ctx.expected_count(),
                    resolved = ctx.resolved_count(),
                    "Discovery quiescence changed"
                );
            }
            self.done = done;
        }
    }

    fn teardown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(old) = self.context.take() {
            self.run_step(&mut actions, |step| old.teardown(step));
        }
        if let Some(epoch) = self.epoch.take() {
            actions.push(Action::Send(Request::Unsubscribe {
                tag: Tag::Root(epoch),
                scope: Scope::Root,
            }));
        }
        actions
    }
}

impl Default for DiscoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

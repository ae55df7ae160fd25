//! Discovery driver: one task owns the coordinator, feeds it transport events and ticks,
//! executes its actions, and publishes a snapshot after every step.

use std::time::Duration;

use anyhow::{anyhow, bail, Context as _};
use scout_core::{Action, DiscoveryCoordinator, ObjectPath, PeerInfo, Request};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::devices::DeviceList;
use crate::transport::TransportHandle;

/// What the owner sees. May change between reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub done: bool,
    pub root_context: Option<ObjectPath>,
    /// Every peer under the current root context.
    pub peers: Vec<PeerInfo>,
    /// Peers advertising the capability.
    pub devices: Vec<PeerInfo>,
}

/// Owner's handle on a running discovery task.
pub struct DiscoveryHandle {
    snapshot: watch::Receiver<Snapshot>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl DiscoveryHandle {
    pub fn is_done(&self) -> bool {
        self.snapshot.borrow().done
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `f`.
    pub async fn wait_until(
        &mut self,
        f: impl FnMut(&Snapshot) -> bool,
    ) -> anyhow::Result<Snapshot> {
        let s = self
            .snapshot
            .wait_for(f)
            .await
            .map_err(|_| anyhow!("discovery task stopped"))?;
        Ok(s.clone())
    }

    /// Stop discovery, unsubscribe everything, and wait for the task.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.context("discovery task panicked")?
    }

    /// Wait for the task to end on its own (transport closed).
    pub async fn join(self) -> anyhow::Result<()> {
        let _keep_running = self.shutdown;
        self.task.await.context("discovery task panicked")?
    }
}

/// Spawn the driver on the current runtime.
pub fn spawn_discovery(config: &Config, transport: TransportHandle) -> DiscoveryHandle {
    let core = DiscoveryCoordinator::with_config(config.core_config());
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let tick = config.tick_interval();
    let task = tokio::spawn(async move {
        run_discovery(core, transport, tick, snapshot_tx, shutdown_rx).await
    });
    DiscoveryHandle {
        snapshot: snapshot_rx,
        shutdown: shutdown_tx,
        task,
    }
}

/// Event loop. Returns Ok on shutdown, Err if the transport goes away underneath it.
pub async fn run_discovery(
    mut core: DiscoveryCoordinator,
    transport: TransportHandle,
    tick: Duration,
    snapshot_tx: watch::Sender<Snapshot>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let TransportHandle {
        requests,
        mut events,
    } = transport;
    let mut devices = DeviceList::default();
    let mut ticker = deadline_ticker(&core, tick);

    execute(core.start(), &requests, &mut devices)?;
    publish(&core, &devices, &snapshot_tx);

    loop {
        let actions = tokio::select! {
            _ = &mut shutdown_rx => {
                let actions = core.shutdown();
                if let Err(e) = execute(actions, &requests, &mut devices) {
                    debug!(error = %e, "Transport already gone during shutdown");
                }
                publish(&core, &devices, &snapshot_tx);
                info!("Discovery stopped");
                return Ok(());
            }
            ev = events.recv() => match ev {
                Some(ev) => core.handle(ev),
                None => {
                    warn!("Transport event channel closed");
                    bail!("transport event channel closed");
                }
            },
            _ = next_tick(&mut ticker) => core.tick(),
        };
        execute(actions, &requests, &mut devices)?;
        publish(&core, &devices, &snapshot_tx);
    }
}

/// Ticks only drive the fetch deadline. Without one there is no ticker at all.
fn deadline_ticker(core: &DiscoveryCoordinator, period: Duration) -> Option<Interval> {
    if core.config().fetch_timeout_ticks == 0 {
        return None;
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn execute(
    actions: Vec<Action>,
    requests: &mpsc::UnboundedSender<Request>,
    devices: &mut DeviceList,
) -> anyhow::Result<()> {
    for action in actions {
        match action {
            Action::Send(req) => requests
                .send(req)
                .map_err(|_| anyhow!("transport request channel closed"))?,
            Action::Device(change) => devices.apply(change),
        }
    }
    Ok(())
}

fn publish(core: &DiscoveryCoordinator, devices: &DeviceList, tx: &watch::Sender<Snapshot>) {
    let next = Snapshot {
        done: core.is_done(),
        root_context: core.root_context().cloned(),
        peers: core.peers(),
        devices: devices.to_vec(),
    };
    tx.send_if_modified(|cur| {
        if *cur == next {
            return false;
        }
        if cur.done != next.done {
            debug!(done = next.done, peers = next.peers.len(), devices = next.devices.len(), "Discovery state published");
        }
        *cur = next;
        true
    });
}

//! Channel transport: the host sends requests and receives events over unbounded mpsc channels.
//! Whatever speaks to the remote directory service owns the other end.

use scout_core::{Event, Request};
use tokio::sync::mpsc;

/// The coordinator's end.
pub struct TransportHandle {
    pub requests: mpsc::UnboundedSender<Request>,
    pub events: mpsc::UnboundedReceiver<Event>,
}

/// The directory service's end. Must echo each request's tag on the reply
/// and each subscription's tag on every signal delivered for it.
pub struct RemoteEnd {
    pub requests: mpsc::UnboundedReceiver<Request>,
    pub events: mpsc::UnboundedSender<Event>,
}

pub fn channel() -> (TransportHandle, RemoteEnd) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    (
        TransportHandle {
            requests: req_tx,
            events: ev_rx,
        },
        RemoteEnd {
            requests: req_rx,
            events: ev_tx,
        },
    )
}

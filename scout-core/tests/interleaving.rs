//! Any interleaving of enumeration reply, created, removed and fetch replies converges on
//! the set of peers learned and not removed, with `is_done` tracking outstanding fetches.

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use scout_core::protocol::PROP_CAPABILITIES;
use scout_core::{
    Action, Call, DiscoveryCoordinator, Event, ObjectPath, PropertyMap, PropertyValue, Reply,
    Request, Signal, Tag, DEFAULT_CAPABILITY,
};

#[derive(Debug, Clone)]
enum Op {
    List,
    Create(u8),
    Remove(u8),
    Resolve(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::List),
        (0u8..6).prop_map(Op::Create),
        (0u8..6).prop_map(Op::Remove),
        (0u8..6).prop_map(Op::Resolve),
    ]
}

fn path(n: u8) -> ObjectPath {
    ObjectPath::new(format!("/hci0/dev_{n}"))
}

struct Driver {
    core: DiscoveryCoordinator,
    context_tag: Tag,
    fetch_tags: HashMap<ObjectPath, Tag>,
    /// Whether any context-level event has reached the coordinator yet.
    touched: bool,
}

impl Driver {
    fn start() -> Self {
        let mut core = DiscoveryCoordinator::new();
        let mut root_tag = None;
        for a in core.start() {
            if let Action::Send(Request::Call {
                tag,
                call: Call::GetRootContext,
            }) = a
            {
                root_tag = Some(tag);
            }
        }
        let actions = core.handle(Event::Reply {
            tag: root_tag.expect("root query"),
            reply: Reply::RootContext(Ok(ObjectPath::new("/hci0"))),
        });
        let mut context_tag = None;
        for a in &actions {
            if let Action::Send(Request::Call {
                tag,
                call: Call::ListPeers(_),
            }) = a
            {
                context_tag = Some(*tag);
            }
        }
        Self {
            core,
            context_tag: context_tag.expect("enumeration"),
            fetch_tags: HashMap::new(),
            touched: false,
        }
    }

    fn feed(&mut self, event: Event) {
        self.touched = true;
        for a in self.core.handle(event) {
            if let Action::Send(Request::Call {
                tag,
                call: Call::GetProperties(p),
            }) = a
            {
                self.fetch_tags.insert(p, tag);
            }
        }
    }

    fn resolve(&mut self, p: &ObjectPath) {
        if let Some(tag) = self.fetch_tags.get(p).copied() {
            let mut props = PropertyMap::new();
            props.insert(
                PROP_CAPABILITIES.into(),
                PropertyValue::List(vec![DEFAULT_CAPABILITY.into()]),
            );
            self.feed(Event::Reply {
                tag,
                reply: Reply::Properties(Ok(props)),
            });
        }
    }
}

proptest! {
    #[test]
    fn converges_on_learned_minus_removed(
        listed in proptest::collection::btree_set(0u8..6, 0..6),
        ops in proptest::collection::vec(op(), 0..40),
    ) {
        let mut d = Driver::start();
        let mut present: BTreeSet<ObjectPath> = BTreeSet::new();
        let mut pending: BTreeSet<ObjectPath> = BTreeSet::new();
        let mut listed_once = false;

        for op in ops {
            match op {
                Op::List => {
                    if listed_once {
                        continue;
                    }
                    listed_once = true;
                    let paths: Vec<ObjectPath> = listed.iter().copied().map(path).collect();
                    for p in &paths {
                        if present.insert(p.clone()) {
                            pending.insert(p.clone());
                        }
                    }
                    let tag = d.context_tag;
                    d.feed(Event::Reply { tag, reply: Reply::Peers(Ok(paths)) });
                }
                Op::Create(n) => {
                    let p = path(n);
                    if present.insert(p.clone()) {
                        pending.insert(p.clone());
                    }
                    let tag = d.context_tag;
                    d.feed(Event::Signal { tag, signal: Signal::PeerCreated(p) });
                }
                Op::Remove(n) => {
                    let p = path(n);
                    present.remove(&p);
                    pending.remove(&p);
                    let tag = d.context_tag;
                    d.feed(Event::Signal { tag, signal: Signal::PeerRemoved(p) });
                }
                Op::Resolve(n) => {
                    let p = path(n);
                    pending.remove(&p);
                    d.resolve(&p);
                }
            }
            if d.touched {
                prop_assert_eq!(d.core.is_done(), pending.is_empty());
            }
            let (expected, resolved) = d.core.counts().unwrap();
            prop_assert_eq!(expected, present.len());
            prop_assert_eq!(resolved, present.len() - pending.len());
        }

        for p in pending.clone() {
            d.resolve(&p);
        }
        let got: BTreeSet<ObjectPath> = d.core.peers().into_iter().map(|p| p.path).collect();
        prop_assert_eq!(got, present.clone());
        // Nothing reached the context at all: still waiting on enumeration.
        prop_assert_eq!(d.core.is_done(), d.touched);
        prop_assert!(d.core.peers().iter().all(|p| p.matches_capability));
    }
}

//! An in-memory network of devices that routes engine output the way a transport would.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use concord::engine::{DeliveryKind, MessageId};
use concord::{
    Destination, Dialog, DialogUpdate, Engine, Identity, IdentityKey, IdentityStore,
    MemoryIdentityStore, MemoryInstanceStore, MemoryLedger, Notification, Outcome, Outgoing,
    Prng, ProtocolId, ProtocolMessage, ReceptionChannelInfo, TrustOrigin, Uid,
};

pub type MemoryEngine = Engine<MemoryIdentityStore, MemoryInstanceStore, MemoryLedger>;

/// Upper bound on deliveries in one [`Network::run`].
const MAX_DELIVERIES: usize = 10_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Node {
    pub engine: MemoryEngine,
    pub dialogs: BTreeMap<Uid, Dialog>,
    pub notifications: Vec<Notification>,
}

impl Node {
    pub fn identity(&self) -> Identity {
        *self.engine.identity()
    }

    pub fn device(&self) -> Uid {
        *self.engine.device_uid()
    }

    pub fn store(&self) -> &MemoryIdentityStore {
        self.engine.identities()
    }

    /// The open dialog of this device, if exactly one is open.
    pub fn dialog(&self) -> Dialog {
        assert_eq!(self.dialogs.len(), 1, "expected a single open dialog");
        self.dialogs.values().next().cloned().unwrap()
    }
}

#[derive(Clone, Copy, Debug)]
enum Route {
    Local,
    Asymmetric,
    Broadcast,
    Authenticated,
    Oblivious,
}

#[derive(Clone, Debug)]
struct Envelope {
    from: usize,
    to: usize,
    route: Route,
    message: ProtocolMessage,
}

/// Devices exchanging messages through one FIFO queue. Messages answered with
/// [`Outcome::RetryLater`] are parked and requeued after the next committed step.
pub struct Network {
    prng: Prng,
    nodes: Vec<Node>,
    queue: VecDeque<Envelope>,
    parked: Vec<Envelope>,
    pub retries: usize,
    pub rejections: usize,
}

impl Network {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            prng: Prng::from_seed(seed),
            nodes: Vec::new(),
            queue: VecDeque::new(),
            parked: Vec::new(),
            retries: 0,
            rejections: 0,
        }
    }

    pub fn prng(&self) -> &Prng {
        &self.prng
    }

    /// Adds an identity with `devices` devices and returns their node indices.
    pub fn add_identity(&mut self, devices: usize, details: &[u8]) -> Vec<usize> {
        let keys = IdentityKey::new(&self.prng).unwrap();
        let uids: Vec<Uid> = (0..devices)
            .map(|_| Uid::random(&self.prng).unwrap())
            .collect();

        let mut indices = Vec::new();
        for uid in &uids {
            let mut identities = MemoryIdentityStore::new();
            identities.add_owned_identity(keys.identity(), &uids, details);
            let engine = Engine::new(
                IdentityKey::from(keys.to_bytes()),
                *uid,
                None,
                identities,
                MemoryInstanceStore::new(),
                MemoryLedger::new(),
                Prng::from_seed(self.prng.random_array().unwrap()),
            )
            .unwrap();
            indices.push(self.nodes.len());
            self.nodes.push(Node {
                engine,
                dialogs: BTreeMap::new(),
                notifications: Vec::new(),
            });
        }
        indices
    }

    /// Makes every device of `a` trust every device of `b` and the other way around.
    pub fn befriend(&mut self, a: &[usize], b: &[usize]) {
        for (ours, theirs) in [(a, b), (b, a)] {
            let contact = self.nodes[theirs[0]].identity();
            let devices: Vec<Uid> = theirs.iter().map(|index| self.nodes[*index].device()).collect();
            for index in ours {
                let engine = &mut self.nodes[*index].engine;
                let owned = *engine.identity();
                let store = engine.identities_mut();
                store
                    .add_contact(&owned, &contact, b"details", TrustOrigin::Sas, true)
                    .unwrap();
                for device in &devices {
                    store.add_device(&owned, &contact, device).unwrap();
                }
            }
        }
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn engine(&mut self, index: usize) -> &mut MemoryEngine {
        &mut self.nodes[index].engine
    }

    /// Feeds the outcome of a direct engine call on `index` into the network.
    pub fn dispatch(&mut self, index: usize, outcome: Outcome) -> Outcome {
        self.absorb(index, &outcome);
        if matches!(outcome, Outcome::Advanced { .. } | Outcome::Aborted { .. }) {
            self.queue.extend(self.parked.drain(..));
        }
        outcome
    }

    /// Delivers queued messages until nothing moves.
    pub fn run(&mut self) {
        let mut deliveries = 0;
        while let Some(envelope) = self.queue.pop_front() {
            deliveries += 1;
            assert!(deliveries < MAX_DELIVERIES, "network did not settle");
            self.deliver(envelope);
        }
    }

    /// Delivers the first queued `message_id` of `protocol` addressed to `to`, ahead of
    /// everything queued before it.
    pub fn deliver_now(&mut self, to: usize, protocol: ProtocolId, message_id: MessageId) -> Outcome {
        let position = self
            .queue
            .iter()
            .position(|envelope| {
                envelope.to == to
                    && envelope.message.protocol == protocol
                    && envelope.message.message_id == message_id
            })
            .expect("no such message queued");
        let envelope = self.queue.remove(position).unwrap();
        self.deliver(envelope)
    }

    fn deliver(&mut self, envelope: Envelope) -> Outcome {
        let Some(reception) = self.reception(&envelope) else {
            self.rejections += 1;
            return Outcome::Rejected;
        };
        let outcome = self.nodes[envelope.to]
            .engine
            .handle_message(&envelope.message, &reception)
            .unwrap();
        match &outcome {
            Outcome::RetryLater => {
                self.retries += 1;
                self.parked.push(envelope);
            }
            Outcome::Rejected => self.rejections += 1,
            Outcome::Advanced { .. } | Outcome::Aborted { .. } => {
                self.absorb(envelope.to, &outcome);
                self.queue.extend(self.parked.drain(..));
            }
        }
        outcome
    }

    fn reception(&self, envelope: &Envelope) -> Option<ReceptionChannelInfo> {
        Some(match envelope.route {
            Route::Local => ReceptionChannelInfo::Local,
            Route::Asymmetric => ReceptionChannelInfo::Asymmetric,
            Route::Broadcast => ReceptionChannelInfo::AsymmetricBroadcast,
            Route::Authenticated => ReceptionChannelInfo::AuthenticatedAsymmetric {
                remote_identity: self.nodes[envelope.from].identity(),
                remote_device: self.nodes[envelope.from].device(),
            },
            Route::Oblivious => {
                let sender = &self.nodes[envelope.from];
                let receiver = &self.nodes[envelope.to];
                let channel = receiver.store().channel(
                    &receiver.identity(),
                    &sender.identity(),
                    &sender.device(),
                )?;
                ReceptionChannelInfo::ObliviousChannel {
                    remote_identity: sender.identity(),
                    remote_device: sender.device(),
                    confirmed: channel.confirmed,
                }
            }
        })
    }

    fn absorb(&mut self, index: usize, outcome: &Outcome) {
        for item in outcome.outgoing() {
            match item {
                Outgoing::Message {
                    message,
                    destination,
                } => self.route(index, message, destination),
                Outgoing::Dialog(DialogUpdate::Show(dialog)) => {
                    self.nodes[index].dialogs.insert(dialog.uuid, dialog.clone());
                }
                Outgoing::Dialog(DialogUpdate::Delete { uuid }) => {
                    self.nodes[index].dialogs.remove(uuid);
                }
                Outgoing::Notification(notification) => {
                    self.nodes[index].notifications.push(notification.clone());
                }
            }
        }
    }

    fn route(&mut self, from: usize, message: &ProtocolMessage, destination: &Destination) {
        let sender = &self.nodes[from];
        let targets: Vec<(usize, Route)> = match destination {
            Destination::Local => vec![(from, Route::Local)],
            Destination::Devices {
                identity,
                devices,
                kind,
            } => {
                let route = match kind {
                    DeliveryKind::Asymmetric => Route::Asymmetric,
                    DeliveryKind::AsymmetricBroadcast => Route::Broadcast,
                    DeliveryKind::AuthenticatedAsymmetric => Route::Authenticated,
                    DeliveryKind::ObliviousChannel => Route::Oblivious,
                };
                self.find(|node| node.identity() == *identity && devices.contains(&node.device()))
                    .into_iter()
                    .map(|to| (to, route))
                    .collect()
            }
            Destination::Broadcast { identity } => self
                .find(|node| node.identity() == *identity)
                .into_iter()
                .map(|to| (to, Route::Broadcast))
                .collect(),
            Destination::AllConfirmedChannels { identity } => {
                let devices = sender
                    .store()
                    .confirmed_channel_devices(&sender.identity(), identity);
                self.find(|node| node.identity() == *identity && devices.contains(&node.device()))
                    .into_iter()
                    .map(|to| (to, Route::Oblivious))
                    .collect()
            }
        };

        for (to, route) in targets {
            if to == from && !matches!(route, Route::Local) {
                continue;
            }
            self.queue.push_back(Envelope {
                from,
                to,
                route,
                message: message.clone(),
            });
        }
    }

    fn find(&self, predicate: impl Fn(&Node) -> bool) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| predicate(node))
            .map(|(index, _)| index)
            .collect()
    }
}

//! Helpers for driving engines by hand in unit tests.

use crate::engine::{Destination, DeliveryKind, Outcome, Outgoing, ProtocolMessage, ReceptionChannelInfo};
use crate::store::{IdentityStore, MemoryIdentityStore, MemoryInstanceStore, MemoryLedger, TrustOrigin};
use crate::{Engine, IdentityKey, Prng, Uid};

pub(crate) type MemoryEngine = Engine<MemoryIdentityStore, MemoryInstanceStore, MemoryLedger>;

pub(crate) fn device(prng: &Prng, keys: IdentityKey, device_uid: Uid, siblings: &[Uid]) -> MemoryEngine {
    let mut identities = MemoryIdentityStore::new();
    let mut devices = vec![device_uid];
    devices.extend_from_slice(siblings);
    identities.add_owned_identity(keys.identity(), &devices, b"details");

    Engine::new(
        keys,
        device_uid,
        None,
        identities,
        MemoryInstanceStore::new(),
        MemoryLedger::new(),
        Prng::from_seed(prng.random_array().unwrap()),
    )
    .unwrap()
}

/// Two single-device identities that already trust each other. The first one has the larger
/// device UID.
pub(crate) fn trusted_pair(prng: &Prng) -> (MemoryEngine, MemoryEngine) {
    let mut uids = [Uid::random(prng).unwrap(), Uid::random(prng).unwrap()];
    uids.sort();
    let mut leader = device(prng, IdentityKey::new(prng).unwrap(), uids[1], &[]);
    let mut follower = device(prng, IdentityKey::new(prng).unwrap(), uids[0], &[]);
    befriend(&mut leader, &follower);
    befriend(&mut follower, &leader);
    (leader, follower)
}

pub(crate) fn befriend(engine: &mut MemoryEngine, contact: &MemoryEngine) {
    let owned = *engine.identity();
    let store = engine.identities_mut();
    store
        .add_contact(&owned, contact.identity(), b"details", TrustOrigin::Sas, true)
        .unwrap();
    store
        .add_device(&owned, contact.identity(), contact.device_uid())
        .unwrap();
}

pub(crate) fn messages(outcome: &Outcome) -> Vec<(ProtocolMessage, Destination)> {
    outcome
        .outgoing()
        .iter()
        .filter_map(|item| match item {
            Outgoing::Message {
                message,
                destination,
            } => Some((message.clone(), destination.clone())),
            _ => None,
        })
        .collect()
}

/// Delivers every message of `outcome` that is addressed to `receiver`.
pub(crate) fn deliver(sender: &MemoryEngine, receiver: &mut MemoryEngine, outcome: &Outcome) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    for (message, destination) in messages(outcome) {
        let reception = match destination {
            Destination::Devices {
                identity,
                devices,
                kind,
            } if identity == *receiver.identity() && devices.contains(receiver.device_uid()) => {
                match kind {
                    DeliveryKind::Asymmetric => ReceptionChannelInfo::Asymmetric,
                    DeliveryKind::AsymmetricBroadcast => ReceptionChannelInfo::AsymmetricBroadcast,
                    DeliveryKind::AuthenticatedAsymmetric => {
                        ReceptionChannelInfo::AuthenticatedAsymmetric {
                            remote_identity: *sender.identity(),
                            remote_device: *sender.device_uid(),
                        }
                    }
                    DeliveryKind::ObliviousChannel => ReceptionChannelInfo::ObliviousChannel {
                        remote_identity: *sender.identity(),
                        remote_device: *sender.device_uid(),
                        confirmed: receiver
                            .identities()
                            .channel(receiver.identity(), sender.identity(), sender.device_uid())
                            .is_some_and(|channel| channel.confirmed),
                    },
                }
            }
            Destination::Broadcast { identity } if identity == *receiver.identity() => {
                ReceptionChannelInfo::AsymmetricBroadcast
            }
            _ => continue,
        };
        outcomes.push(receiver.handle_message(&message, &reception).unwrap());
    }
    outcomes
}

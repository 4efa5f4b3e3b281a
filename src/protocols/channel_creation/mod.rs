//! Two-party key agreement that installs a channel between two devices.
//!
//! Either side pings the other. The device that compares larger (device UID, then identity)
//! leads: it sends a signed ephemeral key, the follower encapsulates `k1` to it, the leader
//! encapsulates `k2` back, and both install a channel seeded with `combine(k1, k2)`. Two
//! acknowledgements over the new channel confirm it on both ends.
pub mod message;
pub mod state;
mod steps;

pub use steps::should_lead;

use crate::engine::{
    ChannelPredicate, MessageSet, Outcome, Protocol, ProtocolId, ProtocolMessage,
    ReceptionChannelInfo, StateId, Step,
};
use crate::store::{IdentityStore, InstanceStore, ReplayLedger};
use crate::{Engine, Error, Identity, Uid};

use message::{Message, Start};
use state::State;

pub struct ChannelCreation;

const INITIAL_STEPS: &[Step<ChannelCreation>] = &[
    Step {
        name: "send-ping",
        message: message::INITIAL,
        reception: ChannelPredicate::Local,
        run: steps::send_ping,
    },
    Step {
        name: "ping-received",
        message: message::PING,
        reception: ChannelPredicate::AnyAsymmetric,
        run: steps::ping_received,
    },
    Step {
        name: "ephemeral-key-received",
        message: message::EPHEMERAL_KEY,
        reception: ChannelPredicate::AnyAsymmetric,
        run: steps::ephemeral_key_received,
    },
];

const WAITING_FOR_K1_STEPS: &[Step<ChannelCreation>] = &[Step {
    name: "k1-received",
    message: message::K1,
    reception: ChannelPredicate::AnyAsymmetric,
    run: steps::k1_received,
}];

const WAITING_FOR_K2_STEPS: &[Step<ChannelCreation>] = &[Step {
    name: "k2-received",
    message: message::K2,
    reception: ChannelPredicate::AnyAsymmetric,
    run: steps::k2_received,
}];

const WAIT_FOR_FIRST_ACK_STEPS: &[Step<ChannelCreation>] = &[Step {
    name: "first-ack-received",
    message: message::FIRST_ACK,
    reception: ChannelPredicate::AnyObliviousChannel,
    run: steps::first_ack_received,
}];

const WAIT_FOR_SECOND_ACK_STEPS: &[Step<ChannelCreation>] = &[Step {
    name: "second-ack-received",
    message: message::SECOND_ACK,
    reception: ChannelPredicate::AnyObliviousChannel,
    run: steps::second_ack_received,
}];

impl Protocol for ChannelCreation {
    const ID: ProtocolId = ProtocolId::ChannelCreation;
    const FINAL_STATES: &'static [StateId] =
        &[state::PING_SENT, state::CHANNEL_CONFIRMED, state::CANCELLED];
    const CANCELLED: StateId = state::CANCELLED;

    type State = State;
    type Message = Message;

    fn steps(state: StateId) -> &'static [Step<Self>] {
        match state {
            state::INITIAL => INITIAL_STEPS,
            state::WAITING_FOR_K1 => WAITING_FOR_K1_STEPS,
            state::WAITING_FOR_K2 => WAITING_FOR_K2_STEPS,
            state::WAIT_FOR_FIRST_ACK => WAIT_FOR_FIRST_ACK_STEPS,
            state::WAIT_FOR_SECOND_ACK => WAIT_FOR_SECOND_ACK_STEPS,
            _ => &[],
        }
    }
}

impl<S, I, L> Engine<S, I, L>
where
    S: IdentityStore,
    I: InstanceStore,
    L: ReplayLedger,
{
    /// Starts building a channel with `contact_device`, a device of a contact or another
    /// device of the owned identity.
    pub fn start_channel_creation(
        &mut self,
        contact_identity: Identity,
        contact_device: Uid,
    ) -> Result<Outcome, Error> {
        let start = Message::Initial(Start {
            contact_identity,
            contact_device,
        });
        let message = ProtocolMessage {
            protocol: ProtocolId::ChannelCreation,
            instance_uid: Uid::random(self.prng())?,
            message_id: start.id(),
            inputs: start.encode_inputs(),
        };
        self.handle_message(&message, &ReceptionChannelInfo::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoded;
    use crate::engine::{
        Destination, InstanceLink, Notification, Outgoing, ambiguous_steps,
    };
    use crate::protocols::testing::{self, deliver, messages, trusted_pair};
    use crate::{IdentityKey, Prng, Seed};

    fn receptions(owned: Identity, other: Identity, device: Uid) -> Vec<ReceptionChannelInfo> {
        let mut receptions = vec![
            ReceptionChannelInfo::Local,
            ReceptionChannelInfo::Asymmetric,
            ReceptionChannelInfo::AsymmetricBroadcast,
        ];
        for identity in [owned, other] {
            receptions.push(ReceptionChannelInfo::AuthenticatedAsymmetric {
                remote_identity: identity,
                remote_device: device,
            });
            for confirmed in [false, true] {
                receptions.push(ReceptionChannelInfo::ObliviousChannel {
                    remote_identity: identity,
                    remote_device: device,
                    confirmed,
                });
            }
        }
        receptions
    }

    #[test]
    fn test_step_table_is_unambiguous() {
        let prng = Prng::from_seed([91; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();
        let other = IdentityKey::new(&prng).unwrap().identity();
        let device = Uid::random(&prng).unwrap();

        assert!(
            ambiguous_steps::<ChannelCreation>(&receptions(owned, other, device), &owned)
                .is_empty()
        );
    }

    #[test]
    fn test_exactly_one_side_leads() {
        let prng = Prng::from_seed([92; 32]);
        let alice = IdentityKey::new(&prng).unwrap().identity();
        let bob = IdentityKey::new(&prng).unwrap().identity();
        let a = Uid::random(&prng).unwrap();
        let b = Uid::random(&prng).unwrap();

        assert_ne!(should_lead(&alice, &a, &bob, &b), should_lead(&bob, &b, &alice, &a));
        // Equal device UIDs fall back to the identities.
        assert_ne!(should_lead(&alice, &a, &bob, &a), should_lead(&bob, &a, &alice, &a));
    }

    #[test]
    fn test_full_exchange_installs_equal_seeds() {
        let prng = Prng::from_seed([93; 32]);
        let (mut leader, mut follower) = trusted_pair(&prng);

        let start = follower
            .start_channel_creation(*leader.identity(), *leader.device_uid())
            .unwrap();
        let sent_ephemeral_key = deliver(&follower, &mut leader, &start).remove(0);
        let sent_k1 = deliver(&leader, &mut follower, &sent_ephemeral_key).remove(0);
        let sent_k2 = deliver(&follower, &mut leader, &sent_k1).remove(0);
        let sent_first_ack = deliver(&leader, &mut follower, &sent_k2).remove(0);
        let leader_done = deliver(&follower, &mut leader, &sent_first_ack).remove(0);
        let follower_done = deliver(&leader, &mut follower, &leader_done).remove(0);

        assert!(matches!(
            leader_done,
            Outcome::Advanced {
                state_id: state::CHANNEL_CONFIRMED,
                ..
            }
        ));
        assert!(matches!(
            follower_done,
            Outcome::Advanced {
                state_id: state::CHANNEL_CONFIRMED,
                ..
            }
        ));
        assert!(follower_done.outgoing().contains(&Outgoing::Notification(
            Notification::ChannelConfirmed {
                remote_identity: *leader.identity(),
                remote_device: *leader.device_uid(),
            }
        )));

        let at_leader = leader
            .identities()
            .channel(leader.identity(), follower.identity(), follower.device_uid())
            .unwrap();
        let at_follower = follower
            .identities()
            .channel(follower.identity(), leader.identity(), leader.device_uid())
            .unwrap();
        assert!(at_leader.confirmed && at_follower.confirmed);
        assert_eq!(at_leader.seed, at_follower.seed);
        assert!(leader.instances().is_empty());
        assert!(follower.instances().is_empty());
    }

    #[test]
    fn test_replayed_ping_is_rejected() {
        let prng = Prng::from_seed([94; 32]);
        let (mut leader, mut follower) = trusted_pair(&prng);

        let start = follower
            .start_channel_creation(*leader.identity(), *leader.device_uid())
            .unwrap();
        let (ping, _) = messages(&start).remove(0);

        let first = leader
            .handle_message(&ping, &ReceptionChannelInfo::AsymmetricBroadcast)
            .unwrap();
        assert!(matches!(
            first,
            Outcome::Advanced {
                state_id: state::WAITING_FOR_K1,
                ..
            }
        ));

        let again = leader
            .handle_message(&ping, &ReceptionChannelInfo::AsymmetricBroadcast)
            .unwrap();
        assert_eq!(again, Outcome::Rejected);

        let mut elsewhere = ping.clone();
        elsewhere.instance_uid = Uid::random(&prng).unwrap();
        let replayed = leader
            .handle_message(&elsewhere, &ReceptionChannelInfo::AsymmetricBroadcast)
            .unwrap();
        assert_eq!(replayed, Outcome::Rejected);
        assert_eq!(leader.instances().len(), 1);
    }

    #[test]
    fn test_ping_from_stranger_cancels() {
        let prng = Prng::from_seed([95; 32]);
        let (mut leader, _) = trusted_pair(&prng);
        let mut stranger = testing::device(
            &prng,
            IdentityKey::new(&prng).unwrap(),
            Uid::random(&prng).unwrap(),
            &[],
        );
        testing::befriend(&mut stranger, &leader);

        let start = stranger
            .start_channel_creation(*leader.identity(), *leader.device_uid())
            .unwrap();
        let outcomes = deliver(&stranger, &mut leader, &start);
        assert!(matches!(outcomes[0], Outcome::Aborted { .. }));
        assert!(leader.instances().is_empty());
    }

    #[test]
    fn test_channel_race_restarts_once() {
        let prng = Prng::from_seed([96; 32]);
        let (mut leader, mut follower) = trusted_pair(&prng);

        let start = follower
            .start_channel_creation(*leader.identity(), *leader.device_uid())
            .unwrap();
        let sent_ephemeral_key = deliver(&follower, &mut leader, &start).remove(0);
        let sent_k1 = deliver(&leader, &mut follower, &sent_ephemeral_key).remove(0);

        let raced = Seed::random(&prng).unwrap();
        let owned = *leader.identity();
        leader
            .identities_mut()
            .create_channel(&owned, follower.identity(), follower.device_uid(), &raced, 0)
            .unwrap();

        let outcome = deliver(&follower, &mut leader, &sent_k1).remove(0);
        let Outcome::Aborted { outgoing } = &outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        assert_eq!(outgoing.len(), 1);
        let Outgoing::Message {
            message,
            destination,
        } = &outgoing[0]
        else {
            panic!("expected a restart message");
        };
        assert_eq!(*destination, Destination::Local);
        assert_eq!(message.message_id, message::INITIAL);
        assert_ne!(
            message.instance_uid,
            messages(&sent_ephemeral_key)[0].0.instance_uid
        );

        let channel = leader
            .identities()
            .channel(&owned, follower.identity(), follower.device_uid())
            .unwrap();
        assert_eq!(channel.seed, raced);
        assert!(leader.instances().is_empty());
    }

    #[test]
    fn test_channel_race_at_follower_restarts_once() {
        let prng = Prng::from_seed([99; 32]);
        let (mut leader, mut follower) = trusted_pair(&prng);

        let start = follower
            .start_channel_creation(*leader.identity(), *leader.device_uid())
            .unwrap();
        let sent_ephemeral_key = deliver(&follower, &mut leader, &start).remove(0);
        let sent_k1 = deliver(&leader, &mut follower, &sent_ephemeral_key).remove(0);
        let sent_k2 = deliver(&follower, &mut leader, &sent_k1).remove(0);

        let raced = Seed::random(&prng).unwrap();
        let owned = *follower.identity();
        follower
            .identities_mut()
            .create_channel(&owned, leader.identity(), leader.device_uid(), &raced, 0)
            .unwrap();

        let outcome = deliver(&leader, &mut follower, &sent_k2).remove(0);
        let Outcome::Aborted { outgoing } = &outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        assert_eq!(outgoing.len(), 1);
        let Outgoing::Message {
            message,
            destination,
        } = &outgoing[0]
        else {
            panic!("expected a restart message");
        };
        assert_eq!(*destination, Destination::Local);
        assert_eq!(message.message_id, message::INITIAL);
        assert_ne!(message.instance_uid, messages(&sent_k1)[0].0.instance_uid);

        let channel = follower
            .identities()
            .channel(&owned, leader.identity(), leader.device_uid())
            .unwrap();
        assert_eq!(channel.seed, raced);
        assert!(follower.instances().is_empty());
    }

    #[test]
    fn test_fresh_ephemeral_key_replaces_pending_attempt() {
        let prng = Prng::from_seed([100; 32]);
        let (mut leader, mut follower) = trusted_pair(&prng);
        let contact = (*leader.identity(), *leader.device_uid());

        let first_start = follower.start_channel_creation(contact.0, contact.1).unwrap();
        let second_start = follower.start_channel_creation(contact.0, contact.1).unwrap();
        let first = messages(&first_start)[0].0.instance_uid;
        let second = messages(&second_start)[0].0.instance_uid;

        let first_key = deliver(&follower, &mut leader, &first_start).remove(0);
        deliver(&leader, &mut follower, &first_key);
        assert_eq!(follower.instances().len(), 1);

        let second_key = deliver(&follower, &mut leader, &second_start).remove(0);
        let outcome = deliver(&leader, &mut follower, &second_key).remove(0);
        assert!(matches!(
            outcome,
            Outcome::Advanced {
                state_id: state::WAITING_FOR_K2,
                ..
            }
        ));

        // Only the k1 answer goes out. The aborted attempt is not restarted.
        let sent = messages(&outcome);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.message_id, message::K1);
        assert_eq!(sent[0].0.instance_uid, second);
        assert!(!matches!(sent[0].1, Destination::Local));

        assert_eq!(follower.instances().len(), 1);
        let owned = *follower.identity();
        let record = follower.instances().get(ProtocolId::ChannelCreation, &first, &owned);
        assert_eq!(record, Ok(None));
    }

    #[test]
    fn test_link_notifies_parent() {
        let prng = Prng::from_seed([97; 32]);
        let (mut leader, follower) = trusted_pair(&prng);
        let child = Uid::random(&prng).unwrap();
        let parent = Uid::random(&prng).unwrap();

        leader
            .link_instances(InstanceLink {
                child_protocol: ProtocolId::ChannelCreation,
                child_instance_uid: child,
                child_expected_state: state::PING_SENT,
                parent_protocol: ProtocolId::TrustEstablishment,
                parent_instance_uid: parent,
                parent_message_id: 9,
            })
            .unwrap();
        assert_eq!(leader.instances().link_count(), 1);

        let start = Message::Initial(Start {
            contact_identity: *follower.identity(),
            contact_device: *follower.device_uid(),
        });
        let outcome = leader
            .handle_message(
                &ProtocolMessage {
                    protocol: ProtocolId::ChannelCreation,
                    instance_uid: child,
                    message_id: start.id(),
                    inputs: start.encode_inputs(),
                },
                &ReceptionChannelInfo::Local,
            )
            .unwrap();

        let (notification, destination) = messages(&outcome).pop().unwrap();
        assert_eq!(destination, Destination::Local);
        assert_eq!(notification.protocol, ProtocolId::TrustEstablishment);
        assert_eq!(notification.instance_uid, parent);
        assert_eq!(notification.message_id, 9);
        assert_eq!(
            notification.inputs,
            Encoded::List(vec![
                Encoded::Uid(*child.as_bytes()),
                Encoded::Int(u64::from(state::PING_SENT)),
            ])
        );
        assert_eq!(leader.instances().link_count(), 0);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        use crate::engine::InstanceRecord;
        use crate::store::InstanceStore;

        let prng = Prng::from_seed([98; 32]);
        let (mut leader, follower) = trusted_pair(&prng);
        let owned = *leader.identity();
        let uid = Uid::random(&prng).unwrap();

        leader
            .instances_mut()
            .put(InstanceRecord {
                protocol: ProtocolId::ChannelCreation,
                instance_uid: uid,
                owned_identity: owned,
                state_id: state::WAIT_FOR_FIRST_ACK,
                state_payload: Encoded::List(vec![Encoded::Int(1)]).to_bytes(),
                peer: None,
            })
            .unwrap();

        let ack = ProtocolMessage {
            protocol: ProtocolId::ChannelCreation,
            instance_uid: uid,
            message_id: message::FIRST_ACK,
            inputs: Encoded::List(vec![Encoded::Bytes(Vec::new())]),
        };
        let reception = ReceptionChannelInfo::ObliviousChannel {
            remote_identity: *follower.identity(),
            remote_device: *follower.device_uid(),
            confirmed: false,
        };
        assert!(matches!(
            leader.handle_message(&ack, &reception),
            Err(Error::Decode(_))
        ));
    }
}

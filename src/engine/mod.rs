//! The protocol instance state machine.
//!
//! An [`Engine`] runs the handshakes of one owned identity on one device. Each inbound
//! [`ProtocolMessage`] is routed to its instance, matched against the step table of the
//! instance's current state and, if a step accepts it, executed. The step's effects, the new
//! state and any instance-link notifications are then committed together.
mod context;
pub use context::*;

mod instance;
pub use instance::*;

mod message;
pub use message::*;

mod protocol;
pub use protocol::*;

mod reception;
pub use reception::*;

use tracing::{debug, info, warn};

use crate::codec::{Encode, Encoded};
use crate::protocols::{ChannelCreation, TrustEstablishment};
use crate::store::{IdentityStore, InstanceStore, ReplayLedger, Transactional};
use crate::{EngineConfig, Error, Identity, IdentityKey, Prng, Uid};

/// What became of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A step ran and its effects were committed.
    Advanced {
        state_id: StateId,
        outgoing: Vec<Outgoing>,
    },
    /// No step accepted the message, or the selected step refused it. Nothing changed.
    Rejected,
    /// The instance was cancelled and deleted.
    Aborted { outgoing: Vec<Outgoing> },
    /// The message should be delivered again later. Nothing changed.
    RetryLater,
}

impl Outcome {
    pub fn outgoing(&self) -> &[Outgoing] {
        match self {
            Self::Advanced { outgoing, .. } | Self::Aborted { outgoing } => outgoing,
            Self::Rejected | Self::RetryLater => &[],
        }
    }
}

/// Runs handshake protocol instances for one owned identity on one device.
pub struct Engine<S, I, L> {
    keys: IdentityKey,
    identity: Identity,
    device_uid: Uid,
    config: EngineConfig,
    identities: S,
    instances: I,
    ledger: L,
    prng: Prng,
}

impl<S, I, L> Engine<S, I, L>
where
    S: IdentityStore,
    I: InstanceStore,
    L: ReplayLedger,
{
    /// Creates an engine. If no configuration is provided, default values are used.
    pub fn new(
        keys: IdentityKey,
        device_uid: Uid,
        config: Option<EngineConfig>,
        identities: S,
        instances: I,
        ledger: L,
        prng: Prng,
    ) -> Result<Self, Error> {
        let config = config.unwrap_or_default();
        config.validate()?;

        Ok(Self {
            identity: keys.identity(),
            keys,
            device_uid,
            config,
            identities,
            instances,
            ledger,
            prng,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn device_uid(&self) -> &Uid {
        &self.device_uid
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prng(&self) -> &Prng {
        &self.prng
    }

    pub fn identities(&self) -> &S {
        &self.identities
    }

    pub fn identities_mut(&mut self) -> &mut S {
        &mut self.identities
    }

    pub fn instances(&self) -> &I {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut I {
        &mut self.instances
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Loads an instance, or returns a fresh one in the initial state if none is persisted.
    ///
    /// A persisted state that fails to decode is an error.
    pub fn create_or_load<P: Protocol>(&self, instance_uid: Uid) -> Result<Instance<P>, Error> {
        let Some(record) = self.instances.get(P::ID, &instance_uid, &self.identity)? else {
            return Ok(Instance {
                uid: instance_uid,
                state: P::State::initial(),
                peer: None,
            });
        };

        let payload = Encoded::from_bytes(&record.state_payload)?;
        let state = P::State::decode(record.state_id, &payload)?;
        Ok(Instance {
            uid: instance_uid,
            state,
            peer: record.peer,
        })
    }

    /// Registers a link. When the child instance reaches the expected state, a local message
    /// is posted to the parent instance.
    pub fn link_instances(&mut self, link: InstanceLink) -> Result<(), Error> {
        self.instances.put_link(&self.identity, link)
    }

    /// Deletes an instance and its links. Returns `false` if it did not exist.
    pub fn abort_instance(&mut self, protocol: ProtocolId, instance_uid: &Uid) -> Result<bool, Error> {
        let exists = self
            .instances
            .get(protocol, instance_uid, &self.identity)?
            .is_some();
        self.delete_instance(protocol, instance_uid)?;
        if exists {
            info!(%protocol, instance = %instance_uid, "instance aborted");
        }
        Ok(exists)
    }

    /// Processes one inbound message.
    ///
    /// Transient failures, including store failures while loading or committing, yield
    /// [`Outcome::RetryLater`] and leave every store as it was. Corrupt persisted state and
    /// non-transient failures are returned as errors. Everything else is reported through the
    /// [`Outcome`].
    pub fn handle_message(
        &mut self,
        message: &ProtocolMessage,
        reception: &ReceptionChannelInfo,
    ) -> Result<Outcome, Error> {
        match message.protocol {
            ProtocolId::ChannelCreation => self.run::<ChannelCreation>(message, reception),
            ProtocolId::TrustEstablishment => self.run::<TrustEstablishment>(message, reception),
        }
    }

    fn run<P: Protocol>(
        &mut self,
        message: &ProtocolMessage,
        reception: &ReceptionChannelInfo,
    ) -> Result<Outcome, Error> {
        let instance = match self.create_or_load::<P>(message.instance_uid) {
            Ok(instance) => instance,
            Err(err) if err.is_transient() => {
                warn!(protocol = %P::ID, instance = %message.instance_uid, "loading failed, will retry: {err}");
                return Ok(Outcome::RetryLater);
            }
            Err(err) => return Err(err),
        };
        let state_id = instance.state.id();

        let Some(step) =
            select_step::<P>(state_id, message.message_id, reception, &self.identity)
        else {
            debug!(
                protocol = %P::ID,
                instance = %instance.uid,
                state = state_id,
                message_id = message.message_id,
                "no step accepts message"
            );
            return Ok(Outcome::Rejected);
        };

        let input = match P::Message::decode(message.message_id, &message.inputs) {
            Ok(input) => input,
            Err(err) => {
                warn!(
                    protocol = %P::ID,
                    instance = %instance.uid,
                    step = step.name,
                    "malformed message inputs: {err}"
                );
                return Ok(Outcome::Rejected);
            }
        };

        debug!(
            protocol = %P::ID,
            instance = %instance.uid,
            step = step.name,
            state = state_id,
            "running step"
        );

        let mut context = StepContext::new(
            &self.keys,
            self.device_uid,
            P::ID,
            instance.uid,
            &self.prng,
            &self.config,
            reception,
            &self.identities,
            &self.instances,
            &self.ledger,
            instance.peer,
        );

        let transition = match (step.run)(&mut context, instance.state, input) {
            Ok(transition) => transition,
            Err(err) if err.is_transient() => {
                warn!(
                    protocol = %P::ID,
                    instance = %instance.uid,
                    step = step.name,
                    "step failed, will retry: {err}"
                );
                return Ok(Outcome::RetryLater);
            }
            Err(err) => return Err(err),
        };

        let next = match transition {
            Transition::Next(next) => next,
            Transition::Reject => {
                debug!(protocol = %P::ID, instance = %instance.uid, step = step.name, "step rejected message");
                return Ok(Outcome::Rejected);
            }
            Transition::Retry => {
                debug!(protocol = %P::ID, instance = %instance.uid, step = step.name, "message arrived early");
                return Ok(Outcome::RetryLater);
            }
        };

        let (effects, peer) = context.finish();
        self.commit::<P>(instance.uid, next, effects, peer)
    }

    /// Applies a step's effects, new state and link notifications as one transaction.
    fn commit<P: Protocol>(
        &mut self,
        instance_uid: Uid,
        next: P::State,
        effects: Vec<Effect>,
        peer: Option<PeerKey>,
    ) -> Result<Outcome, Error> {
        let written = self
            .begin()
            .and_then(|()| self.write::<P>(instance_uid, next, effects, peer))
            .and_then(|outcome| self.finish().map(|()| outcome));

        match written {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.rollback();
                if err.is_transient() {
                    warn!(protocol = %P::ID, instance = %instance_uid, "commit failed, will retry: {err}");
                    Ok(Outcome::RetryLater)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.identities.begin()?;
        self.instances.begin()?;
        self.ledger.begin()
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.identities.commit()?;
        self.instances.commit()?;
        self.ledger.commit()
    }

    fn rollback(&mut self) {
        self.identities.rollback();
        self.instances.rollback();
        self.ledger.rollback();
    }

    fn write<P: Protocol>(
        &mut self,
        instance_uid: Uid,
        next: P::State,
        effects: Vec<Effect>,
        peer: Option<PeerKey>,
    ) -> Result<Outcome, Error> {
        let mut outgoing = Vec::new();
        for effect in effects {
            self.apply::<P>(effect, &mut outgoing)?;
        }

        let state_id = next.id();
        if P::is_final(state_id) {
            self.instances.delete(P::ID, &instance_uid, &self.identity)?;
        } else {
            self.instances.put(InstanceRecord {
                protocol: P::ID,
                instance_uid,
                owned_identity: self.identity,
                state_id,
                state_payload: next.encode_payload().to_bytes(),
                peer,
            })?;
        }

        for link in self.instances.links_from(&self.identity, P::ID, &instance_uid)? {
            if link.child_expected_state == state_id {
                outgoing.push(Outgoing::Message {
                    message: ProtocolMessage {
                        protocol: link.parent_protocol,
                        instance_uid: link.parent_instance_uid,
                        message_id: link.parent_message_id,
                        inputs: Encoded::List(vec![
                            instance_uid.encode(),
                            Encoded::Int(u64::from(state_id)),
                        ]),
                    },
                    destination: Destination::Local,
                });
                self.instances.delete_link(&self.identity, &link)?;
            } else if P::is_final(state_id) {
                self.instances.delete_link(&self.identity, &link)?;
            }
        }

        debug!(protocol = %P::ID, instance = %instance_uid, state = state_id, "step committed");

        if state_id == P::CANCELLED {
            info!(protocol = %P::ID, instance = %instance_uid, "instance cancelled");
            Ok(Outcome::Aborted { outgoing })
        } else {
            if P::is_final(state_id) {
                info!(protocol = %P::ID, instance = %instance_uid, state = state_id, "instance finished");
            }
            Ok(Outcome::Advanced { state_id, outgoing })
        }
    }

    fn apply<P: Protocol>(&mut self, effect: Effect, outgoing: &mut Vec<Outgoing>) -> Result<(), Error> {
        let owned = self.identity;
        match effect {
            Effect::Emit(item) => outgoing.push(item),
            Effect::RecordToken(token) => self.ledger.record(&owned, &token)?,
            Effect::CreateChannel {
                remote_identity,
                remote_device,
                seed,
            } => self.identities.create_channel(
                &owned,
                &remote_identity,
                &remote_device,
                &seed,
                self.config.channel_ratchet_index,
            )?,
            Effect::ConfirmChannel {
                remote_identity,
                remote_device,
            } => self
                .identities
                .confirm_channel(&owned, &remote_identity, &remote_device)?,
            Effect::DeleteChannel {
                remote_identity,
                remote_device,
            } => self
                .identities
                .delete_channel_if_exists(&owned, &remote_identity, &remote_device)?,
            Effect::AddContact {
                contact,
                details,
                origin,
            } => self
                .identities
                .add_contact(&owned, &contact, &details, origin, true)?,
            Effect::AddTrustOrigin { contact, origin } => {
                self.identities.add_trust_origin(&owned, &contact, origin)?
            }
            Effect::AddDevice { identity, device } => {
                self.identities.add_device(&owned, &identity, &device)?
            }
            Effect::SetContactDetails { contact, details } => {
                self.identities
                    .set_contact_details(&owned, &contact, &details)?
            }
            Effect::AbortInstance(instance_uid) => {
                info!(protocol = %P::ID, instance = %instance_uid, "aborting conflicting instance");
                self.delete_instance(P::ID, &instance_uid)?
            }
        }
        Ok(())
    }

    fn delete_instance(&mut self, protocol: ProtocolId, instance_uid: &Uid) -> Result<(), Error> {
        self.instances.delete(protocol, instance_uid, &self.identity)?;
        for link in self
            .instances
            .links_from(&self.identity, protocol, instance_uid)?
        {
            self.instances.delete_link(&self.identity, &link)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::channel_creation::state;
    use crate::protocols::testing::{self, messages};
    use crate::store::{MemoryIdentityStore, MemoryInstanceStore, MemoryLedger, TrustOrigin};
    use crate::Seed;

    /// An instance store whose next `failures` puts fail.
    #[derive(Default)]
    struct FailingPuts {
        inner: MemoryInstanceStore,
        failures: usize,
    }

    impl Transactional for FailingPuts {
        fn begin(&mut self) -> Result<(), Error> {
            self.inner.begin()
        }

        fn commit(&mut self) -> Result<(), Error> {
            self.inner.commit()
        }

        fn rollback(&mut self) {
            self.inner.rollback()
        }
    }

    impl InstanceStore for FailingPuts {
        fn get(
            &self,
            protocol: ProtocolId,
            instance_uid: &Uid,
            owned: &Identity,
        ) -> Result<Option<InstanceRecord>, Error> {
            self.inner.get(protocol, instance_uid, owned)
        }

        fn put(&mut self, record: InstanceRecord) -> Result<(), Error> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::Storage("disk full".to_owned()));
            }
            self.inner.put(record)
        }

        fn delete(
            &mut self,
            protocol: ProtocolId,
            instance_uid: &Uid,
            owned: &Identity,
        ) -> Result<(), Error> {
            self.inner.delete(protocol, instance_uid, owned)
        }

        fn find_by_peer(
            &self,
            protocol: ProtocolId,
            owned: &Identity,
            peer: &PeerKey,
        ) -> Result<Vec<Uid>, Error> {
            self.inner.find_by_peer(protocol, owned, peer)
        }

        fn put_link(&mut self, owned: &Identity, link: InstanceLink) -> Result<(), Error> {
            self.inner.put_link(owned, link)
        }

        fn links_from(
            &self,
            owned: &Identity,
            child_protocol: ProtocolId,
            child_instance_uid: &Uid,
        ) -> Result<Vec<InstanceLink>, Error> {
            self.inner
                .links_from(owned, child_protocol, child_instance_uid)
        }

        fn delete_link(&mut self, owned: &Identity, link: &InstanceLink) -> Result<(), Error> {
            self.inner.delete_link(owned, link)
        }
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let prng = Prng::from_seed([36; 32]);
        let mut uids = [Uid::random(&prng).unwrap(), Uid::random(&prng).unwrap()];
        uids.sort();

        let mut follower = testing::device(&prng, IdentityKey::new(&prng).unwrap(), uids[0], &[]);
        let follower_id = *follower.identity();
        let leader_keys = IdentityKey::new(&prng).unwrap();
        let leader_id = leader_keys.identity();

        let stale = Seed::random(&prng).unwrap();
        let mut identities = MemoryIdentityStore::new();
        identities.add_owned_identity(leader_id, &[uids[1]], b"details");
        identities
            .add_contact(&leader_id, &follower_id, b"details", TrustOrigin::Sas, true)
            .unwrap();
        identities.add_device(&leader_id, &follower_id, &uids[0]).unwrap();
        identities
            .create_channel(&leader_id, &follower_id, &uids[0], &stale, 0)
            .unwrap();
        let mut leader = Engine::new(
            leader_keys,
            uids[1],
            None,
            identities,
            FailingPuts {
                failures: 1,
                ..FailingPuts::default()
            },
            MemoryLedger::new(),
            Prng::from_seed(prng.random_array().unwrap()),
        )
        .unwrap();

        let follower_store = follower.identities_mut();
        follower_store
            .add_contact(&follower_id, &leader_id, b"details", TrustOrigin::Sas, true)
            .unwrap();
        follower_store.add_device(&follower_id, &leader_id, &uids[1]).unwrap();

        let start = follower.start_channel_creation(leader_id, uids[1]).unwrap();
        let (ping, _) = messages(&start).remove(0);

        // The ping clears the stale channel and records its signature before the put fails.
        let outcome = leader
            .handle_message(&ping, &ReceptionChannelInfo::AsymmetricBroadcast)
            .unwrap();
        assert_eq!(outcome, Outcome::RetryLater);
        assert!(leader.ledger().is_empty());
        assert!(leader.instances().inner.is_empty());
        let channel = leader
            .identities()
            .channel(&leader_id, &follower_id, &uids[0])
            .unwrap();
        assert_eq!(channel.seed, stale);

        let outcome = leader
            .handle_message(&ping, &ReceptionChannelInfo::AsymmetricBroadcast)
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Advanced {
                state_id: state::WAITING_FOR_K1,
                ..
            }
        ));
        assert_eq!(leader.ledger().len(), 1);
        assert_eq!(leader.instances().inner.len(), 1);
        assert!(
            leader
                .identities()
                .channel(&leader_id, &follower_id, &uids[0])
                .is_none()
        );
    }
}

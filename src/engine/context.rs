use crate::codec::Encoded;
use crate::crypto::Seed;
use crate::engine::{
    Destination, Dialog, DialogKind, DialogUpdate, MessageSet, Notification, Outgoing, PeerKey,
    ProtocolId, ProtocolMessage, ProtocolState, ReceptionChannelInfo,
};
use crate::store::{IdentityStore, InstanceStore, ReplayLedger, TrustOrigin};
use crate::{EngineConfig, Error, Identity, IdentityKey, Prng, Uid};

/// A write a step asks the engine to perform when it commits.
#[derive(Debug)]
pub(crate) enum Effect {
    Emit(Outgoing),
    RecordToken(Vec<u8>),
    CreateChannel {
        remote_identity: Identity,
        remote_device: Uid,
        seed: Seed,
    },
    ConfirmChannel {
        remote_identity: Identity,
        remote_device: Uid,
    },
    DeleteChannel {
        remote_identity: Identity,
        remote_device: Uid,
    },
    AddContact {
        contact: Identity,
        details: Vec<u8>,
        origin: TrustOrigin,
    },
    AddTrustOrigin {
        contact: Identity,
        origin: TrustOrigin,
    },
    AddDevice {
        identity: Identity,
        device: Uid,
    },
    SetContactDetails {
        contact: Identity,
        details: Vec<u8>,
    },
    AbortInstance(Uid),
}

/// What a step sees while it runs.
///
/// Reads go straight to the collaborator stores. Writes are recorded and only applied if the
/// step returns [`Transition::Next`](crate::engine::Transition), so a step that rejects, retries or
/// fails leaves nothing behind.
pub struct StepContext<'a> {
    owned_identity: Identity,
    device_uid: Uid,
    protocol: ProtocolId,
    instance_uid: Uid,
    keys: &'a IdentityKey,
    prng: &'a Prng,
    config: &'a EngineConfig,
    reception: &'a ReceptionChannelInfo,
    identities: &'a dyn IdentityStore,
    instances: &'a dyn InstanceStore,
    ledger: &'a dyn ReplayLedger,
    peer: Option<PeerKey>,
    effects: Vec<Effect>,
}

impl<'a> StepContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        keys: &'a IdentityKey,
        device_uid: Uid,
        protocol: ProtocolId,
        instance_uid: Uid,
        prng: &'a Prng,
        config: &'a EngineConfig,
        reception: &'a ReceptionChannelInfo,
        identities: &'a dyn IdentityStore,
        instances: &'a dyn InstanceStore,
        ledger: &'a dyn ReplayLedger,
        peer: Option<PeerKey>,
    ) -> Self {
        Self {
            owned_identity: keys.identity(),
            device_uid,
            protocol,
            instance_uid,
            keys,
            prng,
            config,
            reception,
            identities,
            instances,
            ledger,
            peer,
            effects: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (Vec<Effect>, Option<PeerKey>) {
        (self.effects, self.peer)
    }

    pub fn owned_identity(&self) -> &Identity {
        &self.owned_identity
    }

    pub fn device_uid(&self) -> &Uid {
        &self.device_uid
    }

    pub fn instance_uid(&self) -> &Uid {
        &self.instance_uid
    }

    pub fn keys(&self) -> &IdentityKey {
        self.keys
    }

    pub fn prng(&self) -> &Prng {
        self.prng
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn reception(&self) -> &ReceptionChannelInfo {
        self.reception
    }

    /// Whether `identity`/`device` may take part in a handshake with this device: an active
    /// contact, or another device of the owned identity.
    pub fn is_trusted_device(&self, identity: &Identity, device: &Uid) -> Result<bool, Error> {
        if *identity == self.owned_identity {
            return Ok(*device != self.device_uid);
        }
        self.identities
            .is_active_contact(&self.owned_identity, identity)
    }

    pub fn is_contact(&self, contact: &Identity) -> Result<bool, Error> {
        self.identities.is_contact(&self.owned_identity, contact)
    }

    pub fn owned_details(&self) -> Result<Vec<u8>, Error> {
        self.identities.owned_details(&self.owned_identity)
    }

    pub fn owned_device_uids(&self) -> Result<Vec<Uid>, Error> {
        self.identities.owned_device_uids(&self.owned_identity)
    }

    /// Devices of the owned identity other than this one.
    pub fn other_owned_device_uids(&self) -> Result<Vec<Uid>, Error> {
        let mut devices = self.owned_device_uids()?;
        devices.retain(|device| *device != self.device_uid);
        Ok(devices)
    }

    pub fn channel_exists(&self, remote_identity: &Identity, remote_device: &Uid) -> Result<bool, Error> {
        self.identities
            .channel_exists(&self.owned_identity, remote_identity, remote_device)
    }

    /// Whether a single-use token was already consumed by the owned identity.
    pub fn is_replayed(&self, token: &[u8]) -> Result<bool, Error> {
        self.ledger.exists(&self.owned_identity, token)
    }

    /// Other instances of this protocol negotiating with `peer`.
    pub fn conflicting_instances(&self, peer: &PeerKey) -> Result<Vec<Uid>, Error> {
        let mut uids = self
            .instances
            .find_by_peer(self.protocol, &self.owned_identity, peer)?;
        uids.retain(|uid| *uid != self.instance_uid);
        Ok(uids)
    }

    /// The persisted state of another instance of this protocol.
    pub fn instance_state<S: ProtocolState>(&self, instance_uid: &Uid) -> Result<Option<S>, Error> {
        let Some(record) = self
            .instances
            .get(self.protocol, instance_uid, &self.owned_identity)?
        else {
            return Ok(None);
        };
        let payload = Encoded::from_bytes(&record.state_payload)?;
        Ok(Some(S::decode(record.state_id, &payload)?))
    }

    /// Marks this instance as negotiating with `peer`.
    pub fn claim_peer(&mut self, peer: PeerKey) {
        self.peer = Some(peer);
    }

    /// Posts a message to this instance's counterparts.
    pub fn post<M: MessageSet>(&mut self, message: &M, destination: Destination) {
        let message = ProtocolMessage {
            protocol: self.protocol,
            instance_uid: self.instance_uid,
            message_id: message.id(),
            inputs: message.encode_inputs(),
        };
        self.emit(Outgoing::Message {
            message,
            destination,
        });
    }

    /// Posts a local message that starts a fresh instance of this protocol.
    pub fn post_restart<M: MessageSet>(&mut self, message: &M) -> Result<Uid, Error> {
        let instance_uid = Uid::random(self.prng)?;
        let message = ProtocolMessage {
            protocol: self.protocol,
            instance_uid,
            message_id: message.id(),
            inputs: message.encode_inputs(),
        };
        self.emit(Outgoing::Message {
            message,
            destination: Destination::Local,
        });
        Ok(instance_uid)
    }

    pub fn show_dialog(&mut self, uuid: Uid, kind: DialogKind) {
        let dialog = Dialog {
            uuid,
            protocol: self.protocol,
            instance_uid: self.instance_uid,
            kind,
        };
        self.emit(Outgoing::Dialog(DialogUpdate::Show(dialog)));
    }

    pub fn delete_dialog(&mut self, uuid: Uid) {
        self.emit(Outgoing::Dialog(DialogUpdate::Delete { uuid }));
    }

    pub fn notify(&mut self, notification: Notification) {
        self.emit(Outgoing::Notification(notification));
    }

    pub fn record_token(&mut self, token: &[u8]) {
        self.effects.push(Effect::RecordToken(token.to_vec()));
    }

    pub fn create_channel(&mut self, remote_identity: Identity, remote_device: Uid, seed: Seed) {
        self.effects.push(Effect::CreateChannel {
            remote_identity,
            remote_device,
            seed,
        });
    }

    pub fn confirm_channel(&mut self, remote_identity: Identity, remote_device: Uid) {
        self.effects.push(Effect::ConfirmChannel {
            remote_identity,
            remote_device,
        });
    }

    pub fn delete_channel(&mut self, remote_identity: Identity, remote_device: Uid) {
        self.effects.push(Effect::DeleteChannel {
            remote_identity,
            remote_device,
        });
    }

    pub fn add_contact(&mut self, contact: Identity, details: Vec<u8>, origin: TrustOrigin) {
        self.effects.push(Effect::AddContact {
            contact,
            details,
            origin,
        });
    }

    pub fn add_trust_origin(&mut self, contact: Identity, origin: TrustOrigin) {
        self.effects
            .push(Effect::AddTrustOrigin { contact, origin });
    }

    pub fn add_device(&mut self, identity: Identity, device: Uid) {
        self.effects.push(Effect::AddDevice { identity, device });
    }

    pub fn set_contact_details(&mut self, contact: Identity, details: Vec<u8>) {
        self.effects
            .push(Effect::SetContactDetails { contact, details });
    }

    /// Deletes another instance of this protocol, along with its links.
    pub fn abort_instance(&mut self, instance_uid: Uid) {
        self.effects.push(Effect::AbortInstance(instance_uid));
    }

    fn emit(&mut self, outgoing: Outgoing) {
        self.effects.push(Effect::Emit(outgoing));
    }
}

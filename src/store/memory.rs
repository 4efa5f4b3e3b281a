use std::collections::{BTreeSet, HashMap, HashSet};

use crate::crypto::Seed;
use crate::engine::{InstanceLink, InstanceRecord, PeerKey, ProtocolId};
use crate::store::{IdentityStore, InstanceStore, ReplayLedger, Transactional, TrustOrigin};
use crate::{Error, Identity, Uid};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactRecord {
    pub details: Vec<u8>,
    pub origins: Vec<TrustOrigin>,
    pub devices: BTreeSet<Uid>,
    pub one_to_one: bool,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRecord {
    pub seed: Seed,
    pub ratchet_index: u32,
    pub confirmed: bool,
}

#[derive(Clone, Debug, Default)]
struct OwnedIdentityRecord {
    devices: BTreeSet<Uid>,
    details: Vec<u8>,
    contacts: HashMap<Identity, ContactRecord>,
    channels: HashMap<(Identity, Uid), ChannelRecord>,
}

/// An [`IdentityStore`] held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryIdentityStore {
    owned: HashMap<Identity, OwnedIdentityRecord>,
    backup: Option<HashMap<Identity, OwnedIdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owned identity with its devices and published details.
    pub fn add_owned_identity(&mut self, identity: Identity, devices: &[Uid], details: &[u8]) {
        let record = self.owned.entry(identity).or_default();
        record.devices.extend(devices.iter().copied());
        record.details = details.to_vec();
    }

    pub fn contact(&self, owned: &Identity, contact: &Identity) -> Option<&ContactRecord> {
        self.owned.get(owned)?.contacts.get(contact)
    }

    pub fn channel(
        &self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Option<&ChannelRecord> {
        self.owned
            .get(owned)?
            .channels
            .get(&(*remote_identity, *remote_device))
    }

    /// Remote devices of `remote_identity` this owned identity has a confirmed channel with.
    pub fn confirmed_channel_devices(&self, owned: &Identity, remote_identity: &Identity) -> Vec<Uid> {
        let Some(record) = self.owned.get(owned) else {
            return Vec::new();
        };
        let mut devices: Vec<Uid> = record
            .channels
            .iter()
            .filter(|((identity, _), channel)| identity == remote_identity && channel.confirmed)
            .map(|((_, device), _)| *device)
            .collect();
        devices.sort();
        devices
    }

    fn owned(&self, owned: &Identity) -> Result<&OwnedIdentityRecord, Error> {
        self.owned
            .get(owned)
            .ok_or_else(|| Error::Storage(format!("unknown owned identity {owned}")))
    }

    fn owned_mut(&mut self, owned: &Identity) -> Result<&mut OwnedIdentityRecord, Error> {
        self.owned
            .get_mut(owned)
            .ok_or_else(|| Error::Storage(format!("unknown owned identity {owned}")))
    }

    fn contact_mut(
        &mut self,
        owned: &Identity,
        contact: &Identity,
    ) -> Result<&mut ContactRecord, Error> {
        self.owned_mut(owned)?
            .contacts
            .get_mut(contact)
            .ok_or_else(|| Error::Storage(format!("unknown contact {contact}")))
    }
}

impl Transactional for MemoryIdentityStore {
    fn begin(&mut self) -> Result<(), Error> {
        self.backup = Some(self.owned.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.backup = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(owned) = self.backup.take() {
            self.owned = owned;
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn owned_device_uids(&self, owned: &Identity) -> Result<Vec<Uid>, Error> {
        Ok(self.owned(owned)?.devices.iter().copied().collect())
    }

    fn owned_details(&self, owned: &Identity) -> Result<Vec<u8>, Error> {
        Ok(self.owned(owned)?.details.clone())
    }

    fn is_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error> {
        Ok(self.owned(owned)?.contacts.contains_key(contact))
    }

    fn is_active_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error> {
        Ok(self
            .owned(owned)?
            .contacts
            .get(contact)
            .is_some_and(|record| record.active))
    }

    fn is_one_to_one_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error> {
        Ok(self
            .owned(owned)?
            .contacts
            .get(contact)
            .is_some_and(|record| record.one_to_one))
    }

    fn contact_device_uids(&self, owned: &Identity, contact: &Identity) -> Result<Vec<Uid>, Error> {
        Ok(self
            .owned(owned)?
            .contacts
            .get(contact)
            .map(|record| record.devices.iter().copied().collect())
            .unwrap_or_default())
    }

    fn add_contact(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        details: &[u8],
        origin: TrustOrigin,
        one_to_one: bool,
    ) -> Result<(), Error> {
        let record = self
            .owned_mut(owned)?
            .contacts
            .entry(*contact)
            .or_insert_with(|| ContactRecord {
                details: details.to_vec(),
                origins: Vec::new(),
                devices: BTreeSet::new(),
                one_to_one,
                active: true,
            });
        record.origins.push(origin);
        record.one_to_one |= one_to_one;
        Ok(())
    }

    fn add_trust_origin(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        origin: TrustOrigin,
    ) -> Result<(), Error> {
        self.contact_mut(owned, contact)?.origins.push(origin);
        Ok(())
    }

    fn add_device(
        &mut self,
        owned: &Identity,
        identity: &Identity,
        device: &Uid,
    ) -> Result<(), Error> {
        if identity == owned {
            self.owned_mut(owned)?.devices.insert(*device);
        } else {
            self.contact_mut(owned, identity)?.devices.insert(*device);
        }
        Ok(())
    }

    fn remove_device(
        &mut self,
        owned: &Identity,
        identity: &Identity,
        device: &Uid,
    ) -> Result<(), Error> {
        if identity == owned {
            self.owned_mut(owned)?.devices.remove(device);
        } else {
            self.contact_mut(owned, identity)?.devices.remove(device);
        }
        Ok(())
    }

    fn set_contact_details(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        details: &[u8],
    ) -> Result<(), Error> {
        self.contact_mut(owned, contact)?.details = details.to_vec();
        Ok(())
    }

    fn set_contact_active(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        active: bool,
    ) -> Result<(), Error> {
        self.contact_mut(owned, contact)?.active = active;
        Ok(())
    }

    fn channel_exists(
        &self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<bool, Error> {
        Ok(self
            .owned(owned)?
            .channels
            .contains_key(&(*remote_identity, *remote_device)))
    }

    fn create_channel(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
        seed: &Seed,
        ratchet_index: u32,
    ) -> Result<(), Error> {
        let channels = &mut self.owned_mut(owned)?.channels;
        let key = (*remote_identity, *remote_device);
        if channels.contains_key(&key) {
            return Err(Error::Storage(format!(
                "channel with {remote_identity}/{remote_device} already exists"
            )));
        }
        channels.insert(
            key,
            ChannelRecord {
                seed: seed.clone(),
                ratchet_index,
                confirmed: false,
            },
        );
        Ok(())
    }

    fn confirm_channel(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<(), Error> {
        let channel = self
            .owned_mut(owned)?
            .channels
            .get_mut(&(*remote_identity, *remote_device))
            .ok_or_else(|| {
                Error::Storage(format!("no channel with {remote_identity}/{remote_device}"))
            })?;
        channel.confirmed = true;
        Ok(())
    }

    fn delete_channel_if_exists(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<(), Error> {
        self.owned_mut(owned)?
            .channels
            .remove(&(*remote_identity, *remote_device));
        Ok(())
    }
}

/// An [`InstanceStore`] held in memory. Its content can be exported with
/// [`MemoryInstanceStore::serialize`].
#[derive(Clone, Debug, Default)]
pub struct MemoryInstanceStore {
    pub(crate) records: HashMap<(ProtocolId, Uid, Identity), InstanceRecord>,
    pub(crate) links: HashMap<Identity, Vec<InstanceLink>>,
    backup: Option<InstanceTables>,
}

type InstanceTables = (
    HashMap<(ProtocolId, Uid, Identity), InstanceRecord>,
    HashMap<Identity, Vec<InstanceLink>>,
);

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }
}

impl Transactional for MemoryInstanceStore {
    fn begin(&mut self) -> Result<(), Error> {
        self.backup = Some((self.records.clone(), self.links.clone()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.backup = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some((records, links)) = self.backup.take() {
            self.records = records;
            self.links = links;
        }
    }
}

impl InstanceStore for MemoryInstanceStore {
    fn get(
        &self,
        protocol: ProtocolId,
        instance_uid: &Uid,
        owned: &Identity,
    ) -> Result<Option<InstanceRecord>, Error> {
        Ok(self.records.get(&(protocol, *instance_uid, *owned)).cloned())
    }

    fn put(&mut self, record: InstanceRecord) -> Result<(), Error> {
        self.records.insert(
            (record.protocol, record.instance_uid, record.owned_identity),
            record,
        );
        Ok(())
    }

    fn delete(
        &mut self,
        protocol: ProtocolId,
        instance_uid: &Uid,
        owned: &Identity,
    ) -> Result<(), Error> {
        self.records.remove(&(protocol, *instance_uid, *owned));
        Ok(())
    }

    fn find_by_peer(
        &self,
        protocol: ProtocolId,
        owned: &Identity,
        peer: &PeerKey,
    ) -> Result<Vec<Uid>, Error> {
        let mut uids: Vec<Uid> = self
            .records
            .values()
            .filter(|record| {
                record.protocol == protocol
                    && record.owned_identity == *owned
                    && record.peer.as_ref() == Some(peer)
            })
            .map(|record| record.instance_uid)
            .collect();
        uids.sort();
        Ok(uids)
    }

    fn put_link(&mut self, owned: &Identity, link: InstanceLink) -> Result<(), Error> {
        let links = self.links.entry(*owned).or_default();
        if !links.contains(&link) {
            links.push(link);
        }
        Ok(())
    }

    fn links_from(
        &self,
        owned: &Identity,
        child_protocol: ProtocolId,
        child_instance_uid: &Uid,
    ) -> Result<Vec<InstanceLink>, Error> {
        Ok(self
            .links
            .get(owned)
            .map(|links| {
                links
                    .iter()
                    .filter(|link| {
                        link.child_protocol == child_protocol
                            && link.child_instance_uid == *child_instance_uid
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_link(&mut self, owned: &Identity, link: &InstanceLink) -> Result<(), Error> {
        if let Some(links) = self.links.get_mut(owned) {
            links.retain(|existing| existing != link);
        }
        Ok(())
    }
}

/// A [`ReplayLedger`] held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    pub(crate) tokens: HashMap<Identity, HashSet<Vec<u8>>>,
    backup: Option<HashMap<Identity, HashSet<Vec<u8>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transactional for MemoryLedger {
    fn begin(&mut self) -> Result<(), Error> {
        self.backup = Some(self.tokens.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.backup = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(tokens) = self.backup.take() {
            self.tokens = tokens;
        }
    }
}

impl ReplayLedger for MemoryLedger {
    fn exists(&self, owned: &Identity, token: &[u8]) -> Result<bool, Error> {
        Ok(self
            .tokens
            .get(owned)
            .is_some_and(|tokens| tokens.contains(token)))
    }

    fn record(&mut self, owned: &Identity, token: &[u8]) -> Result<(), Error> {
        self.tokens.entry(*owned).or_default().insert(token.to_vec());
        Ok(())
    }
}

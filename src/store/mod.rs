//! Collaborator interfaces the engine reads from and commits effects to, with in-memory
//! implementations.
//!
//! Reads take `&self` and may run while a step executes. Writes take `&mut self` and only run
//! while the engine commits a step, inside a [`Transactional`] bracket on every store.
mod memory;
pub use memory::*;

mod proto;

use crate::crypto::Seed;
use crate::engine::{InstanceLink, InstanceRecord, PeerKey, ProtocolId};
use crate::{Error, Identity, Uid};

/// Why a contact is trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustOrigin {
    /// Mutual short authentication string comparison.
    Sas,
}

/// Groups the writes of one committed step.
///
/// The engine calls `begin` on every store, applies the step's writes, then calls `commit` on
/// every store once all writes succeeded. If any write fails, every store is rolled back to
/// its state at `begin`. Stores that share a backend should commit in one backend
/// transaction.
pub trait Transactional {
    fn begin(&mut self) -> Result<(), Error>;

    fn commit(&mut self) -> Result<(), Error>;

    /// Discards every write since `begin`. A rollback without `begin` does nothing.
    fn rollback(&mut self);
}

/// Contacts, devices and channels, scoped by owned identity.
pub trait IdentityStore: Transactional {
    /// Every device of the owned identity, this one included.
    fn owned_device_uids(&self, owned: &Identity) -> Result<Vec<Uid>, Error>;

    /// The owned identity's serialized published details.
    fn owned_details(&self, owned: &Identity) -> Result<Vec<u8>, Error>;

    fn is_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error>;

    fn is_active_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error>;

    fn is_one_to_one_contact(&self, owned: &Identity, contact: &Identity) -> Result<bool, Error>;

    fn contact_device_uids(&self, owned: &Identity, contact: &Identity) -> Result<Vec<Uid>, Error>;

    fn add_contact(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        details: &[u8],
        origin: TrustOrigin,
        one_to_one: bool,
    ) -> Result<(), Error>;

    fn add_trust_origin(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        origin: TrustOrigin,
    ) -> Result<(), Error>;

    /// Adds a device to a contact, or to the owned identity when `identity == owned`.
    fn add_device(
        &mut self,
        owned: &Identity,
        identity: &Identity,
        device: &Uid,
    ) -> Result<(), Error>;

    fn remove_device(
        &mut self,
        owned: &Identity,
        identity: &Identity,
        device: &Uid,
    ) -> Result<(), Error>;

    fn set_contact_details(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        details: &[u8],
    ) -> Result<(), Error>;

    fn set_contact_active(
        &mut self,
        owned: &Identity,
        contact: &Identity,
        active: bool,
    ) -> Result<(), Error>;

    fn channel_exists(
        &self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<bool, Error>;

    fn create_channel(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
        seed: &Seed,
        ratchet_index: u32,
    ) -> Result<(), Error>;

    fn confirm_channel(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<(), Error>;

    fn delete_channel_if_exists(
        &mut self,
        owned: &Identity,
        remote_identity: &Identity,
        remote_device: &Uid,
    ) -> Result<(), Error>;
}

/// Persisted protocol instances and instance links.
pub trait InstanceStore: Transactional {
    fn get(
        &self,
        protocol: ProtocolId,
        instance_uid: &Uid,
        owned: &Identity,
    ) -> Result<Option<InstanceRecord>, Error>;

    /// Inserts or wholesale replaces the record.
    fn put(&mut self, record: InstanceRecord) -> Result<(), Error>;

    fn delete(
        &mut self,
        protocol: ProtocolId,
        instance_uid: &Uid,
        owned: &Identity,
    ) -> Result<(), Error>;

    /// Uids of the instances of `protocol` negotiating with `peer`.
    fn find_by_peer(
        &self,
        protocol: ProtocolId,
        owned: &Identity,
        peer: &PeerKey,
    ) -> Result<Vec<Uid>, Error>;

    fn put_link(&mut self, owned: &Identity, link: InstanceLink) -> Result<(), Error>;

    /// Links whose child is the given instance.
    fn links_from(
        &self,
        owned: &Identity,
        child_protocol: ProtocolId,
        child_instance_uid: &Uid,
    ) -> Result<Vec<InstanceLink>, Error>;

    fn delete_link(&mut self, owned: &Identity, link: &InstanceLink) -> Result<(), Error>;
}

/// Single-use tokens already consumed by an owned identity. Entries never expire.
pub trait ReplayLedger: Transactional {
    fn exists(&self, owned: &Identity, token: &[u8]) -> Result<bool, Error>;

    /// Records a token. Recording a token twice is not an error.
    fn record(&mut self, owned: &Identity, token: &[u8]) -> Result<(), Error>;
}

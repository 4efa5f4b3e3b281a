//! Protocol Buffers snapshots of the in-memory instance store and replay ledger.

use prost::Message;

use crate::engine::{InstanceLink, InstanceRecord, PeerKey, ProtocolId};
use crate::store::{MemoryInstanceStore, MemoryLedger};
use crate::{Error, Identity, Uid};

const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct PeerKeyProto {
    #[prost(bytes = "vec", tag = "1")]
    pub identity: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub device: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct InstanceRecordProto {
    #[prost(uint32, tag = "1")]
    pub protocol: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub instance_uid: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub owned_identity: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub state_id: u32,
    #[prost(bytes = "vec", tag = "5")]
    pub state_payload: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub peer: Option<PeerKeyProto>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct InstanceLinkProto {
    #[prost(bytes = "vec", tag = "1")]
    pub owned_identity: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub child_protocol: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub child_instance_uid: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub child_expected_state: u32,
    #[prost(uint32, tag = "5")]
    pub parent_protocol: u32,
    #[prost(bytes = "vec", tag = "6")]
    pub parent_instance_uid: Vec<u8>,
    #[prost(uint32, tag = "7")]
    pub parent_message_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct InstanceStoreProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(message, repeated, tag = "2")]
    pub records: Vec<InstanceRecordProto>,
    #[prost(message, repeated, tag = "3")]
    pub links: Vec<InstanceLinkProto>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct LedgerEntryProto {
    #[prost(bytes = "vec", tag = "1")]
    pub owned_identity: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub tokens: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct LedgerProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<LedgerEntryProto>,
}

fn uid_from(bytes: &[u8]) -> Result<Uid, Error> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Serde("Invalid uid length".to_string()))?;
    Ok(Uid::from(bytes))
}

fn identity_from(bytes: &[u8]) -> Result<Identity, Error> {
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| Error::Serde("Invalid identity length".to_string()))?;
    Identity::from_bytes(bytes)
}

fn protocol_from(value: u32) -> Result<ProtocolId, Error> {
    ProtocolId::try_from(u64::from(value))
}

fn tag_from(value: u32) -> Result<u8, Error> {
    u8::try_from(value).map_err(|_| Error::Serde(format!("Invalid state or message id {value}")))
}

fn check_version(version: u32) -> Result<(), Error> {
    if version != SCHEMA_VERSION {
        return Err(Error::Serde(format!(
            "Unsupported schema version: {version}"
        )));
    }
    Ok(())
}

impl MemoryInstanceStore {
    /// Serialize the instance table and instance links to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let records = self
            .records
            .values()
            .map(|record| InstanceRecordProto {
                protocol: record.protocol as u32,
                instance_uid: record.instance_uid.as_bytes().to_vec(),
                owned_identity: record.owned_identity.as_bytes().to_vec(),
                state_id: u32::from(record.state_id),
                state_payload: record.state_payload.clone(),
                peer: record.peer.map(|peer| PeerKeyProto {
                    identity: peer.identity.as_bytes().to_vec(),
                    device: peer.device.map(|device| device.as_bytes().to_vec()),
                }),
            })
            .collect();

        let links = self
            .links
            .iter()
            .flat_map(|(owned, links)| {
                links.iter().map(move |link| InstanceLinkProto {
                    owned_identity: owned.as_bytes().to_vec(),
                    child_protocol: link.child_protocol as u32,
                    child_instance_uid: link.child_instance_uid.as_bytes().to_vec(),
                    child_expected_state: u32::from(link.child_expected_state),
                    parent_protocol: link.parent_protocol as u32,
                    parent_instance_uid: link.parent_instance_uid.as_bytes().to_vec(),
                    parent_message_id: u32::from(link.parent_message_id),
                })
            })
            .collect();

        let store_proto = InstanceStoreProto {
            version: SCHEMA_VERSION,
            records,
            links,
        };

        let mut buf = Vec::new();
        store_proto
            .encode(&mut buf)
            .map_err(|err| Error::Serde(format!("Failed to encode instance store: {err:?}")))?;

        Ok(buf)
    }

    /// Deserialize an instance store from Protocol Buffers format
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let store_proto = InstanceStoreProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode instance store: {err:?}")))?;
        check_version(store_proto.version)?;

        let mut store = MemoryInstanceStore::new();
        for record in store_proto.records {
            let peer = match record.peer {
                Some(peer) => Some(PeerKey {
                    identity: identity_from(&peer.identity)?,
                    device: peer.device.as_deref().map(uid_from).transpose()?,
                }),
                None => None,
            };
            let record = InstanceRecord {
                protocol: protocol_from(record.protocol)?,
                instance_uid: uid_from(&record.instance_uid)?,
                owned_identity: identity_from(&record.owned_identity)?,
                state_id: tag_from(record.state_id)?,
                state_payload: record.state_payload,
                peer,
            };
            store.records.insert(
                (record.protocol, record.instance_uid, record.owned_identity),
                record,
            );
        }

        for link in store_proto.links {
            let owned = identity_from(&link.owned_identity)?;
            store.links.entry(owned).or_default().push(InstanceLink {
                child_protocol: protocol_from(link.child_protocol)?,
                child_instance_uid: uid_from(&link.child_instance_uid)?,
                child_expected_state: tag_from(link.child_expected_state)?,
                parent_protocol: protocol_from(link.parent_protocol)?,
                parent_instance_uid: uid_from(&link.parent_instance_uid)?,
                parent_message_id: tag_from(link.parent_message_id)?,
            });
        }

        Ok(store)
    }
}

impl MemoryLedger {
    /// Serialize the ledger to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let entries = self
            .tokens
            .iter()
            .map(|(owned, tokens)| LedgerEntryProto {
                owned_identity: owned.as_bytes().to_vec(),
                tokens: tokens.iter().cloned().collect(),
            })
            .collect();

        let ledger_proto = LedgerProto {
            version: SCHEMA_VERSION,
            entries,
        };

        let mut buf = Vec::new();
        ledger_proto
            .encode(&mut buf)
            .map_err(|err| Error::Serde(format!("Failed to encode ledger: {err:?}")))?;

        Ok(buf)
    }

    /// Deserialize a ledger from Protocol Buffers format
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let ledger_proto = LedgerProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode ledger: {err:?}")))?;
        check_version(ledger_proto.version)?;

        let mut ledger = MemoryLedger::new();
        for entry in ledger_proto.entries {
            let owned = identity_from(&entry.owned_identity)?;
            ledger
                .tokens
                .entry(owned)
                .or_default()
                .extend(entry.tokens);
        }

        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InstanceStore, ReplayLedger};
    use crate::{IdentityKey, Prng};

    #[test]
    fn test_instance_store_snapshot() {
        let prng = Prng::from_seed([71; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();
        let contact = IdentityKey::new(&prng).unwrap().identity();
        let uid = Uid::random(&prng).unwrap();
        let mut store = MemoryInstanceStore::new();

        let record = InstanceRecord {
            protocol: ProtocolId::ChannelCreation,
            instance_uid: uid,
            owned_identity: owned,
            state_id: 3,
            state_payload: vec![9, 9, 9],
            peer: Some(PeerKey {
                identity: contact,
                device: Some(Uid::random(&prng).unwrap()),
            }),
        };
        store.put(record.clone()).unwrap();
        let link = InstanceLink {
            child_protocol: ProtocolId::ChannelCreation,
            child_instance_uid: uid,
            child_expected_state: 6,
            parent_protocol: ProtocolId::TrustEstablishment,
            parent_instance_uid: Uid::random(&prng).unwrap(),
            parent_message_id: 4,
        };
        store.put_link(&owned, link.clone()).unwrap();

        let restored = MemoryInstanceStore::deserialize(&store.serialize().unwrap()).unwrap();
        assert_eq!(
            restored
                .get(ProtocolId::ChannelCreation, &uid, &owned)
                .unwrap(),
            Some(record)
        );
        assert_eq!(
            restored
                .links_from(&owned, ProtocolId::ChannelCreation, &uid)
                .unwrap(),
            vec![link]
        );
    }

    #[test]
    fn test_ledger_snapshot() {
        let prng = Prng::from_seed([72; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();
        let mut ledger = MemoryLedger::new();
        ledger.record(&owned, b"first").unwrap();
        ledger.record(&owned, b"second").unwrap();

        let restored = MemoryLedger::deserialize(&ledger.serialize().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.exists(&owned, b"second").unwrap());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let mut buf = Vec::new();
        LedgerProto {
            version: 2,
            entries: Vec::new(),
        }
        .encode(&mut buf)
        .unwrap();

        assert!(matches!(
            MemoryLedger::deserialize(&buf),
            Err(Error::Serde(_))
        ));
    }
}

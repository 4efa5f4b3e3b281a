use crate::engine::{MessageId, Protocol, ProtocolId, StateId};
use crate::{Identity, Uid};

/// The remote endpoint an instance is negotiating with. Used to find conflicting instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub identity: Identity,
    pub device: Option<Uid>,
}

/// A persisted protocol instance, keyed by `(protocol, instance_uid, owned_identity)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRecord {
    pub protocol: ProtocolId,
    pub instance_uid: Uid,
    pub owned_identity: Identity,
    pub state_id: StateId,
    /// Codec bytes of the state variant's fields.
    pub state_payload: Vec<u8>,
    pub peer: Option<PeerKey>,
}

/// Asks the engine to notify a parent instance once a child instance reaches a given state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceLink {
    pub child_protocol: ProtocolId,
    pub child_instance_uid: Uid,
    pub child_expected_state: StateId,
    pub parent_protocol: ProtocolId,
    pub parent_instance_uid: Uid,
    pub parent_message_id: MessageId,
}

/// A loaded protocol instance. Fresh instances start in the protocol's initial state and are
/// only persisted once a step commits.
#[derive(Debug)]
pub struct Instance<P: Protocol> {
    pub uid: Uid,
    pub state: P::State,
    pub peer: Option<PeerKey>,
}

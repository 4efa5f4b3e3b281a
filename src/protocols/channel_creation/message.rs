use crate::codec::{Decode, DecodeError, Encode, Encoded, encoded_struct};
use crate::engine::{MessageId, MessageSet};
use crate::{Identity, Uid, X25519PublicKey};

pub const INITIAL: MessageId = 0;
pub const PING: MessageId = 1;
pub const EPHEMERAL_KEY: MessageId = 2;
pub const K1: MessageId = 3;
pub const K2: MessageId = 4;
pub const FIRST_ACK: MessageId = 5;
pub const SECOND_ACK: MessageId = 6;

encoded_struct! {
    /// Local request to build a channel with a device.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Start {
        pub contact_identity: Identity,
        pub contact_device: Uid,
    }
}

encoded_struct! {
    /// Signed announcement that the sender trusts the addressee and holds no channel with it.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Ping {
        pub identity: Identity,
        pub device: Uid,
        pub signature: Vec<u8>,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct EphemeralKey {
        pub identity: Identity,
        pub device: Uid,
        pub signature: Vec<u8>,
        pub public_key: X25519PublicKey,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct FollowerKey {
        pub public_key: X25519PublicKey,
        pub ciphertext: Vec<u8>,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct LeaderKey {
        pub ciphertext: Vec<u8>,
    }
}

encoded_struct! {
    /// Sent over the new channel. Carries the sender's published details.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Ack {
        pub details: Vec<u8>,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Initial(Start),
    Ping(Ping),
    EphemeralKey(EphemeralKey),
    K1(FollowerKey),
    K2(LeaderKey),
    FirstAck(Ack),
    SecondAck(Ack),
}

impl MessageSet for Message {
    const ALL: &'static [MessageId] =
        &[INITIAL, PING, EPHEMERAL_KEY, K1, K2, FIRST_ACK, SECOND_ACK];

    fn id(&self) -> MessageId {
        match self {
            Self::Initial(_) => INITIAL,
            Self::Ping(_) => PING,
            Self::EphemeralKey(_) => EPHEMERAL_KEY,
            Self::K1(_) => K1,
            Self::K2(_) => K2,
            Self::FirstAck(_) => FIRST_ACK,
            Self::SecondAck(_) => SECOND_ACK,
        }
    }

    fn encode_inputs(&self) -> Encoded {
        match self {
            Self::Initial(inputs) => inputs.encode(),
            Self::Ping(inputs) => inputs.encode(),
            Self::EphemeralKey(inputs) => inputs.encode(),
            Self::K1(inputs) => inputs.encode(),
            Self::K2(inputs) => inputs.encode(),
            Self::FirstAck(inputs) | Self::SecondAck(inputs) => inputs.encode(),
        }
    }

    fn decode(id: MessageId, inputs: &Encoded) -> Result<Self, DecodeError> {
        Ok(match id {
            INITIAL => Self::Initial(Start::decode(inputs)?),
            PING => Self::Ping(Ping::decode(inputs)?),
            EPHEMERAL_KEY => Self::EphemeralKey(EphemeralKey::decode(inputs)?),
            K1 => Self::K1(FollowerKey::decode(inputs)?),
            K2 => Self::K2(LeaderKey::decode(inputs)?),
            FIRST_ACK => Self::FirstAck(Ack::decode(inputs)?),
            SECOND_ACK => Self::SecondAck(Ack::decode(inputs)?),
            other => return Err(DecodeError::UnknownVariant(u64::from(other))),
        })
    }
}

use crate::codec::{Decode, DecodeError, Encode, Encoded, encoded_struct};
use crate::crypto::Seed;
use crate::engine::{ProtocolState, StateId};
use crate::{Identity, Uid, X25519Secret};

pub const INITIAL: StateId = 0;
pub const PING_SENT: StateId = 1;
pub const WAITING_FOR_K1: StateId = 2;
pub const WAITING_FOR_K2: StateId = 3;
pub const WAIT_FOR_FIRST_ACK: StateId = 4;
pub const WAIT_FOR_SECOND_ACK: StateId = 5;
pub const CHANNEL_CONFIRMED: StateId = 6;
pub const CANCELLED: StateId = 7;

encoded_struct! {
    /// Leader side, after sending its ephemeral key.
    #[derive(Clone, Debug)]
    pub struct WaitingForK1 {
        pub contact_identity: Identity,
        pub contact_device: Uid,
        pub ephemeral_secret: X25519Secret,
    }
}

encoded_struct! {
    /// Follower side, after encapsulating `k1` to the leader's ephemeral key.
    #[derive(Clone, Debug)]
    pub struct WaitingForK2 {
        pub contact_identity: Identity,
        pub contact_device: Uid,
        pub ephemeral_secret: X25519Secret,
        pub k1: Seed,
    }
}

encoded_struct! {
    /// A channel is installed and awaits the peer's acknowledgement.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct WaitForAck {
        pub contact_identity: Identity,
        pub contact_device: Uid,
    }
}

#[derive(Clone, Debug)]
pub enum State {
    Initial,
    PingSent,
    WaitingForK1(WaitingForK1),
    WaitingForK2(WaitingForK2),
    WaitForFirstAck(WaitForAck),
    WaitForSecondAck(WaitForAck),
    ChannelConfirmed,
    Cancelled,
}

impl ProtocolState for State {
    const ALL: &'static [StateId] = &[
        INITIAL,
        PING_SENT,
        WAITING_FOR_K1,
        WAITING_FOR_K2,
        WAIT_FOR_FIRST_ACK,
        WAIT_FOR_SECOND_ACK,
        CHANNEL_CONFIRMED,
        CANCELLED,
    ];

    fn initial() -> Self {
        Self::Initial
    }

    fn id(&self) -> StateId {
        match self {
            Self::Initial => INITIAL,
            Self::PingSent => PING_SENT,
            Self::WaitingForK1(_) => WAITING_FOR_K1,
            Self::WaitingForK2(_) => WAITING_FOR_K2,
            Self::WaitForFirstAck(_) => WAIT_FOR_FIRST_ACK,
            Self::WaitForSecondAck(_) => WAIT_FOR_SECOND_ACK,
            Self::ChannelConfirmed => CHANNEL_CONFIRMED,
            Self::Cancelled => CANCELLED,
        }
    }

    fn encode_payload(&self) -> Encoded {
        match self {
            Self::WaitingForK1(state) => state.encode(),
            Self::WaitingForK2(state) => state.encode(),
            Self::WaitForFirstAck(state) | Self::WaitForSecondAck(state) => state.encode(),
            Self::Initial | Self::PingSent | Self::ChannelConfirmed | Self::Cancelled => {
                Encoded::List(Vec::new())
            }
        }
    }

    fn decode(id: StateId, payload: &Encoded) -> Result<Self, DecodeError> {
        let empty = |state: Self| payload.as_list_of(0).map(|_| state);
        match id {
            INITIAL => empty(Self::Initial),
            PING_SENT => empty(Self::PingSent),
            WAITING_FOR_K1 => Ok(Self::WaitingForK1(WaitingForK1::decode(payload)?)),
            WAITING_FOR_K2 => Ok(Self::WaitingForK2(WaitingForK2::decode(payload)?)),
            WAIT_FOR_FIRST_ACK => Ok(Self::WaitForFirstAck(WaitForAck::decode(payload)?)),
            WAIT_FOR_SECOND_ACK => Ok(Self::WaitForSecondAck(WaitForAck::decode(payload)?)),
            CHANNEL_CONFIRMED => empty(Self::ChannelConfirmed),
            CANCELLED => empty(Self::Cancelled),
            other => Err(DecodeError::UnknownVariant(u64::from(other))),
        }
    }
}

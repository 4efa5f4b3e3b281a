use crate::codec::{Decode, DecodeError, Encode, Encoded, encoded_struct};
use crate::crypto::Seed;
use crate::engine::{ProtocolState, StateId};
use crate::{Identity, Uid};

pub const INITIAL: StateId = 0;
pub const WAITING_FOR_SEED: StateId = 1;
pub const WAITING_FOR_CONFIRMATION: StateId = 2;
pub const WAITING_FOR_DECOMMITMENT: StateId = 3;
pub const WAITING_FOR_USER_SAS: StateId = 4;
pub const SAS_CHECKED: StateId = 5;
pub const MUTUAL_TRUST_CONFIRMED: StateId = 6;
pub const CANCELLED: StateId = 7;

encoded_struct! {
    /// Inviter side: the commitment is out, the invitee's seed is awaited.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct WaitingForSeed {
        pub contact_identity: Identity,
        pub decommitment: Vec<u8>,
        pub seed: Seed,
        pub dialog_uuid: Uid,
    }
}

encoded_struct! {
    /// Invitee side: the inviter's commitment and published data.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct InviteReceived {
        pub contact_identity: Identity,
        pub contact_details: Vec<u8>,
        pub contact_devices: Vec<Uid>,
        pub commitment: Vec<u8>,
        pub dialog_uuid: Uid,
    }
}

encoded_struct! {
    /// Both seeds are known. The SAS is recomputed from them whenever needed.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct WaitingForUserSas {
        pub contact_identity: Identity,
        pub contact_details: Vec<u8>,
        pub contact_devices: Vec<Uid>,
        pub own_seed: Seed,
        pub contact_seed: Seed,
        pub dialog_uuid: Uid,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SasChecked {
        pub contact_identity: Identity,
        pub contact_devices: Vec<Uid>,
        pub dialog_uuid: Uid,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Initial,
    WaitingForSeed(WaitingForSeed),
    WaitingForConfirmation(InviteReceived),
    WaitingForDecommitment(InviteReceived),
    WaitingForUserSas(WaitingForUserSas),
    SasChecked(SasChecked),
    MutualTrustConfirmed,
    Cancelled,
}

impl State {
    /// The dialog shown for this instance, if any.
    pub fn dialog_uuid(&self) -> Option<Uid> {
        match self {
            Self::WaitingForSeed(state) => Some(state.dialog_uuid),
            Self::WaitingForConfirmation(state) | Self::WaitingForDecommitment(state) => {
                Some(state.dialog_uuid)
            }
            Self::WaitingForUserSas(state) => Some(state.dialog_uuid),
            Self::SasChecked(state) => Some(state.dialog_uuid),
            Self::Initial | Self::MutualTrustConfirmed | Self::Cancelled => None,
        }
    }
}

impl ProtocolState for State {
    const ALL: &'static [StateId] = &[
        INITIAL,
        WAITING_FOR_SEED,
        WAITING_FOR_CONFIRMATION,
        WAITING_FOR_DECOMMITMENT,
        WAITING_FOR_USER_SAS,
        SAS_CHECKED,
        MUTUAL_TRUST_CONFIRMED,
        CANCELLED,
    ];

    fn initial() -> Self {
        Self::Initial
    }

    fn id(&self) -> StateId {
        match self {
            Self::Initial => INITIAL,
            Self::WaitingForSeed(_) => WAITING_FOR_SEED,
            Self::WaitingForConfirmation(_) => WAITING_FOR_CONFIRMATION,
            Self::WaitingForDecommitment(_) => WAITING_FOR_DECOMMITMENT,
            Self::WaitingForUserSas(_) => WAITING_FOR_USER_SAS,
            Self::SasChecked(_) => SAS_CHECKED,
            Self::MutualTrustConfirmed => MUTUAL_TRUST_CONFIRMED,
            Self::Cancelled => CANCELLED,
        }
    }

    fn encode_payload(&self) -> Encoded {
        match self {
            Self::WaitingForSeed(state) => state.encode(),
            Self::WaitingForConfirmation(state) | Self::WaitingForDecommitment(state) => {
                state.encode()
            }
            Self::WaitingForUserSas(state) => state.encode(),
            Self::SasChecked(state) => state.encode(),
            Self::Initial | Self::MutualTrustConfirmed | Self::Cancelled => {
                Encoded::List(Vec::new())
            }
        }
    }

    fn decode(id: StateId, payload: &Encoded) -> Result<Self, DecodeError> {
        let empty = |state: Self| payload.as_list_of(0).map(|_| state);
        match id {
            INITIAL => empty(Self::Initial),
            WAITING_FOR_SEED => Ok(Self::WaitingForSeed(WaitingForSeed::decode(payload)?)),
            WAITING_FOR_CONFIRMATION => Ok(Self::WaitingForConfirmation(InviteReceived::decode(
                payload,
            )?)),
            WAITING_FOR_DECOMMITMENT => Ok(Self::WaitingForDecommitment(InviteReceived::decode(
                payload,
            )?)),
            WAITING_FOR_USER_SAS => Ok(Self::WaitingForUserSas(WaitingForUserSas::decode(
                payload,
            )?)),
            SAS_CHECKED => Ok(Self::SasChecked(SasChecked::decode(payload)?)),
            MUTUAL_TRUST_CONFIRMED => empty(Self::MutualTrustConfirmed),
            CANCELLED => empty(Self::Cancelled),
            other => Err(DecodeError::UnknownVariant(u64::from(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdentityKey, Prng};

    #[test]
    fn test_user_sas_state_survives_a_restart() {
        let prng = Prng::from_seed([101; 32]);
        let state = State::WaitingForUserSas(WaitingForUserSas {
            contact_identity: IdentityKey::new(&prng).unwrap().identity(),
            contact_details: b"{\"name\":\"Bob\"}".to_vec(),
            contact_devices: vec![Uid::random(&prng).unwrap(), Uid::random(&prng).unwrap()],
            own_seed: Seed::random(&prng).unwrap(),
            contact_seed: Seed::random(&prng).unwrap(),
            dialog_uuid: Uid::random(&prng).unwrap(),
        });

        let bytes = state.encode_payload().to_bytes();
        let payload = Encoded::from_bytes(&bytes).unwrap();
        assert_eq!(State::decode(state.id(), &payload).unwrap(), state);
    }

    #[test]
    fn test_payload_must_match_the_tag() {
        let prng = Prng::from_seed([102; 32]);
        let checked = State::SasChecked(SasChecked {
            contact_identity: IdentityKey::new(&prng).unwrap().identity(),
            contact_devices: vec![Uid::random(&prng).unwrap()],
            dialog_uuid: Uid::random(&prng).unwrap(),
        });

        assert!(matches!(
            State::decode(WAITING_FOR_SEED, &checked.encode_payload()),
            Err(DecodeError::Arity {
                expected: 4,
                found: 3
            })
        ));
        assert!(State::decode(INITIAL, &checked.encode_payload()).is_err());
    }
}

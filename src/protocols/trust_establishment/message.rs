use crate::codec::{Decode, DecodeError, Encode, Encoded, encoded_struct};
use crate::crypto::Seed;
use crate::engine::{MessageId, MessageSet};
use crate::{Identity, Uid};

pub const INITIAL: MessageId = 0;
pub const COMMITMENT: MessageId = 1;
pub const PROPAGATE_INVITE: MessageId = 2;
pub const PROPAGATE_COMMITMENT: MessageId = 3;
pub const INVITE_RESPONSE: MessageId = 4;
pub const PROPAGATE_RESPONSE: MessageId = 5;
pub const SEED: MessageId = 6;
pub const DECOMMITMENT: MessageId = 7;
pub const SAS_ENTERED: MessageId = 8;
pub const PROPAGATE_SAS: MessageId = 9;
pub const MUTUAL_TRUST_CONFIRMATION: MessageId = 10;
pub const ABORT: MessageId = 11;

encoded_struct! {
    /// Local request to invite a contact.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Invite {
        pub contact_identity: Identity,
        pub display_name: String,
    }
}

encoded_struct! {
    /// The inviter's published data and commitment. Also relayed by an invitee to its siblings.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Commitment {
        pub identity: Identity,
        pub details: Vec<u8>,
        pub devices: Vec<Uid>,
        pub commitment: Vec<u8>,
    }
}

encoded_struct! {
    /// An inviter's own invitation, handed to its sibling devices.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct PropagatedInvite {
        pub contact_identity: Identity,
        pub display_name: String,
        pub decommitment: Vec<u8>,
        pub seed: Seed,
    }
}

encoded_struct! {
    /// The user's answer to an invitation dialog.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct InviteResponse {
        pub dialog_uuid: Uid,
        pub accepted: bool,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct PropagatedResponse {
        pub accepted: bool,
    }
}

encoded_struct! {
    /// The invitee's seed and published data.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct InviteeSeed {
        pub identity: Identity,
        pub details: Vec<u8>,
        pub devices: Vec<Uid>,
        pub seed: Seed,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Decommitment {
        pub decommitment: Vec<u8>,
    }
}

encoded_struct! {
    /// The digits the user typed in after reading them off the contact's screen.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SasEntered {
        pub dialog_uuid: Uid,
        pub sas: String,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct PropagatedSas {
        pub sas: String,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct MutualTrustConfirmation {
        pub identity: Identity,
    }
}

encoded_struct! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Abort {
        pub dialog_uuid: Uid,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Initial(Invite),
    Commitment(Commitment),
    PropagateInvite(PropagatedInvite),
    PropagateCommitment(Commitment),
    InviteResponse(InviteResponse),
    PropagateResponse(PropagatedResponse),
    Seed(InviteeSeed),
    Decommitment(Decommitment),
    SasEntered(SasEntered),
    PropagateSas(PropagatedSas),
    MutualTrustConfirmation(MutualTrustConfirmation),
    Abort(Abort),
}

impl MessageSet for Message {
    const ALL: &'static [MessageId] = &[
        INITIAL,
        COMMITMENT,
        PROPAGATE_INVITE,
        PROPAGATE_COMMITMENT,
        INVITE_RESPONSE,
        PROPAGATE_RESPONSE,
        SEED,
        DECOMMITMENT,
        SAS_ENTERED,
        PROPAGATE_SAS,
        MUTUAL_TRUST_CONFIRMATION,
        ABORT,
    ];

    fn id(&self) -> MessageId {
        match self {
            Self::Initial(_) => INITIAL,
            Self::Commitment(_) => COMMITMENT,
            Self::PropagateInvite(_) => PROPAGATE_INVITE,
            Self::PropagateCommitment(_) => PROPAGATE_COMMITMENT,
            Self::InviteResponse(_) => INVITE_RESPONSE,
            Self::PropagateResponse(_) => PROPAGATE_RESPONSE,
            Self::Seed(_) => SEED,
            Self::Decommitment(_) => DECOMMITMENT,
            Self::SasEntered(_) => SAS_ENTERED,
            Self::PropagateSas(_) => PROPAGATE_SAS,
            Self::MutualTrustConfirmation(_) => MUTUAL_TRUST_CONFIRMATION,
            Self::Abort(_) => ABORT,
        }
    }

    fn encode_inputs(&self) -> Encoded {
        match self {
            Self::Initial(inputs) => inputs.encode(),
            Self::Commitment(inputs) | Self::PropagateCommitment(inputs) => inputs.encode(),
            Self::PropagateInvite(inputs) => inputs.encode(),
            Self::InviteResponse(inputs) => inputs.encode(),
            Self::PropagateResponse(inputs) => inputs.encode(),
            Self::Seed(inputs) => inputs.encode(),
            Self::Decommitment(inputs) => inputs.encode(),
            Self::SasEntered(inputs) => inputs.encode(),
            Self::PropagateSas(inputs) => inputs.encode(),
            Self::MutualTrustConfirmation(inputs) => inputs.encode(),
            Self::Abort(inputs) => inputs.encode(),
        }
    }

    fn decode(id: MessageId, inputs: &Encoded) -> Result<Self, DecodeError> {
        Ok(match id {
            INITIAL => Self::Initial(Invite::decode(inputs)?),
            COMMITMENT => Self::Commitment(Commitment::decode(inputs)?),
            PROPAGATE_INVITE => Self::PropagateInvite(PropagatedInvite::decode(inputs)?),
            PROPAGATE_COMMITMENT => Self::PropagateCommitment(Commitment::decode(inputs)?),
            INVITE_RESPONSE => Self::InviteResponse(InviteResponse::decode(inputs)?),
            PROPAGATE_RESPONSE => Self::PropagateResponse(PropagatedResponse::decode(inputs)?),
            SEED => Self::Seed(InviteeSeed::decode(inputs)?),
            DECOMMITMENT => Self::Decommitment(Decommitment::decode(inputs)?),
            SAS_ENTERED => Self::SasEntered(SasEntered::decode(inputs)?),
            PROPAGATE_SAS => Self::PropagateSas(PropagatedSas::decode(inputs)?),
            MUTUAL_TRUST_CONFIRMATION => {
                Self::MutualTrustConfirmation(MutualTrustConfirmation::decode(inputs)?)
            }
            ABORT => Self::Abort(Abort::decode(inputs)?),
            other => return Err(DecodeError::UnknownVariant(u64::from(other))),
        })
    }
}

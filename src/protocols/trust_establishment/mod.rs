//! SAS-based mutual trust between two identities.
//!
//! The inviter commits to a random seed and broadcasts the commitment. Once the invitee accepts,
//! it answers with its own seed, derived deterministically from the commitment so every device of
//! the invitee derives the same one. The inviter then opens its commitment and both sides show a
//! short authentication string computed from the two seeds. Each user types the digits shown on
//! the other side; a match adds the contact. Other devices of either identity follow along over
//! their confirmed channels.
pub mod message;
pub mod state;
mod steps;

use crate::engine::{
    ChannelPredicate, Dialog, MessageId, MessageSet, Outcome, Protocol, ProtocolId,
    ProtocolMessage, ReceptionChannelInfo, StateId, Step,
};
use crate::store::{IdentityStore, InstanceStore, ReplayLedger};
use crate::{Engine, Error, Identity, Uid};

use message::{Abort, Invite, InviteResponse, Message, SasEntered};
use state::State;

pub struct TrustEstablishment;

const ABORT_STEP: Step<TrustEstablishment> = Step {
    name: "abort",
    message: message::ABORT,
    reception: ChannelPredicate::Local,
    run: steps::abort,
};

const fn too_early(message: MessageId, reception: ChannelPredicate) -> Step<TrustEstablishment> {
    Step {
        name: "too-early",
        message,
        reception,
        run: steps::too_early,
    }
}

const INITIAL_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "send-invite",
        message: message::INITIAL,
        reception: ChannelPredicate::Local,
        run: steps::send_invite,
    },
    Step {
        name: "commitment-received",
        message: message::COMMITMENT,
        reception: ChannelPredicate::AnyAsymmetric,
        run: steps::commitment_received,
    },
    Step {
        name: "invite-propagated",
        message: message::PROPAGATE_INVITE,
        reception: ChannelPredicate::OwnedDeviceChannel,
        run: steps::invite_propagated,
    },
    Step {
        name: "commitment-propagated",
        message: message::PROPAGATE_COMMITMENT,
        reception: ChannelPredicate::OwnedDeviceChannel,
        run: steps::commitment_propagated,
    },
    // A sibling's invitation may still be on its way.
    too_early(message::SEED, ChannelPredicate::AuthenticatedSender),
];

const WAITING_FOR_SEED_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "seed-received",
        message: message::SEED,
        reception: ChannelPredicate::AuthenticatedSender,
        run: steps::seed_received,
    },
    too_early(message::PROPAGATE_SAS, ChannelPredicate::OwnedDeviceChannel),
    too_early(message::MUTUAL_TRUST_CONFIRMATION, ChannelPredicate::AuthenticatedSender),
    ABORT_STEP,
];

const WAITING_FOR_CONFIRMATION_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "invite-response",
        message: message::INVITE_RESPONSE,
        reception: ChannelPredicate::Local,
        run: steps::invite_response,
    },
    Step {
        name: "response-propagated",
        message: message::PROPAGATE_RESPONSE,
        reception: ChannelPredicate::OwnedDeviceChannel,
        run: steps::response_propagated,
    },
    // A sibling accepted and the inviter already answered.
    too_early(message::DECOMMITMENT, ChannelPredicate::AnyAsymmetric),
    too_early(message::PROPAGATE_SAS, ChannelPredicate::OwnedDeviceChannel),
    too_early(message::MUTUAL_TRUST_CONFIRMATION, ChannelPredicate::AuthenticatedSender),
    ABORT_STEP,
];

const WAITING_FOR_DECOMMITMENT_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "decommitment-received",
        message: message::DECOMMITMENT,
        reception: ChannelPredicate::AnyAsymmetric,
        run: steps::decommitment_received,
    },
    too_early(message::PROPAGATE_SAS, ChannelPredicate::OwnedDeviceChannel),
    too_early(message::MUTUAL_TRUST_CONFIRMATION, ChannelPredicate::AuthenticatedSender),
    ABORT_STEP,
];

const WAITING_FOR_USER_SAS_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "sas-entered",
        message: message::SAS_ENTERED,
        reception: ChannelPredicate::Local,
        run: steps::sas_entered,
    },
    Step {
        name: "sas-propagated",
        message: message::PROPAGATE_SAS,
        reception: ChannelPredicate::OwnedDeviceChannel,
        run: steps::sas_propagated,
    },
    too_early(message::MUTUAL_TRUST_CONFIRMATION, ChannelPredicate::AuthenticatedSender),
    ABORT_STEP,
];

const SAS_CHECKED_STEPS: &[Step<TrustEstablishment>] = &[
    Step {
        name: "confirmation-received",
        message: message::MUTUAL_TRUST_CONFIRMATION,
        reception: ChannelPredicate::AuthenticatedSender,
        run: steps::confirmation_received,
    },
    ABORT_STEP,
];

impl Protocol for TrustEstablishment {
    const ID: ProtocolId = ProtocolId::TrustEstablishment;
    const FINAL_STATES: &'static [StateId] = &[state::MUTUAL_TRUST_CONFIRMED, state::CANCELLED];
    const CANCELLED: StateId = state::CANCELLED;

    type State = State;
    type Message = Message;

    fn steps(state: StateId) -> &'static [Step<Self>] {
        match state {
            state::INITIAL => INITIAL_STEPS,
            state::WAITING_FOR_SEED => WAITING_FOR_SEED_STEPS,
            state::WAITING_FOR_CONFIRMATION => WAITING_FOR_CONFIRMATION_STEPS,
            state::WAITING_FOR_DECOMMITMENT => WAITING_FOR_DECOMMITMENT_STEPS,
            state::WAITING_FOR_USER_SAS => WAITING_FOR_USER_SAS_STEPS,
            state::SAS_CHECKED => SAS_CHECKED_STEPS,
            _ => &[],
        }
    }
}

impl<S, I, L> Engine<S, I, L>
where
    S: IdentityStore,
    I: InstanceStore,
    L: ReplayLedger,
{
    /// Invites `contact_identity` to establish mutual trust. `display_name` is only shown
    /// locally.
    pub fn start_trust_establishment(
        &mut self,
        contact_identity: Identity,
        display_name: &str,
    ) -> Result<Outcome, Error> {
        let instance_uid = Uid::random(self.prng())?;
        self.post_trust_input(
            instance_uid,
            Message::Initial(Invite {
                contact_identity,
                display_name: display_name.to_string(),
            }),
        )
    }

    /// Answers an `AcceptInvite` dialog.
    pub fn respond_to_invite(&mut self, dialog: &Dialog, accepted: bool) -> Result<Outcome, Error> {
        self.post_trust_input(
            dialog.instance_uid,
            Message::InviteResponse(InviteResponse {
                dialog_uuid: dialog.uuid,
                accepted,
            }),
        )
    }

    /// Submits the digits the contact's device displays in its `SasExchange` dialog.
    pub fn enter_sas(&mut self, dialog: &Dialog, sas: &str) -> Result<Outcome, Error> {
        self.post_trust_input(
            dialog.instance_uid,
            Message::SasEntered(SasEntered {
                dialog_uuid: dialog.uuid,
                sas: sas.to_string(),
            }),
        )
    }

    /// Closes a trust establishment dialog and cancels its instance.
    pub fn abort_trust_establishment(&mut self, dialog: &Dialog) -> Result<Outcome, Error> {
        self.post_trust_input(
            dialog.instance_uid,
            Message::Abort(Abort {
                dialog_uuid: dialog.uuid,
            }),
        )
    }

    fn post_trust_input(&mut self, instance_uid: Uid, input: Message) -> Result<Outcome, Error> {
        let message = ProtocolMessage {
            protocol: ProtocolId::TrustEstablishment,
            instance_uid,
            message_id: input.id(),
            inputs: input.encode_inputs(),
        };
        self.handle_message(&message, &ReceptionChannelInfo::Local)
    }
}

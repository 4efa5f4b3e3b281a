use tracing::{info, warn};

use super::message::{
    Abort, Commitment, Decommitment, Invite, InviteResponse, InviteeSeed, Message,
    MutualTrustConfirmation, PropagatedInvite, PropagatedResponse, PropagatedSas, SasEntered,
};
use super::state::{InviteReceived, SasChecked, State, WaitingForSeed, WaitingForUserSas};
use crate::crypto::{SasPair, Seed, SeedContext, commit, compute_sas, open};
use crate::engine::{
    DeliveryKind, Destination, DialogKind, Notification, PeerKey, StepContext, Transition,
};
use crate::store::TrustOrigin;
use crate::{Error, Identity, Uid};

type StepResult = Result<Transition<State>, Error>;

/// Posts `message` to the other devices of the owned identity, if there are any.
fn propagate(ctx: &mut StepContext<'_>, message: Message) -> Result<(), Error> {
    if ctx.other_owned_device_uids()?.is_empty() {
        return Ok(());
    }
    let owned = *ctx.owned_identity();
    ctx.post(&message, Destination::AllConfirmedChannels { identity: owned });
    Ok(())
}

fn to_devices(identity: Identity, devices: &[Uid], kind: DeliveryKind) -> Destination {
    Destination::Devices {
        identity,
        devices: devices.to_vec(),
        kind,
    }
}

/// Whether the transport authenticated the sender as one of `devices` of `contact`.
fn sent_by(ctx: &StepContext<'_>, contact: &Identity, devices: &[Uid]) -> bool {
    ctx.reception()
        .remote()
        .is_some_and(|(identity, device)| identity == contact && devices.contains(device))
}

/// Makes this instance the only one negotiating with `contact`. Older instances are aborted
/// and their dialogs closed.
fn claim_contact(ctx: &mut StepContext<'_>, contact: Identity) -> Result<(), Error> {
    let peer = PeerKey {
        identity: contact,
        device: None,
    };
    for instance_uid in ctx.conflicting_instances(&peer)? {
        if let Some(dialog_uuid) = ctx
            .instance_state::<State>(&instance_uid)?
            .and_then(|state| state.dialog_uuid())
        {
            ctx.delete_dialog(dialog_uuid);
        }
        info!(contact = %contact, instance = %instance_uid, "superseding trust establishment");
        ctx.abort_instance(instance_uid);
    }
    ctx.claim_peer(peer);
    Ok(())
}

fn sas_pair(ctx: &StepContext<'_>, state: &WaitingForUserSas) -> Result<SasPair, Error> {
    compute_sas(
        ctx.owned_identity(),
        &state.own_seed,
        &state.contact_identity,
        &state.contact_seed,
        ctx.config().sas_digits,
        &ctx.config().protocol_info,
    )
}

fn invitee_seed(ctx: &StepContext<'_>, commitment: &[u8]) -> Result<Seed, Error> {
    ctx.keys().deterministic_seed(SeedContext::Sas, commitment)
}

fn show_sas(ctx: &mut StepContext<'_>, state: &WaitingForUserSas) -> Result<(), Error> {
    let own_sas = sas_pair(ctx, state)?.own;
    ctx.show_dialog(
        state.dialog_uuid,
        DialogKind::SasExchange {
            contact: state.contact_identity,
            own_sas,
        },
    );
    Ok(())
}

/// Records trust in the contact and its devices. Adding an existing contact only adds a trust
/// origin.
fn trust_contact(ctx: &mut StepContext<'_>, state: &WaitingForUserSas) -> Result<(), Error> {
    let contact = state.contact_identity;
    if ctx.is_contact(&contact)? {
        ctx.add_trust_origin(contact, TrustOrigin::Sas);
    } else {
        ctx.add_contact(contact, state.contact_details.clone(), TrustOrigin::Sas);
    }
    for device in &state.contact_devices {
        ctx.add_device(contact, *device);
    }
    ctx.notify(Notification::ContactAdded { contact });
    Ok(())
}

fn sas_checked(ctx: &mut StepContext<'_>, state: WaitingForUserSas) -> StepResult {
    ctx.show_dialog(
        state.dialog_uuid,
        DialogKind::SasConfirmed {
            contact: state.contact_identity,
        },
    );
    Ok(Transition::Next(State::SasChecked(SasChecked {
        contact_identity: state.contact_identity,
        contact_devices: state.contact_devices,
        dialog_uuid: state.dialog_uuid,
    })))
}

fn cancel(ctx: &mut StepContext<'_>, dialog_uuid: Uid) -> StepResult {
    ctx.delete_dialog(dialog_uuid);
    Ok(Transition::Next(State::Cancelled))
}

/// Local invitation: commit to a fresh seed and send the commitment to every device of the
/// contact.
pub(super) fn send_invite(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::Initial, Message::Initial(Invite {
        contact_identity,
        display_name,
    })) = (state, message)
    else {
        return Ok(Transition::Reject);
    };
    if contact_identity == *ctx.owned_identity() {
        warn!("refusing to invite the owned identity");
        return Ok(Transition::Next(State::Cancelled));
    }
    claim_contact(ctx, contact_identity)?;

    let seed = Seed::random(ctx.prng())?;
    let (commitment, decommitment) = commit(ctx.owned_identity().as_bytes(), &seed, ctx.prng())?;
    let dialog_uuid = Uid::random(ctx.prng())?;

    ctx.show_dialog(
        dialog_uuid,
        DialogKind::InviteSent {
            contact: contact_identity,
            display_name: display_name.clone(),
        },
    );
    propagate(
        ctx,
        Message::PropagateInvite(PropagatedInvite {
            contact_identity,
            display_name,
            decommitment: decommitment.clone(),
            seed: seed.clone(),
        }),
    )?;
    let commitment = Commitment {
        identity: *ctx.owned_identity(),
        details: ctx.owned_details()?,
        devices: ctx.owned_device_uids()?,
        commitment,
    };
    ctx.post(
        &Message::Commitment(commitment),
        Destination::Broadcast {
            identity: contact_identity,
        },
    );

    Ok(Transition::Next(State::WaitingForSeed(WaitingForSeed {
        contact_identity,
        decommitment,
        seed,
        dialog_uuid,
    })))
}

/// A sibling device sent an invitation. Mirror it so this device can show the SAS too.
pub(super) fn invite_propagated(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::Initial, Message::PropagateInvite(invite)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    claim_contact(ctx, invite.contact_identity)?;

    let dialog_uuid = Uid::random(ctx.prng())?;
    ctx.show_dialog(
        dialog_uuid,
        DialogKind::InviteSent {
            contact: invite.contact_identity,
            display_name: invite.display_name,
        },
    );
    Ok(Transition::Next(State::WaitingForSeed(WaitingForSeed {
        contact_identity: invite.contact_identity,
        decommitment: invite.decommitment,
        seed: invite.seed,
        dialog_uuid,
    })))
}

fn receive_commitment(
    ctx: &mut StepContext<'_>,
    commitment: Commitment,
    relay: bool,
) -> StepResult {
    if commitment.identity == *ctx.owned_identity() {
        return Ok(Transition::Reject);
    }
    if ctx.is_replayed(&commitment.commitment)? {
        warn!(contact = %commitment.identity, "replayed invitation commitment");
        return Ok(Transition::Reject);
    }
    ctx.record_token(&commitment.commitment);
    claim_contact(ctx, commitment.identity)?;

    let dialog_uuid = Uid::random(ctx.prng())?;
    ctx.show_dialog(
        dialog_uuid,
        DialogKind::AcceptInvite {
            contact: commitment.identity,
            details: commitment.details.clone(),
        },
    );
    if relay {
        propagate(ctx, Message::PropagateCommitment(commitment.clone()))?;
    }

    Ok(Transition::Next(State::WaitingForConfirmation(
        InviteReceived {
            contact_identity: commitment.identity,
            contact_details: commitment.details,
            contact_devices: commitment.devices,
            commitment: commitment.commitment,
            dialog_uuid,
        },
    )))
}

/// An invitation arrived: ask the user.
pub(super) fn commitment_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::Initial, Message::Commitment(commitment)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    receive_commitment(ctx, commitment, true)
}

pub(super) fn commitment_propagated(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::Initial, Message::PropagateCommitment(commitment)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    receive_commitment(ctx, commitment, false)
}

fn apply_response(
    ctx: &mut StepContext<'_>,
    state: InviteReceived,
    accepted: bool,
) -> StepResult {
    if !accepted {
        info!(contact = %state.contact_identity, "invitation rejected");
        return cancel(ctx, state.dialog_uuid);
    }
    ctx.show_dialog(
        state.dialog_uuid,
        DialogKind::InviteAccepted {
            contact: state.contact_identity,
        },
    );
    Ok(Transition::Next(State::WaitingForDecommitment(state)))
}

/// The user answered the invitation. On acceptance, send our seed to the inviter's devices.
pub(super) fn invite_response(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (
        State::WaitingForConfirmation(state),
        Message::InviteResponse(InviteResponse {
            dialog_uuid,
            accepted,
        }),
    ) = (state, message)
    else {
        return Ok(Transition::Reject);
    };
    if dialog_uuid != state.dialog_uuid {
        return Ok(Transition::Reject);
    }

    propagate(
        ctx,
        Message::PropagateResponse(PropagatedResponse { accepted }),
    )?;
    if accepted {
        let seed = InviteeSeed {
            identity: *ctx.owned_identity(),
            details: ctx.owned_details()?,
            devices: ctx.owned_device_uids()?,
            seed: invitee_seed(ctx, &state.commitment)?,
        };
        ctx.post(
            &Message::Seed(seed),
            to_devices(
                state.contact_identity,
                &state.contact_devices,
                DeliveryKind::AuthenticatedAsymmetric,
            ),
        );
    }
    apply_response(ctx, state, accepted)
}

/// A sibling device answered the invitation.
pub(super) fn response_propagated(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (
        State::WaitingForConfirmation(state),
        Message::PropagateResponse(PropagatedResponse { accepted }),
    ) = (state, message)
    else {
        return Ok(Transition::Reject);
    };
    apply_response(ctx, state, accepted)
}

/// Inviter: the invitee's seed arrived. Reveal our seed and show the SAS.
pub(super) fn seed_received(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::WaitingForSeed(state), Message::Seed(seed)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    if seed.identity != state.contact_identity
        || !sent_by(ctx, &state.contact_identity, &seed.devices)
    {
        warn!(contact = %state.contact_identity, "seed not sent by a device of the contact");
        return Ok(Transition::Reject);
    }

    ctx.post(
        &Message::Decommitment(Decommitment {
            decommitment: state.decommitment,
        }),
        to_devices(state.contact_identity, &seed.devices, DeliveryKind::Asymmetric),
    );
    let next = WaitingForUserSas {
        contact_identity: state.contact_identity,
        contact_details: seed.details,
        contact_devices: seed.devices,
        own_seed: state.seed,
        contact_seed: seed.seed,
        dialog_uuid: state.dialog_uuid,
    };
    show_sas(ctx, &next)?;
    Ok(Transition::Next(State::WaitingForUserSas(next)))
}

/// Invitee: open the inviter's commitment and show the SAS.
pub(super) fn decommitment_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::WaitingForDecommitment(state), Message::Decommitment(decommitment)) =
        (state, message)
    else {
        return Ok(Transition::Reject);
    };

    let contact_seed = match open(
        state.contact_identity.as_bytes(),
        &state.commitment,
        &decommitment.decommitment,
    ) {
        Ok(seed) => seed,
        Err(err) => {
            warn!(contact = %state.contact_identity, "cancelling trust establishment: {err}");
            return cancel(ctx, state.dialog_uuid);
        }
    };

    let next = WaitingForUserSas {
        own_seed: invitee_seed(ctx, &state.commitment)?,
        contact_seed,
        contact_identity: state.contact_identity,
        contact_details: state.contact_details,
        contact_devices: state.contact_devices,
        dialog_uuid: state.dialog_uuid,
    };
    show_sas(ctx, &next)?;
    Ok(Transition::Next(State::WaitingForUserSas(next)))
}

/// The user typed the contact's half of the SAS.
pub(super) fn sas_entered(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (
        State::WaitingForUserSas(state),
        Message::SasEntered(SasEntered {
            dialog_uuid,
            sas: entered,
        }),
    ) = (state, message)
    else {
        return Ok(Transition::Reject);
    };
    if dialog_uuid != state.dialog_uuid {
        return Ok(Transition::Reject);
    }

    let entered = entered.trim().to_string();
    if entered != sas_pair(ctx, &state)?.contact {
        warn!(contact = %state.contact_identity, "entered SAS does not match");
        show_sas(ctx, &state)?;
        return Ok(Transition::Next(State::WaitingForUserSas(state)));
    }

    trust_contact(ctx, &state)?;
    propagate(ctx, Message::PropagateSas(PropagatedSas { sas: entered }))?;
    let confirmation = MutualTrustConfirmation {
        identity: *ctx.owned_identity(),
    };
    ctx.post(
        &Message::MutualTrustConfirmation(confirmation),
        to_devices(
            state.contact_identity,
            &state.contact_devices,
            DeliveryKind::AuthenticatedAsymmetric,
        ),
    );
    sas_checked(ctx, state)
}

/// A sibling device checked the SAS. Check it again here: a mismatch means the devices do not
/// agree on the transcript.
pub(super) fn sas_propagated(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (
        State::WaitingForUserSas(state),
        Message::PropagateSas(PropagatedSas { sas: entered }),
    ) = (state, message)
    else {
        return Ok(Transition::Reject);
    };

    if entered != sas_pair(ctx, &state)?.contact {
        warn!(contact = %state.contact_identity, "SAS propagated by a sibling device does not match");
        return cancel(ctx, state.dialog_uuid);
    }

    trust_contact(ctx, &state)?;
    sas_checked(ctx, state)
}

/// The contact checked the SAS on its side as well.
pub(super) fn confirmation_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::SasChecked(state), Message::MutualTrustConfirmation(confirmation)) =
        (state, message)
    else {
        return Ok(Transition::Reject);
    };
    if confirmation.identity != state.contact_identity
        || !sent_by(ctx, &state.contact_identity, &state.contact_devices)
    {
        warn!(contact = %state.contact_identity, "confirmation not sent by a device of the contact");
        return Ok(Transition::Reject);
    }

    ctx.show_dialog(
        state.dialog_uuid,
        DialogKind::MutualTrustConfirmed {
            contact: state.contact_identity,
        },
    );
    info!(contact = %state.contact_identity, "mutual trust confirmed");
    Ok(Transition::Next(State::MutualTrustConfirmed))
}

/// The user closed the dialog.
pub(super) fn abort(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let Message::Abort(Abort { dialog_uuid }) = message else {
        return Ok(Transition::Reject);
    };
    if state.dialog_uuid() != Some(dialog_uuid) {
        return Ok(Transition::Reject);
    }
    info!("trust establishment aborted by the user");
    cancel(ctx, dialog_uuid)
}

/// The message belongs to a later state. Keep it for redelivery.
pub(super) fn too_early(_: &mut StepContext<'_>, _: State, _: Message) -> StepResult {
    Ok(Transition::Retry)
}

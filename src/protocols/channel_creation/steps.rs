use std::cmp::Ordering;

use tracing::{info, warn};

use super::message::{Ack, EphemeralKey, FollowerKey, LeaderKey, Message, Ping, Start};
use super::state::{State, WaitForAck, WaitingForK1, WaitingForK2};
use crate::crypto::{Seed, SignatureContext, decapsulate, encapsulate, generate_kem_key_pair};
use crate::engine::{DeliveryKind, Destination, Notification, PeerKey, StepContext, Transition};
use crate::{Error, Identity, Uid};

type StepResult = Result<Transition<State>, Error>;

/// Whether the local side drives the key agreement. Device UIDs are compared first and
/// identities break ties. The larger side leads.
pub fn should_lead(
    own_identity: &Identity,
    own_device: &Uid,
    contact_identity: &Identity,
    contact_device: &Uid,
) -> bool {
    match own_device.cmp(contact_device) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => own_identity > contact_identity,
    }
}

fn signed_fields<'a>(
    from_device: &'a Uid,
    to_device: &'a Uid,
    from_identity: &'a Identity,
    to_identity: &'a Identity,
) -> [&'a [u8]; 4] {
    [
        from_device.as_bytes(),
        to_device.as_bytes(),
        from_identity.as_bytes(),
        to_identity.as_bytes(),
    ]
}

fn sign_for(ctx: &StepContext<'_>, contact_identity: &Identity, contact_device: &Uid) -> Result<Vec<u8>, Error> {
    let fields = signed_fields(
        ctx.device_uid(),
        contact_device,
        ctx.owned_identity(),
        contact_identity,
    );
    ctx.keys()
        .sign(SignatureContext::ChannelCreation, &fields, ctx.prng())
}

fn verify_from(
    ctx: &StepContext<'_>,
    contact_identity: &Identity,
    contact_device: &Uid,
    signature: &[u8],
) -> bool {
    let fields = signed_fields(
        contact_device,
        ctx.device_uid(),
        contact_identity,
        ctx.owned_identity(),
    );
    contact_identity
        .verify(SignatureContext::ChannelCreation, &fields, signature)
        .is_ok()
}

/// Removes any channel with the device and aborts other instances negotiating with it.
fn clear_conflicts(
    ctx: &mut StepContext<'_>,
    contact_identity: Identity,
    contact_device: Uid,
) -> Result<PeerKey, Error> {
    let peer = PeerKey {
        identity: contact_identity,
        device: Some(contact_device),
    };
    ctx.delete_channel(contact_identity, contact_device);
    for instance_uid in ctx.conflicting_instances(&peer)? {
        ctx.abort_instance(instance_uid);
    }
    Ok(peer)
}

fn asymmetric(contact_identity: Identity, contact_device: Uid, kind: DeliveryKind) -> Destination {
    Destination::Devices {
        identity: contact_identity,
        devices: vec![contact_device],
        kind,
    }
}

fn cancel(reason: &str, contact_identity: &Identity) -> StepResult {
    warn!(contact = %contact_identity, "channel creation cancelled: {reason}");
    Ok(Transition::Next(State::Cancelled))
}

/// Checks the signed announcement of a peer: trust, signature and replay.
///
/// Returns `None` if the step should stop with the returned transition.
fn check_signed(
    ctx: &mut StepContext<'_>,
    identity: &Identity,
    device: &Uid,
    signature: &[u8],
) -> Result<Option<StepResult>, Error> {
    if !ctx.is_trusted_device(identity, device)? {
        return Ok(Some(cancel("untrusted device", identity)));
    }
    if !verify_from(ctx, identity, device, signature) {
        return Ok(Some(cancel("invalid signature", identity)));
    }
    if ctx.is_replayed(signature)? {
        warn!(contact = %identity, "replayed channel creation signature");
        return Ok(Some(Ok(Transition::Reject)));
    }
    ctx.record_token(signature);
    Ok(None)
}

/// Local start: clear any existing channel or handshake with the device and ping it.
pub(super) fn send_ping(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::Initial, Message::Initial(Start {
        contact_identity,
        contact_device,
    })) = (state, message)
    else {
        return Ok(Transition::Reject);
    };

    if !ctx.is_trusted_device(&contact_identity, &contact_device)? {
        return cancel("untrusted device", &contact_identity);
    }
    clear_conflicts(ctx, contact_identity, contact_device)?;

    let signature = sign_for(ctx, &contact_identity, &contact_device)?;
    let ping = Ping {
        identity: *ctx.owned_identity(),
        device: *ctx.device_uid(),
        signature,
    };
    ctx.post(
        &Message::Ping(ping),
        asymmetric(
            contact_identity,
            contact_device,
            DeliveryKind::AsymmetricBroadcast,
        ),
    );
    Ok(Transition::Next(State::PingSent))
}

/// A peer pinged us. The leader answers with an ephemeral key, the follower pings back.
pub(super) fn ping_received(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::Initial, Message::Ping(ping)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    if let Some(stop) = check_signed(ctx, &ping.identity, &ping.device, &ping.signature)? {
        return stop;
    }
    let peer = clear_conflicts(ctx, ping.identity, ping.device)?;

    let signature = sign_for(ctx, &ping.identity, &ping.device)?;
    if !should_lead(
        ctx.owned_identity(),
        ctx.device_uid(),
        &ping.identity,
        &ping.device,
    ) {
        let echo = Ping {
            identity: *ctx.owned_identity(),
            device: *ctx.device_uid(),
            signature,
        };
        ctx.post(
            &Message::Ping(echo),
            asymmetric(ping.identity, ping.device, DeliveryKind::AsymmetricBroadcast),
        );
        return Ok(Transition::Next(State::PingSent));
    }

    let ephemeral_secret = generate_kem_key_pair(ctx.prng())?;
    let ephemeral_key = EphemeralKey {
        identity: *ctx.owned_identity(),
        device: *ctx.device_uid(),
        signature,
        public_key: ephemeral_secret.public_key(),
    };
    ctx.post(
        &Message::EphemeralKey(ephemeral_key),
        asymmetric(ping.identity, ping.device, DeliveryKind::Asymmetric),
    );
    ctx.claim_peer(peer);

    Ok(Transition::Next(State::WaitingForK1(WaitingForK1 {
        contact_identity: ping.identity,
        contact_device: ping.device,
        ephemeral_secret,
    })))
}

/// The leader's ephemeral key: encapsulate `k1` to it and send our own ephemeral key.
pub(super) fn ephemeral_key_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::Initial, Message::EphemeralKey(key)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    if let Some(stop) = check_signed(ctx, &key.identity, &key.device, &key.signature)? {
        return stop;
    }
    if should_lead(
        ctx.owned_identity(),
        ctx.device_uid(),
        &key.identity,
        &key.device,
    ) {
        return cancel("ephemeral key from a device that should follow", &key.identity);
    }
    // The incoming key is itself the fresh attempt, so conflicts are aborted without a restart.
    let peer = clear_conflicts(ctx, key.identity, key.device)?;

    let info = ctx.config().protocol_info.clone();
    let (k1, ciphertext) = match encapsulate(&key.public_key, &info, ctx.prng()) {
        Ok(encapsulation) => encapsulation,
        Err(Error::Crypto(err)) => return cancel(&err, &key.identity),
        Err(err) => return Err(err),
    };
    let ephemeral_secret = generate_kem_key_pair(ctx.prng())?;
    ctx.post(
        &Message::K1(FollowerKey {
            public_key: ephemeral_secret.public_key(),
            ciphertext,
        }),
        asymmetric(key.identity, key.device, DeliveryKind::Asymmetric),
    );
    ctx.claim_peer(peer);

    Ok(Transition::Next(State::WaitingForK2(WaitingForK2 {
        contact_identity: key.identity,
        contact_device: key.device,
        ephemeral_secret,
        k1,
    })))
}

/// Aborts this attempt and starts a fresh one if a channel appeared while we negotiated.
fn restart_on_race(
    ctx: &mut StepContext<'_>,
    contact_identity: Identity,
    contact_device: Uid,
) -> Result<Option<StepResult>, Error> {
    if !ctx.channel_exists(&contact_identity, &contact_device)? {
        return Ok(None);
    }

    let restarted = ctx.post_restart(&Message::Initial(Start {
        contact_identity,
        contact_device,
    }))?;
    info!(contact = %contact_identity, restart = %restarted, "channel race detected, restarting");
    Ok(Some(Ok(Transition::Next(State::Cancelled))))
}

/// Leader: recover `k1`, encapsulate `k2`, install the channel.
pub(super) fn k1_received(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::WaitingForK1(state), Message::K1(follower)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    let info = ctx.config().protocol_info.clone();

    let k1 = match decapsulate(&state.ephemeral_secret, &follower.ciphertext, &info) {
        Ok(k1) => k1,
        Err(err) => return cancel(&err.to_string(), &state.contact_identity),
    };
    let (k2, ciphertext) = match encapsulate(&follower.public_key, &info, ctx.prng()) {
        Ok(encapsulation) => encapsulation,
        Err(Error::Crypto(err)) => return cancel(&err, &state.contact_identity),
        Err(err) => return Err(err),
    };
    let seed = Seed::combine(&k1, &k2, &info)?;

    if let Some(restart) = restart_on_race(ctx, state.contact_identity, state.contact_device)? {
        return restart;
    }
    ctx.create_channel(state.contact_identity, state.contact_device, seed);
    ctx.post(
        &Message::K2(LeaderKey { ciphertext }),
        asymmetric(
            state.contact_identity,
            state.contact_device,
            DeliveryKind::Asymmetric,
        ),
    );

    Ok(Transition::Next(State::WaitForFirstAck(WaitForAck {
        contact_identity: state.contact_identity,
        contact_device: state.contact_device,
    })))
}

/// Follower: recover `k2`, install the channel and acknowledge over it.
pub(super) fn k2_received(ctx: &mut StepContext<'_>, state: State, message: Message) -> StepResult {
    let (State::WaitingForK2(state), Message::K2(leader)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    let info = ctx.config().protocol_info.clone();

    let k2 = match decapsulate(&state.ephemeral_secret, &leader.ciphertext, &info) {
        Ok(k2) => k2,
        Err(err) => return cancel(&err.to_string(), &state.contact_identity),
    };
    let seed = Seed::combine(&state.k1, &k2, &info)?;

    if let Some(restart) = restart_on_race(ctx, state.contact_identity, state.contact_device)? {
        return restart;
    }
    ctx.create_channel(state.contact_identity, state.contact_device, seed);
    let details = ctx.owned_details()?;
    ctx.post(
        &Message::FirstAck(Ack { details }),
        asymmetric(
            state.contact_identity,
            state.contact_device,
            DeliveryKind::ObliviousChannel,
        ),
    );

    Ok(Transition::Next(State::WaitForSecondAck(WaitForAck {
        contact_identity: state.contact_identity,
        contact_device: state.contact_device,
    })))
}

fn from_contact(ctx: &StepContext<'_>, state: &WaitForAck) -> bool {
    ctx.reception().remote() == Some((&state.contact_identity, &state.contact_device))
}

fn confirm(ctx: &mut StepContext<'_>, state: &WaitForAck, details: Vec<u8>) {
    ctx.confirm_channel(state.contact_identity, state.contact_device);
    ctx.add_device(state.contact_identity, state.contact_device);
    if state.contact_identity != *ctx.owned_identity() {
        ctx.set_contact_details(state.contact_identity, details);
    }
    ctx.notify(Notification::ChannelConfirmed {
        remote_identity: state.contact_identity,
        remote_device: state.contact_device,
    });
    info!(
        contact = %state.contact_identity,
        device = %state.contact_device,
        "channel confirmed"
    );
}

/// Leader: the follower's acknowledgement proves the channel works both ways.
pub(super) fn first_ack_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::WaitForFirstAck(state), Message::FirstAck(ack)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    if !from_contact(ctx, &state) {
        return Ok(Transition::Reject);
    }

    confirm(ctx, &state, ack.details);
    let details = ctx.owned_details()?;
    ctx.post(
        &Message::SecondAck(Ack { details }),
        asymmetric(
            state.contact_identity,
            state.contact_device,
            DeliveryKind::ObliviousChannel,
        ),
    );
    Ok(Transition::Next(State::ChannelConfirmed))
}

pub(super) fn second_ack_received(
    ctx: &mut StepContext<'_>,
    state: State,
    message: Message,
) -> StepResult {
    let (State::WaitForSecondAck(state), Message::SecondAck(ack)) = (state, message) else {
        return Ok(Transition::Reject);
    };
    if !from_contact(ctx, &state) {
        return Ok(Transition::Reject);
    }

    confirm(ctx, &state, ack.details);
    Ok(Transition::Next(State::ChannelConfirmed))
}

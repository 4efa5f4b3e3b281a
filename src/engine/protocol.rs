use std::fmt;

use crate::codec::{DecodeError, Encoded};
use crate::engine::{ChannelPredicate, ReceptionChannelInfo, StepContext};
use crate::{Error, Identity};

/// Tag of a protocol state variant. Persisted next to the encoded state payload.
pub type StateId = u8;

/// Tag of a protocol message variant. Carried on the wire next to the encoded inputs.
pub type MessageId = u8;

/// The handshake protocols run by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolId {
    ChannelCreation = 1,
    TrustEstablishment = 2,
}

impl ProtocolId {
    pub const ALL: &'static [ProtocolId] = &[Self::ChannelCreation, Self::TrustEstablishment];

    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for ProtocolId {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ChannelCreation),
            2 => Ok(Self::TrustEstablishment),
            other => Err(Error::UnknownProtocol(other)),
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelCreation => f.write_str("channel-creation"),
            Self::TrustEstablishment => f.write_str("trust-establishment"),
        }
    }
}

/// The tagged union of states of one protocol.
pub trait ProtocolState: Sized {
    /// Every state id of the protocol.
    const ALL: &'static [StateId];

    /// State of an instance that does not exist yet.
    fn initial() -> Self;

    fn id(&self) -> StateId;

    /// Encodes the variant's fields, without the tag.
    fn encode_payload(&self) -> Encoded;

    /// Decodes the variant tagged `id`. Unknown tags and arity mismatches are errors.
    fn decode(id: StateId, payload: &Encoded) -> Result<Self, DecodeError>;
}

/// The tagged union of messages one protocol consumes.
pub trait MessageSet: Sized {
    /// Every message id of the protocol.
    const ALL: &'static [MessageId];

    fn id(&self) -> MessageId;

    /// Encodes the variant's input fields, without the tag.
    fn encode_inputs(&self) -> Encoded;

    fn decode(id: MessageId, inputs: &Encoded) -> Result<Self, DecodeError>;
}

/// A handshake protocol: its state space, its messages and its step table.
pub trait Protocol: Sized + 'static {
    const ID: ProtocolId;

    /// Terminal states. An instance reaching one of them is deleted.
    const FINAL_STATES: &'static [StateId];

    /// The terminal state reached on validation failure or abort.
    const CANCELLED: StateId;

    type State: ProtocolState;
    type Message: MessageSet;

    /// The steps eligible from `state`, in priority order.
    fn steps(state: StateId) -> &'static [Step<Self>];

    fn is_final(state: StateId) -> bool {
        Self::FINAL_STATES.contains(&state)
    }
}

/// The result of running a step.
#[derive(Debug)]
pub enum Transition<S> {
    /// Commit the recorded effects and move to the given state.
    Next(S),
    /// Drop the message. Nothing recorded by the step is committed.
    Reject,
    /// The message arrived too early. Nothing is committed and it should be redelivered.
    Retry,
}

pub type StepFn<P> = fn(
    &mut StepContext<'_>,
    <P as Protocol>::State,
    <P as Protocol>::Message,
) -> Result<Transition<<P as Protocol>::State>, Error>;

/// One row of a step table: which message, over which kind of channel, runs which function.
pub struct Step<P: Protocol> {
    pub name: &'static str,
    pub message: MessageId,
    pub reception: ChannelPredicate,
    pub run: StepFn<P>,
}

impl<P: Protocol> fmt::Debug for Step<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("reception", &self.reception)
            .finish()
    }
}

/// Picks the step to run for a message in `state` received over `reception`.
pub fn select_step<P: Protocol>(
    state: StateId,
    message: MessageId,
    reception: &ReceptionChannelInfo,
    owned_identity: &Identity,
) -> Option<&'static Step<P>> {
    P::steps(state)
        .iter()
        .find(|step| step.message == message && step.reception.accepts(reception, owned_identity))
}

/// Lists every `(state, message, reception)` triple from `receptions` for which more than one
/// step of `P` matches. An empty result means the step table is unambiguous.
pub fn ambiguous_steps<P: Protocol>(
    receptions: &[ReceptionChannelInfo],
    owned_identity: &Identity,
) -> Vec<(StateId, MessageId, ReceptionChannelInfo)> {
    let mut ambiguous = Vec::new();
    for &state in P::State::ALL {
        for &message in P::Message::ALL {
            for reception in receptions {
                let matching = P::steps(state)
                    .iter()
                    .filter(|step| {
                        step.message == message && step.reception.accepts(reception, owned_identity)
                    })
                    .count();
                if matching > 1 {
                    ambiguous.push((state, message, reception.clone()));
                }
            }
        }
    }
    ambiguous
}

use crate::codec::{Decode, Encode, Encoded};
use crate::engine::{MessageId, ProtocolId};
use crate::{Error, Identity, Uid};

/// A protocol message as it travels between devices or from the UI to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub protocol: ProtocolId,
    pub instance_uid: Uid,
    pub message_id: MessageId,
    /// The encoded fields of the message variant. Only decoded once a step is selected.
    pub inputs: Encoded,
}

impl ProtocolMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().to_bytes()
    }

    /// Parses a message received from the transport.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let encoded = Encoded::from_bytes(bytes)?;
        let items = encoded.as_list_of(4)?;

        let protocol = ProtocolId::try_from(u64::decode(&items[0])?)?;
        Ok(Self {
            protocol,
            instance_uid: Uid::decode(&items[1])?,
            message_id: u8::decode(&items[2])?,
            inputs: items[3].clone(),
        })
    }
}

impl Encode for ProtocolMessage {
    fn encode(&self) -> Encoded {
        Encoded::List(vec![
            Encoded::Int(self.protocol.as_u64()),
            self.instance_uid.encode(),
            Encoded::Int(u64::from(self.message_id)),
            self.inputs.clone(),
        ])
    }
}

/// How a message addressed to explicit devices is carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryKind {
    Asymmetric,
    AsymmetricBroadcast,
    /// Asymmetric, signed so the receiver learns the sending device.
    AuthenticatedAsymmetric,
    ObliviousChannel,
}

/// Where the transport should deliver an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Back to this device, with [`ReceptionChannelInfo::Local`](crate::engine::ReceptionChannelInfo::Local).
    Local,
    Devices {
        identity: Identity,
        devices: Vec<Uid>,
        kind: DeliveryKind,
    },
    /// Asymmetric broadcast to every device of `identity`.
    Broadcast { identity: Identity },
    /// Every confirmed channel with a device of `identity`, own identity included.
    AllConfirmedChannels { identity: Identity },
}

/// A user-facing prompt. UI responses name the dialog by its `uuid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialog {
    pub uuid: Uid,
    pub protocol: ProtocolId,
    pub instance_uid: Uid,
    pub kind: DialogKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogKind {
    InviteSent {
        contact: Identity,
        display_name: String,
    },
    AcceptInvite {
        contact: Identity,
        details: Vec<u8>,
    },
    InviteAccepted {
        contact: Identity,
    },
    /// Shows this side's half of the SAS and asks for the contact's half.
    SasExchange {
        contact: Identity,
        own_sas: String,
    },
    SasConfirmed {
        contact: Identity,
    },
    MutualTrustConfirmed {
        contact: Identity,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogUpdate {
    /// Shows the dialog, replacing any dialog with the same uuid.
    Show(Dialog),
    Delete { uuid: Uid },
}

/// Events for the rest of the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A channel was confirmed. Downstream device-capability exchange hooks in here.
    ChannelConfirmed {
        remote_identity: Identity,
        remote_device: Uid,
    },
    ContactAdded {
        contact: Identity,
    },
}

/// Output of a committed step, in the order the step produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    Message {
        message: ProtocolMessage,
        destination: Destination,
    },
    Dialog(DialogUpdate),
    Notification(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prng;
    use crate::codec::DecodeError;

    #[test]
    fn test_message_bytes() {
        let prng = Prng::from_seed([51; 32]);
        let message = ProtocolMessage {
            protocol: ProtocolId::TrustEstablishment,
            instance_uid: Uid::random(&prng).unwrap(),
            message_id: 7,
            inputs: Encoded::List(vec![Encoded::Bytes(vec![1, 2, 3])]),
        };

        assert_eq!(
            ProtocolMessage::from_bytes(&message.to_bytes()).unwrap(),
            message
        );
    }

    #[test]
    fn test_unknown_protocol() {
        let prng = Prng::from_seed([52; 32]);
        let encoded = Encoded::List(vec![
            Encoded::Int(99),
            Uid::random(&prng).unwrap().encode(),
            Encoded::Int(0),
            Encoded::List(vec![]),
        ]);

        assert_eq!(
            ProtocolMessage::from_bytes(&encoded.to_bytes()),
            Err(Error::UnknownProtocol(99))
        );
    }

    #[test]
    fn test_message_id_out_of_range() {
        let prng = Prng::from_seed([53; 32]);
        let encoded = Encoded::List(vec![
            Encoded::Int(1),
            Uid::random(&prng).unwrap().encode(),
            Encoded::Int(256),
            Encoded::List(vec![]),
        ]);

        assert!(matches!(
            ProtocolMessage::from_bytes(&encoded.to_bytes()),
            Err(Error::Decode(DecodeError::Length))
        ));
    }
}

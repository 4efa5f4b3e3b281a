use crate::{Identity, Uid};

/// How an inbound message reached this device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceptionChannelInfo {
    /// Posted by this device to itself: user input, restarts and link notifications.
    Local,
    /// Public-key encrypted to this device. The sender is not authenticated.
    Asymmetric,
    /// Public-key encrypted to every device of this identity. The sender is not authenticated.
    AsymmetricBroadcast,
    /// Public-key encrypted to this device and signed by the sending device's identity.
    AuthenticatedAsymmetric {
        remote_identity: Identity,
        remote_device: Uid,
    },
    /// Received over an established channel with a known remote device.
    ObliviousChannel {
        remote_identity: Identity,
        remote_device: Uid,
        confirmed: bool,
    },
}

impl ReceptionChannelInfo {
    /// The authenticated sender, if the channel has one.
    pub fn remote(&self) -> Option<(&Identity, &Uid)> {
        match self {
            Self::AuthenticatedAsymmetric {
                remote_identity,
                remote_device,
            }
            | Self::ObliviousChannel {
                remote_identity,
                remote_device,
                ..
            } => Some((remote_identity, remote_device)),
            Self::Local | Self::Asymmetric | Self::AsymmetricBroadcast => None,
        }
    }
}

/// The reception requirement of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelPredicate {
    Local,
    AnyAsymmetric,
    /// A remote sender the transport authenticated: an authenticated asymmetric message or any
    /// channel, confirmed or not.
    AuthenticatedSender,
    /// Any channel, confirmed or not.
    AnyObliviousChannel,
    ConfirmedObliviousChannel,
    /// A confirmed channel with another device of the owned identity.
    OwnedDeviceChannel,
}

impl ChannelPredicate {
    pub fn accepts(self, reception: &ReceptionChannelInfo, owned_identity: &Identity) -> bool {
        match (self, reception) {
            (Self::Local, ReceptionChannelInfo::Local) => true,
            (
                Self::AnyAsymmetric,
                ReceptionChannelInfo::Asymmetric
                | ReceptionChannelInfo::AsymmetricBroadcast
                | ReceptionChannelInfo::AuthenticatedAsymmetric { .. },
            ) => true,
            (Self::AuthenticatedSender, _) => reception.remote().is_some(),
            (Self::AnyObliviousChannel, ReceptionChannelInfo::ObliviousChannel { .. }) => true,
            (
                Self::ConfirmedObliviousChannel,
                ReceptionChannelInfo::ObliviousChannel { confirmed, .. },
            ) => *confirmed,
            (
                Self::OwnedDeviceChannel,
                ReceptionChannelInfo::ObliviousChannel {
                    remote_identity,
                    confirmed,
                    ..
                },
            ) => *confirmed && remote_identity == owned_identity,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdentityKey, Prng};

    #[test]
    fn test_owned_device_channel_requires_confirmation() {
        let prng = Prng::from_seed([41; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();
        let contact = IdentityKey::new(&prng).unwrap().identity();
        let device = Uid::random(&prng).unwrap();

        let sibling = |confirmed| ReceptionChannelInfo::ObliviousChannel {
            remote_identity: owned,
            remote_device: device,
            confirmed,
        };
        let from_contact = ReceptionChannelInfo::ObliviousChannel {
            remote_identity: contact,
            remote_device: device,
            confirmed: true,
        };

        assert!(ChannelPredicate::OwnedDeviceChannel.accepts(&sibling(true), &owned));
        assert!(!ChannelPredicate::OwnedDeviceChannel.accepts(&sibling(false), &owned));
        assert!(!ChannelPredicate::OwnedDeviceChannel.accepts(&from_contact, &owned));
        assert!(ChannelPredicate::AnyObliviousChannel.accepts(&sibling(false), &owned));
        assert!(!ChannelPredicate::ConfirmedObliviousChannel.accepts(&sibling(false), &owned));
    }

    #[test]
    fn test_asymmetric_and_local_are_distinct() {
        let prng = Prng::from_seed([42; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();

        assert!(ChannelPredicate::AnyAsymmetric.accepts(&ReceptionChannelInfo::Asymmetric, &owned));
        assert!(
            ChannelPredicate::AnyAsymmetric
                .accepts(&ReceptionChannelInfo::AsymmetricBroadcast, &owned)
        );
        assert!(!ChannelPredicate::AnyAsymmetric.accepts(&ReceptionChannelInfo::Local, &owned));
        assert!(!ChannelPredicate::Local.accepts(&ReceptionChannelInfo::Asymmetric, &owned));
    }

    #[test]
    fn test_authenticated_sender_needs_a_known_remote() {
        let prng = Prng::from_seed([43; 32]);
        let owned = IdentityKey::new(&prng).unwrap().identity();
        let contact = IdentityKey::new(&prng).unwrap().identity();
        let device = Uid::random(&prng).unwrap();

        let signed = ReceptionChannelInfo::AuthenticatedAsymmetric {
            remote_identity: contact,
            remote_device: device,
        };
        let unconfirmed = ReceptionChannelInfo::ObliviousChannel {
            remote_identity: contact,
            remote_device: device,
            confirmed: false,
        };

        assert!(ChannelPredicate::AuthenticatedSender.accepts(&signed, &owned));
        assert!(ChannelPredicate::AuthenticatedSender.accepts(&unconfirmed, &owned));
        assert!(ChannelPredicate::AnyAsymmetric.accepts(&signed, &owned));
        for anonymous in [
            ReceptionChannelInfo::Local,
            ReceptionChannelInfo::Asymmetric,
            ReceptionChannelInfo::AsymmetricBroadcast,
        ] {
            assert!(!ChannelPredicate::AuthenticatedSender.accepts(&anonymous, &owned));
        }
        assert_eq!(signed.remote(), Some((&contact, &device)));
    }
}

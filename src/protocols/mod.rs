//! The handshake protocols run by the [`Engine`](crate::Engine).
pub mod channel_creation;
pub use channel_creation::ChannelCreation;

pub mod trust_establishment;
pub use trust_establishment::TrustEstablishment;

#[cfg(test)]
pub(crate) mod testing;

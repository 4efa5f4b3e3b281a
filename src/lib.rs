pub mod codec;

mod config;
pub use config::EngineConfig;

pub mod crypto;
pub use crypto::{IdentityKey, Prng, SasPair, Seed};

pub mod engine;
pub use engine::{
    Destination, Dialog, DialogKind, DialogUpdate, Engine, Notification, Outcome, Outgoing,
    ProtocolId, ProtocolMessage, ReceptionChannelInfo,
};

mod error;
pub use error::Error;

pub mod protocols;

pub mod store;
pub use store::{
    IdentityStore, InstanceStore, MemoryIdentityStore, MemoryInstanceStore, MemoryLedger,
    ReplayLedger, Transactional, TrustOrigin,
};

mod types;
pub use types::*;

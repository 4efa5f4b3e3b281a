#[macro_use]
extern crate afl;
use concord::{
    Engine, IdentityKey, MemoryIdentityStore, MemoryInstanceStore, MemoryLedger, Prng,
    ProtocolMessage, ReceptionChannelInfo, Uid,
};

type MemoryEngine = Engine<MemoryIdentityStore, MemoryInstanceStore, MemoryLedger>;

fn get_engine() -> MemoryEngine {
    let prng = Prng::from_seed([7; 32]);
    let keys = IdentityKey::new(&prng).expect("Setup failed");
    let device = Uid::random(&prng).expect("Setup failed");

    let mut identities = MemoryIdentityStore::new();
    identities.add_owned_identity(keys.identity(), &[device], b"fuzz");

    Engine::new(
        keys,
        device,
        None,
        identities,
        MemoryInstanceStore::new(),
        MemoryLedger::new(),
        prng,
    )
    .expect("Setup failed")
}

fn main() {
    let mut engine = get_engine();

    fuzz!(|data: &[u8]| {
        if let Ok(message) = ProtocolMessage::from_bytes(data) {
            for reception in [
                ReceptionChannelInfo::Local,
                ReceptionChannelInfo::AsymmetricBroadcast,
            ] {
                let _ = engine.handle_message(&message, &reception);
            }
        }
    });
}

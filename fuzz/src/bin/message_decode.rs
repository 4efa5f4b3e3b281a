#[macro_use]
extern crate afl;
use concord::ProtocolMessage;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = ProtocolMessage::from_bytes(data);
    });
}

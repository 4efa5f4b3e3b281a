#[macro_use]
extern crate afl;
use concord::codec::Encoded;

fn main() {
    fuzz!(|data: &[u8]| {
        if let Ok(encoded) = Encoded::from_bytes(data) {
            assert_eq!(encoded.to_bytes(), data);
        }
    });
}

mod identity;
pub use identity::*;

mod uid;
pub use uid::*;

mod x25519;
pub use x25519::*;

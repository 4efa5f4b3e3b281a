//! Self-describing, ordered, type-tagged binary encoding for protocol states and messages.
//!
//! Every value is an [`Encoded`] atom serialized as `tag(1) || length(4, big-endian) || payload`.
//! Lists carry the concatenated encodings of their elements. Decoding is strict: the outer
//! shape, the element count and every atom type must match exactly, and trailing bytes are an
//! error.
mod error;
pub use error::DecodeError;

mod macros;
pub(crate) use macros::encoded_struct;

const TAG_INT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_BYTES: u8 = 0x02;
const TAG_STR: u8 = 0x03;
const TAG_UID: u8 = 0x04;
const TAG_IDENTITY: u8 = 0x05;
const TAG_PUBLIC_KEY: u8 = 0x06;
const TAG_PRIVATE_KEY: u8 = 0x07;
const TAG_SEED: u8 = 0x08;
const TAG_LIST: u8 = 0x09;

const HEADER_LEN: usize = 5;
const MAX_DEPTH: usize = 32;

/// A single encoded atom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    Int(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    Uid([u8; 32]),
    Identity([u8; 64]),
    PublicKey([u8; 32]),
    PrivateKey([u8; 32]),
    Seed([u8; 32]),
    List(Vec<Encoded>),
}

impl Encoded {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Str(_) => "string",
            Self::Uid(_) => "uid",
            Self::Identity(_) => "identity",
            Self::PublicKey(_) => "public key",
            Self::PrivateKey(_) => "private key",
            Self::Seed(_) => "seed",
            Self::List(_) => "list",
        }
    }

    /// Returns the elements of a list atom.
    pub fn as_list(&self) -> Result<&[Encoded], DecodeError> {
        match self {
            Self::List(items) => Ok(items),
            _ => Err(DecodeError::NotAList),
        }
    }

    /// Returns the elements of a list atom holding exactly `arity` elements.
    pub fn as_list_of(&self, arity: usize) -> Result<&[Encoded], DecodeError> {
        let items = self.as_list()?;
        if items.len() != arity {
            return Err(DecodeError::Arity {
                expected: arity,
                found: items.len(),
            });
        }
        Ok(items)
    }

    pub(crate) fn type_error(&self, expected: &'static str) -> DecodeError {
        DecodeError::Type {
            expected,
            found: self.type_name(),
        }
    }

    /// Serializes the atom tree into bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(64);
        self.write(&mut buffer);
        buffer
    }

    fn write(&self, buffer: &mut Vec<u8>) {
        match self {
            Self::Int(value) => write_atom(buffer, TAG_INT, &value.to_be_bytes()),
            Self::Bool(value) => write_atom(buffer, TAG_BOOL, &[u8::from(*value)]),
            Self::Bytes(bytes) => write_atom(buffer, TAG_BYTES, bytes),
            Self::Str(value) => write_atom(buffer, TAG_STR, value.as_bytes()),
            Self::Uid(bytes) => write_atom(buffer, TAG_UID, bytes),
            Self::Identity(bytes) => write_atom(buffer, TAG_IDENTITY, bytes),
            Self::PublicKey(bytes) => write_atom(buffer, TAG_PUBLIC_KEY, bytes),
            Self::PrivateKey(bytes) => write_atom(buffer, TAG_PRIVATE_KEY, bytes),
            Self::Seed(bytes) => write_atom(buffer, TAG_SEED, bytes),
            Self::List(items) => {
                let start = buffer.len();
                buffer.push(TAG_LIST);
                buffer.extend_from_slice(&[0u8; 4]);
                for item in items {
                    item.write(buffer);
                }
                let len = (buffer.len() - start - HEADER_LEN) as u32;
                buffer[start + 1..start + HEADER_LEN].copy_from_slice(&len.to_be_bytes());
            }
        }
    }

    /// Parses bytes produced by [`Encoded::to_bytes`]. The whole input must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (encoded, rest) = Self::read(bytes, 0)?;
        if !rest.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(encoded)
    }

    fn read(bytes: &[u8], depth: usize) -> Result<(Self, &[u8]), DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated);
        }

        let tag = bytes[0];
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[1..HEADER_LEN]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        if body.len() < len {
            return Err(DecodeError::Truncated);
        }
        let (payload, rest) = body.split_at(len);

        let encoded = match tag {
            TAG_INT => Self::Int(u64::from_be_bytes(fixed(payload)?)),
            TAG_BOOL => match payload {
                [0] => Self::Bool(false),
                [1] => Self::Bool(true),
                _ => return Err(DecodeError::Length),
            },
            TAG_BYTES => Self::Bytes(payload.to_vec()),
            TAG_STR => Self::Str(
                String::from_utf8(payload.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?,
            ),
            TAG_UID => Self::Uid(fixed(payload)?),
            TAG_IDENTITY => Self::Identity(fixed(payload)?),
            TAG_PUBLIC_KEY => Self::PublicKey(fixed(payload)?),
            TAG_PRIVATE_KEY => Self::PrivateKey(fixed(payload)?),
            TAG_SEED => Self::Seed(fixed(payload)?),
            TAG_LIST => {
                let mut items = Vec::new();
                let mut remaining = payload;
                while !remaining.is_empty() {
                    let (item, next) = Self::read(remaining, depth + 1)?;
                    items.push(item);
                    remaining = next;
                }
                Self::List(items)
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };

        Ok((encoded, rest))
    }
}

fn write_atom(buffer: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buffer.push(tag);
    buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buffer.extend_from_slice(payload);
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N], DecodeError> {
    payload.try_into().map_err(|_| DecodeError::Length)
}

/// Types that can be turned into an [`Encoded`] atom.
pub trait Encode {
    fn encode(&self) -> Encoded;
}

/// Types that can be strictly reconstructed from an [`Encoded`] atom.
pub trait Decode: Sized {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError>;
}

impl Encode for Encoded {
    fn encode(&self) -> Encoded {
        self.clone()
    }
}

impl Decode for Encoded {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        Ok(encoded.clone())
    }
}

impl Encode for () {
    fn encode(&self) -> Encoded {
        Encoded::List(Vec::new())
    }
}

impl Decode for () {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        encoded.as_list_of(0).map(|_| ())
    }
}

impl Encode for u64 {
    fn encode(&self) -> Encoded {
        Encoded::Int(*self)
    }
}

impl Decode for u64 {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Int(value) => Ok(*value),
            other => Err(other.type_error("int")),
        }
    }
}

impl Encode for u32 {
    fn encode(&self) -> Encoded {
        Encoded::Int(u64::from(*self))
    }
}

impl Decode for u32 {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        u32::try_from(u64::decode(encoded)?).map_err(|_| DecodeError::Length)
    }
}

impl Encode for u8 {
    fn encode(&self) -> Encoded {
        Encoded::Int(u64::from(*self))
    }
}

impl Decode for u8 {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        u8::try_from(u64::decode(encoded)?).map_err(|_| DecodeError::Length)
    }
}

impl Encode for bool {
    fn encode(&self) -> Encoded {
        Encoded::Bool(*self)
    }
}

impl Decode for bool {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Bool(value) => Ok(*value),
            other => Err(other.type_error("bool")),
        }
    }
}

impl Encode for String {
    fn encode(&self) -> Encoded {
        Encoded::Str(self.clone())
    }
}

impl Decode for String {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Str(value) => Ok(value.clone()),
            other => Err(other.type_error("string")),
        }
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Encoded {
        Encoded::Bytes(self.clone())
    }
}

impl Decode for Vec<u8> {
    fn decode(encoded: &Encoded) -> Result<Self, DecodeError> {
        match encoded {
            Encoded::Bytes(bytes) => Ok(bytes.clone()),
            other => Err(other.type_error("bytes")),
        }
    }
}

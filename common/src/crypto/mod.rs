mod hash;
mod keys;

pub use hash::{hash, Hash, Hashable, HASH_SIZE};
pub use keys::{
    KeyError, KeyPair, PublicKey, SecretKey, Signature, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE,
    SIGNATURE_SIZE,
};

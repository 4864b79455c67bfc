//! Cipher adapters and key derivation
//!
//! Every method from the closed set in [`CipherKind`] maps to a [`BlockCrypt`]
//! adapter that transforms whole datagram frames in place. The `none` method
//! maps to no adapter at all; callers branch on the absence instead of going
//! through a pass-through object.

pub mod kdf;

mod crypt;
mod kind;
mod tea;
mod xtea;

pub use self::{
    crypt::{new_block_crypt, BlockCrypt},
    kdf::{derive_key, KEY_BYTES, KEY_ROUNDS, KEY_SALT},
    kind::{available_methods, CipherKind},
};

use thiserror::Error;

/// Errors surfaced while assembling a cipher pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The method name is not in the supported set.
    #[error("unknown cipher method `{0}`")]
    UnknownMethod(String),
    /// The key material is shorter than the method requires.
    #[error("cipher `{kind}` needs a {need}-byte key, got {got} bytes")]
    BadKey {
        kind: CipherKind,
        need: usize,
        got: usize,
    },
}

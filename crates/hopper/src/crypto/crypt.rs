//! Per-packet cipher adapters
//!
//! Block ciphers run full-block CFB across the frame so that ciphertext
//! length equals plaintext length. The chain starts from a fixed initial
//! vector; per-packet uniqueness comes from the random nonce occupying the
//! first plaintext bytes, which makes the leading ciphertext block the
//! effective per-packet IV. Salsa20 instead consumes the leading 8 bytes of
//! the frame directly as its stream nonce and leaves them in clear.

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use cast5::Cast5;
use cfb_mode::{BufDecryptor, BufEncryptor};
use cipher::{BlockCipher, BlockEncrypt, InnerIvInit, Iv, KeyInit, KeyIvInit, StreamCipher, Unsigned};
use des::TdesEde3;
use salsa20::Salsa20;
use sm4::Sm4;
use twofish::Twofish;

use super::{tea::Tea, xtea::Xtea, CipherKind, CryptoError};

// Seeds the CFB chain; never varies, see the module docs.
const INITIAL_VECTOR: [u8; 16] = [
    0xa1, 0x5c, 0x66, 0x0f, 0x3d, 0xb2, 0x4e, 0x91, 0x27, 0xd8, 0x7a, 0x05, 0xc3, 0x19, 0xee, 0x48,
];

// Leading frame bytes consumed as the stream nonce; matches the codec's
// nonce field.
const STREAM_NONCE_SIZE: usize = 8;

/// A keyed whole-frame transform. Implementations keep no per-packet state;
/// one adapter serves every packet of a relay leg.
///
/// Buffers must be at least 8 bytes long; the codec guarantees this for
/// every frame it hands over.
pub trait BlockCrypt: Send + Sync {
    /// Encrypts `buf` in place.
    fn encrypt(&self, buf: &mut [u8]);
    /// Decrypts `buf` in place.
    fn decrypt(&self, buf: &mut [u8]);
}

/// CFB adapter over any block cipher primitive.
struct CfbCrypt<C> {
    cipher: C,
}

impl<C> CfbCrypt<C>
where
    C: BlockCipher + BlockEncrypt + KeyInit + Clone,
{
    fn new(key: &[u8]) -> Result<CfbCrypt<C>, cipher::InvalidLength> {
        Ok(CfbCrypt {
            cipher: C::new_from_slice(key)?,
        })
    }
}

impl<C> BlockCrypt for CfbCrypt<C>
where
    C: BlockCipher + BlockEncrypt + Clone + Send + Sync,
{
    fn encrypt(&self, buf: &mut [u8]) {
        let iv = Iv::<BufEncryptor<C>>::from_slice(&INITIAL_VECTOR[..C::BlockSize::USIZE]);
        BufEncryptor::inner_iv_init(self.cipher.clone(), iv).encrypt(buf);
    }

    fn decrypt(&self, buf: &mut [u8]) {
        let iv = Iv::<BufDecryptor<C>>::from_slice(&INITIAL_VECTOR[..C::BlockSize::USIZE]);
        BufDecryptor::inner_iv_init(self.cipher.clone(), iv).decrypt(buf);
    }
}

/// Salsa20 adapter. Symmetric: the same keystream XOR runs both ways.
struct Salsa20Crypt {
    key: salsa20::Key,
}

impl Salsa20Crypt {
    fn new(key: &[u8]) -> Salsa20Crypt {
        Salsa20Crypt {
            key: *salsa20::Key::from_slice(key),
        }
    }

    fn apply(&self, buf: &mut [u8]) {
        let (nonce, body) = buf.split_at_mut(STREAM_NONCE_SIZE);
        let mut cipher = Salsa20::new(&self.key, salsa20::Nonce::from_slice(nonce));
        cipher.apply_keystream(body);
    }
}

impl BlockCrypt for Salsa20Crypt {
    fn encrypt(&self, buf: &mut [u8]) {
        self.apply(buf);
    }

    fn decrypt(&self, buf: &mut [u8]) {
        self.apply(buf);
    }
}

/// Builds the adapter for `kind`, consuming the method's prefix of `key`.
/// Returns `None` for [`CipherKind::None`].
pub fn new_block_crypt(kind: CipherKind, key: &[u8]) -> Result<Option<Box<dyn BlockCrypt>>, CryptoError> {
    let need = kind.key_size();
    if key.len() < need {
        return Err(CryptoError::BadKey {
            kind,
            need,
            got: key.len(),
        });
    }

    let bad_key = |_| CryptoError::BadKey {
        kind,
        need,
        got: key.len(),
    };
    let key = &key[..need];

    let crypt: Box<dyn BlockCrypt> = match kind {
        CipherKind::None => return Ok(None),
        CipherKind::Aes128 => Box::new(CfbCrypt::<Aes128>::new(key).map_err(bad_key)?),
        CipherKind::Aes192 => Box::new(CfbCrypt::<Aes192>::new(key).map_err(bad_key)?),
        CipherKind::Aes256 => Box::new(CfbCrypt::<Aes256>::new(key).map_err(bad_key)?),
        CipherKind::Blowfish => Box::new(CfbCrypt::<Blowfish>::new(key).map_err(bad_key)?),
        CipherKind::Twofish => Box::new(CfbCrypt::<Twofish>::new(key).map_err(bad_key)?),
        CipherKind::Cast5 => Box::new(CfbCrypt::<Cast5>::new(key).map_err(bad_key)?),
        CipherKind::TripleDes => Box::new(CfbCrypt::<TdesEde3>::new(key).map_err(bad_key)?),
        CipherKind::Tea => Box::new(CfbCrypt::<Tea>::new(key).map_err(bad_key)?),
        CipherKind::Xtea => Box::new(CfbCrypt::<Xtea>::new(key).map_err(bad_key)?),
        CipherKind::Sm4 => Box::new(CfbCrypt::<Sm4>::new(key).map_err(bad_key)?),
        CipherKind::Salsa20 => Box::new(Salsa20Crypt::new(key)),
    };

    Ok(Some(crypt))
}

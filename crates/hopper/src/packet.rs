//! Datagram frame codec
//!
//! Wire format with an active cipher:
//!
//! ```ignore
//! +----------------+----------------+----------+
//! | nonce(8 bytes) | tag(8 bytes)   |   DATA   |
//! +----------------+----------------+----------+
//! ```
//!
//! The nonce is fresh CSPRNG output per frame; the tag is the first 8 bytes
//! of the MD5 of the payload, enough to drop corrupt or mis-keyed traffic.
//! The whole frame is then transformed in place by the adapter. Without a
//! cipher the payload travels verbatim.

use md5::{Digest, Md5};
use rand::RngCore;
use thiserror::Error;

use crate::crypto::BlockCrypt;

/// Size of the per-frame random nonce.
pub const NONCE_SIZE: usize = 8;

/// Size of the truncated-MD5 tag.
pub const TAG_SIZE: usize = 8;

/// Header prepended to every payload when a cipher is active.
pub const HEADER_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Maximum transmission unit handled by the relay.
pub const MTU_LIMIT: usize = 1500;

/// Reasons an incoming frame is refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Frame shorter than the nonce + tag header.
    #[error("frame of {0} bytes is shorter than the {HEADER_SIZE}-byte header")]
    ShortFrame(usize),
    /// Tag does not match the payload digest: corruption or key mismatch.
    #[error("tag mismatch")]
    TagMismatch,
}

/// Builds the wire frame for `payload`. With no cipher the payload is
/// forwarded as-is.
pub fn encrypt_packet(crypt: Option<&dyn BlockCrypt>, payload: &[u8]) -> Vec<u8> {
    let crypt = match crypt {
        Some(c) => c,
        None => return payload.to_vec(),
    };

    let mut frame = vec![0u8; HEADER_SIZE + payload.len()];
    frame[HEADER_SIZE..].copy_from_slice(payload);

    rand::thread_rng().fill_bytes(&mut frame[..NONCE_SIZE]);
    let digest = Md5::digest(&frame[HEADER_SIZE..]);
    frame[NONCE_SIZE..HEADER_SIZE].copy_from_slice(&digest[..TAG_SIZE]);

    crypt.encrypt(&mut frame);
    frame
}

/// Recovers the payload of `frame` in place, verifying the tag.
/// With no cipher the frame is returned unchanged.
pub fn decrypt_packet<'a>(
    crypt: Option<&dyn BlockCrypt>,
    frame: &'a mut [u8],
) -> Result<&'a [u8], PacketError> {
    let crypt = match crypt {
        Some(c) => c,
        None => return Ok(frame),
    };

    if frame.len() < HEADER_SIZE {
        return Err(PacketError::ShortFrame(frame.len()));
    }

    crypt.decrypt(frame);
    let digest = Md5::digest(&frame[HEADER_SIZE..]);
    if digest[..TAG_SIZE] != frame[NONCE_SIZE..HEADER_SIZE] {
        return Err(PacketError::TagMismatch);
    }

    Ok(&frame[HEADER_SIZE..])
}

#[cfg(test)]
mod tests {
    use rand::{Rng, RngCore};

    use crate::crypto::{derive_key, new_block_crypt, CipherKind, KEY_ROUNDS, KEY_SALT};

    use super::*;

    fn test_crypt(kind: CipherKind) -> Option<Box<dyn crate::crypto::BlockCrypt>> {
        let key = derive_key("frame test", KEY_SALT, KEY_ROUNDS);
        new_block_crypt(kind, &key).unwrap()
    }

    #[test]
    fn round_trip_with_cipher() {
        let crypt = test_crypt(CipherKind::Aes256);
        let mut rng = rand::thread_rng();

        for _ in 0..32 {
            let size = rng.gen_range(1..=MTU_LIMIT - HEADER_SIZE);
            let mut payload = vec![0u8; size];
            rng.fill_bytes(&mut payload);

            let mut frame = encrypt_packet(crypt.as_deref(), &payload);
            assert_eq!(frame.len(), payload.len() + HEADER_SIZE);

            let recovered = decrypt_packet(crypt.as_deref(), &mut frame).unwrap();
            assert_eq!(recovered, &payload[..]);
        }
    }

    #[test]
    fn none_is_transparent() {
        let payload = b"plain as day";
        let frame = encrypt_packet(None, payload);
        assert_eq!(frame, payload);

        let mut frame = frame;
        let recovered = decrypt_packet(None, &mut frame).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn nonce_is_fresh_per_frame() {
        let crypt = test_crypt(CipherKind::Aes256);
        let a = encrypt_packet(crypt.as_deref(), b"same payload");
        let b = encrypt_packet(crypt.as_deref(), b"same payload");
        assert_ne!(a, b);
    }

    #[test]
    fn short_frame_rejected() {
        let crypt = test_crypt(CipherKind::Aes256);
        for len in 0..HEADER_SIZE {
            let mut frame = vec![0u8; len];
            assert_eq!(
                decrypt_packet(crypt.as_deref(), &mut frame),
                Err(PacketError::ShortFrame(len))
            );
        }
    }

    #[test]
    fn bit_flips_rejected() {
        let crypt = test_crypt(CipherKind::Aes256);
        let frame = encrypt_packet(crypt.as_deref(), b"do not tamper with me");

        // A flip anywhere past the nonce must flip the tag check.
        for byte in NONCE_SIZE..frame.len() {
            for bit in 0..8 {
                let mut tampered = frame.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decrypt_packet(crypt.as_deref(), &mut tampered),
                    Err(PacketError::TagMismatch),
                    "flip at byte {} bit {} went unnoticed",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn wrong_key_rejected() {
        let key_a = derive_key("key a", KEY_SALT, KEY_ROUNDS);
        let key_b = derive_key("key b", KEY_SALT, KEY_ROUNDS);
        let a = new_block_crypt(CipherKind::Aes256, &key_a).unwrap();
        let b = new_block_crypt(CipherKind::Aes256, &key_b).unwrap();

        let mut frame = encrypt_packet(a.as_deref(), b"secret");
        assert_eq!(
            decrypt_packet(b.as_deref(), &mut frame),
            Err(PacketError::TagMismatch)
        );
    }
}

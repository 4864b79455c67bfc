//! Passphrase key derivation
//!
//! Both relay legs turn their shared passphrase into a fixed 32-byte key with
//! PBKDF2-HMAC-SHA1. Peers interoperate by agreeing on the passphrase alone;
//! the salt and iteration count are protocol constants.

use pbkdf2::pbkdf2_hmac_array;
use sha1::Sha1;

/// Protocol salt for key expansion.
pub const KEY_SALT: &[u8] = b"GRASSHOPPER";

/// PBKDF2 iteration count.
pub const KEY_ROUNDS: u32 = 4096;

/// Length of a derived key in bytes.
pub const KEY_BYTES: usize = 32;

/// Expands `passphrase` into [`KEY_BYTES`] bytes of key material.
/// Deterministic and pure.
pub fn derive_key(passphrase: &str, salt: &[u8], rounds: u32) -> [u8; KEY_BYTES] {
    pbkdf2_hmac_array::<Sha1, KEY_BYTES>(passphrase.as_bytes(), salt, rounds)
}

#[cfg(test)]
mod tests {
    use pbkdf2::pbkdf2_hmac;
    use sha1::Sha1;

    use super::*;

    #[test]
    fn deterministic() {
        let a = derive_key("it's a secret", KEY_SALT, KEY_ROUNDS);
        let b = derive_key("it's a secret", KEY_SALT, KEY_ROUNDS);
        assert_eq!(a, b);

        let c = derive_key("another secret", KEY_SALT, KEY_ROUNDS);
        assert_ne!(a, c);
    }

    #[test]
    fn rfc6070_vector() {
        // PBKDF2-HMAC-SHA1("password", "salt", 4096, 20)
        let mut out = [0u8; 20];
        pbkdf2_hmac::<Sha1>(b"password", b"salt", 4096, &mut out);
        assert_eq!(
            out,
            [
                0x4b, 0x00, 0x79, 0x01, 0xb7, 0x65, 0x48, 0x9a, 0xbe, 0xad, 0x49, 0xd9, 0x26, 0xf7, 0x21, 0xd0,
                0x65, 0xa4, 0x29, 0xc1,
            ]
        );
    }
}

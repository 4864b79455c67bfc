//! Cipher method identifiers

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use super::CryptoError;

/// Supported cipher methods.
///
/// `aes` selects AES-256; the narrower AES variants are addressed explicitly.
/// Every method consumes a prefix of the 32-byte derived key, see
/// [`CipherKind::key_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    None,
    Aes128,
    Aes192,
    Aes256,
    Blowfish,
    Twofish,
    Cast5,
    TripleDes,
    Tea,
    Xtea,
    Sm4,
    Salsa20,
}

impl CipherKind {
    /// Key bytes consumed from the front of the derived key.
    pub fn key_size(self) -> usize {
        match self {
            CipherKind::None => 0,
            CipherKind::Aes128 | CipherKind::Sm4 | CipherKind::Tea | CipherKind::Xtea | CipherKind::Cast5 => 16,
            CipherKind::Aes192 | CipherKind::TripleDes => 24,
            CipherKind::Aes256 | CipherKind::Salsa20 | CipherKind::Blowfish | CipherKind::Twofish => 32,
        }
    }

    /// Canonical configuration name of this method.
    pub fn name(self) -> &'static str {
        match self {
            CipherKind::None => "none",
            CipherKind::Aes128 => "aes-128",
            CipherKind::Aes192 => "aes-192",
            CipherKind::Aes256 => "aes",
            CipherKind::Blowfish => "blowfish",
            CipherKind::Twofish => "twofish",
            CipherKind::Cast5 => "cast5",
            CipherKind::TripleDes => "3des",
            CipherKind::Tea => "tea",
            CipherKind::Xtea => "xtea",
            CipherKind::Sm4 => "sm4",
            CipherKind::Salsa20 => "salsa20",
        }
    }
}

impl Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherKind {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<CipherKind, CryptoError> {
        match s {
            "none" => Ok(CipherKind::None),
            "aes" => Ok(CipherKind::Aes256),
            "aes-128" => Ok(CipherKind::Aes128),
            "aes-192" => Ok(CipherKind::Aes192),
            "blowfish" => Ok(CipherKind::Blowfish),
            "twofish" => Ok(CipherKind::Twofish),
            "cast5" => Ok(CipherKind::Cast5),
            "3des" => Ok(CipherKind::TripleDes),
            "tea" => Ok(CipherKind::Tea),
            "xtea" => Ok(CipherKind::Xtea),
            "sm4" => Ok(CipherKind::Sm4),
            "salsa20" => Ok(CipherKind::Salsa20),
            _ => Err(CryptoError::UnknownMethod(s.to_owned())),
        }
    }
}

/// All accepted method names, for CLI help and validation.
pub fn available_methods() -> &'static [&'static str] {
    &[
        "none", "aes", "aes-128", "aes-192", "blowfish", "twofish", "cast5", "3des", "tea", "xtea", "sm4", "salsa20",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_every_method() {
        for name in available_methods() {
            let kind = name.parse::<CipherKind>().unwrap();
            assert_eq!(kind.name(), *name);
        }
    }

    #[test]
    fn reject_unknown_method() {
        assert!(matches!(
            "rc4".parse::<CipherKind>(),
            Err(CryptoError::UnknownMethod(..))
        ));
    }

    #[test]
    fn key_sizes() {
        assert_eq!(CipherKind::None.key_size(), 0);
        assert_eq!(CipherKind::Aes256.key_size(), 32);
        assert_eq!(CipherKind::Aes192.key_size(), 24);
        assert_eq!(CipherKind::TripleDes.key_size(), 24);
        assert_eq!(CipherKind::Cast5.key_size(), 16);
        assert_eq!(CipherKind::Salsa20.key_size(), 32);
    }
}

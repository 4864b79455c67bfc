//! XTEA block cipher (64-bit block, 128-bit key, 64 Feistel rounds)
//!
//! The per-round key/sum mixes are precomputed into a schedule at
//! construction, one table entry per round.

use cipher::{
    consts::{U16, U8},
    BlockCipher, Key, KeyInit, KeySizeUser,
};

const DELTA: u32 = 0x9e37_79b9;
const ROUNDS: usize = 64;

#[derive(Clone)]
pub struct Xtea {
    table: [u32; ROUNDS],
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl KeySizeUser for Xtea {
    type KeySize = U16;
}

impl KeyInit for Xtea {
    fn new(key: &Key<Self>) -> Self {
        let k = [
            be_u32(&key[0..4]),
            be_u32(&key[4..8]),
            be_u32(&key[8..12]),
            be_u32(&key[12..16]),
        ];

        let mut table = [0u32; ROUNDS];
        let mut sum = 0u32;
        let mut i = 0;
        while i < ROUNDS {
            table[i] = sum.wrapping_add(k[(sum & 3) as usize]);
            i += 1;
            sum = sum.wrapping_add(DELTA);
            table[i] = sum.wrapping_add(k[((sum >> 11) & 3) as usize]);
            i += 1;
        }

        Xtea { table }
    }
}

impl BlockCipher for Xtea {}

cipher::impl_simple_block_encdec!(
    Xtea, U8, cipher, block,
    encrypt: {
        let b = block.get_in();
        let mut v0 = be_u32(&b[0..4]);
        let mut v1 = be_u32(&b[4..8]);

        let mut i = 0;
        while i < ROUNDS {
            v0 = v0.wrapping_add((((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1)) ^ cipher.table[i]);
            i += 1;
            v1 = v1.wrapping_add((((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0)) ^ cipher.table[i]);
            i += 1;
        }

        let out = block.get_out();
        out[0..4].copy_from_slice(&v0.to_be_bytes());
        out[4..8].copy_from_slice(&v1.to_be_bytes());
    }
    decrypt: {
        let b = block.get_in();
        let mut v0 = be_u32(&b[0..4]);
        let mut v1 = be_u32(&b[4..8]);

        let mut i = ROUNDS;
        while i > 0 {
            i -= 1;
            v1 = v1.wrapping_sub((((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0)) ^ cipher.table[i]);
            i -= 1;
            v0 = v0.wrapping_sub((((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1)) ^ cipher.table[i]);
        }

        let out = block.get_out();
        out[0..4].copy_from_slice(&v0.to_be_bytes());
        out[4..8].copy_from_slice(&v1.to_be_bytes());
    }
);

#[cfg(test)]
mod tests {
    use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

    use super::*;

    #[test]
    fn block_round_trip() {
        let xtea = Xtea::new_from_slice(&[0x42; 16]).unwrap();
        let plain = [8u8, 9, 10, 11, 12, 13, 14, 15];

        let mut block = cipher::Block::<Xtea>::clone_from_slice(&plain);
        xtea.encrypt_block(&mut block);
        assert_ne!(block.as_slice(), &plain);
        xtea.decrypt_block(&mut block);
        assert_eq!(block.as_slice(), &plain);
    }

    #[test]
    fn distinct_keys_distinct_ciphertexts() {
        let a = Xtea::new_from_slice(&[1; 16]).unwrap();
        let b = Xtea::new_from_slice(&[2; 16]).unwrap();
        let plain = [0u8; 8];

        let mut block_a = cipher::Block::<Xtea>::clone_from_slice(&plain);
        let mut block_b = cipher::Block::<Xtea>::clone_from_slice(&plain);
        a.encrypt_block(&mut block_a);
        b.encrypt_block(&mut block_b);
        assert_ne!(block_a, block_b);
    }
}

//! TEA block cipher (64-bit block, 128-bit key, 64 Feistel rounds)

use cipher::{
    consts::{U16, U8},
    BlockCipher, Key, KeyInit, KeySizeUser,
};

const DELTA: u32 = 0x9e37_79b9;

// 64 rounds, two per cycle.
const CYCLES: usize = 32;

#[derive(Clone)]
pub struct Tea {
    key: [u32; 4],
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl KeySizeUser for Tea {
    type KeySize = U16;
}

impl KeyInit for Tea {
    fn new(key: &Key<Self>) -> Self {
        Tea {
            key: [
                be_u32(&key[0..4]),
                be_u32(&key[4..8]),
                be_u32(&key[8..12]),
                be_u32(&key[12..16]),
            ],
        }
    }
}

impl BlockCipher for Tea {}

cipher::impl_simple_block_encdec!(
    Tea, U8, cipher, block,
    encrypt: {
        let b = block.get_in();
        let mut v0 = be_u32(&b[0..4]);
        let mut v1 = be_u32(&b[4..8]);
        let [k0, k1, k2, k3] = cipher.key;

        let mut sum = 0u32;
        for _ in 0..CYCLES {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            v1 = v1.wrapping_add(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
        }

        let out = block.get_out();
        out[0..4].copy_from_slice(&v0.to_be_bytes());
        out[4..8].copy_from_slice(&v1.to_be_bytes());
    }
    decrypt: {
        let b = block.get_in();
        let mut v0 = be_u32(&b[0..4]);
        let mut v1 = be_u32(&b[4..8]);
        let [k0, k1, k2, k3] = cipher.key;

        let mut sum = DELTA.wrapping_mul(CYCLES as u32);
        for _ in 0..CYCLES {
            v1 = v1.wrapping_sub(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
            v0 = v0.wrapping_sub(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            sum = sum.wrapping_sub(DELTA);
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
        let tea = Tea::new_from_slice(&[0x42; 16]).unwrap();
        let plain = [0u8, 1, 2, 3, 4, 5, 6, 7];

        let mut block = cipher::Block::<Tea>::clone_from_slice(&plain);
        tea.encrypt_block(&mut block);
        assert_ne!(block.as_slice(), &plain);
        tea.decrypt_block(&mut block);
        assert_eq!(block.as_slice(), &plain);
    }
}

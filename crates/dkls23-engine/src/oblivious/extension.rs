//! Helpers for IKNP OT extension with the KOS consistency check.
//!
//! Columns are indexed by base OT, rows by extended OT. A row fits in a
//! `u128` because there are exactly [`KAPPA`] base OTs.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

use super::BASE_OT_BATCH;

/// Computational security parameter, the width of a row.
pub const KAPPA: usize = BASE_OT_BATCH;
/// Statistical security parameter.
pub const STATISTICAL: usize = 80;
/// Rows carrying the gadget encoding of Bob's input.
pub const GADGET_ROWS: usize = 256 + 2 * STATISTICAL;
/// All extended rows, including the padding that masks the consistency check.
pub const OTE_ROWS: usize = GADGET_ROWS + KAPPA;
pub const COLUMN_BYTES: usize = OTE_ROWS / 8;

pub type Column = [u8; COLUMN_BYTES];

const PRG_CONTEXT: &str = "dkls23-engine ot extension prg";

/// Stretch a base OT pad into a column, bound to this multiplication session.
pub fn expand_seed(session: &[u8; 32], index: usize, seed: &[u8; 32]) -> Column {
    let key = blake3::Hasher::new_derive_key(PRG_CONTEXT)
        .update(session)
        .update(&(index as u32).to_be_bytes())
        .update(seed)
        .finalize();
    let mut prg = ChaCha20Rng::from_seed(*key.as_bytes());
    let mut column = [0u8; COLUMN_BYTES];
    prg.fill_bytes(&mut column);
    column
}

pub fn xor_into(target: &mut Column, other: &Column) {
    for (t, o) in target.iter_mut().zip(other.iter()) {
        *t ^= o;
    }
}

/// Bit `index` of a column, as 0 or 1.
pub fn bit(column: &Column, index: usize) -> u8 {
    (column[index / 8] >> (index % 8)) & 1
}

/// Turn [`KAPPA`] columns into [`OTE_ROWS`] rows.
pub fn transpose(columns: &[Column]) -> Vec<u128> {
    let mut rows = vec![0u128; OTE_ROWS];
    for (j, column) in columns.iter().enumerate() {
        for (i, row) in rows.iter_mut().enumerate() {
            *row |= u128::from(bit(column, i)) << j;
        }
    }
    rows
}

/// Carry-less product of two 128-bit values as `(high, low)`, without reduction.
pub fn clmul(a: u128, b: u128) -> (u128, u128) {
    let mut high = 0u128;
    let mut low = 0u128;
    for i in 0..128 {
        let mask = 0u128.wrapping_sub((b >> i) & 1);
        low ^= (a << i) & mask;
        if i > 0 {
            high ^= (a >> (128 - i)) & mask;
        }
    }
    (high, low)
}

/// Read `count` 128-bit challenges from transcript output.
pub fn challenges_from_bytes(bytes: &[u8]) -> Vec<u128> {
    bytes
        .chunks_exact(16)
        .map(|chunk| {
            let mut word = [0u8; 16];
            word.copy_from_slice(chunk);
            u128::from_le_bytes(word)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clmul_small_values() {
        // (x + 1)^2 = x^2 + 1 over GF(2)
        assert_eq!(clmul(0b11, 0b11), (0, 0b101));
        assert_eq!(clmul(1 << 127, 1 << 1), (1, 0));
        assert_eq!(clmul(u128::MAX, 1), (0, u128::MAX));
    }

    #[test]
    fn test_clmul_is_linear() {
        let a = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210u128;
        let b = 0xdead_beef_0000_1111_2222_3333_4444_5555u128;
        let c = 0x5555_aaaa_5555_aaaa_0f0f_f0f0_1234_8765u128;
        let (h1, l1) = clmul(a, b ^ c);
        let (h2, l2) = clmul(a, b);
        let (h3, l3) = clmul(a, c);
        assert_eq!((h1, l1), (h2 ^ h3, l2 ^ l3));
    }

    #[test]
    fn test_transpose() {
        let mut columns = vec![[0u8; COLUMN_BYTES]; KAPPA];
        // column 3, row 10 and column 127, row 543
        columns[3][1] = 0b100;
        columns[127][COLUMN_BYTES - 1] = 0x80;
        let rows = transpose(&columns);
        assert_eq!(rows.len(), OTE_ROWS);
        assert_eq!(rows[10], 1 << 3);
        assert_eq!(rows[OTE_ROWS - 1], 1 << 127);
        assert_eq!(rows.iter().filter(|row| **row != 0).count(), 2);
    }

    #[test]
    fn test_expand_seed_is_session_bound() {
        let seed = [7u8; 32];
        assert_eq!(expand_seed(&[1u8; 32], 0, &seed), expand_seed(&[1u8; 32], 0, &seed));
        assert_ne!(expand_seed(&[1u8; 32], 0, &seed), expand_seed(&[2u8; 32], 0, &seed));
        assert_ne!(expand_seed(&[1u8; 32], 0, &seed), expand_seed(&[1u8; 32], 1, &seed));
    }
}

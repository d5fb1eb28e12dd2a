//! 页数据的ECC
//!
//! 每512字节生成4字节校验码，一页共16字节，存于备用区0x30处。

use nand_dev::PAGE_DATA_SIZE;

const SUB_BLOCK_SIZE: usize = 512;

pub const ECC_SIZE: usize = 4 * PAGE_DATA_SIZE / SUB_BLOCK_SIZE;

pub type EccData = [u8; ECC_SIZE];

fn parity(x: u8) -> u16 {
    (x.count_ones() & 1) as u16
}

fn sub_block_ecc(data: &[u8]) -> [u8; 4] {
    let mut a = [[0u8; 2]; 12];
    for (i, &x) in data.iter().enumerate() {
        for j in 0..9 {
            a[3 + j][(i >> j) & 1] ^= x;
        }
    }

    let x = a[3][0] ^ a[3][1];
    a[0] = [x & 0x55, x & 0xAA];
    a[1] = [x & 0x33, x & 0xCC];
    a[2] = [x & 0x0F, x & 0xF0];

    let (mut a0, mut a1) = (0u16, 0u16);
    for (j, [even, odd]) in a.into_iter().enumerate() {
        a0 |= parity(even) << j;
        a1 |= parity(odd) << j;
    }

    let [a0_lo, a0_hi] = a0.to_le_bytes();
    let [a1_lo, a1_hi] = a1.to_le_bytes();
    [a0_lo, a0_hi, a1_lo, a1_hi]
}

/// 计算一页数据的ECC，`page`须为一页数据区
pub fn calculate(page: &[u8]) -> EccData {
    debug_assert_eq!(PAGE_DATA_SIZE, page.len());

    let mut ecc = [0; ECC_SIZE];
    for (out, block) in ecc
        .chunks_exact_mut(4)
        .zip(page.chunks_exact(SUB_BLOCK_SIZE))
    {
        out.copy_from_slice(&sub_block_ecc(block));
    }
    ecc
}

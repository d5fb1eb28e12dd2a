//! NAND的加密与完整性校验
//!
//! 数据区的簇以AES-128-CBC加密，整簇共用一条IV链，初始IV为0。
//! 每个簇都带有HMAC-SHA1，以盐值区分超级块簇与文件数据簇。

use alloc::boxed::Box;
use core::fmt;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::volume::{FstEntry, superblock_cluster};

pub type Hash = [u8; 20];
pub type Iv = [u8; 16];
pub type AesKey = [u8; 16];

const BLOCK_SIZE: usize = 16;
const SALT_SIZE: usize = 0x40;
/// SHA-1的分组长度，较短的HMAC密钥以0补齐到此长度
const HMAC_BLOCK_SIZE: usize = 64;

/// keys.bin(BootMii)中NAND HMAC密钥的位置
const KEYS_BIN_HMAC_OFFSET: usize = 0x144;
/// keys.bin(BootMii)中NAND AES密钥的位置
const KEYS_BIN_AES_OFFSET: usize = 0x158;

/// 增量计算HMAC
pub trait MacGenerator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Hash;
}

/// NAND使用的密码学原语
///
/// `encrypt`与`decrypt`原地处理16字节对齐的`buf`，并把`iv`推进到最后一个密文块，
/// 便于下一次调用接着同一条CBC链。
pub trait NandCrypto: fmt::Debug + Send + Sync {
    fn encrypt(&self, iv: &mut Iv, buf: &mut [u8]);
    fn decrypt(&self, iv: &mut Iv, buf: &mut [u8]);
    fn nand_mac(&self) -> Box<dyn MacGenerator>;
}

/// 纯软件实现
#[derive(Clone)]
pub struct SoftwareCrypto {
    cipher: Aes128,
    /// 已装入密钥的HMAC状态，每次计算时复制一份
    mac: Hmac<Sha1>,
}

impl fmt::Debug for SoftwareCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareCrypto").finish_non_exhaustive()
    }
}

impl SoftwareCrypto {
    pub fn new(aes_key: &AesKey, hmac_key: &Hash) -> Self {
        let mut key_block = [0; HMAC_BLOCK_SIZE];
        key_block[..hmac_key.len()].copy_from_slice(hmac_key);

        Self {
            cipher: Aes128::new(GenericArray::from_slice(aes_key)),
            mac: <Hmac<Sha1> as KeyInit>::new(GenericArray::from_slice(&key_block)),
        }
    }

    /// 从BootMii导出的keys.bin中取出NAND密钥
    pub fn from_keys_bin(keys: &[u8]) -> Option<Self> {
        let hmac_key = keys.get(KEYS_BIN_HMAC_OFFSET..KEYS_BIN_HMAC_OFFSET + 20)?;
        let aes_key = keys.get(KEYS_BIN_AES_OFFSET..KEYS_BIN_AES_OFFSET + 16)?;
        Some(Self::new(aes_key.try_into().ok()?, hmac_key.try_into().ok()?))
    }
}

struct HmacSha1(Hmac<Sha1>);

impl MacGenerator for HmacSha1 {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Hash {
        let mut hash = [0; 20];
        hash.copy_from_slice(&self.0.finalize().into_bytes());
        hash
    }
}

impl NandCrypto for SoftwareCrypto {
    fn encrypt(&self, iv: &mut Iv, buf: &mut [u8]) {
        debug_assert_eq!(0, buf.len() % BLOCK_SIZE);

        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            block.iter_mut().zip(iv.iter()).for_each(|(b, v)| *b ^= v);
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
            iv.copy_from_slice(block);
        }
    }

    fn decrypt(&self, iv: &mut Iv, buf: &mut [u8]) {
        debug_assert_eq!(0, buf.len() % BLOCK_SIZE);

        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            let mut next_iv = [0; BLOCK_SIZE];
            next_iv.copy_from_slice(block);
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            block.iter_mut().zip(iv.iter()).for_each(|(b, v)| *b ^= v);
            *iv = next_iv;
        }
    }

    fn nand_mac(&self) -> Box<dyn MacGenerator> {
        Box::new(HmacSha1(self.mac.clone()))
    }
}

/// 超级块HMAC的盐值：仅含该代超级块的首簇编号
pub fn superblock_salt(index: u16) -> [u8; SALT_SIZE] {
    let mut salt = [0; SALT_SIZE];
    salt[0x12..0x14].copy_from_slice(&superblock_cluster(index).to_be_bytes());
    salt
}

/// 文件数据HMAC的盐值
///
/// uid | name | chain_index | fst_index | x3 | 0填充，均为大端序
pub fn data_salt(entry: &FstEntry, fst_index: u16, chain_index: u16) -> [u8; SALT_SIZE] {
    let mut salt = [0; SALT_SIZE];
    salt[..0x04].copy_from_slice(&entry.uid.to_be_bytes());
    salt[0x04..0x10].copy_from_slice(&entry.name);
    salt[0x10..0x14].copy_from_slice(&u32::from(chain_index).to_be_bytes());
    salt[0x14..0x18].copy_from_slice(&u32::from(fst_index).to_be_bytes());
    salt[0x18..0x1C].copy_from_slice(&entry.x3.to_be_bytes());
    salt
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    fn crypto() -> SoftwareCrypto {
        SoftwareCrypto::new(&[0x11; 16], &[0x22; 20])
    }

    #[test]
    fn cbc_chains_across_calls() {
        let crypto = crypto();
        let plain: Vec<u8> = (0..64u8).collect();

        let mut whole = plain.clone();
        crypto.encrypt(&mut [0; 16], &mut whole);

        let mut split = plain.clone();
        let mut iv = [0; 16];
        let (head, tail) = split.split_at_mut(32);
        crypto.encrypt(&mut iv, head);
        crypto.encrypt(&mut iv, tail);
        assert_eq!(whole, split);
        assert_ne!(plain, whole);

        let mut iv = [0; 16];
        crypto.decrypt(&mut iv, &mut split);
        assert_eq!(plain, split);
    }

    #[test]
    fn identical_blocks_encrypt_differently() {
        let mut buf = vec![0u8; 32];
        crypto().encrypt(&mut [0; 16], &mut buf);
        assert_ne!(buf[..16], buf[16..]);
    }

    #[test]
    fn mac_depends_on_key() {
        let mut mac = crypto().nand_mac();
        mac.update(b"salt");
        mac.update(b"data");
        let a = mac.finalize();

        let other = SoftwareCrypto::new(&[0x11; 16], &[0x33; 20]);
        let mut mac = other.nand_mac();
        mac.update(b"saltdata");
        assert_ne!(a, mac.finalize());

        let mut mac = crypto().nand_mac();
        mac.update(b"saltdata");
        assert_eq!(a, mac.finalize());
    }

    #[test]
    fn mac_matches_unpadded_key() {
        let mut mac = crypto().nand_mac();
        mac.update(b"cluster");

        let mut reference = <Hmac<Sha1> as Mac>::new_from_slice(&[0x22; 20]).unwrap();
        Mac::update(&mut reference, b"cluster");
        assert_eq!(reference.finalize().into_bytes()[..], mac.finalize()[..]);
    }

    #[test]
    fn keys_bin_offsets() {
        let mut keys = vec![0u8; 0x400];
        keys[0x144..0x158].fill(0x22);
        keys[0x158..0x168].fill(0x11);
        let from_file = SoftwareCrypto::from_keys_bin(&keys).unwrap();

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        from_file.encrypt(&mut [0; 16], &mut a);
        crypto().encrypt(&mut [0; 16], &mut b);
        assert_eq!(a, b);

        assert!(SoftwareCrypto::from_keys_bin(&keys[..0x160]).is_none());
    }

    #[test]
    fn salts() {
        let salt = superblock_salt(1);
        assert_eq!([0x7F, 0x10], salt[0x12..0x14]);
        assert_eq!(2, salt.iter().filter(|&&b| b != 0).count());

        let mut entry = FstEntry {
            uid: 0x1000,
            x3: 0xDEADBEEF,
            ..FstEntry::default()
        };
        entry.set_name("setting.txt");
        let salt = data_salt(&entry, 5, 2);
        assert_eq!([0, 0, 0x10, 0], salt[..4]);
        assert_eq!(b"setting.txt\0", &salt[4..16]);
        assert_eq!([0, 0, 0, 2], salt[16..20]);
        assert_eq!([0, 0, 0, 5], salt[20..24]);
        assert_eq!([0xDE, 0xAD, 0xBE, 0xEF], salt[24..28]);
        assert!(salt[28..].iter().all(|&b| b == 0));
    }
}

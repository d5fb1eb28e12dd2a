//! 簇的编解码
//!
//! 一个簇由8页组成，每页的备用区存放ECC，第6、7页的备用区还存放HMAC。
//! 超级块区以外的簇在落盘前加密。

use alloc::sync::Arc;

use nand_dev::{NandDevice, PAGE_DATA_SIZE, PAGE_SIZE};
use vfs::{Error, Result};

use crate::crypto::{self, Hash, NandCrypto};
use crate::ecc;
use crate::volume::{
    CLUSTER_COUNT, CLUSTER_SIZE, ClusterData, FstEntry, SUPERBLOCK_START_CLUSTER, page_id,
};

const HMAC_PAGE1: usize = 6;
const HMAC_PAGE2: usize = 7;
/// 第6页：完整的HMAC
const HMAC1_OFFSET_IN_PAGE1: usize = 1;
/// 第6页：第二份HMAC的前12字节
const HMAC2_OFFSET_IN_PAGE1: usize = 0x15;
const HMAC2_SIZE_IN_PAGE1: usize = 12;
/// 第7页：第二份HMAC的后8字节
const HMAC2_OFFSET_IN_PAGE2: usize = 1;
const ECC_OFFSET: usize = 0x30;

#[derive(Debug, Clone)]
pub struct ClusterCodec {
    dev: Arc<dyn NandDevice>,
    crypto: Arc<dyn NandCrypto>,
}

fn check_cluster(cluster: u16) -> Result<()> {
    if cluster as usize >= CLUSTER_COUNT {
        return Err(Error::Invalid);
    }
    Ok(())
}

const fn is_encrypted(cluster: u16) -> bool {
    cluster < SUPERBLOCK_START_CLUSTER
}

impl ClusterCodec {
    pub fn new(dev: Arc<dyn NandDevice>, crypto: Arc<dyn NandCrypto>) -> Self {
        Self { dev, crypto }
    }

    pub fn device(&self) -> &Arc<dyn NandDevice> {
        &self.dev
    }

    /// 读出明文与备用区中的两份HMAC
    pub fn read_cluster(&self, cluster: u16, data: &mut ClusterData) -> Result<[Hash; 2]> {
        check_cluster(cluster)?;
        log::debug!("Reading cluster {cluster:#06x}");

        let mut hmacs = [[0; 20]; 2];
        let mut page_buf = [0u8; PAGE_SIZE];
        for (page, out) in data.chunks_exact_mut(PAGE_DATA_SIZE).enumerate() {
            self.read_page(page_id(cluster, page), &mut page_buf)?;
            out.copy_from_slice(&page_buf[..PAGE_DATA_SIZE]);

            let spare = &page_buf[PAGE_DATA_SIZE..];
            match page {
                HMAC_PAGE1 => {
                    hmacs[0].copy_from_slice(&spare[HMAC1_OFFSET_IN_PAGE1..][..20]);
                    hmacs[1][..HMAC2_SIZE_IN_PAGE1]
                        .copy_from_slice(&spare[HMAC2_OFFSET_IN_PAGE1..][..HMAC2_SIZE_IN_PAGE1]);
                }
                HMAC_PAGE2 => {
                    hmacs[1][HMAC2_SIZE_IN_PAGE1..].copy_from_slice(
                        &spare[HMAC2_OFFSET_IN_PAGE2..][..20 - HMAC2_SIZE_IN_PAGE1],
                    );
                }
                _ => (),
            }
        }

        if is_encrypted(cluster) {
            self.crypto.decrypt(&mut [0; 16], data);
        }

        Ok(hmacs)
    }

    pub fn write_cluster(&self, cluster: u16, data: &ClusterData, hmac: &Hash) -> Result<()> {
        check_cluster(cluster)?;
        log::debug!("Writing to cluster {cluster:#06x}");

        let mut iv = [0; 16];
        let mut page_buf = [0u8; PAGE_SIZE];
        for (page, source) in data.chunks_exact(PAGE_DATA_SIZE).enumerate() {
            let (stored, spare) = page_buf.split_at_mut(PAGE_DATA_SIZE);
            stored.copy_from_slice(source);
            if is_encrypted(cluster) {
                self.crypto.encrypt(&mut iv, stored);
            }

            spare.fill(0);
            spare[0] = 0xFF;
            spare[ECC_OFFSET..][..ecc::ECC_SIZE].copy_from_slice(&ecc::calculate(stored));
            match page {
                HMAC_PAGE1 => {
                    spare[HMAC1_OFFSET_IN_PAGE1..][..20].copy_from_slice(hmac);
                    spare[HMAC2_OFFSET_IN_PAGE1..][..HMAC2_SIZE_IN_PAGE1]
                        .copy_from_slice(&hmac[..HMAC2_SIZE_IN_PAGE1]);
                }
                HMAC_PAGE2 => {
                    spare[HMAC2_OFFSET_IN_PAGE2..][..20 - HMAC2_SIZE_IN_PAGE1]
                        .copy_from_slice(&hmac[HMAC2_SIZE_IN_PAGE1..]);
                }
                _ => (),
            }

            self.write_page(page_id(cluster, page), &page_buf)?;
        }

        Ok(())
    }

    /// 原样读出整个簇(含备用区)
    pub fn read_raw_cluster(&self, cluster: u16, raw: &mut [u8]) -> Result<()> {
        check_cluster(cluster)?;
        if raw.len() != CLUSTER_SIZE {
            return Err(Error::Invalid);
        }
        for (page, buf) in raw.chunks_exact_mut(PAGE_SIZE).enumerate() {
            self.read_page(page_id(cluster, page), buf)?;
        }
        Ok(())
    }

    pub fn write_raw_cluster(&self, cluster: u16, raw: &[u8]) -> Result<()> {
        check_cluster(cluster)?;
        if raw.len() != CLUSTER_SIZE {
            return Err(Error::Invalid);
        }
        for (page, buf) in raw.chunks_exact(PAGE_SIZE).enumerate() {
            self.write_page(page_id(cluster, page), buf)?;
        }
        Ok(())
    }

    /// 第`index`代超级块的HMAC
    pub fn superblock_hmac(&self, superblock: &[u8], index: u16) -> Hash {
        let mut mac = self.crypto.nand_mac();
        mac.update(&crypto::superblock_salt(index));
        mac.update(superblock);
        mac.finalize()
    }

    /// 文件第`chain_index`个簇的HMAC
    pub fn data_hmac(
        &self,
        entry: &FstEntry,
        fst_index: u16,
        chain_index: u16,
        data: &ClusterData,
    ) -> Hash {
        let mut mac = self.crypto.nand_mac();
        mac.update(&crypto::data_salt(entry, fst_index, chain_index));
        mac.update(data);
        mac.finalize()
    }

    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<()> {
        self.dev.read_page(page, buf).map_err(|e| {
            log::error!("Failed to read page: {e}");
            Error::BadBlock
        })
    }

    fn write_page(&self, page: usize, buf: &[u8]) -> Result<()> {
        self.dev.write_page(page, buf).map_err(|e| {
            log::error!("Failed to write page: {e}");
            Error::BadBlock
        })
    }
}
